use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Size tags that mark the large variants worth downloading.
pub const DEFAULT_SIZE_MARKERS: [&str; 3] = ["1152", "1344", "1536"];

const DEFAULT_HISTORY_FILE: &str = "dedup-history.jsonl";

/// Settings for one pipeline run. Every stage receives this at construction
/// time; nothing is read from process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Saved page markup to scan for image references.
    pub input: PathBuf,
    /// Root of the per-domain download tree.
    pub download_root: PathBuf,
    pub size_markers: Vec<String>,
    /// Degree of parallelism for fetching and hashing.
    pub workers: usize,
    pub fetch_timeout_secs: u64,
    /// Overall budget for the acquisition stage. `None` means unbounded.
    pub deadline_secs: Option<u64>,
    pub user_agent: String,
    /// Where cull history is appended. Defaults to a file next to the
    /// download root so that a reset keeps it.
    pub history_path: Option<PathBuf>,
    pub record_history: bool,
    pub progress: bool,

    pub remove_filename_duplicates: bool,
    pub skip_perceptual_dedup: bool,
    pub skip_cleanup: bool,
    pub only_remove_duplicates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from("DOM.txt"),
            download_root: PathBuf::from("downloads"),
            size_markers: DEFAULT_SIZE_MARKERS.iter().map(|m| m.to_string()).collect(),
            workers: 4,
            fetch_timeout_secs: 30,
            deadline_secs: None,
            user_agent: concat!("imgharvest/", env!("CARGO_PKG_VERSION")).to_string(),
            history_path: None,
            record_history: true,
            progress: true,
            remove_filename_duplicates: false,
            skip_perceptual_dedup: false,
            skip_cleanup: false,
            only_remove_duplicates: false,
        }
    }
}

impl Config {
    /// Load from `path` if given, otherwise from the per-user config file when
    /// one exists, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => {
                    log::debug!("Loading config from {}", path.display());
                    Self::from_file(&path)
                }
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("imgharvest").join("config.json"))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn history_file(&self) -> PathBuf {
        match &self.history_path {
            Some(path) => path.clone(),
            None => self.download_root.with_file_name(DEFAULT_HISTORY_FILE),
        }
    }
}
