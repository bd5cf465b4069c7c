use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A downloaded file as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: u64,
}

impl StoredFile {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    pub fn file_name(&self) -> Cow<'_, str> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default()
    }
}

/// Which files a scan should pick up.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub extensions: Vec<String>,
    pub ignore_case: bool,
}

impl ScanOptions {
    /// Exactly `.jpg`, as the resolution-variant naming scheme uses.
    pub fn jpg() -> Self {
        Self {
            extensions: vec!["jpg".to_string()],
            ignore_case: false,
        }
    }

    pub fn jpeg() -> Self {
        Self {
            extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            ignore_case: true,
        }
    }

    /// Everything that counts as a previously stored image.
    pub fn stored_images() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "gif", "webp"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            ignore_case: true,
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            return false;
        };
        if self.ignore_case {
            let ext = ext.to_lowercase();
            self.extensions.iter().any(|e| *e == ext)
        } else {
            self.extensions.iter().any(|e| e == ext)
        }
    }
}

/// Recursively walk `dir`, returning matching file paths in sorted order.
/// A missing directory yields nothing.
pub fn scan_directory(dir: &Path, options: &ScanOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && options.matches(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(e) => {
                if dir.exists() {
                    log::warn!("Walk error under {}: {}", dir.display(), e);
                }
            }
        }
    }
    files.sort();
    files
}

pub fn count_files(dir: &Path, options: &ScanOptions) -> usize {
    scan_directory(dir, options).len()
}
