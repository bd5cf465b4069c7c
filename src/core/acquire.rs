use super::fetch::{Fetch, FetchError};
use super::{progress_bar, run_pooled};
use crate::config::Config;
use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use url::Url;

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Folder name for the host a URL points at: lowercased, without a leading
/// `www.`, with characters that are not allowed in file names replaced.
pub fn bucket_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let netloc = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Some(sanitize(&netloc))
}

/// Last path segment of `url`, query string removed.
pub fn file_name_for(url: &str) -> Option<String> {
    let without_query = url.split('?').next().unwrap_or(url);
    let name = without_query.rsplit('/').next()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(sanitize(name))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// `name` itself, then `stem_1.ext`, `stem_2.ext`, ...
fn candidate_name(name: &str, counter: usize) -> String {
    if counter == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, counter, ext.to_string_lossy()),
        None => format!("{}_{}", stem, counter),
    }
}

/// Claim a file name in `dir` that no other file uses, creating it empty.
/// Used for in-progress downloads.
/// `create_new` makes the claim atomic, so two writers never share a name.
pub fn reserve_unique(dir: &Path, name: &str) -> io::Result<(PathBuf, File)> {
    let mut counter = 0;
    loop {
        let path = dir.join(candidate_name(name, counter));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Hidden in-progress name for `name`; its `.part` extension keeps it out of
/// every image scan.
fn part_name(name: &str) -> String {
    format!(".{}.part", name)
}

/// Move a finished download to the first free `_N` variant of `name` in
/// `dir`. A hard link never replaces an existing file, so names already on
/// disk are skipped rather than overwritten.
pub fn persist_unique(part: &Path, dir: &Path, name: &str) -> io::Result<PathBuf> {
    let mut counter = 0;
    loop {
        let path = dir.join(candidate_name(name, counter));
        match fs::hard_link(part, &path) {
            Ok(()) => {
                discard(part);
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => counter += 1,
            // filesystems without hard links
            Err(_) if !path.exists() => {
                fs::rename(part, &path)?;
                return Ok(path);
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AcquireOutcome {
    Saved { url: String, path: PathBuf, bytes: u64 },
    Failed { url: String, reason: String },
}

impl AcquireOutcome {
    pub fn url(&self) -> &str {
        match self {
            AcquireOutcome::Saved { url, .. } | AcquireOutcome::Failed { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquireReport {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<AcquireOutcome>,
}

struct Job {
    url: String,
    dir: PathBuf,
    name: String,
    part: PathBuf,
    file: File,
}

/// A body that is fully on disk under its part name, waiting for a final name.
struct Fetched {
    url: String,
    dir: PathBuf,
    name: String,
    part: PathBuf,
    bytes: u64,
}

/// Downloads a URL set into per-domain folders under the download root.
pub struct Acquirer<F> {
    root: PathBuf,
    workers: usize,
    deadline: Option<Duration>,
    progress: bool,
    fetcher: F,
}

impl<F: Fetch> Acquirer<F> {
    pub fn new(config: &Config, fetcher: F) -> Self {
        Self {
            root: config.download_root.clone(),
            workers: config.workers,
            deadline: config.deadline(),
            progress: config.progress,
            fetcher,
        }
    }

    /// Fetch every URL once. Individual failures are logged and counted;
    /// they never stop the remaining downloads.
    pub fn acquire(&self, urls: &BTreeSet<String>) -> AcquireReport {
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(urls.len());

        let mut jobs = Vec::with_capacity(urls.len());
        for url in urls {
            match self.plan(url) {
                Ok(job) => jobs.push(job),
                Err(e) => outcomes.push(failed(url.clone(), &e)),
            }
        }

        let bar = progress_bar(jobs.len(), self.progress, "Downloading");
        let fetched: Vec<std::result::Result<Fetched, AcquireOutcome>> =
            run_pooled(self.workers, || {
                jobs.into_par_iter()
                    .map(|job| {
                        let result = self.download(job, started);
                        bar.inc(1);
                        result
                    })
                    .collect()
            });
        bar.finish_and_clear();

        // Final names are handed out here, in URL order, and only to bodies
        // that actually arrived.
        for result in fetched {
            outcomes.push(match result {
                Ok(done) => persist(done),
                Err(outcome) => outcome,
            });
        }
        outcomes.sort_by(|a, b| a.url().cmp(b.url()));

        let succeeded = outcomes
            .iter()
            .filter(|o| matches!(o, AcquireOutcome::Saved { .. }))
            .count();
        AcquireReport {
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }

    fn plan(&self, url: &str) -> Result<Job> {
        let bucket = bucket_name(url).ok_or_else(|| Error::InvalidUrl {
            url: url.to_string(),
        })?;
        let name = file_name_for(url).ok_or_else(|| Error::MissingFileName {
            url: url.to_string(),
        })?;

        let dir = self.root.join(bucket);
        fs::create_dir_all(&dir)?;
        let (part, file) = reserve_unique(&dir, &part_name(&name))?;
        Ok(Job {
            url: url.to_string(),
            dir,
            name,
            part,
            file,
        })
    }

    fn download(&self, job: Job, started: Instant) -> std::result::Result<Fetched, AcquireOutcome> {
        let Job {
            url,
            dir,
            name,
            part,
            file,
        } = job;
        log::debug!("Downloading {} -> {}", url, part.display());

        let result = if self.deadline.is_some_and(|d| started.elapsed() >= d) {
            Err(FetchError::DeadlineExceeded)
        } else {
            let mut writer = BufWriter::new(file);
            self.fetcher
                .fetch(&url, &mut writer)
                .and_then(|bytes| writer.flush().map(|_| bytes).map_err(FetchError::from))
        };

        match result {
            Ok(bytes) => Ok(Fetched {
                url,
                dir,
                name,
                part,
                bytes,
            }),
            Err(e) => {
                discard(&part);
                Err(failed(url, &e))
            }
        }
    }
}

fn persist(done: Fetched) -> AcquireOutcome {
    let Fetched {
        url,
        dir,
        name,
        part,
        bytes,
    } = done;
    match persist_unique(&part, &dir, &name) {
        Ok(path) => {
            log::info!("[SUCCESS] {} -> {}", url, path.display());
            AcquireOutcome::Saved { url, path, bytes }
        }
        Err(e) => {
            discard(&part);
            failed(url, &e)
        }
    }
}

fn failed(url: String, reason: &dyn std::fmt::Display) -> AcquireOutcome {
    log::warn!("[FAILED] {}: {}", url, reason);
    AcquireOutcome::Failed {
        url,
        reason: reason.to_string(),
    }
}

fn discard(part: &Path) {
    if let Err(e) = fs::remove_file(part) {
        log::debug!("Could not remove {}: {}", part.display(), e);
    }
}
