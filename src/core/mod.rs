pub mod acquire;
pub mod cleanup;
pub mod extract;
pub mod fetch;
pub mod filename;
pub mod perceptual;
pub mod scanner;

use crate::history::{CullHistory, CullHistoryRecord, DedupStage};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;
use scanner::StoredFile;
use serde::Serialize;
use std::fs;
use std::time::Duration;

/// Outcome of one deduplication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub scanned: usize,
    pub groups: usize,
    pub removed: usize,
    pub bytes_freed: u64,
    pub remaining: usize,
}

/// Delete every file in `culled`, keeping `retained`. Failures are logged per
/// file and the rest are still attempted. Returns `(removed, bytes_freed)`.
pub(crate) fn cull(
    stage: DedupStage,
    retained: &StoredFile,
    culled: &[&StoredFile],
    history: Option<&CullHistory>,
) -> (usize, u64) {
    log::info!("Keeping {}", retained.path.display());

    let mut removed = Vec::new();
    let mut bytes_freed = 0;
    for file in culled {
        let size = fs::metadata(&file.path).map(|m| m.len()).unwrap_or(file.size);
        match fs::remove_file(&file.path) {
            Ok(()) => {
                log::info!("Removed {}", file.path.display());
                bytes_freed += size;
                removed.push(file.path.to_string_lossy().into_owned());
            }
            Err(e) => log::warn!("Failed to delete {}: {}", file.path.display(), e),
        }
    }

    let count = removed.len();
    if let Some(history) = history {
        if !removed.is_empty() {
            let record = CullHistoryRecord::now(stage, &retained.path, removed);
            if let Err(e) = history.append(&record) {
                log::warn!("Failed to record history in {}: {}", history.path().display(), e);
            }
        }
    }
    (count, bytes_freed)
}

/// Run `work` on a dedicated pool of `workers` threads, falling back to the
/// global pool when one cannot be built.
pub(crate) fn run_pooled<T, F>(workers: usize, work: F) -> T
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match ThreadPoolBuilder::new().num_threads(workers.max(1)).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            log::warn!("Failed to build worker pool, using the global one: {}", e);
            work()
        }
    }
}

pub(crate) fn progress_bar(len: usize, enabled: bool, message: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn stored(path: &Path, bytes: &[u8]) -> StoredFile {
        fs::write(path, bytes).unwrap();
        StoredFile::from_path(path).unwrap()
    }

    #[test]
    fn test_cull_counts_bytes_and_records_history() {
        let temp_dir = TempDir::new().unwrap();
        let keep = stored(&temp_dir.path().join("keep.jpg"), b"keep");
        let a = stored(&temp_dir.path().join("a.jpg"), b"aaaa");
        let b = stored(&temp_dir.path().join("b.jpg"), b"bbbbbb");
        let history = CullHistory::new(temp_dir.path().join("history.jsonl"));

        let (removed, bytes) = cull(DedupStage::Filename, &keep, &[&a, &b], Some(&history));

        assert_eq!(removed, 2);
        assert_eq!(bytes, 10);
        assert!(keep.path.exists());
        assert!(!a.path.exists());
        assert!(!b.path.exists());

        let records = history.read().unwrap();
        assert_eq!(records.len(), 1);
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.stage, DedupStage::Filename);
        assert_eq!(record.culled.len(), 2);
    }

    #[test]
    fn test_cull_continues_past_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let keep = stored(&temp_dir.path().join("keep.jpg"), b"keep");
        let gone = stored(&temp_dir.path().join("gone.jpg"), b"gone");
        let other = stored(&temp_dir.path().join("other.jpg"), b"other");
        fs::remove_file(&gone.path).unwrap();

        let (removed, bytes) = cull(DedupStage::Perceptual, &keep, &[&gone, &other], None);

        assert_eq!(removed, 1);
        assert_eq!(bytes, 5);
        assert!(!other.path.exists());
    }

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(0), "0.00 MB");
        assert_eq!(format_mb(3 * 1024 * 1024 / 2), "1.50 MB");
    }
}
