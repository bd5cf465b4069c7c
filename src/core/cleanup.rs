use super::scanner::{ScanOptions, count_files};
use crate::config::Config;
use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name fragments that mark leftovers of earlier runs.
pub const SIDE_FOLDER_MARKERS: [&str; 2] = ["backup", "duplicate"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub existing_images: usize,
    pub removed_dirs: Vec<PathBuf>,
    pub failed_dirs: Vec<PathBuf>,
    /// The old download root is gone (or never existed) and a fresh one was
    /// created.
    pub reset: bool,
}

/// Wipes the download root and backup/duplicate side folders so a run starts
/// from an empty tree.
pub struct Cleanup {
    root: PathBuf,
}

impl Cleanup {
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.download_root.clone(),
        }
    }

    /// Sibling directories of the download root whose name carries one of the
    /// side folder markers. Symlinks and regular files never qualify.
    pub fn side_folders(&self) -> Result<Vec<PathBuf>> {
        let parent = parent_dir(&self.root);
        let root_name = self.root.file_name();
        let mut folders = Vec::new();

        for entry in fs::read_dir(&parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if Some(name.as_os_str()) == root_name {
                continue;
            }
            let lower = name.to_string_lossy().to_lowercase();
            if SIDE_FOLDER_MARKERS.iter().any(|m| lower.contains(m)) {
                folders.push(entry.path());
            }
        }
        folders.sort();
        Ok(folders)
    }

    pub fn run(&self) -> Result<CleanupReport> {
        let existing_images = count_files(&self.root, &ScanOptions::stored_images());
        let side_folders = match self.side_folders() {
            Ok(folders) => folders,
            Err(e) => {
                log::warn!("Could not list side folders of {}: {}", self.root.display(), e);
                Vec::new()
            }
        };

        let mut report = CleanupReport {
            existing_images,
            ..CleanupReport::default()
        };

        if existing_images == 0 && side_folders.is_empty() {
            log::info!("No existing photos or backup folders found");
            fs::create_dir_all(&self.root)?;
            return Ok(report);
        }

        log::info!(
            "Found {} existing photo(s) and {} backup folder(s)",
            existing_images,
            side_folders.len()
        );

        self.remove_dirs(side_folders, &mut report);
        fs::create_dir_all(&self.root)?;
        Ok(report)
    }

    /// Remove the root and every side folder, recording each outcome.
    /// `reset` only holds when nothing is left of the old root.
    fn remove_dirs(&self, side_folders: Vec<PathBuf>, report: &mut CleanupReport) {
        let root_cleared = !self.root.exists() || remove_dir(&self.root, report);
        for folder in side_folders {
            remove_dir(&folder, report);
        }
        report.reset = root_cleared;
    }
}

fn remove_dir(dir: &Path, report: &mut CleanupReport) -> bool {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            log::info!("Removed {}", dir.display());
            report.removed_dirs.push(dir.to_path_buf());
            true
        }
        Err(e) => {
            log::warn!("Failed to remove {}: {}", dir.display(), e);
            report.failed_dirs.push(dir.to_path_buf());
            false
        }
    }
}

fn parent_dir(root: &Path) -> PathBuf {
    match root.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cleanup_for(root: &Path) -> Cleanup {
        Cleanup::new(&Config {
            download_root: root.to_path_buf(),
            ..Config::default()
        })
    }

    #[test]
    fn test_only_marked_siblings_are_removed() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let root = base.join("downloads");
        fs::create_dir_all(root.join("example.com")).unwrap();
        fs::write(root.join("example.com/a.jpg"), b"a").unwrap();
        fs::create_dir_all(base.join("notes")).unwrap();
        fs::create_dir_all(base.join("2024-backup")).unwrap();
        fs::create_dir_all(base.join("Duplicates")).unwrap();
        fs::write(base.join("backup.txt"), b"keep me").unwrap();

        let report = cleanup_for(&root).run().unwrap();

        assert!(report.reset);
        assert!(report.failed_dirs.is_empty());
        assert_eq!(report.removed_dirs.len(), 3);
        assert_eq!(report.existing_images, 1);
        assert!(base.join("notes").exists());
        assert!(base.join("backup.txt").exists());
        assert!(!base.join("2024-backup").exists());
        assert!(!base.join("Duplicates").exists());
        assert!(root.exists());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_side_folder_alone_triggers_reset() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let root = base.join("downloads");
        fs::create_dir_all(root.join("empty.com")).unwrap();
        fs::create_dir_all(base.join("old_backup")).unwrap();

        let report = cleanup_for(&root).run().unwrap();

        assert!(report.reset);
        assert_eq!(report.existing_images, 0);
        assert!(!base.join("old_backup").exists());
        assert!(!root.join("empty.com").exists());
        assert!(root.exists());
    }

    #[test]
    fn test_nothing_to_clean_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let root = base.join("downloads");
        fs::create_dir_all(root.join("keep.com")).unwrap();
        fs::write(root.join("keep.com/readme.txt"), b"x").unwrap();
        fs::create_dir_all(base.join("notes")).unwrap();

        let report = cleanup_for(&root).run().unwrap();

        assert!(!report.reset);
        assert!(report.removed_dirs.is_empty());
        assert!(root.join("keep.com/readme.txt").exists());
        assert!(base.join("notes").exists());
    }

    #[test]
    fn test_failed_root_removal_is_not_a_reset() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        // a regular file where the root should be cannot be removed as a directory
        let root = base.join("downloads");
        fs::write(&root, b"not a directory").unwrap();
        fs::create_dir_all(base.join("old_backup")).unwrap();
        let cleanup = cleanup_for(&root);
        let mut report = CleanupReport::default();

        cleanup.remove_dirs(cleanup.side_folders().unwrap(), &mut report);

        assert!(!report.reset);
        assert_eq!(report.failed_dirs, vec![root.clone()]);
        assert_eq!(report.removed_dirs, vec![base.join("old_backup")]);
        assert!(root.is_file());
    }

    #[test]
    fn test_root_name_with_marker_is_not_a_side_folder() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("photos-backup");
        fs::create_dir_all(&root).unwrap();

        assert!(cleanup_for(&root).side_folders().unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("downloads");

        cleanup_for(&root).run().unwrap();

        assert!(root.is_dir());
    }

    #[test]
    fn test_parent_of_bare_name_is_current_dir() {
        assert_eq!(parent_dir(Path::new("downloads")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/a/downloads")), PathBuf::from("/a"));
    }
}
