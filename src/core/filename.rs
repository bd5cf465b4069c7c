use super::scanner::{ScanOptions, StoredFile, count_files, scan_directory};
use super::{DedupReport, cull};
use crate::config::Config;
use crate::history::{CullHistory, DedupStage};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static VARIANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)-cc_ft_(\d+)\.jpg$").expect("variant pattern compiles"));

/// Split `<base>-cc_ft_<resolution>.jpg` into its base and resolution.
pub fn parse_variant(file_name: &str) -> Option<(&str, u64)> {
    let caps = VARIANT_RE.captures(file_name)?;
    let base = caps.get(1)?.as_str();
    let resolution = caps[2].parse().ok()?;
    Some((base, resolution))
}

#[derive(Debug, Clone)]
pub struct Variant {
    pub file: StoredFile,
    pub resolution: u64,
}

/// Resolution variants of one image, best first.
#[derive(Debug, Clone)]
pub struct FilenameGroup {
    pub base: String,
    pub members: Vec<Variant>,
}

impl FilenameGroup {
    pub fn retained(&self) -> &Variant {
        &self.members[0]
    }

    pub fn redundant(&self) -> &[Variant] {
        &self.members[1..]
    }
}

/// Group files by base name. Members are ordered by resolution, highest
/// first; equal resolutions fall back to file name and then full path.
pub fn group_variants(files: Vec<StoredFile>) -> Vec<FilenameGroup> {
    let mut groups: BTreeMap<String, Vec<Variant>> = BTreeMap::new();
    for file in files {
        let name = file.file_name().into_owned();
        let Some((base, resolution)) = parse_variant(&name) else {
            continue;
        };
        groups
            .entry(base.to_string())
            .or_default()
            .push(Variant { file, resolution });
    }

    groups
        .into_iter()
        .map(|(base, mut members)| {
            members.sort_by(|a, b| {
                b.resolution
                    .cmp(&a.resolution)
                    .then_with(|| a.file.file_name().cmp(&b.file.file_name()))
                    .then_with(|| a.file.path.cmp(&b.file.path))
            });
            FilenameGroup { base, members }
        })
        .collect()
}

/// Keeps the highest resolution copy of every `-cc_ft_<n>` variant family.
pub struct FilenameDeduplicator {
    history: Option<CullHistory>,
}

impl FilenameDeduplicator {
    pub fn new(config: &Config) -> Self {
        Self {
            history: config
                .record_history
                .then(|| CullHistory::new(config.history_file())),
        }
    }

    pub fn run(&self, root: &Path) -> DedupReport {
        let paths = scan_directory(root, &ScanOptions::jpg());
        let scanned = paths.len();
        let files: Vec<StoredFile> = paths
            .iter()
            .filter_map(|path| match StoredFile::from_path(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        let mut report = DedupReport {
            scanned,
            ..DedupReport::default()
        };
        for group in group_variants(files) {
            if group.members.len() < 2 {
                continue;
            }
            report.groups += 1;
            let keep = group.retained();
            log::info!(
                "Duplicate group {}: keeping {} ({}px)",
                group.base,
                keep.file.file_name(),
                keep.resolution
            );
            let culled: Vec<&StoredFile> = group.redundant().iter().map(|v| &v.file).collect();
            let (removed, bytes) = cull(
                DedupStage::Filename,
                &keep.file,
                &culled,
                self.history.as_ref(),
            );
            report.removed += removed;
            report.bytes_freed += bytes;
        }

        report.remaining = count_files(root, &ScanOptions::jpg());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn deduplicator(temp_dir: &TempDir) -> FilenameDeduplicator {
        FilenameDeduplicator::new(&Config {
            history_path: Some(temp_dir.path().join("history.jsonl")),
            ..Config::default()
        })
    }

    fn write(dir: &Path, name: &str, bytes: usize) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, vec![7u8; bytes]).unwrap();
        path
    }

    #[test]
    fn test_parse_variant() {
        assert_eq!(parse_variant("x-cc_ft_1152.jpg"), Some(("x", 1152)));
        assert_eq!(
            parse_variant("a-b-cc_ft_1536.jpg"),
            Some(("a-b", 1536))
        );
        assert_eq!(parse_variant("x-cc_ft_1152_1.jpg"), None);
        assert_eq!(parse_variant("x-cc_ft_1152.jpeg"), None);
        assert_eq!(parse_variant("x.jpg"), None);
    }

    #[test]
    fn test_keeps_highest_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("downloads");
        let bucket = root.join("example.com");
        let low = write(&bucket, "x-cc_ft_1152.jpg", 10);
        let high = write(&bucket, "x-cc_ft_1536.jpg", 30);
        let mid = write(&bucket, "x-cc_ft_1344.jpg", 20);
        let other = write(&bucket, "unrelated.jpg", 5);

        let report = deduplicator(&temp_dir).run(&root);

        assert!(high.exists());
        assert!(!low.exists());
        assert!(!mid.exists());
        assert!(other.exists());
        assert_eq!(report.scanned, 4);
        assert_eq!(report.groups, 1);
        assert_eq!(report.removed, 2);
        assert_eq!(report.bytes_freed, 30);
        assert_eq!(report.remaining, 2);
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("downloads");
        let bucket = root.join("a.com");
        write(&bucket, "y-cc_ft_1152.jpg", 10);
        let kept = write(&bucket, "y-cc_ft_1344.jpg", 12);
        let dedup = deduplicator(&temp_dir);

        assert_eq!(dedup.run(&root).removed, 1);
        let before = fs::read(&kept).unwrap();

        let second = dedup.run(&root);
        assert_eq!(second.removed, 0);
        assert_eq!(second.bytes_freed, 0);
        assert_eq!(second.remaining, 1);
        assert_eq!(fs::read(&kept).unwrap(), before);
    }

    #[test]
    fn test_groups_span_domain_folders() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("downloads");
        let kept = write(&root.join("b.com"), "z-cc_ft_1536.jpg", 3);
        let dropped = write(&root.join("a.com"), "z-cc_ft_1152.jpg", 3);

        let report = deduplicator(&temp_dir).run(&root);

        assert_eq!(report.removed, 1);
        assert!(kept.exists());
        assert!(!dropped.exists());
    }

    #[test]
    fn test_equal_resolution_tie_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("downloads");
        let first = write(&root.join("b.com"), "t-cc_ft_1536.jpg", 3);
        let second = write(&root.join("a.com"), "t-cc_ft_1536.jpg", 3);

        deduplicator(&temp_dir).run(&root);

        // same file name, so the path decides
        assert!(second.exists());
        assert!(!first.exists());
    }

    #[test]
    fn test_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let report = deduplicator(&temp_dir).run(&temp_dir.path().join("none"));
        assert_eq!(report, DedupReport::default());
    }
}
