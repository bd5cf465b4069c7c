//! Visual duplicate removal.
//!
//! Every JPEG under the download tree is reduced to a perceptual hash: a
//! median threshold over the low frequency DCT coefficients of an 8x8
//! grayscale reduction. Re-encoded or resized copies of the same picture land
//! on the same hash, so files are grouped by exact hash equality and only the
//! copy with the best `(pixel area, byte size)` score survives.

use super::scanner::{ScanOptions, StoredFile, scan_directory};
use super::{DedupReport, cull, progress_bar, run_pooled};
use crate::config::Config;
use crate::history::{CullHistory, DedupStage};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Whether this build can compute perceptual hashes at all.
pub fn is_available() -> bool {
    cfg!(feature = "perceptual")
}

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "perceptual")]
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    pub width: u32,
    pub height: u32,
}

/// Turns an image file into a fingerprint plus its pixel dimensions.
pub trait Fingerprinter: Sync {
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError>;
}

#[cfg(feature = "perceptual")]
pub use hasher::PerceptualHasher;

#[cfg(feature = "perceptual")]
mod hasher {
    use super::{Fingerprint, FingerprintError, Fingerprinter};
    use image::ImageReader;
    use image_hasher::{HashAlg, Hasher, HasherConfig};
    use std::path::Path;

    pub struct PerceptualHasher {
        hasher: Hasher,
    }

    impl PerceptualHasher {
        pub fn new() -> Self {
            let hasher = HasherConfig::new()
                .hash_size(8, 8)
                .preproc_dct()
                .hash_alg(HashAlg::Median)
                .to_hasher();
            Self { hasher }
        }
    }

    impl Default for PerceptualHasher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Fingerprinter for PerceptualHasher {
        fn fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
            let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
            Ok(Fingerprint {
                hash: self.hasher.hash_image(&img).to_base64(),
                width: img.width(),
                height: img.height(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageSample {
    pub file: StoredFile,
    pub fingerprint: Fingerprint,
}

impl ImageSample {
    /// Pixel area first, byte size as the tie break.
    pub fn quality(&self) -> (u64, u64) {
        let area = u64::from(self.fingerprint.width) * u64::from(self.fingerprint.height);
        (area, self.file.size)
    }
}

/// Files sharing one fingerprint, best quality first.
#[derive(Debug, Clone)]
pub struct HashGroup {
    pub hash: String,
    pub members: Vec<ImageSample>,
}

impl HashGroup {
    pub fn retained(&self) -> &ImageSample {
        &self.members[0]
    }

    pub fn redundant(&self) -> &[ImageSample] {
        &self.members[1..]
    }
}

/// Group samples with identical fingerprints. Only groups with more than
/// one member are returned, ordered by hash.
pub fn group_samples(samples: Vec<ImageSample>) -> Vec<HashGroup> {
    let mut map: HashMap<String, Vec<ImageSample>> = HashMap::new();
    for sample in samples {
        map.entry(sample.fingerprint.hash.clone())
            .or_default()
            .push(sample);
    }

    let mut groups: Vec<HashGroup> = map
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(hash, mut members)| {
            members.sort_by(|a, b| {
                b.quality()
                    .cmp(&a.quality())
                    .then_with(|| a.file.path.cmp(&b.file.path))
            });
            HashGroup { hash, members }
        })
        .collect();
    groups.sort_by(|a, b| a.hash.cmp(&b.hash));
    groups
}

pub struct PerceptualDeduplicator<F> {
    fingerprinter: F,
    workers: usize,
    progress: bool,
    history: Option<CullHistory>,
}

#[cfg(feature = "perceptual")]
impl PerceptualDeduplicator<PerceptualHasher> {
    pub fn new(config: &Config) -> Self {
        Self::with_fingerprinter(config, PerceptualHasher::new())
    }
}

impl<F: Fingerprinter> PerceptualDeduplicator<F> {
    pub fn with_fingerprinter(config: &Config, fingerprinter: F) -> Self {
        Self {
            fingerprinter,
            workers: config.workers,
            progress: config.progress,
            history: config
                .record_history
                .then(|| CullHistory::new(config.history_file())),
        }
    }

    /// Hash every JPEG under `root` and drop all but the best copy of each
    /// visual duplicate. Files that cannot be decoded are left alone.
    pub fn run(&self, root: &Path) -> DedupReport {
        let paths = scan_directory(root, &ScanOptions::jpeg());
        let scanned = paths.len();
        if scanned <= 1 {
            log::info!("{} image(s) found, nothing to compare", scanned);
            return DedupReport {
                scanned,
                remaining: scanned,
                ..DedupReport::default()
            };
        }
        log::info!("Analysing {} image files", scanned);

        let bar = progress_bar(scanned, self.progress, "Hashing");
        let samples: Vec<ImageSample> = run_pooled(self.workers, || {
            paths
                .par_iter()
                .filter_map(|path| {
                    let sample = self.sample(path);
                    bar.inc(1);
                    sample
                })
                .collect()
        });
        bar.finish_and_clear();

        let mut report = DedupReport {
            scanned,
            ..DedupReport::default()
        };
        for group in group_samples(samples) {
            report.groups += 1;
            let keep = group.retained();
            log::info!(
                "Duplicate image (hash {}): keeping {}",
                group.hash,
                keep.file.file_name()
            );
            let culled: Vec<&StoredFile> = group.redundant().iter().map(|s| &s.file).collect();
            let (removed, bytes) = cull(
                DedupStage::Perceptual,
                &keep.file,
                &culled,
                self.history.as_ref(),
            );
            report.removed += removed;
            report.bytes_freed += bytes;
        }

        report.remaining = scanned - report.removed;
        report
    }

    fn sample(&self, path: &Path) -> Option<ImageSample> {
        let file = match StoredFile::from_path(path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Cannot process {}: {}", path.display(), e);
                return None;
            }
        };
        match self.fingerprinter.fingerprint(path) {
            Ok(fingerprint) => Some(ImageSample { file, fingerprint }),
            Err(e) => {
                log::warn!("Cannot process {}: {}", path.display(), e);
                None
            }
        }
    }
}
