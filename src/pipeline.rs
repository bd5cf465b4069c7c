use crate::config::Config;
use crate::core::acquire::{AcquireReport, Acquirer};
use crate::core::cleanup::{Cleanup, CleanupReport};
use crate::core::fetch::{Fetch, HttpFetcher};
use crate::core::filename::FilenameDeduplicator;
use crate::core::scanner::{ScanOptions, count_files};
use crate::core::{DedupReport, extract, perceptual};
use anyhow::{Context, Result};
use serde::Serialize;

/// Pipeline states, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Init,
    Cleaned,
    Extracted,
    Acquired,
    FilenameDeduped,
    HashDeduped,
    Done,
}

/// Optional abilities discovered once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub perceptual: bool,
}

impl Capabilities {
    pub fn discover() -> Self {
        Self {
            perceptual: perceptual::is_available(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub cleanup: Option<CleanupReport>,
    pub urls_found: usize,
    pub acquisition: Option<AcquireReport>,
    pub filename: Option<DedupReport>,
    pub perceptual: Option<DedupReport>,
    pub final_files: usize,
    pub stages: Vec<Stage>,
}

pub struct Pipeline<F> {
    config: Config,
    fetcher: F,
    capabilities: Capabilities,
    stage: Stage,
}

impl Pipeline<HttpFetcher> {
    pub fn new(config: Config) -> Self {
        let fetcher = HttpFetcher::from_config(&config);
        Self::with_fetcher(config, fetcher)
    }
}

impl<F: Fetch> Pipeline<F> {
    pub fn with_fetcher(config: Config, fetcher: F) -> Self {
        Self {
            config,
            fetcher,
            capabilities: Capabilities::discover(),
            stage: Stage::Init,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Run every enabled stage in order. Per-item failures are logged and
    /// counted inside the stages; only failing to prepare the download root
    /// aborts the run.
    pub fn run(mut self) -> Result<RunReport> {
        let mut report = RunReport {
            stages: vec![Stage::Init],
            ..RunReport::default()
        };
        let root = self.config.download_root.clone();

        if self.config.only_remove_duplicates {
            log::info!("Removing filename duplicates only");
            report.filename = Some(FilenameDeduplicator::new(&self.config).run(&root));
            self.advance(Stage::FilenameDeduped, &mut report);
            report.final_files = count_files(&root, &ScanOptions::jpeg());
            self.advance(Stage::Done, &mut report);
            return Ok(report);
        }

        if self.config.skip_cleanup {
            log::info!("Skipping cleanup");
        } else {
            log::info!("Cleaning existing photos");
            let cleaned = Cleanup::new(&self.config)
                .run()
                .with_context(|| format!("Failed to reset {}", root.display()))?;
            report.cleanup = Some(cleaned);
        }
        self.advance(Stage::Cleaned, &mut report);

        let urls = extract::load_urls(&self.config.input, &self.config.size_markers);
        report.urls_found = urls.len();
        log::info!(
            "Found {} large JPG URL(s) in {}",
            urls.len(),
            self.config.input.display()
        );
        self.advance(Stage::Extracted, &mut report);

        if urls.is_empty() {
            log::info!("No URLs found, skipping downloads");
        } else {
            let acquirer = Acquirer::new(&self.config, &self.fetcher);
            let acquired = acquirer.acquire(&urls);
            log::info!(
                "Downloads finished: {} succeeded, {} failed",
                acquired.succeeded,
                acquired.failed
            );
            report.acquisition = Some(acquired);
        }
        self.advance(Stage::Acquired, &mut report);

        if self.config.remove_filename_duplicates {
            log::info!("Removing filename duplicates");
            report.filename = Some(FilenameDeduplicator::new(&self.config).run(&root));
            self.advance(Stage::FilenameDeduped, &mut report);
        }

        if self.config.skip_perceptual_dedup {
            log::info!("Skipping perceptual deduplication");
        } else if !self.capabilities.perceptual {
            log::warn!("Perceptual hashing is not available in this build, skipping deduplication");
        } else {
            log::info!("Removing visual duplicates");
            report.perceptual = self.perceptual_pass(&root);
            self.advance(Stage::HashDeduped, &mut report);
        }

        report.final_files = count_files(&root, &ScanOptions::jpeg());
        self.advance(Stage::Done, &mut report);
        Ok(report)
    }

    #[cfg(feature = "perceptual")]
    fn perceptual_pass(&self, root: &std::path::Path) -> Option<DedupReport> {
        Some(perceptual::PerceptualDeduplicator::new(&self.config).run(root))
    }

    #[cfg(not(feature = "perceptual"))]
    fn perceptual_pass(&self, _root: &std::path::Path) -> Option<DedupReport> {
        None
    }

    fn advance(&mut self, next: Stage, report: &mut RunReport) {
        debug_assert!(next > self.stage, "stage {:?} after {:?}", next, self.stage);
        log::debug!("{:?} -> {:?}", self.stage, next);
        self.stage = next;
        report.stages.push(next);
    }
}
