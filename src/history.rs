use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupStage {
    Filename,
    Perceptual,
}

/// One resolved duplicate group: which file survived and which were deleted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CullHistoryRecord {
    pub timestamp: String,
    pub stage: DedupStage,
    pub retained: String,
    pub culled: Vec<String>,
}

impl CullHistoryRecord {
    pub fn now(stage: DedupStage, retained: &Path, culled: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            retained: retained.to_string_lossy().into_owned(),
            culled,
        }
    }
}

/// Append-only JSON lines ledger of deletions.
#[derive(Debug, Clone)]
pub struct CullHistory {
    path: PathBuf,
}

impl CullHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &CullHistoryRecord) -> Result<()> {
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file {:?}", self.path))?;
        writeln!(out, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Every line of the ledger, malformed ones kept as errors so callers can
    /// report and skip them.
    pub fn read(&self) -> Result<Vec<Result<CullHistoryRecord, serde_json::Error>>> {
        let f = File::open(&self.path)
            .with_context(|| format!("Could not open history file {:?}", self.path))?;
        let mut records = Vec::new();
        for line in BufReader::new(f).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line));
        }
        Ok(records)
    }
}
