//! Download the large images referenced by a saved page into per-domain
//! folders, then remove duplicates by file name pattern and by perceptual
//! hash.

pub mod config;
pub mod core;
pub mod error;
pub mod history;
pub mod pipeline;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Capabilities, Pipeline, RunReport, Stage};
