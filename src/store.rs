//! Report persistence boundary.
//!
//! The core is write-only towards storage: one insert per completed or
//! failed request. The trait keeps the actual row store external; the
//! bundled implementation appends JSON lines to a file.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::ScoutError;
use crate::results::ProductReport;

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist one finished report.
    async fn persist(&self, report: &ProductReport) -> Result<(), ScoutError>;
}

/// Appends one JSON object per line to a file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSink for JsonlSink {
    async fn persist(&self, report: &ProductReport) -> Result<(), ScoutError> {
        let mut line = serde_json::to_string(report)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        ::log::debug!("report for \"{}\" appended to {}", report.keyword, self.path.display());
        Ok(())
    }
}
