use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sweep_logging::sweep_info;

use crate::kv::StoreError;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::store::ProgressStore;

pub const DEFAULT_EXPORT_PREFIX: &str = "records";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub prefix: String,
    pub extension: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            extension: "json".to_string(),
        }
    }
}

impl ExportOptions {
    /// `{prefix}-YYYY-MM-DD.{extension}`
    pub fn filename(&self, date: NaiveDate) -> String {
        format!("{}-{}.{}", self.prefix, date.format("%Y-%m-%d"), self.extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub record_count: usize,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no records to export")]
    Empty,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Writes every stored record as a pretty JSON array into `dir`.
pub fn export_records(
    store: &ProgressStore,
    dir: &Path,
    options: &ExportOptions,
    date: NaiveDate,
) -> Result<ExportSummary, ExportError> {
    let records = store.records()?;
    if records.is_empty() {
        return Err(ExportError::Empty);
    }

    let body = serde_json::to_string_pretty(&records)?;
    let writer = AtomicFileWriter::new(dir.to_path_buf());
    let path = writer.write(&options.filename(date), &body)?;
    sweep_info!("exported {} records to {:?}", records.len(), path);

    Ok(ExportSummary {
        record_count: records.len(),
        path,
    })
}
