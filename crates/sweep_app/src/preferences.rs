//! Operator preferences remembered between invocations.
//!
//! Stored as RON in `<data-dir>/.sweep_prefs.ron`. A missing or unreadable
//! file yields the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sweep_core::{clamp_batch_size, DEFAULT_BATCH_SIZE};
use sweep_engine::{ensure_dir, AtomicFileWriter};
use sweep_logging::{sweep_debug, sweep_error, sweep_warn};

const PREFS_FILENAME: &str = ".sweep_prefs.ron";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Preferences {
    batch_size: usize,
    pub(crate) month: Option<u32>,
    pub(crate) year: Option<i32>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            month: None,
            year: None,
        }
    }
}

impl Preferences {
    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub(crate) fn set_batch_size(&mut self, requested: usize) {
        self.batch_size = clamp_batch_size(requested);
    }
}

pub(crate) fn load_preferences(data_dir: &Path) -> Preferences {
    let path = data_dir.join(PREFS_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Preferences::default();
        }
        Err(err) => {
            sweep_warn!("Failed to read preferences from {:?}: {}", path, err);
            return Preferences::default();
        }
    };

    let mut prefs: Preferences = match ron::from_str(&content) {
        Ok(prefs) => prefs,
        Err(err) => {
            sweep_warn!("Failed to parse preferences from {:?}: {}", path, err);
            return Preferences::default();
        }
    };
    // Hand-edited files may hold anything.
    prefs.set_batch_size(prefs.batch_size);
    if prefs.month.is_some_and(|month| !(1..=12).contains(&month)) {
        prefs.month = None;
    }

    sweep_debug!("Loaded preferences from {:?}", path);
    prefs
}

pub(crate) fn save_preferences(data_dir: &Path, prefs: &Preferences) {
    if let Err(err) = ensure_dir(data_dir) {
        sweep_error!("Failed to ensure data dir {:?}: {}", data_dir, err);
        return;
    }

    let content = match ron::ser::to_string_pretty(prefs, ron::ser::PrettyConfig::new()) {
        Ok(text) => text,
        Err(err) => {
            sweep_error!("Failed to serialize preferences: {}", err);
            return;
        }
    };

    let writer = AtomicFileWriter::new(data_dir.to_path_buf());
    if let Err(err) = writer.write(PREFS_FILENAME, &content) {
        sweep_error!("Failed to write preferences to {:?}: {}", data_dir, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        assert_eq!(load_preferences(temp.path()), Preferences::default());
    }

    #[test]
    fn saved_preferences_load_back() {
        let temp = TempDir::new().unwrap();
        let mut prefs = Preferences::default();
        prefs.set_batch_size(12);
        prefs.month = Some(4);
        prefs.year = Some(2024);

        save_preferences(temp.path(), &prefs);
        assert_eq!(load_preferences(temp.path()), prefs);
    }

    #[test]
    fn out_of_range_values_are_repaired_on_load() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(PREFS_FILENAME),
            "(batch_size: 250, month: Some(13), year: Some(2024))",
        )
        .unwrap();

        let prefs = load_preferences(temp.path());
        assert_eq!(prefs.batch_size(), 20);
        assert_eq!(prefs.month, None);
        assert_eq!(prefs.year, Some(2024));
    }

    #[test]
    fn garbage_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PREFS_FILENAME), "not ron at all {").unwrap();
        assert_eq!(load_preferences(temp.path()), Preferences::default());
    }

    #[test]
    fn batch_size_is_clamped_when_set() {
        let mut prefs = Preferences::default();
        prefs.set_batch_size(0);
        assert_eq!(prefs.batch_size(), 1);
    }
}
