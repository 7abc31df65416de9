use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for a title that could not be located on a detail page.
pub const MISSING_TITLE: &str = "No title found";
/// Placeholder for any other field that could not be located.
pub const MISSING_FIELD: &str = "N/A";

/// One discovered detail-page address.
///
/// `sequence_index` is the position among qualifying links in document order;
/// batch membership is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub address: String,
    pub sequence_index: usize,
    pub visited: bool,
}

impl LinkRecord {
    pub fn new(address: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            address: address.into(),
            sequence_index,
            visited: false,
        }
    }

    /// The same link, flagged as having had a context opened for it.
    pub fn into_visited(self) -> Self {
        Self {
            visited: true,
            ..self
        }
    }
}

/// Fields pulled from one detail page. Every field is always present; fields
/// that were not found hold [`MISSING_TITLE`] or [`MISSING_FIELD`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    pub address: String,
    pub title: String,
    pub status: String,
    pub point_estimate: String,
    pub due_date: String,
    pub logged_time: String,
    pub captured_at: DateTime<Utc>,
}

impl ExtractedRecord {
    /// A record where every field is a sentinel; used when nothing on the page
    /// could be read, including when the page failed to load.
    pub fn placeholder(address: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            title: MISSING_TITLE.to_string(),
            status: MISSING_FIELD.to_string(),
            point_estimate: MISSING_FIELD.to_string(),
            due_date: MISSING_FIELD.to_string(),
            logged_time: MISSING_FIELD.to_string(),
            captured_at,
        }
    }

    /// True when every field except the address is a sentinel.
    pub fn is_placeholder(&self) -> bool {
        self.title == MISSING_TITLE
            && [
                &self.status,
                &self.point_estimate,
                &self.due_date,
                &self.logged_time,
            ]
            .iter()
            .all(|field| field.as_str() == MISSING_FIELD)
    }
}

/// Returns the trimmed text or `fallback` when it is empty.
pub fn or_sentinel(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_fall_back_to_sentinel() {
        assert_eq!(or_sentinel(Some("  ".into()), MISSING_FIELD), "N/A");
        assert_eq!(or_sentinel(None, MISSING_TITLE), "No title found");
        assert_eq!(or_sentinel(Some(" Done ".into()), MISSING_FIELD), "Done");
    }

    #[test]
    fn placeholder_is_detected() {
        let record = ExtractedRecord::placeholder("https://x/browse/A-1", Utc::now());
        assert!(record.is_placeholder());

        let mut partial = record.clone();
        partial.status = "Done".into();
        assert!(!partial.is_placeholder());
    }
}
