use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use sweep_core::{or_sentinel, ExtractedRecord, MISSING_FIELD, MISSING_TITLE};

use crate::discovery::{compile_selectors, SelectorError};

/// Per-field selector lists; for each field the first selector that matches
/// an element supplies its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelectors {
    pub title: Vec<String>,
    pub status: Vec<String>,
    pub point_estimate: Vec<String>,
    pub due_date: Vec<String>,
    pub logged_time: Vec<String>,
}

fn owned(sources: &[&str]) -> Vec<String> {
    sources.iter().map(|s| s.to_string()).collect()
}

impl Default for FieldSelectors {
    fn default() -> Self {
        Self {
            title: owned(&[
                r#"[data-testid="issue.views.issue-base.foundation.summary.heading"]"#,
                r#"h1[data-testid*="summary"]"#,
                "h1",
                ".issue-header h1",
            ]),
            status: owned(&[
                r#"[data-testid="issue-field-status.ui.status-view.status-button.status-button"]"#,
            ]),
            point_estimate: owned(&[
                r#"[data-testid="issue-field-story-point-estimate-readview-full.ui.story-point-estimate.badge"]"#,
            ]),
            due_date: owned(&[r#"[data-testid="coloured-due-date.ui.tooltip-container"]"#]),
            logged_time: owned(&[r#"[data-testid="issue.issue-view.common.logged-time.value"]"#]),
        }
    }
}

/// Reads one [`ExtractedRecord`] out of a detail document. Never fails:
/// anything that cannot be found becomes a sentinel.
#[derive(Debug)]
pub struct DetailExtractor {
    title: Vec<Selector>,
    status: Vec<Selector>,
    point_estimate: Vec<Selector>,
    due_date: Vec<Selector>,
    logged_time: Vec<Selector>,
}

impl DetailExtractor {
    pub fn new(fields: &FieldSelectors) -> Result<Self, SelectorError> {
        Ok(Self {
            title: compile_selectors(&fields.title)?,
            status: compile_selectors(&fields.status)?,
            point_estimate: compile_selectors(&fields.point_estimate)?,
            due_date: compile_selectors(&fields.due_date)?,
            logged_time: compile_selectors(&fields.logged_time)?,
        })
    }

    pub fn extract(&self, html: &str, address: &str, captured_at: DateTime<Utc>) -> ExtractedRecord {
        let doc = Html::parse_document(html);
        ExtractedRecord {
            address: address.to_string(),
            title: or_sentinel(first_text(&doc, &self.title), MISSING_TITLE),
            status: or_sentinel(first_text(&doc, &self.status), MISSING_FIELD),
            point_estimate: or_sentinel(first_text(&doc, &self.point_estimate), MISSING_FIELD),
            due_date: or_sentinel(first_text(&doc, &self.due_date), MISSING_FIELD),
            logged_time: or_sentinel(first_text(&doc, &self.logged_time), MISSING_FIELD),
            captured_at,
        }
    }
}

fn first_text(doc: &Html, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .map(|node| node.text().collect::<String>().trim().to_string())
}
