//! Listing addresses scoped to a calendar month.
//!
//! The listing view filters by due date with offsets relative to "now"
//! (`-2w 3d 4h` style), so the generated address is only valid on the day it
//! is produced.

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use url::Url;

pub const DEFAULT_LISTING_BASE: &str = "https://your-site.atlassian.net/issues/";
pub const DEFAULT_QUERY_PARAM: &str = "jql";
pub const DEFAULT_QUERY_TEMPLATE: &str = "assignee = currentUser() \
AND status IN (\"QA Review\", Done, \"Leader Review\") \
AND due >= \"{start}\" AND due <= \"{end}\" ORDER BY created DESC";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("month must be 1-12, got {0}")]
    InvalidMonth(u32),
    #[error("date out of range for {year}-{month:02}")]
    OutOfRange { year: i32, month: u32 },
    #[error("invalid listing base address: {0}")]
    InvalidBase(#[from] url::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodQuery {
    pub base: String,
    pub param: String,
    /// Query text with `{start}` and `{end}` placeholders.
    pub template: String,
}

impl Default for PeriodQuery {
    fn default() -> Self {
        Self {
            base: DEFAULT_LISTING_BASE.to_string(),
            param: DEFAULT_QUERY_PARAM.to_string(),
            template: DEFAULT_QUERY_TEMPLATE.to_string(),
        }
    }
}

impl PeriodQuery {
    /// Listing address covering `month`/`year`, with offsets relative to `now`.
    pub fn address<Tz: TimeZone>(
        &self,
        month: u32,
        year: i32,
        now: &DateTime<Tz>,
    ) -> Result<Url, PeriodError> {
        let (start, end) = month_range(&now.timezone(), month, year)?;
        let query = self
            .template
            .replace("{start}", &relative_offset(&start, now))
            .replace("{end}", &relative_offset(&end, now));

        let mut url = Url::parse(&self.base)?;
        url.query_pairs_mut().append_pair(&self.param, &query);
        Ok(url)
    }
}

/// From day 2 at 00:00 to the last day at 23:59 of the month, in `tz`.
pub fn month_range<Tz: TimeZone>(
    tz: &Tz,
    month: u32,
    year: i32,
) -> Result<(DateTime<Tz>, DateTime<Tz>), PeriodError> {
    if !(1..=12).contains(&month) {
        return Err(PeriodError::InvalidMonth(month));
    }
    let out_of_range = || PeriodError::OutOfRange { year, month };

    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(out_of_range)?;
    let last_day = first_of_next.pred_opt().ok_or_else(out_of_range)?;
    let start_day = NaiveDate::from_ymd_opt(year, month, 2).ok_or_else(out_of_range)?;

    let start = start_day.and_hms_opt(0, 0, 0).ok_or_else(out_of_range)?;
    let end = last_day.and_hms_opt(23, 59, 0).ok_or_else(out_of_range)?;

    let start = tz.from_local_datetime(&start).earliest().ok_or_else(out_of_range)?;
    let end = tz.from_local_datetime(&end).latest().ok_or_else(out_of_range)?;
    Ok((start, end))
}

/// Signed offset of `target` from `now` as `+1w 2d 3h 4m`; `+0m` when equal.
pub fn relative_offset<Tz: TimeZone>(target: &DateTime<Tz>, now: &DateTime<Tz>) -> String {
    let diff = target.clone().signed_duration_since(now.clone());
    let sign = if diff < Duration::zero() { '-' } else { '+' };
    let total_minutes = diff.num_minutes().unsigned_abs();

    let minutes = total_minutes % 60;
    let hours = (total_minutes / 60) % 24;
    let days_total = total_minutes / (60 * 24);
    let weeks = days_total / 7;
    let days = days_total % 7;

    let mut parts = Vec::new();
    if weeks > 0 {
        parts.push(format!("{weeks}w"));
    }
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if parts.is_empty() {
        parts.push("0m".to_string());
    }
    format!("{sign}{}", parts.join(" "))
}
