use scraper::{ElementRef, Html, Selector};
use sweep_core::LinkRecord;
use url::Url;

/// Path fragment every detail-page address contains.
pub const DETAIL_PATH_MARKER: &str = "/browse/";

/// Listing layouts tried in order; the first one with any match wins.
pub const DEFAULT_LINK_SELECTORS: &[&str] = &[
    r#"[data-testid="issue-navigator.ui.issue-results.detail-view.card-list.card"]"#,
    r#"[data-testid="issue-navigator.ui.issue-results.detail-view.card.card"]"#,
    ".issue-list .issue-link",
    r#"a[href*="/browse/"]"#,
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector {selector:?}: {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

pub(crate) fn compile_selectors(sources: &[String]) -> Result<Vec<Selector>, SelectorError> {
    sources.iter().map(|s| compile_selector(s)).collect()
}

pub(crate) fn compile_selector(source: &str) -> Result<Selector, SelectorError> {
    Selector::parse(source).map_err(|err| SelectorError {
        selector: source.to_string(),
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub selectors: Vec<String>,
    pub path_marker: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            selectors: DEFAULT_LINK_SELECTORS.iter().map(|s| s.to_string()).collect(),
            path_marker: DETAIL_PATH_MARKER.to_string(),
        }
    }
}

/// Finds detail-page links on a listing document.
#[derive(Debug)]
pub struct LinkDiscovery {
    selectors: Vec<Selector>,
    anchor: Selector,
    path_marker: String,
}

impl LinkDiscovery {
    pub fn new(settings: &DiscoverySettings) -> Result<Self, SelectorError> {
        Ok(Self {
            selectors: compile_selectors(&settings.selectors)?,
            anchor: compile_selector("a[href]")?,
            path_marker: settings.path_marker.clone(),
        })
    }

    /// Qualifying links in document order, from the first selector that
    /// matches anything. Candidates without a detail address are skipped; no
    /// matching selector yields an empty sequence.
    pub fn discover<'a>(
        &'a self,
        document: &'a Html,
        base: Option<&'a Url>,
    ) -> impl Iterator<Item = LinkRecord> + 'a {
        let chosen = self
            .selectors
            .iter()
            .find(|selector| document.select(selector).next().is_some());

        chosen
            .into_iter()
            .flat_map(move |selector| document.select(selector))
            .filter_map(move |candidate| self.candidate_href(candidate))
            .filter_map(move |href| resolve_url(href, base))
            .filter(move |url| url.as_str().contains(self.path_marker.as_str()))
            .enumerate()
            .map(|(index, url)| LinkRecord::new(url, index))
    }

    /// Convenience for callers holding raw markup.
    pub fn discover_in(&self, html: &str, base: Option<&Url>) -> Vec<LinkRecord> {
        let document = Html::parse_document(html);
        self.discover(&document, base).collect()
    }

    fn candidate_href<'a>(&self, candidate: ElementRef<'a>) -> Option<&'a str> {
        if candidate.value().name().eq_ignore_ascii_case("a") {
            return candidate.value().attr("href");
        }
        candidate
            .select(&self.anchor)
            .next()
            .and_then(|anchor| anchor.value().attr("href"))
    }
}

fn resolve_url(reference: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#') || lower.starts_with("javascript:") {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) => Some(url.into()),
        Err(_) => base.and_then(|base| base.join(trimmed).ok()).map(Into::into),
    }
}
