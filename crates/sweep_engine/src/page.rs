use std::time::Duration;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use reqwest::header::CONTENT_TYPE;
use sweep_logging::sweep_debug;
use url::Url;

use crate::{LoadError, LoadFailure};

/// Limits applied while a context loads its document.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Media types a page context agrees to render.
    pub page_types: Vec<String>,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            page_types: vec!["text/html".to_string(), "application/xhtml+xml".to_string()],
        }
    }
}

/// Undecoded document bytes and what the server said about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    /// Address after redirects.
    pub final_address: Url,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Where page contexts get their documents from.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, address: &Url) -> Result<RawPage, LoadError>;
}

/// Loads pages over HTTP with one shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    settings: LoadSettings,
}

impl HttpSource {
    pub fn new(settings: LoadSettings) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| LoadError::new(LoadFailure::Network, err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn renders(&self, content_type: &str) -> bool {
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        self.settings
            .page_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(media_type))
    }

    fn over_cap(&self, seen: u64) -> LoadError {
        LoadError::new(
            LoadFailure::TooLarge {
                max_bytes: self.settings.max_bytes,
                actual: Some(seen),
            },
            "page exceeds the size cap",
        )
    }
}

#[async_trait::async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, address: &Url) -> Result<RawPage, LoadError> {
        let mut response = self
            .client
            .get(address.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::new(
                LoadFailure::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        if let Some(declared) = response.content_length() {
            if declared > self.settings.max_bytes {
                return Err(self.over_cap(declared));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(content_type) = content_type.as_deref() {
            if !self.renders(content_type) {
                return Err(LoadError::new(
                    LoadFailure::NotAPage {
                        content_type: content_type.to_string(),
                    },
                    "not a renderable page",
                ));
            }
        }

        let final_address = response.url().clone();
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            let seen = (bytes.len() + chunk.len()) as u64;
            if seen > self.settings.max_bytes {
                return Err(self.over_cap(seen));
            }
            bytes.extend_from_slice(&chunk);
        }
        sweep_debug!("loaded {} bytes from {}", bytes.len(), final_address);

        Ok(RawPage {
            final_address,
            content_type,
            bytes,
        })
    }
}

fn classify(err: reqwest::Error) -> LoadError {
    let kind = if err.is_timeout() {
        LoadFailure::Timeout
    } else if err.is_redirect() {
        LoadFailure::TooManyRedirects
    } else {
        LoadFailure::Network
    };
    LoadError::new(kind, err.to_string())
}

/// A decoded document as seen by a page context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    /// Address after redirects; relative links resolve against it.
    pub address: Url,
    pub html: String,
    pub encoding: String,
}

/// Fetch and decode `address`.
pub async fn load_page(source: &dyn PageSource, address: &str) -> Result<LoadedPage, LoadError> {
    let address = Url::parse(address)
        .map_err(|err| LoadError::new(LoadFailure::InvalidAddress, err.to_string()))?;
    let raw = source.fetch(&address).await?;
    let (html, encoding) = decode_html(&raw.bytes, raw.content_type.as_deref())?;
    Ok(LoadedPage {
        address: raw.final_address,
        html,
        encoding,
    })
}

/// Decode raw bytes into UTF-8 using: BOM -> Content-Type charset -> chardetng guess.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<(String, String), LoadError> {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            content_type
                .and_then(charset_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(LoadError::new(
            LoadFailure::Decode {
                encoding: encoding.name().to_string(),
            },
            "malformed byte sequence",
        ));
    }
    Ok((text.into_owned(), encoding.name().to_string()))
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim_matches([' ', '"', '\'']).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_is_read_case_insensitively() {
        assert_eq!(
            charset_label("text/html; Charset=\"ISO-8859-1\"").as_deref(),
            Some("ISO-8859-1")
        );
        assert_eq!(charset_label("text/html"), None);
    }

    #[test]
    fn bom_wins_over_header() {
        let (html, encoding) = decode_html(b"\xEF\xBB\xBFhello", Some("text/html; charset=ISO-8859-1")).unwrap();
        assert_eq!(html, "hello");
        assert_eq!(encoding, "UTF-8");
    }

    #[test]
    fn header_charset_is_applied() {
        let (html, _) = decode_html(b"caf\xe9", Some("text/html; charset=ISO-8859-1")).unwrap();
        assert_eq!(html, "caf\u{e9}");
    }

    #[test]
    fn media_type_parameters_are_ignored() {
        let source = HttpSource::new(LoadSettings::default()).unwrap();
        assert!(source.renders("TEXT/HTML; charset=utf-8"));
        assert!(!source.renders("application/json"));
    }
}
