use ingest_core::{ErrorKind, LinkRecord};
use ingest_logging::{ingest_info, ingest_warn};
use scraper::{ElementRef, Html};
use url::Url;

use crate::decode::{decode_html, DecodeError};
use crate::retry::{with_retry, RetryPolicy};
use crate::{FailureKind, FetchError, Fetcher};

const DEFAULT_MAX_LINKS: usize = 5_000;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("listing page is not markup: {0}")]
    Parse(#[from] DecodeError),
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Fetch(FetchError {
                kind: FailureKind::TooLarge { .. },
                ..
            }) => ErrorKind::SizeLimitExceeded,
            LinkError::Fetch(_) => ErrorKind::Fetch,
            LinkError::Parse(_) => ErrorKind::Parse,
        }
    }
}

/// Collects the anchors of one listing page.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    max_links: usize,
}

impl LinkExtractor {
    pub fn new() -> Self {
        Self::with_max_links(DEFAULT_MAX_LINKS)
    }

    pub fn with_max_links(max_links: usize) -> Self {
        Self { max_links }
    }

    /// Every `http(s)` anchor of `html` in page order, resolved against `base_url`.
    ///
    /// Pages with more than `max_links` anchors are cut off with a warning.
    pub fn extract(&self, html: &str, base_url: &Url) -> Vec<LinkRecord> {
        let document = Html::parse_document(html);
        let base = document_base(&document, base_url);

        let mut links: Vec<LinkRecord> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|element| element.value().name().eq_ignore_ascii_case("a"))
            .filter_map(|anchor| {
                let href = anchor.value().attr("href")?;
                let url = resolve_url(href, &base)?;
                Some(LinkRecord::new(url, collapse_text(anchor.text())))
            })
            .collect();
        if links.len() > self.max_links {
            ingest_warn!(
                "{} has {} links, keeping the first {}",
                base_url,
                links.len(),
                self.max_links
            );
            links.truncate(self.max_links);
        }
        links
    }

    /// Fetches `base_url` (with retries) and extracts its links.
    pub async fn fetch_links(
        &self,
        fetcher: &dyn Fetcher,
        base_url: &Url,
        retry: &RetryPolicy,
    ) -> Result<Vec<LinkRecord>, LinkError> {
        let page = with_retry(retry, "listing page fetch", || {
            fetcher.fetch_page(base_url.as_str())
        })
        .await?;
        let decoded = decode_html(&page.bytes, page.metadata.content_type.as_deref())?;
        // Relative links resolve against where the page actually lives.
        let page_url = Url::parse(&page.metadata.final_url).unwrap_or_else(|_| base_url.clone());
        let links = self.extract(&decoded.html, &page_url);
        ingest_info!(
            "Found {} links on {} ({})",
            links.len(),
            base_url,
            decoded.encoding_label
        );
        Ok(links)
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Honors a `<base href>` element when the page declares one.
fn document_base(document: &Html, page_url: &Url) -> Url {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name().eq_ignore_ascii_case("base"))
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn resolve_url(reference: &str, base: &Url) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }
    let url = base.join(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    Some(normalize_url(url).into())
}

/// Drops the fragment and tracking query parameters.
pub fn normalize_url(mut url: Url) -> Url {
    url.set_fragment(None);
    if url.query().is_none() {
        return url;
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_ascii_lowercase().as_str()))
        .collect();

    if kept.len() == pairs.len() {
        return url;
    }
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url
}

fn collapse_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let joined: String = parts.collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}
