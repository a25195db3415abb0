use serde::{Deserialize, Serialize};
use url::Url;

/// Document extensions that are ingested directly instead of being crawled for links.
const DIRECT_DOCUMENT_EXTENSIONS: &[&str] = &[".pdf"];

/// One hyperlink found on a listing page, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    pub anchor_text: String,
}

impl LinkRecord {
    pub fn new(url: impl Into<String>, anchor_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anchor_text: anchor_text.into(),
        }
    }

    /// Lower-cased last path segment of the link URL, empty when there is none.
    pub fn filename(&self) -> String {
        url_filename(&self.url)
            .map(|name| name.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Lower-cased URL path, empty when the URL does not parse.
    pub fn path(&self) -> String {
        Url::parse(&self.url)
            .map(|u| u.path().to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn is_pdf(&self) -> bool {
        self.path().ends_with(".pdf")
    }
}

/// Last non-empty path segment of `url`, as it appears in the URL.
pub fn url_filename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(ToOwned::to_owned)
}

/// True when `url` already names a document, so there is no listing page to crawl.
pub fn is_direct_document(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    DIRECT_DOCUMENT_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_last_non_empty_segment() {
        assert_eq!(
            url_filename("https://x.example/a/b/Report.PDF?x=1").as_deref(),
            Some("Report.PDF")
        );
        assert_eq!(url_filename("https://x.example/a/b/").as_deref(), Some("b"));
        assert_eq!(url_filename("https://x.example/"), None);
    }

    #[test]
    fn direct_documents_are_recognized_by_extension() {
        let pdf = Url::parse("https://x.example/files/report.PDF").unwrap();
        let page = Url::parse("https://x.example/files/").unwrap();
        assert!(is_direct_document(&pdf));
        assert!(!is_direct_document(&page));
    }
}
