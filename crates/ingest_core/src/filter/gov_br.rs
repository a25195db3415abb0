use url::Url;

use super::SiteFilter;
use crate::{FilterParams, LinkRecord};

const VAAT_DEFAULT_HINTS: &[&str] = &["vaat", "listadefinit"];
const SALARIO_DEFAULT_HINT: &str = "DistribuioMensalporUF";

/// FUNDEB / VAAT area of gov.br.
///
/// Picks links whose filename or anchor text carries a hint, or PDFs living
/// under a `vaat` path. Falls back to every PDF, then to every link.
#[derive(Debug, Clone)]
pub struct FundebVaatFilter {
    hints: Vec<String>,
}

impl FundebVaatFilter {
    pub fn new(_base_url: &Url, params: &FilterParams) -> Self {
        let hints = params
            .get_str_list("hints")
            .filter(|hints| !hints.is_empty())
            .unwrap_or_else(|| VAAT_DEFAULT_HINTS.iter().map(|h| h.to_string()).collect());
        Self {
            hints: hints.into_iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    pub fn matches(base_url: &Url) -> bool {
        let path = base_url.path().to_ascii_lowercase();
        path.contains("vaat") || path.contains("/fundeb/")
    }

    fn is_selected(&self, link: &LinkRecord) -> bool {
        let name = link.filename();
        let text = link.anchor_text.to_lowercase();
        if self
            .hints
            .iter()
            .any(|hint| name.contains(hint.as_str()) || text.contains(hint.as_str()))
        {
            return true;
        }
        let path = link.path();
        name.ends_with(".pdf") && (path.contains("/vaat") || path.contains("vaat/"))
    }
}

impl SiteFilter for FundebVaatFilter {
    fn name(&self) -> &'static str {
        "fundeb_vaat"
    }

    fn filter_links(&self, links: &[LinkRecord]) -> Vec<String> {
        let selected: Vec<String> = links
            .iter()
            .filter(|link| self.is_selected(link))
            .map(|link| link.url.clone())
            .collect();
        if !selected.is_empty() {
            return selected;
        }

        let pdfs: Vec<String> = links
            .iter()
            .filter(|link| link.is_pdf())
            .map(|link| link.url.clone())
            .collect();
        if !pdfs.is_empty() {
            return pdfs;
        }

        links.iter().map(|link| link.url.clone()).collect()
    }
}

/// Salário-Educação "consultas" pages on gov.br.
///
/// Matches a configurable substring (`filename_contains`) against the
/// filename or anchor text; returns every link when nothing matches.
#[derive(Debug, Clone)]
pub struct SalarioEducacaoFilter {
    hint: String,
}

impl SalarioEducacaoFilter {
    pub fn new(_base_url: &Url, params: &FilterParams) -> Self {
        let hint = params
            .get_str("filename_contains")
            .unwrap_or_else(|| SALARIO_DEFAULT_HINT.to_string());
        Self {
            hint: hint.to_lowercase(),
        }
    }

    pub fn matches(base_url: &Url) -> bool {
        match base_url.host_str() {
            Some(host) => {
                let host = host.to_ascii_lowercase();
                host == "gov.br" || host.ends_with(".gov.br")
            }
            None => false,
        }
    }
}

impl SiteFilter for SalarioEducacaoFilter {
    fn name(&self) -> &'static str {
        "salario_educacao"
    }

    fn filter_links(&self, links: &[LinkRecord]) -> Vec<String> {
        let selected: Vec<String> = links
            .iter()
            .filter(|link| {
                link.filename().contains(self.hint.as_str())
                    || link.anchor_text.to_lowercase().contains(self.hint.as_str())
            })
            .map(|link| link.url.clone())
            .collect();
        if selected.is_empty() {
            links.iter().map(|link| link.url.clone()).collect()
        } else {
            selected
        }
    }
}
