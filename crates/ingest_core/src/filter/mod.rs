//! Site filters: the pluggable, per-source selection of eligible documents.
//!
//! A [`FilterRegistry`] holds an ordered list of `(predicate, factory)` pairs.
//! Selection evaluates predicates against the job's base URL in registration
//! order and builds the first match; when nothing matches the identity
//! [`DefaultFilter`] is used. Selection never touches the network.
mod gov_br;

use url::Url;

use crate::{FilterParams, LinkRecord};

pub use gov_br::{FundebVaatFilter, SalarioEducacaoFilter};

/// Chooses which discovered links are documents for a job.
///
/// Implementations must be deterministic for a fixed input.
pub trait SiteFilter: Send + Sync {
    fn name(&self) -> &'static str;

    /// URLs to download, in the order they should be processed.
    fn filter_links(&self, links: &[LinkRecord]) -> Vec<String>;
}

pub type FilterPredicate = Box<dyn Fn(&Url) -> bool + Send + Sync>;
pub type FilterFactory = Box<dyn Fn(&Url, &FilterParams) -> Box<dyn SiteFilter> + Send + Sync>;

/// Identity filter: every link, unchanged and in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFilter;

impl DefaultFilter {
    pub fn new(_base_url: &Url, _params: &FilterParams) -> Self {
        Self
    }
}

impl SiteFilter for DefaultFilter {
    fn name(&self) -> &'static str {
        "default"
    }

    fn filter_links(&self, links: &[LinkRecord]) -> Vec<String> {
        links.iter().map(|link| link.url.clone()).collect()
    }
}

struct RegistryEntry {
    name: &'static str,
    predicate: FilterPredicate,
    factory: FilterFactory,
}

pub struct FilterRegistry {
    entries: Vec<RegistryEntry>,
}

impl FilterRegistry {
    /// A registry with no site-specific filters; everything resolves to [`DefaultFilter`].
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The built-in filters, most specific first.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register(
                "fundeb_vaat",
                FundebVaatFilter::matches,
                |url: &Url, params: &FilterParams| -> Box<dyn SiteFilter> {
                    Box::new(FundebVaatFilter::new(url, params))
                },
            )
            .register(
                "salario_educacao",
                SalarioEducacaoFilter::matches,
                |url: &Url, params: &FilterParams| -> Box<dyn SiteFilter> {
                    Box::new(SalarioEducacaoFilter::new(url, params))
                },
            );
        registry
    }

    /// Appends a filter. Earlier registrations take precedence.
    pub fn register<P, F>(&mut self, name: &'static str, predicate: P, factory: F) -> &mut Self
    where
        P: Fn(&Url) -> bool + Send + Sync + 'static,
        F: Fn(&Url, &FilterParams) -> Box<dyn SiteFilter> + Send + Sync + 'static,
    {
        self.entries.push(RegistryEntry {
            name,
            predicate: Box::new(predicate),
            factory: Box::new(factory),
        });
        self
    }

    pub fn select(&self, base_url: &Url, params: &FilterParams) -> Box<dyn SiteFilter> {
        self.entries
            .iter()
            .find(|entry| (entry.predicate)(base_url))
            .map(|entry| (entry.factory)(base_url, params))
            .unwrap_or_else(|| Box::new(DefaultFilter::new(base_url, params)))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
