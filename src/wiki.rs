//! # Wiki Module
//!
//! The client surface: configuration, construction, and the top-level
//! operations (`page`, `search`, `page_graph`).
//!
//! ## Overview
//!
//! [`WikiBuilder`] assembles a [`Wiki`] from its configuration: the backing
//! language host, user agent, rate-limit spacing, redirect policy, optional
//! memoizing cache, and the crawl defaults. Validation happens once at
//! `build()`. A `Wiki` is a cheap handle over shared state; clones observe
//! the same gateway, statistics, and cancellation flag.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wikigraph::{PageTarget, Wiki};
//!
//! let wiki = Wiki::builder()
//!     .language("en")
//!     .rate_limit_wait(std::time::Duration::from_millis(50))
//!     .build()?;
//!
//! let page = wiki.page(PageTarget::Title("Rust (programming language)".into())).await?;
//! println!("{}", page.summary().await?);
//!
//! let graph = wiki.page_graph(PageTarget::Title("Graph theory".into()), Some(1)).await?;
//! println!("{}", graph.to_json_string()?);
//! ```

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::cache::{ResponseStore, ValidityCheck};
use crate::crawler::{CancelHandle, Crawler};
use crate::error::WikiError;
use crate::gateway::{Gateway, HttpTransport, Transport};
use crate::graph::PageGraph;
use crate::page::{Page, PageTarget};
use crate::search;
use crate::stats::StatCollector;

const DEFAULT_USER_AGENT: &str = concat!(
    "wikigraph/",
    env!("CARGO_PKG_VERSION"),
    " (https://crates.io/crates/wikigraph)"
);

/// Shared state behind a [`Wiki`] handle.
pub(crate) struct WikiInner {
    pub(crate) gateway: Gateway,
    pub(crate) redirect: bool,
    pub(crate) language: String,
    pub(crate) max_depth: usize,
    pub(crate) concurrency: usize,
    pub(crate) stats: Arc<StatCollector>,
    pub(crate) cancel: CancelHandle,
}

/// Configures and builds a [`Wiki`].
pub struct WikiBuilder {
    language: String,
    user_agent: String,
    rate_limit_wait: Duration,
    request_timeout: Duration,
    redirect: bool,
    max_depth: usize,
    concurrency: usize,
    response_store: Option<Arc<dyn ResponseStore>>,
    validity: Option<ValidityCheck>,
    transport: Option<Arc<dyn Transport>>,
    cancel: Option<CancelHandle>,
}

impl Default for WikiBuilder {
    fn default() -> Self {
        WikiBuilder {
            language: "en".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit_wait: Duration::from_millis(10),
            request_timeout: Duration::from_secs(10),
            redirect: true,
            max_depth: 1,
            concurrency: num_cpus::get().min(4),
            response_store: None,
            validity: None,
            transport: None,
            cancel: None,
        }
    }
}

impl WikiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Language code selecting the backing host, e.g. `"en"` or `"de"`.
    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_lowercase();
        self
    }

    /// User-Agent header sent with every request.
    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Minimum spacing between outbound requests. Zero disables throttling.
    pub fn rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    /// Per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Whether redirects are followed during resolution.
    pub fn redirect(mut self, follow: bool) -> Self {
        self.redirect = follow;
        self
    }

    /// Default depth bound for [`Wiki::page_graph`].
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Worker pool size for crawl and search fan-out. Must be non-zero.
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    /// Enables response memoization with the given store.
    pub fn response_store(mut self, store: Arc<dyn ResponseStore>) -> Self {
        self.response_store = Some(store);
        self
    }

    /// Predicate deciding whether a memoized response may be served.
    pub fn validity(mut self, check: ValidityCheck) -> Self {
        self.validity = Some(check);
        self
    }

    /// Substitutes the network transport. Mainly useful in tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares an externally owned cancellation handle.
    pub fn cancel_with(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<Wiki, WikiError> {
        if self.concurrency == 0 {
            return Err(WikiError::Config("concurrency must be greater than 0".into()));
        }
        if self.language.is_empty()
            || !self
                .language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(WikiError::Config(format!(
                "'{}' is not a usable language code",
                self.language
            )));
        }

        let endpoint = Url::parse(&format!("https://{}.wikipedia.org/w/api.php", self.language))
            .map_err(|e| WikiError::Config(format!("api endpoint: {e}")))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        let stats = Arc::new(StatCollector::new());
        let gateway = Gateway::new(
            transport,
            endpoint,
            self.user_agent,
            self.request_timeout,
            self.rate_limit_wait,
            self.response_store,
            self.validity,
            stats.clone(),
        );

        Ok(Wiki {
            inner: Arc::new(WikiInner {
                gateway,
                redirect: self.redirect,
                language: self.language,
                max_depth: self.max_depth,
                concurrency: self.concurrency,
                stats,
                cancel: self.cancel.unwrap_or_default(),
            }),
        })
    }
}

/// Handle to a configured wiki backend.
#[derive(Clone)]
pub struct Wiki {
    inner: Arc<WikiInner>,
}

impl Wiki {
    pub fn builder() -> WikiBuilder {
        WikiBuilder::new()
    }

    pub(crate) fn inner(&self) -> &Arc<WikiInner> {
        &self.inner
    }

    /// The configured language code.
    pub fn language(&self) -> &str {
        &self.inner.language
    }

    /// The API endpoint all queries go to.
    pub fn api_endpoint(&self) -> &Url {
        self.inner.gateway.endpoint()
    }

    /// Shared statistics for this handle and all its clones.
    pub fn stats(&self) -> Arc<StatCollector> {
        self.inner.stats.clone()
    }

    /// The cancellation handle observed by crawls on this wiki.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.inner.cancel.clone()
    }

    /// Resolves `target` into a page, surfacing resolution failures here.
    ///
    /// Content, links, and extracts stay lazy; only the metadata lookup (and,
    /// for address targets, the one body fetch it needs) is forced.
    pub async fn page(&self, target: PageTarget) -> Result<Page, WikiError> {
        let page = Page::new(&self.inner, target, None)?;
        page.resolution().await?;
        Ok(page)
    }

    /// Free-text search returning up to `limit` pages, disambiguation hits
    /// expanded into candidates.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Page>, WikiError> {
        search::run_search(&self.inner, query, limit).await
    }

    /// Crawls the link graph from `target` up to `max_depth` (falling back to
    /// the configured default). Cancellation yields the partial graph.
    pub async fn page_graph(
        &self,
        target: PageTarget,
        max_depth: Option<usize>,
    ) -> Result<PageGraph, WikiError> {
        let seed = Arc::new(self.page(target).await?);
        let crawler = Crawler::new(
            self.inner.clone(),
            max_depth.unwrap_or(self.inner.max_depth),
            self.inner.concurrency,
        );
        crawler.run(seed).await
    }
}

impl std::fmt::Debug for Wiki {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wiki")
            .field("language", &self.inner.language)
            .field("endpoint", &self.inner.gateway.endpoint().as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{lookup_request, LookupQuery};
    use crate::testing::{lookup_missing, ScriptedTransport};
    use crate::gateway::WireResponse;

    #[test]
    fn endpoint_follows_the_language() {
        let wiki = Wiki::builder()
            .language("DE")
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap();
        assert_eq!(wiki.language(), "de");
        assert_eq!(
            wiki.api_endpoint().as_str(),
            "https://de.wikipedia.org/w/api.php"
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = Wiki::builder()
            .concurrency(0)
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, WikiError::Config(_)));
    }

    #[test]
    fn unusable_language_codes_are_rejected() {
        let err = Wiki::builder()
            .language("not a language")
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, WikiError::Config(_)));
    }

    #[tokio::test]
    async fn page_surfaces_resolution_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            &lookup_request(&LookupQuery::Title("Ghost".to_string())),
            WireResponse::Json(lookup_missing("Ghost")),
        );
        let wiki = Wiki::builder()
            .rate_limit_wait(Duration::ZERO)
            .transport(transport)
            .build()
            .unwrap();

        let err = wiki
            .page(PageTarget::Title("Ghost".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::Page(id) if id == "Ghost"));
    }

    #[test]
    fn clones_share_statistics() {
        let wiki = Wiki::builder()
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap();
        let clone = wiki.clone();
        wiki.stats().increment_nodes_inserted();
        assert_eq!(
            clone
                .stats()
                .nodes_inserted
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
