//! # Page Module
//!
//! A resolved content entity, backed by a [`LazyStore`].
//!
//! ## Overview
//!
//! A `Page` is created from one identifying field (id, title, or address) and
//! nothing else. Every other attribute (the resolved metadata, the document
//! body, outbound links, the summary and content extracts) is a store entry
//! that materializes on first access, pulling exactly the requests it needs
//! through the gateway. Resolution failures therefore surface at the access
//! that first requires them.
//!
//! Pages created from an address first fetch the document once and scan the
//! article id out of the body, so address entry costs no extra metadata
//! round-trip. The mobile host variant is normalized to the canonical one
//! before anything is fetched.
//!
//! Once a crawl references a page it is never mutated; resolving a different
//! address always creates a new entity.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::WikiError;
use crate::extract::{self, LinkRef, LinkSet};
use crate::gateway::WireRequest;
use crate::resolve::{LookupQuery, Resolution, Resolver};
use crate::store::{LazyStore, StoreMode};
use crate::wiki::WikiInner;

/// The identifying field a page is created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTarget {
    /// Opaque stable page id.
    Id(u64),
    /// Human title, subject to redirect and disambiguation handling.
    Title(String),
    /// Article address; the mobile variant is accepted and normalized.
    Address(String),
}

impl std::fmt::Display for PageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageTarget::Id(id) => write!(f, "id:{id}"),
            PageTarget::Title(title) => write!(f, "title:{title}"),
            PageTarget::Address(address) => write!(f, "address:{address}"),
        }
    }
}

/// Content-level data fetched alongside the plain-text extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBundle {
    pub extract: String,
    pub revision_id: u64,
    pub parent_id: u64,
}

/// A single resolved page.
pub struct Page {
    store: LazyStore,
    origin: PageTarget,
    disambiguation_origin: Option<String>,
}

impl Page {
    /// Creates a lazily-resolved page for `target`.
    pub(crate) fn new(
        inner: &Arc<WikiInner>,
        target: PageTarget,
        disambiguation_origin: Option<String>,
    ) -> Result<Self, WikiError> {
        let store = LazyStore::new(StoreMode::Unsafe);
        store.insert("redirect", inner.redirect)?;

        match &target {
            PageTarget::Id(id) => {
                store.insert("origin_id", *id)?;
                declare_resolution(&store, inner)?;
            }
            PageTarget::Title(title) => {
                store.insert("origin_title", title.clone())?;
                declare_resolution_by_title(&store, inner)?;
            }
            PageTarget::Address(address) => {
                let url = extract::normalize_address(address)?;
                store.insert("origin_address", url.to_string())?;
                declare_origin_body(&store, inner)?;
                declare_id_scan(&store)?;
                declare_resolution(&store, inner)?;
            }
        }

        declare_projections(&store)?;
        declare_body(&store, inner, matches!(target, PageTarget::Address(_)))?;
        declare_links(&store)?;
        declare_summary_and_content(&store, inner)?;

        Ok(Page {
            store,
            origin: target,
            disambiguation_origin,
        })
    }

    /// The identifying field this page was created from.
    pub fn origin(&self) -> &PageTarget {
        &self.origin
    }

    /// Address of the disambiguation page this page was discovered on, if any.
    pub fn disambiguation_origin(&self) -> Option<&str> {
        self.disambiguation_origin.as_deref()
    }

    /// The terminal resolution for this page, forcing the lookup if needed.
    pub async fn resolution(&self) -> Result<Arc<Resolution>, WikiError> {
        self.store.get_arc::<Resolution>("search_result").await
    }

    pub async fn id(&self) -> Result<u64, WikiError> {
        self.store.get::<u64>("id").await
    }

    pub async fn title(&self) -> Result<String, WikiError> {
        self.store.get::<String>("title").await
    }

    /// Canonical article address.
    pub async fn address(&self) -> Result<String, WikiError> {
        self.store.get::<String>("address").await
    }

    pub async fn namespace(&self) -> Result<i64, WikiError> {
        self.store.get::<i64>("namespace").await
    }

    pub async fn language(&self) -> Result<String, WikiError> {
        self.store.get::<String>("language").await
    }

    /// Title the caller asked for when a redirect was followed.
    pub async fn redirected_from(&self) -> Result<Option<String>, WikiError> {
        self.store.get::<Option<String>>("redirected_from").await
    }

    pub async fn is_disambiguation(&self) -> Result<bool, WikiError> {
        self.store.get::<bool>("is_disambiguation").await
    }

    /// The fetched document body.
    pub async fn body(&self) -> Result<Arc<String>, WikiError> {
        self.store.get_arc::<String>("body").await
    }

    /// Outbound links, deduplicated and partitioned internal/external.
    pub async fn links(&self) -> Result<Arc<LinkSet>, WikiError> {
        self.store.get_arc::<LinkSet>("links").await
    }

    /// Candidate links of a disambiguation page; empty for ordinary pages.
    pub async fn disambiguation_candidates(&self) -> Result<Arc<Vec<LinkRef>>, WikiError> {
        self.store
            .get_arc::<Vec<LinkRef>>("disambiguation_candidates")
            .await
    }

    /// Intro extract of the page.
    pub async fn summary(&self) -> Result<String, WikiError> {
        self.store.get::<String>("summary").await
    }

    /// Full plain-text extract plus revision ids.
    pub async fn content(&self) -> Result<Arc<ContentBundle>, WikiError> {
        self.store.get_arc::<ContentBundle>("content").await
    }

    /// Plain-text extract; a projection of [`content`](Self::content).
    pub async fn extract(&self) -> Result<String, WikiError> {
        self.store.get::<String>("extract").await
    }

    pub async fn revision_id(&self) -> Result<u64, WikiError> {
        self.store.get::<u64>("revision_id").await
    }

    pub async fn parent_id(&self) -> Result<u64, WikiError> {
        self.store.get::<u64>("parent_id").await
    }

    /// Addresses a crawl would expand from this page: internal links that
    /// pass the content filter.
    pub async fn child_addresses(&self) -> Result<Vec<String>, WikiError> {
        Ok(self.links().await?.content_addresses())
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("origin", &self.origin)
            .field("store", &self.store)
            .finish()
    }
}

/// Builds the intro-extract request for a page id.
pub(crate) fn summary_request(id: u64) -> WireRequest {
    let id_string = id.to_string();
    WireRequest::api([
        ("prop", "extracts"),
        ("explaintext", ""),
        ("exintro", ""),
        ("pageids", id_string.as_str()),
    ])
}

/// Builds the content request (full extract + revision ids) for a page id.
pub(crate) fn content_request(id: u64) -> WireRequest {
    let id_string = id.to_string();
    WireRequest::api([
        ("prop", "extracts|revisions"),
        ("explaintext", ""),
        ("rvprop", "ids"),
        ("pageids", id_string.as_str()),
    ])
}

fn page_object(value: &Value, id: u64) -> Result<Value, WikiError> {
    value
        .get("query")
        .and_then(|q| q.get("pages"))
        .and_then(|p| p.get(id.to_string()))
        .cloned()
        .ok_or_else(|| WikiError::Decode(format!("no page object for id {id}")))
}

fn declare_resolution(store: &LazyStore, inner: &Arc<WikiInner>) -> Result<(), WikiError> {
    let inner = inner.clone();
    store.derive(
        "search_result",
        &["origin_id", "redirect"],
        true,
        move |inputs| {
            let inner = inner.clone();
            Box::pin(async move {
                let id = inputs.value::<u64>("origin_id")?;
                let redirect = inputs.value::<bool>("redirect")?;
                let resolver = Resolver::new(&inner.gateway, *redirect);
                match resolver.resolve(LookupQuery::Id(*id)).await {
                    Ok(resolution) => {
                        inner.stats.increment_pages_resolved();
                        Ok(LazyStore::wrap(resolution))
                    }
                    Err(e) => {
                        inner.stats.increment_pages_failed();
                        Err(e)
                    }
                }
            })
        },
    )
}

fn declare_resolution_by_title(store: &LazyStore, inner: &Arc<WikiInner>) -> Result<(), WikiError> {
    let inner = inner.clone();
    store.derive(
        "search_result",
        &["origin_title", "redirect"],
        true,
        move |inputs| {
            let inner = inner.clone();
            Box::pin(async move {
                let title = inputs.value::<String>("origin_title")?;
                let redirect = inputs.value::<bool>("redirect")?;
                let resolver = Resolver::new(&inner.gateway, *redirect);
                match resolver.resolve(LookupQuery::Title((*title).clone())).await {
                    Ok(resolution) => {
                        inner.stats.increment_pages_resolved();
                        Ok(LazyStore::wrap(resolution))
                    }
                    Err(e) => {
                        inner.stats.increment_pages_failed();
                        Err(e)
                    }
                }
            })
        },
    )
}

fn declare_origin_body(store: &LazyStore, inner: &Arc<WikiInner>) -> Result<(), WikiError> {
    let inner = inner.clone();
    store.derive("origin_body", &["origin_address"], true, move |inputs| {
        let inner = inner.clone();
        Box::pin(async move {
            let address = inputs.value::<String>("origin_address")?;
            let url = Url::parse(&address)
                .map_err(|e| WikiError::InvalidTarget(format!("{address}: {e}")))?;
            let response = inner.gateway.call(&WireRequest::raw(url)).await?;
            Ok(LazyStore::wrap(response.into_html()?))
        })
    })
}

fn declare_id_scan(store: &LazyStore) -> Result<(), WikiError> {
    store.derive(
        "origin_id",
        &["origin_address", "origin_body"],
        true,
        |inputs| {
            Box::pin(async move {
                let address = inputs.value::<String>("origin_address")?;
                let body = inputs.value::<String>("origin_body")?;
                extract::article_id(&body)
                    .map(LazyStore::wrap)
                    .ok_or_else(|| WikiError::Page((*address).clone()))
            })
        },
    )
}

fn declare_projections(store: &LazyStore) -> Result<(), WikiError> {
    store.derive("address", &["search_result"], false, |inputs| {
        Box::pin(async move {
            let resolution = inputs.value::<Resolution>("search_result")?;
            Ok(LazyStore::wrap(resolution.meta.address.clone()))
        })
    })?;
    store.derive("id", &["search_result"], false, |inputs| {
        Box::pin(async move {
            let resolution = inputs.value::<Resolution>("search_result")?;
            Ok(LazyStore::wrap(resolution.meta.id))
        })
    })?;
    store.derive("title", &["search_result"], false, |inputs| {
        Box::pin(async move {
            let resolution = inputs.value::<Resolution>("search_result")?;
            Ok(LazyStore::wrap(resolution.meta.title.clone()))
        })
    })?;
    store.derive("namespace", &["search_result"], false, |inputs| {
        Box::pin(async move {
            let resolution = inputs.value::<Resolution>("search_result")?;
            Ok(LazyStore::wrap(resolution.meta.namespace))
        })
    })?;
    store.derive("language", &["search_result"], false, |inputs| {
        Box::pin(async move {
            let resolution = inputs.value::<Resolution>("search_result")?;
            Ok(LazyStore::wrap(resolution.meta.language.clone()))
        })
    })?;
    store.derive("redirected_from", &["search_result"], false, |inputs| {
        Box::pin(async move {
            let resolution = inputs.value::<Resolution>("search_result")?;
            Ok(LazyStore::wrap(resolution.redirected_from.clone()))
        })
    })?;
    store.derive("is_disambiguation", &["search_result"], false, |inputs| {
        Box::pin(async move {
            let resolution = inputs.value::<Resolution>("search_result")?;
            Ok(LazyStore::wrap(resolution.disambiguation))
        })
    })?;
    store.derive("base_url", &["address"], false, |inputs| {
        Box::pin(async move {
            let address = inputs.value::<String>("address")?;
            let base = match address.find("/wiki/") {
                Some(cut) => address[..cut].to_string(),
                None => {
                    let url = Url::parse(&address)
                        .map_err(|e| WikiError::Decode(format!("{address}: {e}")))?;
                    url.origin().ascii_serialization()
                }
            };
            Ok(LazyStore::wrap(base))
        })
    })?;
    Ok(())
}

fn declare_body(
    store: &LazyStore,
    inner: &Arc<WikiInner>,
    from_address: bool,
) -> Result<(), WikiError> {
    if from_address {
        // The document fetched for the id scan doubles as the body.
        store.derive("body", &["origin_body"], false, |inputs| {
            Box::pin(async move {
                let body = inputs.value::<String>("origin_body")?;
                Ok(LazyStore::wrap((*body).clone()))
            })
        })
    } else {
        let inner = inner.clone();
        store.derive("body", &["address"], true, move |inputs| {
            let inner = inner.clone();
            Box::pin(async move {
                let address = inputs.value::<String>("address")?;
                let url = Url::parse(&address)
                    .map_err(|e| WikiError::Decode(format!("{address}: {e}")))?;
                let response = inner.gateway.call(&WireRequest::raw(url)).await?;
                Ok(LazyStore::wrap(response.into_html()?))
            })
        })
    }
}

fn declare_links(store: &LazyStore) -> Result<(), WikiError> {
    store.derive("links", &["body", "base_url"], true, |inputs| {
        Box::pin(async move {
            let body = inputs.value::<String>("body")?;
            let base_url = inputs.value::<String>("base_url")?;
            let base = Url::parse(&base_url)
                .map_err(|e| WikiError::Decode(format!("{base_url}: {e}")))?;
            Ok(LazyStore::wrap(extract::link_set(&body, &base)))
        })
    })?;

    store.derive(
        "disambiguation_candidates",
        &["is_disambiguation", "links"],
        true,
        |inputs| {
            Box::pin(async move {
                let is_disambiguation = inputs.value::<bool>("is_disambiguation")?;
                let candidates: Vec<LinkRef> = if *is_disambiguation {
                    let links = inputs.value::<LinkSet>("links")?;
                    links
                        .internal
                        .iter()
                        .filter(|link| extract::is_content_link(&link.address))
                        .cloned()
                        .collect()
                } else {
                    Vec::new()
                };
                Ok(LazyStore::wrap(candidates))
            })
        },
    )?;
    Ok(())
}

fn declare_summary_and_content(store: &LazyStore, inner: &Arc<WikiInner>) -> Result<(), WikiError> {
    let inner_summary = inner.clone();
    store.derive("summary", &["id"], true, move |inputs| {
        let inner = inner_summary.clone();
        Box::pin(async move {
            let id = inputs.value::<u64>("id")?;
            let response = inner.gateway.call(&summary_request(*id)).await?;
            let page = page_object(&response.into_json()?, *id)?;
            let extract = page
                .get("extract")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(LazyStore::wrap(extract))
        })
    })?;

    let inner_content = inner.clone();
    store.derive("content", &["id"], true, move |inputs| {
        let inner = inner_content.clone();
        Box::pin(async move {
            let id = inputs.value::<u64>("id")?;
            let response = inner.gateway.call(&content_request(*id)).await?;
            let page = page_object(&response.into_json()?, *id)?;
            let extract = page
                .get("extract")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let revision = page
                .get("revisions")
                .and_then(|r| r.get(0))
                .ok_or_else(|| WikiError::Decode(format!("no revisions for page {id}")))?;
            let revision_id = revision.get("revid").and_then(Value::as_u64).unwrap_or(0);
            let parent_id = revision.get("parentid").and_then(Value::as_u64).unwrap_or(0);
            Ok(LazyStore::wrap(ContentBundle {
                extract,
                revision_id,
                parent_id,
            }))
        })
    })?;

    store.derive("extract", &["content"], false, |inputs| {
        Box::pin(async move {
            let content = inputs.value::<ContentBundle>("content")?;
            Ok(LazyStore::wrap(content.extract.clone()))
        })
    })?;
    store.derive("revision_id", &["content"], false, |inputs| {
        Box::pin(async move {
            let content = inputs.value::<ContentBundle>("content")?;
            Ok(LazyStore::wrap(content.revision_id))
        })
    })?;
    store.derive("parent_id", &["content"], false, |inputs| {
        Box::pin(async move {
            let content = inputs.value::<ContentBundle>("content")?;
            Ok(LazyStore::wrap(content.parent_id))
        })
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::lookup_request;
    use crate::testing::{
        article_body, content_payload, lookup_resolved, summary_payload, ScriptedTransport,
    };
    use crate::wiki::Wiki;
    use crate::gateway::WireResponse;

    const RUST_URL: &str = "https://en.wikipedia.org/wiki/Rust_(programming_language)";

    fn wiki_with(transport: Arc<ScriptedTransport>) -> Wiki {
        Wiki::builder()
            .rate_limit_wait(std::time::Duration::ZERO)
            .transport(transport)
            .build()
            .unwrap()
    }

    fn script_rust_page(transport: &ScriptedTransport) {
        transport.script(
            &lookup_request(&LookupQuery::Id(42)),
            WireResponse::Json(lookup_resolved(42, "Rust (programming language)", RUST_URL, false)),
        );
        transport.script(
            &lookup_request(&LookupQuery::Title("Rust (programming language)".to_string())),
            WireResponse::Json(lookup_resolved(42, "Rust (programming language)", RUST_URL, false)),
        );
        transport.script(
            &WireRequest::raw(Url::parse(RUST_URL).unwrap()),
            WireResponse::Html(article_body(
                42,
                "Rust (programming language)",
                &[
                    ("/wiki/Ada_(programming_language)", "Ada"),
                    ("https://crates.io/", "crates.io"),
                ],
            )),
        );
    }

    #[tokio::test]
    async fn title_entry_resolves_metadata_lazily() {
        let transport = Arc::new(ScriptedTransport::new());
        script_rust_page(&transport);
        let wiki = wiki_with(transport.clone());

        let page = Page::new(
            wiki.inner(),
            PageTarget::Title("Rust (programming language)".to_string()),
            None,
        )
        .unwrap();

        // Nothing is fetched until an attribute is read.
        assert_eq!(transport.calls(), 0);

        assert_eq!(page.id().await.unwrap(), 42);
        assert_eq!(page.address().await.unwrap(), RUST_URL);
        assert_eq!(page.language().await.unwrap(), "en");
        assert!(!page.is_disambiguation().await.unwrap());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn address_entry_scans_the_id_from_one_body_fetch() {
        let transport = Arc::new(ScriptedTransport::new());
        script_rust_page(&transport);
        let wiki = wiki_with(transport.clone());

        let page = Page::new(wiki.inner(), PageTarget::Address(RUST_URL.to_string()), None).unwrap();
        assert_eq!(page.id().await.unwrap(), 42);

        // One raw fetch for the body plus one metadata lookup by the scanned id.
        let raw = WireRequest::raw(Url::parse(RUST_URL).unwrap());
        assert_eq!(transport.calls_for(&raw), 1);
        assert_eq!(transport.calls(), 2);

        // The body entry reuses the fetched document.
        let links = page.links().await.unwrap();
        assert_eq!(transport.calls_for(&raw), 1);
        assert_eq!(links.internal.len(), 1);
        assert_eq!(links.external.len(), 1);
    }

    #[tokio::test]
    async fn mobile_addresses_resolve_through_the_canonical_host() {
        let transport = Arc::new(ScriptedTransport::new());
        script_rust_page(&transport);
        let wiki = wiki_with(transport.clone());

        let mobile = "https://en.m.wikipedia.org/wiki/Rust_(programming_language)";
        let page = Page::new(wiki.inner(), PageTarget::Address(mobile.to_string()), None).unwrap();
        assert_eq!(page.id().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn summary_and_content_come_from_their_own_requests() {
        let transport = Arc::new(ScriptedTransport::new());
        script_rust_page(&transport);
        transport.script(
            &summary_request(42),
            WireResponse::Json(summary_payload(42, "Rust is a language.")),
        );
        transport.script(
            &content_request(42),
            WireResponse::Json(content_payload(42, "Rust is a language. It is fast.", 900, 899)),
        );
        let wiki = wiki_with(transport.clone());

        let page = Page::new(wiki.inner(), PageTarget::Id(42), None).unwrap();
        assert_eq!(page.summary().await.unwrap(), "Rust is a language.");
        assert_eq!(page.extract().await.unwrap(), "Rust is a language. It is fast.");
        assert_eq!(page.revision_id().await.unwrap(), 900);
        assert_eq!(page.parent_id().await.unwrap(), 899);

        // content is materialized once; its projections recompute from it.
        assert_eq!(transport.calls_for(&content_request(42)), 1);
    }

    #[tokio::test]
    async fn disambiguation_is_terminal_and_never_recurses() {
        let transport = Arc::new(ScriptedTransport::new());
        let mercury_url = "https://en.wikipedia.org/wiki/Mercury";
        transport.script(
            &lookup_request(&LookupQuery::Title("Mercury".to_string())),
            WireResponse::Json(lookup_resolved(9, "Mercury", mercury_url, true)),
        );
        transport.script(
            &WireRequest::raw(Url::parse(mercury_url).unwrap()),
            WireResponse::Html(article_body(
                9,
                "Mercury",
                &[
                    ("/wiki/Mercury_(planet)", "Mercury (planet)"),
                    ("/wiki/Mercury_(element)", "Mercury (element)"),
                ],
            )),
        );
        let wiki = wiki_with(transport.clone());

        let page = Page::new(wiki.inner(), PageTarget::Title("Mercury".to_string()), None).unwrap();
        assert!(page.is_disambiguation().await.unwrap());

        let candidates = page.disambiguation_candidates().await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text, "Mercury (planet)");

        // One metadata lookup, one body fetch; the candidates were never
        // resolved into pages of their own.
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn ordinary_pages_have_no_disambiguation_candidates() {
        let transport = Arc::new(ScriptedTransport::new());
        script_rust_page(&transport);
        let wiki = wiki_with(transport.clone());

        let page = Page::new(wiki.inner(), PageTarget::Id(42), None).unwrap();
        assert!(page.disambiguation_candidates().await.unwrap().is_empty());
    }
}
