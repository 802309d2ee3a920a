//! # Search Module
//!
//! Free-text search returning resolved pages, with bounded expansion of
//! disambiguation hits.
//!
//! ## Overview
//!
//! A search issues one list query, then resolves every hit into a page
//! (bounded concurrency, original order preserved). Hits that turn out to be
//! disambiguation pages contribute additional candidate pages up to the
//! requested count. The expansion policy is page-exhaustive in result order:
//! each disambiguation page, in the order search returned it, yields its
//! candidates until the overall cap is reached, skipping addresses that are
//! already part of the result set. Expanded candidates stay lazy and carry
//! the address of the disambiguation page they came from.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::WikiError;
use crate::gateway::WireRequest;
use crate::page::{Page, PageTarget};
use crate::wiki::WikiInner;

/// Builds the list-search request.
pub(crate) fn search_request(query: &str, limit: usize) -> WireRequest {
    let limit_string = limit.to_string();
    WireRequest::api([
        ("list", "search"),
        ("srprop", ""),
        ("srlimit", limit_string.as_str()),
        ("srsearch", query),
    ])
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    query: Option<SearchBody>,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    pageid: u64,
    title: String,
}

pub(crate) async fn run_search(
    inner: &Arc<WikiInner>,
    query: &str,
    limit: usize,
) -> Result<Vec<Page>, WikiError> {
    let response = inner.gateway.call(&search_request(query, limit)).await?;
    let envelope: SearchEnvelope = serde_json::from_value(response.into_json()?)
        .map_err(|e| WikiError::Decode(format!("search response: {e}")))?;
    let hits = envelope
        .query
        .ok_or_else(|| WikiError::Decode("search response has no query body".into()))?
        .search;

    debug!(%query, hits = hits.len(), "search returned");

    // Resolve the direct hits with bounded concurrency, keeping result order.
    // Failures here surface: a hit the source itself returned should resolve.
    let mut pages: Vec<Page> = stream::iter(hits.into_iter().map(|hit| {
        let inner = inner.clone();
        async move {
            let page = Page::new(&inner, PageTarget::Id(hit.pageid), None)?;
            page.resolution().await?;
            trace!(title = %hit.title, "search hit resolved");
            Ok::<Page, WikiError>(page)
        }
    }))
    .buffered(inner.concurrency.max(1))
    .try_collect()
    .await?;

    let mut captured: HashSet<String> = HashSet::new();
    for page in &pages {
        captured.insert(page.address().await?);
    }

    // Page-exhaustive expansion in result order, capped at `limit` total.
    let mut expanded: Vec<Page> = Vec::new();
    for page in &pages {
        if pages.len() + expanded.len() >= limit {
            break;
        }
        if !page.is_disambiguation().await? {
            continue;
        }
        let origin = page.address().await?;
        let candidates = match page.disambiguation_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(page = %origin, error = %e, "failed to read disambiguation candidates");
                continue;
            }
        };
        for candidate in candidates.iter() {
            if pages.len() + expanded.len() >= limit {
                break;
            }
            if !captured.insert(candidate.address.clone()) {
                continue;
            }
            match Page::new(
                inner,
                PageTarget::Address(candidate.address.clone()),
                Some(origin.clone()),
            ) {
                Ok(candidate_page) => expanded.push(candidate_page),
                Err(e) => {
                    warn!(address = %candidate.address, error = %e, "skipping unusable candidate");
                }
            }
        }
    }

    pages.extend(expanded);
    Ok(pages)
}
