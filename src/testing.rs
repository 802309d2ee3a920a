//! Test support: a scripted [`Transport`] and canned API payloads.
//!
//! Only compiled for tests. The scripted transport is keyed by request
//! fingerprint; anything unscripted fails with a transport error, which is
//! also how tests exercise per-child failure handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use url::Url;

use crate::error::WikiError;
use crate::gateway::{Transport, WireRequest, WireResponse};

/// In-memory transport serving pre-scripted responses.
pub(crate) struct ScriptedTransport {
    responses: DashMap<String, WireResponse>,
    total_calls: AtomicUsize,
    calls_by_fingerprint: DashMap<String, usize>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        ScriptedTransport {
            responses: DashMap::new(),
            total_calls: AtomicUsize::new(0),
            calls_by_fingerprint: DashMap::new(),
        }
    }

    /// Scripts `response` for `request`.
    pub(crate) fn script(&self, request: &WireRequest, response: WireResponse) {
        self.responses.insert(request.fingerprint(), response);
    }

    /// Total number of fetches performed.
    pub(crate) fn calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Number of fetches of one particular request.
    pub(crate) fn calls_for(&self, request: &WireRequest) -> usize {
        self.calls_by_fingerprint
            .get(&request.fingerprint())
            .map(|count| *count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(
        &self,
        request: &WireRequest,
        _endpoint: &Url,
        _user_agent: &str,
        _timeout: Duration,
    ) -> Result<WireResponse, WikiError> {
        let fingerprint = request.fingerprint();
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_fingerprint
            .entry(fingerprint.clone())
            .or_insert(0) += 1;
        self.responses
            .get(&fingerprint)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| WikiError::TransientRequest(format!("unscripted request: {fingerprint}")))
    }
}

/// Lookup payload for a page that resolves normally (or as a disambiguation
/// page when `disambiguation` is set).
pub(crate) fn lookup_resolved(id: u64, title: &str, address: &str, disambiguation: bool) -> Value {
    let mut page = json!({
        "pageid": id,
        "title": title,
        "fullurl": address,
        "pagelanguage": "en",
        "ns": 0,
    });
    if disambiguation {
        page["pageprops"] = json!({"disambiguation": ""});
    }
    json!({"query": {"pages": {id.to_string(): page}}})
}

/// Lookup payload reporting a redirect from one title to another.
pub(crate) fn lookup_redirect(from: &str, to: &str) -> Value {
    json!({
        "query": {
            "redirects": [{"from": from, "to": to}],
            "pages": {
                "0": {"title": to}
            }
        }
    })
}

/// Lookup payload for a page missing at the source.
pub(crate) fn lookup_missing(title: &str) -> Value {
    json!({
        "query": {
            "pages": {
                "-1": {"title": title, "missing": ""}
            }
        }
    })
}

/// Content payload carrying an extract and revision ids.
pub(crate) fn content_payload(id: u64, extract: &str, revid: u64, parentid: u64) -> Value {
    json!({
        "query": {
            "pages": {
                id.to_string(): {
                    "pageid": id,
                    "extract": extract,
                    "revisions": [{"revid": revid, "parentid": parentid}]
                }
            }
        }
    })
}

/// Summary payload carrying an intro extract.
pub(crate) fn summary_payload(id: u64, extract: &str) -> Value {
    json!({
        "query": {
            "pages": {
                id.to_string(): {"pageid": id, "extract": extract}
            }
        }
    })
}

/// A minimal article body embedding config values and outbound links.
pub(crate) fn article_body(id: u64, title: &str, links: &[(&str, &str)]) -> String {
    let mut anchors = String::new();
    for (href, text) in links {
        anchors.push_str(&format!("<li><a href=\"{href}\">{text}</a></li>"));
    }
    format!(
        "<html><head><script>RLCONF={{\"wgTitle\":\"{title}\",\"wgArticleId\":{id},\
         \"wgPageContentLanguage\":\"en\",\"wgNamespaceNumber\":0,\"wgOther\":1}};</script></head>\
         <body><p>{title} is a page.</p><ul>{anchors}</ul></body></html>"
    )
}

/// Search payload listing hits as (id, title) pairs.
pub(crate) fn search_payload(hits: &[(u64, &str)]) -> Value {
    let entries: Vec<Value> = hits
        .iter()
        .map(|(id, title)| json!({"pageid": id, "title": title, "ns": 0}))
        .collect();
    json!({"query": {"search": entries}})
}
