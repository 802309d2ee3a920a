//! # Resolution Module
//!
//! Turns a page identifier or title into a canonical, resolved entity.
//!
//! ## Overview
//!
//! A metadata lookup can answer in four mutually exclusive ways: the page is
//! missing, the request redirects to another title, the page is a
//! disambiguation page, or the page resolves normally. The raw response is
//! decoded exactly once into a [`LookupOutcome`]; every later decision works
//! on that tagged value instead of re-probing the payload.
//!
//! The [`Resolver`] drives the lookup loop: redirects re-enter the lookup
//! with the target title (carrying the originating title along) up to a fixed
//! hop bound; missing pages and disabled redirect-following fail immediately;
//! disambiguation is a *terminal* result, and expansion of its candidates is
//! the crawl layer's business, on demand.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::WikiError;
use crate::gateway::{Gateway, WireRequest};

/// Redirect hops tolerated before resolution gives up.
pub const MAX_REDIRECT_HOPS: u32 = 3;

/// Identity of a resolved page.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PageMeta {
    pub id: u64,
    pub title: String,
    /// Canonical article address.
    pub address: String,
    pub namespace: i64,
    pub language: String,
}

/// Terminal result of the resolution loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub meta: PageMeta,
    /// True when the page is a disambiguation page; candidates are derived
    /// lazily from its body, never resolved automatically.
    pub disambiguation: bool,
    /// Title the caller asked for when a redirect was followed.
    pub redirected_from: Option<String>,
}

/// What a single metadata lookup said, decoded once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Missing { identifier: String },
    Redirected { from: String, to: String },
    Found { meta: PageMeta, disambiguation: bool },
}

/// The identifying field a lookup starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupQuery {
    Id(u64),
    Title(String),
}

impl LookupQuery {
    fn identifier(&self) -> String {
        match self {
            LookupQuery::Id(id) => id.to_string(),
            LookupQuery::Title(title) => title.clone(),
        }
    }
}

/// Builds the metadata lookup request for `query`.
pub(crate) fn lookup_request(query: &LookupQuery) -> WireRequest {
    let id_string;
    let mut pairs = vec![
        ("prop", "info|pageprops"),
        ("inprop", "url"),
        ("ppprop", "disambiguation"),
        ("redirects", ""),
    ];
    match query {
        LookupQuery::Id(id) => {
            id_string = id.to_string();
            pairs.push(("pageids", id_string.as_str()));
        }
        LookupQuery::Title(title) => pairs.push(("titles", title.as_str())),
    }
    WireRequest::api(pairs)
}

#[derive(Debug, Deserialize)]
struct Envelope {
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: HashMap<String, PageInfo>,
    #[serde(default)]
    redirects: Vec<RedirectInfo>,
}

#[derive(Debug, Deserialize)]
struct RedirectInfo {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    pageid: Option<u64>,
    title: Option<String>,
    fullurl: Option<String>,
    pagelanguage: Option<String>,
    ns: Option<i64>,
    // Present (as an empty marker) when the page does not exist.
    missing: Option<Value>,
    // Requested with `ppprop=disambiguation`, so presence means exactly that.
    pageprops: Option<Value>,
}

/// Decodes one lookup response into its tagged outcome.
pub(crate) fn classify(response: Value, query: &LookupQuery) -> Result<LookupOutcome, WikiError> {
    let envelope: Envelope = serde_json::from_value(response)
        .map_err(|e| WikiError::Decode(format!("lookup response: {e}")))?;
    let body = envelope
        .query
        .ok_or_else(|| WikiError::Decode("lookup response has no query body".into()))?;

    let page = body
        .pages
        .into_values()
        .next()
        .ok_or_else(|| WikiError::Decode("lookup response has no pages".into()))?;

    if page.missing.is_some() {
        return Ok(LookupOutcome::Missing {
            identifier: page.title.unwrap_or_else(|| query.identifier()),
        });
    }

    if let Some(redirect) = body.redirects.into_iter().next() {
        return Ok(LookupOutcome::Redirected {
            from: redirect.from,
            to: redirect.to,
        });
    }

    let disambiguation = page.pageprops.is_some();
    let meta = PageMeta {
        id: page
            .pageid
            .ok_or_else(|| WikiError::Decode("lookup page has no id".into()))?,
        title: page
            .title
            .ok_or_else(|| WikiError::Decode("lookup page has no title".into()))?,
        address: page
            .fullurl
            .ok_or_else(|| WikiError::Decode("lookup page has no address".into()))?,
        namespace: page.ns.unwrap_or(0),
        language: page.pagelanguage.unwrap_or_default(),
    };
    Ok(LookupOutcome::Found {
        meta,
        disambiguation,
    })
}

/// Drives the lookup loop until a terminal outcome.
pub(crate) struct Resolver<'a> {
    gateway: &'a Gateway,
    follow_redirects: bool,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(gateway: &'a Gateway, follow_redirects: bool) -> Self {
        Resolver {
            gateway,
            follow_redirects,
        }
    }

    pub(crate) async fn resolve(&self, query: LookupQuery) -> Result<Resolution, WikiError> {
        let mut query = query;
        let mut hops = 0u32;
        let mut redirected_from: Option<String> = None;

        loop {
            trace!(?query, hops, "looking up page metadata");
            let response = self.gateway.call(&lookup_request(&query)).await?;
            let outcome = classify(response.into_json()?, &query)?;

            match outcome {
                LookupOutcome::Missing { identifier } => {
                    debug!(%identifier, "page is missing at the source");
                    return Err(WikiError::Page(identifier));
                }
                LookupOutcome::Redirected { from, to } => {
                    if !self.follow_redirects {
                        return Err(WikiError::Redirect(from));
                    }
                    hops += 1;
                    if hops > MAX_REDIRECT_HOPS {
                        return Err(WikiError::RecursionLimit(MAX_REDIRECT_HOPS));
                    }
                    debug!(%from, %to, hops, "following redirect");
                    redirected_from = Some(from);
                    query = LookupQuery::Title(to);
                }
                LookupOutcome::Found {
                    meta,
                    disambiguation,
                } => {
                    trace!(title = %meta.title, disambiguation, "page resolved");
                    return Ok(Resolution {
                        meta,
                        disambiguation,
                        redirected_from,
                    });
                }
            }
        }
    }
}
