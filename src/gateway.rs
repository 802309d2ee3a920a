//! # Gateway Module
//!
//! Implements the rate-limited request gateway that carries every outbound
//! call the crate makes.
//!
//! ## Overview
//!
//! The [`Gateway`] owns the single piece of shared network state: the instant
//! the previous call completed. Callers serialize on that slot, sleeping until
//! the configured minimum interval has elapsed before the transport is driven
//! again. An optional [`ResponseStore`](crate::cache::ResponseStore) fronts
//! the transport; a stored response whose fingerprint matches and passes the
//! validity predicate is served without a network round trip.
//!
//! ## Error Classification
//!
//! - transport timeout → [`WikiError::HttpTimeout`]
//! - any other transport failure (connect, TLS, body) →
//!   [`WikiError::TransientRequest`]
//! - an API-level error payload with a known retryable phrase →
//!   [`WikiError::HttpTimeout`]
//! - any other API-level error payload → [`WikiError::RemoteService`]
//!
//! No retry is performed at this layer; callers decide.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wikigraph::{Gateway, WireRequest};
//!
//! let response = gateway
//!     .call(&WireRequest::api([("titles", "Rust"), ("prop", "info")]))
//!     .await?;
//! let json = response.into_json()?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::{ResponseStore, ValidityCheck};
use crate::error::WikiError;
use crate::stats::StatCollector;

/// API error phrases the remote uses for retryable overload conditions.
const RETRYABLE_PHRASES: [&str; 2] = ["timed out", "queue is full"];

/// A normalized outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireRequest {
    /// A query against the JSON API endpoint.
    Api { params: BTreeMap<String, String> },
    /// A raw document fetch.
    Raw { url: Url },
}

impl WireRequest {
    /// Builds an API request, injecting the `format` and `action` parameters
    /// when the caller did not set them.
    pub fn api<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params
            .entry("format".to_string())
            .or_insert_with(|| "json".to_string());
        params
            .entry("action".to_string())
            .or_insert_with(|| "query".to_string());
        WireRequest::Api { params }
    }

    /// Builds a raw document fetch.
    pub fn raw(url: Url) -> Self {
        WireRequest::Raw { url }
    }

    /// Stable identity of this request, used as the memoization key.
    pub fn fingerprint(&self) -> String {
        match self {
            WireRequest::Api { params } => {
                let mut out = String::from("api:");
                for (i, (k, v)) in params.iter().enumerate() {
                    if i > 0 {
                        out.push('&');
                    }
                    out.push_str(k);
                    out.push('=');
                    out.push_str(v);
                }
                out
            }
            WireRequest::Raw { url } => format!("raw:{url}"),
        }
    }
}

/// A fetched response body.
#[derive(Debug, Clone)]
pub enum WireResponse {
    /// Decoded JSON payload from the API endpoint.
    Json(Value),
    /// Raw document text.
    Html(String),
}

impl WireResponse {
    /// Consumes the response as JSON.
    pub fn into_json(self) -> Result<Value, WikiError> {
        match self {
            WireResponse::Json(value) => Ok(value),
            WireResponse::Html(_) => {
                Err(WikiError::Decode("expected JSON, got a raw document".into()))
            }
        }
    }

    /// Consumes the response as document text.
    pub fn into_html(self) -> Result<String, WikiError> {
        match self {
            WireResponse::Html(text) => Ok(text),
            WireResponse::Json(_) => {
                Err(WikiError::Decode("expected a raw document, got JSON".into()))
            }
        }
    }

    fn approximate_len(&self) -> usize {
        match self {
            WireResponse::Json(value) => value.to_string().len(),
            WireResponse::Html(text) => text.len(),
        }
    }
}

/// Performs the actual network exchange for the gateway.
///
/// The default implementation is [`HttpTransport`]; tests substitute scripted
/// transports to exercise the stack without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        request: &WireRequest,
        endpoint: &Url,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<WireResponse, WikiError>;
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, WikiError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| WikiError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &WireRequest,
        endpoint: &Url,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<WireResponse, WikiError> {
        match request {
            WireRequest::Api { params } => {
                let response = self
                    .client
                    .get(endpoint.clone())
                    .query(params)
                    .header(reqwest::header::USER_AGENT, user_agent)
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(|e| classify_transport_error(endpoint.as_str(), e))?;
                let value = response
                    .json::<Value>()
                    .await
                    .map_err(|e| classify_transport_error(endpoint.as_str(), e))?;
                Ok(WireResponse::Json(value))
            }
            WireRequest::Raw { url } => {
                let response = self
                    .client
                    .get(url.clone())
                    .header(reqwest::header::USER_AGENT, user_agent)
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(|e| classify_transport_error(url.as_str(), e))?;
                let text = response
                    .text()
                    .await
                    .map_err(|e| classify_transport_error(url.as_str(), e))?;
                Ok(WireResponse::Html(text))
            }
        }
    }
}

fn classify_transport_error(target: &str, error: reqwest::Error) -> WikiError {
    if error.is_timeout() {
        WikiError::HttpTimeout(target.to_string())
    } else {
        WikiError::TransientRequest(format!("{target}: {error}"))
    }
}

struct CacheLayer {
    store: Arc<dyn ResponseStore>,
    validity: ValidityCheck,
}

/// Rate-limited, optionally memoized front for all outbound calls.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    user_agent: String,
    timeout: Duration,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
    cache: Option<CacheLayer>,
    stats: Arc<StatCollector>,
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        endpoint: Url,
        user_agent: String,
        timeout: Duration,
        min_interval: Duration,
        response_store: Option<Arc<dyn ResponseStore>>,
        validity: Option<ValidityCheck>,
        stats: Arc<StatCollector>,
    ) -> Self {
        let cache = response_store.map(|store| CacheLayer {
            store,
            validity: validity.unwrap_or_else(|| Arc::new(|_| true)),
        });
        Gateway {
            transport,
            endpoint,
            user_agent,
            timeout,
            min_interval,
            last_call: Mutex::new(None),
            cache,
            stats,
        }
    }

    /// The API endpoint this gateway targets.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Performs `request`, honoring the memoizing cache and the rate limit.
    pub async fn call(&self, request: &WireRequest) -> Result<WireResponse, WikiError> {
        let fingerprint = request.fingerprint();

        if let Some(cache) = &self.cache {
            if let Some(stored) = cache.store.load(&fingerprint).await {
                if (cache.validity)(&stored) {
                    trace!(%fingerprint, "serving response from cache");
                    self.stats.increment_responses_from_cache();
                    return Ok(stored);
                }
                debug!(%fingerprint, "cached response rejected by validity check");
            }
        }

        let response = self.call_throttled(request).await?;

        if let WireResponse::Json(value) = &response {
            if let Some(error) = value.get("error") {
                self.stats.increment_api_errors();
                return Err(classify_api_error(error));
            }
        }

        self.stats.increment_requests_succeeded();
        self.stats.add_bytes_downloaded(response.approximate_len());

        if let Some(cache) = &self.cache {
            cache.store.store(&fingerprint, &response).await;
        }
        Ok(response)
    }

    /// Drives the transport after the rate-limit wait. Holding `last_call`
    /// across the call serializes concurrent callers on this gateway; a zero
    /// interval disables throttling and lets callers proceed in parallel.
    async fn call_throttled(&self, request: &WireRequest) -> Result<WireResponse, WikiError> {
        if self.min_interval.is_zero() {
            return self.dispatch(request).await;
        }

        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let due = previous + self.min_interval;
            let now = Instant::now();
            if due > now {
                trace!(wait = ?(due - now), "rate limit wait before request");
                tokio::time::sleep_until(due).await;
            }
        }

        let result = self.dispatch(request).await;
        *last_call = Some(Instant::now());
        result
    }

    async fn dispatch(&self, request: &WireRequest) -> Result<WireResponse, WikiError> {
        self.stats.increment_requests_sent();
        let result = self
            .transport
            .fetch(request, &self.endpoint, &self.user_agent, self.timeout)
            .await;
        if let Err(e) = &result {
            self.stats.increment_requests_failed();
            warn!(fingerprint = %request.fingerprint(), error = %e, "request failed");
        }
        result
    }
}

fn classify_api_error(error: &Value) -> WikiError {
    let info = error
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let lowered = info.to_lowercase();
    if RETRYABLE_PHRASES.iter().any(|p| lowered.contains(p)) {
        WikiError::HttpTimeout(info)
    } else {
        WikiError::RemoteService(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn gateway_with(
        transport: Arc<ScriptedTransport>,
        min_interval: Duration,
        store: Option<Arc<dyn ResponseStore>>,
        validity: Option<ValidityCheck>,
    ) -> Gateway {
        Gateway::new(
            transport,
            Url::parse("https://en.wikipedia.org/w/api.php").unwrap(),
            "wikigraph-test".to_string(),
            Duration::from_secs(10),
            min_interval,
            store,
            validity,
            Arc::new(StatCollector::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_spaced_by_the_minimum_interval() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = WireRequest::api([("titles", "Rust")]);
        transport.script(&request, WireResponse::Json(json!({"query": {}})));

        let interval = Duration::from_millis(250);
        let gateway = gateway_with(transport.clone(), interval, None, None);

        let started = Instant::now();
        for _ in 0..3 {
            gateway.call(&request).await.unwrap();
        }
        let elapsed = started.elapsed();

        assert!(
            elapsed >= interval * 2,
            "3 calls must span at least 2 intervals, took {elapsed:?}"
        );
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn zero_interval_disables_throttling() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = WireRequest::api([("titles", "Rust")]);
        transport.script(&request, WireResponse::Json(json!({"query": {}})));

        let gateway = gateway_with(transport.clone(), Duration::ZERO, None, None);
        gateway.call(&request).await.unwrap();
        gateway.call(&request).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn identical_fingerprints_hit_the_transport_once() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = WireRequest::api([("titles", "Rust")]);
        transport.script(&request, WireResponse::Json(json!({"query": {}})));

        let gateway = gateway_with(
            transport.clone(),
            Duration::ZERO,
            Some(Arc::new(MemoryStore::default())),
            Some(Arc::new(|_| true)),
        );

        gateway.call(&request).await.unwrap();
        gateway.call(&request).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn rejected_cache_entries_are_refetched() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = WireRequest::api([("titles", "Rust")]);
        transport.script(&request, WireResponse::Json(json!({"query": {}})));

        let gateway = gateway_with(
            transport.clone(),
            Duration::ZERO,
            Some(Arc::new(MemoryStore::default())),
            Some(Arc::new(|_| false)),
        );

        gateway.call(&request).await.unwrap();
        gateway.call(&request).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn retryable_api_error_payload_maps_to_timeout() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = WireRequest::api([("srsearch", "rust")]);
        transport.script(
            &request,
            WireResponse::Json(json!({"error": {"info": "HTTP request timed out."}})),
        );

        let gateway = gateway_with(transport, Duration::ZERO, None, None);
        let err = gateway.call(&request).await.unwrap_err();
        assert!(matches!(err, WikiError::HttpTimeout(_)));
    }

    #[tokio::test]
    async fn other_api_error_payload_maps_to_remote_service() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = WireRequest::api([("srsearch", "rust")]);
        transport.script(
            &request,
            WireResponse::Json(json!({"error": {"info": "Invalid value for parameter."}})),
        );

        let gateway = gateway_with(transport, Duration::ZERO, None, None);
        let err = gateway.call(&request).await.unwrap_err();
        assert!(matches!(err, WikiError::RemoteService(_)));
    }

    #[test]
    fn fingerprints_are_stable_and_order_insensitive() {
        let a = WireRequest::api([("b", "2"), ("a", "1")]);
        let b = WireRequest::api([("a", "1"), ("b", "2")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("api:"));
    }

    #[test]
    fn api_requests_are_normalized() {
        let request = WireRequest::api([("titles", "Rust")]);
        match &request {
            WireRequest::Api { params } => {
                assert_eq!(params.get("format").map(String::as_str), Some("json"));
                assert_eq!(params.get("action").map(String::as_str), Some("query"));
            }
            _ => unreachable!(),
        }
    }
}
