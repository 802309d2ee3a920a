//! Error types shared across the crate.
//!
//! Resolution, gateway, and store failures all surface as [`WikiError`].
//! Store misuse (`UnknownKey`, `DuplicateKey`) indicates a programming error
//! and is never caught internally; everything else is a runtime condition the
//! caller may handle. Crawl cancellation is deliberately *not* an error: an
//! interrupted crawl returns the partial graph instead.

use thiserror::Error;

/// All failure modes surfaced by this crate.
#[derive(Debug, Error)]
pub enum WikiError {
    /// The requested page does not exist at the source.
    #[error("page does not exist: {0}")]
    Page(String),

    /// A redirect was encountered while redirect-following is disabled.
    #[error("'{0}' resulted in a redirect, but redirect following is disabled")]
    Redirect(String),

    /// A redirect chain exceeded the hop bound.
    #[error("redirect chain exceeded {0} hops")]
    RecursionLimit(u32),

    /// The request timed out, either at the transport or reported by the
    /// remote service as a retryable condition.
    #[error("request timed out: {0}")]
    HttpTimeout(String),

    /// A transport-level failure other than a timeout (connect, TLS, body).
    #[error("transport failure: {0}")]
    TransientRequest(String),

    /// A non-retryable error payload returned by the remote service.
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// A response arrived but did not have the expected shape.
    #[error("malformed API response: {0}")]
    Decode(String),

    /// A store key was read or depended upon without being declared.
    #[error("unknown key: '{0}'")]
    UnknownKey(String),

    /// A store key was redeclared while the store is in safe mode.
    #[error("key '{0}' is already declared")]
    DuplicateKey(String),

    /// A store value was requested as a different type than it holds.
    #[error("value for key '{0}' has a different type than requested")]
    TypeMismatch(String),

    /// A producer failed; carries the key whose evaluation failed.
    #[error("evaluating '{key}': {source}")]
    Eval {
        key: String,
        #[source]
        source: Box<WikiError>,
    },

    /// The caller-supplied target (address, title, id) is not usable.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Invalid builder configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WikiError {
    /// Wraps an error with the store key whose producer raised it.
    pub(crate) fn tagged(key: &str, source: WikiError) -> Self {
        WikiError::Eval {
            key: key.to_string(),
            source: Box::new(source),
        }
    }
}
