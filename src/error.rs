//! Engine Error Types
//!
//! One error enum covers the whole engine. Errors raised while loading rules
//! or configuration are fatal and surface to the caller; errors raised while
//! following rules during a correlation are recorded against the offending
//! graph node or line and the traversal continues.

use thiserror::Error;

/// Correlation engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Class name does not match `domain:class` (or the legacy `class.domain`)
    #[error("invalid class name: {0}")]
    InvalidClassName(String),

    /// Query string does not match `domain:class:data`, or the data part
    /// was rejected by the domain's parser
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// No domain registered under this name
    #[error("domain not found: {0}")]
    DomainNotFound(String),

    /// The domain has no class with this name
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// No usable store for the domain; carries the construction error for
    /// stores that failed to build
    #[error("store unavailable for domain {domain}: {reason}")]
    StoreUnavailable { domain: String, reason: String },

    /// The store backend rejected or failed a query
    #[error("store error: {0}")]
    Store(String),

    /// A rule template failed to compile or render
    #[error("rule template error: {0}")]
    Template(String),

    /// The rule rendered an empty query for this object; a non-fatal skip
    #[error("rule produced no query")]
    NoQuery,

    /// The correlation was cancelled or exceeded its deadline
    #[error("correlation cancelled")]
    Cancelled,

    /// A rule file or store configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        use std::error::Error as _;
        // Tera hides the interesting message in its source chain; keep it.
        let mut msg = e.to_string();
        let mut source = e.source();
        while let Some(s) = source {
            msg.push_str(": ");
            msg.push_str(&s.to_string());
            source = s.source();
        }
        Error::Template(msg)
    }
}
