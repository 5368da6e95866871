//! Encyclopedia client: the contract the bot core depends on and its MediaWiki implementation.

pub mod client;
mod types;

pub use client::WikipediaClient;

use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Wikipedia rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("Wikipedia API error ({code}): {message}")]
    Api { code: String, message: String },

    #[error("Wikipedia request failed: status {0}")]
    Status(u16),

    #[error("invalid Wikipedia endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Result of an exact-title page lookup.
///
/// Disambiguation and missing pages are expected outcomes, not failures, so they
/// are variants here rather than `ClientError`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    Found(Option<String>),
    Disambiguation(Vec<String>),
    PageNotFound(String),
}

/// Abstraction over an encyclopedia service holding one active content language.
/// Implemented by `WikipediaClient` for production; mock implementations used in tests.
pub trait EncyclopediaClient: Send {
    /// Supported languages as `(code, display name)` pairs.
    fn languages(&self) -> impl Future<Output = Result<Vec<(String, String)>, ClientError>> + Send;

    fn set_language(&mut self, code: &str);

    fn search(&self, query: &str) -> impl Future<Output = Result<Vec<String>, ClientError>> + Send;

    fn summary(
        &self,
        query: &str,
        auto_suggest: bool,
    ) -> impl Future<Output = Result<SummaryOutcome, ClientError>> + Send;

    fn suggest(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Option<String>, ClientError>> + Send;
}
