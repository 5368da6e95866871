//! Wikipedia operations as the bot exposes them: validated queries, resolved
//! languages, and client outcomes translated into one user-facing error type.

use std::collections::BTreeSet;

use tokio::sync::Mutex;
use tracing::debug;

use crate::query::{LanguageTable, prepare_query};
use crate::wiki::{ClientError, EncyclopediaClient, SummaryOutcome};

/// Language used when the requested one is not in the table.
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    #[error("Query is empty.")]
    EmptyQuery,

    #[error("Nothing was found for the query {0}.")]
    EmptyResult(String),

    #[error("{}", disambiguation_message(.0))]
    Disambiguation(Vec<String>),

    #[error("Page with title \"{0}\" not found.")]
    PageNotFound(String),

    #[error("No suggestion was found for the query {0}.")]
    NoSuggestion(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// One candidate per line under the prompt, with no trailing newline.
fn disambiguation_message(options: &[String]) -> String {
    std::iter::once("Maybe you mean:")
        .chain(options.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n")
}

impl WikiError {
    /// Whether the message is meant for the user as-is. Client failures are not.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, WikiError::Client(_))
    }
}

/// Search, summary and suggestion lookups over a client with a single active
/// language.
///
/// The client sits behind a mutex held from `set_language` until the lookup
/// completes, so concurrent calls in different languages cannot interleave.
pub struct Encyclopedia<C> {
    client: Mutex<C>,
    languages: LanguageTable,
}

impl<C: EncyclopediaClient> Encyclopedia<C> {
    pub fn new(client: C, languages: LanguageTable) -> Self {
        Self {
            client: Mutex::new(client),
            languages,
        }
    }

    /// Builds the language table from the client's own language list.
    pub async fn bootstrap(client: C) -> Result<Self, ClientError> {
        let languages = LanguageTable::from_languages(client.languages().await?);
        debug!(entries = languages.len(), "language table built");
        Ok(Self::new(client, languages))
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.languages
    }

    fn language_code(&self, language: &str) -> &str {
        self.languages.resolve(language).unwrap_or(DEFAULT_LANGUAGE)
    }

    pub async fn search(&self, query: &str, language: &str) -> Result<Vec<String>, WikiError> {
        let query = prepare_query(query)?;
        let code = self.language_code(language);

        let mut client = self.client.lock().await;
        client.set_language(code);
        let results = client.search(&query).await?;
        drop(client);

        if results.is_empty() {
            return Err(WikiError::EmptyResult(query));
        }
        debug!(%query, lang = code, results = results.len(), "search complete");
        Ok(results)
    }

    pub async fn summary(&self, query: &str, language: &str) -> Result<String, WikiError> {
        let query = prepare_query(query)?;
        let code = self.language_code(language);

        let mut client = self.client.lock().await;
        client.set_language(code);
        let outcome = client.summary(&query, false).await?;
        drop(client);

        match outcome {
            SummaryOutcome::Found(text) => Ok(text.unwrap_or_default()),
            SummaryOutcome::Disambiguation(options) => {
                let options: BTreeSet<String> = options.into_iter().collect();
                Err(WikiError::Disambiguation(options.into_iter().collect()))
            }
            SummaryOutcome::PageNotFound(title) => {
                debug!(%query, %title, "page not found");
                Err(WikiError::PageNotFound(query))
            }
        }
    }

    pub async fn suggest(&self, query: &str, language: &str) -> Result<String, WikiError> {
        let query = prepare_query(query)?;
        let code = self.language_code(language);

        let mut client = self.client.lock().await;
        client.set_language(code);
        let suggestion = client.suggest(&query).await?;
        drop(client);

        match suggestion {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(WikiError::NoSuggestion(query)),
        }
    }
}
