use std::collections::{HashMap, HashSet};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{LanguagesQuery, PagesQuery, QueryResponse, SearchQuery};
use super::{ClientError, EncyclopediaClient, SummaryOutcome};

pub const DEFAULT_ENDPOINT: &str = "https://{lang}.wikipedia.org/w/api.php";
const LANG_PLACEHOLDER: &str = "{lang}";
const INITIAL_LANGUAGE: &str = "en";
const SEARCH_RESULTS: &str = "10";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_LINK_BATCHES: usize = 20;

type Continuation = HashMap<String, String>;

/// MediaWiki Action API client bound to one active language edition.
///
/// The endpoint is a URL template in which `{lang}` is replaced by the active
/// language code on every request.
#[derive(Clone, Debug)]
pub struct WikipediaClient {
    http: Client,
    endpoint: String,
    lang: String,
    initial_backoff_ms: u64,
}

impl WikipediaClient {
    pub fn new(http: Client, endpoint: &str) -> Result<Self, ClientError> {
        validate_endpoint(endpoint)?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            lang: INITIAL_LANGUAGE.to_string(),
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{base_url}/{LANG_PLACEHOLDER}/w/api.php"),
            lang: INITIAL_LANGUAGE.to_string(),
            initial_backoff_ms: 0,
        }
    }

    fn url(&self) -> String {
        self.endpoint.replace(LANG_PLACEHOLDER, &self.lang)
    }

    async fn query<T>(&self, params: &[(&str, &str)]) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Default,
    {
        let (body, _) = self.query_batch(params).await?;
        Ok(body)
    }

    /// One `action=query` batch together with its `continue` parameters.
    async fn query_batch<T>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<(T, Option<Continuation>), ClientError>
    where
        T: DeserializeOwned + Default,
    {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.query_once(params).await {
                Ok(batch) => return Ok(batch),
                Err(e) if is_retriable(&e) => {
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        let delay_ms = jittered_backoff(self.initial_backoff_ms, attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms, "retrying after transient error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(ClientError::RateLimited))
    }

    async fn query_once<T>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<(T, Option<Continuation>), ClientError>
    where
        T: DeserializeOwned + Default,
    {
        let response = self
            .http
            .get(self.url())
            .header("User-Agent", crate::USER_AGENT)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(lang = %self.lang, "Wikipedia API rate limited");
            return Err(ClientError::RateLimited);
        }
        if !status.is_success() {
            warn!(status = %status, lang = %self.lang, "Wikipedia API error");
            return Err(ClientError::Status(status.as_u16()));
        }

        let body: QueryResponse<T> = response.json().await?;
        if let Some(err) = body.error {
            let error = ClientError::Api {
                code: err.code.unwrap_or_else(|| "unknown".to_string()),
                message: err.info.unwrap_or_else(|| "Unknown error".to_string()),
            };
            warn!(%error, "Wikipedia API error in 200 response");
            return Err(error);
        }
        Ok((body.query.unwrap_or_default(), body.continuation))
    }

    /// Title an auto-suggesting lookup would land on: the spelling suggestion if
    /// any, else the best search hit.
    async fn suggested_title(&self, query: &str) -> Result<Option<String>, ClientError> {
        let found: SearchQuery = self
            .query(&[
                ("list", "search"),
                ("srinfo", "suggestion"),
                ("srprop", ""),
                ("srlimit", "1"),
                ("srsearch", query),
            ])
            .await?;
        let suggestion = found
            .searchinfo
            .and_then(|info| info.suggestion)
            .filter(|s| !s.is_empty());
        Ok(suggestion.or_else(|| found.search.into_iter().next().map(|hit| hit.title)))
    }

    /// Articles a disambiguation page offers: the first link of each list item,
    /// kept only when it points at an article in the main namespace.
    async fn disambiguation_options(&self, title: &str) -> Result<Vec<String>, ClientError> {
        let found: PagesQuery = self
            .query(&[
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("rvslots", "main"),
                ("titles", title),
            ])
            .await?;
        let wikitext = found
            .pages
            .first()
            .and_then(|page| page.wikitext())
            .unwrap_or_default();

        let articles = self.article_links(title).await?;
        let mut seen = HashSet::new();
        Ok(list_item_targets(wikitext)
            .into_iter()
            .filter(|target| articles.contains(target))
            .filter(|target| seen.insert(target.clone()))
            .collect())
    }

    /// Every namespace-0 link on the page, following `continue` across batches.
    async fn article_links(&self, title: &str) -> Result<HashSet<String>, ClientError> {
        let mut links = HashSet::new();
        let mut continuation: Option<Continuation> = None;
        for _ in 0..MAX_LINK_BATCHES {
            let (found, next): (PagesQuery, _) = {
                let mut params = vec![
                    ("prop", "links"),
                    ("plnamespace", "0"),
                    ("pllimit", "max"),
                    ("titles", title),
                ];
                if let Some(next) = &continuation {
                    params.extend(next.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                }
                self.query_batch(&params).await?
            };
            links.extend(
                found
                    .pages
                    .into_iter()
                    .flat_map(|page| page.links)
                    .map(|link| link.title),
            );
            match next {
                Some(next) => continuation = Some(next),
                None => return Ok(links),
            }
        }
        warn!(title, batches = MAX_LINK_BATCHES, "link listing truncated");
        Ok(links)
    }
}

/// Link targets opening each `*` or `#` list line of a page's wikitext, in page
/// order, normalized to the title form the API reports.
fn list_item_targets(wikitext: &str) -> Vec<String> {
    wikitext
        .lines()
        .filter(|line| line.starts_with(['*', '#']))
        .filter_map(|line| {
            let (_, rest) = line.split_once("[[")?;
            let (inner, _) = rest.split_once("]]")?;
            let target = inner.split('|').next().unwrap_or_default();
            let target = target.split('#').next().unwrap_or_default();
            normalize_title(target)
        })
        .collect()
}

fn normalize_title(target: &str) -> Option<String> {
    let target = target.replace('_', " ");
    let target = target.trim();
    let mut chars = target.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

impl EncyclopediaClient for WikipediaClient {
    async fn languages(&self) -> Result<Vec<(String, String)>, ClientError> {
        let found: LanguagesQuery = self
            .query(&[("meta", "siteinfo"), ("siprop", "languages")])
            .await?;
        debug!(count = found.languages.len(), "languages fetched");
        Ok(found
            .languages
            .into_iter()
            .map(|l| (l.code, l.name))
            .collect())
    }

    fn set_language(&mut self, code: &str) {
        if self.lang != code {
            debug!(from = %self.lang, to = %code, "switching language");
            self.lang = code.to_string();
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, ClientError> {
        let found: SearchQuery = self
            .query(&[
                ("list", "search"),
                ("srprop", ""),
                ("srlimit", SEARCH_RESULTS),
                ("srsearch", query),
            ])
            .await?;
        Ok(found.search.into_iter().map(|hit| hit.title).collect())
    }

    async fn summary(&self, query: &str, auto_suggest: bool) -> Result<SummaryOutcome, ClientError> {
        let title = if auto_suggest {
            match self.suggested_title(query).await? {
                Some(title) => title,
                None => return Ok(SummaryOutcome::PageNotFound(query.to_string())),
            }
        } else {
            query.to_string()
        };

        let found: PagesQuery = self
            .query(&[
                ("prop", "extracts|pageprops"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("ppprop", "disambiguation"),
                ("redirects", "1"),
                ("titles", title.as_str()),
            ])
            .await?;

        let Some(page) = found.pages.into_iter().next() else {
            return Ok(SummaryOutcome::PageNotFound(title));
        };
        if page.missing || page.invalid {
            return Ok(SummaryOutcome::PageNotFound(title));
        }
        if page.is_disambiguation() {
            let options = self.disambiguation_options(&page.title).await?;
            debug!(title = %page.title, options = options.len(), "disambiguation page");
            return Ok(SummaryOutcome::Disambiguation(options));
        }
        Ok(SummaryOutcome::Found(page.extract))
    }

    async fn suggest(&self, query: &str) -> Result<Option<String>, ClientError> {
        let found: SearchQuery = self
            .query(&[
                ("list", "search"),
                ("srinfo", "suggestion"),
                ("srprop", ""),
                ("srlimit", "1"),
                ("srsearch", query),
            ])
            .await?;
        Ok(found.searchinfo.and_then(|info| info.suggestion))
    }
}

/// Checks that the endpoint template carries the language placeholder and
/// yields an HTTP(S) URL.
pub fn validate_endpoint(endpoint: &str) -> Result<(), ClientError> {
    if !endpoint.contains(LANG_PLACEHOLDER) {
        return Err(ClientError::InvalidEndpoint(format!(
            "'{endpoint}' has no {LANG_PLACEHOLDER} placeholder"
        )));
    }
    let sample = endpoint.replace(LANG_PLACEHOLDER, INITIAL_LANGUAGE);
    let url = url::Url::parse(&sample)
        .map_err(|e| ClientError::InvalidEndpoint(format!("'{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ClientError::InvalidEndpoint(format!(
            "'{endpoint}': unsupported scheme {scheme}"
        ))),
    }
}

fn is_retriable(e: &ClientError) -> bool {
    matches!(e, ClientError::RateLimited | ClientError::Status(500..=599))
}

/// Equal jitter backoff: base/2 + rand(0, base/2).
fn jittered_backoff(initial_ms: u64, attempt: u32) -> u64 {
    let base = initial_ms * 2u64.pow(attempt);
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_is_valid() {
        assert!(validate_endpoint(DEFAULT_ENDPOINT).is_ok());
    }

    #[test]
    fn endpoint_without_placeholder_is_rejected() {
        let err = validate_endpoint("https://en.wikipedia.org/w/api.php").unwrap_err();
        assert!(err.to_string().contains("{lang}"), "got: {err}");
    }

    #[test]
    fn endpoint_with_non_http_scheme_is_rejected() {
        let err = validate_endpoint("ftp://{lang}.wikipedia.org/w/api.php").unwrap_err();
        assert!(err.to_string().contains("scheme"), "got: {err}");
    }

    #[test]
    fn url_substitutes_active_language() {
        let mut client = WikipediaClient::new(Client::new(), DEFAULT_ENDPOINT).unwrap();
        assert_eq!(client.url(), "https://en.wikipedia.org/w/api.php");
        client.set_language("de");
        assert_eq!(client.url(), "https://de.wikipedia.org/w/api.php");
    }

    #[test]
    fn only_rate_limit_and_server_errors_are_retried() {
        assert!(is_retriable(&ClientError::RateLimited));
        assert!(is_retriable(&ClientError::Status(503)));
        assert!(!is_retriable(&ClientError::Status(404)));
        assert!(!is_retriable(&ClientError::Api {
            code: "badvalue".into(),
            message: "bad".into(),
        }));
    }

    #[test]
    fn list_items_yield_their_first_link_target() {
        let wikitext = "'''Rust''' may refer to:\n\
            * [[Rust (programming language)]], a language by [[Mozilla]]\n\
            ** [[rust_(fungus)|Rust]], a plant disease\n\
            # [[Rust, Austria#History|Rust]]\n\
            Not a [[List item]]\n\
            * no link here\n\
            * [[:Category:Rust]]";
        assert_eq!(
            list_item_targets(wikitext),
            vec![
                "Rust (programming language)",
                "Rust (fungus)",
                "Rust, Austria",
                ":Category:Rust",
            ]
        );
    }

    #[test]
    fn backoff_stays_within_jitter_window() {
        for attempt in 0..3 {
            let base = 1000 * 2u64.pow(attempt);
            let delay = jittered_backoff(1000, attempt);
            assert!(delay >= base / 2 && delay < base, "attempt {attempt}: {delay}");
        }
        assert_eq!(jittered_backoff(0, 2), 0);
    }
}
