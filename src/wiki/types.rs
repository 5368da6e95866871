use std::collections::HashMap;

use serde::Deserialize;

/// Envelope of every `action=query` response (`formatversion=2`).
#[derive(Debug, Deserialize)]
pub struct QueryResponse<T> {
    pub query: Option<T>,
    pub error: Option<ApiError>,
    /// Parameters to send back for the next batch; absent on the last one.
    #[serde(rename = "continue")]
    pub continuation: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: Option<String>,
    pub info: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LanguagesQuery {
    #[serde(default)]
    pub languages: Vec<SiteLanguage>,
}

#[derive(Debug, Deserialize)]
pub struct SiteLanguage {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: Vec<SearchHit>,
    pub searchinfo: Option<SearchInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchInfo {
    pub suggestion: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PagesQuery {
    #[serde(default)]
    pub pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub invalid: bool,
    pub extract: Option<String>,
    pub pageprops: Option<PageProps>,
    #[serde(default)]
    pub links: Vec<PageLink>,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

impl Page {
    pub fn is_disambiguation(&self) -> bool {
        self.pageprops
            .as_ref()
            .is_some_and(|p| p.disambiguation.is_some())
    }

    /// Wikitext of the latest revision, when requested with `rvslots=main`.
    pub fn wikitext(&self) -> Option<&str> {
        self.revisions
            .first()?
            .slots
            .as_ref()?
            .main
            .as_ref()?
            .content
            .as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub struct PageProps {
    pub disambiguation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PageLink {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct Revision {
    pub slots: Option<RevisionSlots>,
}

#[derive(Debug, Deserialize)]
pub struct RevisionSlots {
    pub main: Option<RevisionSlot>,
}

#[derive(Debug, Deserialize)]
pub struct RevisionSlot {
    pub content: Option<String>,
}
