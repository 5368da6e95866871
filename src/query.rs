//! Query validation and language identifier resolution.

use std::collections::HashMap;

use crate::encyclopedia::WikiError;

/// Trims surrounding whitespace; a query that is empty afterwards is rejected.
pub fn prepare_query(raw: &str) -> Result<String, WikiError> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(WikiError::EmptyQuery);
    }
    Ok(query.to_string())
}

/// Case-insensitive map from language display names and codes to canonical codes.
///
/// Built once from the client's language list and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    codes: HashMap<String, String>,
}

impl LanguageTable {
    pub fn from_languages<I, C, N>(languages: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: AsRef<str>,
        N: AsRef<str>,
    {
        let mut codes = HashMap::new();
        for (code, name) in languages {
            let code = code.as_ref();
            codes.insert(code.to_lowercase(), code.to_string());
            codes.insert(name.as_ref().to_lowercase(), code.to_string());
        }
        Self { codes }
    }

    pub fn resolve(&self, identifier: &str) -> Option<&str> {
        if identifier.is_empty() {
            return None;
        }
        self.codes
            .get(&identifier.to_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
