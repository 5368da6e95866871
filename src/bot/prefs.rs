use dashmap::DashMap;

use crate::telegram::User;

/// Per-user language preferences, kept in memory for the life of the process.
#[derive(Debug, Default)]
pub struct LanguagePrefs {
    by_user: DashMap<i64, String>,
}

impl LanguagePrefs {
    pub fn set(&self, user_id: i64, code: &str) {
        self.by_user.insert(user_id, code.to_string());
    }

    /// The language to query in for `user`: the stored preference, else the
    /// language of the user's Telegram client, else empty.
    pub fn current(&self, user: Option<&User>) -> String {
        let Some(user) = user else {
            return String::new();
        };
        if let Some(stored) = self.by_user.get(&user.id)
            && !stored.is_empty()
        {
            return stored.to_lowercase();
        }
        user.language_code
            .as_deref()
            .filter(|code| !code.is_empty())
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}
