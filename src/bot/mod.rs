//! Command handling and the long-polling loop.

pub mod commands;
mod prefs;

use prefs::LanguagePrefs;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use commands::{Command, Input, help_lines, parse_input};

use crate::encyclopedia::{Encyclopedia, WikiError};
use crate::telegram::{Message, TelegramClient, TelegramError, User};
use crate::wiki::EncyclopediaClient;

const FAILURE_REPLY: &str = "Something went wrong :(";
/// Telegram refuses empty messages.
const EMPTY_REPLY: &str = "(empty)";
const LANGUAGES_URL: &str = "https://meta.wikimedia.org/wiki/List_of_Wikipedias";

const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 60_000;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Bot<C> {
    telegram: TelegramClient,
    wiki: Encyclopedia<C>,
    prefs: LanguagePrefs,
    username: Option<String>,
}

impl<C: EncyclopediaClient + 'static> Bot<C> {
    pub fn new(telegram: TelegramClient, wiki: Encyclopedia<C>, username: Option<String>) -> Self {
        Self {
            telegram,
            wiki,
            prefs: LanguagePrefs::default(),
            username,
        }
    }

    /// Polls for updates until Ctrl-C or a rejected token; each message is
    /// answered on its own task.
    pub async fn run(self: Arc<Self>, poll_timeout_secs: u64) -> Result<(), TelegramError> {
        self.run_until(poll_timeout_secs, ctrl_c()).await
    }

    /// Polling loop stopped by `shutdown`. Replies still in flight get
    /// `SHUTDOWN_GRACE` to finish before they are aborted.
    async fn run_until(
        self: Arc<Self>,
        poll_timeout_secs: u64,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TelegramError> {
        tokio::pin!(shutdown);
        let mut handlers = JoinSet::new();

        let mut offset = None;
        let mut failures: u32 = 0;
        let result = loop {
            let polled = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
                polled = self.telegram.get_updates(offset, poll_timeout_secs) => polled,
            };

            reap_finished(&mut handlers);
            let delay = match polled {
                Ok(updates) => {
                    failures = 0;
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if let Some(message) = update.message {
                            let bot = Arc::clone(&self);
                            handlers.spawn(async move { bot.handle_message(message).await });
                        }
                    }
                    continue;
                }
                Err(TelegramError::Unauthorized) => break Err(TelegramError::Unauthorized),
                Err(TelegramError::RateLimited {
                    retry_after: Some(secs),
                }) => Duration::from_secs(secs),
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, failures, "polling failed");
                    Duration::from_millis(poll_backoff(failures))
                }
            };

            debug!(delay_ms = delay.as_millis() as u64, "waiting before next poll");
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        };

        drain(&mut handlers).await;
        result
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let Some(reply) = self.reply(message.from.as_ref(), text).await else {
            return;
        };
        if let Err(e) = self.telegram.send_message(message.chat.id, &reply).await {
            error!(error = %e, chat_id = message.chat.id, "failed to send reply");
        }
    }

    /// Text to answer `text` with, or `None` when the message is not for us.
    pub async fn reply(&self, user: Option<&User>, text: &str) -> Option<String> {
        let input = parse_input(text, self.username.as_deref())?;
        let lines = match input {
            Input::Text => help_lines(),
            Input::Command(command, argument) => {
                match self.run_command(command, &argument, user).await {
                    Ok(lines) => lines,
                    Err(e) if e.is_user_facing() => vec![e.to_string()],
                    Err(e) => {
                        error!(error = ?e, command = command.name(), %argument, "command failed");
                        vec![FAILURE_REPLY.to_string()]
                    }
                }
            }
        };

        let reply = lines.join("\n");
        if reply.trim().is_empty() {
            return Some(EMPTY_REPLY.to_string());
        }
        Some(reply)
    }

    async fn run_command(
        &self,
        command: Command,
        argument: &str,
        user: Option<&User>,
    ) -> Result<Vec<String>, WikiError> {
        match command {
            Command::Start | Command::Help => Ok(help_lines()),
            Command::Search => {
                let lang = self.prefs.current(user);
                info!(query = %argument, %lang, "cmd:search");
                self.wiki.search(argument, &lang).await
            }
            Command::Suggest => {
                let lang = self.prefs.current(user);
                info!(query = %argument, %lang, "cmd:suggest");
                Ok(vec![self.wiki.suggest(argument, &lang).await?])
            }
            Command::Summary => {
                let lang = self.prefs.current(user);
                info!(query = %argument, %lang, "cmd:summary");
                Ok(vec![self.wiki.summary(argument, &lang).await?])
            }
            Command::SetLang => {
                info!(lang = %argument, "cmd:setlang");
                let Some(code) = self.wiki.languages().resolve(argument) else {
                    return Ok(vec![format!(
                        "Sorry, {argument} language is not supported."
                    )]);
                };
                match user {
                    Some(user) => self.prefs.set(user.id, code),
                    None => warn!(%code, "no sender to store language for"),
                }
                Ok(vec![format!("Language successful changed to {code}.")])
            }
            Command::GetLang => {
                info!("cmd:getlang");
                Ok(vec![self.prefs.current(user)])
            }
            Command::Languages => {
                info!("cmd:languages");
                Ok(vec![
                    "List of supported language codes:".to_string(),
                    String::new(),
                    LANGUAGES_URL.to_string(),
                ])
            }
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C; stop the process another way");
        std::future::pending::<()>().await;
    }
}

fn reap_finished(handlers: &mut JoinSet<()>) {
    while let Some(done) = handlers.try_join_next() {
        if let Err(e) = done {
            error!(error = %e, "message handler panicked");
        }
    }
}

/// Waits for in-flight replies, aborting whatever is left after the grace period.
async fn drain(handlers: &mut JoinSet<()>) {
    if handlers.is_empty() {
        return;
    }
    info!(pending = handlers.len(), "waiting for in-flight replies");
    let finished = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(done) = handlers.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "message handler panicked");
            }
        }
    })
    .await;
    if finished.is_err() {
        warn!(abandoned = handlers.len(), "in-flight replies aborted");
        handlers.abort_all();
    }
}

/// Equal jitter backoff capped at one minute.
fn poll_backoff(failures: u32) -> u64 {
    let base = INITIAL_BACKOFF_MS
        .saturating_mul(2u64.saturating_pow(failures.saturating_sub(1)))
        .min(MAX_BACKOFF_MS);
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::LanguageTable;
    use crate::wiki::WikipediaClient;
    use reqwest::Client;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user(id: i64, language_code: Option<&str>) -> User {
        User {
            id,
            username: None,
            language_code: language_code.map(str::to_string),
        }
    }

    fn bot(server: &MockServer) -> Bot<WikipediaClient> {
        let http = Client::new();
        let wiki = Encyclopedia::new(
            WikipediaClient::with_base_url(http.clone(), &server.uri()),
            LanguageTable::from_languages([("en", "English"), ("de", "Deutsch")]),
        );
        Bot::new(
            TelegramClient::with_base_url(http, &server.uri()),
            wiki,
            Some("wikibot".into()),
        )
    }

    async fn mount_search(server: &MockServer, lang: &str, titles: &[&str]) {
        let hits: Vec<_> = titles
            .iter()
            .map(|t| serde_json::json!({"ns": 0, "title": t}))
            .collect();
        Mock::given(method("GET"))
            .and(path(format!("/{lang}/w/api.php")))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"search": hits}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn plain_text_gets_help() {
        let server = MockServer::start().await;
        let reply = bot(&server).reply(None, "hi").await.unwrap();
        assert!(reply.starts_with("I can help you get access to Wikipedia pages."));
        assert!(reply.contains("/setlang [language|language_code]"));
    }

    #[tokio::test]
    async fn unknown_and_foreign_commands_are_ignored() {
        let server = MockServer::start().await;
        let bot = bot(&server);
        assert_eq!(bot.reply(None, "/nope").await, None);
        assert_eq!(bot.reply(None, "/help@otherbot").await, None);
    }

    #[tokio::test]
    async fn search_replies_one_title_per_line() {
        let server = MockServer::start().await;
        mount_search(&server, "en", &["Rust", "Rust (fungus)"]).await;

        let reply = bot(&server).reply(None, "/search rust").await.unwrap();
        assert_eq!(reply, "Rust\nRust (fungus)");
    }

    #[tokio::test]
    async fn setlang_changes_language_of_later_searches() {
        let server = MockServer::start().await;
        mount_search(&server, "de", &["Berlin"]).await;
        let bot = bot(&server);
        let alice = user(1, Some("en"));

        let reply = bot.reply(Some(&alice), "/setlang Deutsch").await.unwrap();
        assert_eq!(reply, "Language successful changed to de.");
        assert_eq!(bot.reply(Some(&alice), "/getlang").await.unwrap(), "de");
        assert_eq!(
            bot.reply(Some(&alice), "/search Berlin").await.unwrap(),
            "Berlin"
        );
    }

    #[tokio::test]
    async fn setlang_rejects_unknown_language() {
        let server = MockServer::start().await;
        let bot = bot(&server);
        let alice = user(1, Some("en"));

        let reply = bot.reply(Some(&alice), "/setlang Klingon").await.unwrap();
        assert_eq!(reply, "Sorry, Klingon language is not supported.");
        assert_eq!(bot.reply(Some(&alice), "/getlang").await.unwrap(), "en");
    }

    #[tokio::test]
    async fn getlang_without_any_language_replies_placeholder() {
        let server = MockServer::start().await;
        let reply = bot(&server).reply(Some(&user(1, None)), "/getlang").await;
        assert_eq!(reply.as_deref(), Some(EMPTY_REPLY));
    }

    #[tokio::test]
    async fn user_facing_errors_are_replied_verbatim() {
        let server = MockServer::start().await;
        let reply = bot(&server).reply(None, "/summary   ").await.unwrap();
        assert_eq!(reply, "Query is empty.");
    }

    #[tokio::test]
    async fn client_failures_get_generic_reply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let reply = bot(&server).reply(None, "/suggest rust").await.unwrap();
        assert_eq!(reply, FAILURE_REPLY);
    }

    #[tokio::test]
    async fn languages_points_to_list_of_wikipedias() {
        let server = MockServer::start().await;
        let reply = bot(&server).reply(None, "/languages").await.unwrap();
        assert_eq!(
            reply,
            format!("List of supported language codes:\n\n{LANGUAGES_URL}")
        );
    }

    #[tokio::test]
    async fn handled_message_is_sent_back_to_chat() {
        let server = MockServer::start().await;
        mount_search(&server, "en", &["Rust"]).await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_partial_json(serde_json::json!({"chat_id": 5, "text": "Rust"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 1, "date": 0, "chat": {"id": 5, "type": "private"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let message: Message = serde_json::from_value(serde_json::json!({
            "message_id": 3,
            "date": 0,
            "chat": {"id": 5, "type": "private"},
            "text": "/search rust"
        }))
        .unwrap();
        bot(&server).handle_message(message).await;
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_replies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [{
                    "update_id": 10,
                    "message": {
                        "message_id": 3,
                        "date": 0,
                        "chat": {"id": 5, "type": "private"},
                        "text": "/search rust"
                    }
                }]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/getUpdates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/en/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "query": {"search": [{"ns": 0, "title": "Rust"}]}
                    }))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_partial_json(serde_json::json!({"chat_id": 5, "text": "Rust"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 4, "date": 0, "chat": {"id": 5, "type": "private"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = Arc::new(bot(&server))
            .run_until(0, tokio::time::sleep(Duration::from_millis(100)))
            .await;
        assert!(result.is_ok(), "got: {result:?}");
        let sent = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path().ends_with("/sendMessage"))
            .count();
        assert_eq!(sent, 1);
    }

    #[test]
    fn poll_backoff_grows_and_caps() {
        assert!(poll_backoff(1) < INITIAL_BACKOFF_MS);
        let capped = poll_backoff(30);
        assert!((MAX_BACKOFF_MS / 2..MAX_BACKOFF_MS).contains(&capped));
    }
}
