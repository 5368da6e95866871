mod bot;
mod config;
mod encyclopedia;
mod query;
mod telegram;
mod wiki;

pub const USER_AGENT: &str = concat!("wikibot/", env!("CARGO_PKG_VERSION"), " (Telegram bot)");

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tracing::{info, warn};

use bot::Bot;
use config::Config;
use encyclopedia::Encyclopedia;
use telegram::TelegramClient;
use wiki::WikipediaClient;

/// TCP connection establishment timeout. Request timeouts are set per call
/// because long polling outlives any sensible global limit.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(version, about = "Telegram bot for Wikipedia search, suggestions, and summaries")]
struct Cli {
    /// File to load environment variables from
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Long-poll timeout for Telegram updates, in seconds
    #[arg(long, default_value_t = 30)]
    poll_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wikibot=info".parse()?),
        )
        .init();

    let config = Config::load(&cli.env_file)
        .inspect_err(|e| tracing::error!("invalid configuration: {e}"))?;

    let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

    let wiki_client = WikipediaClient::new(http.clone(), &config.wikipedia_endpoint)?;
    let wiki = Encyclopedia::bootstrap(wiki_client)
        .await
        .inspect_err(|e| tracing::error!("failed to load Wikipedia languages: {e}"))?;
    if wiki.languages().is_empty() {
        warn!("Wikipedia returned no languages; every lookup will use the default language");
    }
    info!(entries = wiki.languages().len(), "language table ready");

    let telegram = TelegramClient::new(http, &config.telegram_token);
    let me = telegram
        .get_me()
        .await
        .inspect_err(|e| tracing::error!("failed to reach Telegram: {e}"))?;

    info!(username = ?me.username, "starting wikibot");
    Arc::new(Bot::new(telegram, wiki, me.username))
        .run(cli.poll_timeout)
        .await?;
    info!("bot stopped");
    Ok(())
}
