//! # econ_brief
//!
//! Daily Korean economy news pushed to KakaoTalk. Candidate headlines are
//! scraped from Naver, Daum and Google News, briefed by Gemini, and every
//! link in the briefing is checked against the scraped candidates before
//! anything is sent.
//!
//! ## Runs
//!
//! - `brief`: top domestic and world stories, one message per item
//! - `feeds`: digest of RSS entries not sent before
//! - `summarize`: three-line summary per Daum article
//! - `parse`: offline validation of a saved briefing
//!
//! ## Usage
//!
//! ```sh
//! econ_brief --config ./econ.yaml brief --archive-dir ./archive
//! ```
//!
//! ## Architecture
//!
//! 1. **Collecting**: scrape candidate `{title, url}` pairs per section
//! 2. **Generating**: ask the model to brief only those candidates
//! 3. **Validating**: split, parse and drop items whose URL was not offered
//! 4. **Delivering**: send each item, with a fixed delay between messages

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod brief;
mod cli;
mod config;
mod http;
mod kakao;
mod models;
mod outputs;
mod pipeline;
mod prompt;
mod scrapers;
mod state;
mod utils;

use api::{gemini_summarizer, gemini_with_backoff};
use cli::{Cli, Command};
use config::Config;
use http::HttpFetcher;
use kakao::token::KakaoCredentials;
use kakao::{ConsoleSender, KakaoClient, Sender};
use outputs::message::failure_notice;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env is fine; the environment may already carry the secrets.
    dotenv::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("econ_brief starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(command = args.command.name(), dry_run = args.dry_run, config = ?args.config, "Parsed CLI arguments");

    let config = Config::load(args.config.as_deref()).await?;
    let sender = match build_sender(&args, &config) {
        Ok(sender) => sender,
        Err(e) => {
            error!(error = %e, "Cannot build chat sender (check KAKAO_* environment variables)");
            return Err(e);
        }
    };

    if let Err(e) = run(&args, &config, &sender).await {
        error!(command = args.command.name(), error = %e, "Run failed");
        if args.command.sends_messages() {
            let notice = failure_notice(&format!("econ_brief {}", args.command.name()), &e.to_string());
            if let Err(send_err) = pipeline::notify(&sender, &notice, &config.kakao).await {
                warn!(error = %send_err, "Could not send failure notice");
            }
        }
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        command = args.command.name(),
        "Execution complete"
    );
    Ok(())
}

fn required(value: Option<&str>, name: &str) -> Result<String, Box<dyn Error>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("{name} is not set").into())
}

/// Kakao when sending for real, the console for dry runs and for runs that
/// never send.
fn build_sender(args: &Cli, config: &Config) -> Result<Sender, Box<dyn Error>> {
    if args.dry_run || !args.command.sends_messages() {
        info!("Messages will be printed, not sent");
        return Ok(Sender::Console(ConsoleSender));
    }
    let credentials = KakaoCredentials {
        rest_key: required(args.kakao_rest_key.as_deref(), "KAKAO_REST_KEY")?,
        refresh_token: required(args.kakao_refresh_token.as_deref(), "KAKAO_REFRESH_TOKEN")?,
        client_secret: args
            .kakao_client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    };
    Ok(Sender::Kakao(KakaoClient::new(&config.kakao, credentials)?))
}

async fn run(args: &Cli, config: &Config, sender: &Sender) -> Result<(), Box<dyn Error>> {
    let gemini_key = if args.command.needs_generator() {
        required(args.gemini_api_key.as_deref(), "GEMINI_API_KEY")?
    } else {
        String::new()
    };

    match &args.command {
        Command::Brief { archive_dir } => {
            // Early check: fail before scraping when the archive cannot be written
            if let Some(dir) = archive_dir {
                if let Err(e) = ensure_writable_dir(dir).await {
                    error!(path = %dir, error = %e, "Archive directory is not writable");
                    return Err(e);
                }
            }
            let fetcher = HttpFetcher::new(&config.scrape)?;
            let api = gemini_with_backoff(&config.gemini, &gemini_key)?;
            let archive = pipeline::run_brief(&fetcher, &api, sender, config, archive_dir.as_deref()).await?;
            info!(
                domestic = archive.domestic.len(),
                world = archive.world.len(),
                degraded = archive.degraded,
                fallback = ?archive.fallback_sections,
                "Briefing delivered"
            );
        }
        Command::Feeds { state } => {
            let fetcher = HttpFetcher::new(&config.scrape)?;
            let state_path = state.as_deref().unwrap_or(&config.feeds.state_path);
            let sent = pipeline::run_feeds(&fetcher, sender, config, state_path).await?;
            info!(sent, "Feed digest done");
        }
        Command::Summarize => {
            let fetcher = HttpFetcher::new(&config.scrape)?;
            let api = gemini_summarizer(&config.gemini, &config.summarize, &gemini_key)?;
            let sent = pipeline::run_summarize(&fetcher, &api, sender, config).await?;
            info!(sent, "Summaries done");
        }
        Command::Parse { brief, candidates } => {
            let archive = pipeline::run_parse(brief, candidates, config).await?;
            info!(domestic = archive.domestic.len(), world = archive.world.len(), "Parsed briefing");
        }
    }
    Ok(())
}
