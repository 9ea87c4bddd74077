//! Command-line interface definitions for econ_brief.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets are only ever read from the environment (or a `.env` file loaded
//! before parsing), never from the YAML configuration.

use clap::{Parser, Subcommand};

/// Command-line arguments for the econ_brief application.
///
/// # Examples
///
/// ```sh
/// # Morning briefing, printed instead of sent
/// econ_brief --dry-run brief
///
/// # RSS digest with a custom sent-state file
/// econ_brief --config ./econ.yaml feeds --state ./state_econ.json
///
/// # Validate a saved briefing offline
/// econ_brief parse --brief ./brief.txt --candidates ./candidates.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Print messages to stdout instead of sending them to KakaoTalk
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Kakao REST API key
    #[arg(long, env = "KAKAO_REST_KEY", hide_env_values = true)]
    pub kakao_rest_key: Option<String>,

    /// Kakao OAuth refresh token
    #[arg(long, env = "KAKAO_REFRESH_TOKEN", hide_env_values = true)]
    pub kakao_refresh_token: Option<String>,

    /// Kakao client secret, when the app has one enabled
    #[arg(long, env = "KAKAO_CLIENT_SECRET", hide_env_values = true)]
    pub kakao_client_secret: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scrape candidates, generate the briefing, validate it and send it
    Brief {
        /// Also archive the validated briefing under this directory
        #[arg(short, long)]
        archive_dir: Option<String>,
    },
    /// Send a digest of RSS entries that were not sent before
    Feeds {
        /// Sent-state file; defaults to `feeds.state_path` from the config
        #[arg(short, long)]
        state: Option<String>,
    },
    /// Send one generated summary per Daum article
    Summarize,
    /// Validate a saved briefing against saved candidates and print the result
    Parse {
        /// Generated briefing text file
        #[arg(short, long)]
        brief: String,

        /// JSON file `{ "domestic": [{title, url}], "world": [...] }`
        #[arg(short = 'k', long)]
        candidates: String,
    },
}

impl Command {
    /// Short name used in logs and failure notices.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Brief { .. } => "brief",
            Self::Feeds { .. } => "feeds",
            Self::Summarize => "summarize",
            Self::Parse { .. } => "parse",
        }
    }

    /// Whether the run talks to the generative API.
    pub fn needs_generator(&self) -> bool {
        matches!(self, Self::Brief { .. } | Self::Summarize)
    }

    /// Whether the run sends chat messages.
    pub fn sends_messages(&self) -> bool {
        !matches!(self, Self::Parse { .. })
    }
}
