//! "Already sent" record for the feed digest.
//!
//! ```json
//! { "sent": { "<guid | link | title>": 1736200000000 } }
//! ```
//!
//! Loaded once at the start of a run and rewritten once at the end. Two
//! overlapping runs may lose each other's entries; runs are expected to be
//! scheduled one at a time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SentState {
    #[serde(default)]
    pub sent: BTreeMap<String, i64>,
}

impl SentState {
    /// Load the state file; a missing file is an empty state.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            info!("No sent-state file yet; starting empty");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).await?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let state: Self = serde_json::from_str(&raw)?;
        info!(entries = state.sent.len(), "Loaded sent state");
        Ok(state)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).await?;
        info!(entries = self.sent.len(), "Saved sent state");
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sent.contains_key(key)
    }

    pub fn record(&mut self, key: impl Into<String>, at_ms: i64) {
        self.sent.insert(key.into(), at_ms);
    }
}
