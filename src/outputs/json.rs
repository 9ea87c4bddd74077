//! JSON archive of validated briefings.
//!
//! Files are organized by date:
//! ```text
//! archive_dir/
//! └── 2025-05-06/
//!     └── brief.json
//! ```
//!
//! A second run on the same day overwrites the day's file.

use crate::models::BriefArchive;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`BriefArchive`] to `{archive_dir}/{date}/brief.json`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(archive_dir = %archive_dir, date = %archive.date))]
pub async fn write_archive(archive: &BriefArchive, archive_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(archive)?;

    let day_dir = PathBuf::from(archive_dir).join(&archive.date);
    info!(day_dir = %day_dir.display(), "Ensuring archive directory exists");
    if let Err(e) = fs::create_dir_all(&day_dir).await {
        error!(day_dir = %day_dir.display(), error = %e, "Failed to create archive dir");
        return Err(e.into());
    }

    let path = day_dir.join("brief.json");
    fs::write(&path, json).await?;
    info!(path = %path.display(), domestic = archive.domestic.len(), world = archive.world.len(), "Wrote briefing archive");

    Ok(path)
}
