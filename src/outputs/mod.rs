//! Everything that leaves the process other than log lines.
//!
//! # Submodules
//!
//! - [`message`]: formats briefing items, digests and notices as chat messages
//! - [`json`]: archives a validated briefing to a dated JSON file

pub mod json;
pub mod message;
