//! auv - organize files by type, with a reversible history
//!
//! This library classifies files by extension, moves them into per-category
//! folders, records every batch in a timeline that can be rolled back, and
//! can watch the downloads folder to do all of this in the background.

pub mod cli;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod filters;
pub mod history;
pub mod output;
pub mod rollback;
pub mod watcher;

pub use config::{AppPaths, Config, ConfigError, ConfigStore};
pub use file_category::{Category, CategoryId, Classifier};
pub use file_organizer::{FileOrganizer, OrganizeError, Organizer};
pub use history::{Ledger, LedgerError, TimelineEntry, TimelineId};
pub use rollback::{RollbackEngine, RollbackError, RollbackReport};

pub use cli::{Cli, run_cli};
