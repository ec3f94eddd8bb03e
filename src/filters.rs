//! Candidate filtering.
//!
//! Decides which files are eligible for organization at all, before any
//! classification happens. Hidden files and partially downloaded files are
//! skipped by default so the watcher never grabs a download in progress.

use crate::config::IgnoreSettings;
use glob::Pattern;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("invalid ignore pattern '{pattern}': {reason}")]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

/// Ignore rules compiled once per invocation.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    hidden_files: bool,
    patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Compiles the ignore settings.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first glob pattern that does not compile.
    pub fn new(settings: &IgnoreSettings) -> Result<Self, InvalidPattern> {
        let patterns = settings
            .patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            hidden_files: settings.hidden_files,
            patterns,
        })
    }

    /// Check if a file is a candidate for organization.
    ///
    /// Patterns match the file name only, case-insensitively.
    pub fn should_include(&self, file_path: &Path) -> bool {
        let Some(file_name) = file_path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };

        if !self.hidden_files && file_name.starts_with('.') {
            return false;
        }

        let options = glob::MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        !self
            .patterns
            .iter()
            .any(|pattern| pattern.matches_with(&file_name, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(hidden_files: bool, patterns: &[&str]) -> IgnoreSettings {
        IgnoreSettings {
            hidden_files,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_hidden_files_excluded_by_default() {
        let filters = CompiledFilters::new(&IgnoreSettings::default()).unwrap();
        assert!(!filters.should_include(Path::new("/dl/.DS_Store")));
        assert!(filters.should_include(Path::new("/dl/report.pdf")));
    }

    #[test]
    fn test_hidden_files_included_when_enabled() {
        let filters = CompiledFilters::new(&settings(true, &[])).unwrap();
        assert!(filters.should_include(Path::new("/dl/.hidden.pdf")));
    }

    #[test]
    fn test_partial_downloads_are_ignored() {
        let filters = CompiledFilters::new(&IgnoreSettings::default()).unwrap();
        assert!(!filters.should_include(Path::new("/dl/movie.mp4.crdownload")));
        assert!(!filters.should_include(Path::new("/dl/movie.mp4.PART")));
        assert!(filters.should_include(Path::new("/dl/movie.mp4")));
    }

    #[test]
    fn test_patterns_match_file_name_only() {
        let filters = CompiledFilters::new(&settings(false, &["draft*"])).unwrap();
        assert!(!filters.should_include(Path::new("/home/me/draft-1.pdf")));
        assert!(filters.should_include(Path::new("/drafts/final.pdf")));
    }

    #[test]
    fn test_invalid_pattern_returns_error() {
        let result = CompiledFilters::new(&settings(false, &["[invalid"]));
        assert!(result.is_err());
    }
}
