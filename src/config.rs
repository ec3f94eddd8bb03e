//! Configuration document and its on-disk store.
//!
//! The configuration is a single JSON document shared by every invocation
//! (interactive commands and the watcher alike). Nothing is cached between
//! invocations: each entry point loads the document, applies its change in
//! memory, and writes the whole document back with an atomic rename.
//!
//! # Document Format
//!
//! ```json
//! {
//!   "downloads_path": "/home/me/Downloads",
//!   "target_paths": { "pdf": "/home/me/Documents/PDFs" },
//!   "file_types": { "pdf": true, "code": false },
//!   "custom_commands": {
//!     "py": { "extensions": [".py"], "target_path": "/home/me/Documents/PyFiles", "enabled": true }
//!   },
//!   "history": { "enabled": true, "max_entries": 1000, "auto_cleanup_days": 30 },
//!   "watcher": { "watch_subdirs": false, "settle_ms": 1000 },
//!   "ignore": { "hidden_files": false, "patterns": ["*.crdownload", "*.part"] }
//! }
//! ```
//!
//! Missing keys fall back to their defaults, so older documents keep loading.

use crate::file_category::{Category, CategoryId, normalize_extension, title_case};
use crate::history::{EntryDraft, Ledger, LedgerError};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = "config.json";
const HISTORY_FILE: &str = "history.json";
const PID_FILE: &str = "watcher.pid";

/// Errors raised while loading, saving or mutating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access configuration file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("configuration file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("unknown file type or custom command '{0}'")]
    UnknownCategory(String),

    #[error("custom command '{0}' already exists")]
    CustomCommandExists(String),

    #[error("custom command '{0}' not found")]
    CustomCommandNotFound(String),

    #[error("invalid custom command name '{0}'")]
    InvalidCommandName(String),

    #[error("custom command '{0}' needs at least one extension")]
    NoExtensions(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Locations of every document the tool keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    dir: PathBuf,
}

impl AppPaths {
    /// Uses `dir` for the configuration, history and PID files.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform configuration directory joined with `auv`.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::new(dir.join("auv")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn history_file(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join(PID_FILE)
    }
}

/// History retention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    /// When false, nothing is recorded and rollback is unavailable.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of entries kept; 0 disables the limit.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entries older than this many days are dropped; 0 disables age pruning.
    #[serde(default = "default_cleanup_days")]
    pub auto_cleanup_days: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    1000
}

fn default_cleanup_days() -> u32 {
    30
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            auto_cleanup_days: default_cleanup_days(),
        }
    }
}

/// Settings for the background watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherSettings {
    /// Watch subdirectories of the downloads folder too.
    #[serde(default)]
    pub watch_subdirs: bool,

    /// How long to wait after a create event before moving the file.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    1000
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            watch_subdirs: false,
            settle_ms: default_settle_ms(),
        }
    }
}

/// Which files are never organized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreSettings {
    /// Whether dotfiles are candidates. Defaults to false.
    #[serde(default)]
    pub hidden_files: bool,

    /// Glob patterns matched against file names.
    #[serde(default = "default_ignore_patterns")]
    pub patterns: Vec<String>,
}

fn default_ignore_patterns() -> Vec<String> {
    ["*.crdownload", "*.part", "*.tmp", "*.download"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for IgnoreSettings {
    fn default() -> Self {
        Self {
            hidden_files: false,
            patterns: default_ignore_patterns(),
        }
    }
}

/// A user-defined category with its own invocation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub extensions: Vec<String>,
    pub target_path: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Custom commands in the order they were defined.
///
/// Order matters: when two custom commands claim the same extension, the
/// one defined first wins. Serialized as a JSON object whose key order is
/// preserved in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomCommands(Vec<(String, CustomCommand)>);

impl CustomCommands {
    pub fn get(&self, name: &str) -> Option<&CustomCommand> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CustomCommand> {
        self.0.iter_mut().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Inserts a command, replacing an existing one in place.
    pub fn insert(&mut self, name: String, command: CustomCommand) {
        match self.get_mut(&name) {
            Some(existing) => *existing = command,
            None => self.0.push((name, command)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<CustomCommand> {
        let index = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CustomCommand)> {
        self.0.iter().map(|(n, c)| (n, c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for CustomCommands {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, command)| (name, command)))
    }
}

impl<'de> Deserialize<'de> for CustomCommands {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CustomCommandsVisitor;

        impl<'de> Visitor<'de> for CustomCommandsVisitor {
            type Value = CustomCommands;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of custom command definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut commands = CustomCommands::default();
                while let Some((name, command)) = map.next_entry::<String, CustomCommand>()? {
                    commands.insert(name, command);
                }
                Ok(commands)
            }
        }

        deserializer.deserialize_map(CustomCommandsVisitor)
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub downloads_path: PathBuf,
    pub target_paths: BTreeMap<String, PathBuf>,
    pub file_types: BTreeMap<String, bool>,
    pub custom_commands: CustomCommands,
    pub history: HistorySettings,
    pub watcher: WatcherSettings,
    pub ignore: IgnoreSettings,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_home(&home)
    }
}

impl Config {
    /// Default configuration rooted at `home`.
    pub fn with_home(home: &Path) -> Self {
        Self {
            downloads_path: home.join("Downloads"),
            target_paths: Category::ALL
                .into_iter()
                .map(|c| (c.id().to_string(), c.default_target(home)))
                .collect(),
            file_types: Category::ALL
                .into_iter()
                .map(|c| (c.id().to_string(), c.enabled_by_default()))
                .collect(),
            custom_commands: CustomCommands::default(),
            history: HistorySettings::default(),
            watcher: WatcherSettings::default(),
            ignore: IgnoreSettings::default(),
        }
    }

    pub fn is_category_enabled(&self, category: Category) -> bool {
        self.file_types
            .get(category.id())
            .copied()
            .unwrap_or_else(|| category.enabled_by_default())
    }

    /// Whether a built-in category or custom command is enabled.
    pub fn is_enabled(&self, id: &CategoryId) -> bool {
        match id {
            CategoryId::Builtin(category) => self.is_category_enabled(*category),
            CategoryId::Custom(name) => self
                .custom_commands
                .get(name)
                .is_some_and(|command| command.enabled),
        }
    }

    /// Configured destination for a category, if one is known.
    pub fn target_path(&self, id: &CategoryId) -> Option<PathBuf> {
        match id {
            CategoryId::Builtin(category) => self.target_paths.get(category.id()).cloned(),
            CategoryId::Custom(name) => self
                .custom_commands
                .get(name)
                .map(|command| command.target_path.clone()),
        }
    }

    /// Enables or disables a built-in category or custom command.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        match CategoryId::resolve(name, self) {
            Some(CategoryId::Custom(name)) => {
                if let Some(command) = self.custom_commands.get_mut(&name) {
                    command.enabled = enabled;
                }
                Ok(())
            }
            Some(CategoryId::Builtin(category)) => {
                self.file_types.insert(category.id().to_string(), enabled);
                Ok(())
            }
            None => Err(ConfigError::UnknownCategory(name.to_string())),
        }
    }

    /// Sets the target path of a category, or the downloads folder when
    /// `name` is `downloads`. The path should already be absolute.
    pub fn set_path(&mut self, name: &str, path: PathBuf) -> Result<(), ConfigError> {
        if name == "downloads" {
            self.downloads_path = path;
            return Ok(());
        }
        match CategoryId::resolve(name, self) {
            Some(CategoryId::Custom(name)) => {
                if let Some(command) = self.custom_commands.get_mut(&name) {
                    command.target_path = path;
                }
                Ok(())
            }
            Some(CategoryId::Builtin(category)) => {
                self.target_paths.insert(category.id().to_string(), path);
                Ok(())
            }
            None => Err(ConfigError::UnknownCategory(name.to_string())),
        }
    }

    /// Adds an enabled custom command.
    ///
    /// Extensions are normalized to lowercase with a leading dot. Without a
    /// target path the command moves files to `<home>/Documents/<Name>Files`.
    pub fn add_custom_command(
        &mut self,
        name: &str,
        extensions: &[String],
        target_path: Option<PathBuf>,
        home: &Path,
    ) -> Result<(), ConfigError> {
        let valid_name = !name.is_empty()
            && name != "downloads"
            && Category::from_id(name).is_none()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_name {
            return Err(ConfigError::InvalidCommandName(name.to_string()));
        }
        if self.custom_commands.get(name).is_some() {
            return Err(ConfigError::CustomCommandExists(name.to_string()));
        }

        let mut normalized: Vec<String> = Vec::new();
        for ext in extensions.iter().map(|e| normalize_extension(e)) {
            if ext != "." && !normalized.contains(&ext) {
                normalized.push(ext);
            }
        }
        if normalized.is_empty() {
            return Err(ConfigError::NoExtensions(name.to_string()));
        }

        let target_path = target_path.unwrap_or_else(|| {
            home.join("Documents")
                .join(format!("{}Files", title_case(name)))
        });

        self.custom_commands.insert(
            name.to_string(),
            CustomCommand {
                extensions: normalized,
                target_path,
                enabled: true,
            },
        );
        Ok(())
    }

    pub fn remove_custom_command(&mut self, name: &str) -> Result<CustomCommand, ConfigError> {
        self.custom_commands
            .remove(name)
            .ok_or_else(|| ConfigError::CustomCommandNotFound(name.to_string()))
    }
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it over
/// `path`. A crash mid-write leaves the previous document intact.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

/// Loads and saves the configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_file: PathBuf,
    history_file: PathBuf,
}

impl ConfigStore {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            config_file: paths.config_file(),
            history_file: paths.history_file(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_file
    }

    /// Loads the configuration, writing the defaults on first run.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Corrupt` if the document exists but is not a
    /// valid configuration. No repair is attempted.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let content = match fs::read_to_string(&self.config_file) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.config_file.display(),
                    "no configuration found, creating defaults"
                );
                let config = Config::default();
                self.save(&config)?;
                return Ok(config);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.config_file.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Corrupt {
            path: self.config_file.clone(),
            source,
        })
    }

    /// Atomically replaces the document with `config`.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(config).map_err(ConfigError::Serialize)?;
        write_atomic(&self.config_file, json.as_bytes()).map_err(|source| ConfigError::Io {
            path: self.config_file.clone(),
            source,
        })?;
        tracing::debug!(path = %self.config_file.display(), "configuration saved");
        Ok(())
    }

    /// Loads the configuration, applies `mutator`, saves it, and records a
    /// non-reversible configuration change in the history.
    ///
    /// The history entry honours the settings as they are after the change,
    /// so disabling history is itself not recorded.
    pub fn update<F>(&self, description: impl Into<String>, mutator: F) -> Result<Config, ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<(), ConfigError>,
    {
        let mut config = self.load()?;
        mutator(&mut config)?;

        // An unreadable history aborts the change before anything is written.
        let mut ledger = Ledger::open(&self.history_file, &config.history)?;
        self.save(&config)?;
        ledger.append(EntryDraft::config_change(description))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ConfigStore {
        ConfigStore::new(&AppPaths::new(dir.path()))
    }

    #[test]
    fn test_default_config_enables_basic_types_only() {
        let config = Config::with_home(Path::new("/home/me"));
        assert!(config.is_category_enabled(Category::Pdf));
        assert!(config.is_category_enabled(Category::Audio));
        assert!(!config.is_category_enabled(Category::Code));
        assert!(!config.is_category_enabled(Category::Ebook));
        assert_eq!(config.downloads_path, PathBuf::from("/home/me/Downloads"));
        assert_eq!(
            config.target_path(&CategoryId::Builtin(Category::Pdf)),
            Some(PathBuf::from("/home/me/Documents/PDFs"))
        );
    }

    #[test]
    fn test_load_creates_default_document() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(!store.path().exists());

        let config = store.load().unwrap();
        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_load_fills_missing_keys_with_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), r#"{ "downloads_path": "/data/dl" }"#).unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.downloads_path, PathBuf::from("/data/dl"));
        assert_eq!(config.history, HistorySettings::default());
        assert!(config.custom_commands.is_empty());
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, ConfigError::Corrupt { .. }));
        // The corrupt document is left untouched.
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&Config::with_home(dir.path())).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["config.json".to_string()]);
    }

    #[test]
    fn test_custom_commands_preserve_order_through_json() {
        let mut config = Config::with_home(Path::new("/h"));
        for name in ["zeta", "alpha", "mid"] {
            config
                .add_custom_command(name, &[format!(".{}", name)], None, Path::new("/h"))
                .unwrap();
        }

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        let names: Vec<_> = parsed.custom_commands.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_add_custom_command_normalizes_extensions() {
        let mut config = Config::with_home(Path::new("/h"));
        config
            .add_custom_command(
                "py",
                &["PY".to_string(), ".pyw".to_string(), ".py".to_string()],
                None,
                Path::new("/h"),
            )
            .unwrap();

        let command = config.custom_commands.get("py").unwrap();
        assert_eq!(command.extensions, vec![".py", ".pyw"]);
        assert_eq!(command.target_path, PathBuf::from("/h/Documents/PyFiles"));
        assert!(command.enabled);
    }

    #[test]
    fn test_add_custom_command_rejects_bad_names_and_duplicates() {
        let mut config = Config::with_home(Path::new("/h"));
        let exts = vec![".x".to_string()];
        assert!(matches!(
            config.add_custom_command("pdf", &exts, None, Path::new("/h")),
            Err(ConfigError::InvalidCommandName(_))
        ));
        assert!(matches!(
            config.add_custom_command("has space", &exts, None, Path::new("/h")),
            Err(ConfigError::InvalidCommandName(_))
        ));
        assert!(matches!(
            config.add_custom_command("empty", &[], None, Path::new("/h")),
            Err(ConfigError::NoExtensions(_))
        ));
        config.add_custom_command("x", &exts, None, Path::new("/h")).unwrap();
        assert!(matches!(
            config.add_custom_command("x", &exts, None, Path::new("/h")),
            Err(ConfigError::CustomCommandExists(_))
        ));
    }

    #[test]
    fn test_set_enabled_and_path() {
        let mut config = Config::with_home(Path::new("/h"));
        config.set_enabled("code", true).unwrap();
        assert!(config.is_category_enabled(Category::Code));

        config.set_path("downloads", PathBuf::from("/dl")).unwrap();
        assert_eq!(config.downloads_path, PathBuf::from("/dl"));

        config.set_path("image", PathBuf::from("/pics")).unwrap();
        assert_eq!(
            config.target_path(&CategoryId::Builtin(Category::Image)),
            Some(PathBuf::from("/pics"))
        );

        assert!(matches!(
            config.set_enabled("nope", true),
            Err(ConfigError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_update_records_config_change() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::new(dir.path());
        let store = ConfigStore::new(&paths);

        let config = store
            .update("Enabled file type: code", |c| c.set_enabled("code", true))
            .unwrap();
        assert!(config.is_category_enabled(Category::Code));
        assert!(store.load().unwrap().is_category_enabled(Category::Code));

        let ledger = Ledger::open(&paths.history_file(), &config.history).unwrap();
        let entries = ledger.list(10);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].reversible);
        assert_eq!(entries[0].description, "Enabled file type: code");
    }

    #[test]
    fn test_failed_mutation_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::new(dir.path());
        let store = ConfigStore::new(&paths);
        let before = store.load().unwrap();

        let result = store.update("bad", |c| c.set_enabled("nope", true));
        assert!(result.is_err());
        assert_eq!(store.load().unwrap(), before);
        assert!(!paths.history_file().exists());
    }

    #[test]
    fn test_corrupt_history_aborts_update() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::new(dir.path());
        let store = ConfigStore::new(&paths);
        let before = store.load().unwrap();
        fs::write(paths.history_file(), "{ broken").unwrap();

        let result = store.update("Enabled file type: code", |c| c.set_enabled("code", true));

        assert!(matches!(
            result,
            Err(ConfigError::Ledger(LedgerError::Corrupt { .. }))
        ));
        assert_eq!(store.load().unwrap(), before);
        assert!(!store.load().unwrap().is_category_enabled(Category::Code));
    }

    #[test]
    fn test_custom_command_enabled_defaults_to_true() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            r#"{ "custom_commands": { "py": { "extensions": [".py"], "target_path": "/x/py" } } }"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert!(config.custom_commands.get("py").unwrap().enabled);
    }
}
