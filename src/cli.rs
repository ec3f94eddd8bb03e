//! Command-line interface module for auv.
//!
//! Parses arguments with `clap` and dispatches each command to the library.
//! Library errors are wrapped with `anyhow` context here; this is the only
//! layer that prints to the terminal.

use crate::config::{AppPaths, Config, ConfigStore};
use crate::file_category::{Category, CategoryId};
use crate::file_organizer::{Destination, OrganizeRequest, Organizer};
use crate::history::{Ledger, TimelineId};
use crate::output::OutputFormatter;
use crate::rollback::RollbackEngine;
use crate::watcher;
use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Organize files by type, with a reversible history.
#[derive(Debug, Parser)]
#[command(name = "auv", version, about)]
pub struct Cli {
    /// Directory holding config.json and history.json.
    #[arg(long, global = true, env = "AUV_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn", value_name = "LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Move files into their category folders.
    Organize(OrganizeArgs),

    /// Show configuration, history and watcher state.
    Status,

    /// List recent history entries, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Undo the latest organization, or everything back to a timeline id.
    #[command(visible_alias = "return")]
    Rollback {
        /// Timeline id such as T12.
        timeline: Option<TimelineId>,
    },

    /// Change configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Control the background watcher.
    #[command(subcommand)]
    Watch(WatchCommand),
}

#[derive(Debug, Args)]
pub struct OrganizeArgs {
    /// Categories or custom commands to organize; all enabled ones if omitted.
    pub categories: Vec<String>,

    /// Destination: `here`, `downloads`, or a path.
    #[arg(long, value_name = "here|downloads|PATH")]
    pub to: Option<String>,

    /// Folder name for `--to here`.
    #[arg(long, value_name = "NAME")]
    pub folder: Option<String>,

    /// Organize the downloads folder instead of the current directory.
    #[arg(short = 'd', long)]
    pub downloads: bool,

    /// Show what would move without moving anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Enable a category or custom command.
    Enable { name: String },

    /// Disable a category or custom command.
    Disable { name: String },

    /// Set the target path of a category, or the downloads folder.
    Path { name: String, path: PathBuf },

    /// Manage custom commands.
    #[command(subcommand)]
    Custom(CustomCommandAction),

    /// Change history settings.
    History(HistoryArgs),

    /// Restore the default configuration.
    Reset,
}

#[derive(Debug, Subcommand)]
pub enum CustomCommandAction {
    /// Add a custom command for a set of extensions.
    Add {
        name: String,
        #[arg(required = true)]
        extensions: Vec<String>,
        #[arg(long)]
        path: Option<PathBuf>,
    },

    Remove { name: String },

    List,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    #[arg(long)]
    pub disable: bool,

    /// Maximum number of entries kept; 0 for no limit.
    #[arg(long)]
    pub max_entries: Option<usize>,

    /// Drop entries older than this many days; 0 to keep forever.
    #[arg(long)]
    pub cleanup_days: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum WatchCommand {
    /// Start the watcher in the background.
    Start,
    /// Stop a running watcher.
    Stop,
    /// Run the watcher in the foreground.
    Run,
}

/// Where a command runs.
#[derive(Debug, Clone)]
pub struct Context {
    pub paths: AppPaths,
    /// Base for `here` destinations and relative paths.
    pub cwd: PathBuf,
    /// Home directory used for default target paths.
    pub home: PathBuf,
    /// Show a progress bar while moving files.
    pub progress: bool,
}

impl Context {
    /// Builds the context from parsed flags and the process environment.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let paths = match &cli.config_dir {
            Some(dir) => AppPaths::new(dir),
            None => AppPaths::default_location()
                .context("could not determine the configuration directory; pass --config-dir")?,
        };
        let cwd = std::env::current_dir().context("could not read the current directory")?;
        let home = dirs::home_dir().context("could not determine the home directory")?;
        Ok(Self {
            paths,
            cwd,
            home,
            progress: true,
        })
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::new(&self.paths)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

/// Runs one command.
///
/// # Examples
///
/// ```no_run
/// use auv::cli::{Cli, Context, run_cli};
/// use clap::Parser;
///
/// let cli = Cli::parse_from(["auv", "organize", "pdf", "--dry-run"]);
/// let context = Context::from_cli(&cli).unwrap();
/// if let Err(e) = run_cli(cli.command, &context) {
///     eprintln!("Error: {:#}", e);
/// }
/// ```
pub fn run_cli(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Organize(args) => organize(args, ctx),
        Commands::Status => status(ctx),
        Commands::History { limit } => history(limit, ctx),
        Commands::Rollback { timeline } => rollback(timeline, ctx),
        Commands::Config(command) => config(command, ctx),
        Commands::Watch(command) => watch(command, ctx),
    }
}

fn organize(args: OrganizeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.store().load().context("failed to load configuration")?;
    let mut ledger = Ledger::open(&ctx.paths.history_file(), &config.history)
        .context("failed to load history")?;

    let source = if args.downloads {
        config.downloads_path.clone()
    } else {
        ctx.cwd.clone()
    };
    let destination = match args.to.as_deref() {
        None if args.folder.is_some() => Destination::Here(args.folder.clone()),
        None => Destination::Configured,
        Some(to) => match to.parse::<Destination>().unwrap_or_else(|never| match never {}) {
            Destination::Here(_) => Destination::Here(args.folder.clone()),
            other => other,
        },
    };

    let request = OrganizeRequest {
        source,
        selection: args.categories,
        destination,
        cwd: ctx.cwd.clone(),
    };

    let mut organizer = Organizer::new(&config, &mut ledger)?;
    let plan = organizer.plan(&request)?;
    if args.dry_run {
        OutputFormatter::plan(&plan);
        return Ok(());
    }

    OutputFormatter::info(&format!("Organizing {}", request.source.display()));
    if ctx.progress {
        organizer = organizer.with_progress(OutputFormatter::create_progress_bar());
    }
    let report = organizer.execute(plan)?;
    OutputFormatter::organize_report(&report);

    if report.total_moved() > 0 && ledger.is_enabled() {
        OutputFormatter::plain("Use 'auv rollback' to undo.");
    }
    Ok(())
}

fn status(ctx: &Context) -> Result<()> {
    let config = ctx.store().load().context("failed to load configuration")?;
    let ledger = Ledger::open(&ctx.paths.history_file(), &config.history)
        .context("failed to load history")?;

    OutputFormatter::header("auv status");
    OutputFormatter::field("Config", &ctx.store().path().display().to_string());
    OutputFormatter::field("Downloads", &config.downloads_path.display().to_string());
    OutputFormatter::field(
        "Watcher",
        if watcher::is_running(&ctx.paths) {
            "running"
        } else {
            "stopped"
        },
    );
    let history = if config.history.enabled {
        format!(
            "enabled, {} entries (max {}, cleanup after {} days)",
            ledger.len(),
            config.history.max_entries,
            config.history.auto_cleanup_days
        )
    } else {
        "disabled".to_string()
    };
    OutputFormatter::field("History", &history);

    OutputFormatter::header("File types");
    for category in Category::ALL {
        let id = CategoryId::Builtin(category);
        let target = config
            .target_path(&id)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        OutputFormatter::plain(&format!(
            "  {} {:<10} {:<28} → {}",
            if config.is_category_enabled(category) { "●" } else { "○" },
            category.id(),
            category.description(),
            target
        ));
    }

    if !config.custom_commands.is_empty() {
        custom_list(&config);
    }
    Ok(())
}

fn history(limit: usize, ctx: &Context) -> Result<()> {
    let config = ctx.store().load().context("failed to load configuration")?;
    let ledger = Ledger::open(&ctx.paths.history_file(), &config.history)
        .context("failed to load history")?;
    if !ledger.is_enabled() {
        OutputFormatter::warning("History is disabled.");
    }
    OutputFormatter::history_table(&ledger.list(limit), &ledger.rolled_back_ids());
    Ok(())
}

fn rollback(timeline: Option<TimelineId>, ctx: &Context) -> Result<()> {
    let config = ctx.store().load().context("failed to load configuration")?;
    let mut ledger = Ledger::open(&ctx.paths.history_file(), &config.history)
        .context("failed to load history")?;

    let report = RollbackEngine::new(&mut ledger).rollback(timeline)?;
    OutputFormatter::rollback_report(&report);
    Ok(())
}

fn config(command: ConfigCommand, ctx: &Context) -> Result<()> {
    let store = ctx.store();
    match command {
        ConfigCommand::Enable { name } => {
            store.update(format!("Enabled {}", name), |c| c.set_enabled(&name, true))?;
            OutputFormatter::success(&format!("Enabled {}", name));
        }
        ConfigCommand::Disable { name } => {
            store.update(format!("Disabled {}", name), |c| c.set_enabled(&name, false))?;
            OutputFormatter::success(&format!("Disabled {}", name));
        }
        ConfigCommand::Path { name, path } => {
            let path = ctx.absolute(&path);
            store.update(
                format!("Set {} path to {}", name, path.display()),
                |c| c.set_path(&name, path.clone()),
            )?;
            OutputFormatter::success(&format!("{} now goes to {}", name, path.display()));
        }
        ConfigCommand::Custom(CustomCommandAction::Add {
            name,
            extensions,
            path,
        }) => {
            let path = path.map(|p| ctx.absolute(&p));
            let config = store.update(
                format!("Added custom command {} ({})", name, extensions.join(" ")),
                |c| c.add_custom_command(&name, &extensions, path, &ctx.home),
            )?;
            if let Some(command) = config.custom_commands.get(&name) {
                OutputFormatter::success(&format!(
                    "Added {} for {} → {}",
                    name,
                    command.extensions.join(", "),
                    command.target_path.display()
                ));
            }
        }
        ConfigCommand::Custom(CustomCommandAction::Remove { name }) => {
            store.update(format!("Removed custom command {}", name), |c| {
                c.remove_custom_command(&name).map(|_| ())
            })?;
            OutputFormatter::success(&format!("Removed {}", name));
        }
        ConfigCommand::Custom(CustomCommandAction::List) => {
            let config = store.load().context("failed to load configuration")?;
            if config.custom_commands.is_empty() {
                OutputFormatter::info("No custom commands.");
            } else {
                custom_list(&config);
            }
        }
        ConfigCommand::History(args) => {
            if !args.enable && !args.disable && args.max_entries.is_none() && args.cleanup_days.is_none() {
                bail!("nothing to change; pass --enable, --disable, --max-entries or --cleanup-days");
            }
            let config = store.update("Changed history settings", |c| {
                if args.enable {
                    c.history.enabled = true;
                }
                if args.disable {
                    c.history.enabled = false;
                }
                if let Some(max) = args.max_entries {
                    c.history.max_entries = max;
                }
                if let Some(days) = args.cleanup_days {
                    c.history.auto_cleanup_days = days;
                }
                Ok(())
            })?;
            OutputFormatter::success(&format!(
                "History {} (max {}, cleanup after {} days)",
                if config.history.enabled { "enabled" } else { "disabled" },
                config.history.max_entries,
                config.history.auto_cleanup_days
            ));
        }
        ConfigCommand::Reset => {
            store.update("Reset configuration to defaults", |c| {
                *c = Config::with_home(&ctx.home);
                Ok(())
            })?;
            OutputFormatter::success("Configuration reset to defaults");
        }
    }
    Ok(())
}

fn custom_list(config: &Config) {
    OutputFormatter::header("Custom commands");
    for (name, command) in config.custom_commands.iter() {
        OutputFormatter::plain(&format!(
            "  {} {:<10} {:<28} → {}",
            if command.enabled { "●" } else { "○" },
            name,
            command.extensions.join(" "),
            command.target_path.display()
        ));
    }
}

fn watch(command: WatchCommand, ctx: &Context) -> Result<()> {
    match command {
        WatchCommand::Start => {
            let pid = watcher::start(&ctx.paths)?;
            OutputFormatter::success(&format!("Watcher started (pid {})", pid));
        }
        WatchCommand::Stop => {
            if watcher::stop(&ctx.paths)? {
                OutputFormatter::success("Watcher stopping");
            } else {
                OutputFormatter::info("Watcher is not running.");
            }
        }
        WatchCommand::Run => watcher::run(&ctx.paths)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rollback_alias_and_timeline_parsing() {
        let cli = Cli::try_parse_from(["auv", "return", "T3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rollback { timeline: Some(id) } if id == TimelineId::new(3)
        ));
        assert!(Cli::try_parse_from(["auv", "rollback", "X3"]).is_err());
    }

    #[test]
    fn test_organize_arguments() {
        let cli = Cli::try_parse_from([
            "auv", "organize", "pdf", "image", "--to", "here", "--folder", "stuff", "-d",
        ])
        .unwrap();
        let Commands::Organize(args) = cli.command else {
            panic!("expected organize");
        };
        assert_eq!(args.categories, vec!["pdf", "image"]);
        assert_eq!(args.to.as_deref(), Some("here"));
        assert_eq!(args.folder.as_deref(), Some("stuff"));
        assert!(args.downloads);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_custom_add_requires_extensions() {
        assert!(Cli::try_parse_from(["auv", "config", "custom", "add", "ai"]).is_err());
        assert!(Cli::try_parse_from(["auv", "config", "custom", "add", "ai", ".ai", ".eps"]).is_ok());
    }
}
