/// File organization: moving files into category directories.
///
/// Two layers live here. [`FileOrganizer`] is the mover: it takes a batch of
/// files and a destination directory and moves them without ever overwriting
/// anything. [`Organizer`] is the single entry point shared by the
/// interactive command and the watcher: it classifies candidates, resolves
/// each category's destination, runs the mover, and records every non-empty
/// batch in the history.
use crate::config::Config;
use crate::file_category::{CategoryId, Classifier};
use crate::filters::{CompiledFilters, InvalidPattern};
use crate::history::{EntryDraft, FileMove, Ledger, LedgerError, OperationKind, TimelineId};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during file organization operations.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// The destination could not be created or is not writable. Raised
    /// before any file of the batch is moved.
    #[error("destination {} is not writable: {reason}", path.display())]
    DestinationUnwritable { path: PathBuf, reason: String },

    #[error("failed to read source directory {}: {source}", path.display())]
    SourceUnreadable { path: PathBuf, source: io::Error },

    #[error("unknown file type or custom command '{0}'")]
    UnknownCategory(String),

    #[error("no target path configured for '{0}'")]
    NoTargetPath(String),

    #[error(transparent)]
    Filters(#[from] InvalidPattern),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Outcome of moving one batch of files.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Files that were moved, in the order they were moved.
    pub moved: Vec<FileMove>,
    /// Files left in place because the destination already had that name.
    pub skipped: Vec<(PathBuf, String)>,
    /// Files left in place because of an I/O error.
    pub failed: Vec<(PathBuf, String)>,
}

/// Moves files into a destination directory.
pub struct FileOrganizer;

impl FileOrganizer {
    /// Moves every file in `files` into `destination`.
    ///
    /// The destination is created recursively if needed. A file whose name
    /// already exists at the destination is skipped and reported; the rest of
    /// the batch still moves.
    ///
    /// # Errors
    ///
    /// Returns `OrganizeError::DestinationUnwritable` if the destination
    /// cannot be created or is read-only. No file has been moved in that case.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use auv::file_organizer::FileOrganizer;
    /// use std::path::{Path, PathBuf};
    ///
    /// let files = vec![PathBuf::from("/home/me/Downloads/report.pdf")];
    /// match FileOrganizer::move_batch(&files, Path::new("/home/me/Documents/PDFs")) {
    ///     Ok(result) => println!("Moved {} files", result.moved.len()),
    ///     Err(e) => eprintln!("Organization failed: {}", e),
    /// }
    /// ```
    pub fn move_batch(files: &[PathBuf], destination: &Path) -> OrganizeResult<BatchResult> {
        Self::move_batch_with_progress(files, destination, &ProgressBar::hidden())
    }

    /// Same as [`FileOrganizer::move_batch`], advancing `progress` once per file.
    pub fn move_batch_with_progress(
        files: &[PathBuf],
        destination: &Path,
        progress: &ProgressBar,
    ) -> OrganizeResult<BatchResult> {
        Self::ensure_writable(destination)?;

        let mut result = BatchResult::default();
        for file in files {
            progress.inc(1);

            let Some(file_name) = file.file_name() else {
                result
                    .failed
                    .push((file.clone(), "file has no name component".to_string()));
                continue;
            };
            let target = destination.join(file_name);

            if target.symlink_metadata().is_ok() {
                tracing::debug!(file = %file.display(), "name collision at destination");
                result.skipped.push((
                    file.clone(),
                    format!("{} already exists", target.display()),
                ));
                continue;
            }

            match Self::move_file(file, &target) {
                Ok(()) => {
                    tracing::debug!(from = %file.display(), to = %target.display(), "moved");
                    result.moved.push(FileMove::new(file.clone(), target));
                }
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "move failed");
                    result.failed.push((file.clone(), e.to_string()));
                }
            }
        }

        Ok(result)
    }

    /// Moves a single file, leaving it either fully moved or untouched.
    ///
    /// Uses a rename when possible. Across volumes it copies, checks the
    /// copied length, and only then deletes the original.
    pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => Self::copy_then_remove(from, to),
            Err(e) => Err(e),
        }
    }

    fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
        let expected = fs::metadata(from)?.len();
        let copied = match fs::copy(from, to) {
            Ok(copied) => copied,
            Err(e) => {
                let _ = fs::remove_file(to);
                return Err(e);
            }
        };

        if copied != expected {
            let _ = fs::remove_file(to);
            return Err(io::Error::other(format!(
                "incomplete copy: {} of {} bytes",
                copied, expected
            )));
        }

        if let Err(e) = fs::remove_file(from) {
            let _ = fs::remove_file(to);
            return Err(e);
        }
        Ok(())
    }

    fn ensure_writable(destination: &Path) -> OrganizeResult<()> {
        let unwritable = |reason: String| OrganizeError::DestinationUnwritable {
            path: destination.to_path_buf(),
            reason,
        };

        fs::create_dir_all(destination).map_err(|e| unwritable(e.to_string()))?;
        let metadata = fs::metadata(destination).map_err(|e| unwritable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unwritable("not a directory".to_string()));
        }
        if metadata.permissions().readonly() {
            return Err(unwritable("directory is read-only".to_string()));
        }
        Ok(())
    }
}

/// Where an organize request sends files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Destination {
    /// Each category's configured target path.
    #[default]
    Configured,
    /// A subfolder of the current directory, named after the category unless
    /// a folder name is given.
    Here(Option<String>),
    /// The configured downloads folder.
    Downloads,
    /// An explicit path, relative to the current directory or absolute.
    Path(PathBuf),
}

impl FromStr for Destination {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "here" => Destination::Here(None),
            "downloads" => Destination::Downloads,
            path => Destination::Path(PathBuf::from(path)),
        })
    }
}

/// A request to organize the files of one directory.
#[derive(Debug, Clone)]
pub struct OrganizeRequest {
    /// Directory whose files are candidates (not recursive).
    pub source: PathBuf,
    /// Category names to organize; empty means every enabled category.
    pub selection: Vec<String>,
    pub destination: Destination,
    /// Base for `here` and relative paths.
    pub cwd: PathBuf,
}

/// Files of one category headed for one directory.
#[derive(Debug, Clone)]
pub struct PlannedBatch {
    pub category: CategoryId,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub files: Vec<PathBuf>,
}

/// What an organize request would do.
#[derive(Debug, Default)]
pub struct Plan {
    pub batches: Vec<PlannedBatch>,
    /// Selected categories that are disabled and were left out.
    pub disabled: Vec<CategoryId>,
}

impl Plan {
    pub fn file_count(&self) -> usize {
        self.batches.iter().map(|b| b.files.len()).sum()
    }
}

/// Result of executing one planned batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub category: CategoryId,
    pub destination: PathBuf,
    pub result: BatchResult,
    /// History entry recording the batch, if anything moved and history is on.
    pub timeline: Option<TimelineId>,
}

/// Result of an organize request.
#[derive(Debug, Default)]
pub struct OrganizeReport {
    pub batches: Vec<BatchOutcome>,
    pub disabled: Vec<CategoryId>,
}

impl OrganizeReport {
    pub fn total_moved(&self) -> usize {
        self.batches.iter().map(|b| b.result.moved.len()).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.batches.iter().map(|b| b.result.skipped.len()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.batches.iter().map(|b| b.result.failed.len()).sum()
    }
}

/// Classifier, mover and history bound to one configuration snapshot.
pub struct Organizer<'a> {
    config: &'a Config,
    classifier: Classifier,
    filters: CompiledFilters,
    ledger: &'a mut Ledger,
    progress: ProgressBar,
}

impl<'a> Organizer<'a> {
    pub fn new(config: &'a Config, ledger: &'a mut Ledger) -> OrganizeResult<Self> {
        Ok(Self {
            config,
            classifier: Classifier::from_config(config),
            filters: CompiledFilters::new(&config.ignore)?,
            ledger,
            progress: ProgressBar::hidden(),
        })
    }

    /// Reports per-file progress on `progress` while executing.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Works out which files go where, without touching the filesystem.
    pub fn plan(&self, request: &OrganizeRequest) -> OrganizeResult<Plan> {
        let mut plan = Plan::default();

        let selected: Option<Vec<CategoryId>> = if request.selection.is_empty() {
            None
        } else {
            let mut selected = Vec::new();
            for name in &request.selection {
                let id = CategoryId::resolve(name, self.config)
                    .ok_or_else(|| OrganizeError::UnknownCategory(name.clone()))?;
                if !self.config.is_enabled(&id) {
                    tracing::warn!(category = %id, "selected category is disabled");
                    plan.disabled.push(id);
                } else if !selected.contains(&id) {
                    selected.push(id);
                }
            }
            Some(selected)
        };

        let entries = fs::read_dir(&request.source).map_err(|source| {
            OrganizeError::SourceUnreadable {
                path: request.source.clone(),
                source,
            }
        })?;

        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .map(|entry| entry.path())
            .filter(|path| self.filters.should_include(path))
            .collect();
        candidates.sort();

        let mut groups: HashMap<CategoryId, Vec<PathBuf>> = HashMap::new();
        for path in candidates {
            let Some(category) = self.classifier.classify_path(&path) else {
                continue;
            };
            let wanted = selected
                .as_ref()
                .is_none_or(|selected| selected.contains(category));
            if wanted {
                groups.entry(category.clone()).or_default().push(path);
            }
        }

        // Batches follow rule order so output is stable.
        for rule in self.classifier.rules() {
            if let Some(files) = groups.remove(&rule.category) {
                let destination =
                    self.resolve_destination(&rule.category, &request.destination, &request.cwd)?;
                plan.batches.push(PlannedBatch {
                    category: rule.category.clone(),
                    source: request.source.clone(),
                    destination,
                    files,
                });
            }
        }

        Ok(plan)
    }

    /// Executes every batch of `plan` in order.
    ///
    /// Stops at the first batch whose destination is unwritable; batches
    /// before it have already been moved and recorded.
    pub fn execute(&mut self, plan: Plan) -> OrganizeResult<OrganizeReport> {
        self.progress.set_length(plan.file_count() as u64);

        let mut report = OrganizeReport {
            batches: Vec::with_capacity(plan.batches.len()),
            disabled: plan.disabled,
        };
        for batch in plan.batches {
            report.batches.push(self.execute_batch(batch)?);
        }

        self.progress.finish_and_clear();
        Ok(report)
    }

    /// Plans and executes `request`.
    pub fn organize(&mut self, request: &OrganizeRequest) -> OrganizeResult<OrganizeReport> {
        let plan = self.plan(request)?;
        self.execute(plan)
    }

    /// Organizes one file into its category's configured target.
    ///
    /// Returns `None` if the file is filtered out, no longer exists, or no
    /// enabled category claims it.
    pub fn organize_file(&mut self, path: &Path) -> OrganizeResult<Option<BatchOutcome>> {
        if !path.is_file() || !self.filters.should_include(path) {
            return Ok(None);
        }
        let Some(category) = self.classifier.classify_path(path).cloned() else {
            tracing::debug!(file = %path.display(), "no enabled category claims file");
            return Ok(None);
        };

        let source = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let destination = self.resolve_destination(&category, &Destination::Configured, &source)?;
        let batch = PlannedBatch {
            category,
            source,
            destination,
            files: vec![path.to_path_buf()],
        };
        self.execute_batch(batch).map(Some)
    }

    /// Resolves the directory a category's files go to.
    pub fn resolve_destination(
        &self,
        category: &CategoryId,
        destination: &Destination,
        cwd: &Path,
    ) -> OrganizeResult<PathBuf> {
        let absolute = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                cwd.join(path)
            }
        };

        Ok(match destination {
            Destination::Configured => {
                let target = self
                    .config
                    .target_path(category)
                    .ok_or_else(|| OrganizeError::NoTargetPath(category.to_string()))?;
                absolute(target)
            }
            Destination::Here(folder) => match folder {
                Some(name) => cwd.join(name),
                None => cwd.join(category.folder_name()),
            },
            Destination::Downloads => absolute(self.config.downloads_path.clone()),
            Destination::Path(path) => absolute(path.clone()),
        })
    }

    fn execute_batch(&mut self, batch: PlannedBatch) -> OrganizeResult<BatchOutcome> {
        let result =
            FileOrganizer::move_batch_with_progress(&batch.files, &batch.destination, &self.progress)?;

        let timeline = if result.moved.is_empty() {
            None
        } else {
            let count = result.moved.len();
            let (kind, description) = match &batch.category {
                CategoryId::Builtin(category) => (
                    OperationKind::OrganizeFiles,
                    format!(
                        "Organized {} {} files from {} to {}",
                        count,
                        category,
                        batch.source.display(),
                        batch.destination.display()
                    ),
                ),
                CategoryId::Custom(name) => {
                    let extensions = self
                        .config
                        .custom_commands
                        .get(name)
                        .map(|c| c.extensions.join(", "))
                        .unwrap_or_default();
                    (
                        OperationKind::CustomOrganize,
                        format!(
                            "Organized {} {} files ({}) from {} to {}",
                            count,
                            name,
                            extensions,
                            batch.source.display(),
                            batch.destination.display()
                        ),
                    )
                }
            };
            self.ledger
                .append(EntryDraft::file_moves(kind, description, result.moved.clone()))?
        };

        tracing::info!(
            category = %batch.category,
            moved = result.moved.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "batch complete"
        );

        Ok(BatchOutcome {
            category: batch.category,
            destination: batch.destination,
            result,
            timeline,
        })
    }
}
