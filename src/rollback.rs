/// Rollback of recorded file moves.
///
/// Reverses move batches from the history by moving each file back to where
/// it came from. Rollbacks are themselves recorded, so the history never
/// loses information; an entry counts as rolled back once a rollback entry
/// lists its id.
use crate::file_organizer::FileOrganizer;
use crate::history::{EntryDraft, FileMove, Ledger, LedgerError, OperationKind, TimelineEntry, TimelineId};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("timeline {0} not found")]
    TimelineNotFound(TimelineId),

    #[error("timeline {0} is not reversible")]
    NotReversible(TimelineId),

    #[error("timeline {0} has already been rolled back")]
    AlreadyRolledBack(TimelineId),

    #[error("nothing to roll back")]
    NothingToRollback,

    /// A configuration change sits between the target and the present.
    #[error("cannot roll back to {target}: {barrier} is a configuration change and cannot be reversed")]
    NonReversibleBarrier {
        target: TimelineId,
        barrier: TimelineId,
    },

    #[error("history is disabled; enable it with `auv config history --enable`")]
    HistoryDisabled,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type RollbackResult<T> = Result<T, RollbackError>;

/// Represents the result of a rollback.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Entries reversed, newest first.
    pub reversed: Vec<TimelineId>,
    /// Entries left outstanding because some of their files could not be
    /// moved back. A later rollback retries them.
    pub outstanding: Vec<TimelineId>,
    /// Files moved back, as performed (`from` is where the file was).
    pub restored: Vec<FileMove>,
    /// Files left alone because their original location is occupied or the
    /// moved file is gone.
    pub skipped: Vec<(PathBuf, String)>,
    pub failed: Vec<(PathBuf, String)>,
    /// The entry recording this rollback.
    pub timeline: Option<TimelineId>,
}

impl RollbackReport {
    /// Returns true if every file was restored.
    pub fn is_complete_success(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty() && self.outstanding.is_empty()
    }
}

/// What happened to one file during a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restore {
    Restored,
    /// The organized copy no longer exists; there is nothing to move back.
    Gone,
    /// The original location is taken by another file.
    Blocked,
    Failed,
}

/// Reverses entries of a [`Ledger`].
pub struct RollbackEngine<'a> {
    ledger: &'a mut Ledger,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(ledger: &'a mut Ledger) -> Self {
        Self { ledger }
    }

    /// Entries a rollback to `target` would reverse, newest first.
    ///
    /// Without a target this is the most recent outstanding move batch. With
    /// a target it is every outstanding move batch from the newest down to
    /// the target; the request is refused if a configuration change lies in
    /// that range.
    pub fn plan(&self, target: Option<TimelineId>) -> RollbackResult<Vec<&TimelineEntry>> {
        if !self.ledger.is_enabled() {
            return Err(RollbackError::HistoryDisabled);
        }
        let reversed: HashSet<TimelineId> = self.ledger.rolled_back_ids();

        let Some(target) = target else {
            return self
                .ledger
                .entries()
                .iter()
                .rev()
                .find(|entry| entry.reversible && !reversed.contains(&entry.id))
                .map(|entry| vec![entry])
                .ok_or(RollbackError::NothingToRollback);
        };

        let entry = self
            .ledger
            .get(target)
            .map_err(|_| RollbackError::TimelineNotFound(target))?;
        if !entry.reversible {
            return Err(RollbackError::NotReversible(target));
        }
        if reversed.contains(&target) {
            return Err(RollbackError::AlreadyRolledBack(target));
        }

        let mut selected = Vec::new();
        for entry in self.ledger.entries().iter().rev() {
            if entry.id < target {
                break;
            }
            // Rollback entries and what they reversed are already settled.
            if entry.kind == OperationKind::Rollback || reversed.contains(&entry.id) {
                continue;
            }
            if !entry.reversible {
                return Err(RollbackError::NonReversibleBarrier {
                    target,
                    barrier: entry.id,
                });
            }
            selected.push(entry);
        }
        Ok(selected)
    }

    /// Reverses the entries selected by [`RollbackEngine::plan`] and records
    /// the rollback.
    ///
    /// # Edge Cases Handled
    ///
    /// * **Moved file missing**: skipped and reported
    /// * **Original location occupied**: skipped and reported, nothing is
    ///   overwritten, and the entry stays outstanding so it can be retried
    /// * **Original directory removed**: recreated before the move
    ///
    /// A rollback entry is appended only when something was restored or an
    /// entry was fully reversed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use auv::config::HistorySettings;
    /// use auv::history::Ledger;
    /// use auv::rollback::RollbackEngine;
    /// use std::path::Path;
    ///
    /// let mut ledger = Ledger::open(Path::new("history.json"), &HistorySettings::default()).unwrap();
    /// match RollbackEngine::new(&mut ledger).rollback(None) {
    ///     Ok(report) => println!("Restored {} files", report.restored.len()),
    ///     Err(e) => eprintln!("Rollback failed: {}", e),
    /// }
    /// ```
    pub fn rollback(&mut self, target: Option<TimelineId>) -> RollbackResult<RollbackReport> {
        let entries: Vec<TimelineEntry> = self.plan(target)?.into_iter().cloned().collect();

        let mut report = RollbackReport::default();
        for entry in &entries {
            tracing::info!(id = %entry.id, moves = entry.moves.len(), "rolling back");
            let mut settled = true;
            for file_move in entry.moves.iter().rev() {
                match Self::restore_file(file_move, &mut report) {
                    Restore::Restored | Restore::Gone => {}
                    Restore::Blocked | Restore::Failed => settled = false,
                }
            }
            if settled {
                report.reversed.push(entry.id);
            } else {
                tracing::warn!(id = %entry.id, "entry left outstanding");
                report.outstanding.push(entry.id);
            }
        }

        if report.reversed.is_empty() && report.restored.is_empty() {
            return Ok(report);
        }

        let ids = report
            .reversed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let description = if ids.is_empty() {
            format!("Partial rollback ({} files restored)", report.restored.len())
        } else {
            format!(
                "Rolled back {} ({} files restored)",
                ids,
                report.restored.len()
            )
        };
        report.timeline = self.ledger.append(EntryDraft::rollback(
            description,
            report.reversed.clone(),
            report.restored.clone(),
        ))?;

        Ok(report)
    }

    fn restore_file(file_move: &FileMove, report: &mut RollbackReport) -> Restore {
        if file_move.to.symlink_metadata().is_err() {
            report.skipped.push((
                file_move.to.clone(),
                "file not found at its organized location".to_string(),
            ));
            return Restore::Gone;
        }
        if file_move.from.symlink_metadata().is_ok() {
            report.skipped.push((
                file_move.from.clone(),
                "original location is occupied".to_string(),
            ));
            return Restore::Blocked;
        }

        if let Some(parent) = file_move.from.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            report.failed.push((
                file_move.to.clone(),
                format!("could not recreate {}: {}", parent.display(), e),
            ));
            return Restore::Failed;
        }

        match FileOrganizer::move_file(&file_move.to, &file_move.from) {
            Ok(()) => {
                report
                    .restored
                    .push(FileMove::new(file_move.to.clone(), file_move.from.clone()));
                Restore::Restored
            }
            Err(e) => {
                tracing::warn!(file = %file_move.to.display(), error = %e, "restore failed");
                report
                    .failed
                    .push((file_move.to.clone(), format!("failed to restore file: {}", e)));
                Restore::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistorySettings;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        ledger: Ledger,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_settings(HistorySettings::default())
        }

        fn with_settings(settings: HistorySettings) -> Self {
            let dir = TempDir::new().expect("Failed to create temp directory");
            let ledger = Ledger::open(&dir.path().join("history.json"), &settings).unwrap();
            Self { dir, ledger }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        /// Moves `name` from the root into `sub/` and records it.
        fn organize(&mut self, name: &str, sub: &str) -> TimelineId {
            let from = self.path().join(name);
            fs::write(&from, name).unwrap();
            let result = FileOrganizer::move_batch(&[from], &self.path().join(sub)).unwrap();
            self.ledger
                .append(EntryDraft::file_moves(
                    OperationKind::OrganizeFiles,
                    format!("organized {}", name),
                    result.moved,
                ))
                .unwrap()
                .unwrap()
        }

        fn config_change(&mut self) -> TimelineId {
            self.ledger
                .append(EntryDraft::config_change("changed"))
                .unwrap()
                .unwrap()
        }
    }

    #[test]
    fn test_rollback_empty_history() {
        let mut fixture = Fixture::new();
        let result = RollbackEngine::new(&mut fixture.ledger).rollback(None);
        assert!(matches!(result, Err(RollbackError::NothingToRollback)));
    }

    #[test]
    fn test_rollback_most_recent_restores_content() {
        let mut fixture = Fixture::new();
        fixture.organize("a.pdf", "PDF");
        let second = fixture.organize("b.pdf", "PDF");

        let report = RollbackEngine::new(&mut fixture.ledger).rollback(None).unwrap();

        assert_eq!(report.reversed, vec![second]);
        assert_eq!(fs::read_to_string(fixture.path().join("b.pdf")).unwrap(), "b.pdf");
        assert!(fixture.path().join("PDF").join("a.pdf").exists());
        assert!(report.is_complete_success());

        let entry = fixture.ledger.get(report.timeline.unwrap()).unwrap();
        assert_eq!(entry.kind, OperationKind::Rollback);
        assert!(!entry.reversible);
        assert_eq!(entry.rolled_back, vec![second]);
    }

    #[test]
    fn test_repeated_rollback_walks_backwards() {
        let mut fixture = Fixture::new();
        let first = fixture.organize("a.pdf", "PDF");
        let second = fixture.organize("b.pdf", "PDF");

        let mut engine = RollbackEngine::new(&mut fixture.ledger);
        assert_eq!(engine.rollback(None).unwrap().reversed, vec![second]);
        assert_eq!(engine.rollback(None).unwrap().reversed, vec![first]);
        assert!(matches!(
            engine.rollback(None),
            Err(RollbackError::NothingToRollback)
        ));
    }

    #[test]
    fn test_rollback_to_target_reverses_range() {
        let mut fixture = Fixture::new();
        let first = fixture.organize("a.pdf", "PDF");
        let second = fixture.organize("b.jpg", "Images");

        let report = RollbackEngine::new(&mut fixture.ledger)
            .rollback(Some(first))
            .unwrap();

        assert_eq!(report.reversed, vec![second, first]);
        assert!(fixture.path().join("a.pdf").exists());
        assert!(fixture.path().join("b.jpg").exists());
    }

    #[test]
    fn test_barrier_refuses_before_moving_anything() {
        let mut fixture = Fixture::new();
        let first = fixture.organize("a.pdf", "PDF");
        let barrier = fixture.config_change();
        fixture.organize("b.pdf", "PDF");

        let result = RollbackEngine::new(&mut fixture.ledger).rollback(Some(first));
        match result {
            Err(RollbackError::NonReversibleBarrier { target, barrier: b }) => {
                assert_eq!(target, first);
                assert_eq!(b, barrier);
            }
            other => panic!("expected barrier error, got {:?}", other),
        }
        assert!(fixture.path().join("PDF").join("a.pdf").exists());
        assert!(fixture.path().join("PDF").join("b.pdf").exists());
        assert_eq!(fixture.ledger.len(), 3);
    }

    #[test]
    fn test_target_errors() {
        let mut fixture = Fixture::new();
        let first = fixture.organize("a.pdf", "PDF");
        let change = fixture.config_change();

        let mut engine = RollbackEngine::new(&mut fixture.ledger);
        assert!(matches!(
            engine.rollback(Some(TimelineId::new(99))),
            Err(RollbackError::TimelineNotFound(_))
        ));
        assert!(matches!(
            engine.rollback(Some(change)),
            Err(RollbackError::NotReversible(_))
        ));

        // The config change is newer, but a targetless rollback skips it.
        assert_eq!(engine.rollback(None).unwrap().reversed, vec![first]);
        assert!(matches!(
            engine.rollback(Some(first)),
            Err(RollbackError::AlreadyRolledBack(_))
        ));
    }

    #[test]
    fn test_previous_rollbacks_are_transparent() {
        let mut fixture = Fixture::new();
        let first = fixture.organize("a.pdf", "PDF");
        fixture.organize("b.pdf", "PDF");
        RollbackEngine::new(&mut fixture.ledger).rollback(None).unwrap();
        let third = fixture.organize("c.pdf", "PDF");

        let report = RollbackEngine::new(&mut fixture.ledger)
            .rollback(Some(first))
            .unwrap();
        assert_eq!(report.reversed, vec![third, first]);
    }

    #[test]
    fn test_occupied_original_is_skipped() {
        let mut fixture = Fixture::new();
        let id = fixture.organize("a.pdf", "PDF");
        fs::write(fixture.path().join("a.pdf"), "newcomer").unwrap();

        let report = RollbackEngine::new(&mut fixture.ledger).rollback(None).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.restored.is_empty());
        assert!(report.reversed.is_empty());
        assert_eq!(report.outstanding, vec![id]);
        assert!(report.timeline.is_none());
        assert!(!report.is_complete_success());
        assert_eq!(fixture.ledger.len(), 1);
        assert_eq!(
            fs::read_to_string(fixture.path().join("a.pdf")).unwrap(),
            "newcomer"
        );
        assert!(fixture.path().join("PDF").join("a.pdf").exists());
    }

    #[test]
    fn test_blocked_entry_can_be_retried() {
        let mut fixture = Fixture::new();
        let id = fixture.organize("a.pdf", "PDF");
        let original = fixture.path().join("a.pdf");
        fs::write(&original, "newcomer").unwrap();

        let mut engine = RollbackEngine::new(&mut fixture.ledger);
        assert_eq!(engine.rollback(None).unwrap().outstanding, vec![id]);

        fs::remove_file(&original).unwrap();
        let report = engine.rollback(None).unwrap();
        assert_eq!(report.reversed, vec![id]);
        assert!(report.is_complete_success());
        assert_eq!(fs::read_to_string(&original).unwrap(), "a.pdf");
        assert!(fixture.ledger.rolled_back_ids().contains(&id));
    }

    #[test]
    fn test_partially_blocked_entry_stays_outstanding() {
        let mut fixture = Fixture::new();
        let a = fixture.path().join("a.pdf");
        let b = fixture.path().join("b.pdf");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        let result =
            FileOrganizer::move_batch(&[a.clone(), b.clone()], &fixture.path().join("PDF")).unwrap();
        let id = fixture
            .ledger
            .append(EntryDraft::file_moves(OperationKind::OrganizeFiles, "two", result.moved))
            .unwrap()
            .unwrap();
        fs::write(&b, "newcomer").unwrap();

        let mut engine = RollbackEngine::new(&mut fixture.ledger);
        let report = engine.rollback(None).unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.outstanding, vec![id]);
        // The restored file is still recorded.
        assert!(report.timeline.is_some());
        assert_eq!(fs::read_to_string(&a).unwrap(), "a");

        fs::remove_file(&b).unwrap();
        let report = engine.rollback(None).unwrap();
        assert_eq!(report.reversed, vec![id]);
        assert_eq!(fs::read_to_string(&b).unwrap(), "b");
    }

    #[test]
    fn test_missing_moved_file_is_skipped() {
        let mut fixture = Fixture::new();
        let id = fixture.organize("a.pdf", "PDF");
        fs::remove_file(fixture.path().join("PDF").join("a.pdf")).unwrap();

        let report = RollbackEngine::new(&mut fixture.ledger).rollback(None).unwrap();
        assert_eq!(report.skipped.len(), 1);
        // Nothing is left to move back, so the entry is settled.
        assert_eq!(report.reversed, vec![id]);
        assert!(!fixture.path().join("a.pdf").exists());
    }

    #[test]
    fn test_removed_original_directory_is_recreated() {
        let mut fixture = Fixture::new();
        let inbox = fixture.path().join("inbox");
        fs::create_dir(&inbox).unwrap();
        let from = inbox.join("a.pdf");
        fs::write(&from, "data").unwrap();
        let result = FileOrganizer::move_batch(&[from.clone()], &fixture.path().join("PDF")).unwrap();
        fixture
            .ledger
            .append(EntryDraft::file_moves(OperationKind::OrganizeFiles, "x", result.moved))
            .unwrap();
        fs::remove_dir(&inbox).unwrap();

        let report = RollbackEngine::new(&mut fixture.ledger).rollback(None).unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(fs::read_to_string(&from).unwrap(), "data");
    }

    #[test]
    fn test_history_disabled_refuses() {
        let mut fixture = Fixture::with_settings(HistorySettings {
            enabled: false,
            ..HistorySettings::default()
        });
        assert!(matches!(
            RollbackEngine::new(&mut fixture.ledger).rollback(None),
            Err(RollbackError::HistoryDisabled)
        ));
    }
}
