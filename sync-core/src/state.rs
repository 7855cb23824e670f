//! Sync run state machine.
//!
//! A pure, side-effect-free state machine for the phases of one sync run.
//! The engine in sync-client feeds it events as work completes and reports
//! the resulting [`Progress`] to its observer.
//!
//! ```text
//! Idle → PermissionChecking → FetchingParents → FetchingChildrenBulk
//!      → ProcessingParents → Done
//! ```
//!
//! `Cancelled` and `Failed` are reachable from every non-terminal state.

use std::fmt;

/// Phase of a sync run, as reported to progress observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// Probing read access to every collection involved.
    PermissionChecking,
    /// Paginating the parent collection.
    FetchingParents,
    /// Pre-fetching child records for all parents.
    FetchingChildrenBulk,
    /// Writing parent and contact updates, one parent at a time.
    ProcessingParents,
    /// Completed successfully.
    Done,
    /// Stopped at a cancellation checkpoint.
    Cancelled,
    /// Aborted by an error.
    Failed,
}

impl SyncPhase {
    /// Stable lowercase name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionChecking => "permission_checking",
            Self::FetchingParents => "fetching_parents",
            Self::FetchingChildrenBulk => "fetching_children_bulk",
            Self::ProcessingParents => "processing_parents",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync run state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Run not started.
    #[default]
    Idle,
    /// Probing collections.
    PermissionChecking,
    /// Fetching the parent records.
    FetchingParents,
    /// Fetching child records in bulk.
    FetchingChildrenBulk {
        /// Number of parent records fetched.
        parents: usize,
    },
    /// Processing parents sequentially.
    ProcessingParents {
        /// Parents fully written so far.
        processed: usize,
        /// Parents to process.
        total: usize,
    },
    /// Run completed.
    Done {
        /// Parents written.
        processed: usize,
    },
    /// Run cancelled.
    Cancelled {
        /// Parents written before the cancellation.
        processed: usize,
        /// Parents that would have been processed.
        total: usize,
    },
    /// Run failed.
    Failed {
        /// Description of the failure.
        error: String,
    },
}

/// Events that drive a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The run was started.
    Started,
    /// Every collection accepted its probe.
    PermissionsVerified,
    /// Parent pagination finished.
    ParentsFetched {
        /// Number of parent records.
        count: usize,
    },
    /// Every child group was fetched.
    ChildrenFetched,
    /// One parent (and its contacts) was written.
    ParentProcessed,
    /// All parents were processed.
    Finished,
    /// A cancellation checkpoint observed the cancel flag.
    CancelRequested,
    /// A step failed.
    Errored {
        /// Description of the failure.
        error: String,
    },
}

/// A progress report for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Current phase.
    pub phase: SyncPhase,
    /// Units of work done in this phase.
    pub current: usize,
    /// Units of work in this phase, when known (0 otherwise).
    pub total: usize,
    /// Contact records updated so far in the run.
    pub contacts_updated: usize,
}

impl SyncState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state.
    ///
    /// Invalid transitions leave the state unchanged; terminal states ignore
    /// every event.
    pub fn on_event(self, event: Event) -> Self {
        if self.is_terminal() {
            return self;
        }

        match (self, event) {
            (state, Event::CancelRequested) => {
                let (processed, total) = state.counts();
                Self::Cancelled { processed, total }
            }
            (_, Event::Errored { error }) => Self::Failed { error },

            (Self::Idle, Event::Started) => Self::PermissionChecking,
            (Self::PermissionChecking, Event::PermissionsVerified) => Self::FetchingParents,
            (Self::FetchingParents, Event::ParentsFetched { count }) => {
                Self::FetchingChildrenBulk { parents: count }
            }
            (Self::FetchingChildrenBulk { parents }, Event::ChildrenFetched) => {
                Self::ProcessingParents {
                    processed: 0,
                    total: parents,
                }
            }
            (Self::ProcessingParents { processed, total }, Event::ParentProcessed) => {
                Self::ProcessingParents {
                    processed: processed.saturating_add(1),
                    total,
                }
            }
            (Self::ProcessingParents { processed, .. }, Event::Finished) => {
                Self::Done { processed }
            }

            // Invalid transitions - stay in current state
            (state, _) => state,
        }
    }

    /// The phase this state belongs to, or `None` before the run starts.
    pub fn phase(&self) -> Option<SyncPhase> {
        Some(match self {
            Self::Idle => return None,
            Self::PermissionChecking => SyncPhase::PermissionChecking,
            Self::FetchingParents => SyncPhase::FetchingParents,
            Self::FetchingChildrenBulk { .. } => SyncPhase::FetchingChildrenBulk,
            Self::ProcessingParents { .. } => SyncPhase::ProcessingParents,
            Self::Done { .. } => SyncPhase::Done,
            Self::Cancelled { .. } => SyncPhase::Cancelled,
            Self::Failed { .. } => SyncPhase::Failed,
        })
    }

    /// Progress report for this state.
    pub fn progress(&self, contacts_updated: usize) -> Option<Progress> {
        let phase = self.phase()?;
        let (current, total) = self.counts();
        Some(Progress {
            phase,
            current,
            total,
            contacts_updated,
        })
    }

    /// Check if the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Cancelled { .. } | Self::Failed { .. }
        )
    }

    fn counts(&self) -> (usize, usize) {
        match self {
            Self::FetchingChildrenBulk { parents } => (0, *parents),
            Self::ProcessingParents { processed, total } => (*processed, *total),
            Self::Done { processed } => (*processed, *processed),
            Self::Cancelled { processed, total } => (*processed, *total),
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing(processed: usize, total: usize) -> SyncState {
        SyncState::ProcessingParents { processed, total }
    }

    // ===========================================
    // Happy Path
    // ===========================================

    #[test]
    fn starts_idle_without_progress() {
        let state = SyncState::new();
        assert_eq!(state, SyncState::Idle);
        assert!(state.progress(0).is_none());
    }

    #[test]
    fn full_run_walks_every_phase() {
        let mut state = SyncState::new();
        let mut phases = vec![];
        let events = [
            Event::Started,
            Event::PermissionsVerified,
            Event::ParentsFetched { count: 2 },
            Event::ChildrenFetched,
            Event::ParentProcessed,
            Event::ParentProcessed,
            Event::Finished,
        ];
        for event in events {
            state = state.on_event(event);
            phases.push(state.phase().unwrap());
        }

        assert_eq!(
            phases,
            vec![
                SyncPhase::PermissionChecking,
                SyncPhase::FetchingParents,
                SyncPhase::FetchingChildrenBulk,
                SyncPhase::ProcessingParents,
                SyncPhase::ProcessingParents,
                SyncPhase::ProcessingParents,
                SyncPhase::Done,
            ]
        );
        assert_eq!(state, SyncState::Done { processed: 2 });
    }

    #[test]
    fn children_fetched_carries_parent_total() {
        let state = SyncState::FetchingChildrenBulk { parents: 7 };
        assert_eq!(state.on_event(Event::ChildrenFetched), processing(0, 7));
    }

    #[test]
    fn progress_reports_counts_and_contacts() {
        let progress = processing(3, 10).progress(42).unwrap();
        assert_eq!(
            progress,
            Progress {
                phase: SyncPhase::ProcessingParents,
                current: 3,
                total: 10,
                contacts_updated: 42,
            }
        );
    }

    // ===========================================
    // Cancellation and Failure
    // ===========================================

    #[test]
    fn cancel_keeps_partial_counts() {
        let state = processing(4, 10).on_event(Event::CancelRequested);
        assert_eq!(
            state,
            SyncState::Cancelled {
                processed: 4,
                total: 10
            }
        );
        assert_eq!(state.phase(), Some(SyncPhase::Cancelled));
    }

    #[test]
    fn cancel_reachable_before_any_work() {
        let state = SyncState::PermissionChecking.on_event(Event::CancelRequested);
        assert_eq!(
            state,
            SyncState::Cancelled {
                processed: 0,
                total: 0
            }
        );
    }

    #[test]
    fn error_fails_from_any_phase() {
        let states = [
            SyncState::PermissionChecking,
            SyncState::FetchingParents,
            SyncState::FetchingChildrenBulk { parents: 1 },
            processing(0, 1),
        ];
        for state in states {
            let failed = state.on_event(Event::Errored {
                error: "boom".into(),
            });
            assert_eq!(failed.phase(), Some(SyncPhase::Failed));
        }
    }

    #[test]
    fn terminal_states_ignore_events() {
        let done = SyncState::Done { processed: 1 };
        assert_eq!(done.clone().on_event(Event::CancelRequested), done);

        let cancelled = SyncState::Cancelled {
            processed: 1,
            total: 2,
        };
        assert_eq!(
            cancelled.clone().on_event(Event::Errored {
                error: "late".into()
            }),
            cancelled
        );
    }

    #[test]
    fn invalid_transition_stays_put() {
        let state = SyncState::FetchingParents.on_event(Event::ParentProcessed);
        assert_eq!(state, SyncState::FetchingParents);
    }

    #[test]
    fn phase_names_are_stable() {
        assert_eq!(SyncPhase::FetchingChildrenBulk.to_string(), "fetching_children_bulk");
        assert!(SyncPhase::Failed.is_terminal());
        assert!(!SyncPhase::ProcessingParents.is_terminal());
    }
}
