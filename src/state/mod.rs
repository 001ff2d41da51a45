// State management module
//
// StateManager wraps RunState in Arc<RwLock<T>> and broadcasts change events so
// front ends can follow a run without polling.

use crate::models::{CleanResult, RunState};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when run state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A run has started
    RunStarted { total_profiles: usize, dry_run: bool },

    /// Progress moved or a different profile became current
    ProgressUpdated {
        current: usize,
        total: usize,
        current_profile: Option<String>,
    },

    /// A profile has been cleaned, previewed, failed or skipped
    ProfileProcessed {
        profile: String,
        status: String,
        message: String,
    },

    /// Current operation has changed
    OperationChanged { operation: String },

    /// The run has finished
    RunFinished {
        cleaned: usize,
        failed: usize,
        skipped: usize,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe run state with event emission
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// Clones share the same state and channel.
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<RunState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    pub fn snapshot(&self) -> RunState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let running = state_manager.read(|state| state.is_running);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs, and broadcasts every
    /// detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);
        for change in &changes {
            // Nobody listening is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    pub fn start_run(&self, total_profiles: usize, dry_run: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.reset();
            state.is_running = true;
            state.dry_run = dry_run;
            state.total_profiles = total_profiles;
            state.current_operation = if dry_run {
                "Previewing profiles".to_string()
            } else {
                "Cleaning profiles".to_string()
            };
        })
    }

    pub fn finish_run(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_running = false;
            state.current_profile = None;
            state.current_operation.clear();
        })
    }

    pub fn update_progress(&self, profile: String, operation: String) -> Vec<StateChange> {
        self.update(|state| {
            state.current_profile = Some(profile);
            state.current_operation = operation;
        })
    }

    /// Fold a finished profile into the totals and emit `ProfileProcessed`
    pub fn add_profile_result(&self, result: &CleanResult) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.add_result(result));

        let status = if result.skipped {
            "skipped"
        } else if result.has_errors() {
            "failed"
        } else if result.dry_run {
            "previewed"
        } else {
            "cleaned"
        };

        let event = StateChange::ProfileProcessed {
            profile: result.display_name.clone(),
            status: status.to_string(),
            message: result.summary(),
        };
        let _ = self.state_tx.send(event.clone());
        changes.push(event);

        changes
    }

    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(RunState::reset);

        let _ = self.state_tx.send(StateChange::StateReset);
        changes.push(StateChange::StateReset);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

fn detect_changes(old: &RunState, new: &RunState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.is_running != new.is_running {
        if new.is_running {
            changes.push(StateChange::RunStarted {
                total_profiles: new.total_profiles,
                dry_run: new.dry_run,
            });
        } else {
            let (cleaned, failed, skipped, _) = new.run_stats();
            changes.push(StateChange::RunFinished {
                cleaned,
                failed,
                skipped,
            });
        }
    }

    if old.progress != new.progress
        || old.total_profiles != new.total_profiles
        || old.current_profile != new.current_profile
    {
        changes.push(StateChange::ProgressUpdated {
            current: new.progress,
            total: new.total_profiles,
            current_profile: new.current_profile.clone(),
        });
    }

    if old.current_operation != new.current_operation {
        changes.push(StateChange::OperationChanged {
            operation: new.current_operation.clone(),
        });
    }

    changes
}
