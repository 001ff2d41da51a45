//! Run sequencing: discovery → liveness → quiesce → backup → clean → aggregate.
//!
//! Profiles are grouped by [`BrowserKind`]. Each group runs as one task and
//! processes its profiles strictly in order; a [`Semaphore`] with
//! `max_parallel_browsers` permits bounds how many groups run at once. The
//! report lists results in discovery order regardless of completion order.

use crate::metrics::RunMetrics;
use crate::models::{BrowserKind, BrowserProfile, CleanResult, RunReport};
use crate::services::cleaner::ArtifactCleanService;
use crate::services::control::RunControl;
use crate::services::discovery::ProfileDiscovery;
use crate::services::process::{ProcessController, ProcessError, ProcessLifecycle};
use crate::state::StateManager;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const TIMEOUT_REASON: &str = "process did not close in time";
pub const CANCELLED_REASON: &str = "run cancelled";

/// Where the orchestrator gets its profiles from.
#[cfg_attr(test, mockall::automock)]
pub trait ProfileSource: Send + Sync {
    fn discover(&self) -> Vec<BrowserProfile>;
}

impl ProfileSource for ProfileDiscovery {
    fn discover(&self) -> Vec<BrowserProfile> {
        ProfileDiscovery::discover(self)
    }
}

/// A fixed profile list.
impl ProfileSource for Vec<BrowserProfile> {
    fn discover(&self) -> Vec<BrowserProfile> {
        self.clone()
    }
}

pub struct Orchestrator<S, P> {
    source: S,
    worker: Worker<P>,
}

/// The parts of the orchestrator each group task needs.
struct Worker<P> {
    processes: Arc<P>,
    cleaner: Arc<ArtifactCleanService>,
    state: StateManager,
    metrics: Arc<RunMetrics>,
}

impl<P> Clone for Worker<P> {
    fn clone(&self) -> Self {
        Self {
            processes: Arc::clone(&self.processes),
            cleaner: Arc::clone(&self.cleaner),
            state: self.state.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S, P> Orchestrator<S, P>
where
    S: ProfileSource,
    P: ProcessController + 'static,
{
    pub fn new(source: S, processes: P, cleaner: ArtifactCleanService) -> Self {
        Self {
            source,
            worker: Worker {
                processes: Arc::new(processes),
                cleaner: Arc::new(cleaner),
                state: StateManager::new(),
                metrics: Arc::new(RunMetrics::new()),
            },
        }
    }

    /// Report progress through an existing state manager.
    pub fn with_state(mut self, state: StateManager) -> Self {
        self.worker.state = state;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.worker.state
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.worker.metrics
    }

    pub fn cleaner(&self) -> &ArtifactCleanService {
        &self.worker.cleaner
    }

    /// Discovered profiles after the target-browser filter.
    pub fn profiles(&self) -> Vec<BrowserProfile> {
        let target = self.worker.cleaner.settings().target_browser;
        self.source
            .discover()
            .into_iter()
            .filter(|p| target.is_none_or(|t| t == p.browser))
            .collect()
    }

    /// Clean every profile; in dry-run mode this is [`preview`](Self::preview).
    ///
    /// Never fails as a whole: each profile contributes a result, possibly
    /// skipped or carrying errors.
    pub async fn run(&self, control: &RunControl) -> RunReport {
        if self.worker.cleaner.settings().dry_run {
            return self.preview(control).await;
        }

        let profiles = self.profiles();
        tracing::info!(profiles = profiles.len(), "Starting cleaning run");
        self.worker.state.start_run(profiles.len(), false);

        let mut groups: IndexMap<BrowserKind, Vec<(usize, BrowserProfile)>> = IndexMap::new();
        for (idx, profile) in profiles.iter().cloned().enumerate() {
            groups.entry(profile.browser).or_default().push((idx, profile));
        }

        let permits = self.worker.cleaner.settings().max_parallel_browsers.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        for (browser, group) in groups {
            let worker = self.worker.clone();
            let semaphore = Arc::clone(&semaphore);
            let control = control.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                tracing::debug!(%browser, profiles = group.len(), "Processing browser group");

                let mut done = Vec::with_capacity(group.len());
                for (idx, profile) in group {
                    done.push((idx, worker.process_profile(profile, &control).await));
                }
                done
            });
        }

        let mut slots: Vec<Option<CleanResult>> = vec![None; profiles.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => {
                    for (idx, result) in done {
                        slots[idx] = Some(result);
                    }
                }
                Err(e) => tracing::error!("Browser group task failed: {}", e),
            }
        }

        let results = slots
            .into_iter()
            .zip(&profiles)
            .map(|(slot, profile)| {
                slot.unwrap_or_else(|| CleanResult::skipped(profile, "worker task failed"))
            })
            .collect();

        self.worker.state.finish_run();
        let report = RunReport::from_results(results);
        tracing::info!(
            profiles = report.totals.profiles,
            removed = report.total_deleted(),
            errors = report.totals.errors,
            "Cleaning run finished"
        );
        report
    }

    /// Dry run over every profile: counts only, no backups, browsers left running.
    pub async fn preview(&self, control: &RunControl) -> RunReport {
        let profiles = self.profiles();
        self.worker.state.start_run(profiles.len(), true);

        let mut results = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let result = if control.is_cancelled() {
                CleanResult::skipped(&profile, CANCELLED_REASON)
            } else {
                self.worker
                    .state
                    .update_progress(profile.display_name.clone(), "Counting".to_string());
                let cleaner = Arc::clone(&self.worker.cleaner);
                let task_control = control.clone();
                let task_profile = profile.clone();
                tokio::task::spawn_blocking(move || {
                    cleaner.preview_profile(&task_profile, &task_control)
                })
                .await
                .unwrap_or_else(|e| failed_task(&profile, e))
            };

            self.worker.metrics.record_result(&result);
            self.worker.state.add_profile_result(&result);
            results.push(result);
        }

        self.worker.state.finish_run();
        RunReport::from_results(results)
    }

    /// Total artifacts a live run would remove across all profiles.
    pub async fn count_matches(&self) -> i64 {
        let mut total = 0i64;
        for profile in self.profiles() {
            let cleaner = Arc::clone(&self.worker.cleaner);
            match tokio::task::spawn_blocking(move || cleaner.count_matches(&profile)).await {
                Ok(count) => total = total.saturating_add(count),
                Err(e) => tracing::error!("Counting task failed: {}", e),
            }
        }
        total
    }
}

impl<P: ProcessController + 'static> Worker<P> {
    async fn process_profile(&self, profile: BrowserProfile, control: &RunControl) -> CleanResult {
        let result = self.clean_one(profile, control).await;
        self.metrics.record_result(&result);
        self.state.add_profile_result(&result);
        result
    }

    async fn clean_one(&self, profile: BrowserProfile, control: &RunControl) -> CleanResult {
        if control.is_cancelled() {
            return CleanResult::skipped(&profile, CANCELLED_REASON);
        }

        let settings = self.cleaner.settings();
        self.state.update_progress(
            profile.display_name.clone(),
            format!("Closing {}", profile.browser.display_name()),
        );

        let mut lifecycle = ProcessLifecycle::new(profile.browser);
        let closed = lifecycle
            .ensure_closed(
                self.processes.as_ref(),
                settings.process_timeout(),
                settings.poll_interval(),
                control,
            )
            .await;
        if lifecycle.terminated() {
            self.metrics.record_termination();
        }

        match closed {
            Ok(_) => {}
            Err(ProcessError::TimeoutExceeded { .. }) => {
                tracing::warn!(profile = %profile.display_name, "Skipping profile: {}", TIMEOUT_REASON);
                return CleanResult::skipped(&profile, TIMEOUT_REASON);
            }
            Err(ProcessError::Cancelled(_)) => {
                return CleanResult::skipped(&profile, CANCELLED_REASON);
            }
            Err(e) => {
                tracing::warn!(profile = %profile.display_name, "Skipping profile: {}", e);
                return CleanResult::skipped(&profile, e.to_string());
            }
        }

        self.state
            .update_progress(profile.display_name.clone(), "Cleaning".to_string());

        let create_backup = settings.create_backup;
        let cleaner = Arc::clone(&self.cleaner);
        let task_control = control.clone();
        let task_profile = profile.clone();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            cleaner.clean_profile(&task_profile, create_backup, &task_control)
        })
        .await
        .unwrap_or_else(|e| failed_task(&profile, e));

        self.metrics.record_clean_time(started.elapsed());
        result
    }
}

fn failed_task(profile: &BrowserProfile, e: tokio::task::JoinError) -> CleanResult {
    tracing::error!(profile = %profile.display_name, "Cleaning task failed: {}", e);
    let mut result = CleanResult::for_profile(profile);
    result.errors.push(format!("cleaning task failed: {}", e));
    result
}
