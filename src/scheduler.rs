// src/scheduler.rs
//! Recurring job scheduler with per-job timer loops.
//!
//! Each registered job gets its own Tokio task that sleeps until the next
//! tick of its [`Schedule`] and then spawns the execution. Ticks never wait
//! for a previous execution: if one is still in flight, the tick is skipped,
//! counted, and logged instead of queued. Manual triggers share the same
//! single-flight gate and report `Busy` rather than piling up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::runlog::RunSummary;
use crate::schedule::Schedule;

/// Unit of work the scheduler drives.
///
/// Implementations must tolerate running concurrently with other jobs; the
/// scheduler only prevents two executions of the *same* job from overlapping.
#[async_trait]
pub trait JobTask: Send + Sync {
    async fn run(&self) -> Result<RunSummary>;
}

/// A job ready for registration: name, cadence, and the work itself.
pub struct JobSpec {
    pub name: String,
    pub schedule: Schedule,
    pub task: Arc<dyn JobTask>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, schedule: Schedule, task: Arc<dyn JobTask>) -> Self {
        JobSpec {
            name: name.into(),
            schedule,
            task,
        }
    }
}

/// Result of a manual trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The execution ran to completion and reported this summary.
    Completed(RunSummary),
    /// Rejected: the same job was already executing.
    Busy,
    /// The execution failed hard (error escaped the task, or it panicked).
    Failed { message: String },
}

/// Point-in-time view of one registered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    /// An execution is in flight right now.
    pub running: bool,
    /// The timer loop is alive and will fire again.
    pub scheduled: bool,
    /// Ticks dropped because a previous execution was still in flight.
    pub skipped_ticks: u64,
}

/// Shared between the timer loop, manual triggers, and status reads.
struct JobRuntime {
    name: String,
    schedule: Schedule,
    task: Arc<dyn JobTask>,
    running: AtomicBool,
    skipped: AtomicU64,
}

struct JobEntry {
    runtime: Arc<JobRuntime>,
    shutdown: watch::Sender<bool>,
    timer: JoinHandle<()>,
}

/// Owns every registered job and its timer loop.
///
/// All mutating calls take `&self`; the job table lives behind a mutex that
/// is only held for map operations, never across an await.
pub struct JobScheduler {
    jobs: Mutex<HashMap<String, JobEntry>>,
    initialized: AtomicBool,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        JobScheduler {
            jobs: Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    fn jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs.lock().expect("scheduler job table mutex poisoned")
    }

    /// Registers a job and starts its timer loop immediately.
    pub fn register(&self, name: &str, schedule: Schedule, task: Arc<dyn JobTask>) -> Result<()> {
        schedule.validate()?;
        let mut jobs = self.jobs();
        if jobs.contains_key(name) {
            return Err(Error::Config(format!("job '{name}' is already registered")));
        }

        let runtime = Arc::new(JobRuntime {
            name: name.to_string(),
            schedule,
            task,
            running: AtomicBool::new(false),
            skipped: AtomicU64::new(0),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let timer = tokio::spawn(timer_loop(runtime.clone(), shutdown_rx));
        jobs.insert(
            name.to_string(),
            JobEntry {
                runtime,
                shutdown,
                timer,
            },
        );
        tracing::info!(job = name, schedule = %schedule, "job registered");
        Ok(())
    }

    /// Registers a batch of jobs; repeat calls are a logged no-op.
    ///
    /// Jobs are independent: one failing to register does not stop the rest.
    /// Returns the failures so the caller can surface them.
    pub fn start_all(&self, specs: Vec<JobSpec>) -> Vec<(String, Error)> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("scheduler already initialized; start-all ignored");
            return Vec::new();
        }

        let mut failures = Vec::new();
        for spec in specs {
            if let Err(e) = self.register(&spec.name, spec.schedule, spec.task) {
                tracing::error!(job = %spec.name, error = %e, "job failed to register");
                failures.push((spec.name, e));
            }
        }
        failures
    }

    /// Runs a job immediately, outside its schedule, and waits for it.
    ///
    /// Returns [`RunOutcome::Busy`] without running anything when an
    /// execution of the same job is already in flight.
    pub async fn trigger(&self, name: &str) -> Result<RunOutcome> {
        let runtime = {
            let jobs = self.jobs();
            match jobs.get(name) {
                Some(entry) => entry.runtime.clone(),
                None => {
                    tracing::warn!(job = name, "trigger requested for unknown job");
                    return Err(Error::UnknownJob(name.to_string()));
                }
            }
        };

        if !try_begin(&runtime) {
            tracing::info!(job = name, "trigger rejected; job already running");
            return Ok(RunOutcome::Busy);
        }
        Ok(execute(&runtime).await)
    }

    /// Stops a job's timer loop and forgets it. In-flight executions finish.
    ///
    /// Returns false (after a logged warning) for names never registered.
    pub fn stop(&self, name: &str) -> bool {
        let entry = self.jobs().remove(name);
        match entry {
            Some(entry) => {
                let _ = entry.shutdown.send(true);
                tracing::info!(job = name, "job stopped");
                true
            }
            None => {
                tracing::warn!(job = name, "stop requested for unknown job");
                false
            }
        }
    }

    /// Stops every job and re-arms start-all. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let entries: Vec<(String, JobEntry)> = self.jobs().drain().collect();
        let stopped = entries.len();
        for (name, entry) in entries {
            let _ = entry.shutdown.send(true);
            tracing::info!(job = %name, "job stopped");
        }
        self.initialized.store(false, Ordering::SeqCst);
        tracing::info!(stopped, "all jobs stopped");
        stopped
    }

    /// Live status of every registered job, keyed by job name.
    pub fn status(&self) -> HashMap<String, JobStatus> {
        self.jobs()
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    JobStatus {
                        running: entry.runtime.running.load(Ordering::SeqCst),
                        scheduled: !entry.timer.is_finished(),
                        skipped_ticks: entry.runtime.skipped.load(Ordering::SeqCst),
                    },
                )
            })
            .collect()
    }

    /// Names of all registered jobs, sorted for stable output.
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Claims the single-flight gate. Exactly one claimant wins per execution.
fn try_begin(runtime: &JobRuntime) -> bool {
    runtime
        .running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Runs the task and releases the gate, converting panics into failures.
///
/// Caller must have claimed the gate via [`try_begin`].
async fn execute(runtime: &JobRuntime) -> RunOutcome {
    let task = runtime.task.clone();
    let joined = tokio::spawn(async move { task.run().await }).await;
    runtime.running.store(false, Ordering::SeqCst);

    match joined {
        Ok(Ok(summary)) => RunOutcome::Completed(summary),
        Ok(Err(e)) => RunOutcome::Failed {
            message: e.to_string(),
        },
        Err(join_err) => RunOutcome::Failed {
            message: format!("job task panicked: {join_err}"),
        },
    }
}

/// Sleeps until each tick, firing executions without awaiting them.
async fn timer_loop(runtime: Arc<JobRuntime>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let now = Utc::now();
        let Some(next) = runtime.schedule.next_fire_at(now) else {
            tracing::warn!(job = %runtime.name, "schedule yields no next tick; timer loop ends");
            break;
        };
        let delay = (next - now).to_std().unwrap_or(StdDuration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if !try_begin(&runtime) {
                    let skipped = runtime.skipped.fetch_add(1, Ordering::SeqCst) + 1;
                    counter!("scheduler_ticks_skipped_total", "job" => runtime.name.clone())
                        .increment(1);
                    tracing::warn!(
                        job = %runtime.name,
                        skipped_total = skipped,
                        "tick skipped; previous run still in flight"
                    );
                    continue;
                }
                let runtime = runtime.clone();
                tokio::spawn(async move {
                    match execute(&runtime).await {
                        RunOutcome::Completed(summary) => {
                            tracing::debug!(
                                job = %runtime.name,
                                status = %summary.status,
                                duration_ms = summary.duration_ms,
                                "scheduled run finished"
                            );
                        }
                        RunOutcome::Failed { message } => {
                            tracing::error!(job = %runtime.name, error = %message, "scheduled run failed");
                        }
                        RunOutcome::Busy => unreachable!("gate already claimed"),
                    }
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runlog::RunStatus;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct CountingTask {
        runs: AtomicU64,
    }

    impl CountingTask {
        fn new() -> Arc<Self> {
            Arc::new(CountingTask {
                runs: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl JobTask for CountingTask {
        async fn run(&self) -> Result<RunSummary> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(RunSummary::empty_success())
        }
    }

    /// Blocks inside `run` until the test hands over a permit.
    struct GatedTask {
        runs: AtomicU64,
        gate: Semaphore,
    }

    impl GatedTask {
        fn new() -> Arc<Self> {
            Arc::new(GatedTask {
                runs: AtomicU64::new(0),
                gate: Semaphore::new(0),
            })
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl JobTask for GatedTask {
        async fn run(&self) -> Result<RunSummary> {
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(RunSummary::empty_success())
        }
    }

    struct PanickingTask;

    #[async_trait]
    impl JobTask for PanickingTask {
        async fn run(&self) -> Result<RunSummary> {
            panic!("boom");
        }
    }

    async fn wait_until_running(scheduler: &JobScheduler, name: &str) {
        for _ in 0..200 {
            if scheduler
                .status()
                .get(name)
                .is_some_and(|s| s.running)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("job '{name}' never reported running");
    }

    #[tokio::test]
    async fn trigger_runs_job_and_reports_summary() {
        let scheduler = JobScheduler::new();
        let task = CountingTask::new();
        scheduler
            .register("news-scraper", Schedule::every_minutes(30), task.clone())
            .unwrap();

        let outcome = scheduler.trigger("news-scraper").await.unwrap();
        match outcome {
            RunOutcome::Completed(summary) => assert_eq!(summary.status, RunStatus::Success),
            other => panic!("expected completed, got {other:?}"),
        }
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trigger_unknown_job_is_an_error() {
        let scheduler = JobScheduler::new();
        let err = scheduler.trigger("nope").await.unwrap_err();
        assert!(matches!(err, Error::UnknownJob(name) if name == "nope"));
    }

    #[tokio::test]
    async fn second_trigger_while_running_reports_busy() {
        let scheduler = Arc::new(JobScheduler::new());
        let task = GatedTask::new();
        scheduler
            .register("weather-scraper", Schedule::every_minutes(60), task.clone())
            .unwrap();

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger("weather-scraper").await })
        };
        wait_until_running(&scheduler, "weather-scraper").await;

        let second = scheduler.trigger("weather-scraper").await.unwrap();
        assert!(matches!(second, RunOutcome::Busy));
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        task.release();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, RunOutcome::Completed(_)));
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        // Gate released, so the job can run again.
        task.release();
        let again = scheduler.trigger("weather-scraper").await.unwrap();
        assert!(matches!(again, RunOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn panic_in_task_releases_the_gate() {
        let scheduler = JobScheduler::new();
        scheduler
            .register("health-check", Schedule::every_minutes(5), Arc::new(PanickingTask))
            .unwrap();

        let outcome = scheduler.trigger("health-check").await.unwrap();
        match outcome {
            RunOutcome::Failed { message } => assert!(message.contains("panicked")),
            other => panic!("expected failed, got {other:?}"),
        }

        let status = scheduler.status();
        assert!(!status["health-check"].running);

        // A panicked run must not wedge the job.
        let next = scheduler.trigger("health-check").await.unwrap();
        assert!(matches!(next, RunOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let scheduler = JobScheduler::new();
        let task = CountingTask::new();
        scheduler
            .register("news-scraper", Schedule::every_minutes(30), task.clone())
            .unwrap();
        let err = scheduler
            .register("news-scraper", Schedule::every_minutes(30), task)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn start_all_is_idempotent_and_collects_failures() {
        let scheduler = JobScheduler::new();
        let specs = vec![
            JobSpec::new("news-scraper", Schedule::every_minutes(30), CountingTask::new()),
            JobSpec::new("bad-job", Schedule::every_secs(0), CountingTask::new()),
            JobSpec::new("crypto-scraper", Schedule::every_minutes(15), CountingTask::new()),
        ];
        let failures = scheduler.start_all(specs);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad-job");
        assert_eq!(scheduler.job_names(), vec!["crypto-scraper", "news-scraper"]);

        // Second start-all changes nothing.
        let failures = scheduler.start_all(vec![JobSpec::new(
            "weather-scraper",
            Schedule::every_minutes(60),
            CountingTask::new(),
        )]);
        assert!(failures.is_empty());
        assert_eq!(scheduler.job_names(), vec!["crypto-scraper", "news-scraper"]);
    }

    #[tokio::test]
    async fn stop_removes_the_job_and_unknown_stop_is_a_noop() {
        let scheduler = JobScheduler::new();
        scheduler
            .register("news-scraper", Schedule::every_minutes(30), CountingTask::new())
            .unwrap();

        assert!(scheduler.stop("news-scraper"));
        assert!(scheduler.status().is_empty());
        assert!(!scheduler.stop("news-scraper"));
    }

    #[tokio::test]
    async fn stop_all_rearms_start_all() {
        let scheduler = JobScheduler::new();
        let failures = scheduler.start_all(vec![JobSpec::new(
            "news-scraper",
            Schedule::every_minutes(30),
            CountingTask::new(),
        )]);
        assert!(failures.is_empty());
        assert_eq!(scheduler.stop_all(), 1);
        assert!(scheduler.status().is_empty());

        let failures = scheduler.start_all(vec![JobSpec::new(
            "crypto-scraper",
            Schedule::every_minutes(15),
            CountingTask::new(),
        )]);
        assert!(failures.is_empty());
        assert_eq!(scheduler.job_names(), vec!["crypto-scraper"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_loop_fires_on_schedule() {
        let scheduler = JobScheduler::new();
        let task = CountingTask::new();
        scheduler
            .register("health-check", Schedule::every_secs(60), task.clone())
            .unwrap();
        // Let the spawned timer loop arm its first sleep before the paused
        // clock advances; `advance` does not poll freshly spawned tasks.
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 2);

        let status = scheduler.status();
        assert!(status["health-check"].scheduled);
        assert_eq!(status["health-check"].skipped_ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_tick_is_skipped_not_queued() {
        let scheduler = JobScheduler::new();
        let task = GatedTask::new();
        scheduler
            .register("news-scraper", Schedule::every_secs(60), task.clone())
            .unwrap();
        // Let the spawned timer loop arm its first sleep before the paused
        // clock advances; `advance` does not poll freshly spawned tasks.
        tokio::task::yield_now().await;

        // First tick starts an execution that blocks on the gate.
        tokio::time::advance(Duration::from_secs(61)).await;
        wait_until_running(&scheduler, "news-scraper").await;

        // Next tick finds it still running and skips.
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let status = scheduler.status();
        assert_eq!(status["news-scraper"].skipped_ticks, 1);
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        // Once released, the original execution completes exactly once.
        task.release();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.status()["news-scraper"].running);
    }

    #[tokio::test]
    async fn stopped_job_lets_inflight_run_finish() {
        let scheduler = Arc::new(JobScheduler::new());
        let task = GatedTask::new();
        scheduler
            .register("cleanup", Schedule::daily_at(2, 0), task.clone())
            .unwrap();

        let trigger = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger("cleanup").await })
        };
        wait_until_running(&scheduler, "cleanup").await;

        assert!(scheduler.stop("cleanup"));
        task.release();
        let outcome = trigger.await.unwrap().unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }
}
