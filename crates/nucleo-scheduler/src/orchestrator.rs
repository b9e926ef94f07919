//! Work scheduler: the loop that turns trusted mail into executed tasks.
//!
//! One cycle is poll → extract → execute → report, followed by a sleep. The
//! loop is single-threaded and cooperative: it only suspends between cycles
//! (and inside collaborator calls), so the started/completed mails of one
//! task are never interleaved with another task's.
//!
//! Failure policy:
//! - transient collaborator errors (network, timeout) are logged and treated
//!   as "no result" for that call;
//! - a task's own failure marks it Failed and the cycle moves on;
//! - anything else escaping a cycle triggers one chat alert and a short
//!   recovery sleep, after which the loop resumes. Only the shutdown signal
//!   ends it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nucleo_core::config::NucleoConfig;
use nucleo_core::error::{NucleoError, Result};
use nucleo_core::traits::{InboxClient, NotificationClient};
use nucleo_core::types::{NormalizedMessage, OutgoingEmail};
use tokio::sync::watch;

use crate::clock::SharedClock;
use crate::executor::{SimulatedWork, TaskExecutor};
use crate::report::{self, StatusReport};
use crate::tasks::{Task, TaskRegistry};

/// Settings of one work scheduler.
#[derive(Debug, Clone)]
pub struct WorkSchedulerConfig {
    /// Filter deciding which mail becomes a task.
    pub trusted_sender: String,
    /// Recipient of task started/completed mails.
    pub notify_address: String,
    /// Inbox being watched, shown in banners and reports.
    pub work_address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// Sleep after a fatal cycle. Shorter than `poll_interval`.
    pub recovery_delay: Duration,
    pub max_results: usize,
    /// Upper bound for every collaborator call.
    pub call_timeout: Duration,
}

impl WorkSchedulerConfig {
    pub fn from_config(config: &NucleoConfig) -> Self {
        let work = &config.work;
        Self {
            trusted_sender: config.operator.trusted_sender.clone(),
            notify_address: config.operator.notify_address().to_string(),
            work_address: config.email.address.clone(),
            poll_interval: Duration::from_secs(work.poll_interval_mins.saturating_mul(60)),
            report_interval: Duration::from_secs(work.report_interval_mins.saturating_mul(60)),
            recovery_delay: Duration::from_secs(work.recovery_delay_secs),
            max_results: work.max_results,
            call_timeout: Duration::from_secs(work.call_timeout_secs),
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Polling,
    Extracting,
    Executing,
    Reporting,
    Sleeping,
    Recovering,
    Stopped,
}

/// What one successful cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub new_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub reported: bool,
}

/// Result of one pass through the loop body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Finished(CycleSummary),
    /// The cycle failed as a whole; the alert has been attempted.
    Recovered { error: String },
}

/// Timestamps that decide when the next report is due.
#[derive(Debug, Clone, Default)]
pub struct PollCycleState {
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_report_time: Option<DateTime<Utc>>,
}

pub struct WorkScheduler {
    config: WorkSchedulerConfig,
    inbox: Arc<dyn InboxClient>,
    notifier: Arc<dyn NotificationClient>,
    executor: Arc<dyn TaskExecutor>,
    clock: SharedClock,
    registry: TaskRegistry,
    state: PollCycleState,
    phase: CyclePhase,
    started: bool,
}

/// Await `fut` for at most `limit`; running out of time is a transient error.
async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(NucleoError::Timeout(format!(
            "{what} after {}s",
            limit.as_secs()
        ))),
    }
}

impl WorkScheduler {
    pub fn new(
        config: WorkSchedulerConfig,
        inbox: Arc<dyn InboxClient>,
        notifier: Arc<dyn NotificationClient>,
        clock: SharedClock,
    ) -> Self {
        let registry = TaskRegistry::new(&config.trusted_sender);
        Self {
            config,
            inbox,
            notifier,
            executor: Arc::new(SimulatedWork::default()),
            clock,
            registry,
            state: PollCycleState::default(),
            phase: CyclePhase::Idle,
            started: false,
        }
    }

    /// Replace the default simulated executor.
    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn state(&self) -> &PollCycleState {
        &self.state
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn config(&self) -> &WorkSchedulerConfig {
        &self.config
    }

    /// Run until `shutdown` carries `true` (or its sender is dropped).
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "⏰ Work scheduler started (poll every {}s, report every {}s)",
            self.config.poll_interval.as_secs(),
            self.config.report_interval.as_secs()
        );
        self.announce_start().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.tick().await;
            let delay = self.delay_after(&outcome);
            tracing::debug!("💤 Sleeping {}s", delay.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.phase = CyclePhase::Stopped;
        tracing::info!("🛑 Work scheduler stopped");
    }

    /// Send the one-time start banner. Later calls do nothing.
    pub async fn announce_start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let banner =
            report::start_banner(&self.config.work_address, self.config.report_interval.as_secs() / 60);
        self.notify(&banner).await;
    }

    /// One pass of the loop body, with the fatal-cycle recovery applied.
    pub async fn tick(&mut self) -> CycleOutcome {
        match self.run_cycle().await {
            Ok(summary) => {
                self.phase = CyclePhase::Sleeping;
                CycleOutcome::Finished(summary)
            }
            Err(e) => {
                self.phase = CyclePhase::Recovering;
                tracing::error!("❌ Work cycle failed: {e}");
                let alert = report::fatal_alert(&e.to_string(), &self.clock.local());
                self.notify(&alert).await;
                CycleOutcome::Recovered {
                    error: e.to_string(),
                }
            }
        }
    }

    /// How long to sleep after `outcome`.
    pub fn delay_after(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::Finished(_) => self.config.poll_interval,
            CycleOutcome::Recovered { .. } => self.config.recovery_delay,
        }
    }

    /// Poll, extract, execute and (when due) report. Errors returned from
    /// here are fatal for the cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        self.phase = CyclePhase::Polling;
        let messages = self.poll().await?;
        summary.fetched = messages.len();
        self.state.last_check_time = Some(self.clock.utc());

        self.phase = CyclePhase::Extracting;
        summary.new_tasks = self.extract(&messages).await;

        self.phase = CyclePhase::Executing;
        let (completed, failed) = self.execute_pending().await;
        summary.completed = completed;
        summary.failed = failed;

        self.phase = CyclePhase::Reporting;
        if self.report_due(self.clock.utc()) {
            self.send_status_report().await;
            summary.reported = true;
        }

        Ok(summary)
    }

    /// Fetch unread mail. Transient failures become an empty batch.
    async fn poll(&self) -> Result<Vec<NormalizedMessage>> {
        tracing::info!("📬 Checking {} for new mail...", self.inbox.name());
        let fetched = bounded(
            self.config.call_timeout,
            "fetch_unread",
            self.inbox.fetch_unread(self.config.max_results),
        )
        .await;

        match fetched {
            Ok(messages) => {
                tracing::info!("📧 {} unread message(s)", messages.len());
                Ok(messages)
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("⚠️ Inbox check failed, skipping this cycle's mail: {e}");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Turn trusted mail into pending tasks. Returns how many were new.
    async fn extract(&mut self, messages: &[NormalizedMessage]) -> usize {
        let now = self.clock.utc();
        let registry = &mut self.registry;
        let new_ids: Vec<String> = messages
            .iter()
            .filter_map(|m| registry.ingest(m, now).map(|t| t.id.clone()))
            .collect();

        for id in &new_ids {
            let marked = bounded(self.config.call_timeout, "mark_read", self.inbox.mark_read(id)).await;
            if let Err(e) = marked {
                tracing::warn!("⚠️ Could not mark message {id} as read: {e}");
            }
        }

        if !new_ids.is_empty() {
            tracing::info!("📥 {} new task(s) received", new_ids.len());
        }
        new_ids.len()
    }

    /// Execute a snapshot of the pending tasks. Returns (completed, failed).
    async fn execute_pending(&mut self) -> (usize, usize) {
        let snapshot = self.registry.pending_snapshot();
        if snapshot.is_empty() {
            return (0, 0);
        }
        tracing::info!("▶️ Executing {} task(s)", snapshot.len());

        let (mut completed, mut failed) = (0, 0);
        for task in &snapshot {
            match self.execute_single(task).await {
                Ok(()) => {
                    if self.registry.mark_completed(&task.id, self.clock.utc()) {
                        completed += 1;
                    }
                    tracing::info!("✅ Task done: '{}'", task.title);
                }
                Err(e) => {
                    tracing::error!("❌ Task failed: '{}' - {e}", task.title);
                    if self.registry.mark_failed(&task.id, &e.to_string(), self.clock.utc()) {
                        failed += 1;
                    }
                }
            }
        }
        (completed, failed)
    }

    async fn execute_single(&self, task: &Task) -> Result<()> {
        tracing::info!("🔨 Executing task: '{}'", task.title);

        let (subject, body) = report::task_started_email(task, &self.clock.local());
        self.send_email(&subject, &body).await;

        self.executor.execute(task).await?;

        let (subject, body) = report::task_completed_email(task, &self.clock.local());
        self.send_email(&subject, &body).await;
        Ok(())
    }

    fn report_due(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_report_time {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= self.config.report_interval),
        }
    }

    /// Build and send the status report. The report time is recorded whether
    /// or not the chat accepted it.
    async fn send_status_report(&mut self) -> bool {
        let pending = self.registry.pending_snapshot();
        let text = StatusReport {
            now: self.clock.local(),
            stats: self.registry.stats(),
            work_address: &self.config.work_address,
            last_check: self
                .state
                .last_check_time
                .map(|t| t.with_timezone(&chrono::Local)),
            poll_interval_mins: self.config.poll_interval.as_secs() / 60,
            report_interval_mins: self.config.report_interval.as_secs() / 60,
            pending: &pending,
        }
        .render();

        let delivered = self.notify(&text).await;
        self.state.last_report_time = Some(self.clock.utc());
        delivered
    }

    /// Best-effort mail to the operator.
    async fn send_email(&self, subject: &str, body: &str) -> bool {
        let email = OutgoingEmail::live(&self.config.notify_address, subject, body);
        match bounded(self.config.call_timeout, "send_message", self.inbox.send_message(email)).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("🚦 Mail '{subject}' not sent: daily send limit reached");
                false
            }
            Err(e) => {
                tracing::error!("⚠️ Failed to send mail '{subject}': {e}");
                false
            }
        }
    }

    /// Best-effort chat notification.
    async fn notify(&self, text: &str) -> bool {
        match bounded(
            self.config.call_timeout,
            "send_notification",
            self.notifier.send_notification(text),
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("⚠️ {} notification failed: {e}", self.notifier.name());
                false
            }
        }
    }
}
