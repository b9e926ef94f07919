//! Periodic job runner, the simpler top-level driver.
//!
//! Two fixed triggers fire named jobs: one every `check_interval`, one daily
//! at a local time of day. Jobs come from a small closed set of names and are
//! registered as zero-argument async actions. Registering a name twice keeps
//! the last registration (last-write-wins, on purpose: callers re-register to
//! swap an implementation).
//!
//! Each invocation is isolated: an error, a job overrunning its timeout, or a
//! trigger naming a job that was never registered is logged and the runner
//! carries on.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use nucleo_core::config::PeriodicConfig;
use nucleo_core::error::Result;
use tokio::sync::watch;

use crate::clock::SharedClock;

/// Jobs the runner knows how to trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobName {
    /// Look for new mail.
    CheckEmail,
    /// Once-a-day summary.
    DailyDigest,
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobName::CheckEmail => write!(f, "check_email"),
            JobName::DailyDigest => write!(f, "daily_digest"),
        }
    }
}

/// Upper bound for one job run unless configured otherwise.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobAction = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// When a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    /// Local wall-clock time, every day.
    DailyAt(NaiveTime),
}

impl Schedule {
    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Every(interval) => {
                now + chrono::Duration::from_std(*interval).unwrap_or(chrono::Duration::days(1))
            }
            Schedule::DailyAt(time) => {
                let today = now.with_timezone(&Local).date_naive();
                for offset in 0..=2 {
                    let day = today + chrono::Days::new(offset);
                    // Skip local times that do not exist (DST gap).
                    if let Some(at) = Local.from_local_datetime(&day.and_time(*time)).earliest() {
                        let at = at.with_timezone(&Utc);
                        if at > now {
                            return at;
                        }
                    }
                }
                now + chrono::Duration::days(1)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Trigger {
    job: JobName,
    schedule: Schedule,
    next_at: DateTime<Utc>,
}

pub struct PeriodicTaskRunner {
    jobs: HashMap<JobName, JobAction>,
    triggers: Vec<Trigger>,
    check_interval: Duration,
    daily_at: NaiveTime,
    tick: Duration,
    job_timeout: Duration,
    clock: SharedClock,
}

impl PeriodicTaskRunner {
    pub fn new(check_interval: Duration, daily_at: NaiveTime, tick: Duration, clock: SharedClock) -> Self {
        Self {
            jobs: HashMap::new(),
            triggers: Vec::new(),
            check_interval,
            daily_at,
            tick,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            clock,
        }
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn from_config(config: &PeriodicConfig, clock: SharedClock) -> Result<Self> {
        Ok(Self::new(
            Duration::from_secs(config.check_interval_mins.saturating_mul(60)),
            config.daily_time()?,
            Duration::from_secs(config.tick_secs.max(1)),
            clock,
        )
        .with_job_timeout(Duration::from_secs(config.job_timeout_secs.max(1))))
    }

    /// Associate `name` with an action, replacing any earlier one.
    pub fn register<F, Fut>(&mut self, name: JobName, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let action: JobAction = Arc::new(move || Box::pin(action()) as JobFuture);
        if self.jobs.insert(name, action).is_some() {
            tracing::info!("📋 Job re-registered (previous replaced): {name}");
        } else {
            tracing::info!("📋 Job registered: {name}");
        }
    }

    pub fn is_registered(&self, name: JobName) -> bool {
        self.jobs.contains_key(&name)
    }

    /// Install the two fixed triggers, replacing any installed before.
    pub fn install_triggers(&mut self) {
        let now = self.clock.utc();
        self.triggers = [
            (JobName::CheckEmail, Schedule::Every(self.check_interval)),
            (JobName::DailyDigest, Schedule::DailyAt(self.daily_at)),
        ]
        .into_iter()
        .map(|(job, schedule)| Trigger {
            job,
            schedule,
            next_at: schedule.next_after(now),
        })
        .collect();

        for t in &self.triggers {
            tracing::info!("⏰ Trigger '{}' next at {}", t.job, t.next_at.with_timezone(&Local));
        }
    }

    /// Next firing time of `job`'s trigger, if installed.
    pub fn next_run(&self, job: JobName) -> Option<DateTime<Utc>> {
        self.triggers.iter().find(|t| t.job == job).map(|t| t.next_at)
    }

    /// Fire every due trigger once and reschedule it from now. Returns the
    /// jobs that were triggered, in trigger order.
    pub async fn run_pending(&mut self) -> Vec<JobName> {
        let now = self.clock.utc();
        let mut fired = Vec::new();
        for idx in 0..self.triggers.len() {
            if self.triggers[idx].next_at > now {
                continue;
            }
            let job = self.triggers[idx].job;
            self.invoke(job).await;
            fired.push(job);

            // Late runs are not replayed; the next slot is computed from now.
            let after = self.clock.utc();
            let trigger = &mut self.triggers[idx];
            trigger.next_at = trigger.schedule.next_after(after);
        }
        fired
    }

    /// Run a job by name, containing any failure. Returns true on success.
    pub async fn invoke(&self, name: JobName) -> bool {
        let Some(action) = self.jobs.get(&name).cloned() else {
            tracing::error!("❓ Job not registered: {name}");
            return false;
        };

        tracing::info!("▶️ Job started: {name}");
        match tokio::time::timeout(self.job_timeout, action()).await {
            Ok(Ok(())) => {
                tracing::info!("✅ Job finished: {name}");
                true
            }
            Ok(Err(e)) => {
                tracing::error!("❌ Job failed: {name} - {e}");
                false
            }
            Err(_) => {
                tracing::error!("⏱️ Job timed out: {name} after {}s", self.job_timeout.as_secs());
                false
            }
        }
    }

    /// Install triggers and check them every tick until `shutdown` is set.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        self.install_triggers();
        tracing::info!("⏰ Periodic runner started (tick {}s)", self.tick.as_secs());

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_pending().await;

            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("🛑 Periodic runner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use mockable::Clock;
    use nucleo_core::error::NucleoError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at_local(h: u32, m: u32) -> Arc<ManualClock> {
        let naive = NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap();
        Arc::new(ManualClock::at_local(naive))
    }

    fn runner(clock: Arc<ManualClock>) -> PeriodicTaskRunner {
        PeriodicTaskRunner::new(
            Duration::from_secs(30 * 60),
            NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            Duration::from_secs(60),
            clock,
        )
    }

    fn counter(runner: &mut PeriodicTaskRunner, name: JobName) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        runner.register(name, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        count
    }

    #[test]
    fn test_daily_schedule_rolls_to_tomorrow() {
        let clock = at_local(3, 0);
        let next = Schedule::DailyAt(NaiveTime::from_hms_opt(2, 0, 0).unwrap()).next_after(clock.utc());
        let local = next.with_timezone(&Local);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert_eq!(local.time(), NaiveTime::from_hms_opt(2, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_triggers_fire_when_due() {
        let clock = at_local(1, 59);
        let mut runner = runner(clock.clone());
        let checks = counter(&mut runner, JobName::CheckEmail);
        let digests = counter(&mut runner, JobName::DailyDigest);
        runner.install_triggers();

        assert!(runner.run_pending().await.is_empty());

        clock.advance(Duration::from_secs(120));
        assert_eq!(runner.run_pending().await, vec![JobName::DailyDigest]);
        // Not again the same day.
        assert!(runner.run_pending().await.is_empty());

        clock.advance(Duration::from_secs(28 * 60));
        assert_eq!(runner.run_pending().await, vec![JobName::CheckEmail]);

        assert_eq!(checks.load(Ordering::SeqCst), 1);
        assert_eq!(digests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_job_does_not_block_other_trigger() {
        let clock = at_local(1, 45);
        let mut runner = runner(clock.clone());
        runner.register(JobName::CheckEmail, || async {
            Err(NucleoError::Channel("IMAP down".into()))
        });
        let digests = counter(&mut runner, JobName::DailyDigest);
        runner.install_triggers();

        clock.advance(Duration::from_secs(31 * 60));
        let fired = runner.run_pending().await;
        assert_eq!(fired, vec![JobName::CheckEmail, JobName::DailyDigest]);
        assert_eq!(digests.load(Ordering::SeqCst), 1);

        // The failed trigger is rescheduled like any other.
        assert!(runner.next_run(JobName::CheckEmail).unwrap() > clock.utc());
    }

    #[test]
    fn test_from_config_rejects_bad_daily_time() {
        let config = PeriodicConfig {
            daily_at: "25:99".into(),
            ..Default::default()
        };
        assert!(PeriodicTaskRunner::from_config(&config, at_local(12, 0)).is_err());

        let runner = PeriodicTaskRunner::from_config(&PeriodicConfig::default(), at_local(12, 0)).unwrap();
        assert_eq!(runner.check_interval, Duration::from_secs(30 * 60));
        assert_eq!(runner.daily_at, NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert_eq!(runner.job_timeout, Duration::from_secs(60));

        let huge = PeriodicConfig {
            check_interval_mins: u64::MAX,
            ..Default::default()
        };
        let runner = PeriodicTaskRunner::from_config(&huge, at_local(12, 0)).unwrap();
        assert_eq!(runner.check_interval, Duration::from_secs(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_job_does_not_starve_other_trigger() {
        let clock = at_local(1, 45);
        let mut runner = runner(clock.clone()).with_job_timeout(Duration::from_secs(30));
        runner.register(JobName::CheckEmail, || std::future::pending::<Result<()>>());
        let digests = counter(&mut runner, JobName::DailyDigest);
        runner.install_triggers();

        clock.advance(Duration::from_secs(31 * 60));
        let started = tokio::time::Instant::now();
        let fired = runner.run_pending().await;

        assert_eq!(fired, vec![JobName::CheckEmail, JobName::DailyDigest]);
        assert_eq!(digests.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(!runner.invoke(JobName::CheckEmail).await);
    }

    #[tokio::test]
    async fn test_unregistered_job_is_logged_not_fatal() {
        let clock = at_local(12, 0);
        let runner = runner(clock);
        assert!(!runner.is_registered(JobName::DailyDigest));
        assert!(!runner.invoke(JobName::DailyDigest).await);
    }

    #[tokio::test]
    async fn test_register_is_last_write_wins() {
        let clock = at_local(12, 0);
        let mut runner = runner(clock);
        let first = counter(&mut runner, JobName::CheckEmail);
        let second = counter(&mut runner, JobName::CheckEmail);

        assert!(runner.invoke(JobName::CheckEmail).await);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let clock = at_local(12, 0);
        let mut runner = runner(clock);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            runner.run(rx).await;
            runner
        });
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!handle.is_finished());

        tx.send(true).unwrap();
        let runner = handle.await.unwrap();
        assert!(runner.next_run(JobName::CheckEmail).is_some());
    }
}
