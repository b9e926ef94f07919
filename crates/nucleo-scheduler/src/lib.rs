//! # Nucleo Scheduler
//!
//! The inbox-driven work loop and everything it leans on.
//!
//! ## Architecture
//! ```text
//! WorkScheduler (tokio sleep between cycles)
//!   ├── Poll     InboxClient::fetch_unread (bounded, timed out)
//!   ├── Extract  TaskRegistry: trusted-sender filter → Pending tasks
//!   ├── Execute  snapshot of pending → started mail → TaskExecutor → completed mail
//!   ├── Report   every report interval → NotificationClient
//!   └── Sleep    poll interval (or recovery delay after a fatal cycle)
//!
//! PeriodicTaskRunner (simpler driver)
//!   ├── every N minutes  → check_email
//!   └── daily at HH:MM   → daily_digest
//! ```
//!
//! Every outbound channel is gated by its own sliding-window `RateLimiter`.

pub mod clock;
pub mod executor;
pub mod orchestrator;
pub mod rate_limit;
pub mod report;
pub mod runner;
pub mod tasks;

pub use clock::{ManualClock, SharedClock, system_clock};
pub use executor::{SimulatedWork, TaskExecutor};
pub use orchestrator::{CycleOutcome, CyclePhase, CycleSummary, WorkScheduler, WorkSchedulerConfig};
pub use rate_limit::RateLimiter;
pub use runner::{JobName, PeriodicTaskRunner, Schedule};
pub use tasks::{Task, TaskRegistry, TaskStats, TaskStatus};
