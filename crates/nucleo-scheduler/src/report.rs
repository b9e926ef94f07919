//! Text of everything the work loop tells the operator: chat banners,
//! periodic status reports, fatal-cycle alerts and task progress mails.

use chrono::{DateTime, Local};

use crate::tasks::{Task, TaskStats};

/// Pending titles listed in a status report.
pub const MAX_LISTED_PENDING: usize = 5;

/// Characters of an error message kept in a fatal-cycle alert.
pub const ALERT_ERROR_CHARS: usize = 100;

const SIGNATURE: &str = "-- Nucleo Bot";

fn stamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One-time chat message sent when the work loop starts.
pub fn start_banner(work_address: &str, report_interval_mins: u64) -> String {
    format!(
        "🚀 Nucleo work scheduler started\n\n\
         Work inbox: {work_address}\n\
         Status report: every {report_interval_mins} minutes\n\n\
         Ready and waiting for work..."
    )
}

/// Inputs of a periodic status report.
#[derive(Debug, Clone)]
pub struct StatusReport<'a> {
    pub now: DateTime<Local>,
    pub stats: TaskStats,
    pub work_address: &'a str,
    pub last_check: Option<DateTime<Local>>,
    pub poll_interval_mins: u64,
    pub report_interval_mins: u64,
    pub pending: &'a [Task],
}

impl StatusReport<'_> {
    pub fn render(&self) -> String {
        let last_check = self
            .last_check
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "not yet".into());

        let mut report = format!(
            "📊 Work status report\n\n\
             ⏰ Time: {}\n\n\
             📈 Tasks:\n\
             \u{2022} Total: {}\n\
             \u{2022} Completed: {}\n\
             \u{2022} Failed: {}\n\
             \u{2022} Pending: {}\n\n\
             📬 Inbox:\n\
             \u{2022} Work inbox: {}\n\
             \u{2022} Last check: {}\n\n\
             🤖 System:\n\
             \u{2022} Running ✅\n\
             \u{2022} Mail check interval: {} minutes\n\
             \u{2022} Report interval: {} minutes\n",
            stamp(&self.now),
            self.stats.total,
            self.stats.completed,
            self.stats.failed,
            self.stats.pending,
            self.work_address,
            last_check,
            self.poll_interval_mins,
            self.report_interval_mins,
        );

        if !self.pending.is_empty() {
            report.push_str("\n📋 Pending tasks:\n");
            for (i, task) in self.pending.iter().take(MAX_LISTED_PENDING).enumerate() {
                report.push_str(&format!("  {}. {}\n", i + 1, task.title));
            }
        }
        report
    }
}

/// Chat alert for an error that escaped a whole cycle.
pub fn fatal_alert(error: &str, at: &DateTime<Local>) -> String {
    let truncated: String = error.chars().take(ALERT_ERROR_CHARS).collect();
    format!(
        "⚠️ System exception\n\nError: {truncated}\nTime: {}",
        stamp(at)
    )
}

/// Subject and body of the "task started" mail.
pub fn task_started_email(task: &Task, at: &DateTime<Local>) -> (String, String) {
    (
        format!("Task started: {}", task.title),
        format!(
            "Work on this task has started.\n\n\
             Title: {}\n\
             Description: {}\n\
             Started: {}\n\n\
             You will get another mail when it is done.\n\n{SIGNATURE}",
            task.title,
            task.description,
            stamp(at)
        ),
    )
}

/// Subject and body of the "task completed" mail.
pub fn task_completed_email(task: &Task, at: &DateTime<Local>) -> (String, String) {
    (
        format!("Task completed: {}", task.title),
        format!(
            "This task is done.\n\n\
             Title: {}\n\
             Description: {}\n\
             Completed: {}\n\n\
             Reply to this mail if anything looks wrong.\n\n{SIGNATURE}",
            task.title,
            task.description,
            stamp(at)
        ),
    )
}
