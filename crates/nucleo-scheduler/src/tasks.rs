//! Task definitions and the in-memory registry that tracks their lifecycle.
//!
//! A task is born Pending from a trusted inbound message and ends exactly
//! once, as Completed or Failed. Nothing is persisted; the registry lives as
//! long as the process.

use chrono::{DateTime, Utc};
use nucleo_core::types::NormalizedMessage;
use serde::{Deserialize, Serialize};

/// A unit of work extracted from a mail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Id of the source message.
    pub id: String,
    /// Mail subject.
    pub title: String,
    /// Mail body.
    pub description: String,
    pub source_sender: String,
    /// `Date` header of the source mail, verbatim.
    pub received_at: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Set once, on the transition out of Pending.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once, on the transition to Failed.
    pub error: Option<String>,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl Task {
    pub fn from_message(message: &NormalizedMessage, now: DateTime<Utc>) -> Self {
        Self {
            id: message.id.clone(),
            title: message.subject.clone(),
            description: message.body.clone(),
            source_sender: message.from.clone(),
            received_at: message.date.clone(),
            status: TaskStatus::Pending,
            created_at: now,
            completed_at: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != TaskStatus::Pending
    }
}

/// Counts for status reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Lifecycle tracker: pending tasks in arrival order, finished tasks kept
/// for the life of the process.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    /// Lowercased trusted-sender filter.
    trusted_sender: String,
    pending: Vec<Task>,
    finished: Vec<Task>,
}

impl TaskRegistry {
    pub fn new(trusted_sender: &str) -> Self {
        Self {
            trusted_sender: trusted_sender.trim().to_lowercase(),
            pending: Vec::new(),
            finished: Vec::new(),
        }
    }

    /// Case-insensitive substring match on the raw `From` header. An empty
    /// filter matches nothing.
    pub fn is_trusted(&self, sender: &str) -> bool {
        !self.trusted_sender.is_empty() && sender.to_lowercase().contains(&self.trusted_sender)
    }

    /// Build a Pending task if the message comes from the trusted sender.
    /// Other messages are ignored; that is not an error.
    pub fn extract_task(&self, message: &NormalizedMessage, now: DateTime<Utc>) -> Option<Task> {
        if !self.is_trusted(&message.from) {
            tracing::debug!("Ignoring mail from untrusted sender: {}", message.from);
            return None;
        }
        Some(Task::from_message(message, now))
    }

    /// Extract and track in one step. Returns the new task, or `None` when the
    /// sender is not trusted or the message id is already tracked.
    pub fn ingest(&mut self, message: &NormalizedMessage, now: DateTime<Utc>) -> Option<&Task> {
        let task = self.extract_task(message, now)?;
        if !self.track(task) {
            return None;
        }
        self.pending.last()
    }

    /// Append a Pending task. Returns false if its id is already known.
    pub fn track(&mut self, task: Task) -> bool {
        if self.get(&task.id).is_some() {
            tracing::debug!("Task {} already tracked, skipping", task.id);
            return false;
        }
        tracing::info!("📥 New task: '{}' ({})", task.title, task.id);
        self.pending.push(task);
        true
    }

    /// Pending → Completed. No-op (returns false) if the task is unknown or
    /// already terminal.
    pub fn mark_completed(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(mut task) = self.take_pending(id) else {
            return false;
        };
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        self.finished.push(task);
        true
    }

    /// Pending → Failed with the captured error. Same no-op rules as
    /// [`TaskRegistry::mark_completed`].
    pub fn mark_failed(&mut self, id: &str, error: &str, now: DateTime<Utc>) -> bool {
        let Some(mut task) = self.take_pending(id) else {
            return false;
        };
        task.status = TaskStatus::Failed;
        task.completed_at = Some(now);
        task.error = Some(error.to_string());
        self.finished.push(task);
        true
    }

    /// Point-in-time copy of the pending tasks, in arrival order.
    pub fn pending_snapshot(&self) -> Vec<Task> {
        self.pending.clone()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.pending
            .iter()
            .chain(self.finished.iter())
            .find(|t| t.id == id)
    }

    /// Completed and failed tasks, in the order they finished.
    pub fn finished(&self) -> &[Task] {
        &self.finished
    }

    pub fn stats(&self) -> TaskStats {
        let completed = self
            .finished
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        TaskStats {
            total: self.pending.len() + self.finished.len(),
            completed,
            failed: self.finished.len() - completed,
            pending: self.pending.len(),
        }
    }

    fn take_pending(&mut self, id: &str) -> Option<Task> {
        let idx = self.pending.iter().position(|t| t.id == id)?;
        Some(self.pending.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 22, 9, 0, 0).unwrap()
    }

    fn mail(id: &str, from: &str, subject: &str) -> NormalizedMessage {
        NormalizedMessage::new(id, from, subject, "details")
    }

    #[test]
    fn test_extract_trusted_sender_case_insensitive() {
        let registry = TaskRegistry::new("boss@example.com");
        let task = registry
            .extract_task(&mail("1", "Boss@Example.com", "Write report"), now())
            .unwrap();
        assert_eq!(task.id, "1");
        assert_eq!(task.title, "Write report");
        assert_eq!(task.description, "details");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.created_at, now());
        assert!(task.completed_at.is_none());

        // Display-name form of the header still matches.
        assert!(
            registry
                .extract_task(&mail("2", "The Boss <BOSS@example.com>", "x"), now())
                .is_some()
        );
    }

    #[test]
    fn test_extract_ignores_other_senders() {
        let registry = TaskRegistry::new("boss@example.com");
        assert!(registry.extract_task(&mail("1", "other@x.com", "Hi"), now()).is_none());

        let empty = TaskRegistry::new("");
        assert!(empty.extract_task(&mail("1", "anyone@x.com", "Hi"), now()).is_none());
    }

    #[test]
    fn test_ingest_skips_known_ids() {
        let mut registry = TaskRegistry::new("boss@example.com");
        assert!(registry.ingest(&mail("1", "boss@example.com", "A"), now()).is_some());
        assert!(registry.ingest(&mail("1", "boss@example.com", "A"), now()).is_none());
        assert!(registry.ingest(&mail("2", "spam@x.com", "B"), now()).is_none());
        assert_eq!(registry.stats().pending, 1);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut registry = TaskRegistry::new("boss@example.com");
        registry.ingest(&mail("1", "boss@example.com", "A"), now());
        registry.ingest(&mail("2", "boss@example.com", "B"), now());

        let later = now() + chrono::Duration::minutes(5);
        assert!(registry.mark_completed("1", later));
        assert!(!registry.mark_completed("1", later + chrono::Duration::minutes(1)));
        assert!(!registry.mark_failed("1", "late failure", later));

        let done = registry.get("1").unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.completed_at, Some(later));
        assert!(done.error.is_none());

        assert!(registry.mark_failed("2", "mailbox exploded", later));
        assert!(!registry.mark_completed("2", later));
        let failed = registry.get("2").unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("mailbox exploded"));

        assert!(!registry.mark_completed("missing", later));

        assert_eq!(
            registry.stats(),
            TaskStats {
                total: 2,
                completed: 1,
                failed: 1,
                pending: 0
            }
        );
    }

    #[test]
    fn test_snapshot_is_detached_and_ordered() {
        let mut registry = TaskRegistry::new("boss@example.com");
        for id in ["a", "b", "c"] {
            registry.ingest(&mail(id, "boss@example.com", id), now());
        }
        let snapshot = registry.pending_snapshot();
        registry.mark_completed("a", now());

        let ids: Vec<&str> = snapshot.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(registry.pending_snapshot().len(), 2);
    }
}
