//! What a task actually does. The work loop only knows this trait; new kinds
//! of work plug in as new implementations.

use std::time::Duration;

use async_trait::async_trait;
use nucleo_core::error::Result;

use crate::tasks::Task;

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Run the task. An error marks the task Failed with its message.
    async fn execute(&self, task: &Task) -> Result<()>;
}

/// Stand-in executor: waits a fixed, bounded time and succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    duration: Duration,
}

impl SimulatedWork {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl TaskExecutor for SimulatedWork {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        tracing::info!("⚙️ Working on '{}' ({}ms)", task.title, self.duration.as_millis());
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nucleo_core::types::NormalizedMessage;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_work_waits_then_succeeds() {
        let task = Task::from_message(
            &NormalizedMessage::new("1", "boss@example.com", "Do it", ""),
            Utc::now(),
        );
        let executor = SimulatedWork::new(Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        executor.execute(&task).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
