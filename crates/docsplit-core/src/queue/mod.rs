//! Task queue seam.
//!
//! Tasks are plain serializable values, so any broker could carry them; the
//! bundled `LocalQueue` runs them on the tokio runtime of the current process.

mod local;
mod task;

pub use local::LocalQueue;
pub use task::{Task, TaskHandle};

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Executes tasks taken off a queue.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, task: Task) -> Result<()>;
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Run `task` once `delay` has elapsed. Never waits for the task itself.
    async fn enqueue(&self, task: Task, delay: Duration) -> Result<TaskHandle>;

    /// Run all `tasks` concurrently, then `then` exactly once after every
    /// member finished, whether it succeeded, failed or panicked.
    async fn enqueue_group(&self, tasks: Vec<Task>, then: Task) -> Result<TaskHandle>;
}
