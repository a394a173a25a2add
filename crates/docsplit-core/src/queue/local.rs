//! In-process task queue on the tokio runtime.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use super::{Task, TaskHandle, TaskQueue, TaskRunner};

struct Shared {
    runner: OnceLock<Weak<dyn TaskRunner>>,
    /// Bounds how many tasks execute at once.
    slots: Semaphore,
    /// Tasks queued, sleeping, running, or group joiners still waiting.
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Counts a task as in flight until dropped (also on panic).
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl InFlightGuard {
    fn new(shared: &Arc<Shared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.idle.notify_waiters();
        }
    }
}

impl Shared {
    fn spawn(self: &Arc<Self>, task: Task, delay: Duration) -> JoinHandle<()> {
        let guard = InFlightGuard::new(self);
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            shared.execute(task).await;
        })
    }

    async fn execute(&self, task: Task) {
        let Ok(_permit) = self.slots.acquire().await else {
            return;
        };
        let Some(runner) = self.runner.get().and_then(Weak::upgrade) else {
            tracing::warn!(task = task.name(), job_id = task.job_id(), "no runner bound, task dropped");
            return;
        };
        let name = task.name();
        let job_id = task.job_id().to_string();
        if let Err(e) = runner.run_task(task).await {
            tracing::error!(task = name, job_id = %job_id, "task failed: {:#}", e);
        }
    }
}

/// Tokio-backed `TaskQueue`. At most `worker_slots` tasks execute at once;
/// delayed tasks and group joiners wait without holding a slot.
pub struct LocalQueue {
    shared: Arc<Shared>,
}

impl LocalQueue {
    pub fn new(worker_slots: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner: OnceLock::new(),
                slots: Semaphore::new(worker_slots.max(1)),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Attach the runner that executes tasks. Only the first call has an effect.
    pub fn bind(&self, runner: Weak<dyn TaskRunner>) {
        if self.shared.runner.set(runner).is_err() {
            tracing::warn!("task queue already has a runner");
        }
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Resolve once nothing is queued, sleeping, or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl TaskQueue for LocalQueue {
    async fn enqueue(&self, task: Task, delay: Duration) -> Result<TaskHandle> {
        let handle = TaskHandle::for_task(&task);
        tracing::debug!(task = task.name(), job_id = task.job_id(), delay_ms = delay.as_millis() as u64, "enqueue");
        self.shared.spawn(task, delay);
        Ok(handle)
    }

    async fn enqueue_group(&self, tasks: Vec<Task>, then: Task) -> Result<TaskHandle> {
        let handle = TaskHandle::for_task(&then);
        tracing::debug!(members = tasks.len(), then = then.name(), job_id = then.job_id(), "enqueue group");
        let members: Vec<JoinHandle<()>> = tasks
            .into_iter()
            .map(|t| self.shared.spawn(t, Duration::ZERO))
            .collect();

        let guard = InFlightGuard::new(&self.shared);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let _guard = guard;
            for member in members {
                if let Err(e) = member.await {
                    tracing::error!("group member did not complete: {}", e);
                }
            }
            // Spawned before `_guard` drops, so the queue never looks idle in between.
            shared.spawn(then, Duration::ZERO);
        });
        Ok(handle)
    }
}
