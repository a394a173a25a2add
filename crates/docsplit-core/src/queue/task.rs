use serde::{Deserialize, Serialize};

use crate::manifest::Chunk;
use crate::phase::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// Validate the stored request of a job.
    Preflight { job_id: String },
    /// Load or build the phase manifest and fan out its chunks.
    SchedulePhase { job_id: String, phase: Phase },
    /// Execute the items of one chunk, one after another.
    RunChunk {
        job_id: String,
        phase: Phase,
        chunk: Chunk,
    },
    /// Fold item records into the phase state; reschedules itself until converged.
    Finalize {
        job_id: String,
        phase: Phase,
        round: u32,
    },
}

impl Task {
    pub fn job_id(&self) -> &str {
        match self {
            Task::Preflight { job_id }
            | Task::SchedulePhase { job_id, .. }
            | Task::RunChunk { job_id, .. }
            | Task::Finalize { job_id, .. } => job_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::Preflight { .. } => "preflight",
            Task::SchedulePhase { .. } => "schedule_phase",
            Task::RunChunk { .. } => "run_chunk",
            Task::Finalize { .. } => "finalize",
        }
    }
}

/// Receipt for an enqueued task (or group).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    pub id: String,
    pub task: &'static str,
    pub job_id: String,
}

impl TaskHandle {
    pub(crate) fn for_task(task: &Task) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            task: task.name(),
            job_id: task.job_id().to_string(),
        }
    }
}
