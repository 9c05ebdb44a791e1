//! Job model shared by the queue manager and backends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Backend-assigned job identifier, unique within its queue
pub type JobId = u64;

/// Priority assigned when the submitter does not specify one.
///
/// Mid-scale, leaving room on both sides; lower values are served first.
pub const DEFAULT_PRIORITY: u8 = 50;

/// Job lifecycle states
///
/// `Completed` and `FailedTerminal` are absorbing; a job never leaves
/// them. `FailedRetryable` marks a job waiting out its backoff delay
/// before being re-queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    FailedRetryable,
    FailedTerminal,
}

impl JobStatus {
    /// Whether the status is absorbing
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::FailedTerminal)
    }
}

/// One unit of submitted work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue_name: String,

    /// Opaque to the queue layer; only the handler interprets it
    pub payload: JsonValue,

    /// Lower value = served first; ties broken by submission order
    pub priority: u8,

    /// 1 on first execution, incremented on each retry
    pub attempt: u32,

    pub status: JobStatus,
    pub created_at: DateTime<Utc>,

    /// Populated on `Completed` only; mutually exclusive with `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,

    /// Populated on `FailedTerminal` only; mutually exclusive with `result`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-queue counts by job status over the retained window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Queued plus waiting-to-retry
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// What the submitter gets back, synchronously
///
/// `Inline` means the durable path was unavailable (degraded mode or a
/// failed enqueue) and the caller must execute the echoed payload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionResult {
    Queued { job_id: JobId },
    Inline { payload: JsonValue },
}

impl SubmissionResult {
    /// True when the job was accepted into the durable queue
    pub fn queued(&self) -> bool {
        matches!(self, SubmissionResult::Queued { .. })
    }

    /// Job id, present iff queued
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            SubmissionResult::Queued { job_id } => Some(*job_id),
            SubmissionResult::Inline { .. } => None,
        }
    }

    /// Echoed payload, present iff not queued
    pub fn payload(&self) -> Option<&JsonValue> {
        match self {
            SubmissionResult::Queued { .. } => None,
            SubmissionResult::Inline { payload } => Some(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::FailedTerminal.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
        assert!(!JobStatus::FailedRetryable.is_terminal());
    }

    #[test]
    fn test_submission_result_accessors() {
        let queued = SubmissionResult::Queued { job_id: 7 };
        assert!(queued.queued());
        assert_eq!(queued.job_id(), Some(7));
        assert!(queued.payload().is_none());

        let inline = SubmissionResult::Inline {
            payload: json!({"msg": "hi"}),
        };
        assert!(!inline.queued());
        assert!(inline.job_id().is_none());
        assert_eq!(inline.payload(), Some(&json!({"msg": "hi"})));
    }
}
