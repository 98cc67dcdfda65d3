//! Task lifecycle.
//!
//! ```text
//! PENDING ──► RUNNING ──► SUCCESS
//!              ▲  │   └──► FAILURE
//!              └──┘ lease lapsed
//! ```
//!
//! A RUNNING task whose worker has not finished within the lease may be
//! claimed again by a later delivery. Terminal states are write-once. Every store applies transitions through
//! [`TaskRecord::start`] and [`TaskRecord::finish`] so the state machine is
//! enforced in one place.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratlab_core::TaskId;

use crate::output::AnalysisResult;

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Submitted, waiting for a worker
    Pending,
    /// Picked up by a worker
    Running,
    /// Completed with a result
    Success,
    /// Completed with a failure detail
    Failure,
}

impl TaskStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// How long a RUNNING claim holds before another delivery may take it over.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// Category of a task failure.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No usable series remained after normalization
    NoUsableData,
    /// The request could not be processed as submitted
    InvalidRequest,
    /// Estimation failed unexpectedly
    ComputationFailed,
}

/// Caller-facing failure description. Never carries internal error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable reason
    pub message: String,
}

impl FailureDetail {
    /// Create a failure detail.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Terminal outcome written by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskOutcome {
    /// Analysis completed
    Success {
        /// Packaged result
        result: AnalysisResult,
    },
    /// Analysis failed
    Failure {
        /// Failure detail
        error: FailureDetail,
    },
}

impl TaskOutcome {
    /// Status this outcome transitions to.
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Success { .. } => TaskStatus::Success,
            TaskOutcome::Failure { .. } => TaskStatus::Failure,
        }
    }
}

/// Result of attempting a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The transition was applied
    Applied,
    /// The task was in a state that does not allow it
    Rejected(TaskStatus),
}

impl Transition {
    /// Whether the transition was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// A task as held by the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier
    pub id: TaskId,
    /// Current state
    pub status: TaskStatus,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
    /// Retention window, refreshed on every transition
    pub ttl_secs: u64,
    /// Time after which the task is unobservable
    pub expires_at: DateTime<Utc>,
    /// Result, once SUCCESS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    /// Failure detail, once FAILURE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

impl TaskRecord {
    /// A freshly submitted task.
    pub fn pending(id: TaskId, ttl: Duration, now: DateTime<Utc>) -> Self {
        let ttl_secs = ttl.as_secs();
        Self {
            id,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            ttl_secs,
            expires_at: expiry(now, ttl_secs),
            result: None,
            error: None,
        }
    }

    /// Whether the record has outlived its retention window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// PENDING → RUNNING, or re-claim a RUNNING task whose claim is older
    /// than `lease`.
    pub fn start(&mut self, now: DateTime<Utc>, lease: Duration) -> Transition {
        match self.status {
            TaskStatus::Pending => {}
            TaskStatus::Running if self.lease_lapsed(now, lease) => {}
            status => return Transition::Rejected(status),
        }
        self.status = TaskStatus::Running;
        self.touch(now);
        Transition::Applied
    }

    fn lease_lapsed(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        chrono::Duration::from_std(lease)
            .ok()
            .and_then(|lease| self.updated_at.checked_add_signed(lease))
            .is_some_and(|deadline| now >= deadline)
    }

    /// RUNNING → SUCCESS | FAILURE. Terminal states are never overwritten.
    pub fn finish(&mut self, outcome: TaskOutcome, now: DateTime<Utc>) -> Transition {
        if self.status != TaskStatus::Running {
            return Transition::Rejected(self.status);
        }
        self.status = outcome.status();
        match outcome {
            TaskOutcome::Success { result } => self.result = Some(result),
            TaskOutcome::Failure { error } => self.error = Some(error),
        }
        self.touch(now);
        Transition::Applied
    }

    /// The terminal outcome, if any.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match (self.status, &self.result, &self.error) {
            (TaskStatus::Success, Some(result), _) => Some(TaskOutcome::Success {
                result: result.clone(),
            }),
            (TaskStatus::Failure, _, Some(error)) => Some(TaskOutcome::Failure {
                error: error.clone(),
            }),
            _ => None,
        }
    }

    /// Status snapshot for polling.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.expires_at = expiry(now, self.ttl_secs);
    }
}

fn expiry(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
    chrono::Duration::try_seconds(secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Non-blocking view of a task's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task identifier
    pub task_id: TaskId,
    /// Current state
    pub status: TaskStatus,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
    /// Time after which the task is unobservable
    pub expires_at: DateTime<Utc>,
}
