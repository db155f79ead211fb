// Execution Events
// Progress and lifecycle events published for a running hunt

use crate::hunt::models::HuntStatus;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender for hunt events
pub type ProgressSender = mpsc::UnboundedSender<HuntEvent>;

/// Receiver for hunt events
pub type ProgressReceiver = mpsc::UnboundedReceiver<HuntEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// An event about one execution
///
/// Serialises flat: `{"type": "step_complete", "execution_id": "...", "step_id": "...", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntEvent {
    pub execution_id: Uuid,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Completion ratio of an execution
///
/// On the wire it is flattened into its event as `progress` (a fraction in
/// `[0, 1]`) plus the `completed` and `total` step counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    /// Fraction in `[0, 1]`; an empty hunt counts as done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed.min(self.total) as f64 / self.total as f64
    }

    /// Percentage in `0..=100`; an empty hunt counts as done
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

impl Serialize for Progress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = serializer.serialize_struct("Progress", 3)?;
        fields.serialize_field("progress", &self.fraction())?;
        fields.serialize_field("completed", &self.completed)?;
        fields.serialize_field("total", &self.total)?;
        fields.end()
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Execution status changed
    Status { status: HuntStatus },

    /// A step was dispatched
    Progress {
        #[serde(flatten)]
        progress: Progress,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        message: String,
    },

    /// A step completed
    StepComplete {
        step_id: String,
        #[serde(flatten)]
        progress: Progress,
    },

    /// A step failed (timeout, plugin or resolution error)
    StepFailed {
        step_id: String,
        error: String,
        optional: bool,
        #[serde(flatten)]
        progress: Progress,
    },

    /// Execution finished; `status` is completed or failed
    Complete {
        status: HuntStatus,
        #[serde(flatten)]
        progress: Progress,
    },

    /// Execution failed
    Error { error: String },

    /// Execution was canceled
    Canceled {
        #[serde(flatten)]
        progress: Progress,
    },
}

impl HuntEvent {
    pub fn status(execution_id: Uuid, status: HuntStatus) -> Self {
        Self {
            execution_id,
            kind: EventKind::Status { status },
        }
    }

    pub fn progress(
        execution_id: Uuid,
        progress: Progress,
        step_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            kind: EventKind::Progress {
                progress,
                step_id,
                message: message.into(),
            },
        }
    }

    pub fn step_complete(execution_id: Uuid, step_id: impl Into<String>, progress: Progress) -> Self {
        Self {
            execution_id,
            kind: EventKind::StepComplete {
                step_id: step_id.into(),
                progress,
            },
        }
    }

    pub fn step_failed(
        execution_id: Uuid,
        step_id: impl Into<String>,
        error: impl Into<String>,
        optional: bool,
        progress: Progress,
    ) -> Self {
        Self {
            execution_id,
            kind: EventKind::StepFailed {
                step_id: step_id.into(),
                error: error.into(),
                optional,
                progress,
            },
        }
    }

    pub fn complete(execution_id: Uuid, status: HuntStatus, progress: Progress) -> Self {
        Self {
            execution_id,
            kind: EventKind::Complete { status, progress },
        }
    }

    pub fn error(execution_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            execution_id,
            kind: EventKind::Error {
                error: error.into(),
            },
        }
    }

    pub fn canceled(execution_id: Uuid, progress: Progress) -> Self {
        Self {
            execution_id,
            kind: EventKind::Canceled { progress },
        }
    }

    /// Build the final event for an execution that already ended
    pub fn terminal(execution_id: Uuid, status: HuntStatus, progress: Progress) -> Option<Self> {
        match status {
            HuntStatus::Completed => Some(Self::complete(execution_id, status, progress)),
            HuntStatus::Failed => Some(Self::error(execution_id, "hunt failed")),
            HuntStatus::Canceled => Some(Self::canceled(execution_id, progress)),
            HuntStatus::Pending | HuntStatus::Running => None,
        }
    }

    /// Terminal events end the stream for an execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Complete { .. } | EventKind::Error { .. } | EventKind::Canceled { .. }
        )
    }

    /// Event type name as it appears on the wire
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EventKind::Status { .. } => "status",
            EventKind::Progress { .. } => "progress",
            EventKind::StepComplete { .. } => "step_complete",
            EventKind::StepFailed { .. } => "step_failed",
            EventKind::Complete { .. } => "complete",
            EventKind::Error { .. } => "error",
            EventKind::Canceled { .. } => "canceled",
        }
    }
}
