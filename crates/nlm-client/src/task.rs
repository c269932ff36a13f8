use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ArtifactKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TaskKind {
    Artifact(ArtifactKind),
    Research,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Reference to a long-running server-side job.
///
/// Two handles are the same task when their ids match.
pub struct TaskHandle {
    pub task_id: String,
    pub kind: TaskKind,
    pub created_at: DateTime<Utc>,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            created_at: Utc::now(),
        }
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id
    }
}

impl Eq for TaskHandle {}

impl Hash for TaskHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.task_id.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<Value>,
    },
    Succeeded {
        payload: Value,
    },
    Failed {
        reason: String,
    },
}

impl TaskStatus {
    pub fn running() -> Self {
        Self::Running { progress: None }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running { .. } => "running",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running { .. } => 1,
            Self::Succeeded { .. } | Self::Failed { .. } => 2,
        }
    }

    /// Applies an observed status, ignoring regressions.
    ///
    /// Terminal states are sticky; a stale `Pending` after `Running` is
    /// dropped, while a fresh `Running` replaces the previous progress.
    pub fn advance(&mut self, observed: TaskStatus) -> bool {
        if self.is_terminal() || observed.rank() < self.rank() {
            return false;
        }
        *self = observed;
        true
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
