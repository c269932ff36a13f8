use nlm_wire::{ProtocolError, WireError};
use thiserror::Error;

use crate::retry::should_retry_status;
use crate::TaskStatus;

#[derive(Debug, Clone, PartialEq, Error)]
/// Every failure the client surfaces.
///
/// Only [`NlmError::is_transient`] failures are ever retried, and only inside
/// the task poller; everything else reaches the caller unchanged.
pub enum NlmError {
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),
    #[error("rpc '{method_id}' reported a fault (code {code:?}): {}", .message.as_deref().unwrap_or("no message"))]
    Rpc {
        method_id: String,
        code: Option<i64>,
        message: Option<String>,
    },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
        retry_after_ms: Option<u64>,
    },
    #[error("task '{task_id}' did not reach a terminal status before the deadline (last status: {last_status})")]
    TaskTimeout {
        task_id: String,
        last_status: TaskStatus,
    },
    #[error("task '{task_id}' failed: {reason}")]
    TaskFailed { task_id: String, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("i/o error: {0}")]
    Io(String),
}

impl NlmError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            retry_after_ms: None,
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::MalformedRecord {
            detail: detail.into(),
        })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Transport failures that may clear up on their own: no response at
    /// all, or a status worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { status: None, .. } => true,
            Self::Transport {
                status: Some(status),
                ..
            } => should_retry_status(*status),
            _ => false,
        }
    }

    /// HTTP status behind a transport failure, if the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Remote fault code of an RPC failure.
    pub fn fault_code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => *code,
            _ => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Transport { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

impl From<WireError> for NlmError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::Encoding(detail) => Self::Encoding(detail),
            WireError::Protocol(protocol) => Self::Protocol(protocol),
            WireError::Rpc {
                method_id,
                code,
                message,
            } => Self::Rpc {
                method_id,
                code,
                message,
            },
        }
    }
}

impl From<std::io::Error> for NlmError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<reqwest::Error> for NlmError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport {
            message: error.to_string(),
            status: error.status().map(|status| status.as_u16()),
            retry_after_ms: None,
        }
    }
}
