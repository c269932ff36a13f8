use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Malformed or unexpected wire shapes. None of these are retriable: they
/// mean the remote format drifted or the body was not an RPC response.
pub enum ProtocolError {
    #[error("prefix mismatch: body does not start with the anti-hijacking prefix")]
    PrefixMismatch,
    #[error("chunk framing at byte {offset}: {detail}")]
    ChunkFraming { offset: usize, detail: String },
    #[error("malformed record: {detail}")]
    MalformedRecord { detail: String },
    #[error("result not found for method id '{method_id}'")]
    ResultNotFound { method_id: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
/// Errors raised while encoding a request or decoding a response.
pub enum WireError {
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("rpc '{method_id}' reported a fault: {}", fault_summary(.code, .message))]
    Rpc {
        method_id: String,
        code: Option<i64>,
        message: Option<String>,
    },
}

impl WireError {
    pub(crate) fn encoding(detail: impl Into<String>) -> Self {
        Self::Encoding(detail.into())
    }
}

fn fault_summary(code: &Option<i64>, message: &Option<String>) -> String {
    match (code, message.as_deref()) {
        (Some(code), Some(message)) => format!("code {code} ({message})"),
        (Some(code), None) => format!("code {code}"),
        (None, Some(message)) => message.to_string(),
        (None, None) => "no fault detail".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{ProtocolError, WireError};

    #[test]
    fn rpc_error_display_includes_code_and_message() {
        let error = WireError::Rpc {
            method_id: "wXbhsf".to_string(),
            code: Some(403),
            message: Some("Forbidden".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "rpc 'wXbhsf' reported a fault: code 403 (Forbidden)"
        );
    }

    #[test]
    fn protocol_errors_render_transparently() {
        let error = WireError::from(ProtocolError::ResultNotFound {
            method_id: "gArtLc".to_string(),
        });
        assert_eq!(error.to_string(), "result not found for method id 'gArtLc'");
    }
}
