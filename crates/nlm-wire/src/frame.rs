use serde_json::Value;

use crate::ProtocolError;

/// Tag of a record carrying one call result.
pub const RESULT_TAG: &str = "wrb.fr";
/// Tag of a record reporting a per-call failure.
pub const ERROR_TAG: &str = "er";
/// Record kind echoed back for calls encoded with the `generic` marker.
pub const GENERIC_RECORD_KIND: &str = "generic";

const METHOD_ID_INDEX: usize = 1;
const PAYLOAD_INDEX: usize = 2;
const STATUS_INDEX: usize = 5;
const RECORD_KIND_INDEX: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Fault code and message reported by the remote for one call.
pub struct FaultDetail {
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl FaultDetail {
    /// Pulls the first integer and the first string out of a status or
    /// payload value, looking one level into arrays.
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(number) => Self {
                code: number.as_i64(),
                message: None,
            },
            Value::String(message) => Self {
                code: None,
                message: Some(message.clone()),
            },
            Value::Array(items) => {
                let mut fault = Self::default();
                for item in items {
                    match item {
                        Value::Number(number) if fault.code.is_none() => {
                            fault.code = number.as_i64();
                        }
                        Value::String(message) if fault.message.is_none() => {
                            fault.message = Some(message.clone());
                        }
                        Value::Array(_) if fault.code.is_none() => {
                            let nested = Self::from_value(item);
                            fault.code = nested.code;
                            fault.message = fault.message.or(nested.message);
                        }
                        _ => {}
                    }
                }
                fault
            }
            _ => Self::default(),
        }
    }

    fn or(self, fallback: Self) -> Self {
        Self {
            code: self.code.or(fallback.code),
            message: self.message.or(fallback.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One decoded per-call result extracted from a response body.
pub struct ResultFrame {
    pub tag: String,
    pub method_id: String,
    /// Payload after the second JSON decode. `None` when the wire carried null.
    pub payload: Option<Value>,
    pub record_kind: Option<String>,
    /// Set when the record is an error record.
    pub fault: Option<FaultDetail>,
}

impl ResultFrame {
    /// Builds a frame from one record array.
    ///
    /// Returns `Ok(None)` for bookkeeping records (`di`, `af.httprm`, `e`)
    /// that never answer a call.
    pub fn from_record(record: &[Value]) -> Result<Option<Self>, ProtocolError> {
        let Some(tag) = record.first() else {
            return Ok(None);
        };
        let Some(tag) = tag.as_str() else {
            return Err(malformed(format!("record tag is not a string: {tag}")));
        };
        if tag != RESULT_TAG && tag != ERROR_TAG {
            return Ok(None);
        }

        let method_id = record
            .get(METHOD_ID_INDEX)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| malformed(format!("'{tag}' record has no method id")))?
            .to_string();
        let payload = decode_payload(&method_id, record.get(PAYLOAD_INDEX))?;
        let status = record.get(STATUS_INDEX).filter(|value| !value.is_null());
        let record_kind = record
            .get(RECORD_KIND_INDEX)
            .and_then(Value::as_str)
            .map(str::to_string);

        let is_error = tag == ERROR_TAG
            || status.is_some()
            || record_kind.as_deref().is_some_and(is_error_record_kind);
        let fault = is_error.then(|| {
            let from_status = status.map(FaultDetail::from_value).unwrap_or_default();
            let from_payload = payload
                .as_ref()
                .map(FaultDetail::from_value)
                .unwrap_or_default();
            from_status.or(from_payload)
        });

        Ok(Some(Self {
            tag: tag.to_string(),
            method_id,
            payload,
            record_kind,
            fault,
        }))
    }

    pub fn is_error(&self) -> bool {
        self.fault.is_some()
    }
}

/// Normal results echo `generic` or, for indexed batch calls, a decimal index.
fn is_error_record_kind(kind: &str) -> bool {
    let is_batch_index = !kind.is_empty() && kind.bytes().all(|byte| byte.is_ascii_digit());
    kind != GENERIC_RECORD_KIND && !is_batch_index
}

fn decode_payload(method_id: &str, raw: Option<&Value>) -> Result<Option<Value>, ProtocolError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text)
            .map(|value| (!value.is_null()).then_some(value))
            .map_err(|error| {
                malformed(format!(
                    "payload for method id '{method_id}' is not JSON text: {error}"
                ))
            }),
        Some(other) => Ok(Some(other.clone())),
    }
}

fn malformed(detail: String) -> ProtocolError {
    ProtocolError::MalformedRecord { detail }
}
