use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{json, Value};

use crate::{RpcMethod, WireError};

/// Form field carrying the JSON envelope.
pub const ENVELOPE_FORM_FIELD: &str = "f.req";
/// Form field carrying the anti-CSRF token.
pub const CSRF_FORM_FIELD: &str = "at";

const CALL_MARKER: &str = "generic";

#[derive(Debug, Clone, PartialEq)]
/// One positional remote call.
pub struct RpcCall {
    pub method_id: String,
    pub params: Value,
}

impl RpcCall {
    pub fn new(method_id: impl Into<String>, params: Value) -> Self {
        Self {
            method_id: method_id.into(),
            params,
        }
    }

    pub fn method(method: RpcMethod, params: Value) -> Self {
        Self::new(method.as_str(), params)
    }

    /// Builds a call from any serializable parameter value.
    ///
    /// Fails with [`WireError::Encoding`] when the value has no JSON form,
    /// e.g. a map keyed by something other than strings.
    pub fn from_serialize<T>(method_id: impl Into<String>, params: &T) -> Result<Self, WireError>
    where
        T: Serialize + ?Sized,
    {
        let method_id = method_id.into();
        let params = serde_json::to_value(params).map_err(|error| {
            WireError::encoding(format!(
                "parameters for method id '{method_id}' are not JSON-representable: {error}"
            ))
        })?;
        Ok(Self { method_id, params })
    }

    fn to_wire(&self) -> Result<Value, WireError> {
        let params_json = serde_json::to_string(&self.params).map_err(|error| {
            WireError::encoding(format!(
                "failed to serialize parameters for method id '{}': {error}",
                self.method_id
            ))
        })?;
        Ok(json!([self.method_id, params_json, Value::Null, CALL_MARKER]))
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Ordered calls plus the credentials the remote expects beside them.
pub struct RpcEnvelope {
    calls: Vec<RpcCall>,
    csrf_token: String,
    session_id: String,
}

impl RpcEnvelope {
    /// Validates the batch: non-empty, non-blank ids, no id repeated.
    pub fn new(
        calls: Vec<RpcCall>,
        csrf_token: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self, WireError> {
        if calls.is_empty() {
            return Err(WireError::encoding("an envelope needs at least one call"));
        }
        let mut seen = BTreeSet::new();
        for call in &calls {
            let method_id = call.method_id.as_str();
            if method_id.trim().is_empty() || method_id.contains(char::is_whitespace) {
                return Err(WireError::encoding(format!(
                    "invalid method id '{method_id}'"
                )));
            }
            if !seen.insert(method_id) {
                return Err(WireError::encoding(format!(
                    "method id '{method_id}' appears more than once in one batch"
                )));
            }
        }
        Ok(Self {
            calls,
            csrf_token: csrf_token.into(),
            session_id: session_id.into(),
        })
    }

    pub fn calls(&self) -> &[RpcCall] {
        &self.calls
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn method_ids(&self) -> Vec<&str> {
        self.calls
            .iter()
            .map(|call| call.method_id.as_str())
            .collect()
    }

    /// Compact JSON text of the `f.req` field: `[[[id, "<params>", null, "generic"], ...]]`.
    pub fn envelope_json(&self) -> Result<String, WireError> {
        let calls = self
            .calls
            .iter()
            .map(RpcCall::to_wire)
            .collect::<Result<Vec<_>, _>>()?;
        serde_json::to_string(&json!([calls])).map_err(|error| {
            WireError::encoding(format!("failed to serialize envelope: {error}"))
        })
    }

    /// Form body with the envelope first and the CSRF token second.
    pub fn form_body(&self) -> Result<String, WireError> {
        let envelope = self.envelope_json()?;
        let mut body = String::with_capacity(envelope.len() + self.csrf_token.len() + 16);
        body.push_str(ENVELOPE_FORM_FIELD);
        body.push('=');
        push_form_value(&mut body, &envelope);
        body.push('&');
        if !self.csrf_token.is_empty() {
            body.push_str(CSRF_FORM_FIELD);
            body.push('=');
            push_form_value(&mut body, &self.csrf_token);
            body.push('&');
        }
        Ok(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Output of [`encode_request`]: the form body plus the values that travel
/// in the query string.
pub struct EncodedRequest {
    pub body: String,
    pub rpc_ids: String,
    pub session_id: String,
}

impl EncodedRequest {
    /// Query parameters in the order the web client sends them.
    pub fn query_pairs(
        &self,
        source_path: &str,
        language: &str,
        request_id: u64,
    ) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("rpcids", self.rpc_ids.clone()),
            ("source-path", source_path.to_string()),
        ];
        if !self.session_id.is_empty() {
            pairs.push(("f.sid", self.session_id.clone()));
        }
        pairs.push(("hl", language.to_string()));
        pairs.push(("_reqid", request_id.to_string()));
        pairs.push(("rt", "c".to_string()));
        pairs
    }
}

/// Encodes `calls` into one multiplexed request.
pub fn encode_request(
    calls: &[RpcCall],
    csrf_token: &str,
    session_id: &str,
) -> Result<EncodedRequest, WireError> {
    let envelope = RpcEnvelope::new(calls.to_vec(), csrf_token, session_id)?;
    Ok(EncodedRequest {
        body: envelope.form_body()?,
        rpc_ids: envelope.method_ids().join(","),
        session_id: envelope.session_id().to_string(),
    })
}

/// Percent-encodes only what a form decoder would misread, so JSON brackets
/// and commas stay literal on the wire.
fn push_form_value(out: &mut String, raw: &str) {
    for byte in raw.bytes() {
        if is_form_literal(byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
}

fn is_form_literal(byte: u8) -> bool {
    byte.is_ascii_graphic()
        && !matches!(
            byte,
            b'%' | b'&' | b'+' | b'=' | b'#' | b'"' | b'\\' | b'\'' | b'<' | b'>' | b'`'
        )
}
