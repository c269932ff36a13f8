//! Builders for synthetic response bodies.
//!
//! Mock servers and decoder tests use these to produce bodies in the exact
//! framing the remote emits.

use serde_json::{json, Value};

use crate::{ANTI_HIJACK_PREFIX, ERROR_TAG, GENERIC_RECORD_KIND, RESULT_TAG};

/// A `wrb.fr` record answering `method_id` with `payload`.
pub fn result_record(method_id: &str, payload: &Value) -> Value {
    json!([
        RESULT_TAG,
        method_id,
        payload.to_string(),
        null,
        null,
        null,
        GENERIC_RECORD_KIND
    ])
}

/// A `wrb.fr` record whose payload slot holds the null literal.
pub fn null_result_record(method_id: &str) -> Value {
    json!([RESULT_TAG, method_id, null, null, null, null, GENERIC_RECORD_KIND])
}

/// An `er` record reporting `code` and `message` for `method_id`.
pub fn error_record(method_id: &str, code: i64, message: &str) -> Value {
    json!([
        ERROR_TAG,
        method_id,
        json!([code, message]).to_string(),
        null,
        null,
        null,
        "error"
    ])
}

/// A body with every record in its own exactly-sized chunk, plus the
/// trailing bookkeeping records the remote appends.
pub fn response_body(records: &[Value]) -> String {
    let mut body = format!("{ANTI_HIJACK_PREFIX}\n\n");
    for record in records {
        push_chunk(&mut body, &json!([record]).to_string());
    }
    push_chunk(&mut body, r#"[["di",42],["af.httprm",41,"-2817693417473544512",7]]"#);
    push_chunk(&mut body, r#"[["e",4,null,null,137]]"#);
    body
}

fn push_chunk(body: &mut String, chunk: &str) {
    body.push_str(&chunk.len().to_string());
    body.push('\n');
    body.push_str(chunk);
    body.push('\n');
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{error_record, null_result_record, response_body, result_record};
    use crate::{decode_response, parse_frames, RpcPayload, WireError};

    #[test]
    fn built_bodies_decode_back() {
        let body = response_body(&[
            result_record("wXbhsf", &json!([["nb_1", "Title"]])),
            null_result_record("R7cb6c"),
            error_record("gArtLc", 403, "Forbidden"),
        ]);

        assert_eq!(parse_frames(body.as_bytes()).expect("frames").len(), 3);
        assert_eq!(
            decode_response(body.as_bytes(), "wXbhsf", false).expect("list"),
            RpcPayload::Value(json!([["nb_1", "Title"]]))
        );
        assert_eq!(
            decode_response(body.as_bytes(), "R7cb6c", true).expect("null"),
            RpcPayload::NoResult
        );
        assert_eq!(
            decode_response(body.as_bytes(), "gArtLc", false),
            Err(WireError::Rpc {
                method_id: "gArtLc".to_string(),
                code: Some(403),
                message: Some("Forbidden".to_string()),
            })
        );
    }
}
