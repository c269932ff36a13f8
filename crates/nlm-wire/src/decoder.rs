use std::collections::BTreeMap;

use serde_json::Value;

use crate::{ProtocolError, ResultFrame, WireError};

/// Literal junk the remote prepends to every response body.
pub const ANTI_HIJACK_PREFIX: &str = ")]}'";

#[derive(Debug, Clone, PartialEq)]
/// Decoded result of one call.
pub enum RpcPayload {
    Value(Value),
    /// The call succeeded but returned the null literal and the caller opted
    /// into `allow_null`.
    NoResult,
}

impl RpcPayload {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::NoResult => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Value(value) => value,
            Self::NoResult => Value::Null,
        }
    }

    pub fn is_no_result(&self) -> bool {
        matches!(self, Self::NoResult)
    }
}

/// Splits a response body into its JSON chunks, in order.
pub fn parse_chunks(raw: &[u8]) -> Result<Vec<Value>, WireError> {
    let mut cursor = ChunkCursor::new(raw)?;
    let mut chunks = Vec::new();
    while let Some(chunk) = cursor.next_chunk()? {
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Flattens every result/error record across all chunks into frames.
pub fn parse_frames(raw: &[u8]) -> Result<Vec<ResultFrame>, WireError> {
    let mut frames = Vec::new();
    for chunk in parse_chunks(raw)? {
        let Value::Array(items) = chunk else {
            continue;
        };
        if items.first().is_some_and(Value::is_string) {
            frames.extend(ResultFrame::from_record(&items)?);
            continue;
        }
        for item in items {
            let record = match item {
                Value::Array(record) => record,
                other => {
                    return Err(ProtocolError::MalformedRecord {
                        detail: format!("chunk element is not a record array: {other}"),
                    }
                    .into())
                }
            };
            frames.extend(ResultFrame::from_record(&record)?);
        }
    }
    Ok(frames)
}

/// Picks the first frame answering `method_id` and turns it into a payload or
/// the remote fault it carries.
pub fn select_payload(
    frames: &[ResultFrame],
    method_id: &str,
    allow_null: bool,
) -> Result<RpcPayload, WireError> {
    let frame = frames
        .iter()
        .find(|frame| frame.method_id == method_id)
        .ok_or_else(|| ProtocolError::ResultNotFound {
            method_id: method_id.to_string(),
        })?;

    if let Some(fault) = &frame.fault {
        return Err(WireError::Rpc {
            method_id: method_id.to_string(),
            code: fault.code,
            message: fault.message.clone(),
        });
    }

    Ok(match &frame.payload {
        Some(value) => RpcPayload::Value(value.clone()),
        None if allow_null => RpcPayload::NoResult,
        None => RpcPayload::Value(Value::Null),
    })
}

/// Decodes the payload answering `method_id` from a buffered response body.
pub fn decode_response(
    raw: &[u8],
    method_id: &str,
    allow_null: bool,
) -> Result<RpcPayload, WireError> {
    let frames = parse_frames(raw)?;
    select_payload(&frames, method_id, allow_null)
}

/// Outcome of every id in one batch, keyed by method id.
pub type BatchPayloads = BTreeMap<String, Result<RpcPayload, WireError>>;

/// Decodes every requested id from one body.
///
/// Only a body that cannot be framed fails as a whole; a fault or a missing
/// frame is recorded against its own id and leaves the others intact.
pub fn decode_batch(
    raw: &[u8],
    method_ids: &[&str],
    allow_null: bool,
) -> Result<BatchPayloads, WireError> {
    let frames = parse_frames(raw)?;
    Ok(method_ids
        .iter()
        .map(|method_id| {
            (
                (*method_id).to_string(),
                select_payload(&frames, method_id, allow_null),
            )
        })
        .collect())
}

struct ChunkCursor<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> ChunkCursor<'a> {
    fn new(body: &'a [u8]) -> Result<Self, ProtocolError> {
        let prefix = ANTI_HIJACK_PREFIX.as_bytes();
        if !body.starts_with(prefix) {
            return Err(ProtocolError::PrefixMismatch);
        }
        Ok(Self {
            body,
            offset: prefix.len(),
        })
    }

    fn remaining(&self) -> &'a [u8] {
        &self.body[self.offset..]
    }

    fn skip_blank_lines(&mut self) {
        while let Some(byte) = self.body.get(self.offset) {
            if !byte.is_ascii_whitespace() {
                break;
            }
            self.offset += 1;
        }
    }

    /// Returns the current line without its terminator and the offset just
    /// past the terminator.
    fn peek_line(&self) -> (&'a [u8], usize) {
        let rest = self.remaining();
        match rest.iter().position(|byte| *byte == b'\n') {
            Some(end) => (&rest[..end], self.offset + end + 1),
            None => (rest, self.body.len()),
        }
    }

    fn next_chunk(&mut self) -> Result<Option<Value>, ProtocolError> {
        self.skip_blank_lines();
        if self.offset >= self.body.len() {
            return Ok(None);
        }

        let length_offset = self.offset;
        let (length_line, after_length) = self.peek_line();
        let declared = parse_length_line(length_line).ok_or_else(|| {
            framing(
                length_offset,
                format!(
                    "expected a decimal length line, found '{}'",
                    preview(length_line)
                ),
            )
        })?;
        self.offset = after_length;

        let chunk_offset = self.offset;
        let remaining = self.remaining();
        if declared <= remaining.len() {
            if let Ok(value) = serde_json::from_slice::<Value>(&remaining[..declared]) {
                self.offset += declared;
                return chunk_array(value, chunk_offset).map(Some);
            }
        }

        // The remote counts UTF-16 units rather than bytes, so a declared
        // length that misses is resynchronized at the line boundary.
        let (line, after_line) = self.peek_line();
        match serde_json::from_slice::<Value>(line) {
            Ok(value) => {
                tracing::debug!(
                    offset = chunk_offset,
                    declared_length = declared,
                    line_length = line.len(),
                    "chunk length mismatch; resynchronized at line boundary"
                );
                self.offset = after_line;
                chunk_array(value, chunk_offset).map(Some)
            }
            Err(_) if declared > remaining.len() => Err(framing(
                chunk_offset,
                format!(
                    "declared length {declared} exceeds the {} remaining bytes",
                    remaining.len()
                ),
            )),
            Err(error) => Err(framing(
                chunk_offset,
                format!("chunk is not valid JSON: {error}"),
            )),
        }
    }
}

fn parse_length_line(line: &[u8]) -> Option<usize> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() || !trimmed.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(trimmed).ok()?.parse().ok()
}

fn chunk_array(value: Value, offset: usize) -> Result<Value, ProtocolError> {
    if value.is_array() {
        Ok(value)
    } else {
        Err(framing(offset, format!("chunk is not a JSON array: {value}")))
    }
}

fn framing(offset: usize, detail: String) -> ProtocolError {
    ProtocolError::ChunkFraming { offset, detail }
}

fn preview(line: &[u8]) -> String {
    String::from_utf8_lossy(&line[..line.len().min(32)]).into_owned()
}
