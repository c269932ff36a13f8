//! Wire codec for the NotebookLM `batchexecute` RPC endpoint.
//!
//! [`encode_request`] builds the multiplexed form body for one or more calls
//! and [`decode_response`] turns a buffered response body into the payload of
//! one method id. Nothing in this crate performs I/O.
mod decoder;
mod encoder;
mod error;
mod frame;
mod method;
pub mod testing;

pub use decoder::{
    decode_batch, decode_response, parse_chunks, parse_frames, select_payload, BatchPayloads,
    RpcPayload, ANTI_HIJACK_PREFIX,
};
pub use encoder::{
    encode_request, EncodedRequest, RpcCall, RpcEnvelope, CSRF_FORM_FIELD, ENVELOPE_FORM_FIELD,
};
pub use error::{ProtocolError, WireError};
pub use frame::{FaultDetail, ResultFrame, ERROR_TAG, GENERIC_RECORD_KIND, RESULT_TAG};
pub use method::RpcMethod;
