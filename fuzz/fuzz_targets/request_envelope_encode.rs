#![no_main]

use libfuzzer_sys::fuzz_target;
use nlm_wire::{encode_request, RpcCall};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let (method_id, rest) = raw.split_once('\n').unwrap_or((raw.as_ref(), ""));
    let params = serde_json::from_str(rest).unwrap_or(serde_json::Value::String(rest.to_string()));
    if let Ok(encoded) = encode_request(&[RpcCall::new(method_id, params)], rest, method_id) {
        assert!(encoded.body.starts_with("f.req="));
        assert!(!encoded.body.contains('\n'));
        assert_eq!(encoded.rpc_ids, method_id);
    }
});
