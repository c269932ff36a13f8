#![no_main]

use libfuzzer_sys::fuzz_target;
use nlm_wire::{decode_batch, decode_response, parse_frames};

fuzz_target!(|data: &[u8]| {
    let first = decode_response(data, "wXbhsf", false);
    let second = decode_response(data, "wXbhsf", false);
    assert_eq!(first, second);

    if let Ok(frames) = parse_frames(data) {
        for frame in &frames {
            assert!(frame.tag == "wrb.fr" || frame.tag == "er");
        }
        let ids: Vec<&str> = frames.iter().map(|frame| frame.method_id.as_str()).collect();
        let _ = decode_batch(data, &ids, true);
    }
});
