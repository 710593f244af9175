//! Fuzz target for SOAP response decoding.
//!
//! Arbitrary input must decode into a JSON payload, a remote fault, or a
//! transport error. It must never panic.

#![no_main]

use arca_sdk_authn::soap::parse_envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(document) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(payload) = parse_envelope(document) {
        // Decoded payloads are always serializable
        let _ = serde_json::to_string(&payload);
    }
});
