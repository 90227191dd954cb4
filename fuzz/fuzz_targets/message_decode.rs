//! Fuzz target for inbound message decoding.
//!
//! # Invariants
//!
//! - Decoding arbitrary text never panics
//! - Anything that decodes re-encodes and decodes to the same message,
//!   size limit permitting

#![no_main]

use huddle_proto::{ClientMessage, MAX_MESSAGE_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    let Ok(message) = ClientMessage::decode(text) else {
        return;
    };

    let encoded = message.encode().unwrap();
    if encoded.len() > MAX_MESSAGE_SIZE {
        return;
    }
    let decoded = ClientMessage::decode(&encoded).unwrap();
    assert_eq!(decoded, message);
});
