//! Fuzz target for frame and payload decoding
//!
//! Untrusted bytes from the network must never crash the decoder.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary input fed straight to `Frame::decode`
//! - Forged headers: valid magic and version with an arbitrary opcode, flags,
//!   and body so CBOR decoding is reached
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - A decoded frame re-encodes to exactly the input bytes
//! - A decoded payload survives encode -> decode unchanged

#![no_main]

use arbitrary::Arbitrary;
use custody_proto::{Frame, FrameFlags, FrameHeader, Opcode, Payload};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    Raw(Vec<u8>),
    Forged { opcode: u8, flags: u16, request_id: u64, body: Vec<u8> },
}

fuzz_target!(|input: FuzzInput| {
    match input {
        FuzzInput::Raw(bytes) => check_raw(&bytes),
        FuzzInput::Forged { opcode, flags, request_id, body } => {
            let opcode = Opcode::try_from(opcode).unwrap_or(Opcode::FetchMaterial);
            let mut header = FrameHeader::new(opcode);
            header.set_flags(FrameFlags::from_bits_truncate(flags));
            header.set_request_id(request_id);

            let frame = Frame::new(header, body);
            if let Ok(bytes) = frame.to_vec() {
                check_raw(&bytes);
            }
        },
    }
});

fn check_raw(bytes: &[u8]) {
    let Ok(frame) = Frame::decode(bytes) else {
        return;
    };

    let reencoded = frame.to_vec().expect("decoded frame must re-encode");
    assert_eq!(reencoded, bytes, "frame round trip changed the bytes");

    let Ok(payload) = Payload::from_frame(&frame) else {
        return;
    };

    let request_id = frame.header.request_id();
    let again = payload.clone().into_frame(request_id).expect("decoded payload must re-encode");
    assert_eq!(again.header.request_id(), request_id);
    assert_eq!(Payload::from_frame(&again).expect("re-encoded payload must decode"), payload);
}
