//! Property-based tests using proptest
//!
//! Frame encoding and decoding across random field contents, plus corruption checks.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use authlink::core::checksum;
use authlink::core::frame::{decode, decode_with_limit, Decoded, Frame};
use authlink::error::ProtocolError;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

fn frame_strategy() -> impl Strategy<Value = Frame> {
    let bytes = || prop::collection::vec(any::<u8>(), 0..512);
    prop_oneof![
        bytes().prop_map(Frame::text),
        (bytes(), bytes()).prop_map(|(c, p)| Frame::command(c, p)),
        (any::<u32>(), any::<f64>(), bytes())
            .prop_map(|(i, f, s)| Frame::data_packet(i, f, s)),
    ]
}

fn same_frame(a: &Frame, b: &Frame) -> bool {
    match (a, b) {
        (
            Frame::DataPacket {
                int_field: ia,
                float_field: fa,
                text: sa,
            },
            Frame::DataPacket {
                int_field: ib,
                float_field: fb,
                text: sb,
            },
        ) => ia == ib && fa.to_bits() == fb.to_bits() && sa == sb,
        _ => a == b,
    }
}

// Property: every frame decodes back to itself with an intact checksum
proptest! {
    #[test]
    fn prop_frame_roundtrip(frame in frame_strategy()) {
        let bytes = frame.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), frame.encoded_len());

        let decoded = block_on(decode(&mut &bytes[..])).unwrap();
        match decoded {
            Decoded::Message { frame: back, integrity_ok } => {
                prop_assert!(integrity_ok);
                prop_assert!(same_frame(&back, &frame));
            }
            Decoded::Unknown { .. } => prop_assert!(false, "known type decoded as unknown"),
        }
    }
}

// Property: the trailer is the CRC-32 of everything before it
proptest! {
    #[test]
    fn prop_trailer_is_crc_of_body(frame in frame_strategy()) {
        let bytes = frame.to_bytes().unwrap();
        let (body, trailer) = bytes.split_at(bytes.len() - checksum::CHECKSUM_LEN);
        let expected = checksum::checksum(body).to_be_bytes();
        prop_assert_eq!(trailer, &expected[..]);
    }
}

// Property: flipping any single bit outside the length prefixes is detected
proptest! {
    #[test]
    fn prop_single_bit_flip_detected(
        text in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut bytes = Frame::text(text).to_bytes().unwrap();
        // Skip the discriminant and length prefix so the frame still parses.
        let position = 5 + index.index(bytes.len() - 5);
        bytes[position] ^= 1 << bit;

        let decoded = block_on(decode(&mut &bytes[..])).unwrap();
        prop_assert!(!decoded.is_intact());
    }
}

// Property: a length prefix above the cap is refused before any payload is read
proptest! {
    #[test]
    fn prop_oversized_prefix_rejected(len in 65u32..=u32::MAX) {
        let mut bytes = vec![0x01];
        bytes.extend_from_slice(&len.to_be_bytes());

        let err = block_on(decode_with_limit(&mut &bytes[..], 64)).unwrap_err();
        let is_oversized = matches!(err, ProtocolError::OversizedField { max: 64, .. });
        prop_assert!(is_oversized);
    }
}

// Property: any truncation of a valid frame is a closed connection, never a frame
proptest! {
    #[test]
    fn prop_truncation_is_connection_closed(frame in frame_strategy(), cut in any::<prop::sample::Index>()) {
        let bytes = frame.to_bytes().unwrap();
        let keep = cut.index(bytes.len());

        let err = block_on(decode(&mut &bytes[..keep])).unwrap_err();
        prop_assert!(err.is_disconnect());
    }
}

// Property: unknown discriminants consume exactly one byte
proptest! {
    #[test]
    fn prop_unknown_discriminant(byte in any::<u8>().prop_filter("unknown", |b| !(1..=3).contains(b))) {
        let bytes = [byte, 0xAA];
        let mut source = &bytes[..];
        let decoded = block_on(decode(&mut source)).unwrap();
        prop_assert_eq!(decoded, Decoded::Unknown { type_byte: byte });
        prop_assert_eq!(source, &[0xAA][..]);
    }
}
