//! Property-based tests for framing, masking, UTF-8 and handshake parsing.

use proptest::prelude::*;
use wsengine::protocol::{
    Frame, HandshakeRequest, HandshakeResponse, MessageAssembler, OpCode, Utf8Validator,
    apply_mask, apply_mask_fast,
};
use wsengine::{CloseFrame, Limits};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

fn control_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Close), Just(OpCode::Ping), Just(OpCode::Pong)]
}

proptest! {
    #[test]
    fn test_masked_frame_parses_back(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..70_000),
        mask in any::<[u8; 4]>()
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let wire = frame.to_bytes(Some(mask));
        prop_assert_eq!(wire.len(), frame.wire_size(true));
        prop_assert_eq!(wire[1] & 0x80, 0x80);

        let (parsed, consumed) = Frame::parse(&wire).unwrap();
        prop_assert_eq!(consumed, wire.len());
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn test_unmasked_wire_size(
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..70_000)
    ) {
        let frame = Frame::new(true, opcode, payload);
        let wire = frame.to_bytes(None);
        prop_assert_eq!(wire.len(), frame.wire_size(false));
        prop_assert_eq!(wire[1] & 0x80, 0);
    }

    #[test]
    fn test_mask_is_self_inverse(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(&data, &masked);
    }

    #[test]
    fn test_fast_mask_matches_simple(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut simple = data.clone();
        let mut fast = data;
        apply_mask(&mut simple, mask);
        apply_mask_fast(&mut fast, mask);
        prop_assert_eq!(simple, fast);
    }

    #[test]
    fn test_truncated_frame_is_incomplete(
        payload in prop::collection::vec(any::<u8>(), 1..500),
        cut in 1..50usize
    ) {
        let wire = Frame::binary(payload).to_bytes(Some([1, 2, 3, 4]));
        let keep = wire.len().saturating_sub(cut).max(1);
        prop_assert!(Frame::parse(&wire[..keep]).is_err());
    }

    #[test]
    fn test_control_frame_limit(
        opcode in control_opcode_strategy(),
        len in 0..256usize
    ) {
        let frame = Frame::new(true, opcode, vec![0x42; len]);
        prop_assert_eq!(frame.validate().is_ok(), len <= 125);
    }

    #[test]
    fn test_text_split_anywhere_reassembles(
        text in "\\PC{0,200}",
        splits in prop::collection::vec(any::<prop::sample::Index>(), 0..6)
    ) {
        let bytes = text.as_bytes();
        let mut cuts: Vec<usize> = splits.iter().map(|i| i.index(bytes.len() + 1)).collect();
        cuts.push(0);
        cuts.push(bytes.len());
        cuts.sort_unstable();
        cuts.dedup();

        let mut assembler = MessageAssembler::new(Limits::default());
        let pieces: Vec<&[u8]> = cuts.windows(2).map(|w| &bytes[w[0]..w[1]]).collect();
        let mut result = None;
        if pieces.is_empty() {
            result = assembler.push(Frame::text(Vec::new())).unwrap();
        }
        for (i, piece) in pieces.iter().enumerate() {
            let opcode = if i == 0 { OpCode::Text } else { OpCode::Continuation };
            let fin = i + 1 == pieces.len();
            result = assembler.push(Frame::new(fin, opcode, piece.to_vec())).unwrap();
        }
        let message = result.unwrap();
        prop_assert_eq!(message.len(), bytes.len());
        prop_assert_eq!(message, wsengine::protocol::AssembledMessage::Text(text));
    }

    #[test]
    fn test_utf8_validator_agrees_with_std(
        data in prop::collection::vec(any::<u8>(), 0..64),
        cut in any::<prop::sample::Index>()
    ) {
        let at = cut.index(data.len() + 1);
        let mut validator = Utf8Validator::new();
        let streamed = validator
            .feed(&data[..at], false)
            .and_then(|()| validator.feed(&data[at..], true))
            .is_ok();
        prop_assert_eq!(streamed, std::str::from_utf8(&data).is_ok());
    }

    #[test]
    fn test_close_frame_round_trip(
        code in prop_oneof![1000u16..=1003, 1007u16..=1014, 3000u16..=4999],
        reason in "\\PC{0,30}"
    ) {
        prop_assume!(reason.len() <= 123);
        let frame = CloseFrame::new(code.into(), reason);
        prop_assert!(frame.validate().is_ok());
        prop_assert_eq!(CloseFrame::parse(&frame.encode()).unwrap(), Some(frame));
    }

    #[test]
    fn test_handshake_parse_never_panics(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = HandshakeRequest::parse(&data);
        let _ = HandshakeResponse::parse(&data);
    }

    #[test]
    fn test_handshake_valid_variations(
        path in "/[a-z]{1,20}",
        host in "[a-z]{3,10}\\.[a-z]{2,4}"
    ) {
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );
        let parsed = HandshakeRequest::parse(request.as_bytes());
        prop_assert!(parsed.is_ok(), "valid request should parse: {:?}", parsed);
    }
}

#[test]
fn test_length_tier_boundaries() {
    for (len, header) in [
        (0, 2),
        (125, 2),
        (126, 4),
        (65_535, 4),
        (65_536, 10),
    ] {
        let frame = Frame::binary(vec![0xab; len]);
        let wire = frame.to_bytes(None);
        assert_eq!(wire.len(), header + len, "length {len}");
        let (parsed, _) = Frame::parse(&wire).unwrap();
        assert_eq!(parsed.payload().len(), len);
    }
}
