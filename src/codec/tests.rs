//! Unit and property tests for [`GrpcCodec`].

use bytes::{Bytes, BytesMut};
use proptest::{
    collection::vec,
    prelude::{Strategy, any},
    prop_assert,
    prop_assert_eq,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner},
};
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};

use super::{
    CodecError,
    EofError,
    Frame,
    FramingError,
    GrpcCodec,
    MESSAGE_HEADER_SIZE,
    encode_message,
};

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    let rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
    TestRunner::new_with_rng(config, rng)
}

fn wire(payload: &[u8]) -> BytesMut {
    let mut codec = GrpcCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(Frame::new(Bytes::copy_from_slice(payload)), &mut buf)
        .expect("encode should succeed");
    buf
}

/// Feed `chunks` into a decoder one at a time, as a transport would.
fn decode_chunked(chunks: &[&[u8]]) -> Result<Vec<Bytes>, CodecError> {
    let mut codec = GrpcCodec::default();
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(frame) = codec.decode(&mut buf)? {
            out.push(frame.into_payload());
        }
    }
    while let Some(frame) = codec.decode_eof(&mut buf)? {
        out.push(frame.into_payload());
    }
    Ok(out)
}

#[test]
fn encode_writes_identity_prefix() {
    let buf = wire(b"abc");
    assert_eq!(&buf[..], &[0, 0, 0, 0, 3, b'a', b'b', b'c']);
}

#[test]
fn empty_payload_is_a_valid_message() {
    let mut buf = wire(b"");
    assert_eq!(buf.len(), MESSAGE_HEADER_SIZE);
    let frame = GrpcCodec::default()
        .decode(&mut buf)
        .expect("decode should succeed")
        .expect("frame should be complete");
    assert!(frame.is_empty());
    assert!(buf.is_empty());
}

#[rstest]
#[case::partial_header(&[0, 0, 0][..])]
#[case::partial_payload(&[0, 0, 0, 0, 4, 1, 2][..])]
fn decode_waits_for_complete_message(#[case] bytes: &[u8]) {
    let mut buf = BytesMut::from(bytes);
    assert!(
        GrpcCodec::default()
            .decode(&mut buf)
            .expect("decode should not fail")
            .is_none()
    );
    assert_eq!(buf.len(), bytes.len(), "nothing should be consumed");
}

#[test]
fn compressed_flag_is_preserved() {
    let mut buf = BytesMut::from(&[1, 0, 0, 0, 1, 9][..]);
    let frame = GrpcCodec::default()
        .decode(&mut buf)
        .expect("decode should succeed")
        .expect("frame should be complete");
    assert!(frame.is_compressed());
}

#[test]
fn reserved_flag_values_are_rejected() {
    let mut buf = BytesMut::from(&[2, 0, 0, 0, 0][..]);
    let err = GrpcCodec::default()
        .decode(&mut buf)
        .expect_err("flag 2 is reserved");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::InvalidCompressionFlag(2))
    ));
}

#[test]
fn oversized_length_is_rejected_before_payload_arrives() {
    let mut codec = GrpcCodec::new(8, None);
    let mut buf = BytesMut::from(&[0, 0, 0, 0, 9][..]);
    let err = codec.decode(&mut buf).expect_err("length exceeds limit");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::OversizedMessage { size: 9, max: 8 })
    ));
}

#[test]
fn send_limit_is_enforced() {
    let mut codec = GrpcCodec::new(1024, Some(2));
    let err = encode_message(&mut codec, Bytes::from_static(b"abc")).expect_err("too large");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::SendLimitExceeded { size: 3, max: 2 })
    ));
}

#[rstest]
#[case::mid_header(&[0, 0][..], EofError::MidHeader { bytes_received: 2, header_size: 5 })]
#[case::mid_frame(
    &[0, 0, 0, 0, 4, 1][..],
    EofError::MidFrame { bytes_received: 1, expected: 4 }
)]
fn truncated_body_reports_eof_position(#[case] bytes: &[u8], #[case] expected: EofError) {
    let mut buf = BytesMut::from(bytes);
    let err = GrpcCodec::default()
        .decode_eof(&mut buf)
        .expect_err("truncated body must fail");
    match err {
        CodecError::Eof(eof) => assert_eq!(eof, expected),
        other => panic!("expected EOF error, got {other:?}"),
    }
}

#[test]
fn clean_end_of_stream_yields_none() {
    let mut buf = BytesMut::new();
    assert!(
        GrpcCodec::default()
            .decode_eof(&mut buf)
            .expect("clean EOF")
            .is_none()
    );
}

#[test]
fn byte_at_a_time_matches_whole_buffer() {
    let mut bytes = wire(b"first").to_vec();
    bytes.extend_from_slice(&wire(b"second"));

    let whole = decode_chunked(&[&bytes]).expect("whole decode");
    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    let split = decode_chunked(&singles).expect("byte-at-a-time decode");

    assert_eq!(whole, split);
    assert_eq!(whole, vec![Bytes::from_static(b"first"), Bytes::from_static(b"second")]);
}

#[test]
fn generated_payloads_survive_arbitrary_splits() {
    let mut runner = deterministic_runner(128);
    let strategy = (vec(vec(any::<u8>(), 0..64), 1..6), vec(1usize..8, 1..32));

    runner
        .run(&strategy, |(payloads, split_sizes)| {
            let mut bytes = Vec::new();
            for payload in &payloads {
                bytes.extend_from_slice(&wire(payload));
            }

            let mut chunks = Vec::new();
            let mut rest = bytes.as_slice();
            for size in split_sizes.iter().cycle() {
                if rest.is_empty() {
                    break;
                }
                let (head, tail) = rest.split_at((*size).min(rest.len()));
                chunks.push(head);
                rest = tail;
            }

            let decoded = decode_chunked(&chunks)
                .map_err(|err| TestCaseError::fail(format!("decode failed: {err}")))?;
            prop_assert_eq!(decoded.len(), payloads.len());
            for (got, expected) in decoded.iter().zip(&payloads) {
                prop_assert!(got[..] == expected[..]);
            }
            Ok(())
        })
        .expect("split payload sequences should round-trip");
}

#[test]
fn generated_truncations_are_framing_errors() {
    let mut runner = deterministic_runner(96);
    let strategy = vec(any::<u8>(), 1..64)
        .prop_flat_map(|payload| {
            let total = payload.len() + MESSAGE_HEADER_SIZE;
            (proptest::strategy::Just(payload), 1..total)
        });

    runner
        .run(&strategy, |(payload, cut)| {
            let bytes = wire(&payload);
            let result = decode_chunked(&[&bytes[..cut]]);
            prop_assert!(matches!(result, Err(CodecError::Eof(_))));
            Ok(())
        })
        .expect("truncated messages should be rejected");
}
