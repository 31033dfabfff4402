//! Property-based tests for the push protocol

use super::*;
use crate::graph::{ProtocolEvent, RunError};
use futures::stream;
use proptest::prelude::*;
use serde_json::json;
use tokio::sync::mpsc;

fn arb_event() -> impl Strategy<Value = Result<ProtocolEvent, RunError>> {
    prop_oneof![
        4 => "[a-zA-Z0-9 .,é✓\n]{0,12}".prop_map(|t| Ok(ProtocolEvent::Token(t))),
        1 => (-100i64..100, -100i64..100).prop_map(|(a, b)| Ok(ProtocolEvent::ToolStarted {
            tool: "calculator".to_string(),
            input: json!({"a": a, "b": b}),
        })),
        1 => (-200i64..200).prop_map(|v| Ok(ProtocolEvent::ToolCompleted {
            tool: "calculator".to_string(),
            output: json!(v),
        })),
        1 => Just(Ok(ProtocolEvent::TurnComplete)),
        1 => "[a-z ]{1,10}".prop_map(|m| Ok(ProtocolEvent::RunError(m))),
        1 => Just(Err(RunError::StepLimitExceeded { max: 3 })),
    ]
}

fn encode_run(events: Vec<Result<ProtocolEvent, RunError>>) -> Vec<u8> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async move {
        let (tx, mut rx) = mpsc::channel(256);
        let encoder = StreamEncoder::connect(tx).await;
        let producer = tokio::spawn(encoder.drain(stream::iter(events)));
        let mut bytes = Vec::new();
        while let Some(frame) = rx.recv().await {
            bytes.extend_from_slice(frame.as_bytes());
        }
        producer.await.unwrap();
        bytes
    })
}

fn decode_chunks(bytes: &[u8], sizes: &[usize]) -> Vec<WireFrame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut rest = bytes;
    let mut sizes = sizes.iter().cycle();
    while !rest.is_empty() {
        let size = (*sizes.next().unwrap_or(&1)).clamp(1, rest.len());
        let (chunk, tail) = rest.split_at(size);
        frames.extend(decoder.feed(chunk).into_iter().map(Result::unwrap));
        rest = tail;
    }
    frames.extend(decoder.finish().into_iter().map(Result::unwrap));
    frames
}

proptest! {
    /// Arbitrary chunking (1-byte chunks included) decodes to the same
    /// frames as a single chunk
    #[test]
    fn prop_chunking_does_not_change_frames(
        events in proptest::collection::vec(arb_event(), 0..12),
        sizes in proptest::collection::vec(1usize..9, 1..6),
    ) {
        let bytes = encode_run(events);
        let whole = decode_chunks(&bytes, &[bytes.len().max(1)]);
        prop_assert_eq!(&decode_chunks(&bytes, &sizes), &whole);
        prop_assert_eq!(&decode_chunks(&bytes, &[1]), &whole);
    }

    /// `connected` first, exactly one terminal frame, and it is last
    #[test]
    fn prop_exactly_one_terminal_frame(events in proptest::collection::vec(arb_event(), 0..12)) {
        let frames = decode_chunks(&encode_run(events), &[64]);
        prop_assert_eq!(frames.first(), Some(&WireFrame::Connected));
        let terminals = frames.iter().filter(|f| f.is_terminal()).count();
        prop_assert_eq!(terminals, 1);
        prop_assert!(frames.last().is_some_and(WireFrame::is_terminal));
    }
}
