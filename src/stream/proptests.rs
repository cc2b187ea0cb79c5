//! Property-based tests for stream reassembly
//!
//! Slicing the same bytes differently must never change what comes out.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Record text: any characters except the separators, including multi-byte ones
fn arb_record() -> impl Strategy<Value = String> {
    prop_oneof![
        r"[^\r\n\x{FFFD}]{0,24}",
        "[a-z0-9 ]{0,8}[éß€😀中]{1,4}[a-z ]{0,8}",
    ]
}

fn arb_records() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(arb_record(), 0..12)
}

/// Encode records the way the server does
fn encode(records: &[String]) -> Vec<u8> {
    records
        .iter()
        .flat_map(|r| format!("{r}\n").into_bytes())
        .collect()
}

/// Split `bytes` at the given (unsorted, possibly duplicate) cut points
fn chunk(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| if bytes.is_empty() { 0 } else { c % (bytes.len() + 1) })
        .collect();
    points.push(0);
    points.push(bytes.len());
    points.sort_unstable();
    points.dedup();
    points
        .windows(2)
        .map(|w| bytes[w[0]..w[1]].to_vec())
        .collect()
}

fn decode_all(chunks: &[Vec<u8>]) -> (Vec<String>, DecoderRemainder) {
    let mut decoder = StreamDecoder::new();
    let mut records = Vec::new();
    for c in chunks {
        records.extend(decoder.push(c));
    }
    (records, decoder.finish())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_chunk_boundary_invariance(
        records in arb_records(),
        cuts in proptest::collection::vec(any::<usize>(), 0..20),
    ) {
        let bytes = encode(&records);
        let (whole, whole_rest) = decode_all(&[bytes.clone()]);
        let (sliced, sliced_rest) = decode_all(&chunk(&bytes, &cuts));

        prop_assert_eq!(&whole, &sliced);
        prop_assert_eq!(whole_rest, sliced_rest);
        prop_assert_eq!(whole, records);
    }

    #[test]
    fn prop_byte_at_a_time_never_garbles(records in arb_records()) {
        let bytes = encode(&records);
        let single: Vec<Vec<u8>> = bytes.iter().map(|b| vec![*b]).collect();
        let (decoded, rest) = decode_all(&single);

        for record in &decoded {
            prop_assert!(!record.contains(char::REPLACEMENT_CHARACTER));
        }
        prop_assert_eq!(decoded.concat(), records.concat());
        prop_assert!(rest.is_empty());
    }

    #[test]
    fn prop_unterminated_tail_never_emitted(
        records in arb_records(),
        tail in "[a-z]{1,10}",
        cuts in proptest::collection::vec(any::<usize>(), 0..10),
    ) {
        let mut bytes = encode(&records);
        bytes.extend_from_slice(tail.as_bytes());
        let (decoded, rest) = decode_all(&chunk(&bytes, &cuts));

        prop_assert_eq!(decoded, records);
        prop_assert_eq!(rest.incomplete_record, Some(tail));
    }

    #[test]
    fn prop_text_deltas_survive_reassembly(
        fragments in proptest::collection::vec("[^\r]{0,16}", 1..8),
        cuts in proptest::collection::vec(any::<usize>(), 0..20),
    ) {
        // JSON-escaped payloads never contain a raw newline
        let records: Vec<String> = fragments
            .iter()
            .map(|f| format!("0:{}", serde_json::to_string(f).unwrap()))
            .collect();
        let bytes = encode(&records);
        let (decoded, _) = decode_all(&chunk(&bytes, &cuts));

        let text: String = decoded
            .iter()
            .map(|r| match parse_record(r) {
                Ok(StreamEvent::TextDelta(t)) => t,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        prop_assert_eq!(text, fragments.concat());
    }
}
