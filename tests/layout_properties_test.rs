//! Properties of the byte layout that must hold for any sequence of writes.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use yarasynth::layout::DecoyGenerator;
use yarasynth::{ByteLayout, Donor, Slot, SynthError};

fn layout(seed: u64) -> ByteLayout {
    ByteLayout::new(DecoyGenerator::new(Donor::builtin(64), StdRng::seed_from_u64(seed), 10))
}

#[derive(Debug, Clone)]
enum Op {
    Place { start: usize, bytes: Vec<u8> },
    Reserve(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..256, proptest::collection::vec(any::<u8>(), 1..16))
            .prop_map(|(start, bytes)| Op::Place { start, bytes }),
        (1usize..16).prop_map(Op::Reserve),
    ]
}

proptest! {
    #[test]
    fn prop_committed_bytes_are_never_clobbered(ops in proptest::collection::vec(op(), 1..40), seed in any::<u64>()) {
        let mut layout = layout(seed);
        let mut committed: Vec<(usize, u8)> = Vec::new();

        for op in ops {
            match op {
                Op::Place { start, bytes } => {
                    let before: Vec<Slot> = (start..start + bytes.len()).map(|o| layout.slot(o)).collect();
                    match layout.place(&bytes, start, false) {
                        Ok(()) => committed.extend(bytes.iter().enumerate().map(|(i, &b)| (start + i, b))),
                        Err(SynthError::PlacementConflict { .. }) => {
                            let after: Vec<Slot> = (start..start + bytes.len()).map(|o| layout.slot(o)).collect();
                            prop_assert_eq!(before, after);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {}", other),
                    }
                }
                Op::Reserve(len) => {
                    let start = layout.reserve_first_free(len).unwrap();
                    prop_assert!(layout.is_reserved(start..start + len));
                }
            }
        }

        for (offset, byte) in &committed {
            prop_assert_eq!(layout.slot(*offset), Slot::Value(*byte));
        }

        layout.fill_gaps().unwrap();
        let bytes = layout.materialize().unwrap();
        prop_assert_eq!(bytes.len(), layout.len());
        for (offset, byte) in committed {
            prop_assert_eq!(bytes[offset], byte);
        }
    }

    #[test]
    fn prop_claims_only_replace_header_bytes(
        claims in proptest::collection::vec((0usize..96, proptest::collection::vec(any::<u8>(), 1..8)), 1..30),
    ) {
        let mut layout = layout(5);
        layout.append(&[0xee; 64]);
        let mut committed: Vec<Option<u8>> = vec![None; 128];

        for (start, bytes) in claims {
            let conflicts = bytes
                .iter()
                .enumerate()
                .any(|(i, &b)| committed[start + i].is_some_and(|c| c != b));
            let result = layout.claim(&bytes, start);
            prop_assert_eq!(result.is_err(), conflicts);
            if result.is_ok() {
                for (i, &b) in bytes.iter().enumerate() {
                    committed[start + i] = Some(b);
                }
            }
        }

        for offset in 0..64 {
            let expected = match committed[offset] {
                Some(byte) => Slot::Value(byte),
                None => Slot::Seed(0xee),
            };
            prop_assert_eq!(layout.slot(offset), expected);
        }
    }

    #[test]
    fn prop_reservations_are_disjoint(lengths in proptest::collection::vec(1usize..12, 1..20)) {
        let mut layout = layout(0);
        let mut spans: Vec<std::ops::Range<usize>> = Vec::new();
        for len in lengths {
            let start = layout.reserve_first_free(len).unwrap();
            let span = start..start + len;
            prop_assert!(spans.iter().all(|s| s.end <= span.start || span.end <= s.start));
            spans.push(span);
        }
    }

    #[test]
    fn prop_decoy_has_exact_length(len in 0usize..2048, seed in any::<u64>()) {
        let mut layout = layout(seed);
        prop_assert_eq!(layout.decoy(len).len(), len);
    }

    #[test]
    fn prop_fill_gaps_leaves_nothing_unset(starts in proptest::collection::vec(0usize..512, 1..10)) {
        let mut layout = layout(3);
        for start in starts {
            let _ = layout.place(b"AB", start, false);
        }
        layout.fill_gaps().unwrap();
        prop_assert!(layout.gaps().is_empty());
        prop_assert!((0..layout.len()).all(|o| matches!(layout.slot(o), Slot::Value(_))));
    }
}

#[test]
fn test_materialize_with_unset_slot_fails() {
    let mut layout = layout(0);
    layout.place(b"Z", 9, false).unwrap();
    let err = layout.materialize().unwrap_err();
    assert!(matches!(err, SynthError::IncompleteLayout { offset: 0 }));
}
