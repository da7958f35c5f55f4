//! Sparse byte layout for the synthetic file.
//!
//! The layout is an arena of [`Slot`]s indexed by absolute file offset. It
//! only ever grows, up to a fixed limit. Every slot starts [`Slot::Unset`];
//! the donor header is appended as [`Slot::Seed`] bytes that a rule may still
//! override; placements write [`Slot::Value`]s and reservations hold space as
//! [`Slot::Reserved`] until the value that belongs there is known. Once all
//! deliberate content is in, [`ByteLayout::fill_gaps`] covers the rest with
//! decoy code and [`ByteLayout::materialize`] yields the file.

mod decoy;

pub use decoy::DecoyGenerator;

use crate::config::DEFAULT_MAX_OUTPUT_LEN;
use crate::error::{Result, SynthError};
use std::ops::Range;
use tracing::{debug, trace, warn};

/// State of one byte of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Unset,
    Reserved,
    /// Header byte copied from the donor; rule-dictated bytes may replace it
    Seed(u8),
    Value(u8),
}

impl Slot {
    pub fn is_unset(self) -> bool {
        matches!(self, Slot::Unset)
    }

    pub fn is_reserved(self) -> bool {
        matches!(self, Slot::Reserved)
    }

    /// Concrete byte, if the slot has one.
    pub fn byte(self) -> Option<u8> {
        match self {
            Slot::Seed(byte) | Slot::Value(byte) => Some(byte),
            Slot::Unset | Slot::Reserved => None,
        }
    }
}

/// Growable byte mapping with placement, reservation and gap filling.
#[derive(Debug)]
pub struct ByteLayout {
    slots: Vec<Slot>,
    decoys: DecoyGenerator,
    max_len: usize,
}

impl ByteLayout {
    pub fn new(decoys: DecoyGenerator) -> Self {
        Self { slots: Vec::new(), decoys, max_len: DEFAULT_MAX_OUTPUT_LEN }
    }

    /// Cap the length the layout may grow to.
    #[must_use]
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Current length: highest offset touched so far plus one.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// State of the slot at `offset`; offsets past the end are unset.
    pub fn slot(&self, offset: usize) -> Slot {
        self.slots.get(offset).copied().unwrap_or_default()
    }

    /// `start..start + len`, provided it stays within the limit.
    fn span(&self, start: usize, len: usize) -> Result<Range<usize>> {
        match start.checked_add(len) {
            Some(end) if end <= self.max_len => Ok(start..end),
            Some(end) => Err(SynthError::output_too_large(end, self.max_len)),
            None => Err(SynthError::output_too_large(usize::MAX, self.max_len)),
        }
    }

    fn grow_to(&mut self, len: usize) -> Result<()> {
        if len > self.max_len {
            return Err(SynthError::output_too_large(len, self.max_len));
        }
        if self.slots.len() < len {
            self.slots.resize(len, Slot::Unset);
        }
        Ok(())
    }

    /// True if every slot in `range` is unset. Grows the mapping to cover
    /// `range.end`.
    pub fn is_vacant(&mut self, range: Range<usize>) -> Result<bool> {
        self.grow_to(range.end)?;
        Ok(self.slots[range].iter().all(|slot| slot.is_unset()))
    }

    /// True if every slot in `range` is reserved. Never grows the mapping.
    pub fn is_reserved(&self, range: Range<usize>) -> bool {
        if range.end > self.slots.len() {
            return range.is_empty();
        }
        self.slots[range].iter().all(|slot| slot.is_reserved())
    }

    /// True if `bytes` already sit at `start`, as header or committed bytes.
    pub fn holds(&self, bytes: &[u8], start: usize) -> bool {
        let Some(end) = start.checked_add(bytes.len()) else {
            return false;
        };
        end <= self.slots.len()
            && self.slots[start..end]
                .iter()
                .zip(bytes)
                .all(|(slot, &byte)| slot.byte() == Some(byte))
    }

    /// True if [`ByteLayout::claim`] could write `len` bytes at `start`.
    pub fn is_claimable(&mut self, start: usize, len: usize) -> Result<bool> {
        let range = self.span(start, len)?;
        self.grow_to(range.end)?;
        Ok(self.slots[range].iter().all(|slot| matches!(slot, Slot::Unset | Slot::Seed(_))))
    }

    fn write(&mut self, bytes: &[u8], range: Range<usize>) {
        trace!("place {} bytes at {}..{}", bytes.len(), range.start, range.end);
        for (slot, &byte) in self.slots[range].iter_mut().zip(bytes) {
            *slot = Slot::Value(byte);
        }
    }

    /// Write `bytes` at `start`.
    ///
    /// The target range must be entirely unset, or, with `allow_reserved`,
    /// entirely reserved. Anything else is a [`SynthError::PlacementConflict`]
    /// and leaves committed bytes untouched.
    pub fn place(&mut self, bytes: &[u8], start: usize, allow_reserved: bool) -> Result<()> {
        let range = self.span(start, bytes.len())?;
        let fits = self.is_vacant(range.clone())? || (allow_reserved && self.is_reserved(range.clone()));
        if !fits {
            return Err(SynthError::placement_conflict(range.start, range.end));
        }
        self.write(bytes, range);
        Ok(())
    }

    /// Write bytes a rule dictates at `start`.
    ///
    /// Unlike [`ByteLayout::place`], header seed bytes may be replaced, and
    /// slots already committed with the same byte are accepted. Reserved
    /// slots and differing committed bytes are a
    /// [`SynthError::PlacementConflict`].
    pub fn claim(&mut self, bytes: &[u8], start: usize) -> Result<()> {
        let range = self.span(start, bytes.len())?;
        self.grow_to(range.end)?;
        let fits = self.slots[range.clone()].iter().zip(bytes).all(|(slot, &byte)| match slot {
            Slot::Unset | Slot::Seed(_) => true,
            Slot::Value(value) => *value == byte,
            Slot::Reserved => false,
        });
        if !fits {
            return Err(SynthError::placement_conflict(range.start, range.end));
        }
        self.write(bytes, range);
        Ok(())
    }

    /// Append header seed bytes at the current end.
    pub fn append(&mut self, bytes: &[u8]) {
        self.slots.extend(bytes.iter().map(|&byte| Slot::Seed(byte)));
    }

    /// Reserve `length` bytes at the lowest offset where they are all unset.
    ///
    /// A trailing unset run shorter than `length` is extended past the
    /// current end. Returns the start of the reserved range.
    pub fn reserve_first_free(&mut self, length: usize) -> Result<usize> {
        if length == 0 {
            return Ok(0);
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for (offset, slot) in self.slots.iter().enumerate() {
            if slot.is_unset() {
                if run_len == 0 {
                    run_start = offset;
                }
                run_len += 1;
                if run_len == length {
                    break;
                }
            } else {
                run_len = 0;
            }
        }
        // run_len > 0 here means the run either reached `length` or runs into the end
        let start = if run_len > 0 { run_start } else { self.slots.len() };

        let range = self.span(start, length)?;
        self.grow_to(range.end)?;
        self.slots[range].fill(Slot::Reserved);
        debug!("reserved {} bytes at {}", length, start);
        Ok(start)
    }

    /// Maximal runs of unset slots, in ascending order.
    pub fn gaps(&self) -> Vec<Range<usize>> {
        self.runs(Slot::Unset)
    }

    /// Maximal runs of reserved slots, in ascending order.
    pub fn reserved_spans(&self) -> Vec<Range<usize>> {
        self.runs(Slot::Reserved)
    }

    fn runs(&self, wanted: Slot) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut current: Option<usize> = None;

        for (offset, &slot) in self.slots.iter().enumerate() {
            match (slot == wanted, current) {
                (true, None) => current = Some(offset),
                (false, Some(start)) => {
                    spans.push(start..offset);
                    current = None;
                }
                _ => {}
            }
        }
        if let Some(start) = current {
            spans.push(start..self.slots.len());
        }
        spans
    }

    /// Synthesize `length` bytes of decoy code.
    pub fn decoy(&mut self, length: usize) -> Vec<u8> {
        self.decoys.generate(length)
    }

    /// Cover every remaining unset run with decoy code.
    ///
    /// Reservations should all have been satisfied by now. Any that were not
    /// are filled the same way, losing the reservation.
    pub fn fill_gaps(&mut self) -> Result<usize> {
        let mut filled = 0;

        for span in self.gaps() {
            let bytes = self.decoy(span.len());
            self.place(&bytes, span.start, false)?;
            filled += span.len();
        }

        for span in self.reserved_spans() {
            warn!("reservation {}..{} was never satisfied, filling with decoy", span.start, span.end);
            let bytes = self.decoy(span.len());
            self.place(&bytes, span.start, true)?;
            filled += span.len();
        }

        debug!("filled {} of {} bytes with decoy code", filled, self.slots.len());
        Ok(filled)
    }

    /// Concrete file contents. Fails if any slot has no value yet.
    pub fn materialize(&self) -> Result<Vec<u8>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(offset, slot)| slot.byte().ok_or(SynthError::IncompleteLayout { offset }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donor::Donor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layout() -> ByteLayout {
        let decoys = DecoyGenerator::new(Donor::builtin(64), StdRng::seed_from_u64(1), 10);
        ByteLayout::new(decoys)
    }

    #[test]
    fn test_is_vacant_grows() {
        let mut layout = layout();
        assert!(layout.is_vacant(0..8).unwrap());
        assert_eq!(layout.len(), 8);
        assert!(layout.is_vacant(2..4).unwrap());
        assert_eq!(layout.len(), 8);
    }

    #[test]
    fn test_is_reserved_does_not_grow() {
        let layout = layout();
        assert!(!layout.is_reserved(0..4));
        assert_eq!(layout.len(), 0);
    }

    #[test]
    fn test_place_and_materialize() {
        let mut layout = layout();
        layout.place(b"abc", 0, false).unwrap();
        layout.place(b"de", 3, false).unwrap();
        assert_eq!(layout.materialize().unwrap(), b"abcde".to_vec());
    }

    #[test]
    fn test_place_conflict_keeps_committed_bytes() {
        let mut layout = layout();
        layout.place(b"abcd", 0, false).unwrap();
        let err = layout.place(b"XY", 3, false).unwrap_err();
        assert!(matches!(err, SynthError::PlacementConflict { start: 3, end: 5 }));
        assert_eq!(layout.slot(3), Slot::Value(b'd'));
        assert_eq!(layout.slot(4), Slot::Unset);
    }

    #[test]
    fn test_place_reserved_requires_permission() {
        let mut layout = layout();
        let at = layout.reserve_first_free(4).unwrap();
        assert!(layout.place(b"1234", at, false).is_err());
        layout.place(b"1234", at, true).unwrap();
        assert!(layout.holds(b"1234", at));
    }

    #[test]
    fn test_place_partially_reserved_rejected() {
        let mut layout = layout();
        let at = layout.reserve_first_free(2).unwrap();
        assert!(layout.place(b"123", at, true).is_err());
    }

    #[test]
    fn test_append_seeds_header() {
        let mut layout = layout();
        layout.append(b"MZ");
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.slot(1), Slot::Seed(b'Z'));
        assert_eq!(layout.materialize().unwrap(), b"MZ".to_vec());
    }

    #[test]
    fn test_seed_bytes_only_yield_to_claims() {
        let mut layout = layout();
        layout.append(&[0xaa; 8]);

        // decoy-style and anywhere placements never touch the header
        assert!(layout.place(b"xy", 2, false).is_err());
        assert_eq!(layout.reserve_first_free(2).unwrap(), 8);

        layout.claim(b"xy", 2).unwrap();
        assert_eq!(layout.slot(2), Slot::Value(b'x'));
        assert_eq!(layout.slot(4), Slot::Seed(0xaa));

        // a claimed byte is committed: the same byte again is fine, another is not
        layout.claim(b"y", 3).unwrap();
        let err = layout.claim(b"zz", 2).unwrap_err();
        assert!(matches!(err, SynthError::PlacementConflict { start: 2, end: 4 }));
        assert_eq!(layout.slot(2), Slot::Value(b'x'));
    }

    #[test]
    fn test_claim_spanning_header_end() {
        let mut layout = layout();
        layout.append(b"MZ");
        layout.claim(b"abcd", 1).unwrap();
        assert_eq!(layout.materialize().unwrap(), b"Mabcd".to_vec());
    }

    #[test]
    fn test_claim_rejects_reserved() {
        let mut layout = layout();
        let at = layout.reserve_first_free(4).unwrap();
        assert!(layout.claim(b"1234", at).is_err());
        assert!(layout.is_reserved(at..at + 4));
    }

    #[test]
    fn test_holds_sees_seed_bytes() {
        let mut layout = layout();
        layout.append(b"MZ\x90");
        assert!(layout.holds(b"Z\x90", 1));
        assert!(!layout.holds(b"Z\x90\x00", 1));
    }

    #[test]
    fn test_offsets_past_limit_are_rejected() {
        let mut layout = layout().with_max_len(1024);
        assert!(matches!(
            layout.place(b"x", 1024, false),
            Err(SynthError::OutputTooLarge { size: 1025, limit: 1024 })
        ));
        assert!(layout.is_vacant(0..2048).is_err());
        assert!(layout.claim(b"x", usize::MAX).is_err());
        assert!(layout.is_empty());

        layout.place(&[0; 1024], 0, false).unwrap();
        assert!(matches!(layout.reserve_first_free(4), Err(SynthError::OutputTooLarge { .. })));
        assert_eq!(layout.len(), 1024);
    }

    #[test]
    fn test_default_limit_rejects_huge_offsets() {
        let mut layout = layout();
        assert_eq!(layout.max_len(), DEFAULT_MAX_OUTPUT_LEN);
        let err = layout.place(b"x", i64::MAX as usize, false).unwrap_err();
        assert!(matches!(err, SynthError::OutputTooLarge { .. }));
        assert!(layout.place(b"x", usize::MAX, false).is_err());
        assert!(layout.is_empty());
    }

    #[test]
    fn test_reserve_first_fit() {
        let mut layout = layout();
        layout.place(b"ab", 0, false).unwrap();
        layout.place(b"cd", 5, false).unwrap();
        // gap 2..5 holds three bytes
        assert_eq!(layout.reserve_first_free(3).unwrap(), 2);
        // nothing left before the end
        assert_eq!(layout.reserve_first_free(1).unwrap(), 7);
    }

    #[test]
    fn test_reserve_skips_small_gap() {
        let mut layout = layout();
        layout.place(b"a", 0, false).unwrap();
        layout.place(b"b", 3, false).unwrap();
        assert_eq!(layout.reserve_first_free(4).unwrap(), 4);
        assert_eq!(layout.len(), 8);
    }

    #[test]
    fn test_reserve_extends_trailing_run() {
        let mut layout = layout();
        layout.place(b"ab", 0, false).unwrap();
        assert!(layout.is_vacant(2..4).unwrap());
        assert_eq!(layout.reserve_first_free(4).unwrap(), 2);
        assert_eq!(layout.len(), 6);
        assert!(layout.is_reserved(2..6));
    }

    #[test]
    fn test_consecutive_reservations_are_disjoint() {
        let mut layout = layout();
        let first = layout.reserve_first_free(4).unwrap();
        let second = layout.reserve_first_free(4).unwrap();
        assert!(second >= first + 4);
    }

    #[test]
    fn test_gaps_include_trailing_run() {
        let mut layout = layout();
        layout.place(b"a", 2, false).unwrap();
        assert!(layout.is_vacant(3..6).unwrap());
        assert_eq!(layout.gaps(), vec![0..2, 3..6]);
    }

    #[test]
    fn test_fill_gaps_covers_everything() {
        let mut layout = layout();
        layout.place(b"head", 0, false).unwrap();
        layout.place(b"tail", 40, false).unwrap();
        assert!(layout.materialize().is_err());

        let filled = layout.fill_gaps().unwrap();
        assert_eq!(filled, 36);
        let bytes = layout.materialize().unwrap();
        assert_eq!(bytes.len(), 44);
        assert_eq!(&bytes[..4], b"head");
        assert_eq!(&bytes[40..], b"tail");
    }

    #[test]
    fn test_fill_gaps_overwrites_leftover_reservation() {
        let mut layout = layout();
        layout.place(b"x", 0, false).unwrap();
        layout.reserve_first_free(4).unwrap();
        layout.fill_gaps().unwrap();
        assert!(layout.reserved_spans().is_empty());
        assert_eq!(layout.materialize().unwrap().len(), 5);
    }

    #[test]
    fn test_materialize_reports_first_unset() {
        let mut layout = layout();
        layout.place(b"ab", 0, false).unwrap();
        layout.place(b"c", 4, false).unwrap();
        let err = layout.materialize().unwrap_err();
        assert!(matches!(err, SynthError::IncompleteLayout { offset: 2 }));
    }
}
