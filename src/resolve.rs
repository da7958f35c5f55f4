//! Placement of rule strings according to extracted constraints.
//!
//! Constraints are applied in passes, most rigid first: indirect-read bytes
//! (their offsets are dictated and they satisfy pending reservations), then
//! fixed offsets, then ranges, then everything that only has to exist.
//! Within a pass, constraints are taken in traversal order.

use crate::ast::{Expr, Keyword};
use crate::constraints::{Bound, Constraint, ConstraintKind};
use crate::error::{Result, SynthError};
use crate::layout::ByteLayout;
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Where a piece of content ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    /// String identifier; `None` for indirect-read bytes
    pub variable: Option<String>,
    pub start: usize,
    pub len: usize,
}

/// Drives [`ByteLayout`] placements from a constraint list.
pub struct PlacementResolver<'a> {
    layout: &'a mut ByteLayout,
    strings: &'a BTreeMap<String, Vec<u8>>,
    placed: FxHashSet<String>,
    placements: Vec<Placement>,
}

impl<'a> PlacementResolver<'a> {
    pub fn new(layout: &'a mut ByteLayout, strings: &'a BTreeMap<String, Vec<u8>>) -> Self {
        Self { layout, strings, placed: FxHashSet::default(), placements: Vec::new() }
    }

    /// Place everything the constraints ask for, then every string the
    /// condition never located.
    pub fn resolve(mut self, constraints: &[Constraint]) -> Result<Vec<Placement>> {
        for constraint in constraints {
            if let ConstraintKind::IndirectRead { bytes } = &constraint.kind {
                self.place_indirect(bytes, constraint)?;
            }
        }

        for constraint in constraints {
            if constraint.kind == ConstraintKind::FixedOffset {
                self.place_fixed(constraint)?;
            }
        }

        for constraint in constraints {
            if constraint.kind == ConstraintKind::RangeOffset {
                self.place_in_range(constraint)?;
            }
        }

        for constraint in constraints {
            match &constraint.kind {
                ConstraintKind::PresentAnywhere
                | ConstraintKind::FixedOffset
                | ConstraintKind::RangeOffset => {
                    if let Some(id) = &constraint.variable {
                        self.place_anywhere(id)?;
                    }
                }
                ConstraintKind::SetMembership => {
                    for id in self.set_members(&constraint.high) {
                        self.place_anywhere(&id)?;
                    }
                }
                ConstraintKind::IndirectRead { .. } => {}
            }
        }

        let strings = self.strings;
        for id in strings.keys() {
            self.place_anywhere(id)?;
        }

        debug!("resolved {} placements", self.placements.len());
        Ok(self.placements)
    }

    fn lookup(&self, id: &str) -> Result<&'a [u8]> {
        let strings: &'a BTreeMap<String, Vec<u8>> = self.strings;
        strings.get(id).map(Vec::as_slice).ok_or_else(|| SynthError::unknown_string(id))
    }

    fn commit(&mut self, variable: Option<&str>, start: usize, len: usize) {
        if let Some(id) = variable {
            self.placed.insert(id.to_string());
        }
        self.placements.push(Placement { variable: variable.map(str::to_string), start, len });
    }

    fn place_indirect(&mut self, bytes: &[u8], constraint: &Constraint) -> Result<()> {
        let Some(start) = constraint.low.as_offset().and_then(|o| usize::try_from(o).ok()) else {
            return Err(SynthError::malformed_intrinsic("indirect read", format!("bad offset {}", constraint.low)));
        };
        // pointer targets were reserved by the walker; everything else is dictated by the rule
        if self.layout.is_reserved(start..start.saturating_add(bytes.len())) {
            self.layout.place(bytes, start, true)?;
        } else {
            self.layout.claim(bytes, start)?;
        }
        self.commit(None, start, bytes.len());
        Ok(())
    }

    fn place_fixed(&mut self, constraint: &Constraint) -> Result<()> {
        let Some(id) = constraint.variable.as_deref() else {
            return Ok(());
        };
        let bytes = self.lookup(id)?;

        match constraint.low.as_offset().and_then(|o| usize::try_from(o).ok()) {
            Some(start) => {
                self.layout.claim(bytes, start)?;
                self.commit(Some(id), start, bytes.len());
            }
            None => debug!("{} at `{}`: offset not a literal, placing anywhere", id, constraint.low),
        }
        Ok(())
    }

    fn place_in_range(&mut self, constraint: &Constraint) -> Result<()> {
        let Some(id) = constraint.variable.as_deref() else {
            return Ok(());
        };
        let bytes = self.lookup(id)?;

        let (low, high) = match (constraint.low.as_offset(), constraint.high.as_offset()) {
            (Some(low), Some(high)) if 0 <= low && low <= high => (low as usize, high as usize),
            _ => {
                debug!("{} in ({}..{}): range not resolvable, placing anywhere", id, constraint.low, constraint.high);
                return Ok(());
            }
        };

        // prefer a free spot; only fall back to overriding header bytes
        for start in low..=high {
            if self.layout.holds(bytes, start) || self.layout.is_vacant(start..start + bytes.len())? {
                self.layout.claim(bytes, start)?;
                self.commit(Some(id), start, bytes.len());
                return Ok(());
            }
        }
        for start in low..=high {
            if self.layout.is_claimable(start, bytes.len())? {
                self.layout.claim(bytes, start)?;
                self.commit(Some(id), start, bytes.len());
                return Ok(());
            }
        }
        Err(SynthError::placement_conflict(low, high.saturating_add(bytes.len())))
    }

    fn place_anywhere(&mut self, id: &str) -> Result<()> {
        if self.placed.contains(id) {
            return Ok(());
        }
        let bytes = self.lookup(id)?;
        let start = self.layout.reserve_first_free(bytes.len())?;
        self.layout.place(bytes, start, true)?;
        self.commit(Some(id), start, bytes.len());
        Ok(())
    }

    /// String identifiers an `of` iterable names.
    fn set_members(&self, iterable: &Bound) -> Vec<String> {
        let Bound::Expr(expr) = iterable else {
            return Vec::new();
        };

        match expr {
            Expr::Keyword { keyword: Keyword::Them } => self.strings.keys().cloned().collect(),
            Expr::Set { elements } => elements
                .iter()
                .flat_map(|element| match element {
                    Expr::String { id } => vec![id.clone()],
                    Expr::StringWildcard { pattern } => {
                        let prefix = pattern.trim_end_matches('*');
                        self.strings.keys().filter(|id| id.starts_with(prefix)).cloned().collect()
                    }
                    _ => Vec::new(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::extract_constraints;
    use crate::donor::Donor;
    use crate::layout::{DecoyGenerator, Slot};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layout() -> ByteLayout {
        ByteLayout::new(DecoyGenerator::new(Donor::builtin(64), StdRng::seed_from_u64(3), 10))
    }

    fn strings(pairs: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        pairs.iter().map(|(id, bytes)| (id.to_string(), bytes.to_vec())).collect()
    }

    fn run(condition: &Expr, strings: &BTreeMap<String, Vec<u8>>) -> (ByteLayout, Result<Vec<Placement>>) {
        run_with_header(condition, strings, &[])
    }

    fn run_with_header(
        condition: &Expr,
        strings: &BTreeMap<String, Vec<u8>>,
        header: &[u8],
    ) -> (ByteLayout, Result<Vec<Placement>>) {
        let mut layout = layout();
        layout.append(header);
        let constraints = extract_constraints(condition, &mut layout).unwrap();
        let result = PlacementResolver::new(&mut layout, strings).resolve(&constraints);
        (layout, result)
    }

    #[test]
    fn test_fixed_offset_placement() {
        let strings = strings(&[("$a", b"evil")]);
        let (layout, result) = run(&Expr::at("$a", Expr::int(16)), &strings);
        let placements = result.unwrap();
        assert_eq!(placements, vec![Placement { variable: Some("$a".into()), start: 16, len: 4 }]);
        assert!(layout.holds(b"evil", 16));
        assert_eq!(layout.slot(0), Slot::Unset);
    }

    #[test]
    fn test_anywhere_uses_first_free_gap() {
        let strings = strings(&[("$a", b"ab"), ("$b", b"xyz")]);
        let condition = Expr::and(Expr::at("$a", Expr::int(3)), Expr::string("$b"));
        let (layout, result) = run(&condition, &strings);
        result.unwrap();
        // 0..3 is free and just big enough
        assert!(layout.holds(b"xyz", 0));
        assert!(layout.holds(b"ab", 3));
    }

    #[test]
    fn test_fixed_string_not_duplicated_by_presence() {
        let strings = strings(&[("$a", b"abc")]);
        let condition = Expr::and(Expr::string("$a"), Expr::at("$a", Expr::int(10)));
        let (layout, result) = run(&condition, &strings);
        let placements = result.unwrap();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].start, 10);
        assert_eq!(layout.len(), 13);
    }

    #[test]
    fn test_range_placement_skips_occupied() {
        let strings = strings(&[("$a", b"AAAA"), ("$b", b"BB")]);
        let condition = Expr::and(
            Expr::at("$a", Expr::int(10)),
            Expr::in_range("$b", Expr::int(9), Expr::int(20)),
        );
        let (layout, result) = run(&condition, &strings);
        result.unwrap();
        assert!(layout.holds(b"BB", 14));
    }

    #[test]
    fn test_range_without_room_conflicts() {
        let strings = strings(&[("$a", b"AAAA"), ("$b", b"BB")]);
        let condition = Expr::and(
            Expr::at("$a", Expr::int(10)),
            Expr::in_range("$b", Expr::int(10), Expr::int(12)),
        );
        let (_, result) = run(&condition, &strings);
        assert!(matches!(result, Err(SynthError::PlacementConflict { .. })));
    }

    #[test]
    fn test_unresolved_offset_falls_back() {
        let strings = strings(&[("$a", b"abc")]);
        let at = Expr::binary(crate::ast::BinaryOp::Plus, Expr::keyword(Keyword::Entrypoint), Expr::int(4));
        let (layout, result) = run(&Expr::at("$a", at), &strings);
        let placements = result.unwrap();
        assert_eq!(placements[0].start, 0);
        assert!(layout.holds(b"abc", 0));
    }

    #[test]
    fn test_indirect_chain_fills_reservation() {
        let call = Expr::int_fn("uint32", Expr::int_fn("uint32", Expr::int(8)));
        let (layout, result) = run(&Expr::eq(call, Expr::int(0x11223344)), &BTreeMap::new());
        result.unwrap();
        assert!(layout.reserved_spans().is_empty());
        assert!(layout.holds(&[0x44, 0x33, 0x22, 0x11], 0));
        assert!(layout.holds(&[0, 0, 0, 0], 8));
    }

    #[test]
    fn test_set_members_and_unreferenced_strings_are_placed() {
        let strings = strings(&[("$a1", b"one"), ("$a2", b"two"), ("$z", b"zzz")]);
        let set = Expr::set(vec![Expr::StringWildcard { pattern: "$a*".into() }]);
        let (layout, result) = run(&Expr::of(Expr::keyword(Keyword::All), set), &strings);
        let placements = result.unwrap();
        assert_eq!(placements.len(), 3);
        let bytes = layout.materialize().unwrap();
        assert_eq!(bytes, b"onetwozzz".to_vec());
    }

    #[test]
    fn test_unknown_string() {
        let (_, result) = run(&Expr::at("$missing", Expr::int(0)), &BTreeMap::new());
        assert!(matches!(result, Err(SynthError::UnknownString { .. })));
    }

    #[test]
    fn test_conflicting_fixed_offsets() {
        let strings = strings(&[("$a", b"aaaa"), ("$b", b"bbbb")]);
        let condition = Expr::and(Expr::at("$a", Expr::int(0)), Expr::at("$b", Expr::int(2)));
        let (_, result) = run(&condition, &strings);
        assert!(matches!(result, Err(SynthError::PlacementConflict { start: 2, end: 6 })));
    }

    #[test]
    fn test_fixed_offset_overrides_header() {
        let strings = strings(&[("$a", b"evil"), ("$b", b"free")]);
        let condition = Expr::and(Expr::at("$a", Expr::int(4)), Expr::string("$b"));
        let (layout, result) = run_with_header(&condition, &strings, &[0xcc; 16]);
        result.unwrap();
        assert_eq!(layout.slot(4), Slot::Value(b'e'));
        assert_eq!(layout.slot(3), Slot::Seed(0xcc));
        // strings without a location never land in the header
        assert!(layout.holds(b"free", 16));
    }

    #[test]
    fn test_pe_pointer_chain_over_header() {
        let call = Expr::int_fn("uint32", Expr::int_fn("uint32", Expr::int(0x3c)));
        let (layout, result) = run_with_header(&Expr::eq(call, Expr::int(0x4550)), &BTreeMap::new(), &[0; 128]);
        result.unwrap();
        // the pointer slot is reserved past the header, the header's e_lfanew points at it
        assert!(layout.holds(&[0x80, 0, 0, 0], 0x3c));
        assert!(layout.holds(b"PE\0\0", 0x80));
    }

    #[test]
    fn test_range_prefers_free_space_over_header() {
        let strings = strings(&[("$a", b"AB")]);
        let condition = Expr::in_range("$a", Expr::int(2), Expr::int(20));
        let (layout, result) = run_with_header(&condition, &strings, &[0; 10]);
        let placements = result.unwrap();
        assert_eq!(placements[0].start, 10);
        assert!(layout.holds(b"AB", 10));
    }

    #[test]
    fn test_range_inside_header_overrides_it() {
        let strings = strings(&[("$a", b"AB")]);
        let condition = Expr::in_range("$a", Expr::int(2), Expr::int(5));
        let (layout, result) = run_with_header(&condition, &strings, &[0; 10]);
        let placements = result.unwrap();
        assert_eq!(placements[0].start, 2);
        assert_eq!(layout.len(), 10);
    }

    #[test]
    fn test_huge_fixed_offset_is_an_error() {
        let strings = strings(&[("$a", b"x")]);
        let (layout, result) = run(&Expr::at("$a", Expr::int(i64::MAX)), &strings);
        assert!(matches!(result, Err(SynthError::OutputTooLarge { .. })));
        assert!(layout.is_empty());

        let call = Expr::int_fn("uint32", Expr::int(1 << 40));
        let (_, result) = run(&Expr::eq(call, Expr::int(1)), &BTreeMap::new());
        assert!(matches!(result, Err(SynthError::OutputTooLarge { .. })));
    }
}
