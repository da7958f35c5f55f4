//! Constraint extraction from YARA conditions.
//!
//! A [`Constraint`] records one fact the condition states about where a
//! string has to be, or which bytes have to sit at an offset. Constraints are
//! produced in traversal order by [`ConstraintWalker`]; consumers rely on that
//! order.

mod intfunc;
mod walker;

pub use intfunc::{resolve_chain, IntFunctionSpec, IndirectPlacement};
pub use walker::{extract_constraints, ConstraintWalker};

use crate::ast::Expr;
use serde::{Serialize, Serializer};
use std::fmt;

/// What a constraint says about its subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    /// The string occurs somewhere in the file
    PresentAnywhere,
    /// `$a at E`
    FixedOffset,
    /// `$a in (low..high)`
    RangeOffset,
    /// `<quantifier> of <set>`
    SetMembership,
    /// `bytes` must sit at `low..high` so an integer read yields the compared value
    IndirectRead {
        #[serde(serialize_with = "serialize_hex")]
        bytes: Vec<u8>,
    },
}

/// One side of a constraint's location.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    /// Unconstrained (`*`)
    Any,
    Offset(i64),
    /// Source text of an offset expression, as written in the rule
    Text(String),
    /// Sub-expression the walker could not reduce to a number
    Expr(Expr),
}

/// One extracted location or value constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    pub variable: Option<String>,
    pub kind: ConstraintKind,
    pub low: Bound,
    pub high: Bound,
}

impl Constraint {
    pub fn new(variable: Option<String>, kind: ConstraintKind, low: Bound, high: Bound) -> Self {
        Self { variable, kind, low, high }
    }
}

impl Bound {
    /// Numeric value of the bound, reading integer literal text when needed.
    pub fn as_offset(&self) -> Option<i64> {
        match self {
            Bound::Offset(offset) => Some(*offset),
            Bound::Text(text) => parse_int_text(text),
            Bound::Expr(expr) => expr.as_int_literal(),
            Bound::Any => None,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Any => f.write_str("*"),
            Bound::Offset(offset) => write!(f, "{offset}"),
            Bound::Text(text) => f.write_str(text),
            Bound::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

impl Serialize for Bound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Bound::Offset(offset) => serializer.serialize_i64(*offset),
            other => serializer.collect_str(other),
        }
    }
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// Parse a YARA integer literal: decimal, `0x` hex, `0o` octal, with an
/// optional `KB`/`MB` multiplier.
pub fn parse_int_text(text: &str) -> Option<i64> {
    let text = text.trim();
    let (digits, multiplier) = if let Some(rest) = text.strip_suffix("KB") {
        (rest, 1024)
    } else if let Some(rest) = text.strip_suffix("MB") {
        (rest, 1024 * 1024)
    } else {
        (text, 1)
    };

    let (negative, digits) = match digits.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, digits),
    };

    let value = if let Some(hex) = digits.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = digits.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };

    let value = value.checked_mul(multiplier)?;
    Some(if negative { -value } else { value })
}
