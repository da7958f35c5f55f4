//! Depth-first constraint extraction.

use super::intfunc::resolve_chain;
use super::{Bound, Constraint, ConstraintKind};
use crate::ast::{BinaryOp, Expr};
use crate::error::Result;
use crate::layout::ByteLayout;
use tracing::{debug, trace};

/// Walks a condition tree and collects constraints in traversal order.
///
/// The layout is only touched to reserve room for values produced by
/// chained integer reads.
pub struct ConstraintWalker<'a> {
    layout: &'a mut ByteLayout,
    constraints: Vec<Constraint>,
}

/// Extract every constraint of `condition`, in traversal order.
pub fn extract_constraints(condition: &Expr, layout: &mut ByteLayout) -> Result<Vec<Constraint>> {
    let mut walker = ConstraintWalker::new(layout);
    walker.walk(condition)?;
    let constraints = walker.into_constraints();
    debug!("extracted {} constraints", constraints.len());
    Ok(constraints)
}

impl<'a> ConstraintWalker<'a> {
    pub fn new(layout: &'a mut ByteLayout) -> Self {
        Self { layout, constraints: Vec::new() }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn into_constraints(self) -> Vec<Constraint> {
        self.constraints
    }

    fn record(&mut self, variable: Option<&str>, kind: ConstraintKind, low: Bound, high: Bound) {
        let constraint = Constraint::new(variable.map(str::to_string), kind, low, high);
        trace!("constraint: {:?}", constraint);
        self.constraints.push(constraint);
    }

    /// Visit `expr` and everything below it.
    pub fn walk(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::String { id } => {
                self.record(Some(id.as_str()), ConstraintKind::PresentAnywhere, Bound::Any, Bound::Any);
            }

            Expr::StringAt { id, at } => {
                let text = at.to_string();
                self.record(Some(id.as_str()), ConstraintKind::FixedOffset, Bound::Text(text.clone()), Bound::Text(text));
                self.walk(at)?;
            }

            Expr::StringInRange { id, range } => {
                let (low, high) = match range.as_ref() {
                    Expr::Range { low, high } => (range_bound(low), range_bound(high)),
                    other => (Bound::Expr(other.clone()), Bound::Expr(other.clone())),
                };
                self.record(Some(id.as_str()), ConstraintKind::RangeOffset, low, high);
                self.walk(range)?;
            }

            Expr::StringOffset { index, .. } | Expr::StringLength { index, .. } => {
                if let Some(index) = index {
                    self.walk(index)?;
                }
            }

            Expr::Of { quantifier, iterable } => {
                self.record(
                    None,
                    ConstraintKind::SetMembership,
                    Bound::Expr(quantifier.as_ref().clone()),
                    Bound::Expr(iterable.as_ref().clone()),
                );
                self.walk(quantifier)?;
                self.walk(iterable)?;
            }

            Expr::Binary { op, left, right } => {
                if *op == BinaryOp::Eq {
                    self.indirect_reads(left, right)?;
                }
                self.walk(left)?;
                self.walk(right)?;
            }

            Expr::Unary { operand, .. } => self.walk(operand)?,
            Expr::Parentheses { inner } => self.walk(inner)?,
            Expr::IntFunction { argument, .. } => self.walk(argument)?,
            Expr::StructAccess { structure, .. } => self.walk(structure)?,

            Expr::For { quantifier, iterable, body, .. } => {
                self.walk(quantifier)?;
                self.walk(iterable)?;
                self.walk(body)?;
            }

            Expr::Iterator { elements } | Expr::Set { elements } => {
                for element in elements {
                    self.walk(element)?;
                }
            }

            Expr::Range { low, high } => {
                self.walk(low)?;
                self.walk(high)?;
            }

            Expr::ArrayAccess { array, accessor } => {
                self.walk(array)?;
                self.walk(accessor)?;
            }

            Expr::FunctionCall { function, arguments } => {
                self.walk(function)?;
                for argument in arguments {
                    self.walk(argument)?;
                }
            }

            // Leaves: nothing to record, nothing below
            Expr::StringWildcard { .. }
            | Expr::StringCount { .. }
            | Expr::Id { .. }
            | Expr::BoolLiteral { .. }
            | Expr::StringLiteral { .. }
            | Expr::IntLiteral { .. }
            | Expr::DoubleLiteral { .. }
            | Expr::Keyword { .. }
            | Expr::Regexp { .. } => {}
        }
        Ok(())
    }

    /// `intN(...) == literal` in either operand order.
    fn indirect_reads(&mut self, left: &Expr, right: &Expr) -> Result<()> {
        let (call, value) = match (left.as_int_function(), right.as_int_literal()) {
            (Some(call), Some(value)) => (call, value),
            _ => match (right.as_int_function(), left.as_int_literal()) {
                (Some(call), Some(value)) => (call, value),
                _ => return Ok(()),
            },
        };

        let (function, argument) = call;
        for placement in resolve_chain(function, argument, value, self.layout)? {
            let (start, end) = (placement.start as i64, placement.end() as i64);
            self.record(
                None,
                ConstraintKind::IndirectRead { bytes: placement.bytes },
                Bound::Offset(start),
                Bound::Offset(end),
            );
        }
        Ok(())
    }
}

/// `@a[N]` becomes N, an integer literal its value, anything else stays raw.
fn range_bound(expr: &Expr) -> Bound {
    match expr {
        Expr::StringOffset { index: Some(index), .. } => match index.as_int_literal() {
            Some(value) => Bound::Offset(value),
            None => Bound::Expr(expr.clone()),
        },
        Expr::IntLiteral { value, .. } => Bound::Offset(*value),
        other => Bound::Expr(other.clone()),
    }
}
