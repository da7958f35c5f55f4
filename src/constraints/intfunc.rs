//! Indirect integer reads (`uint32(x)`, `int16be(x)`, ...) and chains of them.
//!
//! For `f_k(f_{k-1}(... f_1(o) ...)) == V` the innermost read happens at the
//! literal offset `o`; every outer read happens at an address produced by the
//! read one level in, which is not known yet and gets reserved in the layout.
//! Each level's read address must then hold the address of the level one
//! further out, and the outermost address holds `V`.

use crate::ast::Expr;
use crate::error::{Result, SynthError};
use crate::layout::ByteLayout;
use tracing::debug;

/// Width, signedness and byte order of an integer read function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntFunctionSpec {
    pub width: usize,
    pub signed: bool,
    pub big_endian: bool,
}

impl IntFunctionSpec {
    /// Parse a function name such as `uint32`, `int8` or `uint16be`.
    pub fn parse(function: &str) -> Result<Self> {
        let (name, big_endian) = match function.strip_suffix("be") {
            Some(name) => (name, true),
            None => (function, false),
        };
        let (name, signed) = match name.strip_prefix('u') {
            Some(name) => (name, false),
            None => (name, true),
        };
        let bits = name
            .strip_prefix("int")
            .ok_or_else(|| SynthError::malformed_intrinsic(function, "not an integer read function"))?;
        let width = match bits {
            "8" => 1,
            "16" => 2,
            "32" => 4,
            "64" => 8,
            _ => return Err(SynthError::malformed_intrinsic(function, format!("unsupported width `{bits}`"))),
        };
        Ok(Self { width, signed, big_endian })
    }

    /// Smallest and largest value the read can return.
    fn bounds(&self) -> (i128, i128) {
        let bits = 8 * self.width as u32;
        if self.signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    /// Bytes that make this read return `value`.
    pub fn encode(&self, value: i128, function: &str) -> Result<Vec<u8>> {
        let (min, max) = self.bounds();
        if value < min || value > max {
            return Err(SynthError::value_out_of_range(value, function));
        }

        let mut bytes = value.to_le_bytes()[..self.width].to_vec();
        if self.big_endian {
            bytes.reverse();
        }
        Ok(bytes)
    }
}

/// Bytes to commit at `start` so a chain of reads evaluates as required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectPlacement {
    pub bytes: Vec<u8>,
    pub start: usize,
}

impl IndirectPlacement {
    pub fn end(&self) -> usize {
        self.start + self.bytes.len()
    }
}

/// One read of the chain and the address it reads from.
struct Level<'e> {
    function: &'e str,
    spec: IntFunctionSpec,
    address: usize,
}

/// Resolve `function(argument) == value` into byte placements.
///
/// Reservations are taken outermost first. Placements come back innermost
/// first, the literal base offset leading.
pub fn resolve_chain(
    function: &str,
    argument: &Expr,
    value: i64,
    layout: &mut ByteLayout,
) -> Result<Vec<IndirectPlacement>> {
    let mut levels: Vec<Level<'_>> = Vec::new();
    let (mut function, mut argument) = (function, argument);

    loop {
        let spec = IntFunctionSpec::parse(function)?;
        match argument {
            Expr::IntLiteral { value: base, .. } => {
                let address = usize::try_from(*base)
                    .map_err(|_| SynthError::malformed_intrinsic(function, format!("negative offset {base}")))?;
                levels.push(Level { function, spec, address });
                break;
            }
            Expr::IntFunction { function: inner, argument: inner_argument } => {
                let address = layout.reserve_first_free(spec.width)?;
                levels.push(Level { function, spec, address });
                function = inner.as_str();
                argument = inner_argument.as_ref();
            }
            other => {
                return Err(SynthError::malformed_intrinsic(
                    function,
                    format!("argument `{other}` does not end in a literal offset"),
                ));
            }
        }
    }

    // levels[0] is the outermost read. Each level yields the address the
    // level one further out reads from; the outermost yields `value`.
    let mut placements = Vec::with_capacity(levels.len());
    for (depth, level) in levels.iter().enumerate().rev() {
        let result = if depth == 0 { i128::from(value) } else { levels[depth - 1].address as i128 };
        let bytes = level.spec.encode(result, level.function)?;
        debug!("{}: {} bytes at {} (value {})", level.function, bytes.len(), level.address, result);
        placements.push(IndirectPlacement { bytes, start: level.address });
    }
    Ok(placements)
}
