//! YARA condition expression tree.
//!
//! The tree is produced by an external parser and handed over as JSON (one
//! object per node, tagged by `"kind"`). Nothing in this crate mutates it.
//! `Display` renders the node back to YARA surface syntax.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One node of a parsed YARA condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// `$a`
    String { id: String },
    /// `$a*`
    StringWildcard { pattern: String },
    /// `$a at <expr>`
    StringAt { id: String, at: Box<Expr> },
    /// `$a in (<low>..<high>)`; `range` is normally a [`Expr::Range`]
    StringInRange { id: String, range: Box<Expr> },
    /// `#a`
    StringCount { id: String },
    /// `@a` or `@a[<index>]`
    StringOffset {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<Box<Expr>>,
    },
    /// `!a` or `!a[<index>]`
    StringLength {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<Box<Expr>>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    /// `for <quantifier> <vars> in <iterable> : (<body>)`, or the `of` form for string sets
    For {
        #[serde(rename = "for")]
        loop_kind: ForKind,
        quantifier: Box<Expr>,
        #[serde(default)]
        variables: Vec<String>,
        iterable: Box<Expr>,
        body: Box<Expr>,
    },
    /// `<quantifier> of <iterable>`
    Of { quantifier: Box<Expr>, iterable: Box<Expr> },
    /// Literal array iterated by a `for` loop: `(1, 2, 3)`
    Iterator { elements: Vec<Expr> },
    /// String set: `($a, $b*)`
    Set { elements: Vec<Expr> },
    /// `(<low>..<high>)`
    Range { low: Box<Expr>, high: Box<Expr> },
    /// Bare identifier, e.g. a module name or loop variable
    Id { name: String },
    /// `<structure>.<field>`
    StructAccess { structure: Box<Expr>, field: String },
    /// `<array>[<accessor>]`
    ArrayAccess { array: Box<Expr>, accessor: Box<Expr> },
    /// Module function call: `pe.exports("foo")`
    FunctionCall { function: Box<Expr>, arguments: Vec<Expr> },
    BoolLiteral { value: bool },
    StringLiteral { value: String },
    /// `text` is the literal as written (`0x3c`, `2KB`), when the parser kept it
    IntLiteral {
        value: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    DoubleLiteral { value: f64 },
    /// `filesize`, `entrypoint`, `all`, `any`, `none`, `them`
    Keyword { keyword: Keyword },
    Parentheses { inner: Box<Expr> },
    /// Indirect integer read: `uint32(<argument>)`, `int16be(<argument>)`, ...
    IntFunction { function: String, argument: Box<Expr> },
    Regexp {
        pattern: String,
        #[serde(default)]
        modifiers: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Minus,
    BitwiseNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Neq,
    Contains,
    Matches,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    BitwiseXor,
    BitwiseAnd,
    BitwiseOr,
    ShiftLeft,
    ShiftRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForKind {
    Dict,
    Array,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyword {
    Filesize,
    Entrypoint,
    All,
    Any,
    None,
    Them,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "not ",
            UnaryOp::Minus => "-",
            UnaryOp::BitwiseNot => "~",
        }
    }
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Contains => "contains",
            BinaryOp::Matches => "matches",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "\\",
            BinaryOp::Modulo => "%",
            BinaryOp::BitwiseXor => "^",
            BinaryOp::BitwiseAnd => "&",
            BinaryOp::BitwiseOr => "|",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
        }
    }
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Filesize => "filesize",
            Keyword::Entrypoint => "entrypoint",
            Keyword::All => "all",
            Keyword::Any => "any",
            Keyword::None => "none",
            Keyword::Them => "them",
        }
    }
}

// Shorthand constructors, mostly for building trees in tests and tools.
impl Expr {
    pub fn string(id: &str) -> Self {
        Expr::String { id: id.to_string() }
    }

    pub fn int(value: i64) -> Self {
        Expr::IntLiteral { value, text: None }
    }

    /// Integer literal that remembers its source spelling.
    pub fn int_text(value: i64, text: &str) -> Self {
        Expr::IntLiteral { value, text: Some(text.to_string()) }
    }

    pub fn keyword(keyword: Keyword) -> Self {
        Expr::Keyword { keyword }
    }

    pub fn id(name: &str) -> Self {
        Expr::Id { name: name.to_string() }
    }

    pub fn int_fn(function: &str, argument: Expr) -> Self {
        Expr::IntFunction { function: function.to_string(), argument: Box::new(argument) }
    }

    pub fn at(id: &str, at: Expr) -> Self {
        Expr::StringAt { id: id.to_string(), at: Box::new(at) }
    }

    pub fn in_range(id: &str, low: Expr, high: Expr) -> Self {
        Expr::StringInRange { id: id.to_string(), range: Box::new(Expr::range(low, high)) }
    }

    pub fn range(low: Expr, high: Expr) -> Self {
        Expr::Range { low: Box::new(low), high: Box::new(high) }
    }

    pub fn offset(id: &str, index: Option<Expr>) -> Self {
        Expr::StringOffset { id: id.to_string(), index: index.map(Box::new) }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary { op, operand: Box::new(operand) }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::And, left, right)
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, left, right)
    }

    pub fn of(quantifier: Expr, iterable: Expr) -> Self {
        Expr::Of { quantifier: Box::new(quantifier), iterable: Box::new(iterable) }
    }

    pub fn set(elements: Vec<Expr>) -> Self {
        Expr::Set { elements }
    }

    /// Value of an integer literal node.
    pub fn as_int_literal(&self) -> Option<i64> {
        match self {
            Expr::IntLiteral { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Function name and argument of an indirect read node.
    pub fn as_int_function(&self) -> Option<(&str, &Expr)> {
        match self {
            Expr::IntFunction { function, argument } => Some((function.as_str(), argument.as_ref())),
            _ => None,
        }
    }
}

/// Replace the `$` of a string identifier with another sigil (`#`, `@`, `!`).
fn with_sigil(sigil: char, id: &str) -> String {
    let name = id.strip_prefix('$').unwrap_or(id);
    format!("{sigil}{name}")
}

fn write_list(f: &mut fmt::Formatter<'_>, elements: &[Expr]) -> fmt::Result {
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{element}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::String { id } => f.write_str(id),
            Expr::StringWildcard { pattern } => f.write_str(pattern),
            Expr::StringAt { id, at } => write!(f, "{id} at {at}"),
            Expr::StringInRange { id, range } => write!(f, "{id} in {range}"),
            Expr::StringCount { id } => f.write_str(&with_sigil('#', id)),
            Expr::StringOffset { id, index } => match index {
                Some(index) => write!(f, "{}[{index}]", with_sigil('@', id)),
                None => f.write_str(&with_sigil('@', id)),
            },
            Expr::StringLength { id, index } => match index {
                Some(index) => write!(f, "{}[{index}]", with_sigil('!', id)),
                None => f.write_str(&with_sigil('!', id)),
            },
            Expr::Unary { op, operand } => write!(f, "{}{operand}", op.symbol()),
            Expr::Binary { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::For { quantifier, variables, iterable, body, .. } => {
                if variables.is_empty() {
                    write!(f, "for {quantifier} of {iterable} : ({body})")
                } else {
                    write!(f, "for {quantifier} {} in {iterable} : ({body})", variables.join(", "))
                }
            }
            Expr::Of { quantifier, iterable } => write!(f, "{quantifier} of {iterable}"),
            Expr::Iterator { elements } | Expr::Set { elements } => {
                f.write_str("(")?;
                write_list(f, elements)?;
                f.write_str(")")
            }
            Expr::Range { low, high } => write!(f, "({low}..{high})"),
            Expr::Id { name } => f.write_str(name),
            Expr::StructAccess { structure, field } => write!(f, "{structure}.{field}"),
            Expr::ArrayAccess { array, accessor } => write!(f, "{array}[{accessor}]"),
            Expr::FunctionCall { function, arguments } => {
                write!(f, "{function}(")?;
                write_list(f, arguments)?;
                f.write_str(")")
            }
            Expr::BoolLiteral { value } => write!(f, "{value}"),
            Expr::StringLiteral { value } => write!(f, "{value:?}"),
            Expr::IntLiteral { text: Some(text), .. } => f.write_str(text),
            Expr::IntLiteral { value, text: None } => write!(f, "{value}"),
            Expr::DoubleLiteral { value } => write!(f, "{value}"),
            Expr::Keyword { keyword } => f.write_str(keyword.as_str()),
            Expr::Parentheses { inner } => write!(f, "({inner})"),
            Expr::IntFunction { function, argument } => write!(f, "{function}({argument})"),
            Expr::Regexp { pattern, modifiers } => write!(f, "/{pattern}/{modifiers}"),
        }
    }
}
