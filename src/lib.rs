//! yarasynth - synthetic fixture generation from YARA rule conditions.
//!
//! A rule's parsed condition is walked for every constraint it places on
//! string locations and on integers read from the file. The strings and
//! computed bytes are then laid out in a sparse buffer, and whatever is left
//! over is filled with code-shaped decoy bytes sampled from a donor file.
//!
//! # Example
//!
//! ```no_run
//! use yarasynth::{RuleDocument, SynthConfig, Synthesizer};
//!
//! let rule = RuleDocument::load(std::path::Path::new("rule.json")).unwrap();
//! let synthesizer = Synthesizer::with_builtin_donor(SynthConfig::new().with_seed(7)).unwrap();
//! let synthesis = synthesizer.synthesize(&rule).unwrap();
//!
//! for constraint in &synthesis.constraints {
//!     println!("{:?} {:?}: {}..{}", constraint.variable, constraint.kind, constraint.low, constraint.high);
//! }
//! std::fs::write("fixture.bin", &synthesis.bytes).unwrap();
//! ```

pub mod ast;
pub mod cli;
pub mod config;
pub mod constraints;
pub mod donor;
pub mod error;
pub mod file_io;
pub mod layout;
pub mod resolve;
pub mod rule;
pub mod synth;

// Re-export commonly used types at crate root
pub use ast::Expr;
pub use config::SynthConfig;
pub use constraints::{extract_constraints, Bound, Constraint, ConstraintKind};
pub use donor::Donor;
pub use error::{Result, SynthError};
pub use layout::{ByteLayout, Slot};
pub use resolve::{Placement, PlacementResolver};
pub use rule::RuleDocument;
pub use synth::{Synthesis, Synthesizer};

use std::path::Path;

/// Synthesize a fixture for the rule document at `rule_path`.
///
/// Uses the donor at `donor_path`, or the built-in donor when `None`.
pub fn synthesize_file<P: AsRef<Path>>(
    rule_path: P,
    donor_path: Option<&Path>,
    config: SynthConfig,
) -> Result<Synthesis> {
    let rule = RuleDocument::load(rule_path.as_ref())?;
    let donor = match donor_path {
        Some(path) => Donor::from_file(path, config.header_len)?,
        None => Donor::builtin(config.header_len),
    };
    Synthesizer::new(config, donor)?.synthesize(&rule)
}
