//! End-to-end synthesis: rule document in, fixture bytes out.

use crate::config::SynthConfig;
use crate::constraints::{extract_constraints, Constraint};
use crate::donor::Donor;
use crate::error::Result;
use crate::layout::{ByteLayout, DecoyGenerator};
use crate::resolve::{Placement, PlacementResolver};
use crate::rule::RuleDocument;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

/// Output of one synthesis run.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub constraints: Vec<Constraint>,
    pub placements: Vec<Placement>,
    /// Bytes of decoy code written into unconstrained gaps
    pub decoy_bytes: usize,
    pub bytes: Vec<u8>,
}

/// Builds synthetic files for rules, one fresh layout per run.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    config: SynthConfig,
    donor: Donor,
}

impl Synthesizer {
    pub fn new(config: SynthConfig, donor: Donor) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, donor })
    }

    /// Synthesizer over the built-in donor.
    pub fn with_builtin_donor(config: SynthConfig) -> Result<Self> {
        let donor = Donor::builtin(config.header_len);
        Self::new(config, donor)
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// Fresh layout, seeded with the donor header when configured.
    pub fn new_layout(&self) -> ByteLayout {
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let decoys = DecoyGenerator::new(self.donor.clone(), rng, self.config.frame_threshold);
        let mut layout = ByteLayout::new(decoys).with_max_len(self.config.max_output_len);
        if self.config.include_header {
            layout.append(self.donor.header());
            debug!("seeded {} header bytes from donor", self.donor.header().len());
        }
        layout
    }

    /// Constraints of a rule's condition, as seen against a fresh layout.
    pub fn constraints(&self, rule: &RuleDocument) -> Result<Vec<Constraint>> {
        let mut layout = self.new_layout();
        extract_constraints(&rule.condition, &mut layout)
    }

    /// Run the whole pipeline for one rule.
    pub fn synthesize(&self, rule: &RuleDocument) -> Result<Synthesis> {
        let strings = rule.string_bytes()?;
        let mut layout = self.new_layout();

        let constraints = extract_constraints(&rule.condition, &mut layout)?;
        let placements = PlacementResolver::new(&mut layout, &strings).resolve(&constraints)?;
        let decoy_bytes = layout.fill_gaps()?;
        let bytes = layout.materialize()?;

        info!(
            "synthesized {} bytes for {} ({} constraints, {} placements)",
            bytes.len(),
            rule.name.as_deref().unwrap_or("<unnamed>"),
            constraints.len(),
            placements.len()
        );
        Ok(Synthesis { constraints, placements, decoy_bytes, bytes })
    }
}
