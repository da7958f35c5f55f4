use crate::config::{SynthConfig, DEFAULT_HEADER_LEN, DEFAULT_MAX_OUTPUT_LEN};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "yarasynth")]
#[command(about = "Generate synthetic binaries that satisfy the offsets a YARA rule implies")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize a fixture file for a rule
    Generate {
        /// Rule document (JSON: strings + parsed condition)
        rule: PathBuf,

        /// Output file (defaults to the rule name with a .bin extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for decoy sampling, for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        layout: LayoutOptions,
    },

    /// Print the constraints extracted from a rule's condition as JSON
    ///
    /// Reservation offsets match what `generate` would use with the same
    /// layout options.
    Constraints {
        /// Rule document (JSON: strings + parsed condition)
        rule: PathBuf,

        #[command(flatten)]
        layout: LayoutOptions,
    },
}

/// Options that decide where content can go in the output.
#[derive(clap::Args, Debug, Clone)]
pub struct LayoutOptions {
    /// Donor file for the header and decoy code (defaults to a built-in donor)
    #[arg(long)]
    pub donor: Option<PathBuf>,

    /// Do not copy the donor header to the start of the file
    #[arg(long)]
    pub no_header: bool,

    /// Length of the donor header region
    #[arg(long, default_value_t = DEFAULT_HEADER_LEN)]
    pub header_len: usize,

    /// Largest output file to produce, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_LEN)]
    pub max_output_len: usize,
}

impl LayoutOptions {
    /// Synthesis configuration for these options.
    pub fn config(&self) -> SynthConfig {
        SynthConfig::new()
            .with_header(!self.no_header)
            .with_header_len(self.header_len)
            .with_max_output_len(self.max_output_len)
    }
}

impl Command {
    /// Default output path: the rule path with its extension replaced by `.bin`.
    pub fn default_output(rule: &std::path::Path) -> PathBuf {
        rule.with_extension("bin")
    }
}
