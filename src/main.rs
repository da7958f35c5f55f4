use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use yarasynth::cli::{self, Command, LayoutOptions};
use yarasynth::{Donor, RuleDocument, Synthesizer};

fn main() -> Result<()> {
    let args = cli::Args::parse();

    // RUST_LOG wins; otherwise --verbose picks debug
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("yarasynth=debug")
    } else {
        EnvFilter::new("yarasynth=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    debug!("Logging initialized (verbose={})", args.verbose);

    match args.command {
        Command::Generate { rule, output, seed, layout } => {
            let mut config = layout.config();
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }

            let document = load_rule(&rule)?;
            let synthesizer = Synthesizer::new(config, load_donor(&layout)?)?;
            let synthesis = synthesizer
                .synthesize(&document)
                .with_context(|| format!("Failed to synthesize a file for {}", rule.display()))?;

            let output = output.unwrap_or_else(|| Command::default_output(&rule));
            fs::write(&output, &synthesis.bytes)
                .with_context(|| format!("Failed to write output: {}", output.display()))?;

            eprintln!(
                "Wrote {} bytes to {} ({} placements, {} decoy bytes)",
                synthesis.bytes.len(),
                output.display(),
                synthesis.placements.len(),
                synthesis.decoy_bytes
            );
        }
        Command::Constraints { rule, layout } => {
            let document = load_rule(&rule)?;
            let synthesizer = Synthesizer::new(layout.config(), load_donor(&layout)?)?;
            let constraints = synthesizer
                .constraints(&document)
                .with_context(|| format!("Failed to extract constraints from {}", rule.display()))?;
            println!("{}", serde_json::to_string_pretty(&constraints)?);
        }
    }

    Ok(())
}

fn load_rule(path: &Path) -> Result<RuleDocument> {
    RuleDocument::load(path).with_context(|| format!("Failed to load rule: {}", path.display()))
}

fn load_donor(layout: &LayoutOptions) -> Result<Donor> {
    match &layout.donor {
        Some(path) => Donor::from_file(path, layout.header_len)
            .with_context(|| format!("Failed to load donor: {}", path.display())),
        None => Ok(Donor::builtin(layout.header_len)),
    }
}
