//! Command-line arguments shared by both consoles.

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};
use hammer_harness::HarnessConfig;

use crate::console::Profile;

#[derive(Parser, Debug, Default)]
#[command(version)]
pub struct Args {
    /// Session from a previous run, as printed on exit:
    /// posId:eftposAddress:encKey:hmacKey
    pub persisted: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// POS id to start with
    #[arg(long)]
    pub pos_id: Option<String>,

    /// Terminal address to start with
    #[arg(long)]
    pub eftpos_address: Option<String>,

    /// Minimum pause between purchases, in seconds
    #[arg(long, value_name = "SECS")]
    pub min_gap: Option<u64>,

    /// Maximum pause between purchases, in seconds
    #[arg(long, value_name = "SECS")]
    pub max_gap: Option<u64>,

    /// Seed for gap sampling and the simulated terminal
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Args {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(pos_id) = &self.pos_id {
            config.terminal.pos_id = pos_id.clone();
        }
        if let Some(address) = &self.eftpos_address {
            config.terminal.eftpos_address = address.clone();
        }
        if let Some(secs) = self.min_gap {
            config.hammer.min_gap_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = self.max_gap {
            config.hammer.max_gap_ms = secs.saturating_mul(1000);
        }
        if let Some(seed) = self.seed {
            config.hammer.seed = Some(seed);
            config.simulator.seed = Some(seed);
        }
    }
}

/// Parses the process arguments under the console's own name.
pub fn parse_for(profile: Profile) -> Args {
    let matches = Args::command()
        .name(profile.bin_name())
        .about(profile.about())
        .get_matches();
    Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}
