//! HammerPos: soak-tests a payment terminal with back-to-back purchases.
//!
//! ```text
//! hammer-pos [PERSISTED] [--config FILE] [--min-gap SECS] [--max-gap SECS] [--seed N]
//! ```

use anyhow::Context;
use hammer_console::{cli, Profile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::parse_for(Profile::Hammer);

    hammer_console::run(Profile::Hammer, args)
        .await
        .context("hammer-pos failed")?;

    Ok(())
}
