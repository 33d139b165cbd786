//! PizzaPos: charge for pizzas, refund the ones nobody liked, settle.

use anyhow::Context;
use hammer_console::{cli, Profile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::parse_for(Profile::Pizza);

    hammer_console::run(Profile::Pizza, args)
        .await
        .context("pizza-pos failed")?;

    Ok(())
}
