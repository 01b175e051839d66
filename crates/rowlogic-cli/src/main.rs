//! rowlogic command-line runner.
//!
//! Loads the sample order domain into an in-memory or sled-backed store and
//! runs one of the demo commands.

mod config;
mod error;
mod output;
mod scenario;

use std::sync::Arc;

use clap::Parser;
use rowlogic_core::demo::{order_engine, populate};
use rowlogic_core::{LogicEngine, MemoryStore, RowStore, SledStore};
use tracing_subscriber::EnvFilter;

use config::{Args, CliConfig, Command, DEFAULT_LOG_FILTER};
use error::CliError;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Args::parse().into_config();

    if let Err(e) = run(config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: CliConfig) -> Result<(), CliError> {
    let store: Arc<dyn RowStore> = match &config.storage {
        Some(storage) => {
            tracing::info!(path = %storage.path.display(), "opening sled store");
            Arc::new(SledStore::open(storage.clone())?)
        }
        None => Arc::new(MemoryStore::new()),
    };
    let engine = order_engine(store, config.engine)?;

    match config.command {
        Command::Demo => run_demo(&engine),
        Command::Graph => {
            println!("{}", output::rules_table(engine.rules()));
            println!("{}", output::graph_table(engine.rules()));
            Ok(())
        }
        Command::Scenario => {
            let steps = scenario::run(&engine)?;
            println!("{}", output::scenario_table(&steps));
            Ok(())
        }
    }
}

/// Populate an empty store, print the derived state, and confirm it is a
/// fixed point.
fn run_demo(engine: &LogicEngine) -> Result<(), CliError> {
    if engine.scan("Customer")?.is_empty() {
        let data = populate(engine)?;
        println!("{}", output::result_table(&data.result));
    } else {
        tracing::info!("store already populated");
    }

    let views: [(&str, &[&str]); 4] = [
        ("Customer", &["name", "balance", "credit_limit"]),
        ("Order", &["customer_id", "amount_total", "date_shipped"]),
        ("Item", &["order_id", "product_id", "quantity", "unit_price", "amount"]),
        ("Product", &["name", "unit_price"]),
    ];
    for (entity, attributes) in views {
        println!("{entity}");
        println!("{}", output::rows_table(&engine.scan(entity)?, attributes));
    }

    let check = engine.rederive()?;
    tracing::info!(
        recomputed = check.recomputed,
        changed = check.changed,
        "re-derivation check"
    );
    if !check.is_fixed_point() {
        return Err(CliError::Scenario {
            step: "rederive".into(),
            reason: format!("{} derived value(s) drifted", check.changed),
        });
    }
    Ok(())
}
