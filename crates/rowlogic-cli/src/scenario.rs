//! Credit-limit walkthrough.
//!
//! A customer with a limit of 1000 gets an open order; three items of a
//! product priced at 20 are added one transaction at a time. The first two
//! commit (balance 40, then 840); the third would raise the balance to 1040
//! and must be rejected without changing anything.

use rowlogic_core::{Error, LogicEngine, RowKey, Value};
use rust_decimal::Decimal;
use tracing::info;

use crate::error::CliError;

/// Outcome of one walkthrough step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Step label.
    pub label: String,
    /// "committed", or the rejection message.
    pub outcome: String,
    /// Whether the step committed.
    pub committed: bool,
    /// Order total after the step.
    pub amount_total: Decimal,
    /// Customer balance after the step.
    pub balance: Decimal,
}

const STEPS: [(i64, bool); 3] = [(2, true), (40, true), (10, false)];

/// Run the walkthrough, failing if any step deviates from the expected outcome.
pub fn run(engine: &LogicEngine) -> Result<Vec<StepReport>, CliError> {
    let (customer, order, product) = setup(engine)?;
    let mut reports = Vec::with_capacity(STEPS.len());

    for (quantity, should_commit) in STEPS {
        let label = format!("add {quantity} x 20");
        let mut tx = engine.begin();
        tx.insert(
            "Item",
            [
                ("order_id", Value::Ref(order.id)),
                ("product_id", Value::Ref(product.id)),
                ("quantity", Value::Int(quantity)),
            ],
        )?;

        let (committed, outcome) = match tx.commit() {
            Ok(_) => (true, "committed".to_string()),
            Err(Error::Propagation(err)) => (false, err.message()),
            Err(err) => return Err(err.into()),
        };
        if committed != should_commit {
            return Err(CliError::Scenario {
                step: label,
                reason: format!("expected committed={should_commit}, got {outcome}"),
            });
        }

        let report = StepReport {
            amount_total: read_decimal(engine, &order, "amount_total")?,
            balance: read_decimal(engine, &customer, "balance")?,
            label,
            outcome,
            committed,
        };
        info!(
            step = %report.label,
            committed,
            balance = %report.balance,
            "scenario step"
        );
        reports.push(report);
    }

    Ok(reports)
}

fn setup(engine: &LogicEngine) -> Result<(RowKey, RowKey, RowKey), CliError> {
    let mut tx = engine.begin();
    let customer = tx.insert(
        "Customer",
        [
            ("name", Value::from("Scenario Customer")),
            ("credit_limit", Value::from(Decimal::from(1000))),
        ],
    )?;
    let product = tx.insert(
        "Product",
        [
            ("name", Value::from("Scenario Widget")),
            ("unit_price", Value::from(Decimal::from(20))),
        ],
    )?;
    let order = tx.insert("Order", [("customer_id", Value::Ref(customer.id))])?;
    tx.commit()?;
    Ok((customer, order, product))
}

fn read_decimal(engine: &LogicEngine, key: &RowKey, attribute: &str) -> Result<Decimal, CliError> {
    let row = engine
        .get(key)?
        .ok_or_else(|| CliError::Core(Error::NotFound(key.clone())))?;
    row.decimal(attribute).map_err(|source| {
        CliError::Core(Error::InvalidValue {
            entity: key.entity.clone(),
            attribute: attribute.to_string(),
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rowlogic_core::demo::order_engine;
    use rowlogic_core::{EngineConfig, MemoryStore, SledStore, StorageConfig};

    fn check(reports: &[StepReport]) {
        let balances: Vec<_> = reports.iter().map(|r| r.balance).collect();
        assert_eq!(
            balances,
            vec![Decimal::from(40), Decimal::from(840), Decimal::from(840)]
        );
        assert!(reports[0].committed && reports[1].committed);
        assert!(!reports[2].committed);
        assert_eq!(
            reports[2].outcome,
            "Customer Scenario Customer balance (1040.00) exceeds credit limit (1000)"
        );
    }

    #[test]
    fn test_walkthrough_in_memory() {
        let engine = order_engine(Arc::new(MemoryStore::new()), EngineConfig::default()).unwrap();
        check(&run(&engine).unwrap());
    }

    #[test]
    fn test_walkthrough_on_sled() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(StorageConfig::new(dir.path())).unwrap();
        let engine = order_engine(Arc::new(store), EngineConfig::default()).unwrap();
        check(&run(&engine).unwrap());
        assert_eq!(engine.scan("Item").unwrap().len(), 2);
    }
}
