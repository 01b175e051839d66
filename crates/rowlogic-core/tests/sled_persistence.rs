//! Integration tests for the sled-backed store.

use std::sync::Arc;

use rowlogic_core::demo::{order_engine, populate};
use rowlogic_core::{Decimal, EngineConfig, Error, SledStore, StorageConfig, Value};

struct TestContext {
    dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn store(&self) -> Arc<SledStore> {
        let config = StorageConfig::new(self.dir.path()).with_sync_commits();
        Arc::new(SledStore::open(config).unwrap())
    }
}

#[test]
fn test_committed_state_survives_reopen() {
    let ctx = TestContext::new();

    let data = {
        let engine = order_engine(ctx.store(), EngineConfig::default()).unwrap();
        populate(&engine).unwrap()
    };

    let engine = order_engine(ctx.store(), EngineConfig::default()).unwrap();
    let customer = engine.get(&data.customers[0]).unwrap().unwrap();
    assert_eq!(customer.decimal("balance"), Ok(Decimal::from(100)));
    assert_eq!(engine.scan("Item").unwrap().len(), 4);

    // Reopened data is already at a fixed point.
    assert!(engine.rederive().unwrap().is_fixed_point());
}

#[test]
fn test_rejected_commit_writes_nothing() {
    let ctx = TestContext::new();
    let engine = order_engine(ctx.store(), EngineConfig::default()).unwrap();
    let data = populate(&engine).unwrap();

    let mut tx = engine.begin();
    tx.insert(
        "Item",
        [
            ("order_id", Value::Ref(data.orders[0].id)),
            ("product_id", Value::Ref(data.products[1].id)),
            ("quantity", Value::Int(100)),
        ],
    )
    .unwrap();
    assert!(matches!(tx.commit(), Err(Error::Propagation(_))));

    assert_eq!(engine.scan("Item").unwrap().len(), 4);
    let order = engine.get(&data.orders[0]).unwrap().unwrap();
    assert_eq!(order.decimal("amount_total"), Ok(Decimal::from(100)));
}

#[test]
fn test_ids_not_reused_after_delete() {
    let ctx = TestContext::new();
    let engine = order_engine(ctx.store(), EngineConfig::default()).unwrap();
    let data = populate(&engine).unwrap();

    let mut tx = engine.begin();
    tx.delete(&data.items[3]).unwrap();
    let item = tx
        .insert(
            "Item",
            [
                ("order_id", Value::Ref(data.orders[1].id)),
                ("product_id", Value::Ref(data.products[0].id)),
            ],
        )
        .unwrap();
    tx.commit().unwrap();

    assert!(data.items.iter().all(|key| key.id != item.id));
    let order = engine.get(&data.orders[1]).unwrap().unwrap();
    // One unit of alpha (20) plus the new default quantity of one.
    assert_eq!(order.decimal("amount_total"), Ok(Decimal::from(40)));
}
