//! Integration tests for the propagation pass over the sample domain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rowlogic_core::demo::{order_engine, populate, SampleData};
use rowlogic_core::{
    Decimal, EngineConfig, Error, LogicEngine, MemoryStore, PropagationError, Row, RowKey,
    RowStore, Value, WriteBatch,
};

/// Memory store that counts the rows it hands out.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    rows_read: AtomicUsize,
}

impl CountingStore {
    fn count(&self, rows: usize) {
        self.rows_read.fetch_add(rows, Ordering::Relaxed);
    }

    fn take(&self) -> usize {
        self.rows_read.swap(0, Ordering::Relaxed)
    }
}

impl RowStore for CountingStore {
    fn get(&self, key: &RowKey) -> Result<Option<Row>, Error> {
        let row = self.inner.get(key)?;
        self.count(usize::from(row.is_some()));
        Ok(row)
    }

    fn scan(&self, entity: &str) -> Result<Vec<Row>, Error> {
        let rows = self.inner.scan(entity)?;
        self.count(rows.len());
        Ok(rows)
    }

    fn allocate_id(&self, entity: &str) -> Result<u64, Error> {
        self.inner.allocate_id(entity)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), Error> {
        self.inner.apply(batch)
    }

    fn scan_referencing(
        &self,
        entity: &str,
        foreign_key: &str,
        parent_id: u64,
    ) -> Result<Vec<Row>, Error> {
        let rows = self.inner.scan_referencing(entity, foreign_key, parent_id)?;
        self.count(rows.len());
        Ok(rows)
    }
}

struct TestContext {
    engine: LogicEngine,
    data: SampleData,
}

impl TestContext {
    fn new() -> Self {
        let engine =
            order_engine(Arc::new(MemoryStore::new()), EngineConfig::default()).unwrap();
        let data = populate(&engine).unwrap();
        Self { engine, data }
    }

    fn decimal(&self, key: &RowKey, attribute: &str) -> Decimal {
        self.engine
            .get(key)
            .unwrap()
            .unwrap()
            .decimal(attribute)
            .unwrap()
    }

    /// A fresh customer with an empty open order.
    fn open_order(&self, credit_limit: i64) -> (RowKey, RowKey) {
        let mut tx = self.engine.begin();
        let customer = tx
            .insert(
                "Customer",
                [
                    ("name", Value::from("Walkthrough")),
                    ("credit_limit", Value::from(Decimal::from(credit_limit))),
                ],
            )
            .unwrap();
        let order = tx
            .insert("Order", [("customer_id", Value::Ref(customer.id))])
            .unwrap();
        tx.commit().unwrap();
        (customer, order)
    }

    fn add_item(&self, order: &RowKey, quantity: i64) -> Result<RowKey, Error> {
        let mut tx = self.engine.begin();
        let item = tx.insert(
            "Item",
            [
                ("order_id", Value::Ref(order.id)),
                ("product_id", Value::Ref(self.data.products[0].id)),
                ("quantity", Value::Int(quantity)),
            ],
        )?;
        tx.commit()?;
        Ok(item)
    }

    /// Every derived value matches its definition and every constraint holds.
    fn assert_consistent(&self) {
        for item in self.engine.scan("Item").unwrap() {
            let quantity = item.decimal("quantity").unwrap();
            assert_eq!(
                item.decimal("amount").unwrap(),
                quantity * item.decimal("unit_price").unwrap(),
                "{}",
                item.key
            );
        }

        for order in self.engine.scan("Order").unwrap() {
            let total: Decimal = self
                .engine
                .scan("Item")
                .unwrap()
                .iter()
                .filter(|item| item.reference("order_id") == Some(order.id()))
                .map(|item| item.decimal("amount").unwrap())
                .sum();
            assert_eq!(order.decimal("amount_total").unwrap(), total, "{}", order.key);
        }

        for customer in self.engine.scan("Customer").unwrap() {
            let balance = customer.decimal("balance").unwrap();
            assert!(balance <= customer.decimal("credit_limit").unwrap());
        }
    }
}

#[test]
fn test_credit_limit_walkthrough() {
    let ctx = TestContext::new();
    let (customer, order) = ctx.open_order(1000);
    assert_eq!(ctx.decimal(&customer, "balance"), Decimal::ZERO);

    let first = ctx.add_item(&order, 2).unwrap();
    assert_eq!(ctx.decimal(&first, "amount"), Decimal::from(40));
    assert_eq!(ctx.decimal(&order, "amount_total"), Decimal::from(40));
    assert_eq!(ctx.decimal(&customer, "balance"), Decimal::from(40));

    let second = ctx.add_item(&order, 40).unwrap();
    assert_eq!(ctx.decimal(&second, "amount"), Decimal::from(800));
    assert_eq!(ctx.decimal(&order, "amount_total"), Decimal::from(840));
    assert_eq!(ctx.decimal(&customer, "balance"), Decimal::from(840));

    let err = ctx.add_item(&order, 10).unwrap_err();
    match err {
        Error::Propagation(PropagationError::ConstraintViolation {
            row,
            constraint,
            message,
        }) => {
            assert_eq!(row, customer);
            assert_eq!(constraint, "credit_limit");
            assert_eq!(
                message,
                "Customer Walkthrough balance (1040.00) exceeds credit limit (1000)"
            );
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }

    // Nothing from the rejected transaction persisted.
    assert_eq!(ctx.decimal(&order, "amount_total"), Decimal::from(840));
    assert_eq!(ctx.decimal(&customer, "balance"), Decimal::from(840));
    let items = ctx.engine.begin().children("items", order.id).unwrap();
    assert_eq!(items.len(), 2);
    ctx.assert_consistent();
}

#[test]
fn test_rejection_reports_target() {
    let ctx = TestContext::new();
    let mut tx = ctx.engine.begin();
    tx.update(
        &ctx.data.customers[0],
        [("credit_limit", Value::from(Decimal::from(50)))],
    )
    .unwrap();

    let err = match tx.commit() {
        Err(Error::Propagation(err)) => err,
        other => panic!("expected rejection, got {other:?}"),
    };
    assert_eq!(err.target(), ("Customer", "credit_limit"));
    assert!(err.message().contains("exceeds credit limit (50)"));
    assert_eq!(
        ctx.decimal(&ctx.data.customers[0], "credit_limit"),
        Decimal::from(1000)
    );
}

#[test]
fn test_delete_item_resums_order() {
    let ctx = TestContext::new();
    let order = &ctx.data.orders[0];
    assert_eq!(ctx.decimal(order, "amount_total"), Decimal::from(100));

    let mut tx = ctx.engine.begin();
    tx.delete(&ctx.data.items[1]).unwrap();
    let result = tx.commit().unwrap();

    assert_eq!(ctx.decimal(order, "amount_total"), Decimal::from(40));
    assert_eq!(ctx.decimal(&ctx.data.customers[0], "balance"), Decimal::from(40));
    assert!(ctx.engine.get(&ctx.data.items[1]).unwrap().is_none());
    assert_eq!(result.touched("Order"), 1);
    ctx.assert_consistent();
}

#[test]
fn test_rederive_is_fixed_point() {
    let ctx = TestContext::new();
    ctx.assert_consistent();

    let result = ctx.engine.rederive().unwrap();
    assert!(result.is_fixed_point(), "{result}");
    assert!(result.recomputed > 0);
    assert_eq!(result.touched("Item"), 4);

    let again = ctx.engine.rederive().unwrap();
    assert_eq!(again.changed, 0);
}

#[test]
fn test_shipping_leaves_balance() {
    let ctx = TestContext::new();
    let customer = &ctx.data.customers[0];
    assert_eq!(ctx.decimal(customer, "balance"), Decimal::from(100));

    let mut tx = ctx.engine.begin();
    tx.update(&ctx.data.orders[0], [("date_shipped", Value::now())])
        .unwrap();
    tx.commit().unwrap();
    assert_eq!(ctx.decimal(customer, "balance"), Decimal::ZERO);

    let mut tx = ctx.engine.begin();
    tx.update(&ctx.data.orders[0], [("date_shipped", Value::Null)])
        .unwrap();
    tx.commit().unwrap();
    assert_eq!(ctx.decimal(customer, "balance"), Decimal::from(100));
}

#[test]
fn test_product_price_copies_to_items() {
    let ctx = TestContext::new();
    let alpha = &ctx.data.products[0];

    let mut tx = ctx.engine.begin();
    tx.update(alpha, [("unit_price", Value::from(Decimal::new(2550, 2)))])
        .unwrap();
    let result = tx.commit().unwrap();

    // Items 0 and 2 reference product alpha.
    assert_eq!(ctx.decimal(&ctx.data.items[0], "unit_price"), Decimal::new(2550, 2));
    assert_eq!(ctx.decimal(&ctx.data.items[0], "amount"), Decimal::from(51));
    assert_eq!(ctx.decimal(&ctx.data.items[2], "amount"), Decimal::new(2550, 2));
    assert_eq!(ctx.decimal(&ctx.data.orders[0], "amount_total"), Decimal::from(111));
    assert_eq!(ctx.decimal(&ctx.data.customers[0], "balance"), Decimal::from(111));
    // Shipped order re-totals but stays out of customer two's balance.
    assert_eq!(ctx.decimal(&ctx.data.orders[1], "amount_total"), Decimal::new(11550, 2));
    assert_eq!(ctx.decimal(&ctx.data.customers[1], "balance"), Decimal::ZERO);
    assert_eq!(result.touched("Item"), 2);
    ctx.assert_consistent();
}

#[test]
fn test_moving_item_resums_both_orders() {
    let ctx = TestContext::new();
    let [open, shipped] = &ctx.data.orders;

    let mut tx = ctx.engine.begin();
    tx.update(&ctx.data.items[3], [("order_id", Value::Ref(open.id))])
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(ctx.decimal(open, "amount_total"), Decimal::from(190));
    assert_eq!(ctx.decimal(shipped, "amount_total"), Decimal::from(20));
    assert_eq!(ctx.decimal(&ctx.data.customers[0], "balance"), Decimal::from(190));
    ctx.assert_consistent();
}

#[test]
fn test_direct_edit_of_derived_attribute_is_overridden() {
    let ctx = TestContext::new();
    let item = &ctx.data.items[0];

    let mut tx = ctx.engine.begin();
    tx.update(item, [("amount", Value::from(Decimal::from(999)))])
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(ctx.decimal(item, "amount"), Decimal::from(40));
    ctx.assert_consistent();
}

#[test]
fn test_rollback_discards_edits() {
    let ctx = TestContext::new();
    let item = &ctx.data.items[0];

    let mut tx = ctx.engine.begin();
    tx.update(item, [("quantity", Value::Int(7))]).unwrap();
    assert_eq!(tx.change_log().len(), 1);
    assert_eq!(tx.get(item).unwrap().unwrap().value("quantity"), &Value::Int(7));
    tx.rollback();

    assert_eq!(ctx.decimal(item, "quantity"), Decimal::from(2));
    assert_eq!(ctx.decimal(item, "amount"), Decimal::from(40));

    // Dropping without commit is a rollback too.
    {
        let mut tx = ctx.engine.begin();
        tx.update(item, [("quantity", Value::Int(9))]).unwrap();
    }
    assert_eq!(ctx.decimal(item, "quantity"), Decimal::from(2));
}

#[test]
fn test_derivation_failure_rolls_back() {
    let ctx = TestContext::new();
    let mut tx = ctx.engine.begin();
    tx.update(&ctx.data.customers[1], [("name", Value::from("Renamed"))])
        .unwrap();
    tx.update(&ctx.data.items[0], [("quantity", Value::Null)])
        .unwrap();

    match tx.commit() {
        Err(Error::Propagation(PropagationError::Derivation { row, attribute, .. })) => {
            assert_eq!(row, ctx.data.items[0]);
            assert_eq!(attribute, "amount");
        }
        other => panic!("expected derivation failure, got {other:?}"),
    }

    let customer = ctx.engine.get(&ctx.data.customers[1]).unwrap().unwrap();
    assert_eq!(customer.value("name"), &Value::from("Customer Two"));
}

#[test]
fn test_cascade_delete_order() {
    let ctx = TestContext::new();
    let order = &ctx.data.orders[0];

    let mut tx = ctx.engine.begin();
    tx.delete(order).unwrap();
    tx.commit().unwrap();

    assert!(ctx.engine.get(order).unwrap().is_none());
    assert!(ctx.engine.get(&ctx.data.items[0]).unwrap().is_none());
    assert!(ctx.engine.get(&ctx.data.items[1]).unwrap().is_none());
    assert!(ctx.engine.scan("Payment").unwrap().is_empty());
    assert_eq!(ctx.decimal(&ctx.data.customers[0], "balance"), Decimal::ZERO);
    ctx.assert_consistent();
}

#[test]
fn test_restrict_delete_customer() {
    let ctx = TestContext::new();
    let mut tx = ctx.engine.begin();
    tx.update(&ctx.data.customers[0], [("name", Value::from("Kept"))])
        .unwrap();

    let err = tx.delete(&ctx.data.customers[0]).unwrap_err();
    assert!(matches!(
        err,
        Error::RestrictViolation { ref referencing_entity, count: 1, .. } if referencing_entity == "Order"
    ));

    // The failed delete left earlier edits in place.
    assert_eq!(tx.change_log().len(), 1);
    tx.commit().unwrap();
    let customer = ctx.engine.get(&ctx.data.customers[0]).unwrap().unwrap();
    assert_eq!(customer.value("name"), &Value::from("Kept"));
    assert_eq!(ctx.engine.scan("Review").unwrap().len(), 1);
}

#[test]
fn test_insert_validation() {
    let ctx = TestContext::new();
    let mut tx = ctx.engine.begin();

    let err = tx.insert("Customer", [("name", "No Limit")]).unwrap_err();
    assert!(matches!(err, Error::MissingAttribute { ref attribute, .. } if attribute == "credit_limit"));

    let err = tx.insert("Warehouse", [("name", "Nope")]).unwrap_err();
    assert!(matches!(err, Error::UnknownEntity(_)));

    let err = tx
        .insert("Order", [("customer_id", Value::Ref(999))])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }));

    let err = tx
        .insert("Item", [("quantity", Value::from("many"))])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }));

    assert!(tx.is_empty());
}

#[test]
fn test_empty_commit() {
    let ctx = TestContext::new();
    let result = ctx.engine.begin().commit().unwrap();
    assert_eq!(result.rows_touched(), 0);
    assert_eq!(result.recomputed, 0);
}

#[test]
fn test_each_derivation_computed_once_per_pass() {
    let ctx = TestContext::new();
    let order = &ctx.data.orders[0];

    let mut tx = ctx.engine.begin();
    for _ in 0..3 {
        tx.insert(
            "Item",
            [
                ("order_id", Value::Ref(order.id)),
                ("product_id", Value::Ref(ctx.data.products[1].id)),
                ("quantity", Value::Int(1)),
            ],
        )
        .unwrap();
    }
    let result = tx.commit().unwrap();

    // Three copies, three formulas, one order total, one balance.
    assert_eq!(result.recomputed, 8, "{result}");
    assert_eq!(result.changed, 8);
    assert_eq!(result.touched("Item"), 3);
    assert_eq!(result.touched("Order"), 1);
    assert_eq!(result.touched("Customer"), 1);
    assert_eq!(result.constraints_checked, 1);
    assert_eq!(ctx.decimal(order, "amount_total"), Decimal::from(190));
    assert_eq!(ctx.decimal(&ctx.data.customers[0], "balance"), Decimal::from(190));
    ctx.assert_consistent();
}

#[test]
fn test_parent_reached_by_several_paths_computed_once() {
    let ctx = TestContext::new();
    let [open, shipped] = &ctx.data.orders;

    // The price change reaches the open order through items 0 and 2; moving
    // item 2 reaches it a third time.
    let mut tx = ctx.engine.begin();
    tx.update(
        &ctx.data.products[0],
        [("unit_price", Value::from(Decimal::from(25)))],
    )
    .unwrap();
    tx.update(&ctx.data.items[2], [("order_id", Value::Ref(open.id))])
        .unwrap();
    let result = tx.commit().unwrap();

    // Two copies, two formulas, two order totals, two balances.
    assert_eq!(result.recomputed, 8, "{result}");
    assert_eq!(result.touched("Order"), 2);
    assert_eq!(result.touched("Customer"), 2);
    assert_eq!(result.constraints_checked, 2);
    assert_eq!(ctx.decimal(open, "amount_total"), Decimal::from(135));
    assert_eq!(ctx.decimal(shipped, "amount_total"), Decimal::from(90));
    assert_eq!(ctx.decimal(&ctx.data.customers[0], "balance"), Decimal::from(135));
    assert_eq!(ctx.decimal(&ctx.data.customers[1], "balance"), Decimal::ZERO);
    ctx.assert_consistent();
}

#[test]
fn test_item_edit_reads_only_related_rows() {
    let store = Arc::new(CountingStore::default());
    let engine = order_engine(store.clone(), EngineConfig::default()).unwrap();
    let data = populate(&engine).unwrap();

    let mut tx = engine.begin();
    for _ in 0..500 {
        tx.insert(
            "Item",
            [
                ("order_id", Value::Ref(data.orders[1].id)),
                ("product_id", Value::Ref(data.products[0].id)),
            ],
        )
        .unwrap();
    }
    tx.commit().unwrap();
    assert_eq!(engine.scan("Item").unwrap().len(), 504);
    store.take();

    let mut tx = engine.begin();
    tx.update(&data.items[0], [("quantity", Value::Int(3))])
        .unwrap();
    tx.commit().unwrap();

    let reads = store.take();
    assert!(reads < 50, "one item edit read {reads} rows");
    let order = engine.get(&data.orders[0]).unwrap().unwrap();
    assert_eq!(order.decimal("amount_total"), Ok(Decimal::from(120)));
}
