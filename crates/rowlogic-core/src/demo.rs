//! Sample order-management domain.
//!
//! Twelve entity types, the credit-limit rules, and a small data set. Used
//! by the CLI and by the integration tests.

use std::sync::Arc;

use crate::catalog::{Catalog, DeleteBehavior, EntityDef, FieldDef, FieldType, RelationDef};
use crate::config::EngineConfig;
use crate::engine::{LogicEngine, PropagationResult};
use crate::error::{Error, RuleError};
use crate::rules::{Rule, RuleRegistry};
use crate::storage::{RowKey, RowStore};
use crate::value::{EvaluationError, Value};
use rust_decimal::Decimal;

/// Message of the credit-limit constraint.
pub const CREDIT_LIMIT_MESSAGE: &str =
    "Customer {name} balance ({balance}) exceeds credit limit ({credit_limit})";

/// Build the order-management catalog.
pub fn order_catalog() -> Result<Catalog, Error> {
    let name = || FieldDef::new("name", FieldType::String);

    let catalog = Catalog::builder()
        .with_entity(EntityDef::new("Customer").with_fields([
            name(),
            FieldDef::new("balance", FieldType::Decimal).with_zero_default(),
            FieldDef::new("credit_limit", FieldType::Decimal),
        ]))
        .with_entity(EntityDef::new("Order").with_fields([
            FieldDef::reference("customer_id", "Customer"),
            FieldDef::new("amount_total", FieldType::Decimal).with_zero_default(),
            FieldDef::optional("date_shipped", FieldType::Timestamp),
            FieldDef::optional("notes", FieldType::String),
        ]))
        .with_entity(EntityDef::new("Product").with_fields([
            name(),
            FieldDef::new("unit_price", FieldType::Decimal),
        ]))
        .with_entity(EntityDef::new("Item").with_fields([
            FieldDef::reference("order_id", "Order"),
            FieldDef::reference("product_id", "Product"),
            FieldDef::new("quantity", FieldType::Integer).with_default(1i64),
            FieldDef::new("unit_price", FieldType::Decimal),
            FieldDef::new("amount", FieldType::Decimal).with_zero_default(),
        ]))
        .with_entity(EntityDef::new("Supplier").with_field(name()))
        .with_entity(EntityDef::new("Inventory").with_fields([
            FieldDef::reference("product_id", "Product"),
            FieldDef::new("quantity", FieldType::Integer),
        ]))
        .with_entity(EntityDef::new("Shipment").with_field(
            FieldDef::optional("shipment_date", FieldType::Timestamp).with_now_default(),
        ))
        .with_entity(EntityDef::new("Payment").with_fields([
            FieldDef::new("amount", FieldType::Decimal),
            FieldDef::reference("order_id", "Order"),
        ]))
        .with_entity(EntityDef::new("Category").with_field(name()))
        .with_entity(
            EntityDef::new("Location").with_field(FieldDef::new("address", FieldType::String)),
        )
        .with_entity(EntityDef::new("Employee").with_field(name()))
        .with_entity(EntityDef::new("Review").with_fields([
            FieldDef::reference("product_id", "Product"),
            FieldDef::reference("customer_id", "Customer"),
            FieldDef::new("rating", FieldType::Integer),
            FieldDef::optional("comment", FieldType::String),
        ]))
        .with_relation(RelationDef::one_to_many(
            "orders",
            "Customer",
            "Order",
            "customer_id",
        ))
        .with_relation(
            RelationDef::one_to_many("items", "Order", "Item", "order_id")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        .with_relation(RelationDef::one_to_many(
            "product_items",
            "Product",
            "Item",
            "product_id",
        ))
        .with_relation(
            RelationDef::one_to_many("inventory", "Product", "Inventory", "product_id")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        .with_relation(
            RelationDef::one_to_many("payments", "Order", "Payment", "order_id")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        .with_relation(
            RelationDef::one_to_many("product_reviews", "Product", "Review", "product_id")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        .with_relation(
            RelationDef::one_to_many("customer_reviews", "Customer", "Review", "customer_id")
                .with_on_delete(DeleteBehavior::Cascade),
        )
        .build()?;

    Ok(catalog)
}

/// Declare the credit-limit rules.
///
/// ```text
/// Customer.balance      <= Customer.credit_limit
/// Customer.balance       = sum(Order.amount_total where date_shipped is null)
/// Order.amount_total     = sum(Item.amount)
/// Item.amount            = quantity * unit_price
/// Item.unit_price        = copy(Product.unit_price)
/// ```
pub fn declare_logic(registry: &mut RuleRegistry) -> Result<(), RuleError> {
    registry
        .register(Rule::constraint(
            "Customer",
            "credit_limit",
            |row| Ok(row.decimal_or_zero("balance")? <= row.decimal("credit_limit")?),
            CREDIT_LIMIT_MESSAGE,
        ))?
        .register(
            Rule::sum("Customer", "balance", "orders", "amount_total")
                .filtered(["date_shipped"], |row| Ok(row.is_null("date_shipped"))),
        )?
        .register(Rule::sum("Order", "amount_total", "items", "amount"))?
        .register(Rule::formula(
            "Item",
            "amount",
            ["quantity", "unit_price"],
            |row| {
                let quantity = row.decimal("quantity")?;
                let unit_price = row.decimal("unit_price")?;
                quantity
                    .checked_mul(unit_price)
                    .map(Value::Decimal)
                    .ok_or(EvaluationError::Overflow)
            },
        ))?
        .register(Rule::copy(
            "Item",
            "unit_price",
            "product_items",
            "unit_price",
        ))?;
    Ok(())
}

/// Engine over the sample domain.
pub fn order_engine(store: Arc<dyn RowStore>, config: EngineConfig) -> Result<LogicEngine, Error> {
    let mut registry = RuleRegistry::new(Arc::new(order_catalog()?));
    declare_logic(&mut registry)?;
    LogicEngine::new(registry, store, config)
}

/// Keys of the rows created by [`populate`].
#[derive(Debug, Clone)]
pub struct SampleData {
    /// "Customer One" (credit limit 1000) and "Customer Two" (1200).
    pub customers: [RowKey; 2],
    /// "Product Alpha" (20) and "Product Beta" (30).
    pub products: [RowKey; 2],
    /// An open order for customer one, a shipped order for customer two.
    pub orders: [RowKey; 2],
    /// Two items per order.
    pub items: [RowKey; 4],
    /// Statistics of the populating commit.
    pub result: PropagationResult,
}

/// Insert the sample data set in one transaction.
pub fn populate(engine: &LogicEngine) -> Result<SampleData, Error> {
    let mut tx = engine.begin();

    let customer = |name: &str, limit: i64| {
        [
            ("name", Value::from(name)),
            ("credit_limit", Value::from(Decimal::from(limit))),
        ]
    };
    let customers = [
        tx.insert("Customer", customer("Customer One", 1000))?,
        tx.insert("Customer", customer("Customer Two", 1200))?,
    ];

    let product = |name: &str, price: i64| {
        [
            ("name", Value::from(name)),
            ("unit_price", Value::from(Decimal::from(price))),
        ]
    };
    let products = [
        tx.insert("Product", product("Product Alpha", 20))?,
        tx.insert("Product", product("Product Beta", 30))?,
    ];

    let orders = [
        tx.insert("Order", [("customer_id", Value::Ref(customers[0].id))])?,
        tx.insert(
            "Order",
            [
                ("customer_id", Value::Ref(customers[1].id)),
                ("date_shipped", Value::now()),
            ],
        )?,
    ];

    let item = |order: &RowKey, product: &RowKey, quantity: i64| {
        [
            ("order_id", Value::Ref(order.id)),
            ("product_id", Value::Ref(product.id)),
            ("quantity", Value::Int(quantity)),
        ]
    };
    let items = [
        tx.insert("Item", item(&orders[0], &products[0], 2))?,
        tx.insert("Item", item(&orders[0], &products[1], 2))?,
        tx.insert("Item", item(&orders[1], &products[0], 1))?,
        tx.insert("Item", item(&orders[1], &products[1], 3))?,
    ];

    tx.insert("Supplier", [("name", "Supplier One")])?;
    tx.insert(
        "Inventory",
        [
            ("product_id", Value::Ref(products[0].id)),
            ("quantity", Value::Int(100)),
        ],
    )?;
    tx.insert("Shipment", std::iter::empty::<(&str, Value)>())?;
    tx.insert(
        "Payment",
        [
            ("amount", Value::from(Decimal::from(100))),
            ("order_id", Value::Ref(orders[0].id)),
        ],
    )?;
    tx.insert("Category", [("name", "Gadgets")])?;
    tx.insert("Location", [("address", "123 Test St.")])?;
    tx.insert("Employee", [("name", "Employee One")])?;
    tx.insert(
        "Review",
        [
            ("product_id", Value::Ref(products[0].id)),
            ("customer_id", Value::Ref(customers[0].id)),
            ("rating", Value::Int(5)),
            ("comment", Value::from("Great product!")),
        ],
    )?;

    let result = tx.commit()?;
    Ok(SampleData {
        customers,
        products,
        orders,
        items,
        result,
    })
}
