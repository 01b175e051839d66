//! The logic engine: frozen rules bound to a row store.

mod propagation;
mod result;

pub(crate) use propagation::Propagator;
pub use result::PropagationResult;

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::rules::{RuleRegistry, RuleSet};
use crate::storage::{Row, RowKey, RowStore};
use crate::transaction::Transaction;

/// Rule engine over a row store.
///
/// Owns the validated rule set and its dependency graph. All writes go
/// through a [`Transaction`] obtained from [`LogicEngine::begin`].
pub struct LogicEngine {
    rules: RuleSet,
    store: Arc<dyn RowStore>,
    config: EngineConfig,
}

impl LogicEngine {
    /// Freeze the registry and bind it to a store.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Config`] for an invalid configuration and with
    /// [`Error::Rule`] if the rules form a cycle.
    pub fn new(
        registry: RuleRegistry,
        store: Arc<dyn RowStore>,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let rules = RuleSet::build(registry)?;

        tracing::info!(
            rules = rules.registry().len(),
            edges = rules.graph().edge_count(),
            decimal_scale = config.decimal_scale,
            "logic engine ready"
        );

        Ok(Self {
            rules,
            store,
            config,
        })
    }

    /// Start a unit of work.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Read a committed row.
    pub fn get(&self, key: &RowKey) -> Result<Option<Row>, Error> {
        self.store.get(key)
    }

    /// All committed rows of an entity type.
    pub fn scan(&self, entity: &str) -> Result<Vec<Row>, Error> {
        if self.catalog().get_entity(entity).is_none() {
            return Err(Error::UnknownEntity(entity.to_string()));
        }
        self.store.scan(entity)
    }

    /// Recompute every derived attribute of every committed row.
    ///
    /// On a consistent store this is a fixed point: the result reports no
    /// changed values.
    pub fn rederive(&self) -> Result<PropagationResult, Error> {
        let mut tx = self.begin();
        for entity in self.catalog().entities() {
            if self.rules.registry().derived_attributes(&entity.name).next().is_none() {
                continue;
            }
            for row in self.store.scan(&entity.name)? {
                tx.rederive(&row.key)?;
            }
        }
        tx.commit()
    }

    /// The entity catalog.
    pub fn catalog(&self) -> &Catalog {
        self.rules.catalog()
    }

    /// The frozen rule set.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for LogicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicEngine")
            .field("rules", &self.rules)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
