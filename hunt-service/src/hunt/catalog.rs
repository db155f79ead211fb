// Hunt Catalog
// Read-only registry of validated hunt definitions

use crate::execution::graph::{DefinitionError, DependencyGraph};
use crate::hunt::builtin::builtin_hunts;
use crate::hunt::models::HuntDefinition;
use crate::hunt::validation::validate_definition;

use std::collections::BTreeMap;
use std::sync::Arc;

/// A validated definition together with its dependency graph
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub definition: Arc<HuntDefinition>,
    pub graph: DependencyGraph,
}

/// Hunt definitions by name
///
/// Every definition is validated when registered, so anything in the catalog
/// can be submitted without re-checking its structure.
#[derive(Debug, Clone, Default)]
pub struct HuntCatalog {
    hunts: BTreeMap<String, CatalogEntry>,
}

impl HuntCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in hunts
    pub fn builtin() -> Result<Self, DefinitionError> {
        let mut catalog = Self::new();
        for hunt in builtin_hunts() {
            catalog.register(hunt)?;
        }
        Ok(catalog)
    }

    pub fn register(&mut self, definition: HuntDefinition) -> Result<(), DefinitionError> {
        if self.hunts.contains_key(&definition.name) {
            return Err(DefinitionError::duplicate_hunt(format!(
                "hunt '{}' is already registered",
                definition.name
            )));
        }

        let graph = validate_definition(&definition)?;
        self.hunts.insert(
            definition.name.clone(),
            CatalogEntry {
                definition: Arc::new(definition),
                graph,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.hunts.get(name)
    }

    /// Definitions ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &HuntDefinition> {
        self.hunts.values().map(|entry| entry.definition.as_ref())
    }

    pub fn len(&self) -> usize {
        self.hunts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hunts.is_empty()
    }
}
