//! Process-wide registry of content-model bindings, keyed by name:
//! registration happens once, statically, at process startup, replacing
//! runtime class lookup. Concrete model bindings (vocabulary classes,
//! predicate sets) are an external collaborator out of this crate's
//! scope; this registry is the seam a deployment's model crate registers
//! into, and the engines only ever see the `&'static ModelDef` it hands
//! back.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::RwLock;

use super::model::ModelDef;

#[derive(Debug, Clone, thiserror::Error)]
#[error("no content model registered under the name '{0}'")]
pub struct ModelNotFoundError(pub String);

#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<&'static str, &'static ModelDef>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static ModelRegistry {
        static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ModelRegistry::new)
    }

    /// Register one model binding under its own `ModelDef::name`. Intended
    /// to run once at process startup, e.g. from a deployment's model crate
    /// via `ModelRegistry::global().register(&ITEM_MODEL)`.
    pub fn register(&self, model: &'static ModelDef) {
        self.models.write().unwrap().insert(model.name, model);
    }

    pub fn get(&self, name: &str) -> Result<&'static ModelDef, ModelNotFoundError> {
        self.models
            .read()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| ModelNotFoundError(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.models.read().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_model::HeaderMap;

    static TEST_MODEL: ModelDef = ModelDef {
        name: "RegistryTestModel",
        rdf_types: &[],
        header_map: || HeaderMap::Label(String::new()),
        properties: &[],
    };

    #[test]
    fn register_then_get_round_trips() {
        let registry = ModelRegistry::new();
        registry.register(&TEST_MODEL);
        let found = registry.get("RegistryTestModel").unwrap();
        assert_eq!(found.name, "RegistryTestModel");
    }

    #[test]
    fn unregistered_name_is_an_error() {
        let registry = ModelRegistry::new();
        assert!(registry.get("Nonexistent").is_err());
    }
}
