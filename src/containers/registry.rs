use crate::domain::ContainerSpec;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Named container definitions, loaded once from configuration
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    definitions: RwLock<BTreeMap<String, ContainerSpec>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, spec: ContainerSpec) {
        self.definitions.write().insert(name.to_string(), spec);
    }

    pub fn get(&self, name: &str) -> Option<ContainerSpec> {
        self.definitions.read().get(name).cloned()
    }

    pub fn list(&self) -> BTreeMap<String, ContainerSpec> {
        self.definitions.read().clone()
    }

    pub fn load_from_config(&self, containers: &BTreeMap<String, ContainerSpec>) {
        let mut definitions = self.definitions.write();
        for (name, spec) in containers {
            definitions.insert(name.clone(), spec.clone());
        }
    }
}
