//! Machine-introspection collaborator trait.

use crate::constraint::AttributeMap;
use async_trait::async_trait;

/// Read access to local machine facts (CPU, OS, network, inputs, ...).
///
/// Implemented outside this subsystem. The result is keyed by top-level
/// category with arbitrarily nested sub-objects; consumers dereference by
/// dotted path. Only the requested categories need to be resolved.
#[async_trait]
pub trait MachineInformation: Send + Sync {
    async fn machine_information(&self, categories: &[String]) -> AttributeMap;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! In-memory introspection stub for tests.

    use super::*;
    use serde_json::Value;
    use std::collections::HashMap;

    /// Serves a fixed category map, ignoring the requested filter.
    #[derive(Debug, Default, Clone)]
    pub struct StaticMachineInformation {
        pub categories: HashMap<String, Value>,
    }

    impl StaticMachineInformation {
        pub fn new(categories: HashMap<String, Value>) -> Self {
            Self { categories }
        }
    }

    #[async_trait]
    impl MachineInformation for StaticMachineInformation {
        async fn machine_information(&self, categories: &[String]) -> AttributeMap {
            self.categories
                .iter()
                .filter(|(key, _)| categories.contains(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        }
    }
}
