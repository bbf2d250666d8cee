use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::ChatModel;

/// Named model instances, built once at startup and handed to whatever
/// needs a model.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn ChatModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any model already registered under `name`.
    pub fn register(&mut self, name: impl Into<String>, model: Arc<dyn ChatModel>) {
        self.models.insert(name.into(), model);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ChatModel>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No model registered under '{}'", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
