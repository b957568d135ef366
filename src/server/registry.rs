//! Registry of the controllers exposed by a server

use crate::controller::ApiController;
use std::collections::HashMap;
use std::sync::Arc;

/// Controllers keyed by route name
#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<ApiController>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller under its name, replacing any previous one
    pub fn register(&mut self, controller: ApiController) {
        self.controllers
            .insert(controller.name().to_string(), Arc::new(controller));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ApiController>> {
        self.controllers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    /// Registered route names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.controllers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ControllerRegistry::new();
        assert!(registry.is_empty());

        registry.register(ApiController::unbound("users", "user"));
        registry.register(ApiController::unbound("comments", "comment"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["comments", "users"]);
        assert_eq!(registry.get("users").unwrap().entity_type(), "user");
        assert!(registry.get("posts").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ControllerRegistry::new();
        registry.register(ApiController::unbound("users", "user"));
        registry.register(ApiController::unbound("users", "member"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("users").unwrap().entity_type(), "member");
    }
}
