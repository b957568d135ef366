//! Configuration loading and management
//!
//! ```yaml
//! prefix: api
//! controllers:
//!   - name: users
//!     entity: user
//!     limit: 20
//!     order: name ASC
//!     safe_attributes: id,name,email
//!     priority_data:
//!       tenant_id: 7
//!     base_filter:
//!       tenant_id: "7"
//!     relations:
//!       comments:
//!         return: array
//!         keyField: id
//!         safeAttributes: [id, text]
//! ```

use crate::core::criteria::{Condition, CriteriaDefaults, DEFAULT_LIMIT, request_condition};
use crate::core::query::QueryParams;
use crate::core::relations::{AttributeList, RelationConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_prefix() -> String {
    "api".to_string()
}

fn default_true() -> bool {
    true
}

/// Configuration of one controller route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Route name (`/{prefix}/{name}`)
    pub name: String,

    /// Entity type served, resolved through the store registry
    pub entity: String,

    #[serde(default)]
    pub limit: Option<i64>,

    #[serde(default)]
    pub offset: Option<i64>,

    #[serde(default)]
    pub order: Option<String>,

    /// Response allow-list, as a list or a comma-separated string
    #[serde(default, alias = "safeAttributes")]
    pub safe_attributes: Option<AttributeList>,

    /// Attributes forced onto created and updated entities
    #[serde(default, alias = "priorityData")]
    pub priority_data: Map<String, Value>,

    #[serde(default)]
    pub relations: RelationConfig,

    /// Exact-match filter (object or list of objects) ANDed into every query
    #[serde(default, alias = "baseFilter")]
    pub base_filter: Option<Value>,

    #[serde(default = "default_true", alias = "atomicBatches")]
    pub atomic_batches: bool,
}

impl ControllerConfig {
    pub fn new(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            limit: None,
            offset: None,
            order: None,
            safe_attributes: None,
            priority_data: Map::new(),
            relations: RelationConfig::new(),
            base_filter: None,
            atomic_batches: true,
        }
    }

    /// Pagination defaults, falling back to the global ones
    pub fn defaults(&self) -> CriteriaDefaults {
        CriteriaDefaults {
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            offset: self.offset.unwrap_or(0),
            order: self.order.clone().filter(|o| !o.trim().is_empty()),
        }
    }

    /// Base condition parsed from `base_filter`
    pub fn base_condition(&self) -> Option<Condition> {
        let filter = self.base_filter.as_ref()?;
        let params = QueryParams {
            filter: Some(filter.to_string()),
            ..QueryParams::default()
        };
        request_condition(&params)
    }
}

/// Complete configuration of an API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Path prefix of every controller route
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            controllers: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Merge several configurations.
    ///
    /// The last prefix wins. A controller redefined later replaces the earlier
    /// definition in place; new controllers are appended.
    pub fn merge(configs: Vec<Self>) -> Self {
        let mut merged = Self::default();

        for config in configs {
            merged.prefix = config.prefix;
            for controller in config.controllers {
                match merged.controllers.iter_mut().find(|c| c.name == controller.name) {
                    Some(existing) => *existing = controller,
                    None => merged.controllers.push(controller),
                }
            }
        }

        merged
    }

    pub fn controller(&self, name: &str) -> Option<&ControllerConfig> {
        self.controllers.iter().find(|c| c.name == name)
    }
}
