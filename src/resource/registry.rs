//! Resource Registry - Load lookup and resource definitions from JSON
//!
//! Endpoint names, field names and action names are data, not code. They are
//! embedded at compile time and handed to the components that need them.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded registry JSON files (compiled into the binary)
const REGISTRY_FILES: &[&str] = &[
    include_str!("../resources/lookups.json"),
    include_str!("../resources/resources.json"),
];

fn default_id_field() -> String {
    "id".to_string()
}

fn default_get_method() -> String {
    "getObject".to_string()
}

/// How to translate between names and ids for one kind of enum-like entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LookupDef {
    /// Used in error messages: "<display_name> <key> not found"
    pub display_name: String,
    pub service: String,
    /// Listing action used for name -> id
    pub list_method: String,
    /// Direct get action used for id -> name
    #[serde(default = "default_get_method")]
    pub get_method: String,
    pub name_field: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

/// Resource type exposed to the orchestrator
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub service: String,
    pub actions: Vec<String>,
}

impl ResourceDef {
    pub fn supports(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub lookups: HashMap<String, LookupDef>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<RegistryConfig> = OnceLock::new();

/// Get the registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static RegistryConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = RegistryConfig::default();

        for content in REGISTRY_FILES {
            let partial: RegistryConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded registry JSON: {}", e));
            final_config.lookups.extend(partial.lookups);
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

pub fn get_lookup(key: &str) -> Option<&'static LookupDef> {
    get_registry().lookups.get(key)
}

pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// All resource type keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    keys.sort_unstable();
    keys
}
