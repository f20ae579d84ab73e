//! Resource Registry - Load resource schemas from JSON
//!
//! Field metadata, default timeouts, lock key templates and import formats
//! for every resource type live in embedded JSON files and are parsed once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/sql.json"),
    include_str!("../resources/bigquery.json"),
];

/// Value shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Int,
    List,
    Object,
}

/// Field definition from JSON
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldDef {
    pub name: String,
    /// Key (dot separated for nested keys) in the API representation
    pub wire: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub force_new: bool,
    #[serde(default)]
    pub description: String,
}

impl FieldDef {
    /// Computed fields the user can't set
    pub fn is_output_only(&self) -> bool {
        self.computed && !self.required && !self.optional
    }
}

/// Default operation timeouts, in minutes
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutDefs {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

/// Resolved operation timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl From<TimeoutDefs> for Timeouts {
    fn from(defs: TimeoutDefs) -> Self {
        Self {
            create: Duration::from_secs(defs.create * 60),
            update: Duration::from_secs(defs.update * 60),
            delete: Duration::from_secs(defs.delete * 60),
        }
    }
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceDef {
    pub display_name: String,
    pub service: String,
    pub id_template: String,
    pub lock_key: String,
    pub timeouts: TimeoutDefs,
    /// Anchored regexes, most specific first
    pub import_formats: Vec<String>,
    pub fields: Vec<FieldDef>,
}

impl ResourceDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn default_timeouts(&self) -> Timeouts {
        self.timeouts.into()
    }

    /// Names of fields whose change forces a replacement
    pub fn force_new_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.force_new)
            .map(|f| f.name.as_str())
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = ResourceConfig {
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: ResourceConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Get all resource keys, sorted
pub fn get_all_resource_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect();
    keys.sort_unstable();
    keys
}
