//! Collection schema and first-boot defaults.
//!
//! The schema names every collection the entity store knows about, the
//! records seeded into them on first boot, and the metadata scalars that
//! travel with a backup.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::storage::types::{Record, Snapshot};

/// Scalar key holding the time of the last export.
pub const BACKUP_TIMESTAMP_KEY: &str = "backup_timestamp";

/// Scalar key holding the date of the last periodic recap.
pub const RECAP_DATE_KEY: &str = "recap_date";

/// Scalar key holding the active theme name.
pub const ACTIVE_THEME_KEY: &str = "active_theme";

/// Known collections, their seeds, and the backup metadata keys.
#[derive(Debug, Clone)]
pub struct Schema {
    collections: BTreeMap<String, Vec<Value>>,
    metadata_keys: Vec<String>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn metadata_keys(&self) -> impl Iterator<Item = &str> {
        self.metadata_keys.iter().map(String::as_str)
    }

    pub fn is_metadata_key(&self, key: &str) -> bool {
        self.metadata_keys.iter().any(|k| k == key)
    }

    /// Fresh records for one collection: its seeds, or empty.
    pub fn default_records(&self, name: &str) -> Vec<Record> {
        self.collections
            .get(name)
            .map(|seeds| {
                seeds
                    .iter()
                    .filter_map(|seed| Record::from_value(seed).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The snapshot a brand-new install starts from.
    ///
    /// Seeds carry fixed ids, so materialising defaults twice yields the
    /// same records apart from timestamps.
    pub fn defaults(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for name in self.collections.keys() {
            snapshot
                .collections
                .insert(name.clone(), Arc::new(self.default_records(name)));
        }
        snapshot
    }
}

impl Default for Schema {
    /// Collections of the personal data manager.
    fn default() -> Self {
        Schema::builder()
            .collection("accounts")
            .collection("transactions")
            .collection("budgets")
            .collection("goals")
            .collection("subscriptions")
            .collection("credentials")
            .collection("documents")
            .seeded(
                "settings",
                vec![json!({
                    "id": "default-settings",
                    "currency": "USD",
                    "startup_cache": true,
                })],
            )
            .metadata_key(BACKUP_TIMESTAMP_KEY)
            .metadata_key(RECAP_DATE_KEY)
            .metadata_key(ACTIVE_THEME_KEY)
            .build()
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    collections: BTreeMap<String, Vec<Value>>,
    metadata_keys: Vec<String>,
}

impl SchemaBuilder {
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collections.entry(name.into()).or_default();
        self
    }

    pub fn seeded(mut self, name: impl Into<String>, seeds: Vec<Value>) -> Self {
        self.collections.insert(name.into(), seeds);
        self
    }

    pub fn metadata_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.metadata_keys.contains(&key) {
            self.metadata_keys.push(key);
        }
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            collections: self.collections,
            metadata_keys: self.metadata_keys,
        }
    }
}
