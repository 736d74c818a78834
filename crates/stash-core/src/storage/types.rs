//! Core data types for the entity snapshot.
//!
//! A snapshot is one JSON object: every collection name maps to an array of
//! records, every other key is a schemaless scalar.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, StashError};
use crate::schema::Schema;

/// Free-form record fields.
pub type Fields = Map<String, Value>;

/// Keys owned by the store; callers cannot set them through a partial.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "created_date", "updated_date"];

/// A record in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique within its collection, stable for the record's lifetime
    pub id: String,

    /// When this record was created
    pub created_date: DateTime<Utc>,

    /// Last update; strictly increases on every update
    pub updated_date: DateTime<Utc>,

    /// Everything else
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    /// Build a fresh record with a generated id and both timestamps set to now.
    pub fn new(partial: Fields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_date: now,
            updated_date: now,
            fields: without_reserved(partial),
        }
    }

    /// Parse a record leniently.
    ///
    /// Missing ids are generated, numeric ids are stringified, missing or
    /// unreadable timestamps fall back to now (or to `created_date` for
    /// `updated_date`).
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| StashError::Validation("Record must be a JSON object".to_string()))?;

        let id = match object.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let created_date = object
            .get("created_date")
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let updated_date = object
            .get("updated_date")
            .and_then(parse_timestamp)
            .filter(|updated| *updated >= created_date)
            .unwrap_or(created_date);

        Ok(Self {
            id,
            created_date,
            updated_date,
            fields: without_reserved(object.clone()),
        })
    }

    /// Look up a free-form field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Merge `partial` into the fields and bump `updated_date`.
    pub(crate) fn merge(&mut self, partial: Fields) {
        for (key, value) in without_reserved(partial) {
            self.fields.insert(key, value);
        }
        self.updated_date = next_timestamp(self.updated_date);
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert(
            "created_date".to_string(),
            serde_json::to_value(self.created_date).unwrap_or(Value::Null),
        );
        object.insert(
            "updated_date".to_string(),
            serde_json::to_value(self.updated_date).unwrap_or(Value::Null),
        );
        Value::Object(object)
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn without_reserved(mut fields: Fields) -> Fields {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }
    fields
}

/// Now, or the smallest step past `previous` when the clock has not advanced.
pub(crate) fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

/// Parse a JSON array of records.
pub fn records_from_value(value: &Value) -> Result<Vec<Record>> {
    let items = value
        .as_array()
        .ok_or_else(|| StashError::Validation("Collection must be a JSON array".to_string()))?;
    items.iter().map(Record::from_value).collect()
}

/// The whole data set held by the entity store.
///
/// Collections sit behind `Arc` so a list handed to a caller stays a frozen
/// view: writers go through `Arc::make_mut`, which clones the vector when
/// anyone else still holds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub(crate) collections: BTreeMap<String, Arc<Vec<Record>>>,
    pub(crate) scalars: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Parse a persisted snapshot against `schema`.
    ///
    /// Keys naming a schema collection are read as record arrays; a
    /// collection that cannot be read is dropped with a warning so the
    /// schema default takes its place after merging. All other keys are
    /// scalars.
    ///
    /// # Errors
    ///
    /// Returns `StashError::Corrupt` if the payload is not a JSON object.
    pub fn from_value(value: &Value, schema: &Schema) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| StashError::Corrupt("Snapshot is not a JSON object".to_string()))?;

        let mut snapshot = Snapshot::default();
        for (key, entry) in object {
            if schema.has_collection(key) {
                match records_from_value(entry) {
                    Ok(records) => {
                        snapshot.collections.insert(key.clone(), Arc::new(records));
                    }
                    Err(err) => {
                        tracing::warn!(
                            collection = %key,
                            error = %err,
                            "skipping unreadable collection"
                        );
                    }
                }
            } else {
                snapshot.scalars.insert(key.clone(), entry.clone());
            }
        }
        Ok(snapshot)
    }

    /// Parse the JSON text of a persisted snapshot.
    pub fn from_json(text: &str, schema: &Schema) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| StashError::Corrupt(format!("Snapshot is not valid JSON: {}", e)))?;
        Self::from_value(&value, schema)
    }

    /// Overlay `other` on `self`; keys present in `other` win.
    pub fn merged_with(mut self, other: Snapshot) -> Self {
        self.collections.extend(other.collections);
        self.scalars.extend(other.scalars);
        self
    }

    pub fn collection(&self, name: &str) -> Option<&Arc<Vec<Record>>> {
        self.collections.get(name)
    }

    pub fn scalar(&self, key: &str) -> Option<&Value> {
        self.scalars.get(key)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Value stored under `key`, whether collection or scalar.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(records) = self.collections.get(key) {
            return Some(Value::Array(records.iter().map(Record::to_value).collect()));
        }
        self.scalars.get(key).cloned()
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        for (name, records) in &self.collections {
            object.insert(
                name.clone(),
                Value::Array(records.iter().map(Record::to_value).collect()),
            );
        }
        for (key, value) in &self.scalars {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    /// Canonical JSON text: keys sorted, no whitespace.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder().collection("accounts").build()
    }

    #[test]
    fn test_new_record_strips_reserved_fields() {
        let partial = json!({"id": "mine", "created_date": "x", "name": "Checking"});
        let record = Record::new(partial.as_object().unwrap().clone());

        assert_ne!(record.id, "mine");
        assert_eq!(record.created_date, record.updated_date);
        assert_eq!(record.get("name"), Some(&json!("Checking")));
        assert!(record.get("created_date").is_none());
    }

    #[test]
    fn test_record_serde_flattens_fields() {
        let record = Record::new(json!({"balance": 10}).as_object().unwrap().clone());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["balance"], json!(10));
        assert_eq!(value["id"], json!(record.id));

        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_from_value_is_lenient() {
        let record = Record::from_value(&json!({"id": 42, "name": "x"})).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.created_date, record.updated_date);

        let generated = Record::from_value(&json!({"name": "y"})).unwrap();
        assert!(!generated.id.is_empty());

        assert!(Record::from_value(&json!("nope")).is_err());
    }

    #[test]
    fn test_merge_bumps_updated_date() {
        let mut record = Record::new(Fields::new());
        let before = record.updated_date;

        record.merge(json!({"a": 1, "id": "hijack"}).as_object().unwrap().clone());

        assert!(record.updated_date > before);
        assert_ne!(record.id, "hijack");
        assert_eq!(record.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_next_timestamp_strictly_increases() {
        let future = Utc::now() + chrono::Duration::seconds(60);
        assert!(next_timestamp(future) > future);
    }

    #[test]
    fn test_snapshot_splits_collections_and_scalars() {
        let value = json!({
            "accounts": [{"id": "a1", "name": "Checking"}],
            "active_theme": "dark",
        });
        let snapshot = Snapshot::from_value(&value, &schema()).unwrap();

        assert_eq!(snapshot.collection("accounts").unwrap().len(), 1);
        assert_eq!(snapshot.scalar("active_theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_snapshot_rejects_non_object() {
        let result = Snapshot::from_json("[1, 2]", &schema());
        assert!(matches!(result, Err(StashError::Corrupt(_))));

        let result = Snapshot::from_json("{not json", &schema());
        assert!(matches!(result, Err(StashError::Corrupt(_))));
    }

    #[test]
    fn test_canonical_json_round_trips() {
        let value = json!({
            "accounts": [{"id": "a1", "name": "Checking"}],
            "recap_date": "2026-01-01",
        });
        let snapshot = Snapshot::from_value(&value, &schema()).unwrap();
        let text = snapshot.to_canonical_json().unwrap();
        let again = Snapshot::from_json(&text, &schema()).unwrap();

        assert_eq!(again, snapshot);
        assert_eq!(again.to_canonical_json().unwrap(), text);
    }
}
