//! The entity store: one authoritative in-memory snapshot.
//!
//! ## Boot
//!
//! 1. [`EntityStore::open`] reads the fast-boot mirror synchronously. A
//!    readable mirror becomes the initial snapshot (possibly stale);
//!    otherwise schema defaults are used.
//! 2. [`EntityStore::reconcile`] reads the durable backend. A non-empty
//!    payload is merged over the defaults and replaces the snapshot, and
//!    the mirror is refreshed from it.
//!
//! Between the two steps callers see defaults or stale mirror data; after
//! reconcile they see the durable state.
//!
//! ## Mutation
//!
//! Every mutating call updates the snapshot under one lock, refreshes the
//! mirror under the [`MirrorPolicy`], and spawns a push of the entire
//! snapshot to the durable backend. Pushes are fire-and-forget: failures are
//! logged and the in-memory snapshot stays authoritative for the session.
//! Each push carries a generation number and a push older than one that
//! already landed is dropped, so the durable copy converges on the newest
//! snapshot whatever order the tasks run in.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{Result, StashError};
use crate::schema::{Schema, BACKUP_TIMESTAMP_KEY};
use crate::storage::mirror::{refresh_mirror, MirrorOutcome, MirrorPolicy};
use crate::storage::traits::{DurableBackend, FastBootMirror};
use crate::storage::types::{records_from_value, Fields, Record, Snapshot};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Where the current snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSource {
    Defaults,
    Mirror,
    Durable,
}

/// Process-wide notification for derived-state recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChanged {
    /// `import_all` replaced the collections
    Imported,
    /// `clear_all` reset everything to defaults
    Cleared,
}

struct State {
    snapshot: Snapshot,
    source: BootSource,
    policy: MirrorPolicy,
}

#[derive(Default)]
struct PushQueue {
    issued: AtomicU64,
    landed: tokio::sync::Mutex<u64>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

/// Coordinator over the in-memory snapshot, the durable backend and the
/// fast-boot mirror.
///
/// Construct one per process and share it by reference.
pub struct EntityStore<D: DurableBackend, M: FastBootMirror> {
    schema: Schema,
    state: Mutex<State>,
    durable: Arc<D>,
    mirror: M,
    pushes: Arc<PushQueue>,
    runtime: Handle,
    changes: broadcast::Sender<DataChanged>,
}

impl<D: DurableBackend, M: FastBootMirror> EntityStore<D, M> {
    /// Open the store from the mirror or schema defaults.
    ///
    /// # Errors
    ///
    /// Returns `StashError::Storage` when called outside a Tokio runtime.
    /// A corrupt mirror is not an error: it is logged, removed, and the
    /// defaults are used.
    pub fn open(schema: Schema, durable: D, mirror: M, policy: MirrorPolicy) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            StashError::Storage("Entity store must be opened inside a Tokio runtime".to_string())
        })?;
        let (snapshot, source) = initial_snapshot(&schema, &mirror, &policy);
        tracing::info!(source = ?source, "entity store opened");

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            schema,
            state: Mutex::new(State {
                snapshot,
                source,
                policy,
            }),
            durable: Arc::new(durable),
            mirror,
            pushes: Arc::new(PushQueue::default()),
            runtime,
            changes,
        })
    }

    /// [`open`](Self::open) followed by [`reconcile`](Self::reconcile).
    pub async fn boot(schema: Schema, durable: D, mirror: M, policy: MirrorPolicy) -> Result<Self> {
        let store = Self::open(schema, durable, mirror, policy)?;
        store.reconcile().await?;
        Ok(store)
    }

    /// Replace the snapshot with the durable state, if there is any.
    ///
    /// Load failures and corrupt payloads are logged and leave the current
    /// snapshot in place.
    pub async fn reconcile(&self) -> Result<BootSource> {
        let loaded = match self.durable.load().await {
            Ok(Some(value)) if !is_empty_object(&value) => value,
            Ok(_) => return self.boot_source(),
            Err(err) => {
                tracing::warn!(error = %err, "durable load failed; keeping current snapshot");
                return self.boot_source();
            }
        };
        let durable = match Snapshot::from_value(&loaded, &self.schema) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "durable payload corrupt; keeping current snapshot");
                return self.boot_source();
            }
        };

        let mut state = self.lock_state()?;
        state.snapshot = self.schema.defaults().merged_with(durable);
        state.source = BootSource::Durable;
        let payload = state.snapshot.to_canonical_json()?;
        refresh_mirror(&self.mirror, &state.policy, &payload);
        tracing::info!("entity store reconciled with durable backend");
        Ok(BootSource::Durable)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StashError::Storage("Entity store lock poisoned".to_string()))
    }

    /// Refresh the mirror and schedule a durable push for `state`.
    ///
    /// Runs while the caller still holds the state lock, so mirror writes
    /// and push generations follow mutation order.
    fn commit(&self, state: &State) -> Result<()> {
        let value = state.snapshot.to_value();
        let payload = serde_json::to_string(&value)?;
        refresh_mirror(&self.mirror, &state.policy, &payload);
        self.schedule_push(value);
        Ok(())
    }

    fn schedule_push(&self, value: Value) {
        let generation = self.pushes.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let durable = Arc::clone(&self.durable);
        let pushes = Arc::clone(&self.pushes);

        let task = self.runtime.spawn(async move {
            let mut landed = pushes.landed.lock().await;
            if *landed > generation {
                tracing::debug!(generation, landed = *landed, "dropping stale durable push");
                return;
            }
            match durable.save(value).await {
                Ok(()) => *landed = generation,
                Err(err) => {
                    tracing::warn!(generation, error = %err, "durable push failed");
                }
            }
        });

        match self.pushes.pending.lock() {
            Ok(mut pending) => {
                pending.retain(|task| !task.is_finished());
                pending.push(task);
            }
            Err(_) => tracing::warn!("push queue lock poisoned; push will not be awaited by flush"),
        }
    }

    /// Wait until every durable push issued so far has finished.
    pub async fn flush(&self) {
        loop {
            let tasks: Vec<JoinHandle<()>> = match self.pushes.pending.lock() {
                Ok(mut pending) => pending.drain(..).collect(),
                Err(_) => return,
            };
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(err) = task.await {
                    tracing::warn!(error = %err, "durable push task aborted");
                }
            }
        }
    }

    fn notify(&self, change: DataChanged) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    /// Receive [`DataChanged`] notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.changes.subscribe()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn boot_source(&self) -> Result<BootSource> {
        Ok(self.lock_state()?.source)
    }

    /// Cheap copy of the current snapshot.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.lock_state()?.snapshot.clone())
    }

    /// Canonical JSON of the current snapshot, as written to the mirror.
    pub fn canonical_json(&self) -> Result<String> {
        self.lock_state()?.snapshot.to_canonical_json()
    }

    pub fn mirror_policy(&self) -> Result<MirrorPolicy> {
        Ok(self.lock_state()?.policy)
    }

    /// Change the mirror policy and apply it to the current snapshot.
    pub fn set_mirror_policy(&self, policy: MirrorPolicy) -> Result<MirrorOutcome> {
        let mut state = self.lock_state()?;
        state.policy = policy;
        let payload = state.snapshot.to_canonical_json()?;
        Ok(refresh_mirror(&self.mirror, &state.policy, &payload))
    }

    // --- Collection operations ---

    /// Records of `collection` in insertion order.
    ///
    /// The returned list is a frozen view: later mutations never change it.
    /// Unknown collections list as empty.
    pub fn list(&self, collection: &str) -> Result<Arc<Vec<Record>>> {
        let state = self.lock_state()?;
        Ok(state
            .snapshot
            .collection(collection)
            .cloned()
            .unwrap_or_default())
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let state = self.lock_state()?;
        Ok(state
            .snapshot
            .collection(collection)
            .and_then(|records| records.iter().find(|record| record.id == id).cloned()))
    }

    /// Append a record with a generated id and fresh timestamps.
    ///
    /// # Errors
    ///
    /// Returns `StashError::NotFound` for a collection the schema does not
    /// know.
    pub fn create(&self, collection: &str, partial: Fields) -> Result<Record> {
        let mut state = self.lock_state()?;
        let records = collection_mut(&mut state.snapshot, collection)?;
        let record = Record::new(partial);
        Arc::make_mut(records).push(record.clone());
        self.commit(&state)?;
        Ok(record)
    }

    /// Append several records with a single push.
    pub fn bulk_create(&self, collection: &str, partials: Vec<Fields>) -> Result<Vec<Record>> {
        let mut state = self.lock_state()?;
        let records = collection_mut(&mut state.snapshot, collection)?;
        if partials.is_empty() {
            return Ok(Vec::new());
        }
        let created: Vec<Record> = partials.into_iter().map(Record::new).collect();
        Arc::make_mut(records).extend(created.iter().cloned());
        self.commit(&state)?;
        Ok(created)
    }

    /// Merge `partial` into the record and bump its `updated_date`.
    ///
    /// # Errors
    ///
    /// Returns `StashError::NotFound` if the collection or id is unknown.
    pub fn update(&self, collection: &str, id: &str, partial: Fields) -> Result<Record> {
        let mut state = self.lock_state()?;
        let records = collection_mut(&mut state.snapshot, collection)?;
        let index = records
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| StashError::NotFound(format!("record {} in {}", id, collection)))?;
        let records = Arc::make_mut(records);
        records[index].merge(partial);
        let updated = records[index].clone();
        self.commit(&state)?;
        Ok(updated)
    }

    /// Remove a record. Unknown ids and collections are a no-op.
    pub fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut state = self.lock_state()?;
        let Some(records) = state.snapshot.collections.get_mut(collection) else {
            return Ok(());
        };
        if !records.iter().any(|record| record.id == id) {
            return Ok(());
        }
        Arc::make_mut(records).retain(|record| record.id != id);
        self.commit(&state)
    }

    // --- Scalar operations ---

    /// Value under `key`: a scalar, or a collection rendered as an array.
    pub fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock_state()?.snapshot.get(key))
    }

    /// Store a scalar.
    ///
    /// # Errors
    ///
    /// Returns `StashError::InvalidInput` if `key` names a collection.
    pub fn set_item(&self, key: &str, value: Value) -> Result<()> {
        self.reject_collection_key(key)?;
        let mut state = self.lock_state()?;
        state.snapshot.scalars.insert(key.to_string(), value);
        self.commit(&state)
    }

    pub fn remove_item(&self, key: &str) -> Result<()> {
        self.reject_collection_key(key)?;
        let mut state = self.lock_state()?;
        if state.snapshot.scalars.remove(key).is_none() {
            return Ok(());
        }
        self.commit(&state)
    }

    fn reject_collection_key(&self, key: &str) -> Result<()> {
        if self.schema.has_collection(key) {
            return Err(StashError::InvalidInput(format!(
                "{} is a collection, not a scalar key",
                key
            )));
        }
        Ok(())
    }

    // --- Bulk operations ---

    /// Replace every known collection from a backup object.
    ///
    /// Collections missing from `data` fall back to their schema defaults.
    /// Metadata keys present in `data` are applied; absent ones keep their
    /// current value. Unknown keys are ignored. Emits
    /// [`DataChanged::Imported`].
    ///
    /// # Errors
    ///
    /// Returns `StashError::InvalidInput` if `data` is not an object and
    /// `StashError::Validation` if a collection is not an array of objects
    /// or repeats a record id; nothing is changed in either case.
    pub fn import_all(&self, data: &Value) -> Result<()> {
        let object = data.as_object().ok_or_else(|| {
            StashError::InvalidInput("Import data must be a JSON object".to_string())
        })?;

        let mut replacements = Vec::new();
        for name in self.schema.collection_names() {
            let records = match object.get(name) {
                Some(value) => parse_collection(name, value)?,
                None => self.schema.default_records(name),
            };
            replacements.push((name.to_string(), records));
        }
        let metadata: Vec<(String, Value)> = self
            .schema
            .metadata_keys()
            .filter_map(|key| object.get(key).map(|value| (key.to_string(), value.clone())))
            .collect();

        let ignored = object
            .keys()
            .filter(|key| !self.schema.has_collection(key) && !self.schema.is_metadata_key(key))
            .count();
        if ignored > 0 {
            tracing::debug!(ignored, "import ignored unknown keys");
        }

        {
            let mut state = self.lock_state()?;
            for (name, records) in replacements {
                state.snapshot.collections.insert(name, Arc::new(records));
            }
            for (key, value) in metadata {
                state.snapshot.scalars.insert(key, value);
            }
            self.commit(&state)?;
        }
        self.notify(DataChanged::Imported);
        Ok(())
    }

    /// Import only the keys in `allowed_keys` that `data` contains.
    ///
    /// Collection keys replace the collection; other keys are stored as
    /// scalars.
    pub fn import_subset(&self, data: &Value, allowed_keys: &[&str]) -> Result<()> {
        let object = data.as_object().ok_or_else(|| {
            StashError::InvalidInput("Import data must be a JSON object".to_string())
        })?;

        let mut collections = Vec::new();
        let mut scalars = Vec::new();
        for key in allowed_keys {
            let Some(value) = object.get(*key) else {
                continue;
            };
            if self.schema.has_collection(key) {
                collections.push((key.to_string(), parse_collection(key, value)?));
            } else {
                scalars.push((key.to_string(), value.clone()));
            }
        }
        if collections.is_empty() && scalars.is_empty() {
            return Ok(());
        }

        let mut state = self.lock_state()?;
        for (name, records) in collections {
            state.snapshot.collections.insert(name, Arc::new(records));
        }
        for (key, value) in scalars {
            state.snapshot.scalars.insert(key, value);
        }
        self.commit(&state)
    }

    /// Object of the requested keys that exist.
    pub fn export_subset(&self, allowed_keys: &[&str]) -> Result<Value> {
        let state = self.lock_state()?;
        let mut object = Map::new();
        for key in allowed_keys {
            if let Some(value) = state.snapshot.get(key) {
                object.insert(key.to_string(), value);
            }
        }
        Ok(Value::Object(object))
    }

    /// Full backup object: every collection plus the metadata keys.
    ///
    /// Stamps `backup_timestamp` with the current time first.
    pub fn export_all(&self) -> Result<Value> {
        let mut state = self.lock_state()?;
        state.snapshot.scalars.insert(
            BACKUP_TIMESTAMP_KEY.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        self.commit(&state)?;

        let mut object = Map::new();
        for name in self.schema.collection_names() {
            if let Some(value) = state.snapshot.get(name) {
                object.insert(name.to_string(), value);
            }
        }
        for key in self.schema.metadata_keys() {
            if let Some(value) = state.snapshot.scalar(key) {
                object.insert(key.to_string(), value.clone());
            }
        }
        Ok(Value::Object(object))
    }

    /// Reset to schema defaults (seeded records included, not empty).
    ///
    /// Emits [`DataChanged::Cleared`].
    pub fn clear_all(&self) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            state.snapshot = self.schema.defaults();
            self.commit(&state)?;
        }
        self.notify(DataChanged::Cleared);
        Ok(())
    }
}

fn initial_snapshot<M: FastBootMirror>(
    schema: &Schema,
    mirror: &M,
    policy: &MirrorPolicy,
) -> (Snapshot, BootSource) {
    let defaults = schema.defaults();
    if !policy.enabled {
        return (defaults, BootSource::Defaults);
    }
    match mirror.read() {
        Ok(Some(text)) => match Snapshot::from_json(&text, schema) {
            Ok(cached) => (defaults.merged_with(cached), BootSource::Mirror),
            Err(err) => {
                tracing::warn!(error = %err, "mirror corrupt; booting from defaults");
                if let Err(err) = mirror.remove() {
                    tracing::warn!(error = %err, "failed to remove corrupt mirror");
                }
                (defaults, BootSource::Defaults)
            }
        },
        Ok(None) => (defaults, BootSource::Defaults),
        Err(err) => {
            tracing::warn!(error = %err, "mirror unreadable; booting from defaults");
            (defaults, BootSource::Defaults)
        }
    }
}

fn collection_mut<'a>(
    snapshot: &'a mut Snapshot,
    name: &str,
) -> Result<&'a mut Arc<Vec<Record>>> {
    snapshot
        .collections
        .get_mut(name)
        .ok_or_else(|| StashError::not_found("collection", name))
}

/// Parse an imported collection. Ids must be unique within it.
fn parse_collection(name: &str, value: &Value) -> Result<Vec<Record>> {
    let records = records_from_value(value)
        .map_err(|e| StashError::Validation(format!("{}: {}", name, e)))?;
    let mut seen = HashSet::with_capacity(records.len());
    for record in &records {
        if !seen.insert(record.id.as_str()) {
            return Err(StashError::Validation(format!(
                "{}: duplicate record id {}",
                name, record.id
            )));
        }
    }
    Ok(records)
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}
