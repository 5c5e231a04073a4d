//! Persistence gateway over a host-provided key/value store.
//!
//! Two keys are used: `bookmarks` (the ordered record list as JSON) and
//! `schemaVersion` (an integer, currently 2). The gateway is the sole
//! writer of persisted state. Writes are queued and coalesced inside a
//! short window; `flush_pending` and the immediate-save path exist for
//! callers that need durability before returning, and shutdown must flush.
//!
//! On first access, a stored schema version older than the current one
//! triggers the migration hook over the raw record values before anything
//! is deserialized.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::{
    clock::Clock,
    config::EngineConfig,
    error::{EngineError, FieldError},
    record::{is_valid_hex_color, validate_record, HighlightRecord, Platform},
};

/// Key holding the ordered highlight record list.
pub const BOOKMARKS_KEY: &str = "bookmarks";
/// Key holding the schema version integer.
pub const SCHEMA_VERSION_KEY: &str = "schemaVersion";
/// The schema version this build reads and writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Errors a key/value backend may raise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// A compare-and-swap capable backend lost a write race.
    #[error("write conflict on key {0:?}")]
    Conflict(String),
}

/// The asynchronous key/value capability the host provides.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError>;
}

/// In-memory store, used in tests and as a default for embedders without
/// persistence.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<std::collections::BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .data
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut data = self
            .data
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        for (key, value) in entries {
            data.insert(key, value);
        }
        Ok(())
    }
}

/// Record filter; every set field must match.
#[derive(Debug, Clone, Default)]
pub struct HighlightFilter {
    pub conversation_id: Option<String>,
    pub platform: Option<Platform>,
    /// Any-of semantics: one shared tag suffices.
    pub tags: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring over the note and the selected text.
    pub substring: Option<String>,
}

impl HighlightFilter {
    pub fn conversation(id: &str) -> Self {
        Self {
            conversation_id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &HighlightRecord) -> bool {
        if let Some(conversation_id) = &self.conversation_id {
            if &record.conversation_id != conversation_id {
                return false;
            }
        }
        if let Some(platform) = &self.platform {
            if &record.platform != platform {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !tags.iter().any(|t| record.tags.contains(t)) {
                return false;
            }
        }
        if let Some(after) = &self.created_after {
            match record.created_at() {
                Some(created) if created >= *after => {}
                _ => return false,
            }
        }
        if let Some(before) = &self.created_before {
            match record.created_at() {
                Some(created) if created <= *before => {}
                _ => return false,
            }
        }
        if let Some(needle) = &self.substring {
            let needle = needle.to_lowercase();
            let in_note = record.note.to_lowercase().contains(&needle);
            let in_text = record
                .anchor
                .selected_text
                .to_lowercase()
                .contains(&needle);
            if !in_note && !in_text {
                return false;
            }
        }
        true
    }
}

/// The fields `update_highlight` is allowed to merge. Everything else
/// (identity, anchor, created) is immutable after creation.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatch {
    pub note: Option<String>,
    pub tags: Option<Vec<String>>,
    pub color: Option<String>,
}

/// Hook run over the raw record values when the stored schema version is
/// older than `CURRENT_SCHEMA_VERSION`.
pub type MigrationHook = Box<dyn Fn(u32, u32, &mut Vec<Value>) + Send + Sync>;

/// Version 1 stored `tags` as one comma-joined string and had no `color`
/// field; normalize both.
pub fn default_migration(from: u32, _to: u32, records: &mut Vec<Value>) {
    if from >= 2 {
        return;
    }
    for record in records {
        let Some(map) = record.as_object_mut() else {
            continue;
        };
        if let Some(Value::String(joined)) = map.get("tags").cloned() {
            let tags: Vec<Value> = joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            map.insert("tags".to_string(), Value::Array(tags));
        }
        map.entry("color").or_insert(Value::Null);
    }
}

struct PendingWrite {
    queued_at_ms: u64,
    coalesced: usize,
}

/// Authoritative owner of persisted highlight state.
pub struct StorageGateway {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    batch_window_ms: u64,
    max_batch_size: usize,
    migration: MigrationHook,
    cache: Option<Vec<HighlightRecord>>,
    pending: Option<PendingWrite>,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self::with_migration(store, clock, config, Box::new(default_migration))
    }

    pub fn with_migration(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
        migration: MigrationHook,
    ) -> Self {
        Self {
            store,
            clock,
            batch_window_ms: config.batch_window_ms,
            max_batch_size: config.max_batch_size,
            migration,
            cache: None,
            pending: None,
        }
    }

    /// Validates and upserts a record: replaced in place when the id
    /// exists, appended otherwise. `updated` is bumped either way. The
    /// write is queued into the coalescing window.
    pub async fn save_highlight(&mut self, record: HighlightRecord) -> Result<(), EngineError> {
        self.save_inner(record, false).await
    }

    /// Like `save_highlight` but durable before returning.
    pub async fn save_highlight_now(&mut self, record: HighlightRecord) -> Result<(), EngineError> {
        self.save_inner(record, true).await
    }

    async fn save_inner(
        &mut self,
        mut record: HighlightRecord,
        immediate: bool,
    ) -> Result<(), EngineError> {
        validate_record(&record).map_err(EngineError::ValidationFailed)?;
        self.ensure_loaded().await?;
        record.updated = self.clock.now_iso8601();

        let records = self.cache.get_or_insert_with(Vec::new);
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }

        if immediate {
            self.flush_pending().await
        } else {
            self.enqueue_write().await
        }
    }

    /// Owned copies of the stored records, optionally filtered.
    pub async fn get_highlights(
        &mut self,
        filter: Option<&HighlightFilter>,
    ) -> Result<Vec<HighlightRecord>, EngineError> {
        self.ensure_loaded().await?;
        let records = self.cache.get_or_insert_with(Vec::new);
        Ok(match filter {
            Some(filter) => records.iter().filter(|r| filter.matches(r)).cloned().collect(),
            None => records.clone(),
        })
    }

    /// Merges the allowed fields into the record and bumps `updated`.
    /// Identity, anchor and `created` are never touched.
    pub async fn update_highlight(
        &mut self,
        id: &str,
        patch: UpdatePatch,
    ) -> Result<HighlightRecord, EngineError> {
        if let Some(color) = &patch.color {
            if !is_valid_hex_color(color) {
                return Err(EngineError::ValidationFailed(vec![FieldError {
                    field: "color",
                    message: format!("{:?} is not a # hex color", color),
                }]));
            }
        }
        self.ensure_loaded().await?;
        let now = self.clock.now_iso8601();
        let records = self.cache.get_or_insert_with(Vec::new);
        let record = records.iter_mut().find(|r| r.id == id).ok_or_else(|| {
            EngineError::ValidationFailed(vec![FieldError {
                field: "id",
                message: format!("no highlight with id {:?}", id),
            }])
        })?;

        if let Some(note) = patch.note {
            record.note = note;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }
        if let Some(color) = patch.color {
            record.color = Some(color);
        }
        record.updated = now;
        let updated = record.clone();

        self.enqueue_write().await?;
        Ok(updated)
    }

    /// Removes a record. A missing id is a no-op reported as `false`.
    pub async fn delete_highlight(&mut self, id: &str) -> Result<bool, EngineError> {
        self.ensure_loaded().await?;
        let records = self.cache.get_or_insert_with(Vec::new);
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.enqueue_write().await?;
        Ok(true)
    }

    /// Number of stored records matching the filter.
    pub async fn count(&mut self, filter: Option<&HighlightFilter>) -> Result<usize, EngineError> {
        Ok(self.get_highlights(filter).await?.len())
    }

    /// Removes every record and reports how many were dropped.
    pub async fn clear(&mut self) -> Result<usize, EngineError> {
        self.ensure_loaded().await?;
        let records = self.cache.get_or_insert_with(Vec::new);
        let dropped = records.len();
        records.clear();
        self.flush_pending().await?;
        Ok(dropped)
    }

    /// The distinct tag set across all stored records, sorted.
    pub async fn all_tags(&mut self) -> Result<Vec<String>, EngineError> {
        self.ensure_loaded().await?;
        let records = self.cache.get_or_insert_with(Vec::new);
        let mut tags: Vec<String> = records
            .iter()
            .flat_map(|r| r.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    /// The schema version currently persisted (after migration).
    pub async fn schema_version(&mut self) -> Result<u32, EngineError> {
        self.ensure_loaded().await?;
        let value = self
            .store
            .get(SCHEMA_VERSION_KEY)
            .await
            .map_err(map_store_error)?;
        Ok(value
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(CURRENT_SCHEMA_VERSION))
    }

    pub async fn set_schema_version(&mut self, version: u32) -> Result<(), EngineError> {
        self.store
            .set(vec![(SCHEMA_VERSION_KEY.to_string(), Value::from(version))])
            .await
            .map_err(map_store_error)
    }

    /// Whether a coalesced write is still queued.
    pub fn has_pending_writes(&self) -> bool {
        self.pending.is_some()
    }

    /// Writes the cached record list to the backing store. Every queued
    /// write becomes visible to `get` afterwards; call on shutdown.
    pub async fn flush_pending(&mut self) -> Result<(), EngineError> {
        self.ensure_loaded().await?;
        self.pending = None;
        let records = self.cache.get_or_insert_with(Vec::new);
        let value = serde_json::to_value(records)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        self.store
            .set(vec![(BOOKMARKS_KEY.to_string(), value)])
            .await
            .map_err(map_store_error)
    }

    /// Queues a write of the current list. Within the coalescing window a
    /// later write replaces the earlier one; the queue drains when the
    /// window elapses or `max_batch_size` writes have coalesced.
    async fn enqueue_write(&mut self) -> Result<(), EngineError> {
        let now = self.clock.monotonic_ms();
        let flush = match &mut self.pending {
            Some(pending) => {
                pending.coalesced += 1;
                pending.coalesced >= self.max_batch_size
                    || now.saturating_sub(pending.queued_at_ms) >= self.batch_window_ms
            }
            None => {
                self.pending = Some(PendingWrite {
                    queued_at_ms: now,
                    coalesced: 1,
                });
                false
            }
        };
        if flush {
            log::trace!("write queue draining");
            self.flush_pending().await
        } else {
            Ok(())
        }
    }

    async fn ensure_loaded(&mut self) -> Result<(), EngineError> {
        if self.cache.is_some() {
            return Ok(());
        }

        let stored_version = self
            .store
            .get(SCHEMA_VERSION_KEY)
            .await
            .map_err(map_store_error)?
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);

        let raw = self
            .store
            .get(BOOKMARKS_KEY)
            .await
            .map_err(map_store_error)?;
        let mut values: Vec<Value> = match raw {
            Some(Value::Array(values)) => values,
            Some(other) => {
                log::warn!("bookmarks key held {} instead of a list", other);
                Vec::new()
            }
            None => Vec::new(),
        };

        match stored_version {
            Some(version) if version < CURRENT_SCHEMA_VERSION => {
                log::debug!(
                    "migrating stored records from schema {} to {}",
                    version,
                    CURRENT_SCHEMA_VERSION
                );
                (self.migration)(version, CURRENT_SCHEMA_VERSION, &mut values);
                self.store
                    .set(vec![
                        (BOOKMARKS_KEY.to_string(), Value::Array(values.clone())),
                        (
                            SCHEMA_VERSION_KEY.to_string(),
                            Value::from(CURRENT_SCHEMA_VERSION),
                        ),
                    ])
                    .await
                    .map_err(map_store_error)?;
            }
            None => {
                // fresh store; stamp the current version
                self.store
                    .set(vec![(
                        SCHEMA_VERSION_KEY.to_string(),
                        Value::from(CURRENT_SCHEMA_VERSION),
                    )])
                    .await
                    .map_err(map_store_error)?;
            }
            Some(_) => {}
        }

        let mut records = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<HighlightRecord>(value) {
                Ok(record) => records.push(record),
                Err(err) => log::warn!("skipping undecodable stored record: {}", err),
            }
        }
        self.cache = Some(records);
        Ok(())
    }
}

fn map_store_error(err: StoreError) -> EngineError {
    match err {
        StoreError::Unavailable(msg) => EngineError::StorageUnavailable(msg),
        StoreError::Conflict(key) => EngineError::ConcurrentModification { key },
    }
}
