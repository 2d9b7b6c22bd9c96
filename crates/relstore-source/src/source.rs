//! Source: the public entry point of the update path.
//!
//! A [`Source`] owns a durable store and the in-memory [`SourceState`]. The
//! store sits behind a `tokio::sync::Mutex`, which doubles as the writer
//! queue: transforms run one at a time in lock order. The state sits behind a
//! `tokio::sync::RwLock`; a writer holds it for the whole apply-and-commit
//! step, so readers see either the state before a transform or the state
//! after it has been persisted, never anything in between.
//!
//! Nothing awaits between the first cache mutation and the end of the commit.
//! Dropping an `update` future can therefore only cancel a transform that has
//! not started.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use relstore_core::{
    Identity, IdentityMap, IntoOperations, Operation, Record, RecordCache, Schema, Transform,
    TransformBuilder, TransformOptions,
};
use relstore_storage::RecordStore;

use crate::config::SourceConfig;
use crate::coordinator::{self, SourceState};
use crate::error::SourceError;
use crate::hints::{resolve, FullResponse, Hints, UpdateOutcome};
use crate::observer::{ObserverList, UpdateObserver};

/// Transactional record source over a durable store.
pub struct Source<S: RecordStore> {
    schema: Arc<Schema>,
    config: SourceConfig,
    store: Mutex<S>,
    state: RwLock<SourceState>,
    observers: ObserverList,
}

impl<S: RecordStore> Source<S> {
    /// Validates `schema` and warm-loads every persisted record and key.
    pub fn open(schema: Schema, store: S, config: SourceConfig) -> Result<Self, SourceError> {
        schema.validate()?;
        let schema = Arc::new(schema);
        let state = load_state(&schema, &store)?;
        tracing::info!(
            records = state.cache.len(),
            keys = state.keys.len(),
            "opened record source"
        );
        Ok(Source {
            schema,
            config,
            store: Mutex::new(store),
            state: RwLock::new(state),
            observers: ObserverList::new(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    // ---------------------------------------------------------------------------
    // Updates
    // ---------------------------------------------------------------------------

    /// Builds a transform from `build` and applies it.
    ///
    /// `options` are layered over the defaults from [`SourceConfig`].
    pub async fn update<F, O>(
        &self,
        build: F,
        options: TransformOptions,
    ) -> Result<UpdateOutcome, SourceError>
    where
        F: FnOnce(&TransformBuilder) -> O,
        O: IntoOperations,
    {
        self.update_transform(Transform::build(build, options)).await
    }

    /// Applies a prebuilt transform.
    pub async fn update_transform(
        &self,
        mut transform: Transform,
    ) -> Result<UpdateOutcome, SourceError> {
        transform.options = transform
            .options
            .layered_over(&self.config.default_options());

        let observers = self.observers.snapshot();
        let mut hints = Hints::new();
        for observer in &observers {
            observer.before_update(&transform, &mut hints);
        }

        match self.commit(&transform, &hints).await {
            Ok((outcome, inverse_patches)) => {
                for observer in &observers {
                    observer.updated(&transform, &outcome, &inverse_patches);
                }
                Ok(outcome)
            }
            Err(e) => {
                for observer in &observers {
                    observer.update_failed(&transform, &e);
                }
                Err(e)
            }
        }
    }

    async fn commit(
        &self,
        transform: &Transform,
        hints: &Hints,
    ) -> Result<(UpdateOutcome, Vec<Operation>), SourceError> {
        let mut store = self.store.lock().await;
        let mut state = self.state.write().await;

        let report = coordinator::run(&mut state, &mut *store, transform)?;
        let data = resolve(hints, &report.results, &state.cache);
        let outcome = if transform.options.wants_full_response() {
            UpdateOutcome::Full(FullResponse {
                data,
                details: hints.details.clone(),
                transform: transform.clone(),
            })
        } else {
            UpdateOutcome::Data(data)
        };
        Ok((outcome, report.inverse_patches))
    }

    // ---------------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------------

    pub async fn get(&self, identity: &Identity) -> Option<Record> {
        self.state.read().await.cache.get(identity).cloned()
    }

    /// All records of one type, ordered by id.
    pub async fn get_all(&self, type_name: &str) -> Vec<Record> {
        self.state
            .read()
            .await
            .cache
            .records(type_name)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Looks a record up by secondary key.
    pub async fn find_by_key(&self, type_name: &str, key: &str, value: &str) -> Option<Record> {
        let state = self.state.read().await;
        let identity = state.keys.identity_for_key(type_name, key, value)?;
        state.cache.get(&identity).cloned()
    }

    /// The record a to-one relationship points at.
    pub async fn related_record(
        &self,
        identity: &Identity,
        relationship: &str,
    ) -> Result<Option<Record>, SourceError> {
        let state = self.state.read().await;
        let related = state.cache.related_record(identity, relationship)?;
        Ok(related.and_then(|r| state.cache.get(&r).cloned()))
    }

    /// The records a to-many relationship holds, in relationship order.
    pub async fn related_records(
        &self,
        identity: &Identity,
        relationship: &str,
    ) -> Result<Vec<Record>, SourceError> {
        let state = self.state.read().await;
        let related = state.cache.related_records(identity, relationship)?;
        Ok(related
            .iter()
            .filter_map(|r| state.cache.get(r).cloned())
            .collect())
    }

    pub async fn record_count(&self) -> usize {
        self.state.read().await.cache.len()
    }

    /// True if a transform with this id has been committed.
    pub async fn transform_log_contains(&self, id: &str) -> bool {
        self.state.read().await.log.contains(id)
    }

    // ---------------------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------------------

    /// Rebuilds the cache and the identity map from the durable store. The
    /// transform log is kept.
    pub async fn reload(&self) -> Result<(), SourceError> {
        let store = self.store.lock().await;
        let mut state = self.state.write().await;
        let fresh = load_state(&self.schema, &*store)?;
        state.cache = fresh.cache;
        state.keys = fresh.keys;
        tracing::info!(records = state.cache.len(), "reloaded record source");
        Ok(())
    }

    /// Clears the durable store, the cache, the identity map and the
    /// transform log.
    pub async fn reset(&self) -> Result<(), SourceError> {
        let mut store = self.store.lock().await;
        let mut state = self.state.write().await;
        store.clear()?;
        *state = SourceState::new(RecordCache::new(self.schema.clone()), IdentityMap::new());
        tracing::info!("reset record source");
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Observers
    // ---------------------------------------------------------------------------

    pub fn add_observer(&self, observer: Arc<dyn UpdateObserver>) {
        self.observers.add(observer);
    }

    /// Returns false if `observer` was not registered.
    pub fn remove_observer(&self, observer: &Arc<dyn UpdateObserver>) -> bool {
        self.observers.remove(observer)
    }
}

fn load_state<S: RecordStore + ?Sized>(
    schema: &Arc<Schema>,
    store: &S,
) -> Result<SourceState, SourceError> {
    let stored = store.load()?;
    let cache = RecordCache::with_records(schema.clone(), stored.records)?;
    let keys = IdentityMap::from_entries(stored.keys);
    Ok(SourceState::new(cache, keys))
}
