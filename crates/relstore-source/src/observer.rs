//! Update lifecycle observers.
//!
//! Observers are registered on a [`Source`](crate::Source) and called in
//! registration order. `before_update` is the interception point: it runs
//! before any mutation and may fill in the [`Hints`] bundle. `updated` runs
//! after a successful commit and `update_failed` on every failure path.

use std::sync::{Arc, PoisonError, RwLock};

use relstore_core::{Operation, Transform};

use crate::error::SourceError;
use crate::hints::{Hints, UpdateOutcome};

/// Receives update lifecycle notifications. Every method defaults to a no-op.
pub trait UpdateObserver: Send + Sync {
    /// Called before the transform is applied.
    fn before_update(&self, _transform: &Transform, _hints: &mut Hints) {}

    /// Called after the transform committed, with the resolved outcome and
    /// the inverse adjustments made to other records.
    fn updated(
        &self,
        _transform: &Transform,
        _outcome: &UpdateOutcome,
        _inverse_patches: &[Operation],
    ) {
    }

    /// Called when the transform was rejected or failed to persist.
    fn update_failed(&self, _transform: &Transform, _error: &SourceError) {}
}

/// Observer built from a `before_update` closure.
struct BeforeUpdateFn<F>(F);

impl<F> UpdateObserver for BeforeUpdateFn<F>
where
    F: Fn(&Transform, &mut Hints) + Send + Sync,
{
    fn before_update(&self, transform: &Transform, hints: &mut Hints) {
        (self.0)(transform, hints)
    }
}

/// Wraps a closure as an observer that only intercepts `before_update`.
pub fn on_before_update<F>(hook: F) -> Arc<dyn UpdateObserver>
where
    F: Fn(&Transform, &mut Hints) + Send + Sync + 'static,
{
    Arc::new(BeforeUpdateFn(hook))
}

/// Ordered list of registered observers.
#[derive(Default)]
pub struct ObserverList {
    observers: RwLock<Vec<Arc<dyn UpdateObserver>>>,
}

impl ObserverList {
    pub fn new() -> Self {
        ObserverList::default()
    }

    pub fn add(&self, observer: Arc<dyn UpdateObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Removes a previously added observer. Returns false if it was not registered.
    pub fn remove(&self, observer: &Arc<dyn UpdateObserver>) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current observers, so callbacks run without the list locked.
    pub fn snapshot(&self) -> Vec<Arc<dyn UpdateObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
