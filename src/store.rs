//! # Lazy Store Module
//!
//! Implements [`LazyStore`], the dependency-graph computation cache that backs
//! page resolution.
//!
//! ## Overview
//!
//! A `LazyStore` holds named values that are either literals or derived from
//! previously declared keys through an async producer function. Nothing is
//! computed at declaration time; reading a key evaluates exactly the
//! not-yet-evaluated portion of its precursor closure, in dependency order,
//! and nothing else. Producers may perform network I/O (they typically drive
//! the request gateway), which makes the store the laziness boundary that
//! prevents unnecessary requests.
//!
//! ## Key Properties
//!
//! - **Acyclic by construction**: a derived key may only name precursors that
//!   already exist, so forward references (and therefore cycles) are rejected
//!   up front.
//! - **At-most-once evaluation**: a materialized entry's producer runs at most
//!   once per store instance; non-materialized entries recompute on every
//!   access and retain nothing (used for cheap projections of larger values).
//! - **Sequential evaluation**: reads serialize on an internal async mutex, so
//!   evaluation order within one store is a deterministic topological walk.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wikigraph::{LazyStore, StoreMode};
//!
//! let store = LazyStore::new(StoreMode::Safe);
//! store.insert("base", 2u32)?;
//! store.derive("double", &["base"], true, |inputs| {
//!     Box::pin(async move {
//!         let base = inputs.value::<u32>("base")?;
//!         Ok(LazyStore::wrap(*base * 2))
//!     })
//! })?;
//! assert_eq!(store.get::<u32>("double").await?, 4);
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::WikiError;

/// A type-erased, shareable store value.
pub type DynValue = Arc<dyn Any + Send + Sync>;

/// Boxed async producer: receives its precursor values, returns the entry value.
pub type Producer =
    Arc<dyn Fn(Inputs) -> BoxFuture<'static, Result<DynValue, WikiError>> + Send + Sync>;

/// Redeclaration policy for a store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Redeclaring an existing key fails with [`WikiError::DuplicateKey`].
    Safe,
    /// Redeclaration replaces the previous entry and discards its value.
    Unsafe,
}

/// The precursor values handed to a producer, keyed by precursor name.
pub struct Inputs {
    values: HashMap<String, DynValue>,
}

impl Inputs {
    /// Returns the named precursor value, downcast to `T`.
    pub fn value<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, WikiError> {
        let raw = self
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| WikiError::UnknownKey(key.to_string()))?;
        raw.downcast::<T>()
            .map_err(|_| WikiError::TypeMismatch(key.to_string()))
    }
}

struct Entry {
    precursors: Vec<String>,
    producer: Option<Producer>,
    materialize: bool,
}

#[derive(Default)]
struct Slots {
    values: HashMap<String, DynValue>,
}

/// A key/value store where values are lazily computed from declared precursors.
pub struct LazyStore {
    mode: StoreMode,
    entries: Mutex<HashMap<String, Entry>>,
    slots: Mutex<Slots>,
    // Serializes evaluation walks so each producer runs at most once.
    eval_gate: tokio::sync::Mutex<()>,
}

impl LazyStore {
    /// Creates an empty store with the given redeclaration policy.
    pub fn new(mode: StoreMode) -> Self {
        LazyStore {
            mode,
            entries: Mutex::new(HashMap::new()),
            slots: Mutex::new(Slots::default()),
            eval_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Wraps a concrete value as a [`DynValue`], for use in producers.
    pub fn wrap<T: Any + Send + Sync>(value: T) -> DynValue {
        Arc::new(value)
    }

    /// Declares `key` as a literal. The value is available immediately.
    pub fn insert<T: Any + Send + Sync>(&self, key: &str, value: T) -> Result<(), WikiError> {
        self.check_redeclaration(key)?;
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                precursors: Vec::new(),
                producer: None,
                materialize: true,
            },
        );
        self.slots
            .lock()
            .values
            .insert(key.to_string(), Arc::new(value));
        Ok(())
    }

    /// Declares `key` as computed from `precursors` by `producer`.
    ///
    /// Every precursor must already be declared; an undeclared precursor fails
    /// with [`WikiError::UnknownKey`] before any evaluation happens. When
    /// `materialize` is false the value is recomputed on every access.
    pub fn derive<F>(
        &self,
        key: &str,
        precursors: &[&str],
        materialize: bool,
        producer: F,
    ) -> Result<(), WikiError>
    where
        F: Fn(Inputs) -> BoxFuture<'static, Result<DynValue, WikiError>> + Send + Sync + 'static,
    {
        self.check_redeclaration(key)?;
        let mut entries = self.entries.lock();
        for precursor in precursors {
            if !entries.contains_key(*precursor) {
                return Err(WikiError::UnknownKey((*precursor).to_string()));
            }
        }
        // Redeclaration in unsafe mode drops any previously computed value.
        self.slots.lock().values.remove(key);
        entries.insert(
            key.to_string(),
            Entry {
                precursors: precursors.iter().map(|p| p.to_string()).collect(),
                producer: Some(Arc::new(producer)),
                materialize,
            },
        );
        Ok(())
    }

    /// Whether `key` has been declared (not whether it has been evaluated).
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Whether `key` currently holds a retained value.
    ///
    /// Literals are evaluated from declaration; non-materialized entries are
    /// never considered evaluated.
    pub fn is_evaluated(&self, key: &str) -> bool {
        self.slots.lock().values.contains_key(key)
    }

    /// Returns a clone of the value for `key`, evaluating precursors as needed.
    pub async fn get<T>(&self, key: &str) -> Result<T, WikiError>
    where
        T: Any + Send + Sync + Clone,
    {
        Ok((*self.get_arc::<T>(key).await?).clone())
    }

    /// Like [`get`](Self::get) but returns the shared value without cloning it.
    pub async fn get_arc<T>(&self, key: &str) -> Result<Arc<T>, WikiError>
    where
        T: Any + Send + Sync,
    {
        let raw = self.evaluate(key).await?;
        raw.downcast::<T>()
            .map_err(|_| WikiError::TypeMismatch(key.to_string()))
    }

    async fn evaluate(&self, key: &str) -> Result<DynValue, WikiError> {
        let _walk = self.eval_gate.lock().await;

        // Fast path: literal or already materialized.
        if let Some(value) = self.slots.lock().values.get(key).cloned() {
            return Ok(value);
        }

        let plan = self.plan(key)?;
        trace!(key, steps = plan.len(), "evaluating store entry");

        // Values computed during this walk, including non-materialized ones.
        let mut scratch: HashMap<String, DynValue> = HashMap::new();

        for step in plan {
            let (precursors, producer, materialize) = {
                let entries = self.entries.lock();
                let entry = entries
                    .get(&step)
                    .ok_or_else(|| WikiError::UnknownKey(step.clone()))?;
                let producer = entry
                    .producer
                    .clone()
                    .ok_or_else(|| WikiError::UnknownKey(step.clone()))?;
                (entry.precursors.clone(), producer, entry.materialize)
            };

            let mut values = HashMap::with_capacity(precursors.len());
            for precursor in &precursors {
                let value = scratch
                    .get(precursor)
                    .cloned()
                    .or_else(|| self.slots.lock().values.get(precursor).cloned())
                    .ok_or_else(|| WikiError::UnknownKey(precursor.clone()))?;
                values.insert(precursor.clone(), value);
            }

            let value = producer(Inputs { values })
                .await
                .map_err(|e| WikiError::tagged(&step, e))?;
            if materialize {
                self.slots
                    .lock()
                    .values
                    .insert(step.clone(), value.clone());
            }
            scratch.insert(step, value);
        }

        scratch
            .get(key)
            .cloned()
            .ok_or_else(|| WikiError::UnknownKey(key.to_string()))
    }

    /// Post-order walk over the precursor graph of `key`, restricted to
    /// entries that do not currently hold a retained value.
    fn plan(&self, key: &str) -> Result<Vec<String>, WikiError> {
        let entries = self.entries.lock();
        let slots = self.slots.lock();

        if !entries.contains_key(key) {
            return Err(WikiError::UnknownKey(key.to_string()));
        }

        let mut order = Vec::new();
        let mut planned: HashSet<String> = HashSet::new();
        // (key, children_pushed)
        let mut stack = vec![(key.to_string(), false)];

        while let Some((current, expanded)) = stack.pop() {
            if planned.contains(&current) {
                continue;
            }
            if slots.values.contains_key(&current) {
                continue;
            }
            let entry = entries
                .get(&current)
                .ok_or_else(|| WikiError::UnknownKey(current.clone()))?;
            if expanded {
                planned.insert(current.clone());
                order.push(current);
            } else {
                stack.push((current.clone(), true));
                for precursor in &entry.precursors {
                    stack.push((precursor.clone(), false));
                }
            }
        }

        Ok(order)
    }

    fn check_redeclaration(&self, key: &str) -> Result<(), WikiError> {
        if self.mode == StoreMode::Safe && self.entries.lock().contains_key(key) {
            return Err(WikiError::DuplicateKey(key.to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LazyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        let slots = self.slots.lock();
        f.debug_struct("LazyStore")
            .field("mode", &self.mode)
            .field("declared", &entries.len())
            .field("evaluated", &slots.values.len())
            .finish()
    }
}
