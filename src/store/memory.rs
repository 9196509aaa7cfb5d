use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use super::{IndexStore, StoreError, StoreResult};

/// A mutation recorded by [`MemoryStore`], in the order it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Create(String),
    Delete(String),
    Close(String),
    AddAlias { index: String, alias: String },
    RemoveAlias { index: String, alias: String },
    MoveAlias { from: String, to: String, alias: String },
}

#[derive(Debug, Clone, Default)]
pub struct IndexState {
    pub aliases: BTreeSet<String>,
    pub closed: bool,
    pub spec: Value,
}

#[derive(Default)]
struct Inner {
    indices: BTreeMap<String, IndexState>,
    journal: Vec<StoreOp>,
    fail_on: Option<(StoreOp, StoreError)>,
}

/// In-process index store. Keeps a journal of applied mutations and can be
/// told to fail a specific call.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an index holding the given aliases without journaling it.
    pub fn with_index(self, name: &str, aliases: &[&str]) -> Self {
        {
            let mut inner = self.lock();
            inner.indices.insert(
                name.to_string(),
                IndexState {
                    aliases: aliases.iter().map(|a| a.to_string()).collect(),
                    ..Default::default()
                },
            );
        }
        self
    }

    /// Makes the next call matching `op` fail with `err` without applying it.
    pub fn fail_on(&self, op: StoreOp, err: StoreError) {
        self.lock().fail_on = Some((op, err));
    }

    pub fn journal(&self) -> Vec<StoreOp> {
        self.lock().journal.clone()
    }

    pub fn index(&self, name: &str) -> Option<IndexState> {
        self.lock().indices.get(name).cloned()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.lock().indices.keys().cloned().collect()
    }

    pub fn holders(&self, alias: &str) -> BTreeSet<String> {
        self.lock()
            .indices
            .iter()
            .filter(|(_, state)| state.aliases.contains(alias))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned lock only means a test panicked mid-call; the data is still usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply<F>(&self, op: StoreOp, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, IndexState>) -> StoreResult<()>,
    {
        let mut inner = self.lock();
        if inner.fail_on.as_ref().is_some_and(|(target, _)| *target == op) {
            if let Some((_, err)) = inner.fail_on.take() {
                return Err(err);
            }
        }
        mutate(&mut inner.indices)?;
        inner.journal.push(op);
        Ok(())
    }
}

fn missing(index: &str) -> StoreError {
    StoreError::Rejected {
        status: 404,
        reason: format!("no such index [{}]", index),
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn create_index(&self, name: &str, spec: &Value) -> StoreResult<()> {
        self.apply(StoreOp::Create(name.to_string()), |indices| {
            if indices.contains_key(name) {
                return Err(StoreError::AlreadyExists(name.to_string()));
            }
            indices.insert(
                name.to_string(),
                IndexState {
                    spec: spec.clone(),
                    ..Default::default()
                },
            );
            Ok(())
        })
    }

    async fn delete_index(&self, name: &str) -> StoreResult<()> {
        self.apply(StoreOp::Delete(name.to_string()), |indices| {
            indices.remove(name).map(|_| ()).ok_or_else(|| missing(name))
        })
    }

    async fn close_index(&self, name: &str) -> StoreResult<()> {
        self.apply(StoreOp::Close(name.to_string()), |indices| {
            let state = indices.get_mut(name).ok_or_else(|| missing(name))?;
            state.closed = true;
            Ok(())
        })
    }

    async fn add_alias(&self, index: &str, alias: &str) -> StoreResult<()> {
        let op = StoreOp::AddAlias {
            index: index.to_string(),
            alias: alias.to_string(),
        };
        self.apply(op, |indices| {
            let state = indices.get_mut(index).ok_or_else(|| missing(index))?;
            state.aliases.insert(alias.to_string());
            Ok(())
        })
    }

    async fn remove_alias(&self, index: &str, alias: &str) -> StoreResult<()> {
        let op = StoreOp::RemoveAlias {
            index: index.to_string(),
            alias: alias.to_string(),
        };
        self.apply(op, |indices| {
            let state = indices.get_mut(index).ok_or_else(|| missing(index))?;
            state.aliases.remove(alias);
            Ok(())
        })
    }

    async fn move_alias(&self, from: &str, to: &str, alias: &str) -> StoreResult<()> {
        let op = StoreOp::MoveAlias {
            from: from.to_string(),
            to: to.to_string(),
            alias: alias.to_string(),
        };
        self.apply(op, |indices| {
            if !indices.contains_key(from) {
                return Err(missing(from));
            }
            let target = indices.get_mut(to).ok_or_else(|| missing(to))?;
            target.aliases.insert(alias.to_string());
            if let Some(source) = indices.get_mut(from) {
                source.aliases.remove(alias);
            }
            Ok(())
        })
    }

    async fn list_indices_by_alias(&self, alias: &str) -> StoreResult<BTreeSet<String>> {
        Ok(self.holders(alias))
    }
}
