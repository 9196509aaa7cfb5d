use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::errors::{Result, RollError};
use crate::model::{AliasNames, Generation, RotationRequest, RotationResult};
use crate::pattern::TimestampPattern;
use crate::ranker;
use crate::store::{IndexStore, StoreError};

/// What happens to one existing generation during a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    /// Stays in the roll group. `drops_search` takes it out of the search alias.
    Survive { drops_search: bool },
    ExpireDelete,
    ExpireClose,
    ExpireMarkClosed,
}

/// Decisions for every ranked generation, computed before anything is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPlan {
    pub steps: Vec<(Generation, Fate)>,
    /// Most recent surviving generation, the expected feed holder. The actual
    /// holders are read from the store before feed moves.
    pub old_feed_holder: Option<String>,
}

impl RotationPlan {
    /// Walks `generations` (most recent first) with a survivor counter that only
    /// advances for generations that survive. Once the counter reaches
    /// `max_roll_indices` it stays there, so every later generation expires too.
    pub fn build(generations: Vec<Generation>, request: &RotationRequest) -> Self {
        let expired = if request.delete_after_roll {
            Fate::ExpireDelete
        } else if request.close_after_roll {
            Fate::ExpireClose
        } else {
            Fate::ExpireMarkClosed
        };

        let mut counter = 1;
        let mut old_feed_holder = None;
        let mut steps = Vec::with_capacity(generations.len());

        for generation in generations {
            if counter >= request.max_roll_indices {
                steps.push((generation, expired));
                continue;
            }

            if counter == 1 {
                old_feed_holder = Some(generation.name.clone());
            }
            let drops_search = counter >= request.max_search_indices;
            counter += 1;
            steps.push((generation, Fate::Survive { drops_search }));
        }

        Self {
            steps,
            old_feed_holder,
        }
    }
}

/// Rotates index series against an [`IndexStore`].
///
/// Rotations of the same prefix must not overlap; the caller serializes them.
#[derive(Clone)]
pub struct IndexRoller {
    store: Arc<dyn IndexStore>,
}

impl IndexRoller {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self { store }
    }

    pub async fn rotate(&self, request: &RotationRequest) -> Result<RotationResult> {
        self.rotate_at(request, Utc::now()).await
    }

    /// Runs one rotation as if the clock read `now`.
    ///
    /// Store calls are issued strictly in sequence. A failed call aborts the
    /// rotation and the error carries whatever was applied before it; nothing
    /// is rolled back.
    pub async fn rotate_at(&self, request: &RotationRequest, now: DateTime<Utc>) -> Result<RotationResult> {
        request.validate()?;
        let pattern = TimestampPattern::compile(&request.timestamp_pattern)?;
        let aliases = request.aliases();
        let new_index = format!("{}_{}", request.index_prefix, pattern.format(now));

        let mut result = RotationResult::default();

        // Rank before creating anything so a naming collision leaves the store untouched.
        let mut members = self
            .store
            .list_indices_by_alias(&aliases.roll)
            .await
            .map_err(|e| RollError::from_store(e, &result))?;
        members.remove(&new_index);
        tracing::info!("rolling {}: roll alias {} held by {:?}", request.index_prefix, aliases.roll, members);
        let generations = ranker::rank(members, &pattern)?;
        let plan = RotationPlan::build(generations, request);

        match self.store.create_index(&new_index, &request.new_index_spec).await {
            Ok(()) => tracing::info!("created index {}", new_index),
            Err(StoreError::AlreadyExists(_)) => {
                tracing::warn!("index {} already exists, continuing rotation with it", new_index)
            }
            Err(e) => return Err(RollError::from_store(e, &result)),
        }
        result.created_index = new_index.clone();

        self.add_alias(&new_index, &aliases.search, &result).await?;
        self.add_alias(&new_index, &aliases.roll, &result).await?;

        for (generation, fate) in &plan.steps {
            self.apply_fate(&generation.name, *fate, &aliases, &mut result).await?;
        }

        self.hand_over_feed(&plan, &new_index, &aliases, &result).await?;

        tracing::info!(
            "rolled {}: created={} deleted={:?} closed={:?} removedAlias={:?}",
            request.index_prefix,
            result.created_index,
            result.deleted_indices,
            result.closed_indices,
            result.alias_removed_indices
        );
        Ok(result)
    }

    /// Moves feed to `new_index` from whichever index really holds it.
    ///
    /// After an interrupted rotation the newest survivor may not be the holder,
    /// so the store is asked. Extra holders left behind lose the alias.
    async fn hand_over_feed(
        &self,
        plan: &RotationPlan,
        new_index: &str,
        aliases: &AliasNames,
        result: &RotationResult,
    ) -> Result<()> {
        let mut holders = self
            .store
            .list_indices_by_alias(&aliases.feed)
            .await
            .map_err(|e| RollError::from_store(e, result))?;
        holders.remove(new_index);

        let source = plan
            .old_feed_holder
            .clone()
            .filter(|expected| holders.contains(expected))
            .or_else(|| holders.iter().next().cloned());
        if let (Some(expected), Some(actual)) = (&plan.old_feed_holder, &source) {
            if expected != actual {
                tracing::warn!("{} is held by {}, not by the newest survivor {}", aliases.feed, actual, expected);
            }
        }

        match source {
            Some(old) => {
                holders.remove(&old);
                self.store
                    .move_alias(&old, new_index, &aliases.feed)
                    .await
                    .map_err(|e| RollError::from_store(e, result))?;
                tracing::info!("moved {} from {} to {}", aliases.feed, old, new_index);
            }
            None => self.add_alias(new_index, &aliases.feed, result).await?,
        }

        for stray in &holders {
            self.remove_alias(stray, &aliases.feed, result).await?;
        }
        Ok(())
    }

    async fn apply_fate(
        &self,
        index: &str,
        fate: Fate,
        aliases: &AliasNames,
        result: &mut RotationResult,
    ) -> Result<()> {
        match fate {
            Fate::Survive { drops_search: false } => {}
            Fate::Survive { drops_search: true } => {
                self.remove_alias(index, &aliases.search, result).await?;
                result.alias_removed_indices.push(index.to_string());
            }
            Fate::ExpireDelete | Fate::ExpireClose | Fate::ExpireMarkClosed => {
                self.remove_alias(index, &aliases.feed, result).await?;
                self.remove_alias(index, &aliases.roll, result).await?;
                self.remove_alias(index, &aliases.search, result).await?;

                match fate {
                    Fate::ExpireDelete => {
                        self.store
                            .delete_index(index)
                            .await
                            .map_err(|e| RollError::from_store(e, &*result))?;
                        tracing::info!("deleted index {}", index);
                        result.deleted_indices.push(index.to_string());
                    }
                    Fate::ExpireClose => {
                        result.alias_removed_indices.push(index.to_string());
                        self.store
                            .close_index(index)
                            .await
                            .map_err(|e| RollError::from_store(e, &*result))?;
                        tracing::info!("closed index {}", index);
                        result.closed_indices.push(index.to_string());
                    }
                    _ => {
                        result.alias_removed_indices.push(index.to_string());
                        self.add_alias(index, &aliases.closed, result).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn add_alias(&self, index: &str, alias: &str, result: &RotationResult) -> Result<()> {
        self.store
            .add_alias(index, alias)
            .await
            .map_err(|e| RollError::from_store(e, result))?;
        tracing::info!("added alias {} to {}", alias, index);
        Ok(())
    }

    async fn remove_alias(&self, index: &str, alias: &str, result: &RotationResult) -> Result<()> {
        self.store
            .remove_alias(index, alias)
            .await
            .map_err(|e| RollError::from_store(e, result))?;
        tracing::info!("removed alias {} from {}", alias, index);
        Ok(())
    }
}
