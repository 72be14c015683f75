// src/core/key_rotation.rs

use crate::config::{ApiKeyConfig, RotationStrategy};
use crate::error::{AppError, Result};
use crate::storage::{KeyStore, UsageRecord};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tracing::trace;

/// Strategy for selecting the next key.
///
/// Implementations return an index into `candidates`, which is never empty when
/// called through [`KeySelector`].
#[async_trait]
pub trait KeyRotationStrategy: Send + Sync {
    async fn select_key(
        &self,
        candidates: &[ApiKeyConfig],
        provider: &str,
        store: Arc<dyn KeyStore>,
    ) -> Result<usize>;

    fn kind(&self) -> RotationStrategy;
}

/// Usage of a key, or `None` when the ledger has no entry for it.
async fn usage_of(
    store: &Arc<dyn KeyStore>,
    provider: &str,
    key_name: &str,
) -> Result<Option<UsageRecord>> {
    match store.get_usage(provider, key_name).await {
        Ok(usage) => Ok(Some(usage)),
        Err(AppError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Round-robin key selection strategy
pub struct RoundRobinStrategy;

#[async_trait]
impl KeyRotationStrategy for RoundRobinStrategy {
    async fn select_key(
        &self,
        candidates: &[ApiKeyConfig],
        provider: &str,
        store: Arc<dyn KeyStore>,
    ) -> Result<usize> {
        store.next_rotation_index(provider, candidates.len()).await
    }

    fn kind(&self) -> RotationStrategy {
        RotationStrategy::RoundRobin
    }
}

/// Picks the key with the fewest recorded uses, oldest `last_used` on ties.
pub struct LeastUsedStrategy;

#[async_trait]
impl KeyRotationStrategy for LeastUsedStrategy {
    async fn select_key(
        &self,
        candidates: &[ApiKeyConfig],
        provider: &str,
        store: Arc<dyn KeyStore>,
    ) -> Result<usize> {
        let mut best: Option<(usize, UsageRecord)> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let Some(usage) = usage_of(&store, provider, &candidate.name).await? else {
                // Never used at all
                return Ok(index);
            };

            let better = match &best {
                None => true,
                Some((_, current)) => {
                    usage.usage_count < current.usage_count
                        || (usage.usage_count == current.usage_count
                            && usage.last_used < current.last_used)
                }
            };
            if better {
                best = Some((index, usage));
            }
        }

        Ok(best.map(|(index, _)| index).unwrap_or(0))
    }

    fn kind(&self) -> RotationStrategy {
        RotationStrategy::LeastUsed
    }
}

/// Picks the key with the lowest daily cost among those still under budget.
pub struct CostOptimizedStrategy;

#[async_trait]
impl KeyRotationStrategy for CostOptimizedStrategy {
    async fn select_key(
        &self,
        candidates: &[ApiKeyConfig],
        provider: &str,
        store: Arc<dyn KeyStore>,
    ) -> Result<usize> {
        let mut best: Option<(usize, f64)> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let daily_cost = usage_of(&store, provider, &candidate.name)
                .await?
                .map(|usage| usage.daily_cost)
                .unwrap_or(0.0);

            if !candidate.is_under_budget(daily_cost) {
                trace!(key_name = %candidate.name, daily_cost, "Key over daily budget");
                continue;
            }
            if best.map_or(true, |(_, lowest)| daily_cost < lowest) {
                best = Some((index, daily_cost));
            }
        }

        best.map(|(index, _)| index)
            .ok_or_else(|| AppError::AllCredentialsOverBudget {
                provider: provider.to_string(),
            })
    }

    fn kind(&self) -> RotationStrategy {
        RotationStrategy::CostOptimized
    }
}

/// Uniform choice with the thread-local generator.
pub struct RandomStrategy;

#[async_trait]
impl KeyRotationStrategy for RandomStrategy {
    async fn select_key(
        &self,
        candidates: &[ApiKeyConfig],
        _provider: &str,
        _store: Arc<dyn KeyStore>,
    ) -> Result<usize> {
        Ok(rand::thread_rng().gen_range(0..candidates.len()))
    }

    fn kind(&self) -> RotationStrategy {
        RotationStrategy::Random
    }
}

/// Always the first candidate in configured order.
pub struct SingleStrategy;

#[async_trait]
impl KeyRotationStrategy for SingleStrategy {
    async fn select_key(
        &self,
        _candidates: &[ApiKeyConfig],
        _provider: &str,
        _store: Arc<dyn KeyStore>,
    ) -> Result<usize> {
        Ok(0)
    }

    fn kind(&self) -> RotationStrategy {
        RotationStrategy::Single
    }
}

/// High-level key selector that coordinates key selection
pub struct KeySelector {
    strategy: Box<dyn KeyRotationStrategy>,
}

impl KeySelector {
    pub fn new(strategy: Box<dyn KeyRotationStrategy>) -> Self {
        Self { strategy }
    }

    pub fn with_round_robin() -> Self {
        Self::new(Box::new(RoundRobinStrategy))
    }

    pub fn for_strategy(strategy: RotationStrategy) -> Self {
        let strategy: Box<dyn KeyRotationStrategy> = match strategy {
            RotationStrategy::RoundRobin => Box::new(RoundRobinStrategy),
            RotationStrategy::LeastUsed => Box::new(LeastUsedStrategy),
            RotationStrategy::CostOptimized => Box::new(CostOptimizedStrategy),
            RotationStrategy::Random => Box::new(RandomStrategy),
            RotationStrategy::Single => Box::new(SingleStrategy),
        };
        Self::new(strategy)
    }

    pub fn strategy(&self) -> RotationStrategy {
        self.strategy.kind()
    }

    pub async fn select_available_key(
        &self,
        candidates: &[ApiKeyConfig],
        provider: &str,
        store: Arc<dyn KeyStore>,
    ) -> Result<usize> {
        if candidates.is_empty() {
            return Err(AppError::NoCredentialsAvailable {
                provider: provider.to_string(),
            });
        }
        trace!(
            strategy = %self.strategy.kind(),
            "Selecting key from {} candidates",
            candidates.len()
        );
        let index = self.strategy.select_key(candidates, provider, store).await?;
        Ok(index.min(candidates.len() - 1))
    }
}
