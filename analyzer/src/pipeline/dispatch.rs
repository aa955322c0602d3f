//! Splitting the input set into cached and pending positions.

use std::collections::HashSet;

use chess::PositionKey;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::cache::{CacheError, ResultCache};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPlan {
    /// Keys to analyze, in dispatch order.
    pub needs_work: Vec<PositionKey>,
    /// Keys whose cached result already reaches the target depth.
    pub satisfied: usize,
}

/// Check every key against the cache and shuffle the ones that still need
/// analysis. With a seed the order is reproducible for a given input set.
pub async fn plan_work<C: ResultCache>(
    cache: &C,
    keys: HashSet<PositionKey>,
    target_depth: u32,
    shuffle_seed: Option<u64>,
) -> Result<DispatchPlan, CacheError> {
    let mut plan = DispatchPlan::default();

    for key in keys {
        match cache.get(&key).await? {
            Some(cached) if cached.satisfies(target_depth) => plan.satisfied += 1,
            Some(cached) => {
                tracing::debug!(key = %key, cached_depth = ?cached.max_depth(), "Cached result too shallow");
                plan.needs_work.push(key);
            }
            None => plan.needs_work.push(key),
        }
    }

    // HashSet iteration order is random per process; sort first so a seed
    // fully determines the order
    plan.needs_work.sort();
    let mut rng = match shuffle_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    plan.needs_work.shuffle(&mut rng);

    tracing::info!(
        needs_work = plan.needs_work.len(),
        satisfied = plan.satisfied,
        target_depth,
        "Work planned"
    );
    Ok(plan)
}
