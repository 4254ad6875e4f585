//! Counter store contract.
//!
//! A counter store executes one rate-limit algorithm over a set of keys as a
//! single indivisible unit. No other evaluation touching any of the same keys
//! may interleave with it; this is the only coordination the admission path
//! relies on.

pub mod memory;
pub mod redis;

use crate::error::{GatekeeperError, Result};
use crate::key_generator::CounterKey;
use async_trait::async_trait;

pub use self::memory::{Clock, ManualClock, MemoryCounterStore, SystemClock};
pub use self::redis::RedisCounterStore;

/// Reply meaning the request is admitted.
pub const ADMIT: i64 = 0;
/// Reply meaning the request is rejected.
pub const REJECT: i64 = 1;

/// Which algorithm the store runs for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterScript {
    SlidingWindow,
    TokenBucket,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically evaluate `script` against `keys`.
    ///
    /// `args` is laid out `[ruleCount, period_1, limit_1, ..., period_N, limit_N]`
    /// with periods in seconds, positionally aligned with `keys`. Returns
    /// [`ADMIT`] or [`REJECT`].
    ///
    /// If the caller stops waiting after the call was sent the mutation may
    /// still have been applied; callers must not retry blindly.
    async fn evaluate(&self, keys: &[CounterKey], args: &[u64], script: CounterScript)
        -> Result<i64>;

    /// Round trip to the backing store.
    async fn ping(&self) -> Result<()>;

    /// Short backend name for health output.
    fn backend(&self) -> &'static str;
}

/// Period and limit of one rule as passed in the argument vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleArgs {
    pub period_secs: u64,
    pub limit: u64,
}

/// Split an argument vector into per-rule arguments, checking its layout
/// against the key list.
pub fn parse_args(keys: &[CounterKey], args: &[u64]) -> Result<Vec<RuleArgs>> {
    let (&count, rest) = args
        .split_first()
        .ok_or_else(|| GatekeeperError::Validation("empty argument vector".to_string()))?;

    if count as usize != keys.len() || rest.len() != keys.len() * 2 {
        return Err(GatekeeperError::Validation(format!(
            "argument vector declares {} rules with {} values for {} keys",
            count,
            rest.len(),
            keys.len()
        )));
    }

    Ok(rest
        .chunks_exact(2)
        .map(|pair| RuleArgs {
            period_secs: pair[0],
            limit: pair[1],
        })
        .collect())
}
