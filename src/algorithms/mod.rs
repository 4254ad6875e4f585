//! Rate limiting algorithms module
//!
//! Both algorithms share one keying scheme and one argument layout; they
//! differ only in the script the counter store runs.

pub mod sliding_window;
pub mod token_bucket;

use crate::error::{GatekeeperError, Result};
use crate::identity::ClientRequestIdentity;
use crate::key_generator::CounterKey;
use crate::rate_limit_config::RateLimitRule;
use crate::store::{CounterStore, ADMIT, REJECT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use sliding_window::SlidingWindowStrategy;
pub use token_bucket::TokenBucketStrategy;

/// Algorithm selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    SlidingWindow,
    TokenBucket,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::SlidingWindow => f.write_str("sliding-window"),
            Algorithm::TokenBucket => f.write_str("token-bucket"),
        }
    }
}

/// Outcome of one atomic evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    Reject,
}

impl Verdict {
    pub fn from_reply(reply: i64) -> Result<Self> {
        match reply {
            ADMIT => Ok(Verdict::Admit),
            REJECT => Ok(Verdict::Reject),
            other => Err(GatekeeperError::UnexpectedReply(other)),
        }
    }

    pub fn is_reject(self) -> bool {
        self == Verdict::Reject
    }
}

/// The configured strategy; every matched rule is evaluated in one call.
#[derive(Clone)]
pub enum Strategy {
    SlidingWindow(SlidingWindowStrategy),
    TokenBucket(TokenBucketStrategy),
}

impl Strategy {
    pub fn new(algorithm: Algorithm, store: Arc<dyn CounterStore>) -> Self {
        match algorithm {
            Algorithm::SlidingWindow => Strategy::SlidingWindow(SlidingWindowStrategy::new(store)),
            Algorithm::TokenBucket => Strategy::TokenBucket(TokenBucketStrategy::new(store)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Strategy::SlidingWindow(_) => Algorithm::SlidingWindow,
            Strategy::TokenBucket(_) => Algorithm::TokenBucket,
        }
    }

    pub async fn evaluate(
        &self,
        identity: &ClientRequestIdentity,
        rules: &[RateLimitRule],
    ) -> Result<Verdict> {
        match self {
            Strategy::SlidingWindow(strategy) => strategy.process_request(identity, rules).await,
            Strategy::TokenBucket(strategy) => strategy.process_request(identity, rules).await,
        }
    }
}

/// Keys and `[ruleCount, period_1, limit_1, ...]` for a matched rule set.
pub fn build_invocation(
    identity: &ClientRequestIdentity,
    rules: &[RateLimitRule],
) -> (Vec<CounterKey>, Vec<u64>) {
    let mut keys = Vec::with_capacity(rules.len());
    let mut args = Vec::with_capacity(rules.len() * 2 + 1);
    args.push(rules.len() as u64);

    for rule in rules {
        keys.push(CounterKey::new(identity, rule));
        args.push(rule.period_secs());
        args.push(rule.limit);
    }

    (keys, args)
}
