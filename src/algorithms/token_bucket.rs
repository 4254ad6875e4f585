//! Token bucket rate limiting algorithm
//!
//! Each (identity, rule) key holds a bucket of real-valued tokens refilled
//! linearly from empty to `limit` over one period. An admitted request takes
//! one token from every matched bucket; if any bucket holds less than one
//! token after refill, nothing is consumed anywhere.
//!
//! A key seen for the first time starts with a full bucket, and every write
//! refreshes an expiration of one period. A bucket idle for a whole period is
//! full again, which is the same state an expired key starts over with.

use super::{build_invocation, Verdict};
use crate::error::Result;
use crate::identity::ClientRequestIdentity;
use crate::key_generator::CounterKey;
use crate::rate_limit_config::RateLimitRule;
use crate::store::memory::{BucketState, Keyspace};
use crate::store::{CounterScript, CounterStore, RuleArgs, ADMIT, REJECT};
use std::sync::Arc;
use tracing::debug;

/// Redis rendition. The hash fields are `lastTokenAddedTime` (ms) and `tokens`.
pub(crate) const SCRIPT: &str = r#"
local num_rules = tonumber(ARGV[1])
local time = redis.call('TIME')
local now = math.floor(tonumber(time[1]) * 1000 + tonumber(time[2]) / 1000)
local pending = {}

for i = 1, num_rules do
    local key = KEYS[i]
    local window = tonumber(ARGV[i * 2])
    local max_requests = tonumber(ARGV[i * 2 + 1])

    local bucket = redis.call('HMGET', key, 'lastTokenAddedTime', 'tokens')
    local last_added = tonumber(bucket[1])
    local tokens = tonumber(bucket[2])

    if last_added == nil or tokens == nil then
        last_added = now
        tokens = max_requests
        redis.call('HSET', key, 'lastTokenAddedTime', last_added, 'tokens', tokens)
        redis.call('EXPIRE', key, window)
    end

    local elapsed = now - last_added
    local added = math.max(elapsed / (window * 1000) * max_requests, 0)
    local available = math.min(tokens + added, max_requests)

    if available < 1 then
        return 1
    end

    pending[i] = { math.max(now, last_added), available - 1 }
end

for i = 1, num_rules do
    local key = KEYS[i]
    local window = tonumber(ARGV[i * 2])

    redis.call('HSET', key,
        'lastTokenAddedTime', string.format('%d', pending[i][1]),
        'tokens', string.format('%.17g', pending[i][2]))
    redis.call('EXPIRE', key, window)
end

return 0
"#;

/// Tokens available at `now` after continuous refill, capped at `limit`.
pub fn available_tokens(state: BucketState, now: u64, period_secs: u64, limit: u64) -> f64 {
    let limit = limit as f64;
    let elapsed = now as f64 - state.last_refill_ms as f64;
    let added = (elapsed / (period_secs as f64 * 1000.0) * limit).max(0.0);
    (state.tokens + added).min(limit)
}

/// In-process rendition of [`SCRIPT`], run under the memory store's lock.
pub(crate) fn run(
    keyspace: &mut Keyspace,
    now: u64,
    keys: &[CounterKey],
    rules: &[RuleArgs],
) -> Result<i64> {
    let mut pending = Vec::with_capacity(keys.len());

    for (key, rule) in keys.iter().zip(rules) {
        let state = match keyspace.bucket(key.as_str())? {
            Some(state) => state,
            None => {
                let fresh = BucketState {
                    last_refill_ms: now,
                    tokens: rule.limit as f64,
                };
                keyspace.set_bucket(key.as_str(), fresh)?;
                keyspace.expire(key.as_str(), rule.period_secs);
                fresh
            }
        };

        let available = available_tokens(state, now, rule.period_secs, rule.limit);
        if available < 1.0 {
            return Ok(REJECT);
        }

        pending.push(BucketState {
            last_refill_ms: now.max(state.last_refill_ms),
            tokens: available - 1.0,
        });
    }

    for ((key, rule), state) in keys.iter().zip(rules).zip(pending) {
        keyspace.set_bucket(key.as_str(), state)?;
        keyspace.expire(key.as_str(), rule.period_secs);
    }

    Ok(ADMIT)
}

/// Token bucket strategy bound to a counter store.
#[derive(Clone)]
pub struct TokenBucketStrategy {
    store: Arc<dyn CounterStore>,
}

impl TokenBucketStrategy {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn process_request(
        &self,
        identity: &ClientRequestIdentity,
        rules: &[RateLimitRule],
    ) -> Result<Verdict> {
        let (keys, args) = build_invocation(identity, rules);
        let reply = self
            .store
            .evaluate(&keys, &args, CounterScript::TokenBucket)
            .await?;

        debug!(client_ip = ?identity.client_ip, rules = rules.len(), reply, "Token bucket evaluated");
        Verdict::from_reply(reply)
    }
}
