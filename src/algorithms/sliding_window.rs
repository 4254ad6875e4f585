//! Sliding window log rate limiting algorithm
//!
//! Every admitted request leaves a timestamp marker in a sorted set per
//! (identity, rule) key. A request is rejected when any matched rule already
//! holds `limit` markers younger than its period. Rejections write nothing.

use super::{build_invocation, Verdict};
use crate::error::Result;
use crate::identity::ClientRequestIdentity;
use crate::key_generator::CounterKey;
use crate::rate_limit_config::RateLimitRule;
use crate::store::memory::Keyspace;
use crate::store::{CounterScript, CounterStore, RuleArgs, ADMIT, REJECT};
use std::sync::Arc;
use tracing::debug;

/// Redis rendition. Scores are milliseconds from `TIME`; members carry the
/// post-prune cardinality so two admits within one millisecond stay distinct.
pub(crate) const SCRIPT: &str = r#"
local num_rules = tonumber(ARGV[1])
local time = redis.call('TIME')
local now = math.floor(tonumber(time[1]) * 1000 + tonumber(time[2]) / 1000)
local counts = {}

for i = 1, num_rules do
    local key = KEYS[i]
    local window = tonumber(ARGV[i * 2])
    local max_requests = tonumber(ARGV[i * 2 + 1])

    redis.call('ZREMRANGEBYSCORE', key, 0, now - window * 1000)

    local count = redis.call('ZCARD', key)
    if count >= max_requests then
        return 1
    end
    counts[i] = count
end

for i = 1, num_rules do
    local key = KEYS[i]
    local window = tonumber(ARGV[i * 2])

    redis.call('ZADD', key, now, string.format('%d-%d', now, counts[i]))
    redis.call('EXPIRE', key, window)
end

return 0
"#;

/// In-process rendition of [`SCRIPT`], run under the memory store's lock.
pub(crate) fn run(
    keyspace: &mut Keyspace,
    now: u64,
    keys: &[CounterKey],
    rules: &[RuleArgs],
) -> Result<i64> {
    for (key, rule) in keys.iter().zip(rules) {
        let trim = now.saturating_sub(rule.period_secs.saturating_mul(1000));
        let count = keyspace.prune_window(key.as_str(), trim)?;
        if count >= rule.limit {
            return Ok(REJECT);
        }
    }

    for (key, rule) in keys.iter().zip(rules) {
        keyspace.add_marker(key.as_str(), now)?;
        keyspace.expire(key.as_str(), rule.period_secs);
    }

    Ok(ADMIT)
}

/// Sliding window strategy bound to a counter store.
#[derive(Clone)]
pub struct SlidingWindowStrategy {
    store: Arc<dyn CounterStore>,
}

impl SlidingWindowStrategy {
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
            .evaluate(&keys, &args, CounterScript::SlidingWindow)
            .await?;

        debug!(client_ip = ?identity.client_ip, rules = rules.len(), reply, "Sliding window evaluated");
        Verdict::from_reply(reply)
    }
}
