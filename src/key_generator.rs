//! Counter key generation.

use crate::identity::ClientRequestIdentity;
use crate::rate_limit_config::RateLimitRule;
use std::fmt;

/// Addresses the stored state of one (identity, rule) pair.
///
/// Formatted `{clientIp}_{endpoint}_{period}_{limit}`; an unresolved IP
/// renders as an empty segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(String);

impl CounterKey {
    pub fn new(identity: &ClientRequestIdentity, rule: &RateLimitRule) -> Self {
        Self(format!(
            "{}_{}_{}_{}",
            identity.client_ip.as_deref().unwrap_or_default(),
            rule.endpoint,
            rule.period_label(),
            rule.limit
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CounterKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}
