//! Whitelist lookup and rule matching over loaded rate limit options.

use crate::error::{GatekeeperError, Result};
use crate::identity::ClientRequestIdentity;
use crate::rate_limit_config::{RateLimitOptions, RateLimitRule};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::time::Duration;

/// Case-insensitive glob where `*` matches any run and `?` one character.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self> {
        let mut expression = String::with_capacity(raw.len() + 8);
        expression.push('^');
        for c in raw.chars() {
            match c {
                '*' => expression.push_str(".*"),
                '?' => expression.push('.'),
                other => expression.push_str(&regex::escape(&other.to_string())),
            }
        }
        expression.push('$');

        let regex = RegexBuilder::new(&expression)
            .case_insensitive(true)
            .build()
            .map_err(|e| GatekeeperError::Configuration(format!("Invalid pattern '{}': {}", raw, e)))?;

        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: Pattern,
    rule: RateLimitRule,
}

impl CompiledRule {
    fn compile(rules: &[RateLimitRule]) -> Result<Vec<Self>> {
        rules
            .iter()
            .map(|rule| {
                Ok(Self {
                    pattern: Pattern::new(&rule.endpoint)?,
                    rule: rule.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct CompiledPolicy {
    ip: Pattern,
    rules: Vec<CompiledRule>,
}

/// Answers "is this identity exempt?" and "which rules apply to it?".
#[derive(Debug, Clone)]
pub struct RateLimitProcessor {
    endpoint_rate_limiting: bool,
    ip_whitelist: Vec<Pattern>,
    client_whitelist: Vec<String>,
    endpoint_whitelist: Vec<Pattern>,
    general_rules: Vec<CompiledRule>,
    ip_policies: Vec<CompiledPolicy>,
}

impl RateLimitProcessor {
    pub fn new(options: &RateLimitOptions) -> Result<Self> {
        let ip_policies = options
            .ip_policies
            .iter()
            .map(|policy| {
                Ok(CompiledPolicy {
                    ip: Pattern::new(&policy.ip)?,
                    rules: CompiledRule::compile(&policy.rules)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            endpoint_rate_limiting: options.enable_endpoint_rate_limiting,
            ip_whitelist: compile_patterns(&options.ip_whitelist)?,
            client_whitelist: options.client_whitelist.clone(),
            endpoint_whitelist: compile_patterns(&options.endpoint_whitelist)?,
            general_rules: CompiledRule::compile(&options.general_rules)?,
            ip_policies,
        })
    }

    pub fn is_whitelisted(&self, identity: &ClientRequestIdentity) -> bool {
        if let Some(ip) = identity.client_ip.as_deref() {
            if self.ip_whitelist.iter().any(|pattern| pattern.matches(ip)) {
                return true;
            }
        }

        if self.client_whitelist.iter().any(|id| id == &identity.client_id) {
            return true;
        }

        let endpoint = identity.endpoint();
        self.endpoint_whitelist
            .iter()
            .any(|pattern| pattern.matches(&endpoint))
    }

    /// Rules applying to `identity`, at most one per period, shortest period first.
    ///
    /// IP policy rules take precedence over general rules of the same period;
    /// among rules of one kind and period the lowest limit wins.
    pub fn matching_rules(&self, identity: &ClientRequestIdentity) -> Vec<RateLimitRule> {
        let endpoint = identity.endpoint();

        let policy_rules = identity.client_ip.as_deref().map_or_else(Vec::new, |ip| {
            self.ip_policies
                .iter()
                .filter(|policy| policy.ip.matches(ip))
                .flat_map(|policy| policy.rules.iter())
                .filter(|compiled| self.applies(compiled, &endpoint))
                .collect::<Vec<_>>()
        });

        let mut selected = most_restrictive_per_period(policy_rules);

        let general = self
            .general_rules
            .iter()
            .filter(|compiled| self.applies(compiled, &endpoint))
            .collect::<Vec<_>>();
        for (period, rule) in most_restrictive_per_period(general) {
            selected.entry(period).or_insert(rule);
        }

        selected.into_values().collect()
    }

    fn applies(&self, compiled: &CompiledRule, endpoint: &str) -> bool {
        if self.endpoint_rate_limiting {
            compiled.pattern.matches(endpoint)
        } else {
            compiled.rule.endpoint == "*"
        }
    }
}

fn compile_patterns(raw: &[String]) -> Result<Vec<Pattern>> {
    raw.iter().map(|pattern| Pattern::new(pattern)).collect()
}

fn most_restrictive_per_period(rules: Vec<&CompiledRule>) -> BTreeMap<Duration, RateLimitRule> {
    let mut by_period: BTreeMap<Duration, RateLimitRule> = BTreeMap::new();
    for compiled in rules {
        let rule = &compiled.rule;
        match by_period.get(&rule.period) {
            Some(current) if current.limit <= rule.limit => {}
            _ => {
                by_period.insert(rule.period, rule.clone());
            }
        }
    }
    by_period
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit_config::IpRateLimitPolicy;

    fn rule(endpoint: &str, secs: u64, limit: u64) -> RateLimitRule {
        RateLimitRule::new(endpoint, Duration::from_secs(secs), limit)
    }

    fn identity(ip: Option<&str>, client: Option<&str>, verb: &str, path: &str) -> ClientRequestIdentity {
        ClientRequestIdentity::new(ip.map(str::to_string), client.map(str::to_string), path, verb)
    }

    fn options() -> RateLimitOptions {
        RateLimitOptions {
            enable_endpoint_rate_limiting: true,
            ip_whitelist: vec!["127.0.0.1".into(), "10.1.*".into()],
            client_whitelist: vec!["internal-batch".into()],
            endpoint_whitelist: vec!["get:/health".into(), "*:/api/status".into()],
            general_rules: vec![
                rule("*", 1, 5),
                rule("*:/api/*", 60, 100),
                rule("get:/api/values", 60, 20),
                rule("post:/api/values", 3600, 10),
            ],
            ip_policies: vec![IpRateLimitPolicy {
                ip: "8.8.8.8".into(),
                rules: vec![rule("*", 1, 50), rule("*", 86400, 1000)],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = Pattern::new("*:/api/*").unwrap();
        assert!(pattern.matches("get:/api/values"));
        assert!(pattern.matches("POST:/API/x"));
        assert!(!pattern.matches("get:/health"));

        let pattern = Pattern::new("get:/item/?").unwrap();
        assert!(pattern.matches("get:/item/7"));
        assert!(!pattern.matches("get:/item/77"));

        // Regex metacharacters are literal.
        let pattern = Pattern::new("10.0.0.1").unwrap();
        assert!(!pattern.matches("10a0b0c1"));
    }

    #[test]
    fn test_whitelists() {
        let processor = RateLimitProcessor::new(&options()).unwrap();
        assert!(processor.is_whitelisted(&identity(Some("127.0.0.1"), None, "get", "/x")));
        assert!(processor.is_whitelisted(&identity(Some("10.1.4.2"), None, "get", "/x")));
        assert!(processor.is_whitelisted(&identity(None, Some("internal-batch"), "get", "/x")));
        assert!(processor.is_whitelisted(&identity(None, None, "GET", "/Health/")));
        assert!(processor.is_whitelisted(&identity(None, None, "delete", "/api/status")));
        assert!(!processor.is_whitelisted(&identity(Some("8.8.8.8"), None, "get", "/x")));
    }

    #[test]
    fn test_endpoint_rules_most_restrictive_per_period() {
        let processor = RateLimitProcessor::new(&options()).unwrap();
        let rules = processor.matching_rules(&identity(Some("1.1.1.1"), None, "get", "/api/values"));
        assert_eq!(rules, vec![rule("*", 1, 5), rule("get:/api/values", 60, 20)]);

        let rules = processor.matching_rules(&identity(Some("1.1.1.1"), None, "post", "/api/values"));
        assert_eq!(
            rules,
            vec![rule("*", 1, 5), rule("*:/api/*", 60, 100), rule("post:/api/values", 3600, 10)]
        );
    }

    #[test]
    fn test_ip_policy_overrides_general_rule_of_same_period() {
        let processor = RateLimitProcessor::new(&options()).unwrap();
        let rules = processor.matching_rules(&identity(Some("8.8.8.8"), None, "get", "/api/values"));
        assert_eq!(
            rules,
            vec![rule("*", 1, 50), rule("get:/api/values", 60, 20), rule("*", 86400, 1000)]
        );
    }

    #[test]
    fn test_without_endpoint_rate_limiting_only_global_rules_apply() {
        let options = RateLimitOptions {
            enable_endpoint_rate_limiting: false,
            ..options()
        };
        let processor = RateLimitProcessor::new(&options).unwrap();
        let rules = processor.matching_rules(&identity(Some("1.1.1.1"), None, "get", "/api/values"));
        assert_eq!(rules, vec![rule("*", 1, 5)]);
    }

    #[test]
    fn test_no_rules_match() {
        let options = RateLimitOptions {
            enable_endpoint_rate_limiting: true,
            general_rules: vec![rule("get:/api/*", 1, 5)],
            ..Default::default()
        };
        let processor = RateLimitProcessor::new(&options).unwrap();
        assert!(processor
            .matching_rules(&identity(None, None, "get", "/other"))
            .is_empty());
    }
}
