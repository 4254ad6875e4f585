use crate::config::Config;
use crate::error::GatekeeperError;
use crate::processor::Pattern;
use crate::rate_limit_config::{RateLimitOptions, RateLimitRule};
use std::collections::HashSet;
use tracing::warn;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), GatekeeperError> {
        if url.is_empty() {
            return Err(GatekeeperError::Validation(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(GatekeeperError::Validation(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates process configuration
    pub fn validate_config(config: &Config) -> Result<(), GatekeeperError> {
        if let Some(url) = &config.redis_url {
            Self::validate_redis_url(url)?;
        }

        if config.log_level.trim().is_empty() {
            return Err(GatekeeperError::Validation(
                "Log level cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Cross-field checks the per-field validation cannot express
    pub fn validate_rate_limit_options(options: &RateLimitOptions) -> Result<(), GatekeeperError> {
        let patterns = options
            .ip_whitelist
            .iter()
            .chain(&options.endpoint_whitelist)
            .chain(options.ip_policies.iter().map(|policy| &policy.ip));
        for pattern in patterns {
            Pattern::new(pattern)?;
        }

        Self::validate_rules("generalRules", &options.general_rules, options)?;
        for policy in &options.ip_policies {
            Self::validate_rules(&format!("ipPolicies[{}]", policy.ip), &policy.rules, options)?;
        }

        Ok(())
    }

    fn validate_rules(
        context: &str,
        rules: &[RateLimitRule],
        options: &RateLimitOptions,
    ) -> Result<(), GatekeeperError> {
        let mut seen = HashSet::new();

        for rule in rules {
            Pattern::new(&rule.endpoint)?;

            if options.enable_endpoint_rate_limiting && rule.endpoint != "*" && !rule.endpoint.contains(':') {
                return Err(GatekeeperError::Validation(format!(
                    "{}: endpoint '{}' must be '*' or '<verb>:<path>'",
                    context, rule.endpoint
                )));
            }

            // Accepted; matching keeps the lowest limit.
            if !seen.insert((rule.endpoint.to_lowercase(), rule.period)) {
                warn!(
                    context,
                    endpoint = %rule.endpoint,
                    period = %rule.period_label(),
                    "More than one rule for the same endpoint and period"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit_config::IpRateLimitPolicy;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config = Config::try_parse_from(["gatekeeper", "--redis-url", "http://x"]).unwrap();
        assert!(ConfigValidator::validate_config(&config).is_err());

        let config = Config::try_parse_from(["gatekeeper", "--redis-url", "redis://x", "--log-level", " "]).unwrap();
        assert!(ConfigValidator::validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_rule_period_is_accepted() {
        let options = RateLimitOptions {
            general_rules: vec![
                RateLimitRule::new("*", Duration::from_secs(1), 5),
                RateLimitRule::new("*", Duration::from_secs(1), 10),
            ],
            ..Default::default()
        };
        assert!(ConfigValidator::validate_rate_limit_options(&options).is_ok());
    }

    #[test]
    fn test_endpoint_shape_with_endpoint_rate_limiting() {
        let options = RateLimitOptions {
            enable_endpoint_rate_limiting: true,
            general_rules: vec![RateLimitRule::new("/api/values", Duration::from_secs(1), 5)],
            ..Default::default()
        };
        assert!(ConfigValidator::validate_rate_limit_options(&options).is_err());

        let options = RateLimitOptions {
            enable_endpoint_rate_limiting: true,
            general_rules: vec![RateLimitRule::new("get:/api/values", Duration::from_secs(1), 5)],
            ip_policies: vec![IpRateLimitPolicy {
                ip: "8.8.*".into(),
                rules: vec![RateLimitRule::new("*", Duration::from_secs(1), 50)],
            }],
            ..Default::default()
        };
        assert!(ConfigValidator::validate_rate_limit_options(&options).is_ok());
    }
}
