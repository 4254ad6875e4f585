use crate::error::{GatekeeperError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use validator::{Validate, ValidationError};

/// Rate limiting options loaded from a JSON document.
///
/// When no options are loaded the admission layer passes every request through.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitOptions {
    /// Match rules against `"{verb}:{path}"` instead of applying only `*` rules.
    pub enable_endpoint_rate_limiting: bool,
    pub client_id_header: Option<String>,
    pub real_ip_header: Option<String>,
    pub ip_whitelist: Vec<String>,
    pub client_whitelist: Vec<String>,
    pub endpoint_whitelist: Vec<String>,
    #[validate(nested)]
    pub general_rules: Vec<RateLimitRule>,
    #[validate(nested)]
    pub ip_policies: Vec<IpRateLimitPolicy>,
    #[validate(nested)]
    pub quota_exceeded_response: Option<QuotaExceededResponse>,
    #[validate(range(min = 100, max = 599))]
    pub http_status_code: Option<u16>,
    pub quota_exceeded_message: Option<String>,
}

/// One rate constraint: at most `limit` requests per `period` on `endpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    #[validate(length(min = 1))]
    pub endpoint: String,
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_period"))]
    pub period: Duration,
    #[validate(range(min = 1))]
    pub limit: u64,
}

/// Rules that apply to one client IP (or IP pattern) ahead of the general rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IpRateLimitPolicy {
    #[validate(length(min = 1))]
    pub ip: String,
    #[validate(nested)]
    pub rules: Vec<RateLimitRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuotaExceededResponse {
    #[validate(range(min = 100, max = 599))]
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub content: Option<String>,
}

/// Longest accepted rule period.
pub const MAX_PERIOD: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Periods are handed to the store as whole seconds.
fn validate_period(period: &Duration) -> std::result::Result<(), ValidationError> {
    if period.as_secs() == 0 || period.subsec_nanos() != 0 {
        return Err(ValidationError::new("period_whole_seconds"));
    }
    if *period > MAX_PERIOD {
        return Err(ValidationError::new("period_too_long"));
    }
    Ok(())
}

impl RateLimitOptions {
    /// Load and validate options from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit options");

        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate options from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: RateLimitOptions = serde_json::from_str(json).map_err(|e| {
            GatekeeperError::Configuration(format!("Failed to parse rate limit options: {}", e))
        })?;
        options.validate()?;

        info!(
            general_rules = options.general_rules.len(),
            ip_policies = options.ip_policies.len(),
            endpoint_rate_limiting = options.enable_endpoint_rate_limiting,
            "Rate limit options loaded"
        );
        Ok(options)
    }
}

impl RateLimitRule {
    pub fn new(endpoint: impl Into<String>, period: Duration, limit: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            period,
            limit,
        }
    }

    pub fn period_secs(&self) -> u64 {
        self.period.as_secs()
    }

    /// Period in the notation used inside counter keys, e.g. `1s`, `15m`.
    pub fn period_label(&self) -> String {
        humantime::format_duration(self.period).to_string()
    }
}
