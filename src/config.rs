use crate::admission::FailurePolicy;
use crate::algorithms::Algorithm;
use crate::config_validator::ConfigValidator;
use crate::error::Result;
use crate::rate_limit_config::RateLimitOptions;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "gatekeeper", version, about = "Distributed admission control service")]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Redis connection URL; counters are kept in process memory when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// JSON rate limit options; rate limiting is disabled when unset
    #[arg(long, env = "RATE_LIMIT_FILE")]
    pub rate_limit_file: Option<PathBuf>,

    /// Rate limiting algorithm shared by every rule
    #[arg(long, env = "ALGORITHM", value_enum, default_value_t = Algorithm::SlidingWindow)]
    pub algorithm: Algorithm,

    /// Behaviour when the counter store is unreachable
    #[arg(long, env = "STORE_FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Closed)]
    pub failure_policy: FailurePolicy,

    /// Log level for the gatekeeper target
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from the command line and environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config::parse();
        ConfigValidator::validate_config(&config)?;
        Ok(config)
    }

    /// Read the rate limit options file, if one is configured.
    pub fn load_rate_limit_options(&self) -> Result<Option<RateLimitOptions>> {
        let Some(path) = &self.rate_limit_file else {
            return Ok(None);
        };

        let options = RateLimitOptions::from_file(path)?;
        ConfigValidator::validate_rate_limit_options(&options)?;
        Ok(Some(options))
    }
}
