use crate::algorithms::{Algorithm, Strategy, Verdict};
use crate::error::Result;
use crate::identity::ClientRequestIdentity;
use crate::metrics::{MetricsCollector, Outcome};
use crate::processor::RateLimitProcessor;
use crate::rate_limit_config::RateLimitOptions;
use crate::resolvers::{
    first_client, first_ip, ClientHeaderResolver, ClientResolver, ConnectionIpResolver,
    IpHeaderResolver, IpResolver,
};
use crate::response::QuotaExceeded;
use crate::store::CounterStore;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happens to a request when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit and log.
    Open,
    /// Fail the request.
    Closed,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Open => f.write_str("open"),
            FailurePolicy::Closed => f.write_str("closed"),
        }
    }
}

/// Why a request was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitReason {
    Disabled,
    Whitelisted,
    NoMatchingRule,
    WithinLimit,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admit(AdmitReason),
    Reject(ClientRequestIdentity),
}

impl Decision {
    pub fn is_admit(&self) -> bool {
        matches!(self, Decision::Admit(_))
    }
}

/// Loaded options plus everything derived from them.
struct ActiveLimits {
    processor: RateLimitProcessor,
    quota_exceeded: QuotaExceeded,
}

/// Decides, per request, whether it is admitted.
pub struct AdmissionController {
    limits: Option<ActiveLimits>,
    strategy: Strategy,
    client_resolvers: Vec<Box<dyn ClientResolver>>,
    ip_resolvers: Vec<Box<dyn IpResolver>>,
    failure_policy: FailurePolicy,
    metrics: MetricsCollector,
}

impl AdmissionController {
    /// Build a controller. `None` options disable rate limiting entirely.
    ///
    /// Resolvers default to the configured client id header, then the
    /// configured real IP header and the peer address. Forwarding headers are
    /// only read when named as `realIpHeader`.
    pub fn new(
        options: Option<RateLimitOptions>,
        algorithm: Algorithm,
        store: Arc<dyn CounterStore>,
        failure_policy: FailurePolicy,
    ) -> Result<Self> {
        let mut client_resolvers: Vec<Box<dyn ClientResolver>> = Vec::new();
        let mut ip_resolvers: Vec<Box<dyn IpResolver>> = Vec::new();

        let limits = match options {
            Some(options) => {
                if let Some(header) = &options.client_id_header {
                    client_resolvers.push(Box::new(ClientHeaderResolver::new(header.as_str())));
                }
                if let Some(header) = &options.real_ip_header {
                    ip_resolvers.push(Box::new(IpHeaderResolver::new(header.as_str())));
                }
                ip_resolvers.push(Box::new(ConnectionIpResolver));

                Some(ActiveLimits {
                    processor: RateLimitProcessor::new(&options)?,
                    quota_exceeded: QuotaExceeded::from_options(&options),
                })
            }
            None => {
                info!("No rate limit options loaded, admission control disabled");
                None
            }
        };

        Ok(Self {
            limits,
            strategy: Strategy::new(algorithm, store),
            client_resolvers,
            ip_resolvers,
            failure_policy,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn with_client_resolvers(mut self, resolvers: Vec<Box<dyn ClientResolver>>) -> Self {
        self.client_resolvers = resolvers;
        self
    }

    pub fn with_ip_resolvers(mut self, resolvers: Vec<Box<dyn IpResolver>>) -> Self {
        self.ip_resolvers = resolvers;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.limits.is_some()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.strategy.algorithm()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Rejection response settings; defaults when rate limiting is disabled.
    pub fn quota_exceeded(&self) -> QuotaExceeded {
        self.limits
            .as_ref()
            .map(|limits| limits.quota_exceeded.clone())
            .unwrap_or_default()
    }

    pub fn resolve_identity(&self, parts: &Parts) -> ClientRequestIdentity {
        ClientRequestIdentity::new(
            first_ip(&self.ip_resolvers, parts),
            first_client(&self.client_resolvers, parts),
            parts.uri.path(),
            parts.method.as_str(),
        )
    }

    /// Run the admission state machine for one request.
    ///
    /// A store failure is returned as an error under [`FailurePolicy::Closed`].
    pub async fn check(&self, parts: &Parts) -> Result<Decision> {
        let Some(limits) = &self.limits else {
            return Ok(Decision::Admit(AdmitReason::Disabled));
        };

        let identity = self.resolve_identity(parts);

        if limits.processor.is_whitelisted(&identity) {
            self.metrics.record(Outcome::Whitelisted);
            return Ok(Decision::Admit(AdmitReason::Whitelisted));
        }

        let rules = limits.processor.matching_rules(&identity);
        if rules.is_empty() {
            return Ok(Decision::Admit(AdmitReason::NoMatchingRule));
        }

        match self.strategy.evaluate(&identity, &rules).await {
            Ok(Verdict::Admit) => {
                self.metrics.record(Outcome::Admitted);
                Ok(Decision::Admit(AdmitReason::WithinLimit))
            }
            Ok(Verdict::Reject) => {
                info!(
                    client_ip = ?identity.client_ip,
                    client_id = %identity.client_id,
                    verb = %identity.http_verb,
                    path = %identity.path,
                    rules = rules.len(),
                    "Request rejected by rate limit"
                );
                self.metrics.record(Outcome::Rejected);
                Ok(Decision::Reject(identity))
            }
            Err(err) => {
                self.metrics.record(Outcome::StoreError);
                match self.failure_policy {
                    FailurePolicy::Open => {
                        // The evaluation may still have been applied by the store.
                        warn!(error = %err, client_id = %identity.client_id, "Counter store failed, admitting request");
                        Ok(Decision::Admit(AdmitReason::StoreUnavailable))
                    }
                    FailurePolicy::Closed => {
                        error!(error = %err, client_id = %identity.client_id, "Counter store failed, failing request");
                        Err(err)
                    }
                }
            }
        }
    }
}
