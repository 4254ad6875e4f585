use std::sync::{Arc, LazyLock};
use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};

use crate::store::CounterStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub counter_store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub backend: String,
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

static START_TIME: LazyLock<SystemTime> = LazyLock::new(SystemTime::now);

#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn CounterStore>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        let store_status = self.check_store().await;

        // Decisions cannot be made without the store.
        let overall_status = if store_status.status == "healthy" {
            "healthy"
        } else {
            "unhealthy"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            dependencies: DependencyStatus {
                counter_store: store_status,
            },
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.store.ping().await.is_ok()
    }

    async fn check_store(&self) -> ServiceStatus {
        let start = Instant::now();
        let result = self.store.ping().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => ServiceStatus {
                backend: self.store.backend().to_string(),
                status: "healthy".to_string(),
                response_time_ms,
                error: None,
            },
            Err(err) => ServiceStatus {
                backend: self.store.backend().to_string(),
                status: "unavailable".to_string(),
                response_time_ms,
                error: Some(err.to_string()),
            },
        }
    }
}
