use crate::admission::AdmissionController;
use crate::config::Config;
use crate::error::Result;
use crate::handlers::{health_check, metrics_report, readiness_check, weather_forecast, AppState};
use crate::health::HealthChecker;
use crate::middleware::{admission_middleware, logging_middleware};
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore};
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn CounterStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisCounterStore::connect(url).await?),
            None => {
                tracing::warn!("No Redis URL configured, counters are local to this instance");
                Arc::new(MemoryCounterStore::new())
            }
        };

        let options = config.load_rate_limit_options()?;
        let controller = AdmissionController::new(
            options,
            config.algorithm,
            store.clone(),
            config.failure_policy,
        )?;

        tracing::info!(
            algorithm = %config.algorithm,
            failure_policy = %config.failure_policy,
            backend = store.backend(),
            enabled = controller.is_enabled(),
            "Admission control configured"
        );

        let state = AppState {
            controller: Arc::new(controller),
            health: HealthChecker::new(store),
        };

        Ok(Self {
            app: create_app(state),
            bind_addr: config.bind_addr,
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Gatekeeper listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");
        tracing::info!("Readiness check available at /ready");

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

/// Build the router. Only the API routes sit behind admission control.
pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/weatherforecast", get(weather_forecast))
        .route_layer(middleware::from_fn_with_state(
            state.controller.clone(),
            admission_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_report))
        .merge(api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install terminate handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
