use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use gatekeeper::admission::{AdmissionController, FailurePolicy};
use gatekeeper::algorithms::Algorithm;
use gatekeeper::error::{GatekeeperError, Result};
use gatekeeper::handlers::AppState;
use gatekeeper::health::HealthChecker;
use gatekeeper::key_generator::CounterKey;
use gatekeeper::rate_limit_config::RateLimitOptions;
use gatekeeper::server::create_app;
use gatekeeper::store::{CounterScript, CounterStore, ManualClock, MemoryCounterStore};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

const OPTIONS: &str = r#"{
    "enableEndpointRateLimiting": true,
    "realIpHeader": "X-Real-IP",
    "clientIdHeader": "X-ClientId",
    "ipWhitelist": ["10.0.*"],
    "clientWhitelist": ["dev-client"],
    "generalRules": [
        { "endpoint": "get:/weatherforecast", "period": "1m", "limit": 2 }
    ],
    "quotaExceededResponse": {
        "content": "{\"message\":\"Whoa! Calm down, cowboy!\"}",
        "contentType": "application/json",
        "statusCode": 429
    }
}"#;

struct UnavailableStore;

#[async_trait]
impl CounterStore for UnavailableStore {
    async fn evaluate(&self, _: &[CounterKey], _: &[u64], _: CounterScript) -> Result<i64> {
        Err(GatekeeperError::Store("connection refused".into()))
    }

    async fn ping(&self) -> Result<()> {
        Err(GatekeeperError::Store("connection refused".into()))
    }

    fn backend(&self) -> &'static str {
        "unavailable"
    }
}

fn memory_store() -> Arc<MemoryCounterStore> {
    Arc::new(MemoryCounterStore::with_clock(Arc::new(ManualClock::new(
        1_700_000_000_000,
    ))))
}

fn app_with(
    options: Option<RateLimitOptions>,
    algorithm: Algorithm,
    store: Arc<dyn CounterStore>,
    failure_policy: FailurePolicy,
) -> Router {
    let controller = AdmissionController::new(options, algorithm, store.clone(), failure_policy).unwrap();
    create_app(AppState {
        controller: Arc::new(controller),
        health: HealthChecker::new(store),
    })
}

fn app(algorithm: Algorithm) -> Router {
    let options = RateLimitOptions::from_json(OPTIONS).unwrap();
    app_with(Some(options), algorithm, memory_store(), FailurePolicy::Closed)
}

fn forecast(ip: &str) -> Request<Body> {
    Request::get("/weatherforecast")
        .header("x-real-ip", ip)
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_rate_limit_exceeded() {
    for algorithm in [Algorithm::SlidingWindow, Algorithm::TokenBucket] {
        let app = app(algorithm);

        for _ in 0..2 {
            let response = app.clone().oneshot(forecast("8.8.8.8")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(forecast("8.8.8.8")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(
            body_string(response).await,
            r#"{"message":"Whoa! Calm down, cowboy!"}"#
        );

        // Counters are per client IP.
        let response = app.clone().oneshot(forecast("8.8.4.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rotating_forwarded_for_stays_limited() {
    let options = RateLimitOptions::from_json(
        r#"{ "realIpHeader": "X-Real-IP", "generalRules": [ { "endpoint": "*", "period": "1m", "limit": 2 } ] }"#,
    )
    .unwrap();
    let app = app_with(Some(options), Algorithm::SlidingWindow, memory_store(), FailurePolicy::Closed);
    let peer: SocketAddr = "203.0.113.9:40000".parse().unwrap();

    let mut admitted = 0;
    for i in 0..50 {
        let request = Request::get("/weatherforecast")
            .header("x-forwarded-for", format!("1.2.3.{}", i))
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap();
        if app.clone().oneshot(request).await.unwrap().status() == StatusCode::OK {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 2);
}

#[tokio::test]
async fn test_whitelisted_requests_pass() {
    let app = app(Algorithm::SlidingWindow);

    for _ in 0..5 {
        let response = app.clone().oneshot(forecast("10.0.3.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    for _ in 0..5 {
        let request = Request::get("/weatherforecast")
            .header("x-real-ip", "8.8.8.8")
            .header("x-clientid", "dev-client")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_unmatched_endpoint_is_not_limited() {
    let app = app(Algorithm::SlidingWindow);

    for _ in 0..5 {
        let request = Request::post("/weatherforecast")
            .header("x-real-ip", "8.8.8.8")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        // No POST route; the point is that admission did not reject it.
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}

#[tokio::test]
async fn test_disabled_passes_through() {
    let app = app_with(
        None,
        Algorithm::SlidingWindow,
        Arc::new(UnavailableStore),
        FailurePolicy::Closed,
    );

    for _ in 0..5 {
        let response = app.clone().oneshot(forecast("8.8.8.8")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_store_failure_policy() {
    let options = RateLimitOptions::from_json(OPTIONS).unwrap();
    let closed = app_with(
        Some(options.clone()),
        Algorithm::TokenBucket,
        Arc::new(UnavailableStore),
        FailurePolicy::Closed,
    );

    let response = closed.oneshot(forecast("8.8.8.8")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"], "service_unavailable");
    assert_eq!(body["code"], 503);

    let open = app_with(
        Some(options),
        Algorithm::TokenBucket,
        Arc::new(UnavailableStore),
        FailurePolicy::Open,
    );
    let response = open.oneshot(forecast("8.8.8.8")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = app(Algorithm::SlidingWindow);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["counter_store"]["backend"], "memory");
}

#[tokio::test]
async fn test_health_reports_unavailable_store() {
    let app = app_with(
        None,
        Algorithm::SlidingWindow,
        Arc::new(UnavailableStore),
        FailurePolicy::Closed,
    );

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app(Algorithm::TokenBucket);

    for _ in 0..3 {
        app.clone().oneshot(forecast("8.8.8.8")).await.unwrap();
    }

    // Operational routes are never rate limited.
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(
                Request::get("/metrics")
                    .header("x-real-ip", "8.8.8.8")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["algorithm"], "token-bucket");
    assert_eq!(body["global"]["total_requests"], 3);
    assert_eq!(body["global"]["allowed_requests"], 2);
    assert_eq!(body["global"]["throttled_requests"], 1);
    assert!(body.get("clients").is_none());
}

#[tokio::test]
async fn test_concurrent_requests_admit_exactly_limit() {
    for algorithm in [Algorithm::SlidingWindow, Algorithm::TokenBucket] {
        let options = RateLimitOptions::from_json(
            r#"{ "realIpHeader": "X-Real-IP", "generalRules": [ { "endpoint": "*", "period": "1h", "limit": 25 } ] }"#,
        )
        .unwrap();
        let app = app_with(Some(options), algorithm, memory_store(), FailurePolicy::Closed);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let app = app.clone();
                tokio::spawn(async move { app.oneshot(forecast("8.8.8.8")).await.unwrap().status() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() == StatusCode::OK {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 25);
    }
}
