pub mod admission;
pub mod algorithms;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod health;
pub mod identity;
pub mod key_generator;
pub mod metrics;
pub mod middleware;
pub mod processor;
pub mod rate_limit_config;
pub mod resolvers;
pub mod response;
pub mod server;
pub mod store;

pub use admission::{AdmissionController, Decision, FailurePolicy};
pub use algorithms::Algorithm;
pub use config::Config;
pub use error::{GatekeeperError, Result};
pub use rate_limit_config::RateLimitOptions;
pub use server::create_app;
