//! Redis counter store.
//!
//! Each algorithm is a Lua script; Redis runs a script to completion before
//! serving any other command, which gives the atomicity the contract needs.

use super::{parse_args, CounterScript, CounterStore};
use crate::algorithms::{sliding_window, token_bucket};
use crate::error::{GatekeeperError, Result};
use crate::key_generator::CounterKey;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::{debug, info};

pub struct RedisCounterStore {
    connection: ConnectionManager,
    sliding_window: Script,
    token_bucket: Script,
}

impl RedisCounterStore {
    /// Connect to Redis. Fails if the server cannot be reached.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            GatekeeperError::Store(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| GatekeeperError::Store(format!("Failed to connect to Redis: {}", e)))?;

        info!(redis_url = %redis_url, "Connected to Redis counter store");

        Ok(Self {
            connection,
            sliding_window: Script::new(sliding_window::SCRIPT),
            token_bucket: Script::new(token_bucket::SCRIPT),
        })
    }

    fn script(&self, script: CounterScript) -> &Script {
        match script {
            CounterScript::SlidingWindow => &self.sliding_window,
            CounterScript::TokenBucket => &self.token_bucket,
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn evaluate(
        &self,
        keys: &[CounterKey],
        args: &[u64],
        script: CounterScript,
    ) -> Result<i64> {
        parse_args(keys, args)?;

        let mut invocation = self.script(script).prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(*arg);
        }

        // EVALSHA, loading the script on NOSCRIPT.
        let mut connection = self.connection.clone();
        let reply: i64 = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(|e| GatekeeperError::Store(format!("Script execution failed: {}", e)))?;

        debug!(?script, keys = keys.len(), reply, "Counter script executed");
        Ok(reply)
    }

    async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(|e| GatekeeperError::Store(format!("Ping failed: {}", e)))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
