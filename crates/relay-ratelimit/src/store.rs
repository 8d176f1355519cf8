//! # Redis Store
//!
//! Shared connection handle for the Redis-backed limiters and the channel
//! limits registry. The connection is opened on first use and re-established
//! by the connection manager after failures. Every round trip is bounded by
//! the configured timeout so a hung store cannot stall a request.

use crate::error::{LimiterError, LimiterResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, FromRedisValue, Script};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Default bound on a single store round trip.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_millis(250);

/// Lazily connected Redis handle.
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisStore {
    /// Parse `url`. Does not connect.
    pub fn open(url: &str, timeout: Duration) -> LimiterResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| LimiterError::InvalidConfig(format!("redis url: {e}")))?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            timeout,
        })
    }

    /// Round-trip bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn connection(&self) -> LimiterResult<ConnectionManager> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let conn = self.bounded(self.client.get_connection_manager()).await?;
                debug!("Rate-limit store connected");
                Ok::<_, LimiterError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn bounded<T, F>(&self, fut: F) -> LimiterResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(LimiterError::from),
            Err(_) => Err(LimiterError::Timeout(self.timeout)),
        }
    }

    /// Run a Lua script atomically on the server.
    pub async fn eval<T: FromRedisValue>(
        &self,
        script: &Script,
        keys: &[&str],
        args: &[String],
    ) -> LimiterResult<T> {
        let mut conn = self.connection().await?;
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }
        self.bounded(invocation.invoke_async(&mut conn)).await
    }

    /// `GET key`.
    pub async fn get<T: FromRedisValue>(&self, key: &str) -> LimiterResult<T> {
        let mut conn = self.connection().await?;
        self.bounded(conn.get(key)).await
    }

    /// `SET key value`.
    pub async fn set(&self, key: &str, value: &str) -> LimiterResult<()> {
        let mut conn = self.connection().await?;
        self.bounded(conn.set(key, value)).await
    }

    /// `SET key value NX`. True when this call created the key.
    pub async fn set_if_absent(&self, key: &str, value: &str) -> LimiterResult<bool> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        let reply: Option<String> = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.connection.initialized())
            .field("timeout", &self.timeout)
            .finish()
    }
}
