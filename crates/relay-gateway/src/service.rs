//! Relay service: wires bus, limiters and HTTP server together and owns
//! their lifecycle.
//!
//! `start` binds the listener and spawns the server and the idle-state
//! sweeper. `shutdown` flips the shutdown signal (open streams end, the
//! server drains), waits for both tasks and finally closes the bus.

use crate::adapters::BusChannelNotifier;
use crate::api::{self, AppState};
use crate::domain::config::{ConfigError, RelayConfig};
use crate::domain::error::GatewayError;
use crate::stream::StreamAdapter;
use axum::Router;
use relay_bus::EventBus;
use relay_ratelimit::{LimiterFactory, RedisStore, StoreMode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How often idle limiter state is swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Key namespace of the ops fixed window.
pub const OPS_LIMITER_NAME: &str = "rl:ops";

/// Key namespace of the per-channel buckets.
pub const CHANNEL_LIMITER_NAME: &str = "rl:channel";

/// The relay service
pub struct RelayService {
    config: RelayConfig,
    state: AppState,
    shutdown_tx: watch::Sender<bool>,
    tasks: JoinSet<()>,
    local_addr: Option<SocketAddr>,
}

impl RelayService {
    /// Build every component from configuration. Nothing is bound or
    /// spawned until [`RelayService::start`].
    pub fn new(config: RelayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bus = Arc::new(EventBus::new(config.bus_config()));

        let limits = &config.rate_limit;
        let store = match (limits.store, config.bus.redis_url.as_deref()) {
            (StoreMode::Redis, Some(url)) => Some(Arc::new(
                RedisStore::open(url, config.bus.backend_timeout)
                    .map_err(|e| ConfigError::Invalid(format!("rate-limit store: {e}")))?,
            )),
            _ => None,
        };
        let factory = LimiterFactory::new(limits.store, limits.failure_policy(), store)
            .with_idle_ttl(limits.bucket_idle_ttl);

        let ops_window = limits
            .ops_window()
            .map_err(|e| ConfigError::InvalidRateLimit(e.to_string()))?;
        let channel_params = limits
            .channel_params()
            .map_err(|e| ConfigError::InvalidRateLimit(e.to_string()))?;

        let notifier = Arc::new(BusChannelNotifier::new(Arc::clone(&bus)));
        let state = AppState {
            ops_limiter: factory.fixed_window(OPS_LIMITER_NAME, ops_window),
            channel_limiter: factory.token_bucket(CHANNEL_LIMITER_NAME, channel_params),
            channels: Arc::new(
                factory
                    .channel_registry(limits.channel_defaults())
                    .with_notifier(notifier),
            ),
            streams: StreamAdapter::new(&config.stream, shutdown_rx),
            store_mode: factory.mode(),
            bus,
        };

        info!(
            store = %state.store_mode,
            enforcing = state.limiters_enforcing(),
            policy = ?limits.failure_policy(),
            "Rate limiters ready"
        );

        Ok(Self {
            config,
            state,
            shutdown_tx,
            tasks: JoinSet::new(),
            local_addr: None,
        })
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The router with its middleware stack, for in-process use.
    pub fn router(&self) -> Router {
        api::router(self.state.clone(), &self.config)
    }

    /// Address the server is bound to once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener and spawn the server and sweeper.
    pub async fn start(&mut self) -> Result<SocketAddr, GatewayError> {
        if self.local_addr.is_some() {
            return Err(GatewayError::AlreadyStarted);
        }

        let listener = TcpListener::bind(self.config.http.addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {e}", self.config.http.addr)))?;
        let addr = listener.local_addr()?;
        self.local_addr = Some(addr);

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown_tx.subscribe();
        self.tasks.spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(stopped(shutdown))
                .await;
            if let Err(e) = served {
                error!(error = %e, "HTTP server error");
            }
        });

        self.tasks.spawn(sweep_task(
            self.state.clone(),
            SWEEP_INTERVAL,
            self.shutdown_tx.subscribe(),
        ));

        info!(%addr, bus = %self.state.bus.kind(), "Relay started");
        Ok(addr)
    }

    /// Stop serving, end open streams and release the bus. Idempotent.
    pub async fn shutdown(&mut self) {
        self.shutdown_tx.send_replace(true);

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Relay task ended abnormally");
            }
        }

        self.state.bus.close().await;
        info!("Relay stopped");
    }

    /// Run until `signal` resolves, then shut down.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), GatewayError>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        info!("Received shutdown signal");
        self.shutdown().await;
        Ok(())
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
async fn stopped(mut shutdown: watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Periodically drop idle limiter state until shutdown.
async fn sweep_task(state: AppState, period: Duration, shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    let stop = stopped(shutdown);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let removed = state.ops_limiter.sweep() + state.channel_limiter.sweep();
                if removed > 0 {
                    debug!(removed, "Swept idle rate-limit state");
                }
            }
        }
    }
}
