//! Exchange desk service.
//!
//! Builds every component from configuration and runs the webhook server
//! and the expiry sweeper until Ctrl-C.

mod config;
mod error;
mod stats;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use stats::Stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::lifecycle::Controller;
use crate::notification::{
    ErrorData, Event, LogNotifier, Notifier, ShutdownData, StartupData, TelegramNotifier,
};
use crate::processor::{self, PaymentProcessor};
use crate::rates::CoinGeckoRates;
use crate::settings::Settings;
use crate::storage::{OrderStore, SqliteStorage, SqliteStorageConfig};
use crate::webhook::{self, WebhookState};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Service owns the shared components and the background tasks.
pub struct Service {
    cfg: Config,
    version: String,
    store: Arc<dyn OrderStore>,
    processor: Arc<dyn PaymentProcessor>,
    notifier: Arc<dyn Notifier>,
    controller: Arc<Controller>,

    // Runtime state
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    stats: Mutex<Stats>,
}

impl Service {
    /// Opens the database and builds the processor, rate provider, notifier
    /// and lifecycle controller.
    pub async fn new(cfg: ServiceConfig) -> Result<Self, ServiceError> {
        let app_config = cfg.app_config;

        let store: Arc<dyn OrderStore> = Arc::new(
            SqliteStorage::new(SqliteStorageConfig::from(&app_config.storage)).await?,
        );
        let processor = processor::from_config(&app_config.processor)?;
        let rates = Arc::new(CoinGeckoRates::new(&app_config.rates)?);
        let notifier = build_notifier(&app_config);

        let settings = Arc::new(Settings::new(
            store.clone(),
            app_config.exchange.clone(),
            app_config.staff.clone(),
        ));

        let controller = Arc::new(Controller::new(
            store.clone(),
            processor.clone(),
            rates,
            notifier.clone(),
            settings,
        ));

        Ok(Self {
            cfg: app_config,
            version: cfg.version,
            store,
            processor,
            notifier,
            controller,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            stats: Mutex::new(Stats::default()),
        })
    }

    /// Controller shared with the webhook router.
    pub fn controller(&self) -> Arc<Controller> {
        self.controller.clone()
    }

    /// Binds the webhook listener and runs until Ctrl-C.
    pub async fn start(&self) -> Result<(), ServiceError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(ServiceError::AlreadyRunning);
            }
            *running = true;
        }

        {
            let mut started_at = self.started_at.lock().await;
            *started_at = Some(Instant::now());
        }

        let webhook_cfg = &self.cfg.webhook;
        let addr = webhook_cfg.socket_addr().ok_or_else(|| {
            ServiceError::InvalidAddress(format!("{}:{}", webhook_cfg.host, webhook_cfg.port))
        })?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ServiceError::Bind)?;

        let app = webhook::router(
            WebhookState::new(self.controller.clone(), &webhook_cfg.secret),
            &webhook_cfg.path,
        );

        info!(
            name = %self.cfg.app.name,
            version = %self.version,
            env = %self.cfg.app.env,
            processor = self.processor.name(),
            addr = %addr,
            path = %webhook_cfg.path,
            "Starting exchange desk"
        );

        self.send_notification(Event::startup(StartupData {
            version: self.version.clone(),
            processor: self.processor.name().to_string(),
            webhook_addr: addr.to_string(),
        }))
        .await;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await
        });

        self.run_main_loop().await;

        let _ = shutdown_tx.send(true);
        match server.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServiceError::Server(e.to_string())),
            Err(e) => Err(ServiceError::Server(e.to_string())),
        }
    }

    /// Sends the shutdown notification and closes the notifier and the store.
    pub async fn stop(&self, reason: &str) -> Result<(), ServiceError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping service...");

        let uptime = self.uptime().await;

        self.send_notification(Event::shutdown(ShutdownData {
            reason: reason.to_string(),
            uptime,
        }))
        .await;

        self.notifier.close().await?;
        self.store.close().await?;

        let stats = self.stats().await;
        info!(
            uptime = ?uptime,
            sweeps = stats.sweeps,
            orders_expired = stats.orders_expired,
            "Service stopped"
        );

        Ok(())
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Returns true if the service is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the service has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Waits for Ctrl-C, sweeping expired orders meanwhile if enabled.
    async fn run_main_loop(&self) {
        let sweep = &self.cfg.exchange.expiry_sweep;
        let mut sweep_timer = tokio::time::interval(sweep.interval.max(MIN_SWEEP_INTERVAL));

        info!(
            expiry_sweep = sweep.enabled,
            interval = ?sweep.interval,
            order_ttl = ?self.cfg.exchange.order_ttl,
            "Starting main loop"
        );

        loop {
            tokio::select! {
                _ = sweep_timer.tick(), if sweep.enabled => {
                    if !self.is_running().await {
                        break;
                    }
                    self.sweep().await;
                }
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Shutdown signal received"),
                        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                    }
                    break;
                }
            }
        }
    }

    /// Runs one expiry pass.
    async fn sweep(&self) {
        let result = self.controller.expire_stale(Utc::now()).await;

        let mut stats = self.stats.lock().await;
        stats.sweeps += 1;

        match result {
            Ok(expired) => {
                stats.orders_expired += expired as u64;
                debug!(expired, sweep = stats.sweeps, "Expiry sweep finished");
            }
            Err(e) => {
                stats.sweep_failures += 1;
                drop(stats);
                warn!(error = %e, "Expiry sweep failed");
                self.notifier.send_async(Event::error(ErrorData {
                    component: "expiry_sweep".to_string(),
                    message: "Не удалось отменить просроченные заявки".to_string(),
                    error: Some(e.to_string()),
                }));
            }
        }
    }

    /// Sends a notification event, logging failures.
    async fn send_notification(&self, event: Event) {
        if !self.notifier.is_enabled(event.recipient) {
            return;
        }
        if let Err(e) = self.notifier.send(&event).await {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "Failed to send notification"
            );
        }
    }
}

/// Telegram when enabled and configured, otherwise the log.
fn build_notifier(cfg: &Config) -> Arc<dyn Notifier> {
    if let Some(ref telegram) = cfg.notification.telegram
        && telegram.enabled
        && !telegram.bot_token.is_empty()
    {
        match TelegramNotifier::new(telegram, cfg.staff.operator_chat_id) {
            Ok(notifier) => {
                info!(
                    operator_chat_id = cfg.staff.operator_chat_id,
                    "Telegram notifier created"
                );
                return Arc::new(notifier);
            }
            Err(e) => {
                warn!(error = %e, "Failed to create Telegram notifier");
            }
        }
    }

    info!("Telegram notifications disabled, writing notifications to the log");
    Arc::new(LogNotifier)
}
