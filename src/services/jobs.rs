//! Background Jobs
//!
//! Background runner that drives queued mint requests to chain
//! confirmation.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tracing::{error, info};

use crate::services::blockfrost::ChainIndex;
use crate::services::minting::{MintingConfig, MintingService, NftMinter};

/// Configuration for the mint worker
#[derive(Debug, Clone)]
pub struct MintWorkerConfig {
    /// Interval between worker cycles (default: 60 seconds)
    pub interval: Duration,
    /// Whether the worker is enabled
    pub enabled: bool,
}

impl Default for MintWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

impl MintWorkerConfig {
    /// Load worker settings from `MINT_WORKER_INTERVAL_SECS` and
    /// `MINT_WORKER_ENABLED`, falling back to the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(secs) = std::env::var("MINT_WORKER_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.interval = Duration::from_secs(secs);
            }
        }
        if let Ok(enabled) = std::env::var("MINT_WORKER_ENABLED") {
            config.enabled = enabled != "false" && enabled != "0";
        }
        config
    }
}

/// Background job runner for NFT minting
pub struct MintWorker {
    pool: PgPool,
    minter: Arc<dyn NftMinter>,
    chain: Arc<dyn ChainIndex>,
    minting_config: MintingConfig,
    config: MintWorkerConfig,
}

impl MintWorker {
    pub fn new(
        pool: PgPool,
        minter: Arc<dyn NftMinter>,
        chain: Arc<dyn ChainIndex>,
        minting_config: MintingConfig,
        config: MintWorkerConfig,
    ) -> Self {
        Self {
            pool,
            minter,
            chain,
            minting_config,
            config,
        }
    }

    /// Start the mint worker.
    ///
    /// Returns a shutdown sender that can be used to stop the worker.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        if !self.config.enabled {
            info!("Mint worker is disabled");
            return shutdown_tx;
        }

        let service = MintingService::new(
            self.pool.clone(),
            self.minter.clone(),
            self.chain.clone(),
            self.minting_config.clone(),
        );
        let interval = self.config.interval;

        tokio::spawn(async move {
            info!("Starting mint worker with interval {:?}", interval);

            let mut interval_timer = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        if let Err(e) = run_mint_cycle(&service).await {
                            error!("Mint cycle failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Mint worker shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

/// Run a single mint cycle: submit what is queued, confirm what was
/// submitted. Public so manual triggering and tests can drive one cycle.
pub async fn run_mint_cycle(
    service: &MintingService,
) -> Result<(u32, u32), crate::services::minting::MintingError> {
    let submitted = service.process_queued().await?;
    let confirmed = service.confirm_submitted().await?;
    if submitted > 0 || confirmed > 0 {
        info!(
            submitted = submitted,
            confirmed = confirmed,
            "Mint cycle completed"
        );
    }
    Ok((submitted, confirmed))
}
