//! Worker runtime hosting the synchronizer and the consensus tracker
//!
//! Both loops run as independent tokio tasks on their own interval and share
//! nothing but the store. Shutdown:
//!
//! 1. The cancellation token fires (SIGINT, SIGTERM or the caller)
//! 2. Loops stop scheduling new ticks and finish the one in progress
//! 3. After the grace period, still-running ticks are aborted; dropping them
//!    rolls back any open transaction

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::consensus::ConsensusTick;
use super::consensus::ConsensusTracker;
use super::lock_file::LoopKind;
use super::lock_file::WorkerLockManager;
use super::lock_file::WorkerStatus;
use super::synchronizer::Synchronizer;
use super::synchronizer::TickReport;
use crate::chain::AlloyChainReader;
use crate::chain::BeaconClient;
use crate::chain::ChainReader;
use crate::chain::ConsensusReader;
use crate::config::AppConfig;
use crate::models::AppInfo;
use crate::modules::ModuleRegistry;
use crate::store::KeysStore;
use crate::Result;
use crate::StakeKeysError;

/// Runtime settings taken from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub chain_id: u64,
    pub locator_address: Address,
    pub el_interval: Duration,
    pub cl_interval: Duration,
    pub shutdown_grace: Duration,
    pub lock_file_path: PathBuf,
}

impl WorkerSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chain_id: config.chain_id(),
            locator_address: config.chain.locator_address,
            el_interval: config.el_interval(),
            cl_interval: config.cl_interval(),
            shutdown_grace: config.shutdown_grace(),
            lock_file_path: PathBuf::from(&config.sync.lock_file_path),
        }
    }
}

/// Result of [`WorkerRuntime::run_once`]
#[derive(Debug, Clone)]
pub struct OnceReport {
    pub execution: TickReport,
    pub consensus: ConsensusTick,
}

pub struct WorkerRuntime {
    settings: WorkerSettings,
    store: Arc<dyn KeysStore>,
    reader: Arc<dyn ChainReader>,
    synchronizer: Arc<Synchronizer>,
    tracker: Arc<ConsensusTracker>,
    lock: Arc<WorkerLockManager>,
}

impl WorkerRuntime {
    #[must_use]
    pub fn new(
        settings: WorkerSettings,
        store: Arc<dyn KeysStore>,
        reader: Arc<dyn ChainReader>,
        synchronizer: Synchronizer,
        tracker: ConsensusTracker,
    ) -> Self {
        let lock = Arc::new(WorkerLockManager::new(settings.lock_file_path.clone()));
        Self {
            settings,
            store,
            reader,
            synchronizer: Arc::new(synchronizer),
            tracker: Arc::new(tracker),
            lock,
        }
    }

    /// Wire chain clients, the module registry and both loops from config
    ///
    /// # Errors
    /// - Invalid endpoint URLs
    /// - Module discovery fails or finds nothing
    pub async fn from_config(config: &AppConfig, store: Arc<dyn KeysStore>) -> Result<Self> {
        let reader: Arc<dyn ChainReader> = Arc::new(AlloyChainReader::from_config(config)?);
        let beacon: Arc<dyn ConsensusReader> = Arc::new(BeaconClient::from_config(config)?);

        let registry = Arc::new(ModuleRegistry::from_config(config, reader.clone()).await?);
        info!(
            "📦 Module registry ready: {}",
            registry
                .modules()
                .iter()
                .map(|m| format!("{}#{} ({})", m.module.name, m.module.id, m.module.module_type))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let synchronizer =
            Synchronizer::from_config(config, registry, store.clone(), reader.clone());
        let tracker = ConsensusTracker::new(beacon, store.clone(), config.sync.track_validators);

        Ok(Self::new(
            WorkerSettings::from_config(config),
            store,
            reader,
            synchronizer,
            tracker,
        ))
    }

    #[must_use]
    pub fn lock_manager(&self) -> &WorkerLockManager {
        &self.lock
    }

    /// Refuse to run against the wrong chain or a store written for another one
    ///
    /// # Errors
    /// - [`StakeKeysError::ConfigError`] on a chain id or AppInfo mismatch
    /// - Chain or storage errors while checking
    pub async fn startup_checks(&self) -> Result<()> {
        let node_chain_id = self.reader.chain_id().await?;
        if node_chain_id != self.settings.chain_id {
            return Err(StakeKeysError::ConfigError(format!(
                "execution node reports chain id {node_chain_id}, configured chain id is {}",
                self.settings.chain_id
            )));
        }

        let expected = AppInfo {
            chain_id: self.settings.chain_id,
            locator_address: self.settings.locator_address,
        };
        match self.store.get_app_info().await? {
            Some(stored) if stored == expected => {}
            Some(stored) => {
                return Err(StakeKeysError::ConfigError(format!(
                    "store was initialized for chain {} (locator {:#x}), configured chain {} (locator {:#x}); run `reset` first",
                    stored.chain_id,
                    stored.locator_address,
                    expected.chain_id,
                    expected.locator_address
                )));
            }
            None => {
                self.store.save_app_info(expected).await?;
                info!("📝 Recorded app info for chain {}", expected.chain_id);
            }
        }

        Ok(())
    }

    /// Run one synchronizer tick and one consensus tick, then return
    ///
    /// # Errors
    /// - Startup checks fail or another worker holds the lock
    /// - Either tick fails as a whole
    pub async fn run_once(&self) -> Result<OnceReport> {
        self.startup_checks().await?;
        self.lock.acquire()?;

        let result: Result<OnceReport> = async {
            let execution = self.synchronizer.tick().await?;
            let consensus = self.tracker.tick().await?;
            Ok(OnceReport {
                execution,
                consensus,
            })
        }
        .await;

        self.lock.remove_lock()?;
        result
    }

    /// Run both loops until `shutdown` is cancelled
    ///
    /// # Errors
    /// - Startup checks fail or another worker holds the lock
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.startup_checks().await?;
        self.lock.acquire()?;
        info!(
            "🚀 Worker started: EL every {:?}, CL every {:?}",
            self.settings.el_interval, self.settings.cl_interval
        );

        let execution = spawn_execution_loop(
            self.synchronizer.clone(),
            self.lock.clone(),
            self.settings.el_interval,
            shutdown.child_token(),
        );
        let consensus = spawn_consensus_loop(
            self.tracker.clone(),
            self.lock.clone(),
            self.settings.cl_interval,
            shutdown.child_token(),
        );

        shutdown.cancelled().await;
        info!(
            "🛑 Shutdown requested, waiting up to {:?} for in-flight ticks",
            self.settings.shutdown_grace
        );
        if let Err(e) = self.lock.update_status(WorkerStatus::Stopping, None) {
            warn!("Failed to update lock file: {}", e);
        }

        let execution_abort = execution.abort_handle();
        let consensus_abort = consensus.abort_handle();
        let drained = tokio::time::timeout(self.settings.shutdown_grace, async {
            let (el, cl) = tokio::join!(execution, consensus);
            for joined in [el, cl] {
                if let Err(e) = joined {
                    error!("Worker loop panicked: {}", e);
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("⏱️  Grace period elapsed, aborting in-flight ticks");
            execution_abort.abort();
            consensus_abort.abort();
        }

        self.lock.update_status(WorkerStatus::Stopped, None)?;
        self.lock.remove_lock()?;
        info!("👋 Worker stopped");
        Ok(())
    }

    /// Run until SIGINT or SIGTERM
    ///
    /// # Errors
    /// - See [`WorkerRuntime::run`]
    pub async fn run_until_signal(&self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(signal) => info!("Received {}", signal),
                Err(e) => error!("Failed to listen for shutdown signals: {}", e),
            }
            trigger.cancel();
        });
        self.run(shutdown).await
    }
}

/// Resolve on the first SIGINT or SIGTERM
///
/// # Errors
/// - Signal handlers cannot be installed
pub async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

fn spawn_execution_loop(
    synchronizer: Arc<Synchronizer>,
    lock: Arc<WorkerLockManager>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let (position, failure) = match synchronizer.tick().await {
                        Ok(report) => (Some(report.block.number), report.first_error()),
                        Err(e) => {
                            warn!("Sync tick failed: {}", e);
                            (None, Some(e.to_string()))
                        }
                    };
                    if let Err(e) =
                        lock.record_tick(LoopKind::Execution, position, failure.as_deref())
                    {
                        warn!("Failed to update lock file: {}", e);
                    }
                }
            }
        }
    })
}

fn spawn_consensus_loop(
    tracker: Arc<ConsensusTracker>,
    lock: Arc<WorkerLockManager>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let (position, failure) = match tracker.tick().await {
                        Ok(tick) => (Some(tick.slot()), None),
                        Err(e) => {
                            warn!("Consensus tick failed: {}", e);
                            (None, Some(e.to_string()))
                        }
                    };
                    if let Err(e) =
                        lock.record_tick(LoopKind::Consensus, position, failure.as_deref())
                    {
                        warn!("Failed to update lock file: {}", e);
                    }
                }
            }
        }
    })
}
