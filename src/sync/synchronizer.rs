//! Execution-layer synchronizer
//!
//! One tick resolves the configured block tag once, pins it by hash and then
//! resyncs every registered module against that block:
//!
//! ```text
//! fetch nonce ── equal to stored ──> done, nothing written
//!      │
//!      └─ differs ─> fetch operators + keys ─> commit snapshot (one transaction)
//! ```
//!
//! Modules are independent: each resync runs concurrently, has its own
//! timeout and commits its own transaction. A failure is logged and the
//! module is picked up again on the next tick.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashSet;
use futures::future::join_all;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;
use tracing::Instrument;

use crate::chain::BlockRef;
use crate::chain::BlockTag;
use crate::chain::ChainReader;
use crate::config::AppConfig;
use crate::errors::ErrorKind;
use crate::models::ElMeta;
use crate::models::ModuleSnapshot;
use crate::models::StakingModule;
use crate::modules::ModuleRegistry;
use crate::modules::RegisteredModule;
use crate::store::KeysStore;
use crate::Result;
use crate::StakeKeysError;

/// Result of one module resync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// Nonce matched the stored one
    Unchanged { nonce: u64 },
    /// New snapshot committed
    Changed {
        previous_nonce: Option<u64>,
        nonce: u64,
        operators: usize,
        keys: usize,
    },
    /// A resync of this module was still in flight
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFailure {
    pub module: Address,
    pub kind: ErrorKind,
    pub message: String,
}

/// Summary of one synchronizer tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub block: BlockRef,
    pub changed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failures: Vec<ModuleFailure>,
    /// EL meta was bumped although no module changed
    pub meta_bumped: bool,
}

impl TickReport {
    const fn new(block: BlockRef) -> Self {
        Self {
            block,
            changed: 0,
            unchanged: 0,
            skipped: 0,
            failures: Vec::new(),
            meta_bumped: false,
        }
    }

    #[must_use]
    pub fn checked(&self) -> usize {
        self.changed + self.unchanged + self.failures.len()
    }

    /// Every module was checked successfully and none changed
    #[must_use]
    pub fn all_unchanged(&self) -> bool {
        self.changed == 0 && self.skipped == 0 && self.failures.is_empty()
    }

    /// First failure, for progress reporting
    #[must_use]
    pub fn first_error(&self) -> Option<String> {
        self.failures
            .first()
            .map(|f| format!("{:#x}: {}", f.module, f.message))
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {}: {} checked ({} changed, {} unchanged, {} failed), {} skipped",
            self.block.number,
            self.checked(),
            self.changed,
            self.unchanged,
            self.failures.len(),
            self.skipped
        )
    }
}

/// Removes a module from the in-flight set when the resync ends, however it ends
struct InFlightGuard<'a> {
    in_flight: &'a DashSet<Address>,
    module: Address,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.module);
    }
}

pub struct Synchronizer {
    registry: Arc<ModuleRegistry>,
    store: Arc<dyn KeysStore>,
    reader: Arc<dyn ChainReader>,
    block_tag: BlockTag,
    module_timeout: Duration,
    advance_meta_when_unchanged: bool,
    in_flight: DashSet<Address>,
    modules_registered: AtomicBool,
}

impl Synchronizer {
    #[must_use]
    pub fn new(
        registry: Arc<ModuleRegistry>,
        store: Arc<dyn KeysStore>,
        reader: Arc<dyn ChainReader>,
        block_tag: BlockTag,
        module_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            reader,
            block_tag,
            module_timeout,
            advance_meta_when_unchanged: false,
            in_flight: DashSet::new(),
            modules_registered: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn from_config(
        config: &AppConfig,
        registry: Arc<ModuleRegistry>,
        store: Arc<dyn KeysStore>,
        reader: Arc<dyn ChainReader>,
    ) -> Self {
        Self::new(
            registry,
            store,
            reader,
            config.sync.block_tag,
            config.module_timeout(),
        )
        .with_advance_meta_when_unchanged(config.sync.advance_meta_when_unchanged)
    }

    #[must_use]
    pub const fn with_advance_meta_when_unchanged(mut self, enabled: bool) -> Self {
        self.advance_meta_when_unchanged = enabled;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Write registry modules to the store once per process.
    ///
    /// Existing rows keep their nonce, so a restart does not force a resync.
    ///
    /// # Errors
    /// - Storage errors; retried on the next tick
    pub async fn ensure_modules_registered(&self) -> Result<()> {
        if self.modules_registered.load(Ordering::SeqCst) {
            return Ok(());
        }
        let modules: Vec<StakingModule> = self
            .registry
            .modules()
            .iter()
            .map(|entry| entry.module.clone())
            .collect();
        self.store.upsert_modules(&modules).await?;
        self.modules_registered.store(true, Ordering::SeqCst);
        info!("📋 Registered {} staking modules", modules.len());
        Ok(())
    }

    /// Run one pass over every registered module.
    ///
    /// Per-module failures are reported in the [`TickReport`], never returned.
    ///
    /// # Errors
    /// - The block tag cannot be resolved
    /// - Modules cannot be registered in the store
    pub async fn tick(&self) -> Result<TickReport> {
        self.ensure_modules_registered().await?;

        let block = self.reader.block(self.block_tag).await?;
        debug!(
            "Resolved {:?} to block {} ({:#x})",
            self.block_tag, block.number, block.hash
        );

        let resyncs = self
            .registry
            .modules()
            .iter()
            .map(|entry| self.guarded_resync(entry, block));
        let outcomes = join_all(resyncs).await;

        let mut report = TickReport::new(block);
        for (entry, outcome) in self.registry.modules().iter().zip(outcomes) {
            let address = entry.module.address;
            match outcome {
                Ok(ModuleOutcome::Unchanged { .. }) => report.unchanged += 1,
                Ok(ModuleOutcome::Changed { .. }) => report.changed += 1,
                Ok(ModuleOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    let kind = e.kind();
                    match kind {
                        ErrorKind::TransientFetch => {
                            warn!("Module {:#x} resync failed, retrying next tick: {}", address, e);
                        }
                        _ => error!("Module {:#x} resync failed ({:?}): {}", address, kind, e),
                    }
                    report.failures.push(ModuleFailure {
                        module: address,
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.advance_meta_when_unchanged && report.all_unchanged() {
            match self.store.bump_el_meta(ElMeta::from(block)).await {
                Ok(moved) => report.meta_bumped = moved,
                Err(e) => warn!("Failed to advance EL meta to block {}: {}", block.number, e),
            }
        }

        if report.changed > 0 || !report.failures.is_empty() {
            info!("⛓️  Sync tick {}", report);
        } else {
            debug!("Sync tick {}", report);
        }
        Ok(report)
    }

    /// Resync one module unless a resync of it is already running
    async fn guarded_resync(
        &self,
        entry: &RegisteredModule,
        block: BlockRef,
    ) -> Result<ModuleOutcome> {
        let address = entry.module.address;
        if !self.in_flight.insert(address) {
            debug!("Module {:#x} resync still in flight, skipping", address);
            return Ok(ModuleOutcome::Skipped);
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            module: address,
        };

        let span = info_span!("resync", module = %address, id = entry.module.id);
        match tokio::time::timeout(self.module_timeout, self.resync_module(entry, block))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(StakeKeysError::ResyncTimeout {
                module: format!("{address:#x}"),
                timeout: self.module_timeout,
            }),
        }
    }

    /// Compare nonces and, on change, fetch and commit a full snapshot at `block`
    ///
    /// # Errors
    /// - Any read or the commit fails; nothing is written in that case
    pub async fn resync_module(
        &self,
        entry: &RegisteredModule,
        block: BlockRef,
    ) -> Result<ModuleOutcome> {
        let address = entry.module.address;
        let tag = block.pinned();

        let stored = self
            .store
            .get_module(address)
            .await?
            .ok_or_else(|| StakeKeysError::ModuleNotFound(format!("{address:#x}")))?;

        let nonce = entry.driver.fetch_nonce(address, tag).await?;
        if stored.nonce == Some(nonce) {
            debug!("Nonce {} unchanged", nonce);
            return Ok(ModuleOutcome::Unchanged { nonce });
        }

        let (operators, keys) = tokio::try_join!(
            entry.driver.fetch_operators(address, tag),
            entry.driver.fetch_keys(address, tag),
        )?;

        let snapshot = ModuleSnapshot {
            module_address: address,
            nonce,
            block: ElMeta::from(block),
            operators,
            keys,
        };
        self.store.commit_module_snapshot(&snapshot).await?;

        info!(
            "✅ {} ({}) nonce {:?} -> {}: {} operators, {} keys at block {}",
            entry.module.name,
            entry.module.module_type,
            stored.nonce,
            nonce,
            snapshot.operators.len(),
            snapshot.keys.len(),
            block.number
        );
        Ok(ModuleOutcome::Changed {
            previous_nonce: stored.nonce,
            nonce,
            operators: snapshot.operators.len(),
            keys: snapshot.keys.len(),
        })
    }
}
