//! Consensus-layer tracker
//!
//! Follows the finalized beacon block and records it as CL meta, optionally
//! together with the finalized validator set. Runs on its own cadence with no
//! dependency on the synchronizer.

use std::sync::Arc;

use tracing::debug;
use tracing::info;

use crate::chain::ConsensusReader;
use crate::models::ClMeta;
use crate::store::KeysStore;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusTick {
    /// The finalized slot did not move past the stored one
    Unchanged { slot: u64 },
    /// New CL meta committed
    Advanced {
        meta: ClMeta,
        /// Validators stored with it, when tracked
        validators: Option<usize>,
    },
}

impl ConsensusTick {
    #[must_use]
    pub const fn slot(&self) -> u64 {
        match self {
            Self::Unchanged { slot } => *slot,
            Self::Advanced { meta, .. } => meta.slot,
        }
    }
}

pub struct ConsensusTracker {
    reader: Arc<dyn ConsensusReader>,
    store: Arc<dyn KeysStore>,
    track_validators: bool,
}

impl ConsensusTracker {
    #[must_use]
    pub fn new(
        reader: Arc<dyn ConsensusReader>,
        store: Arc<dyn KeysStore>,
        track_validators: bool,
    ) -> Self {
        Self {
            reader,
            store,
            track_validators,
        }
    }

    /// Record the latest finalized snapshot if it is newer than the stored one
    ///
    /// # Errors
    /// - Beacon API failures; nothing is written
    /// - Storage errors; CL meta and validators stay at their previous values
    pub async fn tick(&self) -> Result<ConsensusTick> {
        let snapshot = self.reader.finalized_snapshot().await?;

        if let Some(current) = self.store.get_cl_meta().await? {
            // A lagging beacon node must not move CL meta backwards
            if snapshot.slot <= current.slot {
                debug!(
                    "Finalized slot {} not newer than stored slot {}",
                    snapshot.slot, current.slot
                );
                return Ok(ConsensusTick::Unchanged { slot: current.slot });
            }
        }

        let validators = if self.track_validators {
            Some(self.reader.validators(snapshot.slot_state_root).await?)
        } else {
            None
        };

        self.store
            .commit_consensus_snapshot(snapshot, validators.as_deref())
            .await?;

        info!(
            "🔗 Finalized epoch {} slot {} -> EL block {}{}",
            snapshot.epoch,
            snapshot.slot,
            snapshot.block_number,
            validators
                .as_ref()
                .map(|v| format!(", {} validators", v.len()))
                .unwrap_or_default()
        );

        Ok(ConsensusTick::Advanced {
            meta: snapshot,
            validators: validators.map(|v| v.len()),
        })
    }
}
