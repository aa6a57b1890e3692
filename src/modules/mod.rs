//! Staking module drivers
//!
//! Every on-chain module flavour is read through [`ModuleDriver`]. The
//! synchronizer never looks at the concrete type: it asks the
//! [`ModuleRegistry`] for the driver bound to each module and calls the same
//! four operations on all of them.
//!
//! Drivers:
//! - [`OperatorRegistryDriver`]: curated and committee registries
//! - [`CommunityDriver`]: permissionless community module

use alloy::primitives::Address;
use alloy::primitives::U256;
use async_trait::async_trait;

use crate::chain::BlockTag;
use crate::errors::ChainError;
use crate::models::to_prefixed_hex;
use crate::models::ModuleType;
use crate::models::Operator;
use crate::models::RegistryKey;
use crate::models::PUBKEY_LENGTH;
use crate::models::SIGNATURE_LENGTH;
use crate::Result;
use crate::StakeKeysError;

pub mod abi;
mod community;
mod operator_registry;
pub mod registry;

pub use community::CommunityDriver;
pub use operator_registry::OperatorRegistryDriver;
pub use registry::ModuleRegistry;
pub use registry::RegisteredModule;

/// Concurrent operator reads per module
const OPERATOR_READ_CONCURRENCY: usize = 8;

/// Read access to one module flavour.
///
/// All methods are side-effect free. Implementations must honour `tag` on
/// every underlying read so a resync never mixes state from different blocks.
#[async_trait]
pub trait ModuleDriver: Send + Sync {
    /// Static module type tag
    fn classify(&self) -> ModuleType;

    /// On-chain change counter (`keysOpIndex`)
    async fn fetch_nonce(&self, module: Address, tag: BlockTag) -> Result<u64>;

    /// Full operator set ordered by index
    async fn fetch_operators(&self, module: Address, tag: BlockTag) -> Result<Vec<Operator>>;

    /// Full deduplicated key set ordered by `(operator_index, index)`
    async fn fetch_keys(&self, module: Address, tag: BlockTag) -> Result<Vec<RegistryKey>>;
}

pub(crate) fn to_u64(value: U256, what: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StakeKeysError::decode(format!("{what} overflows u64: {value}")))
}

pub(crate) fn to_u32(value: U256, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StakeKeysError::decode(format!("{what} overflows u32: {value}")))
}

/// Split concatenated pubkey and signature blobs into hex-encoded pairs
pub(crate) fn split_key_blobs(pubkeys: &[u8], signatures: &[u8]) -> Result<Vec<(String, String)>> {
    if pubkeys.len() % PUBKEY_LENGTH != 0 {
        return Err(StakeKeysError::decode(format!(
            "pubkey blob of {} bytes is not a multiple of {PUBKEY_LENGTH}",
            pubkeys.len()
        )));
    }
    if signatures.len() % SIGNATURE_LENGTH != 0 {
        return Err(StakeKeysError::decode(format!(
            "signature blob of {} bytes is not a multiple of {SIGNATURE_LENGTH}",
            signatures.len()
        )));
    }

    let key_count = pubkeys.len() / PUBKEY_LENGTH;
    if key_count != signatures.len() / SIGNATURE_LENGTH {
        return Err(StakeKeysError::decode(format!(
            "{key_count} pubkeys but {} signatures",
            signatures.len() / SIGNATURE_LENGTH
        )));
    }

    Ok(pubkeys
        .chunks_exact(PUBKEY_LENGTH)
        .zip(signatures.chunks_exact(SIGNATURE_LENGTH))
        .map(|(key, sig)| (to_prefixed_hex(key), to_prefixed_hex(sig)))
        .collect())
}

/// Page boundaries `(offset, limit)` covering `total` keys
pub(crate) fn key_pages(total: u64, batch_size: u32) -> impl Iterator<Item = (u64, u64)> {
    let batch = u64::from(batch_size.max(1));
    (0..total)
        .step_by(usize::try_from(batch).unwrap_or(usize::MAX))
        .map(move |offset| (offset, batch.min(total - offset)))
}

/// A reverted read at the finalized block means the operator did not exist yet
pub(crate) fn zero_if_missing(result: Result<u64>) -> Result<u64> {
    match result {
        Err(StakeKeysError::Chain(ChainError::Revert(_))) => Ok(0),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_key_blobs() {
        let pubkeys = [[0x11u8; PUBKEY_LENGTH], [0x22u8; PUBKEY_LENGTH]].concat();
        let signatures = [[0xaau8; SIGNATURE_LENGTH], [0xbbu8; SIGNATURE_LENGTH]].concat();

        let pairs = split_key_blobs(&pubkeys, &signatures).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0, format!("0x{}", "22".repeat(PUBKEY_LENGTH)));
        assert_eq!(pairs[0].1, format!("0x{}", "aa".repeat(SIGNATURE_LENGTH)));
    }

    #[test]
    fn test_split_rejects_truncated_pubkeys() {
        let err = split_key_blobs(&[0u8; PUBKEY_LENGTH + 1], &[0u8; SIGNATURE_LENGTH]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }

    #[test]
    fn test_split_rejects_count_mismatch() {
        let err =
            split_key_blobs(&[0u8; PUBKEY_LENGTH * 2], &[0u8; SIGNATURE_LENGTH]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }

    #[test]
    fn test_key_pages() {
        let pages: Vec<_> = key_pages(25, 10).collect();
        assert_eq!(pages, vec![(0, 10), (10, 10), (20, 5)]);
        assert_eq!(key_pages(0, 10).count(), 0);
        assert_eq!(key_pages(10, 10).collect::<Vec<_>>(), vec![(0, 10)]);
    }

    #[test]
    fn test_numeric_overflow_is_decode_error() {
        assert_eq!(to_u64(U256::from(7u64), "count").unwrap(), 7);
        let err = to_u32(U256::from(u64::MAX), "operators").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }
}
