//! Execution- and consensus-layer access
//!
//! The synchronizer and consensus tracker only see the [`ChainReader`] and
//! [`ConsensusReader`] traits. Concrete implementations:
//!
//! - [`AlloyChainReader`]: JSON-RPC over `alloy` providers with endpoint failover
//! - [`BeaconClient`]: Beacon API over `reqwest` with endpoint failover

use alloy::eips::BlockId;
use alloy::primitives::Address;
use alloy::primitives::Bytes;
use alloy::primitives::B256;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::ChainError;
use crate::models::ClMeta;
use crate::models::ElMeta;
use crate::models::Validator;

pub mod beacon;
pub mod execution;

pub use beacon::BeaconClient;
pub use execution::AlloyChainReader;

/// Block selector for execution-layer reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    Latest,
    Safe,
    Finalized,
    Number(u64),
    Hash(B256),
}

impl BlockTag {
    #[must_use]
    pub fn to_block_id(self) -> BlockId {
        match self {
            Self::Latest => BlockId::latest(),
            Self::Safe => BlockId::safe(),
            Self::Finalized => BlockId::finalized(),
            Self::Number(number) => BlockId::number(number),
            Self::Hash(hash) => BlockId::hash(hash),
        }
    }
}

/// A resolved execution-layer block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
}

impl BlockRef {
    /// Tag that pins reads to exactly this block
    #[must_use]
    pub const fn pinned(&self) -> BlockTag {
        BlockTag::Hash(self.hash)
    }
}

impl From<BlockRef> for ElMeta {
    fn from(block: BlockRef) -> Self {
        Self {
            block_number: block.number,
            block_hash: block.hash,
            timestamp: block.timestamp,
        }
    }
}

/// Read access to execution-layer state
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Resolve a tag to a concrete block
    async fn block(&self, tag: BlockTag) -> Result<BlockRef, ChainError>;

    /// `eth_call` against `contract` at `tag`
    async fn call(
        &self,
        contract: Address,
        calldata: Bytes,
        tag: BlockTag,
    ) -> Result<Bytes, ChainError>;
}

/// Read access to consensus-layer state
#[async_trait]
pub trait ConsensusReader: Send + Sync {
    /// Latest finalized beacon block with its execution payload reference
    async fn finalized_snapshot(&self) -> Result<ClMeta, ChainError>;

    /// Validator set of the given beacon state
    async fn validators(&self, state_root: B256) -> Result<Vec<Validator>, ChainError>;
}

/// ABI-encode `call`, execute it and decode the return data
pub async fn call_contract<C: SolCall + Send + Sync>(
    reader: &dyn ChainReader,
    contract: Address,
    call: &C,
    tag: BlockTag,
) -> Result<C::Return, ChainError> {
    let output = reader
        .call(contract, Bytes::from(call.abi_encode()), tag)
        .await?;

    C::abi_decode_returns(&output).map_err(|e| {
        ChainError::Decode(format!(
            "{} on {contract:#x} returned malformed data: {e}",
            C::SIGNATURE
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_tag_deserializes_from_config_strings() {
        #[derive(Deserialize)]
        struct Wrapper {
            tag: BlockTag,
        }
        let parsed: Wrapper = toml::from_str(r#"tag = "finalized""#).unwrap();
        assert_eq!(parsed.tag, BlockTag::Finalized);
        let parsed: Wrapper = toml::from_str(r#"tag = "latest""#).unwrap();
        assert_eq!(parsed.tag, BlockTag::Latest);
    }

    #[test]
    fn test_pinned_tag_uses_hash() {
        let block = BlockRef {
            number: 42,
            hash: B256::repeat_byte(0xab),
            timestamp: 1_700_000_000,
        };
        assert_eq!(block.pinned(), BlockTag::Hash(B256::repeat_byte(0xab)));

        let meta = ElMeta::from(block);
        assert_eq!(meta.block_number, 42);
        assert_eq!(meta.timestamp, 1_700_000_000);
    }
}
