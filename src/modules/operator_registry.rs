use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::primitives::U256;
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use futures::TryStreamExt;
use tracing::debug;

use super::abi::INodeOperatorsRegistry;
use super::key_pages;
use super::split_key_blobs;
use super::to_u32;
use super::to_u64;
use super::zero_if_missing;
use super::ModuleDriver;
use super::OPERATOR_READ_CONCURRENCY;
use crate::chain::call_contract;
use crate::chain::BlockTag;
use crate::chain::ChainReader;
use crate::models::ModuleType;
use crate::models::Operator;
use crate::models::RegistryKey;
use crate::Result;
use crate::StakeKeysError;

type OperatorInfo = INodeOperatorsRegistry::getNodeOperatorReturn;

/// Driver for curated and committee operator registries.
///
/// Keys are paged with `getSigningKeys(operator, offset, limit)`; a key is
/// vetted when its index is below the operator's `totalVettedValidators`.
pub struct OperatorRegistryDriver {
    reader: Arc<dyn ChainReader>,
    module_type: ModuleType,
    keys_batch_size: u32,
}

impl OperatorRegistryDriver {
    #[must_use]
    pub fn new(
        reader: Arc<dyn ChainReader>,
        module_type: ModuleType,
        keys_batch_size: u32,
    ) -> Self {
        Self {
            reader,
            module_type,
            keys_batch_size,
        }
    }

    async fn operator_count(&self, module: Address, tag: BlockTag) -> Result<u32> {
        let count = call_contract(
            self.reader.as_ref(),
            module,
            &INodeOperatorsRegistry::getNodeOperatorsCountCall {},
            tag,
        )
        .await?;
        to_u32(count, "getNodeOperatorsCount")
    }

    async fn operator_info(
        &self,
        module: Address,
        index: u32,
        tag: BlockTag,
    ) -> Result<OperatorInfo> {
        let info = call_contract(
            self.reader.as_ref(),
            module,
            &INodeOperatorsRegistry::getNodeOperatorCall {
                _nodeOperatorId: U256::from(index),
                _fullInfo: true,
            },
            tag,
        )
        .await?;
        Ok(info)
    }

    async fn read_operator(&self, module: Address, index: u32, tag: BlockTag) -> Result<Operator> {
        let info = self.operator_info(module, index, tag).await?;
        let finalized_used = zero_if_missing(
            self.operator_info(module, index, BlockTag::Finalized)
                .await
                .map(|finalized| finalized.totalDepositedValidators),
        )?;

        Ok(Operator {
            module_address: module,
            index,
            active: info.active,
            name: info.name,
            reward_address: info.rewardAddress,
            total_signing_keys: info.totalAddedValidators,
            used_signing_keys: info.totalDepositedValidators,
            vetted_signing_keys: info.totalVettedValidators,
            stopped_validators: info.totalExitedValidators,
            finalized_used_signing_keys: finalized_used,
        })
    }

    async fn read_operator_keys(
        &self,
        module: Address,
        index: u32,
        tag: BlockTag,
    ) -> Result<Vec<RegistryKey>> {
        let info = self.operator_info(module, index, tag).await?;
        let mut keys = Vec::with_capacity(usize::try_from(info.totalAddedValidators).unwrap_or(0));

        for (offset, limit) in key_pages(info.totalAddedValidators, self.keys_batch_size) {
            let page = call_contract(
                self.reader.as_ref(),
                module,
                &INodeOperatorsRegistry::getSigningKeysCall {
                    _nodeOperatorId: U256::from(index),
                    _offset: U256::from(offset),
                    _limit: U256::from(limit),
                },
                tag,
            )
            .await?;

            let pairs = split_key_blobs(&page.pubkeys, &page.signatures)?;
            if pairs.len() as u64 != limit || page.used.len() != pairs.len() {
                return Err(StakeKeysError::decode(format!(
                    "operator {index} page at {offset}: expected {limit} keys, got {} keys and {} flags",
                    pairs.len(),
                    page.used.len()
                )));
            }

            for (i, ((key, deposit_signature), used)) in
                pairs.into_iter().zip(page.used).enumerate()
            {
                let key_index = offset + i as u64;
                keys.push(RegistryKey {
                    module_address: module,
                    operator_index: index,
                    index: u32::try_from(key_index).map_err(|_| {
                        StakeKeysError::decode(format!("key index {key_index} overflows u32"))
                    })?,
                    key,
                    deposit_signature,
                    used,
                    vetted: key_index < info.totalVettedValidators,
                });
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ModuleDriver for OperatorRegistryDriver {
    fn classify(&self) -> ModuleType {
        self.module_type
    }

    async fn fetch_nonce(&self, module: Address, tag: BlockTag) -> Result<u64> {
        let nonce = call_contract(
            self.reader.as_ref(),
            module,
            &INodeOperatorsRegistry::getNonceCall {},
            tag,
        )
        .await?;
        to_u64(nonce, "getNonce")
    }

    async fn fetch_operators(&self, module: Address, tag: BlockTag) -> Result<Vec<Operator>> {
        let count = self.operator_count(module, tag).await?;
        debug!("Reading {} operators from {:#x}", count, module);

        stream::iter(0..count)
            .map(|index| self.read_operator(module, index, tag))
            .buffered(OPERATOR_READ_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn fetch_keys(&self, module: Address, tag: BlockTag) -> Result<Vec<RegistryKey>> {
        let count = self.operator_count(module, tag).await?;

        let per_operator: Vec<Vec<RegistryKey>> = stream::iter(0..count)
            .map(|index| self.read_operator_keys(module, index, tag))
            .buffered(OPERATOR_READ_CONCURRENCY)
            .try_collect()
            .await?;

        let deduped: BTreeMap<(u32, u32), RegistryKey> = per_operator
            .into_iter()
            .flatten()
            .map(|key| (key.identity(), key))
            .collect();

        Ok(deduped.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Bytes;
    use alloy::sol_types::SolCall;

    use super::*;
    use crate::models::PUBKEY_LENGTH;
    use crate::models::SIGNATURE_LENGTH;
    use crate::tests::mock_chain::ScriptedChainReader;

    const MODULE: Address = Address::repeat_byte(0x10);

    fn operator_return(
        active: bool,
        name: &str,
        added: u64,
        vetted: u64,
        deposited: u64,
    ) -> Vec<u8> {
        INodeOperatorsRegistry::getNodeOperatorCall::abi_encode_returns(&OperatorInfo {
            active,
            name: name.to_string(),
            rewardAddress: Address::repeat_byte(0xee),
            totalVettedValidators: vetted,
            totalExitedValidators: 0,
            totalAddedValidators: added,
            totalDepositedValidators: deposited,
        })
    }

    fn keys_return(first_byte: u8, count: usize, used: Vec<bool>) -> Vec<u8> {
        let pubkeys: Vec<u8> = (0..count)
            .flat_map(|i| vec![first_byte + i as u8; PUBKEY_LENGTH])
            .collect();
        let signatures = vec![0x5a; SIGNATURE_LENGTH * count];
        INodeOperatorsRegistry::getSigningKeysCall::abi_encode_returns(
            &INodeOperatorsRegistry::getSigningKeysReturn {
                pubkeys: Bytes::from(pubkeys),
                signatures: Bytes::from(signatures),
                used,
            },
        )
    }

    fn get_operator(index: u32) -> INodeOperatorsRegistry::getNodeOperatorCall {
        INodeOperatorsRegistry::getNodeOperatorCall {
            _nodeOperatorId: U256::from(index),
            _fullInfo: true,
        }
    }

    fn get_keys(index: u32, offset: u64, limit: u64) -> INodeOperatorsRegistry::getSigningKeysCall {
        INodeOperatorsRegistry::getSigningKeysCall {
            _nodeOperatorId: U256::from(index),
            _offset: U256::from(offset),
            _limit: U256::from(limit),
        }
    }

    fn scripted_registry() -> ScriptedChainReader {
        let reader = ScriptedChainReader::new();
        reader.respond(
            MODULE,
            &INodeOperatorsRegistry::getNonceCall {},
            INodeOperatorsRegistry::getNonceCall::abi_encode_returns(&U256::from(6)),
        );
        reader.respond(
            MODULE,
            &INodeOperatorsRegistry::getNodeOperatorsCountCall {},
            INodeOperatorsRegistry::getNodeOperatorsCountCall::abi_encode_returns(&U256::from(2)),
        );
        reader.respond(MODULE, &get_operator(0), operator_return(true, "alpha", 3, 2, 1));
        reader.respond(MODULE, &get_operator(1), operator_return(false, "beta", 1, 1, 0));
        reader.respond(MODULE, &get_keys(0, 0, 2), keys_return(0x01, 2, vec![true, false]));
        reader.respond(MODULE, &get_keys(0, 2, 1), keys_return(0x03, 1, vec![false]));
        reader.respond(MODULE, &get_keys(1, 0, 1), keys_return(0x07, 1, vec![false]));
        reader
    }

    #[tokio::test]
    async fn test_fetch_nonce() {
        let reader = Arc::new(scripted_registry());
        let driver = OperatorRegistryDriver::new(reader, ModuleType::Curated, 2);
        assert_eq!(driver.fetch_nonce(MODULE, BlockTag::Latest).await.unwrap(), 6);
        assert_eq!(driver.classify(), ModuleType::Curated);
    }

    #[tokio::test]
    async fn test_fetch_operators_reads_finalized_usage() {
        let reader = scripted_registry();
        // At the finalized block operator 0 had no deposits yet and operator 1 did not exist
        reader.respond_at(
            MODULE,
            &get_operator(0),
            BlockTag::Finalized,
            operator_return(true, "alpha", 3, 2, 0),
        );
        reader.revert_at(MODULE, &get_operator(1), BlockTag::Finalized);

        let driver = OperatorRegistryDriver::new(Arc::new(reader), ModuleType::Curated, 2);
        let operators = driver.fetch_operators(MODULE, BlockTag::Latest).await.unwrap();

        assert_eq!(operators.len(), 2);
        assert_eq!(operators[0].name, "alpha");
        assert_eq!(operators[0].total_signing_keys, 3);
        assert_eq!(operators[0].used_signing_keys, 1);
        assert_eq!(operators[0].finalized_used_signing_keys, 0);
        assert!(!operators[1].active);
        assert_eq!(operators[1].finalized_used_signing_keys, 0);
    }

    #[tokio::test]
    async fn test_fetch_keys_pages_and_flags() {
        let driver =
            OperatorRegistryDriver::new(Arc::new(scripted_registry()), ModuleType::Committee, 2);
        let keys = driver.fetch_keys(MODULE, BlockTag::Latest).await.unwrap();

        assert_eq!(keys.len(), 4);
        let identities: Vec<_> = keys.iter().map(RegistryKey::identity).collect();
        assert_eq!(identities, vec![(0, 0), (0, 1), (0, 2), (1, 0)]);

        assert!(keys[0].used && keys[0].vetted);
        assert!(!keys[1].used && keys[1].vetted);
        // Index 2 is beyond totalVettedValidators = 2
        assert!(!keys[2].vetted);
        assert_eq!(keys[2].key, format!("0x{}", "03".repeat(PUBKEY_LENGTH)));
        assert_eq!(keys[3].operator_index, 1);
    }

    #[tokio::test]
    async fn test_short_page_is_decode_error() {
        let reader = scripted_registry();
        reader.respond(MODULE, &get_keys(0, 0, 2), keys_return(0x01, 1, vec![true]));

        let driver = OperatorRegistryDriver::new(Arc::new(reader), ModuleType::Curated, 2);
        let err = driver.fetch_keys(MODULE, BlockTag::Latest).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transient() {
        let reader = scripted_registry();
        reader.set_offline(true);

        let driver = OperatorRegistryDriver::new(Arc::new(reader), ModuleType::Curated, 2);
        let err = driver.fetch_nonce(MODULE, BlockTag::Latest).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::TransientFetch);
    }
}
