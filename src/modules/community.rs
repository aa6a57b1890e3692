use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::primitives::U256;
use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use futures::TryStreamExt;
use tracing::debug;

use super::abi::ICommunityModule;
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

/// Driver for the permissionless community module.
///
/// Operators carry no name and cannot be deactivated. Key flags are derived
/// from the operator counters: `used` below `totalDepositedKeys`, `vetted`
/// below `totalVettedKeys`.
pub struct CommunityDriver {
    reader: Arc<dyn ChainReader>,
    keys_batch_size: u32,
}

impl CommunityDriver {
    #[must_use]
    pub fn new(reader: Arc<dyn ChainReader>, keys_batch_size: u32) -> Self {
        Self {
            reader,
            keys_batch_size,
        }
    }

    async fn operator_count(&self, module: Address, tag: BlockTag) -> Result<u32> {
        let count = call_contract(
            self.reader.as_ref(),
            module,
            &ICommunityModule::getNodeOperatorsCountCall {},
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
    ) -> Result<ICommunityModule::NodeOperator> {
        let info = call_contract(
            self.reader.as_ref(),
            module,
            &ICommunityModule::getNodeOperatorCall {
                nodeOperatorId: U256::from(index),
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
                .map(|finalized| u64::from(finalized.totalDepositedKeys)),
        )?;

        Ok(Operator {
            module_address: module,
            index,
            active: true,
            name: String::new(),
            reward_address: info.rewardAddress,
            total_signing_keys: u64::from(info.totalAddedKeys),
            used_signing_keys: u64::from(info.totalDepositedKeys),
            vetted_signing_keys: u64::from(info.totalVettedKeys),
            stopped_validators: u64::from(info.totalExitedKeys),
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
        let total = u64::from(info.totalAddedKeys);
        let mut keys = Vec::with_capacity(info.totalAddedKeys as usize);

        for (start, count) in key_pages(total, self.keys_batch_size) {
            let page = call_contract(
                self.reader.as_ref(),
                module,
                &ICommunityModule::getSigningKeysWithSignaturesCall {
                    nodeOperatorId: U256::from(index),
                    startIndex: U256::from(start),
                    keysCount: U256::from(count),
                },
                tag,
            )
            .await?;

            let pairs = split_key_blobs(&page.keys, &page.signatures)?;
            if pairs.len() as u64 != count {
                return Err(StakeKeysError::decode(format!(
                    "operator {index} page at {start}: expected {count} keys, got {}",
                    pairs.len()
                )));
            }

            for (i, (key, deposit_signature)) in pairs.into_iter().enumerate() {
                // Bounded by totalAddedKeys, a u32
                let key_index = start as u32 + i as u32;
                keys.push(RegistryKey {
                    module_address: module,
                    operator_index: index,
                    index: key_index,
                    key,
                    deposit_signature,
                    used: key_index < info.totalDepositedKeys,
                    vetted: key_index < info.totalVettedKeys,
                });
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ModuleDriver for CommunityDriver {
    fn classify(&self) -> ModuleType {
        ModuleType::Community
    }

    async fn fetch_nonce(&self, module: Address, tag: BlockTag) -> Result<u64> {
        let nonce = call_contract(
            self.reader.as_ref(),
            module,
            &ICommunityModule::getNonceCall {},
            tag,
        )
        .await?;
        to_u64(nonce, "getNonce")
    }

    async fn fetch_operators(&self, module: Address, tag: BlockTag) -> Result<Vec<Operator>> {
        let count = self.operator_count(module, tag).await?;
        debug!("Reading {} community operators from {:#x}", count, module);

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

    const MODULE: Address = Address::repeat_byte(0x20);

    fn node_operator(added: u32, deposited: u32, vetted: u32) -> Vec<u8> {
        ICommunityModule::getNodeOperatorCall::abi_encode_returns(&ICommunityModule::NodeOperator {
            totalAddedKeys: added,
            totalWithdrawnKeys: 0,
            totalDepositedKeys: deposited,
            totalVettedKeys: vetted,
            stuckValidatorsCount: 0,
            depositableValidatorsCount: vetted - deposited,
            targetLimit: 0,
            targetLimitMode: 0,
            totalExitedKeys: 0,
            enqueuedCount: 0,
            managerAddress: Address::repeat_byte(0x01),
            proposedManagerAddress: Address::ZERO,
            rewardAddress: Address::repeat_byte(0x02),
            proposedRewardAddress: Address::ZERO,
            extendedManagerPermissions: false,
        })
    }

    fn signing_keys(count: usize) -> Vec<u8> {
        ICommunityModule::getSigningKeysWithSignaturesCall::abi_encode_returns(
            &ICommunityModule::getSigningKeysWithSignaturesReturn {
                keys: Bytes::from(vec![0x42; PUBKEY_LENGTH * count]),
                signatures: Bytes::from(vec![0x24; SIGNATURE_LENGTH * count]),
            },
        )
    }

    fn get_operator(index: u32) -> ICommunityModule::getNodeOperatorCall {
        ICommunityModule::getNodeOperatorCall {
            nodeOperatorId: U256::from(index),
        }
    }

    fn scripted_module() -> ScriptedChainReader {
        let reader = ScriptedChainReader::new();
        reader.respond(
            MODULE,
            &ICommunityModule::getNodeOperatorsCountCall {},
            ICommunityModule::getNodeOperatorsCountCall::abi_encode_returns(&U256::from(1)),
        );
        reader.respond(MODULE, &get_operator(0), node_operator(3, 1, 2));
        reader.respond(
            MODULE,
            &ICommunityModule::getSigningKeysWithSignaturesCall {
                nodeOperatorId: U256::from(0),
                startIndex: U256::from(0),
                keysCount: U256::from(3),
            },
            signing_keys(3),
        );
        reader
    }

    #[tokio::test]
    async fn test_operators_are_active_and_unnamed() {
        let driver = CommunityDriver::new(Arc::new(scripted_module()), 100);
        let operators = driver.fetch_operators(MODULE, BlockTag::Latest).await.unwrap();

        assert_eq!(operators.len(), 1);
        assert!(operators[0].active);
        assert!(operators[0].name.is_empty());
        assert_eq!(operators[0].reward_address, Address::repeat_byte(0x02));
        assert_eq!(operators[0].total_signing_keys, 3);
        assert_eq!(operators[0].finalized_used_signing_keys, 1);
    }

    #[tokio::test]
    async fn test_key_flags_follow_counters() {
        let driver = CommunityDriver::new(Arc::new(scripted_module()), 100);
        let keys = driver.fetch_keys(MODULE, BlockTag::Latest).await.unwrap();

        let flags: Vec<_> = keys.iter().map(|k| (k.index, k.used, k.vetted)).collect();
        assert_eq!(flags, vec![(0, true, true), (1, false, true), (2, false, false)]);
    }

    #[tokio::test]
    async fn test_misaligned_signature_blob_is_decode_error() {
        let reader = scripted_module();
        reader.respond(
            MODULE,
            &ICommunityModule::getSigningKeysWithSignaturesCall {
                nodeOperatorId: U256::from(0),
                startIndex: U256::from(0),
                keysCount: U256::from(3),
            },
            ICommunityModule::getSigningKeysWithSignaturesCall::abi_encode_returns(
                &ICommunityModule::getSigningKeysWithSignaturesReturn {
                    keys: Bytes::from(vec![0x42; PUBKEY_LENGTH * 3]),
                    signatures: Bytes::from(vec![0x24; SIGNATURE_LENGTH * 3 - 1]),
                },
            ),
        );

        let driver = CommunityDriver::new(Arc::new(reader), 100);
        let err = driver.fetch_keys(MODULE, BlockTag::Latest).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decode);
    }
}
