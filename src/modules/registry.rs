//! Module registry: configured or discovered modules bound to their drivers

use std::sync::Arc;

use alloy::primitives::Address;
use alloy::primitives::B256;
use tracing::info;
use tracing::warn;

use super::abi::ILocator;
use super::abi::IStakingModule;
use super::abi::IStakingRouter;
use super::CommunityDriver;
use super::ModuleDriver;
use super::OperatorRegistryDriver;
use crate::chain::call_contract;
use crate::chain::BlockTag;
use crate::chain::ChainReader;
use crate::config::AppConfig;
use crate::config::ModuleConfig;
use crate::models::ModuleStatus;
use crate::models::ModuleType;
use crate::models::StakingModule;
use crate::Result;
use crate::StakeKeysError;

/// A module with the driver that reads it
#[derive(Clone)]
pub struct RegisteredModule {
    pub module: StakingModule,
    pub driver: Arc<dyn ModuleDriver>,
}

impl std::fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("module", &self.module)
            .field("driver", &self.driver.classify())
            .finish()
    }
}

/// Set of modules the synchronizer keeps in sync
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    entries: Vec<RegisteredModule>,
}

/// Driver implementation for a module type
#[must_use]
pub fn driver_for(
    module_type: ModuleType,
    reader: Arc<dyn ChainReader>,
    keys_batch_size: u32,
) -> Arc<dyn ModuleDriver> {
    match module_type {
        ModuleType::Curated | ModuleType::Committee => Arc::new(OperatorRegistryDriver::new(
            reader,
            module_type,
            keys_batch_size,
        )),
        ModuleType::Community => Arc::new(CommunityDriver::new(reader, keys_batch_size)),
    }
}

/// Decode a right-padded `bytes32` type tag
fn decode_type_tag(raw: B256) -> Option<String> {
    let bytes = raw.as_slice();
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).ok().map(str::to_string)
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module bound to `driver`.
    ///
    /// # Errors
    /// - The address is already registered
    /// - The driver does not classify as the module's declared type
    pub fn register(&mut self, module: StakingModule, driver: Arc<dyn ModuleDriver>) -> Result<()> {
        if self.get(module.address).is_some() {
            return Err(StakeKeysError::ConfigError(format!(
                "module {:#x} registered twice",
                module.address
            )));
        }
        if driver.classify() != module.module_type {
            return Err(StakeKeysError::ConfigError(format!(
                "module {:#x} declared as {} but bound to a {} driver",
                module.address,
                module.module_type,
                driver.classify()
            )));
        }
        self.entries.push(RegisteredModule { module, driver });
        Ok(())
    }

    /// Registry from static `[[modules]]` entries
    pub fn from_module_configs(
        configs: &[ModuleConfig],
        reader: Arc<dyn ChainReader>,
        keys_batch_size: u32,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let module = StakingModule {
                id: config.id,
                address: config.address,
                module_type: config.module_type,
                name: config.name.clone(),
                fee_share: config.fee_share,
                target_share: config.target_share,
                status: config.status,
                nonce: None,
                last_changed_block_hash: None,
            };
            let driver = driver_for(config.module_type, Arc::clone(&reader), keys_batch_size);
            registry.register(module, driver)?;
        }
        Ok(registry)
    }

    /// Registry discovered through the locator's staking router
    ///
    /// Modules with an unknown type tag or status are skipped with a warning.
    ///
    /// # Errors
    /// - Chain read failures
    /// - No supported module found
    pub async fn discover(
        reader: Arc<dyn ChainReader>,
        locator: Address,
        tag: BlockTag,
        keys_batch_size: u32,
    ) -> Result<Self> {
        let router = call_contract(reader.as_ref(), locator, &ILocator::stakingRouterCall {}, tag)
            .await?;
        let listed = call_contract(
            reader.as_ref(),
            router,
            &IStakingRouter::getStakingModulesCall {},
            tag,
        )
        .await?;

        info!(
            "🔎 Staking router {:#x} lists {} modules",
            router,
            listed.len()
        );

        let mut registry = Self::new();
        for entry in listed {
            let address = entry.stakingModuleAddress;
            let raw_type =
                call_contract(reader.as_ref(), address, &IStakingModule::getTypeCall {}, tag)
                    .await?;

            let Some(module_type) = decode_type_tag(raw_type).and_then(|t| t.parse().ok()) else {
                warn!(
                    "Skipping module {} ({:#x}): unsupported type tag {}",
                    entry.name, address, raw_type
                );
                continue;
            };
            let Some(status) = ModuleStatus::from_router_code(entry.status) else {
                warn!(
                    "Skipping module {} ({:#x}): unknown status {}",
                    entry.name, address, entry.status
                );
                continue;
            };

            let module = StakingModule {
                id: entry.id.to::<u32>(),
                address,
                module_type,
                name: entry.name,
                fee_share: entry.stakingModuleFee,
                target_share: entry.stakeShareLimit,
                status,
                nonce: None,
                last_changed_block_hash: None,
            };
            registry.register(
                module,
                driver_for(module_type, Arc::clone(&reader), keys_batch_size),
            )?;
        }

        if registry.is_empty() {
            return Err(StakeKeysError::ConfigError(format!(
                "no supported staking modules found through locator {locator:#x}"
            )));
        }

        Ok(registry)
    }

    /// Static modules when configured, otherwise locator discovery
    pub async fn from_config(config: &AppConfig, reader: Arc<dyn ChainReader>) -> Result<Self> {
        if config.modules.is_empty() {
            Self::discover(
                reader,
                config.chain.locator_address,
                config.sync.block_tag,
                config.sync.keys_batch_size,
            )
            .await
        } else {
            Self::from_module_configs(&config.modules, reader, config.sync.keys_batch_size)
        }
    }

    #[must_use]
    pub fn modules(&self) -> &[RegisteredModule] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, address: Address) -> Option<&RegisteredModule> {
        self.entries.iter().find(|e| e.module.address == address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::aliases::U24;
    use alloy::primitives::U256;
    use alloy::sol_types::SolCall;

    use super::*;
    use crate::tests::mock_chain::ScriptedChainReader;

    const LOCATOR: Address = Address::repeat_byte(0x01);
    const ROUTER: Address = Address::repeat_byte(0x02);

    fn type_tag(tag: &str) -> B256 {
        let mut raw = [0u8; 32];
        raw[..tag.len()].copy_from_slice(tag.as_bytes());
        B256::from(raw)
    }

    fn router_entry(
        id: u32,
        address: Address,
        name: &str,
        status: u8,
    ) -> IStakingRouter::StakingModule {
        IStakingRouter::StakingModule {
            id: U24::from(id),
            stakingModuleAddress: address,
            stakingModuleFee: 500,
            treasuryFee: 500,
            stakeShareLimit: 10_000,
            status,
            name: name.to_string(),
            lastDepositAt: 0,
            lastDepositBlock: U256::ZERO,
            exitedValidatorsCount: U256::ZERO,
            priorityExitShareThreshold: 10_000,
            maxDepositsPerBlock: 150,
            minDepositBlockDistance: 25,
        }
    }

    #[test]
    fn test_decode_type_tag() {
        assert_eq!(
            decode_type_tag(type_tag("curated-onchain-v1")).as_deref(),
            Some("curated-onchain-v1")
        );
        assert_eq!(decode_type_tag(B256::ZERO).as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_discover_through_locator() {
        let reader = ScriptedChainReader::new();
        let curated = Address::repeat_byte(0x10);
        let community = Address::repeat_byte(0x20);
        let unknown = Address::repeat_byte(0x30);

        reader.respond(
            LOCATOR,
            &ILocator::stakingRouterCall {},
            ILocator::stakingRouterCall::abi_encode_returns(&ROUTER),
        );
        reader.respond(
            ROUTER,
            &IStakingRouter::getStakingModulesCall {},
            IStakingRouter::getStakingModulesCall::abi_encode_returns(&vec![
                router_entry(1, curated, "curated-onchain-v1", 0),
                router_entry(3, community, "Community Staking", 1),
                router_entry(4, unknown, "Experimental", 0),
            ]),
        );
        for (address, tag) in [
            (curated, "curated-onchain-v1"),
            (community, "community-onchain-v1"),
            (unknown, "sharded-onchain-v9"),
        ] {
            reader.respond(
                address,
                &IStakingModule::getTypeCall {},
                IStakingModule::getTypeCall::abi_encode_returns(&type_tag(tag)),
            );
        }

        let registry = ModuleRegistry::discover(Arc::new(reader), LOCATOR, BlockTag::Latest, 100)
            .await
            .unwrap();

        assert_eq!(registry.len(), 2);
        let first = &registry.modules()[0];
        assert_eq!(first.module.id, 1);
        assert_eq!(first.module.module_type, ModuleType::Curated);
        assert_eq!(first.module.fee_share, 500);
        assert_eq!(first.driver.classify(), ModuleType::Curated);

        let second = registry.get(community).unwrap();
        assert_eq!(second.module.id, 3);
        assert_eq!(second.module.status, ModuleStatus::Deprecated);
        assert_eq!(second.driver.classify(), ModuleType::Community);
        assert!(registry.get(unknown).is_none());
    }

    #[tokio::test]
    async fn test_discover_with_no_supported_modules_fails() {
        let reader = ScriptedChainReader::new();
        reader.respond(
            LOCATOR,
            &ILocator::stakingRouterCall {},
            ILocator::stakingRouterCall::abi_encode_returns(&ROUTER),
        );
        reader.respond(
            ROUTER,
            &IStakingRouter::getStakingModulesCall {},
            IStakingRouter::getStakingModulesCall::abi_encode_returns(&Vec::new()),
        );

        let err = ModuleRegistry::discover(Arc::new(reader), LOCATOR, BlockTag::Latest, 100)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_register_rejects_type_mismatch() {
        let reader: Arc<dyn ChainReader> = Arc::new(ScriptedChainReader::new());
        let module = StakingModule {
            id: 1,
            address: Address::repeat_byte(0x10),
            module_type: ModuleType::Community,
            name: "community".to_string(),
            fee_share: 0,
            target_share: 0,
            status: ModuleStatus::Active,
            nonce: None,
            last_changed_block_hash: None,
        };

        let mut registry = ModuleRegistry::new();
        let err = registry
            .register(module.clone(), driver_for(ModuleType::Curated, Arc::clone(&reader), 10))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);

        registry
            .register(module.clone(), driver_for(ModuleType::Community, Arc::clone(&reader), 10))
            .unwrap();
        assert!(registry
            .register(module, driver_for(ModuleType::Community, reader, 10))
            .is_err());
    }
}
