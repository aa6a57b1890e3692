use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KeysStore;
use super::ModuleView;
use super::ViewParts;
use crate::models::AppInfo;
use crate::models::ClMeta;
use crate::models::ElMeta;
use crate::models::KeyFilter;
use crate::models::ModuleSnapshot;
use crate::models::Operator;
use crate::models::RegistryKey;
use crate::models::StakingModule;
use crate::models::Validator;
use crate::Result;
use crate::StakeKeysError;

#[derive(Debug, Default)]
struct State {
    modules: BTreeMap<Address, StakingModule>,
    operators: HashMap<Address, Vec<Operator>>,
    keys: HashMap<Address, Vec<RegistryKey>>,
    el_meta: Option<ElMeta>,
    cl_meta: Option<ClMeta>,
    validators: HashMap<String, Validator>,
    app_info: Option<AppInfo>,
}

impl State {
    fn advance_el_meta(&mut self, meta: ElMeta) -> bool {
        match self.el_meta {
            Some(current) if current.block_number > meta.block_number => false,
            _ => {
                self.el_meta = Some(meta);
                true
            }
        }
    }
}

/// In-process [`KeysStore`].
///
/// All mutations happen under one write lock, so every commit is atomic with
/// respect to readers. Commit failures can be injected for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    failing_commits: AtomicUsize,
    module_commits: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` module commits fail with a storage error
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Number of module snapshots committed so far
    #[must_use]
    pub fn module_commit_count(&self) -> usize {
        self.module_commits.load(Ordering::SeqCst)
    }

    pub async fn operators(&self, address: Address) -> Vec<Operator> {
        self.state
            .read()
            .await
            .operators
            .get(&address)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn keys(&self, address: Address) -> Vec<RegistryKey> {
        self.state
            .read()
            .await
            .keys
            .get(&address)
            .cloned()
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KeysStore for MemoryStore {
    async fn upsert_modules(&self, modules: &[StakingModule]) -> Result<()> {
        let mut state = self.state.write().await;
        for module in modules {
            state
                .modules
                .entry(module.address)
                .and_modify(|existing| {
                    existing.id = module.id;
                    existing.module_type = module.module_type;
                    existing.name.clone_from(&module.name);
                    existing.fee_share = module.fee_share;
                    existing.target_share = module.target_share;
                    existing.status = module.status;
                })
                .or_insert_with(|| StakingModule {
                    nonce: None,
                    last_changed_block_hash: None,
                    ..module.clone()
                });
        }
        Ok(())
    }

    async fn get_module(&self, address: Address) -> Result<Option<StakingModule>> {
        Ok(self.state.read().await.modules.get(&address).cloned())
    }

    async fn list_modules(&self) -> Result<Vec<StakingModule>> {
        let mut modules: Vec<_> = self.state.read().await.modules.values().cloned().collect();
        modules.sort_by_key(|m| m.id);
        Ok(modules)
    }

    async fn commit_module_snapshot(&self, snapshot: &ModuleSnapshot) -> Result<()> {
        let mut state = self.state.write().await;

        if self.take_injected_failure() {
            return Err(StakeKeysError::Storage(
                "injected commit failure".to_string(),
            ));
        }

        let module = state
            .modules
            .get_mut(&snapshot.module_address)
            .ok_or_else(|| {
                StakeKeysError::ModuleNotFound(format!("{:#x}", snapshot.module_address))
            })?;
        module.nonce = Some(snapshot.nonce);
        module.last_changed_block_hash = Some(snapshot.block.block_hash);

        state
            .operators
            .insert(snapshot.module_address, snapshot.operators.clone());
        state
            .keys
            .insert(snapshot.module_address, snapshot.keys.clone());
        state.advance_el_meta(snapshot.block);

        self.module_commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn bump_el_meta(&self, meta: ElMeta) -> Result<bool> {
        Ok(self.state.write().await.advance_el_meta(meta))
    }

    async fn get_el_meta(&self) -> Result<Option<ElMeta>> {
        Ok(self.state.read().await.el_meta)
    }

    async fn get_cl_meta(&self) -> Result<Option<ClMeta>> {
        Ok(self.state.read().await.cl_meta)
    }

    async fn commit_consensus_snapshot(
        &self,
        meta: ClMeta,
        validators: Option<&[Validator]>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.cl_meta = Some(meta);
        if let Some(validators) = validators {
            state.validators = validators
                .iter()
                .map(|v| (v.pubkey.clone(), v.clone()))
                .collect();
        }
        Ok(())
    }

    async fn read_module_view(
        &self,
        address: Address,
        filter: KeyFilter,
        parts: ViewParts,
    ) -> Result<Option<ModuleView>> {
        let state = self.state.read().await;
        let Some(module) = state.modules.get(&address).cloned() else {
            return Ok(None);
        };

        let operators = if parts.operators {
            state.operators.get(&address).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };

        let keys: Vec<RegistryKey> = if parts.wants_keys() {
            state
                .keys
                .get(&address)
                .map(|keys| keys.iter().filter(|k| filter.matches(k)).cloned().collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let validators = if parts.validators {
            keys.iter()
                .filter_map(|k| state.validators.get(&k.key.to_lowercase()).cloned())
                .collect()
        } else {
            Vec::new()
        };

        Ok(Some(ModuleView {
            module,
            operators,
            keys,
            validators,
            el_meta: state.el_meta,
            cl_meta: state.cl_meta,
        }))
    }

    async fn get_app_info(&self) -> Result<Option<AppInfo>> {
        Ok(self.state.read().await.app_info)
    }

    async fn save_app_info(&self, info: AppInfo) -> Result<()> {
        self.state.write().await.app_info = Some(info);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let app_info = state.app_info;
        *state = State {
            app_info,
            ..State::default()
        };
        Ok(())
    }
}
