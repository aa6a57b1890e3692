use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;

use super::types::ModuleKeys;
use super::types::ModuleKeysAndOperators;
use super::types::ModuleMeta;
use super::types::ModuleOperators;
use super::types::ModuleValidators;
use super::types::Served;
use super::types::SyncStatus;
use crate::config::TooEarlyBoundary;
use crate::models::ElMeta;
use crate::models::KeyFilter;
use crate::models::KeyWithValidator;
use crate::models::StakingModule;
use crate::store::KeysStore;
use crate::store::ModuleView;
use crate::store::ViewParts;
use crate::sync::is_too_early;
use crate::Result;
use crate::StakeKeysError;

/// Read API for the serving boundary
#[derive(Clone)]
pub struct KeysApi {
    store: Arc<dyn KeysStore>,
    boundary: TooEarlyBoundary,
}

impl KeysApi {
    #[must_use]
    pub fn new(store: Arc<dyn KeysStore>, boundary: TooEarlyBoundary) -> Self {
        Self { store, boundary }
    }

    /// # Errors
    /// - Storage errors
    pub async fn list_modules(&self) -> Result<Vec<StakingModule>> {
        self.store.list_modules().await
    }

    /// Keys of one module, optionally filtered
    ///
    /// # Errors
    /// - [`StakeKeysError::ModuleNotFound`] for an unknown address
    /// - Storage errors
    pub async fn get_module_keys(
        &self,
        address: Address,
        filter: KeyFilter,
    ) -> Result<Served<ModuleKeys>> {
        let view = self.view(address, filter, ViewParts::KEYS).await?;
        Ok(Self::with_el_meta(view, |view, meta| ModuleKeys {
            module: view.module,
            keys: view.keys,
            meta,
        }))
    }

    /// # Errors
    /// - [`StakeKeysError::ModuleNotFound`] for an unknown address
    /// - Storage errors
    pub async fn get_module_operators(&self, address: Address) -> Result<Served<ModuleOperators>> {
        let view = self
            .view(address, KeyFilter::default(), ViewParts::OPERATORS)
            .await?;
        Ok(Self::with_el_meta(view, |view, meta| ModuleOperators {
            module: view.module,
            operators: view.operators,
            meta,
        }))
    }

    /// Keys and operators read from the same snapshot
    ///
    /// # Errors
    /// - [`StakeKeysError::ModuleNotFound`] for an unknown address
    /// - Storage errors
    pub async fn get_module_keys_and_operators(
        &self,
        address: Address,
        filter: KeyFilter,
    ) -> Result<Served<ModuleKeysAndOperators>> {
        let view = self
            .view(address, filter, ViewParts::KEYS_AND_OPERATORS)
            .await?;
        Ok(Self::with_el_meta(view, |view, meta| ModuleKeysAndOperators {
            module: view.module,
            keys: view.keys,
            operators: view.operators,
            meta,
        }))
    }

    /// # Errors
    /// - [`StakeKeysError::ModuleNotFound`] for an unknown address
    /// - Storage errors
    pub async fn get_module_meta(&self, address: Address) -> Result<Served<ModuleMeta>> {
        let view = self
            .view(address, KeyFilter::default(), ViewParts::META)
            .await?;
        Ok(Self::with_el_meta(view, |view, meta| ModuleMeta {
            module: view.module,
            meta,
        }))
    }

    /// Module keys joined with validator index and status.
    ///
    /// Deferred whenever the consistency gate says EL data is behind CL.
    ///
    /// # Errors
    /// - [`StakeKeysError::ModuleNotFound`] for an unknown address
    /// - Storage errors
    pub async fn get_module_validators(
        &self,
        address: Address,
        filter: KeyFilter,
    ) -> Result<Served<ModuleValidators>> {
        let view = self
            .view(address, filter, ViewParts::KEYS_WITH_VALIDATORS)
            .await?;

        if is_too_early(view.el_meta.as_ref(), view.cl_meta.as_ref(), self.boundary) {
            return Ok(Served::TooEarly);
        }
        let Some(el_meta) = view.el_meta else {
            return Ok(Served::TooEarly);
        };

        let by_pubkey: HashMap<String, _> = view
            .validators
            .into_iter()
            .map(|v| (v.pubkey.to_lowercase(), v))
            .collect();
        let keys = view
            .keys
            .into_iter()
            .map(|key| {
                let validator = by_pubkey.get(&key.key.to_lowercase());
                KeyWithValidator {
                    validator_index: validator.map(|v| v.index),
                    validator_status: validator.map(|v| v.status),
                    key,
                }
            })
            .collect();

        Ok(Served::Data(ModuleValidators {
            module: view.module,
            keys,
            el_meta,
            cl_meta: view.cl_meta,
        }))
    }

    /// Current gate verdict, evaluated against freshly read metas
    ///
    /// # Errors
    /// - Storage errors
    pub async fn is_too_early(&self) -> Result<bool> {
        Ok(self.sync_status().await?.too_early)
    }

    /// # Errors
    /// - Storage errors
    pub async fn sync_status(&self) -> Result<SyncStatus> {
        let el_meta = self.store.get_el_meta().await?;
        let cl_meta = self.store.get_cl_meta().await?;
        Ok(SyncStatus {
            el_meta,
            cl_meta,
            too_early: is_too_early(el_meta.as_ref(), cl_meta.as_ref(), self.boundary),
        })
    }

    async fn view(
        &self,
        address: Address,
        filter: KeyFilter,
        parts: ViewParts,
    ) -> Result<ModuleView> {
        self.store
            .read_module_view(address, filter, parts)
            .await?
            .ok_or_else(|| StakeKeysError::ModuleNotFound(format!("{address:#x}")))
    }

    /// Nothing has been committed until EL meta exists
    fn with_el_meta<T>(view: ModuleView, f: impl FnOnce(ModuleView, ElMeta) -> T) -> Served<T> {
        match view.el_meta {
            Some(meta) => Served::Data(f(view, meta)),
            None => Served::TooEarly,
        }
    }
}
