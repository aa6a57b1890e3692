use alloy::primitives::Address;
use async_trait::async_trait;

use super::Database;
use crate::models::AppInfo;
use crate::models::ClMeta;
use crate::models::ElMeta;
use crate::models::KeyFilter;
use crate::models::ModuleSnapshot;
use crate::models::StakingModule;
use crate::models::Validator;
use crate::store::KeysStore;
use crate::store::ModuleView;
use crate::store::ViewParts;
use crate::Result;

#[async_trait]
impl KeysStore for Database {
    async fn upsert_modules(&self, modules: &[StakingModule]) -> Result<()> {
        Self::upsert_modules(self, modules).await
    }

    async fn get_module(&self, address: Address) -> Result<Option<StakingModule>> {
        Self::get_module(self, address).await
    }

    async fn list_modules(&self) -> Result<Vec<StakingModule>> {
        Self::list_modules(self).await
    }

    async fn commit_module_snapshot(&self, snapshot: &ModuleSnapshot) -> Result<()> {
        Self::commit_module_snapshot(self, snapshot).await
    }

    async fn bump_el_meta(&self, meta: ElMeta) -> Result<bool> {
        Self::bump_el_meta(self, meta).await
    }

    async fn get_el_meta(&self) -> Result<Option<ElMeta>> {
        Self::get_el_meta(self).await
    }

    async fn get_cl_meta(&self) -> Result<Option<ClMeta>> {
        Self::get_cl_meta(self).await
    }

    async fn commit_consensus_snapshot(
        &self,
        meta: ClMeta,
        validators: Option<&[Validator]>,
    ) -> Result<()> {
        Self::commit_consensus_snapshot(self, meta, validators).await
    }

    async fn read_module_view(
        &self,
        address: Address,
        filter: KeyFilter,
        parts: ViewParts,
    ) -> Result<Option<ModuleView>> {
        Self::read_module_view(self, address, filter, parts).await
    }

    async fn get_app_info(&self) -> Result<Option<AppInfo>> {
        Self::get_app_info(self).await
    }

    async fn save_app_info(&self, info: AppInfo) -> Result<()> {
        Self::save_app_info(self, info).await
    }

    async fn reset(&self) -> Result<()> {
        self.reset_sync_data().await
    }
}
