//! Persistence seam shared by the worker and the read service
//!
//! The worker and readers never talk to each other directly; everything goes
//! through a [`KeysStore`]. Two implementations exist: the Postgres-backed
//! [`crate::Database`] and the in-process [`MemoryStore`].
//!
//! Atomicity contract, honoured by both:
//! - [`KeysStore::commit_module_snapshot`] replaces a module's operators and
//!   keys, its nonce and block hash, and advances EL meta as one unit
//! - [`KeysStore::commit_consensus_snapshot`] writes CL meta and the optional
//!   validator set as one unit
//! - [`KeysStore::read_module_view`] returns module rows and both metas from
//!   one consistent snapshot

use alloy::primitives::Address;
use async_trait::async_trait;

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

mod memory;

pub use memory::MemoryStore;

/// Which child collections a [`KeysStore::read_module_view`] should load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewParts {
    pub operators: bool,
    pub keys: bool,
    /// Load validators matching the selected keys' pubkeys (implies `keys`)
    pub validators: bool,
}

impl ViewParts {
    pub const META: Self = Self {
        operators: false,
        keys: false,
        validators: false,
    };
    pub const OPERATORS: Self = Self {
        operators: true,
        keys: false,
        validators: false,
    };
    pub const KEYS: Self = Self {
        operators: false,
        keys: true,
        validators: false,
    };
    pub const KEYS_AND_OPERATORS: Self = Self {
        operators: true,
        keys: true,
        validators: false,
    };
    pub const KEYS_WITH_VALIDATORS: Self = Self {
        operators: false,
        keys: true,
        validators: true,
    };

    #[must_use]
    pub const fn wants_keys(&self) -> bool {
        self.keys || self.validators
    }
}

/// Module rows read together with both metas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleView {
    pub module: StakingModule,
    pub operators: Vec<Operator>,
    pub keys: Vec<RegistryKey>,
    pub validators: Vec<Validator>,
    pub el_meta: Option<ElMeta>,
    pub cl_meta: Option<ClMeta>,
}

#[async_trait]
pub trait KeysStore: Send + Sync {
    /// Insert modules, refreshing descriptive fields of existing rows.
    ///
    /// Never touches `nonce` or `last_changed_block_hash`.
    async fn upsert_modules(&self, modules: &[StakingModule]) -> Result<()>;

    async fn get_module(&self, address: Address) -> Result<Option<StakingModule>>;

    async fn list_modules(&self) -> Result<Vec<StakingModule>>;

    /// Atomically replace one module's data and advance EL meta.
    ///
    /// EL meta only moves forward: a snapshot taken at an older block than the
    /// stored meta leaves the meta untouched.
    ///
    /// # Errors
    /// - [`crate::StakeKeysError::ModuleNotFound`] when the module row is missing
    /// - Storage failures; nothing is written in that case
    async fn commit_module_snapshot(&self, snapshot: &ModuleSnapshot) -> Result<()>;

    /// Advance EL meta without touching module data. Returns whether it moved.
    async fn bump_el_meta(&self, meta: ElMeta) -> Result<bool>;

    async fn get_el_meta(&self) -> Result<Option<ElMeta>>;

    async fn get_cl_meta(&self) -> Result<Option<ClMeta>>;

    /// Write CL meta and, when given, replace the stored validator set
    async fn commit_consensus_snapshot(
        &self,
        meta: ClMeta,
        validators: Option<&[Validator]>,
    ) -> Result<()>;

    /// Consistent read of one module with the requested children and both
    /// metas. `None` when the module is unknown.
    async fn read_module_view(
        &self,
        address: Address,
        filter: KeyFilter,
        parts: ViewParts,
    ) -> Result<Option<ModuleView>>;

    async fn get_app_info(&self) -> Result<Option<AppInfo>>;

    async fn save_app_info(&self, info: AppInfo) -> Result<()>;

    /// Delete all synced data: modules, operators, keys, metas and validators
    async fn reset(&self) -> Result<()>;
}
