//! Read API response types

use serde::Serialize;

use crate::models::ClMeta;
use crate::models::ElMeta;
use crate::models::KeyWithValidator;
use crate::models::Operator;
use crate::models::RegistryKey;
use crate::models::StakingModule;

/// Outcome of a read at the serving boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Served<T> {
    Data(T),
    /// Synced state is behind what the consensus layer already implies;
    /// retry later
    TooEarly,
}

impl<T> Served<T> {
    #[must_use]
    pub const fn is_too_early(&self) -> bool {
        matches!(self, Self::TooEarly)
    }

    /// The payload, if served
    #[must_use]
    pub fn data(self) -> Option<T> {
        match self {
            Self::Data(data) => Some(data),
            Self::TooEarly => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleKeys {
    pub module: StakingModule,
    pub keys: Vec<RegistryKey>,
    pub meta: ElMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleOperators {
    pub module: StakingModule,
    pub operators: Vec<Operator>,
    pub meta: ElMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleKeysAndOperators {
    pub module: StakingModule,
    pub keys: Vec<RegistryKey>,
    pub operators: Vec<Operator>,
    pub meta: ElMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleMeta {
    pub module: StakingModule,
    pub meta: ElMeta,
}

/// Module keys joined with consensus-layer validators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleValidators {
    pub module: StakingModule,
    pub keys: Vec<KeyWithValidator>,
    pub el_meta: ElMeta,
    pub cl_meta: Option<ClMeta>,
}

/// Both metas and the gate verdict, as reported by `meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub el_meta: Option<ElMeta>,
    pub cl_meta: Option<ClMeta>,
    pub too_early: bool,
}
