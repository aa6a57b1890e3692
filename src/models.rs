//! Domain types for staking modules, operators, signing keys and chain meta

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use alloy::primitives::B256;
use serde::Deserialize;
use serde::Serialize;

/// Byte length of a BLS public key
pub const PUBKEY_LENGTH: usize = 48;
/// Byte length of a BLS deposit signature
pub const SIGNATURE_LENGTH: usize = 96;

/// On-chain staking module flavour; selects the driver used to read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    /// Curated operator registry
    #[serde(rename = "curated-onchain-v1")]
    Curated,
    /// Permissionless community module
    #[serde(rename = "community-onchain-v1")]
    Community,
    /// Committee (DVT cluster) registry
    #[serde(rename = "committee-onchain-v1")]
    Committee,
}

impl ModuleType {
    pub const ALL: [Self; 3] = [Self::Curated, Self::Community, Self::Committee];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Curated => "curated-onchain-v1",
            Self::Community => "community-onchain-v1",
            Self::Committee => "committee-onchain-v1",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown module type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    #[default]
    Active,
    Deprecated,
    Stopped,
}

impl ModuleStatus {
    /// Map the router's `uint8` status
    #[must_use]
    pub const fn from_router_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Active),
            1 => Some(Self::Deprecated),
            2 => Some(Self::Stopped),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Stopped => "stopped",
        }
    }
}

impl FromStr for ModuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            "stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown module status: {other}")),
        }
    }
}

/// A staking module registered on chain.
///
/// `nonce` and `last_changed_block_hash` are only written by the synchronizer
/// after a successful fetch-and-commit; `None` means never synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingModule {
    pub id: u32,
    pub address: Address,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub name: String,
    /// Module fee in basis points
    pub fee_share: u16,
    /// Target share in basis points
    pub target_share: u16,
    pub status: ModuleStatus,
    /// `keysOpIndex`
    pub nonce: Option<u64>,
    pub last_changed_block_hash: Option<B256>,
}

impl StakingModule {
    #[must_use]
    pub fn active(&self) -> bool {
        self.status == ModuleStatus::Active
    }
}

/// Node operator registered within a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub module_address: Address,
    pub index: u32,
    pub active: bool,
    pub name: String,
    pub reward_address: Address,
    pub total_signing_keys: u64,
    pub used_signing_keys: u64,
    pub vetted_signing_keys: u64,
    pub stopped_validators: u64,
    pub finalized_used_signing_keys: u64,
}

/// Signing key; identity is `(module_address, operator_index, index)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryKey {
    pub module_address: Address,
    pub operator_index: u32,
    pub index: u32,
    /// `0x`-prefixed hex of the 48-byte public key
    pub key: String,
    /// `0x`-prefixed hex of the 96-byte deposit signature
    pub deposit_signature: String,
    pub used: bool,
    pub vetted: bool,
}

impl RegistryKey {
    #[must_use]
    pub const fn identity(&self) -> (u32, u32) {
        (self.operator_index, self.index)
    }
}

/// Execution-layer "as-of" marker for all module data.
///
/// A lower bound: module rows are valid as of at least this block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElMeta {
    pub block_number: u64,
    pub block_hash: B256,
    pub timestamp: u64,
}

/// Latest finalized consensus-layer snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClMeta {
    pub epoch: u64,
    pub slot: u64,
    pub slot_state_root: B256,
    /// Execution block carried by the beacon block at `slot`
    pub block_number: u64,
    pub block_hash: B256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub chain_id: u64,
    pub locator_address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    PendingInitialized,
    PendingQueued,
    ActiveOngoing,
    ActiveExiting,
    ActiveSlashed,
    ExitedUnslashed,
    ExitedSlashed,
    WithdrawalPossible,
    WithdrawalDone,
}

impl ValidatorStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingInitialized => "pending_initialized",
            Self::PendingQueued => "pending_queued",
            Self::ActiveOngoing => "active_ongoing",
            Self::ActiveExiting => "active_exiting",
            Self::ActiveSlashed => "active_slashed",
            Self::ExitedUnslashed => "exited_unslashed",
            Self::ExitedSlashed => "exited_slashed",
            Self::WithdrawalPossible => "withdrawal_possible",
            Self::WithdrawalDone => "withdrawal_done",
        }
    }
}

impl FromStr for ValidatorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown validator status: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub index: u64,
    /// Lowercase `0x`-prefixed hex
    pub pubkey: String,
    pub status: ValidatorStatus,
}

/// Signing key joined with its consensus-layer validator, if deposited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWithValidator {
    #[serde(flatten)]
    pub key: RegistryKey,
    pub validator_index: Option<u64>,
    pub validator_status: Option<ValidatorStatus>,
}

/// Filter applied to key reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFilter {
    pub operator_index: Option<u32>,
    pub used: Option<bool>,
}

impl KeyFilter {
    #[must_use]
    pub fn matches(&self, key: &RegistryKey) -> bool {
        self.operator_index.map_or(true, |op| key.operator_index == op)
            && self.used.map_or(true, |used| key.used == used)
    }
}

/// Everything written by one module resync, committed as a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSnapshot {
    pub module_address: Address,
    pub nonce: u64,
    pub block: ElMeta,
    pub operators: Vec<Operator>,
    pub keys: Vec<RegistryKey>,
}

/// Encode bytes as lowercase `0x`-prefixed hex
#[must_use]
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_type_round_trip_through_tag() {
        for t in ModuleType::ALL {
            assert_eq!(t.as_str().parse::<ModuleType>().unwrap(), t);
        }
        assert!("curated-onchain-v2".parse::<ModuleType>().is_err());
    }

    #[test]
    fn test_module_status_router_codes() {
        assert_eq!(ModuleStatus::from_router_code(0), Some(ModuleStatus::Active));
        assert_eq!(ModuleStatus::from_router_code(2), Some(ModuleStatus::Stopped));
        assert_eq!(ModuleStatus::from_router_code(7), None);
    }

    #[test]
    fn test_validator_status_parsing() {
        assert_eq!(
            "active_ongoing".parse::<ValidatorStatus>().unwrap(),
            ValidatorStatus::ActiveOngoing
        );
        assert_eq!(ValidatorStatus::WithdrawalDone.as_str(), "withdrawal_done");
        assert!("active".parse::<ValidatorStatus>().is_err());
    }

    #[test]
    fn test_key_filter() {
        let key = RegistryKey {
            module_address: Address::ZERO,
            operator_index: 3,
            index: 0,
            key: to_prefixed_hex(&[1u8; PUBKEY_LENGTH]),
            deposit_signature: to_prefixed_hex(&[2u8; SIGNATURE_LENGTH]),
            used: true,
            vetted: true,
        };
        assert!(KeyFilter::default().matches(&key));
        assert!(KeyFilter {
            operator_index: Some(3),
            used: Some(true)
        }
        .matches(&key));
        assert!(!KeyFilter {
            operator_index: Some(4),
            used: None
        }
        .matches(&key));
        assert!(!KeyFilter {
            operator_index: None,
            used: Some(false)
        }
        .matches(&key));
    }
}
