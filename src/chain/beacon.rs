//! Consensus-layer reader over the standard Beacon API

use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Deserializer;
use tracing::debug;
use tracing::warn;

use super::ConsensusReader;
use crate::config::AppConfig;
use crate::errors::ChainError;
use crate::models::ClMeta;
use crate::models::Validator;
use crate::models::ValidatorStatus;
use crate::Result;
use crate::StakeKeysError;

pub const SLOTS_PER_EPOCH: u64 = 32;

/// Beacon API numbers are JSON strings
fn quoted_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SignedBlock {
    message: BeaconBlock,
}

#[derive(Debug, Deserialize)]
struct BeaconBlock {
    #[serde(deserialize_with = "quoted_u64")]
    slot: u64,
    state_root: B256,
    body: BeaconBlockBody,
}

#[derive(Debug, Deserialize)]
struct BeaconBlockBody {
    /// Absent before the merge
    execution_payload: Option<ExecutionPayload>,
}

#[derive(Debug, Deserialize)]
struct ExecutionPayload {
    #[serde(deserialize_with = "quoted_u64")]
    block_number: u64,
    block_hash: B256,
    #[serde(deserialize_with = "quoted_u64")]
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct ValidatorEntry {
    #[serde(deserialize_with = "quoted_u64")]
    index: u64,
    status: ValidatorStatus,
    validator: ValidatorBody,
}

#[derive(Debug, Deserialize)]
struct ValidatorBody {
    pubkey: String,
}

fn snapshot_from_block(block: BeaconBlock) -> std::result::Result<ClMeta, ChainError> {
    let payload = block.body.execution_payload.ok_or_else(|| {
        ChainError::Decode(format!(
            "finalized block at slot {} carries no execution payload",
            block.slot
        ))
    })?;

    Ok(ClMeta {
        epoch: block.slot / SLOTS_PER_EPOCH,
        slot: block.slot,
        slot_state_root: block.state_root,
        block_number: payload.block_number,
        block_hash: payload.block_hash,
        timestamp: payload.timestamp,
    })
}

/// Beacon API client with failover across `cl_api_urls`
pub struct BeaconClient {
    client: Client,
    base_urls: Vec<String>,
    timeout: Duration,
}

impl BeaconClient {
    pub fn new(base_urls: &[String], timeout: Duration) -> Result<Self> {
        if base_urls.is_empty() {
            return Err(StakeKeysError::ConfigError(
                "at least one consensus-layer endpoint is required".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_urls: base_urls
                .iter()
                .map(|url| url.trim_end_matches('/').to_string())
                .collect(),
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.chain.cl_api_urls, config.request_timeout())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> std::result::Result<T, ChainError> {
        let mut last_error = None;

        for base in &self.base_urls {
            let url = format!("{base}{path}");
            debug!("GET {}", url);

            match self.fetch(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!("Beacon request to {} failed: {}", url, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ChainError::NotFound(path.to_string())))
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> std::result::Result<T, ChainError> {
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                ChainError::Timeout(self.timeout)
            } else {
                ChainError::Transport {
                    endpoint: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Transport {
                endpoint: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body)
            .map_err(|e| ChainError::Decode(format!("malformed Beacon API response: {e}")))
    }
}

#[async_trait]
impl ConsensusReader for BeaconClient {
    async fn finalized_snapshot(&self) -> std::result::Result<ClMeta, ChainError> {
        let envelope: Envelope<SignedBlock> =
            self.get_json("/eth/v2/beacon/blocks/finalized").await?;
        snapshot_from_block(envelope.data.message)
    }

    async fn validators(
        &self,
        state_root: B256,
    ) -> std::result::Result<Vec<Validator>, ChainError> {
        let envelope: Envelope<Vec<ValidatorEntry>> = self
            .get_json(&format!("/eth/v1/beacon/states/{state_root:#x}/validators"))
            .await?;

        Ok(envelope
            .data
            .into_iter()
            .map(|entry| Validator {
                index: entry.index,
                pubkey: entry.validator.pubkey.to_lowercase(),
                status: entry.status,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINALIZED_BLOCK: &str = r#"{
        "version": "deneb",
        "execution_optimistic": false,
        "finalized": true,
        "data": {
            "message": {
                "slot": "8000000",
                "proposer_index": "1234",
                "parent_root": "0x1111111111111111111111111111111111111111111111111111111111111111",
                "state_root": "0x2222222222222222222222222222222222222222222222222222222222222222",
                "body": {
                    "randao_reveal": "0x00",
                    "execution_payload": {
                        "block_number": "19000000",
                        "block_hash": "0x3333333333333333333333333333333333333333333333333333333333333333",
                        "timestamp": "1705000000",
                        "gas_used": "100"
                    }
                }
            },
            "signature": "0x00"
        }
    }"#;

    #[test]
    fn test_parse_finalized_block() {
        let envelope: Envelope<SignedBlock> = serde_json::from_str(FINALIZED_BLOCK).unwrap();
        let meta = snapshot_from_block(envelope.data.message).unwrap();

        assert_eq!(meta.slot, 8_000_000);
        assert_eq!(meta.epoch, 250_000);
        assert_eq!(meta.block_number, 19_000_000);
        assert_eq!(meta.timestamp, 1_705_000_000);
        assert_eq!(meta.slot_state_root, B256::repeat_byte(0x22));
        assert_eq!(meta.block_hash, B256::repeat_byte(0x33));
    }

    #[test]
    fn test_pre_merge_block_is_decode_error() {
        let json = r#"{
            "data": {
                "message": {
                    "slot": "10",
                    "state_root": "0x2222222222222222222222222222222222222222222222222222222222222222",
                    "body": {}
                }
            }
        }"#;
        let envelope: Envelope<SignedBlock> = serde_json::from_str(json).unwrap();
        let err = snapshot_from_block(envelope.data.message).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
    }

    #[test]
    fn test_parse_validators() {
        let json = r#"{
            "execution_optimistic": false,
            "data": [
                {
                    "index": "7",
                    "balance": "32000000000",
                    "status": "active_ongoing",
                    "validator": {
                        "pubkey": "0xAABB",
                        "withdrawal_credentials": "0x01",
                        "effective_balance": "32000000000",
                        "slashed": false
                    }
                },
                {
                    "index": "8",
                    "balance": "0",
                    "status": "withdrawal_done",
                    "validator": { "pubkey": "0xccdd" }
                }
            ]
        }"#;
        let envelope: Envelope<Vec<ValidatorEntry>> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.len(), 2);
        assert_eq!(envelope.data[0].index, 7);
        assert_eq!(envelope.data[0].status, ValidatorStatus::ActiveOngoing);
        assert_eq!(envelope.data[1].status, ValidatorStatus::WithdrawalDone);
    }

    #[test]
    fn test_non_numeric_slot_rejected() {
        let json = r#"{"slot": "abc", "state_root": "0x2222222222222222222222222222222222222222222222222222222222222222", "body": {}}"#;
        assert!(serde_json::from_str::<BeaconBlock>(json).is_err());
    }

    #[test]
    fn test_requires_endpoint() {
        assert!(BeaconClient::new(&[], Duration::from_secs(1)).is_err());
    }
}
