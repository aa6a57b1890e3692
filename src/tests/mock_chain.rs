//! In-memory [`ChainReader`] returning pre-encoded ABI responses

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use alloy::primitives::Address;
use alloy::primitives::Bytes;
use alloy::primitives::B256;
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::chain::BlockRef;
use crate::chain::BlockTag;
use crate::chain::ChainReader;
use crate::errors::ChainError;

#[derive(Clone)]
enum Outcome {
    Return(Bytes),
    Revert,
}

type CallKey = (Address, Vec<u8>, Option<BlockTag>);

/// Responses are matched on `(contract, calldata)`; a tag-specific response
/// takes precedence over the tag-agnostic one.
pub struct ScriptedChainReader {
    responses: Mutex<HashMap<CallKey, Outcome>>,
    blocks: Mutex<HashMap<BlockTag, BlockRef>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    chain_id: u64,
}

impl ScriptedChainReader {
    pub fn new() -> Self {
        Self::with_chain_id(17000)
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            chain_id,
        }
    }

    pub fn respond<C: SolCall>(&self, contract: Address, call: &C, output: Vec<u8>) {
        self.responses.lock().unwrap().insert(
            (contract, call.abi_encode(), None),
            Outcome::Return(Bytes::from(output)),
        );
    }

    pub fn respond_at<C: SolCall>(
        &self,
        contract: Address,
        call: &C,
        tag: BlockTag,
        output: Vec<u8>,
    ) {
        self.responses.lock().unwrap().insert(
            (contract, call.abi_encode(), Some(tag)),
            Outcome::Return(Bytes::from(output)),
        );
    }

    pub fn revert_at<C: SolCall>(&self, contract: Address, call: &C, tag: BlockTag) {
        self.responses
            .lock()
            .unwrap()
            .insert((contract, call.abi_encode(), Some(tag)), Outcome::Revert);
    }

    pub fn set_block(&self, tag: BlockTag, block: BlockRef) {
        self.blocks.lock().unwrap().insert(tag, block);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), ChainError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChainError::Transport {
                endpoint: "scripted".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ScriptedChainReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Block used when a test does not script one
pub fn default_block() -> BlockRef {
    BlockRef {
        number: 100,
        hash: B256::repeat_byte(0x64),
        timestamp: 1_700_000_000,
    }
}

#[async_trait]
impl ChainReader for ScriptedChainReader {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.check_online()?;
        Ok(self.chain_id)
    }

    async fn block(&self, tag: BlockTag) -> Result<BlockRef, ChainError> {
        self.check_online()?;
        let blocks = self.blocks.lock().unwrap();
        if let BlockTag::Hash(hash) = tag {
            return blocks
                .values()
                .chain(std::iter::once(&default_block()))
                .find(|block| block.hash == hash)
                .copied()
                .ok_or_else(|| ChainError::NotFound(format!("block {hash}")));
        }
        Ok(blocks.get(&tag).copied().unwrap_or_else(default_block))
    }

    async fn call(
        &self,
        contract: Address,
        calldata: Bytes,
        tag: BlockTag,
    ) -> Result<Bytes, ChainError> {
        self.check_online()?;
        self.calls.fetch_add(1, Ordering::SeqCst);

        let responses = self.responses.lock().unwrap();
        let data = calldata.to_vec();
        let outcome = responses
            .get(&(contract, data.clone(), Some(tag)))
            .or_else(|| responses.get(&(contract, data, None)))
            .cloned();

        match outcome {
            Some(Outcome::Return(bytes)) => Ok(bytes),
            Some(Outcome::Revert) => Err(ChainError::Revert("execution reverted".to_string())),
            None => Err(ChainError::Revert(format!(
                "no scripted response for {contract:#x} calldata {calldata}"
            ))),
        }
    }
}
