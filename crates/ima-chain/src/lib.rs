// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The chain RPC seam of the IMA agent.
//!
//! Everything above this crate talks to a node through the [`ChainClient`]
//! trait, so the whole pipeline runs unmodified against the in-memory
//! [`mock::MockClient`] in tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockId, Bytes, Filter, Log, TransactionReceipt, H256, U256, U64,
};
use ima_utils::{Error, Result};

pub mod contracts;
pub mod mock;

/// Minimal node RPC surface needed by the agent.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Next nonce of `address` (pending transaction count).
    async fn transaction_count(&self, address: Address) -> Result<U256>;
    /// Latest block number.
    async fn block_number(&self) -> Result<U64>;
    /// Timestamp (seconds) of the block with the given number.
    async fn block_timestamp(&self, number: U64) -> Result<U256>;
    /// Recommended gas price reported by the node.
    async fn gas_price(&self) -> Result<U256>;
    /// `eth_call` against the latest state.
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes>;
    /// Broadcast raw signed bytes and wait for the receipt.
    async fn send_raw_transaction(&self, raw: Bytes)
        -> Result<TransactionReceipt>;
    /// Fetch a receipt by hash, `None` when not yet mined.
    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>>;
    /// Fetch logs matching the filter.
    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>>;
}

/// [`ChainClient`] over an HTTP JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    provider: Provider<Http>,
}

impl HttpChainClient {
    /// Connects to the given HTTP(S) endpoint.
    pub fn new(endpoint: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(endpoint)?;
        Ok(Self { provider })
    }
}

#[async_trait::async_trait]
impl ChainClient for HttpChainClient {
    async fn transaction_count(&self, address: Address) -> Result<U256> {
        let v = self.provider.get_transaction_count(address, None).await?;
        Ok(v)
    }

    async fn block_number(&self) -> Result<U64> {
        let v = self.provider.get_block_number().await?;
        Ok(v)
    }

    async fn block_timestamp(&self, number: U64) -> Result<U256> {
        let block = self
            .provider
            .get_block(BlockId::from(number))
            .await?
            .ok_or(Error::Generic("block not found"))?;
        Ok(block.timestamp)
    }

    async fn gas_price(&self) -> Result<U256> {
        let v = self.provider.get_gas_price().await?;
        Ok(v)
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        let v = self.provider.call(tx, None).await?;
        Ok(v)
    }

    async fn send_raw_transaction(
        &self,
        raw: Bytes,
    ) -> Result<TransactionReceipt> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        let receipt = pending
            .await?
            .ok_or(Error::Generic("transaction dropped from the mempool"))?;
        Ok(receipt)
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        let v = self.provider.get_transaction_receipt(hash).await?;
        Ok(v)
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let v = self.provider.get_logs(filter).await?;
        Ok(v)
    }
}

/// Blocks until the chain head advances past the current block.
///
/// Used as a pacing step between consecutive side-chain transactions.
pub async fn wait_for_next_block(
    client: &dyn ChainClient,
    poll_interval: Duration,
) -> Result<()> {
    let start = client.block_number().await?;
    loop {
        tokio::time::sleep(poll_interval).await;
        if client.block_number().await? > start {
            return Ok(());
        }
    }
}
