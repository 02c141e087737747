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

//! A programmable in-memory [`ChainClient`] used by tests across the
//! workspace. Responses are scripted per function selector, sends can be
//! made to fail a given number of times and receipts can be delayed.

use std::collections::{HashMap, VecDeque};

use ethers::abi::Function;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Filter, Log, Topic, TransactionReceipt, ValueOrArray,
    H256, U256, U64,
};
use ethers::utils::keccak256;
use parking_lot::Mutex;

use crate::ChainClient;
use ima_utils::{Error, Result};

#[derive(Default)]
struct Inner {
    nonce: U256,
    block_number: U64,
    gas_price: U256,
    timestamps: HashMap<U64, U256>,
    call_returns: HashMap<[u8; 4], Bytes>,
    reverting_selectors: Vec<[u8; 4]>,
    logs: Vec<Log>,
    send_failures_left: usize,
    gas_used: U256,
    sent: Vec<Bytes>,
    receipts: HashMap<H256, (TransactionReceipt, usize)>,
    pending_emits: VecDeque<Vec<Log>>,
}

/// Scriptable [`ChainClient`] double.
#[derive(Default)]
pub struct MockClient {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for MockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClient").finish_non_exhaustive()
    }
}

impl MockClient {
    /// Fresh client with zeroed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pending nonce returned for every address.
    pub fn set_nonce(&self, nonce: u64) {
        self.inner.lock().nonce = U256::from(nonce);
    }

    /// Sets the chain head.
    pub fn set_block_number(&self, number: u64) {
        self.inner.lock().block_number = U64::from(number);
    }

    /// Sets the recommended gas price.
    pub fn set_gas_price(&self, price: u64) {
        self.inner.lock().gas_price = U256::from(price);
    }

    /// Sets the timestamp of one block.
    pub fn set_block_timestamp(&self, number: u64, timestamp: u64) {
        self.inner
            .lock()
            .timestamps
            .insert(U64::from(number), U256::from(timestamp));
    }

    /// Scripts the return data of `eth_call`s hitting `function`.
    pub fn stub_call(&self, function: &Function, output: impl Into<Bytes>) {
        self.inner
            .lock()
            .call_returns
            .insert(function.short_signature(), output.into());
    }

    /// Makes every `eth_call` hitting `function` revert.
    pub fn revert_call(&self, function: &Function) {
        self.inner
            .lock()
            .reverting_selectors
            .push(function.short_signature());
    }

    /// Adds a log entry served by [`ChainClient::logs`].
    pub fn push_log(&self, log: Log) {
        self.inner.lock().logs.push(log);
    }

    /// Makes the next `count` raw sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.inner.lock().send_failures_left = count;
    }

    /// Gas used reported in generated receipts.
    pub fn set_gas_used(&self, gas: u64) {
        self.inner.lock().gas_used = U256::from(gas);
    }

    /// Registers a receipt that becomes visible after `delay_polls`
    /// lookups.
    pub fn insert_receipt(
        &self,
        hash: H256,
        receipt: TransactionReceipt,
        delay_polls: usize,
    ) {
        self.inner.lock().receipts.insert(hash, (receipt, delay_polls));
    }

    /// Queues logs emitted by the next accepted send. Each call scripts
    /// one send; transaction hash and block number are filled in when the
    /// send happens.
    pub fn emit_logs_on_next_send(&self, logs: Vec<Log>) {
        self.inner.lock().pending_emits.push_back(logs);
    }

    /// Raw transactions accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Bytes> {
        self.inner.lock().sent.clone()
    }

    /// Number of raw transactions accepted so far.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent.len()
    }
}

fn selector_of(tx: &TypedTransaction) -> Option<[u8; 4]> {
    let data = tx.data()?;
    let head = data.get(..4)?;
    let mut selector = [0u8; 4];
    selector.copy_from_slice(head);
    Some(selector)
}

fn address_matches(spec: &Option<ValueOrArray<Address>>, actual: Address) -> bool {
    match spec {
        None => true,
        Some(ValueOrArray::Value(a)) => *a == actual,
        Some(ValueOrArray::Array(v)) => v.contains(&actual),
    }
}

fn topic_matches(spec: &Option<Topic>, actual: Option<&H256>) -> bool {
    match spec {
        None => true,
        Some(ValueOrArray::Value(None)) => true,
        Some(ValueOrArray::Value(Some(h))) => actual == Some(h),
        Some(ValueOrArray::Array(options)) => options
            .iter()
            .any(|o| o.is_none() || o.as_ref() == actual),
    }
}

#[async_trait::async_trait]
impl ChainClient for MockClient {
    async fn transaction_count(&self, _address: Address) -> Result<U256> {
        Ok(self.inner.lock().nonce)
    }

    async fn block_number(&self) -> Result<U64> {
        Ok(self.inner.lock().block_number)
    }

    async fn block_timestamp(&self, number: U64) -> Result<U256> {
        self.inner
            .lock()
            .timestamps
            .get(&number)
            .copied()
            .ok_or(Error::Generic("mock: no timestamp for block"))
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.inner.lock().gas_price)
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes> {
        let selector =
            selector_of(tx).ok_or(Error::Generic("mock: call without data"))?;
        let inner = self.inner.lock();
        if inner.reverting_selectors.contains(&selector) {
            return Err(Error::Generic("mock: execution reverted"));
        }
        inner
            .call_returns
            .get(&selector)
            .cloned()
            .ok_or(Error::Generic("mock: no stubbed response for call"))
    }

    async fn send_raw_transaction(
        &self,
        raw: Bytes,
    ) -> Result<TransactionReceipt> {
        let mut inner = self.inner.lock();
        if inner.send_failures_left > 0 {
            inner.send_failures_left -= 1;
            return Err(Error::Generic("mock: send failed"));
        }
        let hash = H256(keccak256(&raw));
        inner.sent.push(raw);
        if let Some(mut emitted) = inner.pending_emits.pop_front() {
            let block = inner.block_number;
            for log in &mut emitted {
                log.transaction_hash = Some(hash);
                log.block_number = Some(block);
            }
            inner.logs.extend(emitted);
        }
        Ok(TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(inner.block_number),
            gas_used: Some(inner.gas_used),
            status: Some(U64::one()),
            ..Default::default()
        })
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>> {
        let mut inner = self.inner.lock();
        match inner.receipts.get_mut(&hash) {
            Some((_, delay)) if *delay > 0 => {
                *delay -= 1;
                Ok(None)
            }
            Some((receipt, _)) => Ok(Some(receipt.clone())),
            None => Ok(None),
        }
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let inner = self.inner.lock();
        let matching = inner
            .logs
            .iter()
            .filter(|log| {
                address_matches(&filter.address, log.address)
                    && filter.topics.iter().enumerate().all(|(i, spec)| {
                        topic_matches(spec, log.topics.get(i))
                    })
            })
            .cloned()
            .collect();
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{chain_hash, outgoing_message_event, MessageProxy};

    #[tokio::test]
    async fn filters_logs_by_address_and_topics() {
        let client = MockClient::new();
        let proxy = MessageProxy::new(Address::repeat_byte(1));
        let topic0 = outgoing_message_event().signature();
        let make_log = |address: Address, dst: &str| Log {
            address,
            topics: vec![
                topic0,
                chain_hash(dst),
                H256::zero(),
                H256::zero(),
            ],
            ..Default::default()
        };
        client.push_log(make_log(Address::repeat_byte(1), "Bob"));
        client.push_log(make_log(Address::repeat_byte(9), "Bob"));
        client.push_log(make_log(Address::repeat_byte(1), "Alice"));

        let filter = proxy.outgoing_message_filter("Bob", 0);
        let logs = client.logs(&filter).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].address, Address::repeat_byte(1));
    }

    #[tokio::test]
    async fn scripted_send_failures_then_success() {
        let client = MockClient::new();
        client.fail_next_sends(1);
        let raw = Bytes::from(vec![1u8, 2, 3]);
        assert!(client.send_raw_transaction(raw.clone()).await.is_err());
        let receipt = client.send_raw_transaction(raw).await.unwrap();
        assert_eq!(receipt.status, Some(U64::one()));
        assert_eq!(client.sent_count(), 1);
    }
}
