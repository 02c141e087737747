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

//! The transfer engine.
//!
//! One run moves the destination chain's incoming counter towards the
//! source chain's outgoing counter: scan `OutgoingMessage` logs for the
//! work range, batch them, collect the BLS signature and submit
//! `postIncomingMessages` until the range is drained, a maturity guard
//! asks for patience or the per-run cap is reached. All progress lives in
//! the on-chain counters, so a replayed run is a no-op.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::{Address, U256};
use ima_chain::contracts::{self, BatchSignature, Message, MessageProxy, OutgoingMessageEvent};
use ima_chain::ChainClient;
use ima_tx::customize::TransactionCustomizer;
use ima_tx::dry_run::DryRunGate;
use ima_tx::receipts::{log_gas_usage_report, ReceiptRecord};
use ima_tx::sender::{CallSpec, TxSender};
use ima_tx::sign::Account;
use ima_tx::verify;
use ima_utils::{probe, Error, Result};
use typed_builder::TypedBuilder;

pub mod signer;

pub use signer::MessageSigner;

/// Gas limit of a `postIncomingMessages` submission.
pub const POST_INCOMING_MESSAGES_GAS_LIMIT: u64 = 6_000_000;

/// One side of a transfer direction.
#[derive(Clone)]
pub struct ChainSide {
    /// Node connection.
    pub client: Arc<dyn ChainClient>,
    /// The chain's `MessageProxy`.
    pub proxy: MessageProxy,
    /// Account submitting on this chain.
    pub account: Account,
    /// IMA chain name, as used in counters and events.
    pub chain_name: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
}

impl std::fmt::Debug for ChainSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainSide")
            .field("proxy", &self.proxy)
            .field("chain_name", &self.chain_name)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Batching and maturity knobs of one run.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Messages per `postIncomingMessages` submission, at least 1.
    pub transactions_per_batch: usize,
    /// Cap on messages moved in one run.
    pub max_transactions_count: usize,
    /// Only relay events buried at least this many blocks deep, 0 to
    /// disable.
    pub block_await_depth: u64,
    /// Only relay events whose block is at least this old in seconds, 0 to
    /// disable.
    pub block_age_seconds: u64,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            transactions_per_batch: 5,
            max_transactions_count: 100,
            block_await_depth: 0,
            block_age_seconds: 0,
        }
    }
}

/// What one run did.
#[derive(Debug, Clone, Default)]
pub struct TransferSummary {
    /// Messages moved.
    pub processed: usize,
    /// One record per mined submission.
    pub records: Vec<ReceiptRecord>,
}

/// Drives one transfer direction.
#[derive(TypedBuilder)]
pub struct TransferEngine {
    src: ChainSide,
    dst: ChainSide,
    /// BLS seam; `None` submits the zero sentinel.
    #[builder(default)]
    signer: Option<Arc<dyn MessageSigner>>,
    /// Gas policy of the destination chain.
    customizer: TransactionCustomizer,
    /// Dry-run policy of the destination chain.
    gate: DryRunGate,
    /// When the destination is main net: its DepositBox, checked for the
    /// `Error` event after every submission. Side chains verify by receipt
    /// only.
    #[builder(default)]
    deposit_box: Option<Address>,
    #[builder(default)]
    options: TransferOptions,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TransferEngine {
    /// Runs the engine until the work range is drained or a guard or cap
    /// stops it.
    pub async fn run(&self) -> Result<TransferSummary> {
        let direction =
            format!("{}->{}", self.src.chain_name, self.dst.chain_name);
        let outgoing = self
            .src
            .proxy
            .outgoing_messages_counter(&*self.src.client, &self.dst.chain_name)
            .await?
            .low_u64();
        let mut incoming = self
            .dst
            .proxy
            .incoming_messages_counter(&*self.dst.client, &self.src.chain_name)
            .await?
            .low_u64();
        let idx_last_to_pop_not_including = self
            .src
            .proxy
            .incoming_messages_counter(&*self.src.client, &self.dst.chain_name)
            .await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Transfer,
            %direction,
            outgoing,
            incoming,
            idx_last_to_pop = idx_last_to_pop_not_including.low_u64(),
        );
        let per_batch = self.options.transactions_per_batch.max(1);
        let max_total = self.options.max_transactions_count;
        let mut records = Vec::new();
        let mut processed = 0usize;
        while incoming < outgoing && processed < max_total {
            let batch = self
                .accumulate_batch(incoming, outgoing, per_batch, max_total - processed)
                .await?;
            if batch.is_empty() {
                // a guard asked for patience, come back next loop
                break;
            }
            let receipt = self
                .submit_batch(incoming, &batch, idx_last_to_pop_not_including)
                .await?;
            if let Some(deposit_box) = self.deposit_box {
                verify::forbid_event(
                    &*self.dst.client,
                    deposit_box,
                    contracts::error_event(),
                    &receipt,
                )
                .await?;
            }
            records.push(ReceiptRecord::new(
                format!(
                    "postIncomingMessages {direction} [{}..{})",
                    incoming,
                    incoming + batch.len() as u64
                ),
                &receipt,
            ));
            processed += batch.len();
            incoming += batch.len() as u64;
        }
        log_gas_usage_report(&direction, &records);
        Ok(TransferSummary { processed, records })
    }

    /// Collects up to `per_batch` contiguous messages starting at `start`.
    /// Stops early (possibly empty) when a maturity guard trips.
    async fn accumulate_batch(
        &self,
        start: u64,
        outgoing: u64,
        per_batch: usize,
        room_left: usize,
    ) -> Result<Vec<Message>> {
        let mut batch = Vec::new();
        while batch.len() < per_batch
            && batch.len() < room_left
            && start + (batch.len() as u64) < outgoing
        {
            let counter = start + batch.len() as u64;
            let filter = self
                .src
                .proxy
                .outgoing_message_filter(&self.dst.chain_name, counter);
            let logs = self.src.client.logs(&filter).await?;
            // last entry whose decoded destination string actually matches
            let event = logs
                .iter()
                .rev()
                .find_map(|log| {
                    self.src
                        .proxy
                        .decode_outgoing_message(log)
                        .ok()
                        .filter(|e| e.dst_chain == self.dst.chain_name)
                })
                .ok_or(Error::MissingOutgoingMessage { counter })?;
            if !self.security_checks_pass(&event).await? {
                break;
            }
            batch.push(event.message);
        }
        Ok(batch)
    }

    async fn security_checks_pass(
        &self,
        event: &OutgoingMessageEvent,
    ) -> Result<bool> {
        if self.options.block_await_depth > 0 {
            let latest = self.src.client.block_number().await?.low_u64();
            let depth = latest.saturating_sub(event.block_number.low_u64());
            if depth < self.options.block_await_depth {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Transfer,
                    counter = event.counter,
                    depth,
                    required = self.options.block_await_depth,
                    "event not deep enough yet",
                );
                return Ok(false);
            }
        }
        if self.options.block_age_seconds > 0 {
            let timestamp = self
                .src
                .client
                .block_timestamp(event.block_number)
                .await?
                .low_u64();
            let age = unix_now().saturating_sub(timestamp);
            if age < self.options.block_age_seconds {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Transfer,
                    counter = event.counter,
                    age,
                    required = self.options.block_age_seconds,
                    "event not old enough yet",
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn submit_batch(
        &self,
        starting_counter: u64,
        batch: &[Message],
        idx_last_to_pop_not_including: U256,
    ) -> Result<ethers::types::TransactionReceipt> {
        let starting = U256::from(starting_counter);
        let sign = match &self.signer {
            Some(signer) => signer
                .sign_messages(&self.src.chain_name, batch, starting)
                .await
                .map_err(|e| Error::MessageSigning(e.to_string()))?,
            None => BatchSignature::zero(),
        };
        let data = self.dst.proxy.post_incoming_messages_calldata(
            &self.src.chain_name,
            starting,
            batch,
            &sign,
            idx_last_to_pop_not_including,
        )?;
        let sender = TxSender::builder()
            .client(&*self.dst.client)
            .account(&self.dst.account)
            .chain_id(self.dst.chain_id)
            .customizer(self.customizer)
            .gate(self.gate)
            .build();
        let spec = CallSpec::builder()
            .label("postIncomingMessages")
            .to(self.dst.proxy.address)
            .data(data)
            .gas_limit(U256::from(POST_INCOMING_MESSAGES_GAS_LIMIT))
            .build();
        sender.execute(&spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode, Token};
    use ethers::signers::{LocalWallet, Signer};
    use ethers::types::{Bytes, Log, H256};
    use ima_chain::contracts::{
        chain_hash, functions, outgoing_message_event,
    };
    use ima_chain::mock::MockClient;

    const SRC_NAME: &str = "Bob";
    const DST_NAME: &str = "Mainnet";

    fn account() -> Account {
        let wallet: LocalWallet =
            "0x0000000000000000000000000000000000000000000000000000000000000003"
                .parse()
                .unwrap();
        Account {
            address: wallet.address(),
            credential: ima_tx::sign::Credential::Direct { wallet },
        }
    }

    fn uint_bytes(value: u64) -> Bytes {
        encode(&[Token::Uint(U256::from(value))]).into()
    }

    fn outgoing_log(proxy: Address, counter: u64, block: u64) -> Log {
        let data = encode(&[
            Token::String(DST_NAME.into()),
            Token::Address(Address::repeat_byte(0xAA)),
            Token::Address(Address::repeat_byte(0xBB)),
            Token::Uint(U256::from(5u64)),
            Token::Bytes(Vec::new()),
            Token::Uint(U256::zero()),
        ]);
        Log {
            address: proxy,
            topics: vec![
                outgoing_message_event().signature(),
                chain_hash(DST_NAME),
                H256::from_low_u64_be(counter),
                H256::from(Address::repeat_byte(0xCC)),
            ],
            data: data.into(),
            block_number: Some(block.into()),
            ..Default::default()
        }
    }

    struct Setup {
        src_client: Arc<MockClient>,
        dst_client: Arc<MockClient>,
        src_proxy: MessageProxy,
        dst_proxy: MessageProxy,
    }

    impl Setup {
        /// Work range [incoming, outgoing), events mined in block 1.
        fn new(outgoing: u64, incoming: u64) -> Self {
            let src_client = Arc::new(MockClient::new());
            let dst_client = Arc::new(MockClient::new());
            let src_proxy = MessageProxy::new(Address::repeat_byte(0x11));
            let dst_proxy = MessageProxy::new(Address::repeat_byte(0x22));
            src_client.stub_call(
                functions::get_outgoing_messages_counter(),
                uint_bytes(outgoing),
            );
            // idxLastToPopNotIncluding read on the source side
            src_client.stub_call(
                functions::get_incoming_messages_counter(),
                uint_bytes(incoming),
            );
            dst_client.stub_call(
                functions::get_incoming_messages_counter(),
                uint_bytes(incoming),
            );
            dst_client
                .stub_call(functions::post_incoming_messages(), Bytes::default());
            dst_client.set_gas_price(1_000_000_000);
            for counter in incoming..outgoing {
                src_client.push_log(outgoing_log(src_proxy.address, counter, 1));
            }
            Self {
                src_client,
                dst_client,
                src_proxy,
                dst_proxy,
            }
        }

        fn engine(&self, options: TransferOptions) -> TransferEngine {
            TransferEngine::builder()
                .src(ChainSide {
                    client: self.src_client.clone(),
                    proxy: self.src_proxy,
                    account: account(),
                    chain_name: SRC_NAME.into(),
                    chain_id: 1_234_567,
                })
                .dst(ChainSide {
                    client: self.dst_client.clone(),
                    proxy: self.dst_proxy,
                    account: account(),
                    chain_name: DST_NAME.into(),
                    chain_id: 1,
                })
                .customizer(TransactionCustomizer::main_net())
                .gate(DryRunGate::default())
                .options(options)
                .build()
        }
    }

    #[tokio::test]
    async fn equal_counters_do_nothing() {
        let setup = Setup::new(4, 4);
        let summary =
            setup.engine(TransferOptions::default()).run().await.unwrap();
        assert_eq!(summary.processed, 0);
        assert!(summary.records.is_empty());
        assert_eq!(setup.dst_client.sent_count(), 0);
    }

    #[tokio::test]
    async fn drains_the_range_in_bounded_batches() {
        let setup = Setup::new(7, 0);
        let options = TransferOptions {
            transactions_per_batch: 3,
            ..Default::default()
        };
        let summary = setup.engine(options).run().await.unwrap();
        // 3 + 3 + 1
        assert_eq!(summary.processed, 7);
        assert_eq!(summary.records.len(), 3);
        assert_eq!(setup.dst_client.sent_count(), 3);
    }

    #[tokio::test]
    async fn per_run_cap_stops_the_run() {
        let setup = Setup::new(10, 0);
        let options = TransferOptions {
            transactions_per_batch: 3,
            max_transactions_count: 4,
            ..Default::default()
        };
        let summary = setup.engine(options).run().await.unwrap();
        // 3 + 1, then the cap
        assert_eq!(summary.processed, 4);
        assert_eq!(setup.dst_client.sent_count(), 2);
    }

    #[tokio::test]
    async fn shallow_events_exit_cleanly() {
        let setup = Setup::new(3, 0);
        setup.src_client.set_block_number(2);
        let options = TransferOptions {
            block_await_depth: 5,
            ..Default::default()
        };
        let summary = setup.engine(options).run().await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(setup.dst_client.sent_count(), 0);
    }

    #[tokio::test]
    async fn young_events_exit_cleanly() {
        let setup = Setup::new(3, 0);
        // block 1 stamped in the far future, so its age stays zero
        setup.src_client.set_block_timestamp(1, u64::MAX);
        let options = TransferOptions {
            block_age_seconds: 60,
            ..Default::default()
        };
        let summary = setup.engine(options).run().await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(setup.dst_client.sent_count(), 0);
    }

    #[tokio::test]
    async fn missing_log_is_fatal() {
        let setup = Setup::new(3, 0);
        // drop the logs by using a fresh source client with counters only
        let bare = Arc::new(MockClient::new());
        bare.stub_call(
            functions::get_outgoing_messages_counter(),
            uint_bytes(3),
        );
        bare.stub_call(
            functions::get_incoming_messages_counter(),
            uint_bytes(0),
        );
        let mut engine = setup.engine(TransferOptions::default());
        engine.src.client = bare;
        let err = engine.run().await.unwrap_err();
        assert!(matches!(
            err,
            Error::MissingOutgoingMessage { counter: 0 }
        ));
    }

    struct FailingSigner;

    #[async_trait::async_trait]
    impl MessageSigner for FailingSigner {
        async fn sign_messages(
            &self,
            _src_chain: &str,
            _messages: &[Message],
            _starting_counter: U256,
        ) -> Result<BatchSignature> {
            Err(Error::Generic("bls glue is down"))
        }
    }

    struct RecordingSigner {
        calls: parking_lot::Mutex<Vec<(usize, u64)>>,
    }

    #[async_trait::async_trait]
    impl MessageSigner for RecordingSigner {
        async fn sign_messages(
            &self,
            _src_chain: &str,
            messages: &[Message],
            starting_counter: U256,
        ) -> Result<BatchSignature> {
            self.calls
                .lock()
                .push((messages.len(), starting_counter.low_u64()));
            Ok(BatchSignature {
                signature: [U256::one(), U256::from(2u64)],
                hash_a: U256::from(3u64),
                hash_b: U256::from(4u64),
                counter: U256::from(5u64),
            })
        }
    }

    #[tokio::test]
    async fn signer_failure_aborts_before_any_send() {
        let setup = Setup::new(3, 0);
        let mut engine = setup.engine(TransferOptions::default());
        engine.signer = Some(Arc::new(FailingSigner));
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, Error::MessageSigning(_)));
        assert_eq!(setup.dst_client.sent_count(), 0);
    }

    #[tokio::test]
    async fn signer_sees_contiguous_batches() {
        let setup = Setup::new(7, 2);
        let signer = Arc::new(RecordingSigner {
            calls: parking_lot::Mutex::new(Vec::new()),
        });
        let options = TransferOptions {
            transactions_per_batch: 2,
            ..Default::default()
        };
        let mut engine = setup.engine(options);
        engine.signer = Some(signer.clone());
        let summary = engine.run().await.unwrap();
        assert_eq!(summary.processed, 5);
        assert_eq!(
            signer.calls.lock().clone(),
            vec![(2, 2), (2, 4), (1, 6)]
        );
    }

    #[tokio::test]
    async fn main_net_destination_checks_the_deposit_box() {
        let setup = Setup::new(2, 0);
        let mut engine = setup.engine(TransferOptions::default());
        engine.deposit_box = Some(Address::repeat_byte(0x33));
        // no Error log pushed, the check passes
        let summary = engine.run().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(setup.dst_client.sent_count(), 1);
    }
}
