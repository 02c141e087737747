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

//! Post-submission event checks.
//!
//! Logs are queried for one event signature in exactly the block the
//! transaction was mined in, then narrowed to the transaction hash on the
//! client side. Two modes: an event that must accompany the transaction
//! and an event that must never do so.

use ethers::abi::Event;
use ethers::types::{Address, Filter, Log, TransactionReceipt, H256, U64};
use ima_chain::ChainClient;
use ima_utils::{Error, Result};

/// Logs of `event` emitted by `address` in `block_number`, restricted to
/// `tx_hash`.
pub async fn contract_call_events(
    client: &dyn ChainClient,
    address: Address,
    event: &Event,
    block_number: U64,
    tx_hash: H256,
) -> Result<Vec<Log>> {
    let filter = Filter::new()
        .address(address)
        .topic0(event.signature())
        .from_block(block_number)
        .to_block(block_number);
    let logs = client.logs(&filter).await?;
    Ok(logs
        .into_iter()
        .filter(|log| log.transaction_hash == Some(tx_hash))
        .collect())
}

fn mined_block(receipt: &TransactionReceipt) -> Result<U64> {
    receipt
        .block_number
        .ok_or(Error::Generic("receipt carries no block number"))
}

/// Fails with [`Error::EventNotFound`] unless `event` accompanied the
/// receipt's transaction.
pub async fn require_event(
    client: &dyn ChainClient,
    address: Address,
    event: &Event,
    receipt: &TransactionReceipt,
) -> Result<()> {
    let block = mined_block(receipt)?;
    let logs = contract_call_events(
        client,
        address,
        event,
        block,
        receipt.transaction_hash,
    )
    .await?;
    if logs.is_empty() {
        return Err(Error::EventNotFound {
            event: event.name.clone(),
            tx_hash: receipt.transaction_hash,
        });
    }
    Ok(())
}

/// Fails with [`Error::ForbiddenEventSeen`] if `event` accompanied the
/// receipt's transaction.
pub async fn forbid_event(
    client: &dyn ChainClient,
    address: Address,
    event: &Event,
    receipt: &TransactionReceipt,
) -> Result<()> {
    let block = mined_block(receipt)?;
    let logs = contract_call_events(
        client,
        address,
        event,
        block,
        receipt.transaction_hash,
    )
    .await?;
    if !logs.is_empty() {
        return Err(Error::ForbiddenEventSeen {
            event: event.name.clone(),
            tx_hash: receipt.transaction_hash,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ima_chain::contracts::{error_event, eth_received_event};
    use ima_chain::mock::MockClient;

    fn receipt(tx_hash: H256, block: u64) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(block)),
            ..Default::default()
        }
    }

    fn log_of(
        address: Address,
        event: &Event,
        tx_hash: H256,
        block: u64,
    ) -> Log {
        Log {
            address,
            topics: vec![event.signature()],
            transaction_hash: Some(tx_hash),
            block_number: Some(U64::from(block)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn must_absent_ignores_other_transactions_in_the_block() {
        let client = MockClient::new();
        let deposit_box = Address::repeat_byte(3);
        let ours = H256::repeat_byte(1);
        let theirs = H256::repeat_byte(2);
        // a different transaction in the same block triggered the event
        client.push_log(log_of(deposit_box, error_event(), theirs, 10));
        forbid_event(&client, deposit_box, error_event(), &receipt(ours, 10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn must_absent_fails_on_our_transaction() {
        let client = MockClient::new();
        let deposit_box = Address::repeat_byte(3);
        let ours = H256::repeat_byte(1);
        client.push_log(log_of(deposit_box, error_event(), ours, 10));
        let err =
            forbid_event(&client, deposit_box, error_event(), &receipt(ours, 10))
                .await
                .unwrap_err();
        assert!(matches!(err, Error::ForbiddenEventSeen { .. }));
    }

    #[tokio::test]
    async fn must_have_requires_our_hash_not_just_any() {
        let client = MockClient::new();
        let deposit_box = Address::repeat_byte(3);
        let ours = H256::repeat_byte(1);
        let theirs = H256::repeat_byte(2);
        client.push_log(log_of(deposit_box, eth_received_event(), theirs, 10));
        let err = require_event(
            &client,
            deposit_box,
            eth_received_event(),
            &receipt(ours, 10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::EventNotFound { .. }));

        client.push_log(log_of(deposit_box, eth_received_event(), ours, 10));
        require_event(
            &client,
            deposit_box,
            eth_received_event(),
            &receipt(ours, 10),
        )
        .await
        .unwrap();
    }
}
