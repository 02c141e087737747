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

//! Safe submission: one broadcast, at most one retry, then a fatal error
//! carrying both failures. Already-broadcast transactions (Transaction
//! Manager outcomes) are resolved by polling for the receipt.

use std::time::Duration;

use ethers::types::{Bytes, TransactionReceipt, H256};
use ima_chain::ChainClient;
use ima_utils::retry::ConstantWithMaxRetryCount;
use ima_utils::{probe, Error, Result};

use crate::sign::SignOutcome;

/// Interval between receipt polls for auto-sent transactions.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// How many receipt polls before the transaction is declared lost.
pub const RECEIPT_POLL_RETRIES: usize = 60;

/// Broadcasts raw signed bytes with exactly one retry.
pub async fn submit_signed(
    client: &dyn ChainClient,
    raw: Bytes,
) -> Result<TransactionReceipt> {
    match client.send_raw_transaction(raw.clone()).await {
        Ok(receipt) => Ok(receipt),
        Err(first) => {
            tracing::warn!(error = %first, "transaction send failed, retrying once");
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Retry,
                stage = "send_raw_transaction",
            );
            match client.send_raw_transaction(raw).await {
                Ok(receipt) => Ok(receipt),
                Err(second) => Err(Error::TxSubmissionFailed {
                    first: first.to_string(),
                    second: second.to_string(),
                }),
            }
        }
    }
}

/// Polls for the receipt of an already-broadcast transaction.
pub async fn await_receipt(
    client: &dyn ChainClient,
    tx_hash: H256,
    policy: ConstantWithMaxRetryCount,
) -> Result<TransactionReceipt> {
    let attempts = policy.max_retry_count();
    backoff::future::retry(policy, || async {
        match client.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => Ok(receipt),
            Ok(None) => Err(backoff::Error::transient(Error::ReceiptTimeout {
                tx_hash,
                attempts,
            })),
            Err(e) => Err(backoff::Error::permanent(e)),
        }
    })
    .await
}

/// Resolves a signing outcome into a mined receipt.
pub async fn finalize(
    client: &dyn ChainClient,
    outcome: SignOutcome,
) -> Result<TransactionReceipt> {
    match outcome {
        SignOutcome::Signed(raw) => submit_signed(client, raw).await,
        SignOutcome::Sent(tx_hash) => {
            await_receipt(
                client,
                tx_hash,
                ConstantWithMaxRetryCount::new(
                    RECEIPT_POLL_INTERVAL,
                    RECEIPT_POLL_RETRIES,
                ),
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U64;
    use ima_chain::mock::MockClient;

    #[tokio::test]
    async fn first_attempt_success_needs_no_retry() {
        let client = MockClient::new();
        let receipt =
            submit_signed(&client, Bytes::from(vec![1u8])).await.unwrap();
        assert_eq!(receipt.status, Some(U64::one()));
        assert_eq!(client.sent_count(), 1);
    }

    #[tokio::test]
    async fn second_attempt_success_is_accepted() {
        let client = MockClient::new();
        client.fail_next_sends(1);
        let receipt =
            submit_signed(&client, Bytes::from(vec![1u8])).await.unwrap();
        assert_eq!(receipt.status, Some(U64::one()));
        assert_eq!(client.sent_count(), 1);
    }

    #[tokio::test]
    async fn two_failures_are_fatal_with_both_causes() {
        let client = MockClient::new();
        client.fail_next_sends(2);
        let err = submit_signed(&client, Bytes::from(vec![1u8]))
            .await
            .unwrap_err();
        match err {
            Error::TxSubmissionFailed { first, second } => {
                assert!(first.contains("send failed"));
                assert!(second.contains("send failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.sent_count(), 0);
    }

    #[tokio::test]
    async fn delayed_receipt_is_eventually_found() {
        let client = MockClient::new();
        let hash = H256::repeat_byte(7);
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::one()),
            ..Default::default()
        };
        client.insert_receipt(hash, receipt, 2);
        let policy =
            ConstantWithMaxRetryCount::new(Duration::from_millis(1), 5);
        let found = await_receipt(&client, hash, policy).await.unwrap();
        assert_eq!(found.transaction_hash, hash);
    }

    #[tokio::test]
    async fn missing_receipt_times_out() {
        let client = MockClient::new();
        let policy =
            ConstantWithMaxRetryCount::new(Duration::from_millis(1), 3);
        let err = await_receipt(&client, H256::repeat_byte(9), policy)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReceiptTimeout { attempts: 3, .. }));
    }
}
