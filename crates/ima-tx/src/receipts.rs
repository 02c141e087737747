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

//! Ephemeral per-run receipt records and the gas usage report. Nothing
//! here is persisted; on-chain counters are the only durable progress.

use ethers::types::{TransactionReceipt, H256, U256};
use ima_utils::probe;

/// One mined transaction of a run.
#[derive(Debug, Clone)]
pub struct ReceiptRecord {
    /// What the transaction did.
    pub description: String,
    /// Mined transaction hash.
    pub tx_hash: H256,
    /// Gas used, zero when the node did not report it.
    pub gas_used: U256,
}

impl ReceiptRecord {
    /// Record for a mined receipt.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        receipt: &TransactionReceipt,
    ) -> Self {
        Self {
            description: description.into(),
            tx_hash: receipt.transaction_hash,
            gas_used: receipt.gas_used.unwrap_or_default(),
        }
    }
}

/// Sums gas over `records`.
#[must_use]
pub fn total_gas_used(records: &[ReceiptRecord]) -> U256 {
    records
        .iter()
        .fold(U256::zero(), |acc, r| acc.saturating_add(r.gas_used))
}

/// Emits the per-run gas usage report as probe events.
pub fn log_gas_usage_report(name: &str, records: &[ReceiptRecord]) {
    if records.is_empty() {
        return;
    }
    for record in records {
        tracing::debug!(
            target: probe::TARGET,
            report = %name,
            description = %record.description,
            tx_hash = ?record.tx_hash,
            gas_used = %record.gas_used,
        );
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::INFO,
        kind = %probe::Kind::GasReport,
        report = %name,
        transactions = records.len(),
        total_gas_used = %total_gas_used(records),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(gas: u64) -> ReceiptRecord {
        ReceiptRecord {
            description: "postIncomingMessages".into(),
            tx_hash: H256::repeat_byte(1),
            gas_used: U256::from(gas),
        }
    }

    #[test]
    fn totals_gas_over_all_records() {
        let records = vec![record(100), record(250), record(1)];
        assert_eq!(total_gas_used(&records), U256::from(351u64));
        assert_eq!(total_gas_used(&[]), U256::zero());
    }
}
