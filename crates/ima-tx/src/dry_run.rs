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

//! Pre-submission `eth_call` gate. Catches reverts before gas is spent on
//! a doomed transaction.

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ima_chain::ChainClient;
use ima_utils::{probe, Error, Result};

/// Gas limit used for the probe call, large enough for any agent
/// transaction.
pub const PROBE_GAS_LIMIT: u64 = 8_000_000;

/// Policy knobs of the dry-run stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunGate {
    /// Skip the probe call entirely.
    pub disabled: bool,
    /// Treat every probe failure as a warning.
    pub ignore_failures: bool,
}

impl DryRunGate {
    /// Probes `data` against `to` from the sender address.
    ///
    /// A revert aborts the pipeline with [`Error::DryRunFailed`] unless the
    /// call is marked `ignorable` or the gate ignores failures globally.
    pub async fn preflight(
        &self,
        client: &dyn ChainClient,
        from: Address,
        to: Address,
        data: &Bytes,
        value: U256,
        label: &str,
        ignorable: bool,
    ) -> Result<()> {
        if self.disabled {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::TRACE,
                kind = %probe::Kind::DryRun,
                %label,
                skipped = true,
            );
            return Ok(());
        }
        let tx: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data.clone())
            .value(value)
            .gas(PROBE_GAS_LIMIT)
            .into();
        match client.call(&tx).await {
            Ok(_) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::TRACE,
                    kind = %probe::Kind::DryRun,
                    %label,
                    ok = true,
                );
                Ok(())
            }
            Err(e) if ignorable || self.ignore_failures => {
                tracing::warn!(%label, error = %e, "dry-run reverted, ignored");
                Ok(())
            }
            Err(e) => Err(Error::DryRunFailed {
                label: label.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ima_chain::contracts::functions;
    use ima_chain::mock::MockClient;

    fn deposit_calldata() -> Bytes {
        functions::deposit().short_signature().to_vec().into()
    }

    #[tokio::test]
    async fn revert_aborts_the_pipeline() {
        let client = MockClient::new();
        client.revert_call(functions::deposit());
        let gate = DryRunGate::default();
        let err = gate
            .preflight(
                &client,
                Address::repeat_byte(1),
                Address::repeat_byte(2),
                &deposit_calldata(),
                U256::zero(),
                "deposit",
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DryRunFailed { .. }));
    }

    #[tokio::test]
    async fn ignorable_revert_is_a_warning() {
        let client = MockClient::new();
        client.revert_call(functions::deposit());
        let gate = DryRunGate::default();
        gate.preflight(
            &client,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            &deposit_calldata(),
            U256::zero(),
            "deposit",
            true,
        )
        .await
        .unwrap();

        let globally_ignoring = DryRunGate {
            ignore_failures: true,
            ..Default::default()
        };
        globally_ignoring
            .preflight(
                &client,
                Address::repeat_byte(1),
                Address::repeat_byte(2),
                &deposit_calldata(),
                U256::zero(),
                "deposit",
                false,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn disabled_gate_skips_the_probe() {
        // nothing stubbed, the call would fail if attempted
        let client = MockClient::new();
        let gate = DryRunGate {
            disabled: true,
            ..Default::default()
        };
        gate.preflight(
            &client,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            &deposit_calldata(),
            U256::zero(),
            "deposit",
            false,
        )
        .await
        .unwrap();
    }
}
