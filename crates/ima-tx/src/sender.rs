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

//! One-stop pipeline for sending a contract call: dry-run, nonce, gas
//! price, compose, sign, safe-submit.

use ethers::types::{Address, Bytes, TransactionReceipt, U256};
use ima_chain::ChainClient;
use ima_utils::{probe, Result};
use typed_builder::TypedBuilder;

use crate::compose::{compose, named_signing_profile, TxParams};
use crate::customize::TransactionCustomizer;
use crate::dry_run::DryRunGate;
use crate::sign::{sign_transaction, Account};
use crate::submit::finalize;

/// One contract call to send.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CallSpec {
    /// Short label used in logs and error messages.
    pub label: &'static str,
    /// Receiver contract.
    pub to: Address,
    /// Calldata.
    pub data: Bytes,
    /// Attached value in wei.
    #[builder(default)]
    pub value: U256,
    /// Gas limit.
    pub gas_limit: U256,
    /// Use this nonce instead of querying the chain. Needed when queueing
    /// several transactions of one account back to back.
    #[builder(default)]
    pub nonce_override: Option<U256>,
    /// Let a dry-run revert of this particular call pass with a warning.
    #[builder(default)]
    pub ignore_dry_run_failure: bool,
}

/// Sends [`CallSpec`]s for one account on one chain.
#[derive(Clone, Copy, TypedBuilder)]
pub struct TxSender<'a> {
    /// Node connection.
    pub client: &'a dyn ChainClient,
    /// Sending account.
    pub account: &'a Account,
    /// EIP-155 chain id of the target chain.
    pub chain_id: u64,
    /// Gas price policy.
    pub customizer: TransactionCustomizer,
    /// Dry-run policy.
    pub gate: DryRunGate,
}

impl TxSender<'_> {
    /// Runs the whole pipeline for `spec` and returns the mined receipt.
    pub async fn execute(&self, spec: &CallSpec) -> Result<TransactionReceipt> {
        self.gate
            .preflight(
                self.client,
                self.account.address,
                spec.to,
                &spec.data,
                spec.value,
                spec.label,
                spec.ignore_dry_run_failure,
            )
            .await?;
        let nonce = match spec.nonce_override {
            Some(nonce) => nonce,
            None => {
                self.client.transaction_count(self.account.address).await?
            }
        };
        let gas_price = self.customizer.compute_gas_price(self.client).await?;
        let params = TxParams::builder()
            .from(self.account.address)
            .to(spec.to)
            .data(spec.data.clone())
            .value(spec.value)
            .nonce(nonce)
            .gas_limit(spec.gas_limit)
            .gas_price(gas_price)
            .chain_id(self.chain_id)
            .build();
        let tx = compose(&params);
        let outcome = sign_transaction(self.account, &tx).await?;
        let receipt = finalize(self.client, outcome).await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSend,
            label = %spec.label,
            tx_hash = ?receipt.transaction_hash,
            chain = ?named_signing_profile(self.chain_id),
            gas_used = ?receipt.gas_used,
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::Credential;
    use ethers::signers::{LocalWallet, Signer};
    use ethers::types::U64;
    use ima_chain::contracts::{functions, DepositBox};
    use ima_chain::mock::MockClient;

    fn direct_account() -> Account {
        let wallet: LocalWallet =
            "0x0000000000000000000000000000000000000000000000000000000000000002"
                .parse()
                .unwrap();
        Account {
            address: wallet.address(),
            credential: Credential::Direct { wallet },
        }
    }

    #[tokio::test]
    async fn pipeline_sends_exactly_one_transaction() {
        let client = MockClient::new();
        client.set_nonce(4);
        client.set_gas_price(1_000_000_000);
        client.stub_call(functions::deposit(), Bytes::default());
        let account = direct_account();
        let sender = TxSender::builder()
            .client(&client)
            .account(&account)
            .chain_id(5)
            .customizer(TransactionCustomizer::main_net())
            .gate(DryRunGate::default())
            .build();
        let deposit_box = DepositBox::new(Address::repeat_byte(9));
        let data = deposit_box
            .deposit_calldata("Bob", Address::repeat_byte(7))
            .unwrap();
        let spec = CallSpec::builder()
            .label("deposit")
            .to(deposit_box.address)
            .data(data)
            .value(U256::from(1_000u64))
            .gas_limit(U256::from(3_000_000u64))
            .build();
        let receipt = sender.execute(&spec).await.unwrap();
        assert_eq!(receipt.status, Some(U64::one()));
        assert_eq!(client.sent_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_revert_blocks_the_send() {
        let client = MockClient::new();
        client.set_nonce(0);
        client.set_gas_price(1);
        client.revert_call(functions::deposit());
        let account = direct_account();
        let sender = TxSender::builder()
            .client(&client)
            .account(&account)
            .chain_id(5)
            .customizer(TransactionCustomizer::s_chain())
            .gate(DryRunGate::default())
            .build();
        let deposit_box = DepositBox::new(Address::repeat_byte(9));
        let data = deposit_box
            .deposit_calldata("Bob", Address::repeat_byte(7))
            .unwrap();
        let spec = CallSpec::builder()
            .label("deposit")
            .to(deposit_box.address)
            .data(data)
            .gas_limit(U256::from(3_000_000u64))
            .build();
        assert!(sender.execute(&spec).await.is_err());
        assert_eq!(client.sent_count(), 0);
    }
}
