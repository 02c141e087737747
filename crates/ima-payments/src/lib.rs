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

//! User-facing payment operations of the bridge: ETH, ERC20 and ERC721
//! deposits towards the S-chain, exits back to main net, and the one-time
//! registration handshakes. Everything flows through the [`ima_tx`] send
//! pipeline; multi-transaction flows honor the S-chain pacing knobs
//! between sends.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use ima_chain::{wait_for_next_block, ChainClient};
use ima_tx::customize::TransactionCustomizer;
use ima_tx::dry_run::DryRunGate;
use ima_tx::sender::TxSender;
use ima_tx::sign::Account;
use ima_utils::Result;

pub mod erc20;
pub mod erc721;
pub mod eth;
pub mod register;

/// Gas limit for token approvals and transfers.
pub const GAS_LIMIT_TOKEN_OP: u64 = 3_000_000;
/// Gas limit for deposits, exits and registry writes.
pub const GAS_LIMIT_BRIDGE_OP: u64 = 6_000_000;
/// Fixed processing value attached to an ERC721 deposit, in wei.
pub const ERC721_DEPOSIT_PROCESSING_WEI: u64 = 2_000_000_000_000_000;

/// Everything needed to send transactions on one chain.
#[derive(Clone)]
pub struct PaymentSide {
    /// Node connection.
    pub client: Arc<dyn ChainClient>,
    /// Paying account.
    pub account: Account,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Gas price policy.
    pub customizer: TransactionCustomizer,
    /// Dry-run policy.
    pub gate: DryRunGate,
}

impl PaymentSide {
    /// A sender over this side.
    #[must_use]
    pub fn sender(&self) -> TxSender<'_> {
        TxSender::builder()
            .client(&*self.client)
            .account(&self.account)
            .chain_id(self.chain_id)
            .customizer(self.customizer)
            .gate(self.gate)
            .build()
    }
}

impl std::fmt::Debug for PaymentSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSide")
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Pacing between consecutive S-chain transactions. Gas-free chains mine
/// irregularly; without pacing the second transaction of a flow tends to
/// race the first one's nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchainPacing {
    /// Plain sleep after a transaction, zero to skip.
    pub sleep_between_transactions: Duration,
    /// Additionally wait until the chain mints a fresh block.
    pub wait_for_next_block: bool,
}

impl SchainPacing {
    /// Applies the pacing once.
    pub async fn pace(&self, client: &dyn ChainClient) -> Result<()> {
        if self.wait_for_next_block {
            wait_for_next_block(client, Duration::from_secs(1)).await?;
        }
        if !self.sleep_between_transactions.is_zero() {
            tokio::time::sleep(self.sleep_between_transactions).await;
        }
        Ok(())
    }
}

/// A main-net/S-chain token pairing. `paired_token` selects the `raw*`
/// contract entry points for tokens that never went through on-chain
/// token registration.
#[derive(Debug, Clone, Copy)]
pub struct TokenPairing {
    /// The token on the chain the transaction runs on.
    pub token: Address,
    /// Its counterpart on the other chain, for raw pairings only.
    pub paired_token: Option<Address>,
}
