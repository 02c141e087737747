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

#![warn(missing_docs)]

//! # IMA Agent Configuration
//!
//! Configuration for the agent: the two chains it bridges, the transfer
//! loop knobs and the PWA coordination ring. Files are TOML or JSON,
//! discovered recursively in a config directory and merged with `IMA`
//! prefixed environment variables.

/// CLI options and logger setup.
#[cfg(feature = "cli")]
pub mod cli;
/// Loading and post-processing of configuration files.
pub mod utils;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use url::Url;

/// The default port the agent's JSON-RPC endpoint listens on.
const fn default_port() -> u16 {
    9713
}
/// Messages per `postIncomingMessages` submission, by default.
const fn default_transactions_per_batch() -> u64 {
    5
}
/// Messages per transfer run across all batches, by default.
const fn default_max_transactions_count() -> u64 {
    100
}
/// Seconds between transfer loop iterations, by default.
const fn default_loop_interval_seconds() -> u64 {
    10
}
/// Seconds after which a reported PWA busy state is stale, by default.
const fn default_pwa_timeout_seconds() -> u64 {
    300
}
const fn default_nodes_count() -> usize {
    1
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImaAgentConfig {
    /// Port of the inbound JSON-RPC endpoint (PWA notifications).
    ///
    /// defaults to 9713
    #[serde(default = "default_port")]
    pub port: u16,
    /// The Ethereum main net side.
    pub main_net: NetworkConfig,
    /// The SKALE side chain.
    pub s_chain: NetworkConfig,
    /// Transfer loop knobs.
    #[serde(default)]
    pub transfer: TransferConfig,
    /// PWA coordination ring.
    #[serde(default)]
    pub pwa: PwaConfig,
}

/// One side of the bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// Chain name as registered in the proxies (e.g. `Mainnet`).
    pub chain_name: String,
    /// HTTP JSON-RPC endpoint of a node.
    pub http_endpoint: Url,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// `MessageProxy` contract address.
    pub message_proxy: Address,
    /// `DepositBox` address, main net only.
    #[serde(default)]
    pub deposit_box: Option<Address>,
    /// `TokenManager` address, S-chain only.
    #[serde(default)]
    pub token_manager: Option<Address>,
    /// `LockAndData` registry address.
    #[serde(default)]
    pub lock_and_data: Option<Address>,
    /// The account paying for transactions on this side.
    pub account: AccountConfig,
    /// Gas price multiplier over the node's recommendation. Absent means
    /// the recommendation is used as-is; zero or negative means a zero
    /// gas price.
    #[serde(default)]
    pub gas_price_multiplier: Option<f64>,
    /// Dry-run policy for this side.
    #[serde(default)]
    pub dry_run: DryRunConfig,
}

/// The paying account and its signing credential.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountConfig {
    /// The account address.
    pub address: Address,
    /// How transactions of this account get signed.
    pub credential: CredentialConfig,
}

/// Signing credential, explicitly tagged by `kind`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum CredentialConfig {
    /// A local private key.
    Direct {
        /// Hex-encoded secp256k1 private key.
        private_key: PrivateKey,
    },
    /// A remote SGX wallet.
    Sgx {
        /// JSON-RPC endpoint of the SGX wallet.
        url: Url,
        /// Name of the ECDSA key inside the enclave.
        key_name: String,
        /// PEM bundle with the TLS client certificate and key.
        #[serde(default)]
        tls_identity_path: Option<std::path::PathBuf>,
    },
    /// A Transaction Manager that signs and broadcasts.
    TransactionManager {
        /// JSON-RPC endpoint of the Transaction Manager.
        url: Url,
    },
}

/// A private key read from config or the environment. Debug output and
/// serialization never reveal it.
#[derive(Clone, Deserialize)]
pub struct PrivateKey(String);

impl PrivateKey {
    /// The hex-encoded key material.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("<private-key>")
    }
}

/// Dry-run gate configuration of one side.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DryRunConfig {
    /// Whether calls are dry-run before submission at all.
    pub enabled: bool,
    /// Log dry-run failures and submit anyway.
    pub ignore_failures: bool,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore_failures: false,
        }
    }
}

/// Transfer loop knobs.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransferConfig {
    /// Messages per `postIncomingMessages` submission. Clamped to at
    /// least 1 on load.
    #[serde(default = "default_transactions_per_batch")]
    pub transactions_per_batch: u64,
    /// Messages per transfer run across all batches.
    #[serde(default = "default_max_transactions_count")]
    pub max_transactions_count: u64,
    /// Only relay events buried at least this many blocks below the
    /// source head. Zero disables the guard.
    #[serde(default)]
    pub block_await_depth: u64,
    /// Only relay events whose block is at least this old, in seconds.
    /// Zero disables the guard.
    #[serde(default)]
    pub block_age_seconds: u64,
    /// Seconds between transfer loop iterations.
    #[serde(default = "default_loop_interval_seconds")]
    pub loop_interval_seconds: u64,
    /// Plain sleep between consecutive S-chain transactions of one flow.
    #[serde(default)]
    pub sleep_between_transactions_ms: u64,
    /// Additionally wait for a fresh S-chain block between transactions.
    #[serde(default)]
    pub wait_for_next_block: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            transactions_per_batch: default_transactions_per_batch(),
            max_transactions_count: default_max_transactions_count(),
            block_await_depth: 0,
            block_age_seconds: 0,
            loop_interval_seconds: default_loop_interval_seconds(),
            sleep_between_transactions_ms: 0,
            wait_for_next_block: false,
        }
    }
}

/// PWA coordination ring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PwaConfig {
    /// Whether coordination is active at all.
    #[serde(default)]
    pub enabled: bool,
    /// Our index in the ring.
    #[serde(default)]
    pub node_number: usize,
    /// Ring size.
    #[serde(default = "default_nodes_count")]
    pub nodes_count: usize,
    /// Seconds after which a reported busy state is considered stale.
    #[serde(default = "default_pwa_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Agent JSON-RPC endpoints by node number. A null entry is a node
    /// we never notify.
    #[serde(default)]
    pub peers: Vec<Option<Url>>,
}

impl Default for PwaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            node_number: 0,
            nodes_count: default_nodes_count(),
            timeout_seconds: default_pwa_timeout_seconds(),
            peers: Vec::new(),
        }
    }
}

impl ImaAgentConfig {
    /// Basic sanity checks over a loaded configuration.
    pub fn verify(&self) -> ima_utils::Result<()> {
        if self.main_net.chain_name.is_empty()
            || self.s_chain.chain_name.is_empty()
        {
            return Err(ima_utils::Error::Generic(
                "chain names must not be empty",
            ));
        }
        if self.main_net.chain_name == self.s_chain.chain_name {
            return Err(ima_utils::Error::Generic(
                "main net and S-chain must have distinct chain names",
            ));
        }
        if self.pwa.enabled && self.pwa.node_number >= self.pwa.nodes_count {
            return Err(ima_utils::Error::Generic(
                "pwa node number out of range",
            ));
        }
        Ok(())
    }
}
