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

//! Wiring of the long-running agent: the shared context built from the
//! configuration, the periodic transfer loop and the inbound JSON-RPC
//! endpoint for PWA loop-state notifications.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use ethers::signers::LocalWallet;
use serde::Deserialize;
use serde_json::Value;

use ima_chain::contracts::{LockAndDataMainNet, LockAndDataSchain, MessageProxy};
use ima_chain::HttpChainClient;
use ima_config::{AccountConfig, CredentialConfig, ImaAgentConfig, NetworkConfig};
use ima_pwa::{LoopStateSigner, NullLoopSigner, PwaCoordinator, PwaSettings, NOTIFY_METHOD};
use ima_transfer::{ChainSide, TransferEngine, TransferOptions};
use ima_tx::customize::TransactionCustomizer;
use ima_tx::dry_run::DryRunGate;
use ima_tx::sign::{Account, Credential};
use ima_utils::probe;

use crate::Result;

/// Everything the long-running tasks share: the two chain sides, their
/// policies and the PWA coordinator.
#[derive(Clone)]
pub struct AgentContext {
    /// The loaded configuration.
    pub config: ImaAgentConfig,
    /// Main net side.
    pub main_net: ChainSide,
    /// S-chain side.
    pub s_chain: ChainSide,
    /// Gas policy towards main net.
    pub main_customizer: TransactionCustomizer,
    /// Gas policy towards the S-chain.
    pub s_customizer: TransactionCustomizer,
    /// Dry-run policy towards main net.
    pub main_gate: DryRunGate,
    /// Dry-run policy towards the S-chain.
    pub s_gate: DryRunGate,
    /// PWA ring coordinator.
    pub pwa: Arc<PwaCoordinator>,
}

fn account_from_config(config: &AccountConfig) -> Result<Account> {
    let credential = match &config.credential {
        CredentialConfig::Direct { private_key } => {
            let wallet: LocalWallet = private_key.expose().parse()?;
            Credential::Direct { wallet }
        }
        CredentialConfig::Sgx {
            url,
            key_name,
            tls_identity_path,
        } => {
            let identity = match tls_identity_path {
                Some(path) => {
                    let pem = std::fs::read(path)?;
                    Some(reqwest::Identity::from_pem(&pem)?)
                }
                None => None,
            };
            Credential::Sgx {
                url: url.clone(),
                key_name: key_name.clone(),
                identity,
            }
        }
        CredentialConfig::TransactionManager { url } => {
            Credential::TransactionManager { url: url.clone() }
        }
    };
    Ok(Account {
        address: config.address,
        credential,
    })
}

fn chain_side(network: &NetworkConfig) -> Result<ChainSide> {
    let client = HttpChainClient::new(network.http_endpoint.as_str())?;
    Ok(ChainSide {
        client: Arc::new(client),
        proxy: MessageProxy::new(network.message_proxy),
        account: account_from_config(&network.account)?,
        chain_name: network.chain_name.clone(),
        chain_id: network.chain_id,
    })
}

fn gate(network: &NetworkConfig) -> DryRunGate {
    DryRunGate {
        disabled: !network.dry_run.enabled,
        ignore_failures: network.dry_run.ignore_failures,
    }
}

impl AgentContext {
    /// Builds the context from a loaded configuration. The PWA signer
    /// defaults to the null signer until real signing glue is wired in.
    pub fn new(config: ImaAgentConfig) -> Result<Self> {
        Self::with_loop_signer(config, Arc::new(NullLoopSigner))
    }

    /// Builds the context with an explicit PWA loop-state signer.
    pub fn with_loop_signer(
        config: ImaAgentConfig,
        loop_signer: Arc<dyn LoopStateSigner>,
    ) -> Result<Self> {
        let main_net = chain_side(&config.main_net)?;
        let s_chain = chain_side(&config.s_chain)?;
        let main_customizer = match config.main_net.gas_price_multiplier {
            Some(m) => TransactionCustomizer::new(Some(m)),
            None => TransactionCustomizer::main_net(),
        };
        let s_customizer =
            TransactionCustomizer::new(config.s_chain.gas_price_multiplier);
        let pwa = PwaCoordinator::new(
            PwaSettings {
                enabled: config.pwa.enabled,
                node_number: config.pwa.node_number,
                nodes_count: config.pwa.nodes_count,
                timeout_seconds: config.pwa.timeout_seconds,
            },
            config.pwa.peers.clone(),
            loop_signer,
        );
        Ok(Self {
            main_customizer,
            s_customizer,
            main_gate: gate(&config.main_net),
            s_gate: gate(&config.s_chain),
            pwa: Arc::new(pwa),
            main_net,
            s_chain,
            config,
        })
    }

    fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            transactions_per_batch: self
                .config
                .transfer
                .transactions_per_batch
                .max(1) as usize,
            max_transactions_count: self.config.transfer.max_transactions_count
                as usize,
            block_await_depth: self.config.transfer.block_await_depth,
            block_age_seconds: self.config.transfer.block_age_seconds,
        }
    }

    /// Engine moving messages from main net into the S-chain.
    #[must_use]
    pub fn main_net_to_s_chain(&self) -> TransferEngine {
        TransferEngine::builder()
            .src(self.main_net.clone())
            .dst(self.s_chain.clone())
            .customizer(self.s_customizer)
            .gate(self.s_gate)
            .options(self.transfer_options())
            .build()
    }

    /// Engine moving messages from the S-chain out to main net. The
    /// main-net DepositBox, when configured, is watched for its `Error`
    /// event after every submission.
    #[must_use]
    pub fn s_chain_to_main_net(&self) -> TransferEngine {
        TransferEngine::builder()
            .src(self.s_chain.clone())
            .dst(self.main_net.clone())
            .customizer(self.main_customizer)
            .gate(self.main_gate)
            .deposit_box(self.config.main_net.deposit_box)
            .options(self.transfer_options())
            .build()
    }
}

/// Warns when either registry is missing its registration. The agent
/// still starts; transfers towards an unregistered side fail in their
/// dry-run with a precise revert instead.
pub async fn check_registrations(ctx: &AgentContext) {
    if let Some(address) = ctx.config.main_net.lock_and_data {
        let registry = LockAndDataMainNet::new(address);
        match ima_payments::register::is_s_chain_registered(
            &*ctx.main_net.client,
            &registry,
            &ctx.s_chain.chain_name,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                chain = %ctx.s_chain.chain_name,
                "S-chain is not registered on main net"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "cannot check the main-net registration"
            ),
        }
    }
    if let Some(address) = ctx.config.s_chain.lock_and_data {
        let registry = LockAndDataSchain::new(address);
        match ima_payments::register::is_main_net_registered(
            &*ctx.s_chain.client,
            &registry,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                "main net deposit box is not registered on the S-chain"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "cannot check the S-chain registration"
            ),
        }
    }
}

/// Runs one coordinated transfer iteration: PWA check, busy
/// announcement, both directions, idle announcement.
pub async fn run_transfer_iteration(ctx: &AgentContext) {
    if !ctx.pwa.check_on_loop_start() {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Pwa,
            "a peer is busy, skipping this iteration",
        );
        return;
    }
    ctx.pwa.notify_on_loop_start().await;
    if let Err(e) = ctx.main_net_to_s_chain().run().await {
        tracing::error!(error = %e, "main net -> S-chain transfer failed");
    }
    if let Err(e) = ctx.s_chain_to_main_net().run().await {
        tracing::error!(error = %e, "S-chain -> main net transfer failed");
    }
    ctx.pwa.notify_on_loop_end().await;
}

/// The periodic transfer loop. Never returns; individual iteration
/// failures are logged and the loop continues.
pub async fn transfer_loop(ctx: AgentContext) {
    let interval =
        Duration::from_secs(ctx.config.transfer.loop_interval_seconds.max(1));
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        run_transfer_iteration(&ctx).await;
    }
}

#[derive(Debug, Deserialize)]
struct NotifyRequest {
    method: String,
    #[serde(default)]
    params: NotifyParams,
}

#[derive(Debug, Default, Deserialize)]
struct NotifyParams {
    #[serde(rename = "nNodeNumber", default)]
    node_number: usize,
    #[serde(rename = "isStart", default)]
    is_start: bool,
    #[serde(default)]
    ts: u64,
    #[serde(default)]
    signature: Value,
}

async fn handle_notify(
    State(ctx): State<Arc<AgentContext>>,
    Json(request): Json<NotifyRequest>,
) -> Json<Value> {
    if request.method != NOTIFY_METHOD {
        return Json(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "method not found" },
        }));
    }
    let applied = ctx
        .pwa
        .handle_loop_state_arrived(
            request.params.node_number,
            request.params.is_start,
            request.params.ts,
            &request.params.signature,
        )
        .await;
    Json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": { "applied": applied },
    }))
}

/// Serves the inbound JSON-RPC endpoint (PWA loop-state notifications)
/// on the configured port.
pub async fn build_web_services(ctx: AgentContext) -> Result<()> {
    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), ctx.config.port);
    let app = Router::new()
        .route("/", post(handle_notify))
        .with_state(Arc::new(ctx))
        .into_make_service();
    tracing::info!("Starting the server on {}", socket_addr);
    if let Err(e) = axum::Server::bind(&socket_addr).serve(app).await {
        tracing::error!(error = %e, "json-rpc server failed");
        return Err(ima_utils::Error::Generic("json-rpc server failed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ImaAgentConfig {
        let toml = r#"
        [main-net]
        chain-name = "Mainnet"
        http-endpoint = "http://localhost:8545"
        chain-id = 1
        message-proxy = "0x0000000000000000000000000000000000000001"
        deposit-box = "0x0000000000000000000000000000000000000003"
        [main-net.account]
        address = "0x000000000000000000000000000000000000dEaD"
        [main-net.account.credential]
        kind = "direct"
        private-key = "0x0000000000000000000000000000000000000000000000000000000000000001"

        [s-chain]
        chain-name = "Bob"
        http-endpoint = "http://localhost:15000"
        chain-id = 1234567
        message-proxy = "0x0000000000000000000000000000000000000002"
        [s-chain.account]
        address = "0x000000000000000000000000000000000000bEEF"
        [s-chain.account.credential]
        kind = "transaction-manager"
        url = "http://localhost:3008"

        [transfer]
        transactions-per-batch = 3
        "#;
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                toml,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        cfg.try_deserialize().unwrap()
    }

    #[test]
    fn context_builds_from_a_valid_config() {
        let ctx = AgentContext::new(sample_config()).unwrap();
        assert_eq!(ctx.main_net.chain_name, "Mainnet");
        assert_eq!(ctx.s_chain.chain_name, "Bob");
        assert_eq!(ctx.transfer_options().transactions_per_batch, 3);
        // S-chain gas multiplier is absent, the recommendation is kept
        assert_eq!(ctx.s_customizer, TransactionCustomizer::s_chain());
    }

    #[test]
    fn credential_kinds_map_one_to_one() {
        let ctx = AgentContext::new(sample_config()).unwrap();
        assert!(matches!(
            ctx.main_net.account.credential,
            Credential::Direct { .. }
        ));
        assert!(matches!(
            ctx.s_chain.account.credential,
            Credential::TransactionManager { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_notify_method_is_rejected() {
        let ctx = Arc::new(AgentContext::new(sample_config()).unwrap());
        let request = NotifyRequest {
            method: "eth_blockNumber".into(),
            params: NotifyParams::default(),
        };
        let Json(response) = handle_notify(State(ctx), Json(request)).await;
        assert!(response.get("error").is_some());
    }

    #[tokio::test]
    async fn notify_with_disabled_pwa_applies_nothing() {
        let ctx = Arc::new(AgentContext::new(sample_config()).unwrap());
        let request = NotifyRequest {
            method: NOTIFY_METHOD.into(),
            params: NotifyParams {
                node_number: 0,
                is_start: true,
                ts: 1,
                signature: Value::Null,
            },
        };
        let Json(response) = handle_notify(State(ctx), Json(request)).await;
        assert_eq!(
            response.pointer("/result/applied"),
            Some(&Value::Bool(false))
        );
    }
}
