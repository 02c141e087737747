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

//! Per-node loop-work (PWA) coordination.
//!
//! Several agents serve one S-chain, one per node. Before starting a
//! transfer loop an agent walks its peers in a fixed order and yields when
//! one of them reported being busy recently enough. Busy states are spread
//! by signed best-effort JSON-RPC notifications; a forged or failed
//! notification never blocks transfers (the whole protocol fails open) and
//! a peer that stays busy past the timeout is reset locally.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::abi::Token;
use ethers::types::{H256, U256};
use ethers::utils::keccak256;
use ima_utils::{probe, Result};
use parking_lot::RwLock;
use serde_json::Value;
use url::Url;

/// The JSON-RPC method carrying loop-state notifications between peers.
pub const NOTIFY_METHOD: &str = "skale_imaNotifyLoopWork";

/// Walk order over the peers of node `node_number` in a ring of
/// `nodes_count` nodes: the predecessor first, then backwards around the
/// ring, self excluded.
///
/// Empty for single-node rings and out-of-range node numbers.
#[must_use]
pub fn compute_walk_node_indices(
    node_number: usize,
    nodes_count: usize,
) -> Vec<usize> {
    if nodes_count <= 1 || node_number >= nodes_count {
        return Vec::new();
    }
    let mut order = Vec::with_capacity(nodes_count - 1);
    let mut i = (node_number + nodes_count - 1) % nodes_count;
    while i != node_number {
        order.push(i);
        i = (i + nodes_count - 1) % nodes_count;
    }
    order
}

/// Digest peers sign to authenticate a loop-state update.
#[must_use]
pub fn loop_state_hash(node_number: usize, is_start: bool, ts: u64) -> H256 {
    let encoded = ethers::abi::encode(&[
        Token::Uint(U256::from(node_number)),
        Token::Bool(is_start),
        Token::Uint(U256::from(ts)),
    ]);
    H256(keccak256(encoded))
}

/// Signs and verifies loop-state digests.
///
/// The BLS glue of the deployment lives behind this seam; the signature
/// blob is opaque to the coordinator.
#[async_trait::async_trait]
pub trait LoopStateSigner: Send + Sync {
    /// Signs the digest on behalf of this node.
    async fn sign(&self, hash: H256) -> Result<Value>;
    /// Verifies a digest signature claimed by `node_number`.
    async fn verify(
        &self,
        hash: H256,
        node_number: usize,
        signature: &Value,
    ) -> Result<bool>;
}

/// Signer for deployments without signing glue: emits null signatures and
/// accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLoopSigner;

#[async_trait::async_trait]
impl LoopStateSigner for NullLoopSigner {
    async fn sign(&self, _hash: H256) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn verify(
        &self,
        _hash: H256,
        _node_number: usize,
        _signature: &Value,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Static settings of the coordinator.
#[derive(Debug, Clone)]
pub struct PwaSettings {
    /// Whether coordination is active at all.
    pub enabled: bool,
    /// Our index in the ring.
    pub node_number: usize,
    /// Ring size.
    pub nodes_count: usize,
    /// Seconds after which a reported busy state is considered stale.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeState {
    ts: u64,
    in_progress: bool,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Tracks the busy/idle state of every node of the ring and talks to the
/// peers.
pub struct PwaCoordinator {
    settings: PwaSettings,
    peers: Vec<Option<Url>>,
    signer: Arc<dyn LoopStateSigner>,
    states: RwLock<Vec<NodeState>>,
    http: reqwest::Client,
}

impl std::fmt::Debug for PwaCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PwaCoordinator")
            .field("settings", &self.settings)
            .field("peers", &self.peers)
            .finish_non_exhaustive()
    }
}

impl PwaCoordinator {
    /// Creates a coordinator. `peers` maps node numbers to their agent
    /// JSON-RPC endpoints; missing entries are never notified.
    #[must_use]
    pub fn new(
        settings: PwaSettings,
        peers: Vec<Option<Url>>,
        signer: Arc<dyn LoopStateSigner>,
    ) -> Self {
        let states = RwLock::new(vec![
            NodeState::default();
            settings.nodes_count.max(1)
        ]);
        Self {
            settings,
            peers,
            signer,
            states,
            http: reqwest::Client::new(),
        }
    }

    /// Settings this coordinator runs with.
    #[must_use]
    pub fn settings(&self) -> &PwaSettings {
        &self.settings
    }

    /// Busy/idle state recorded for `node_number`, for inspection.
    #[must_use]
    pub fn node_state(&self, node_number: usize) -> Option<(u64, bool)> {
        self.states
            .read()
            .get(node_number)
            .map(|s| (s.ts, s.in_progress))
    }

    /// Whether this node may start a transfer loop now.
    #[must_use]
    pub fn check_on_loop_start(&self) -> bool {
        self.check_at(unix_now())
    }

    /// [`Self::check_on_loop_start`] with an explicit clock.
    #[must_use]
    pub fn check_at(&self, now: u64) -> bool {
        if !self.settings.enabled {
            return true;
        }
        let order = compute_walk_node_indices(
            self.settings.node_number,
            self.settings.nodes_count,
        );
        if order.is_empty() {
            return true;
        }
        let mut states = self.states.write();
        for peer in order {
            let Some(state) = states.get_mut(peer) else {
                continue;
            };
            if !(state.in_progress && state.ts != 0 && now >= state.ts) {
                continue;
            }
            let age = now - state.ts;
            if age >= self.settings.timeout_seconds {
                // stale busy state, heal it locally and keep walking
                tracing::warn!(
                    peer,
                    age,
                    timeout = self.settings.timeout_seconds,
                    "peer busy state is stale, resetting to idle"
                );
                state.in_progress = false;
                state.ts = 0;
                continue;
            }
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Pwa,
                peer,
                age,
                "peer is busy, yielding",
            );
            return false;
        }
        true
    }

    /// Applies a loop-state update claimed by `node_number`, after
    /// verifying its signature. Returns whether the update was applied.
    pub async fn handle_loop_state_arrived(
        &self,
        node_number: usize,
        is_start: bool,
        ts: u64,
        signature: &Value,
    ) -> bool {
        if !self.settings.enabled {
            return false;
        }
        if node_number >= self.settings.nodes_count {
            tracing::warn!(
                node_number,
                nodes_count = self.settings.nodes_count,
                "loop-state update from out-of-range node, dropped"
            );
            return false;
        }
        let hash = loop_state_hash(node_number, is_start, ts);
        match self.signer.verify(hash, node_number, signature).await {
            Ok(true) => {
                let mut states = self.states.write();
                if let Some(state) = states.get_mut(node_number) {
                    state.ts = ts;
                    state.in_progress = is_start;
                }
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Pwa,
                    node_number,
                    is_start,
                    ts,
                    "loop-state update applied",
                );
                true
            }
            Ok(false) => {
                tracing::warn!(
                    node_number,
                    "loop-state update carries a bad signature, dropped"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    node_number,
                    error = %e,
                    "loop-state signature verification failed, dropped"
                );
                false
            }
        }
    }

    /// Announces that this node starts a transfer loop.
    pub async fn notify_on_loop_start(&self) {
        self.notify(true).await;
    }

    /// Announces that this node finished its transfer loop.
    pub async fn notify_on_loop_end(&self) {
        self.notify(false).await;
    }

    // Best effort on every step: a failed signature skips the broadcast, a
    // failed peer call is logged and the walk continues.
    async fn notify(&self, is_start: bool) {
        if !self.settings.enabled || self.settings.nodes_count <= 1 {
            return;
        }
        let ts = unix_now();
        let hash =
            loop_state_hash(self.settings.node_number, is_start, ts);
        let signature = match self.signer.sign(hash).await {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!(error = %e, "cannot sign loop-state update");
                return;
            }
        };
        // own table first, peers after
        self.handle_loop_state_arrived(
            self.settings.node_number,
            is_start,
            ts,
            &signature,
        )
        .await;
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": NOTIFY_METHOD,
            "params": {
                "nNodeNumber": self.settings.node_number,
                "isStart": is_start,
                "ts": ts,
                "signature": signature,
            },
        });
        for (peer, url) in self.peers.iter().enumerate() {
            if peer == self.settings.node_number {
                continue;
            }
            let Some(url) = url else { continue };
            let outcome = self
                .http
                .post(url.clone())
                .json(&request)
                .send()
                .await;
            if let Err(e) = outcome {
                tracing::warn!(peer, error = %e, "loop-state notify failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts only signatures of the form {"node": n} matching the
    /// claimed node number.
    struct KeyedSigner;

    #[async_trait::async_trait]
    impl LoopStateSigner for KeyedSigner {
        async fn sign(&self, _hash: H256) -> Result<Value> {
            Ok(serde_json::json!({ "node": 0 }))
        }

        async fn verify(
            &self,
            _hash: H256,
            node_number: usize,
            signature: &Value,
        ) -> Result<bool> {
            Ok(signature.get("node").and_then(Value::as_u64)
                == Some(node_number as u64))
        }
    }

    fn coordinator(
        enabled: bool,
        node_number: usize,
        nodes_count: usize,
        timeout_seconds: u64,
    ) -> PwaCoordinator {
        PwaCoordinator::new(
            PwaSettings {
                enabled,
                node_number,
                nodes_count,
                timeout_seconds,
            },
            vec![None; nodes_count],
            Arc::new(KeyedSigner),
        )
    }

    #[test]
    fn walk_order_is_predecessor_first() {
        assert_eq!(compute_walk_node_indices(2, 5), vec![1, 0, 4, 3]);
        assert_eq!(compute_walk_node_indices(0, 3), vec![2, 1]);
        assert_eq!(compute_walk_node_indices(0, 1), Vec::<usize>::new());
        assert_eq!(compute_walk_node_indices(0, 0), Vec::<usize>::new());
        assert_eq!(compute_walk_node_indices(7, 5), Vec::<usize>::new());
    }

    #[tokio::test]
    async fn busy_peer_blocks_the_loop() {
        let pwa = coordinator(true, 2, 5, 60);
        let applied = pwa
            .handle_loop_state_arrived(
                1,
                true,
                100,
                &serde_json::json!({ "node": 1 }),
            )
            .await;
        assert!(applied);
        assert!(!pwa.check_at(130));
    }

    #[tokio::test]
    async fn stale_busy_state_self_heals() {
        let pwa = coordinator(true, 2, 5, 60);
        pwa.handle_loop_state_arrived(
            1,
            true,
            100,
            &serde_json::json!({ "node": 1 }),
        )
        .await;
        // past the timeout: the peer no longer blocks and is reset
        assert!(pwa.check_at(200));
        assert_eq!(pwa.node_state(1), Some((0, false)));
        assert!(pwa.check_at(201));
    }

    #[tokio::test]
    async fn forged_updates_are_dropped() {
        let pwa = coordinator(true, 2, 5, 60);
        let applied = pwa
            .handle_loop_state_arrived(
                1,
                true,
                100,
                &serde_json::json!({ "node": 3 }),
            )
            .await;
        assert!(!applied);
        assert_eq!(pwa.node_state(1), Some((0, false)));
        assert!(pwa.check_at(130));
    }

    #[tokio::test]
    async fn out_of_range_updates_are_dropped() {
        let pwa = coordinator(true, 2, 5, 60);
        let applied = pwa
            .handle_loop_state_arrived(
                17,
                true,
                100,
                &serde_json::json!({ "node": 17 }),
            )
            .await;
        assert!(!applied);
    }

    #[test]
    fn disabled_or_single_node_always_permits() {
        assert!(coordinator(false, 2, 5, 60).check_at(0));
        assert!(coordinator(true, 0, 1, 60).check_at(0));
    }

    #[tokio::test]
    async fn loop_end_clears_the_busy_state() {
        let pwa = coordinator(true, 2, 5, 60);
        pwa.handle_loop_state_arrived(
            1,
            true,
            100,
            &serde_json::json!({ "node": 1 }),
        )
        .await;
        assert!(!pwa.check_at(110));
        pwa.handle_loop_state_arrived(
            1,
            false,
            120,
            &serde_json::json!({ "node": 1 }),
        )
        .await;
        assert!(pwa.check_at(125));
    }

    #[test]
    fn digest_binds_all_fields() {
        let base = loop_state_hash(1, true, 100);
        assert_eq!(base, loop_state_hash(1, true, 100));
        assert_ne!(base, loop_state_hash(2, true, 100));
        assert_ne!(base, loop_state_hash(1, false, 100));
        assert_ne!(base, loop_state_hash(1, true, 101));
    }
}
