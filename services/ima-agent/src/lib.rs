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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # IMA Agent Crate
//!
//! The agent relays messages between an Ethereum main net and a SKALE
//! S-chain through the IMA `MessageProxy` contracts. It periodically
//! scans each side for queued `OutgoingMessage` events, batches them,
//! collects a BLS signature over every batch and submits it to the other
//! side's `postIncomingMessages`. Progress lives exclusively in on-chain
//! counters, so the agent keeps no local database and restarts are
//! harmless.
//!
//! When several agents serve one S-chain (one per node) they coordinate
//! through the PWA loop-work protocol: before starting a transfer loop an
//! agent asks its ring whether a peer is busy, and it announces its own
//! busy/idle transitions over a small JSON-RPC endpoint.

/// The long-running agent service: context, transfer loop, JSON-RPC
/// endpoint.
pub mod service;

pub use ima_utils::{Error, Result};
