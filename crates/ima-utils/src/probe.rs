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

//! A module for managing probe events, these events are for other services
//! and tools to monitor the agent state, usually over the logs.
//!
//! Every probe event is emitted as a `tracing` event with the [`TARGET`]
//! target and a `kind` field:
//!
//! ```rust
//! use ima_utils::probe;
//! tracing::event!(
//!     target: probe::TARGET,
//!     tracing::Level::DEBUG,
//!     kind = %probe::Kind::Lifecycle,
//!     started = true,
//! );
//! ```

/// The Probe target to be used in the logs.
pub const TARGET: &str = "ima_probe";

/// The Kind of the Probe event.
#[derive(Debug, Clone, Copy, derive_more::Display)]
pub enum Kind {
    /// When the agent starts or shuts down.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Transfer loop progress: counters, batches, clean exits.
    #[display(fmt = "transfer")]
    Transfer,
    /// Transaction send pipeline events.
    #[display(fmt = "tx_send")]
    TxSend,
    /// Dry-run gate decisions.
    #[display(fmt = "dry_run")]
    DryRun,
    /// Remote signing backend calls (SGX, Transaction Manager).
    #[display(fmt = "signing_backend")]
    SigningBackend,
    /// PWA busy/idle coordination events.
    #[display(fmt = "pwa")]
    Pwa,
    /// Per-run gas usage report.
    #[display(fmt = "gas_report")]
    GasReport,
    /// Retrying a failed operation.
    #[display(fmt = "retry")]
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(Kind::Lifecycle.to_string(), "lifecycle");
        assert_eq!(Kind::GasReport.to_string(), "gas_report");
        assert_eq!(Kind::SigningBackend.to_string(), "signing_backend");
    }
}
