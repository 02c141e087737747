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

//! Common utilities shared by every IMA agent crate: the unified error
//! type, structured probe events and bounded retry policies.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ethers::types::H256;

/// Structured logging probes.
pub mod probe;
/// Bounded retry policies.
pub mod retry;

/// An enum of all possible errors the agent could encounter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Error while parsing an URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error from the chain node RPC provider.
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Error from the local wallet while signing.
    #[error(transparent)]
    EthersWallet(#[from] ethers::signers::WalletError),
    /// Contract ABI encoding/decoding error.
    #[error(transparent)]
    Abi(#[from] ethers::abi::Error),
    /// HTTP client error (SGX, Transaction Manager or PWA peers).
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error while decoding hexadecimal values.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Dry-run of a transaction reverted before submission.
    #[error("dry-run of {label} reverted: {reason}")]
    DryRunFailed {
        /// A short label for the attempted contract call.
        label: String,
        /// The revert reason reported by the node.
        reason: String,
    },
    /// Transaction submission failed twice.
    #[error(
        "transaction submission failed after retry: first attempt: {first}, \
         second attempt: {second}"
    )]
    TxSubmissionFailed {
        /// Failure reported by the first send attempt.
        first: String,
        /// Failure reported by the retried send attempt.
        second: String,
    },
    /// A transaction was broadcast but its receipt never appeared.
    #[error("no receipt for transaction {tx_hash} after {attempts} polls")]
    ReceiptTimeout {
        /// Hash of the transaction we were waiting for.
        tx_hash: H256,
        /// Number of receipt polls performed before giving up.
        attempts: usize,
    },
    /// An event that must accompany a transaction was not emitted.
    #[error("expected event {event} not found in mined block for tx {tx_hash}")]
    EventNotFound {
        /// Name of the event we were looking for.
        event: String,
        /// Hash of the transaction that should have emitted it.
        tx_hash: H256,
    },
    /// An event that must never accompany a transaction was emitted.
    #[error("forbidden event {event} emitted by tx {tx_hash}")]
    ForbiddenEventSeen {
        /// Name of the event that must stay absent.
        event: String,
        /// Hash of the offending transaction.
        tx_hash: H256,
    },
    /// No `OutgoingMessage` log exists for a counter inside the work range.
    #[error("no OutgoingMessage log found for message counter {counter}")]
    MissingOutgoingMessage {
        /// The message counter without a matching log.
        counter: u64,
    },
    /// A remote signing backend (SGX wallet or Transaction Manager) failed.
    #[error("signing backend error: {0}")]
    SigningBackend(String),
    /// The injected BLS message-signing seam failed; the run is aborted.
    #[error("message signing failed: {0}")]
    MessageSigning(String),
    /// Account credentials are unusable for the requested operation.
    #[error("bad account credentials: {0}")]
    BadAccountCredentials(String),
    /// A chain registration precondition does not hold yet.
    #[error("chain registration incomplete: {0}")]
    RegistrationIncomplete(String),
    /// Generic error.
    #[error("{0}")]
    Generic(&'static str),
}

/// A type alias for the result for all the errors.
pub type Result<T> = std::result::Result<T, Error>;
