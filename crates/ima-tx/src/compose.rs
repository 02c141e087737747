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

//! Deterministic construction of legacy transactions from resolved
//! parameters. Composition never consults the network; everything the
//! transaction needs has been decided by the caller.

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Chain, TransactionRequest, U256};
use typed_builder::TypedBuilder;

/// Fully resolved inputs of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct TxParams {
    /// Sender address.
    pub from: Address,
    /// Receiver contract.
    pub to: Address,
    /// Calldata.
    #[builder(default)]
    pub data: Bytes,
    /// Attached value in wei.
    #[builder(default)]
    pub value: U256,
    /// Account nonce.
    pub nonce: U256,
    /// Gas limit.
    pub gas_limit: U256,
    /// Gas price in wei.
    pub gas_price: U256,
    /// EIP-155 chain id.
    pub chain_id: u64,
}

/// Well-known public networks get their named signing profile; everything
/// else (S-chains included) signs with the plain numeric chain id.
#[must_use]
pub fn named_signing_profile(chain_id: u64) -> Option<Chain> {
    match chain_id {
        1 => Some(Chain::Mainnet),
        3 => Some(Chain::Ropsten),
        4 => Some(Chain::Rinkeby),
        5 => Some(Chain::Goerli),
        _ => None,
    }
}

/// Builds the legacy transaction for `params`.
///
/// Same params, same transaction; the inputs are copied, never mutated.
#[must_use]
pub fn compose(params: &TxParams) -> TypedTransaction {
    let request = TransactionRequest::new()
        .from(params.from)
        .to(params.to)
        .data(params.data.clone())
        .value(params.value)
        .nonce(params.nonce)
        .gas(params.gas_limit)
        .gas_price(params.gas_price)
        .chain_id(params.chain_id);
    TypedTransaction::Legacy(request)
}
