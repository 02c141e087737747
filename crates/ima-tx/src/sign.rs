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

//! Account credentials and transaction signing backends.
//!
//! Three ways to turn a composed transaction into something the chain will
//! accept: a local private key, a remote SGX wallet signing the transaction
//! hash, or a Transaction Manager that signs *and broadcasts* on our
//! behalf. The credential kind is an explicit enum; there is no guessing
//! from which config fields happen to be present.

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ima_utils::{probe, Error, Result};
use serde_json::Value;
use url::Url;

/// How an [`Account`] signs.
#[derive(Clone)]
pub enum Credential {
    /// A local private key.
    Direct {
        /// The wallet holding the key.
        wallet: LocalWallet,
    },
    /// A remote SGX wallet holding the ECDSA key.
    Sgx {
        /// JSON-RPC endpoint of the SGX wallet.
        url: Url,
        /// Name of the key inside the enclave.
        key_name: String,
        /// Optional TLS client certificate for the wallet connection.
        identity: Option<reqwest::Identity>,
    },
    /// A Transaction Manager that signs and broadcasts.
    TransactionManager {
        /// JSON-RPC endpoint of the Transaction Manager.
        url: Url,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { .. } => f.write_str("Credential::Direct"),
            Self::Sgx { url, key_name, .. } => f
                .debug_struct("Credential::Sgx")
                .field("url", url)
                .field("key_name", key_name)
                .finish_non_exhaustive(),
            Self::TransactionManager { url } => f
                .debug_struct("Credential::TransactionManager")
                .field("url", url)
                .finish(),
        }
    }
}

/// A chain account together with its signing credential.
#[derive(Debug, Clone)]
pub struct Account {
    /// The account address.
    pub address: Address,
    /// How transactions of this account get signed.
    pub credential: Credential,
}

/// What signing produced.
#[derive(Debug, Clone)]
pub enum SignOutcome {
    /// Raw signed bytes, ready for `eth_sendRawTransaction`.
    Signed(Bytes),
    /// The backend already broadcast the transaction; only the hash is
    /// known.
    Sent(H256),
}

/// EIP-155 recovery value.
fn eip155_v(recovery_id: u64, chain_id: u64) -> u64 {
    recovery_id + chain_id * 2 + 35
}

fn chain_id_of(tx: &TypedTransaction) -> Result<u64> {
    tx.chain_id()
        .map(|v| v.as_u64())
        .ok_or(Error::Generic("transaction carries no chain id"))
}

/// Signs `tx` with the account's credential.
pub async fn sign_transaction(
    account: &Account,
    tx: &TypedTransaction,
) -> Result<SignOutcome> {
    match &account.credential {
        Credential::Direct { wallet } => {
            let chain_id = chain_id_of(tx)?;
            let wallet = wallet.clone().with_chain_id(chain_id);
            let signature = wallet.sign_transaction_sync(tx)?;
            Ok(SignOutcome::Signed(tx.rlp_signed(&signature)))
        }
        Credential::Sgx {
            url,
            key_name,
            identity,
        } => sign_with_sgx(url, key_name, identity.as_ref(), tx).await,
        Credential::TransactionManager { url } => {
            send_through_transaction_manager(url, tx).await
        }
    }
}

fn backend_http_client(
    identity: Option<&reqwest::Identity>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(identity) = identity {
        // SGX wallets present self-signed server certificates
        builder = builder
            .identity(identity.clone())
            .danger_accept_invalid_certs(true);
    }
    Ok(builder.build()?)
}

fn json_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn json_u256_hex(value: &Value) -> Option<U256> {
    let s = value.as_str()?;
    U256::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

async fn sign_with_sgx(
    url: &Url,
    key_name: &str,
    identity: Option<&reqwest::Identity>,
    tx: &TypedTransaction,
) -> Result<SignOutcome> {
    let chain_id = chain_id_of(tx)?;
    let sighash = tx.sighash();
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "ecdsaSignMessageHash",
        "params": {
            "keyName": key_name,
            "messageHash": hex::encode(sighash.as_bytes()),
            "base": 16,
        },
    });
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::SigningBackend,
        backend = "sgx",
        %key_name,
    );
    let client = backend_http_client(identity)?;
    let response: Value = client
        .post(url.clone())
        .json(&request)
        .send()
        .await?
        .json()
        .await?;
    let result = response
        .get("result")
        .ok_or_else(|| sgx_error("response carries no result"))?;
    let recovery_id = result
        .get("signature_v")
        .and_then(json_u64)
        .ok_or_else(|| sgx_error("missing or malformed signature_v"))?;
    let r = result
        .get("signature_r")
        .and_then(json_u256_hex)
        .ok_or_else(|| sgx_error("missing or malformed signature_r"))?;
    let s = result
        .get("signature_s")
        .and_then(json_u256_hex)
        .ok_or_else(|| sgx_error("missing or malformed signature_s"))?;
    let signature = Signature {
        r,
        s,
        v: eip155_v(recovery_id, chain_id),
    };
    Ok(SignOutcome::Signed(tx.rlp_signed(&signature)))
}

fn sgx_error(detail: &str) -> Error {
    Error::SigningBackend(format!("SGX wallet: {detail}"))
}

async fn send_through_transaction_manager(
    url: &Url,
    tx: &TypedTransaction,
) -> Result<SignOutcome> {
    let TypedTransaction::Legacy(request) = tx else {
        return Err(Error::BadAccountCredentials(
            "transaction manager signs legacy transactions only".into(),
        ));
    };
    // the manager rejects a chainId field and expects `gas`
    let mut dict = serde_json::to_value(request)?;
    if let Some(fields) = dict.as_object_mut() {
        fields.remove("chainId");
    }
    let payload = serde_json::json!({
        "transaction_dict": dict.to_string(),
    });
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::SigningBackend,
        backend = "transaction-manager",
    );
    let client = backend_http_client(None)?;
    let response: Value = client
        .post(url.clone())
        .json(&payload)
        .send()
        .await?
        .json()
        .await?;
    let hash = response
        .pointer("/data/transaction_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::SigningBackend(
                "transaction manager returned no transaction_hash".into(),
            )
        })?;
    let hash: H256 = hash.parse().map_err(|_| {
        Error::SigningBackend(
            "transaction manager returned a malformed transaction_hash".into(),
        )
    })?;
    Ok(SignOutcome::Sent(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{compose, TxParams};
    use ethers::core::utils::rlp::Rlp;

    fn sample_tx(chain_id: u64) -> TypedTransaction {
        compose(
            &TxParams::builder()
                .from(Address::repeat_byte(1))
                .to(Address::repeat_byte(2))
                .nonce(U256::zero())
                .gas_limit(U256::from(21_000u64))
                .gas_price(U256::from(1_000_000_000u64))
                .chain_id(chain_id)
                .build(),
        )
    }

    #[test]
    fn eip155_recovery_values() {
        assert_eq!(eip155_v(0, 1), 37);
        assert_eq!(eip155_v(1, 1), 38);
        assert_eq!(eip155_v(0, 4), 43);
        assert_eq!(eip155_v(1, 1_234_567), 2_469_170);
    }

    #[tokio::test]
    async fn direct_signing_yields_decodable_raw_bytes() {
        let wallet: LocalWallet =
            "0x0000000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap();
        let account = Account {
            address: wallet.address(),
            credential: Credential::Direct { wallet },
        };
        let tx = sample_tx(5);
        let outcome = sign_transaction(&account, &tx).await.unwrap();
        let SignOutcome::Signed(raw) = outcome else {
            panic!("direct signing must yield raw bytes");
        };
        // a signed legacy transaction is a 9-item rlp list
        let rlp = Rlp::new(raw.as_ref());
        assert_eq!(rlp.item_count().unwrap(), 9);
    }

    #[test]
    fn transaction_manager_payload_drops_chain_id() {
        let tx = sample_tx(5);
        let TypedTransaction::Legacy(request) = &tx else {
            unreachable!()
        };
        let mut dict = serde_json::to_value(request).unwrap();
        dict.as_object_mut().unwrap().remove("chainId");
        let text = dict.to_string();
        assert!(!text.contains("chainId"));
        assert!(text.contains("\"gas\""));
    }
}
