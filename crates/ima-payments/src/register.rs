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

//! One-time registration handshakes: the S-chain in the main-net registry
//! and the main-net deposit box in the S-chain registry. Registration is
//! idempotent; an already-registered side is a no-op.

use std::time::Duration;

use ethers::types::{Address, U256};
use ima_chain::contracts::{LockAndDataMainNet, LockAndDataSchain};
use ima_chain::ChainClient;
use ima_tx::receipts::ReceiptRecord;
use ima_tx::sender::CallSpec;
use ima_utils::retry::ConstantWithMaxRetryCount;
use ima_utils::{probe, Error, Result};

use crate::{PaymentSide, GAS_LIMIT_BRIDGE_OP};

const REGISTRATION_POLL_INTERVAL: Duration = Duration::from_secs(5);
const REGISTRATION_POLL_RETRIES: usize = 60;

/// Whether `schain_name` is registered in the main-net registry.
pub async fn is_s_chain_registered(
    client: &dyn ChainClient,
    lock_and_data: &LockAndDataMainNet,
    schain_name: &str,
) -> Result<bool> {
    lock_and_data.has_schain(client, schain_name).await
}

/// Registers `schain_name` with its token manager on main net. Returns
/// `None` when the chain was already registered.
pub async fn register_s_chain_on_main_net(
    main: &PaymentSide,
    lock_and_data: &LockAndDataMainNet,
    schain_name: &str,
    token_manager: Address,
) -> Result<Option<ReceiptRecord>> {
    if lock_and_data.has_schain(&*main.client, schain_name).await? {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            chain = %schain_name,
            "S-chain already registered",
        );
        return Ok(None);
    }
    let spec = CallSpec::builder()
        .label("addSchain")
        .to(lock_and_data.address)
        .data(lock_and_data.add_schain_calldata(schain_name, token_manager)?)
        .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
        .build();
    let receipt = main.sender().execute(&spec).await?;
    Ok(Some(ReceiptRecord::new("addSchain", &receipt)))
}

/// Whether the main-net deposit box is registered in the S-chain registry.
pub async fn is_main_net_registered(
    client: &dyn ChainClient,
    lock_and_data: &LockAndDataSchain,
) -> Result<bool> {
    lock_and_data.has_deposit_box(client).await
}

/// Registers the main-net deposit box on the S-chain. Returns `None`
/// when it was already registered.
pub async fn register_main_net_on_s_chain(
    schain: &PaymentSide,
    lock_and_data: &LockAndDataSchain,
    deposit_box: Address,
) -> Result<Option<ReceiptRecord>> {
    if lock_and_data.has_deposit_box(&*schain.client).await? {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            "main net already registered",
        );
        return Ok(None);
    }
    let spec = CallSpec::builder()
        .label("addDepositBox")
        .to(lock_and_data.address)
        .data(lock_and_data.add_deposit_box_calldata(deposit_box)?)
        .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
        .build();
    let receipt = schain.sender().execute(&spec).await?;
    Ok(Some(ReceiptRecord::new("addDepositBox", &receipt)))
}

/// Polls the main-net registry until `schain_name` shows up as
/// registered.
pub async fn wait_for_s_chain_registration(
    client: &dyn ChainClient,
    lock_and_data: &LockAndDataMainNet,
    schain_name: &str,
) -> Result<()> {
    let policy = ConstantWithMaxRetryCount::new(
        REGISTRATION_POLL_INTERVAL,
        REGISTRATION_POLL_RETRIES,
    );
    backoff::future::retry(policy, || async {
        let registered = lock_and_data
            .has_schain(client, schain_name)
            .await
            .map_err(backoff::Error::permanent)?;
        if registered {
            Ok(())
        } else {
            Err(backoff::Error::transient(Error::RegistrationIncomplete(
                "S-chain not visible in the main-net registry yet".into(),
            )))
        }
    })
    .await
}

/// Polls the S-chain registry until the main-net deposit box shows up as
/// registered.
pub async fn wait_for_main_net_registration(
    client: &dyn ChainClient,
    lock_and_data: &LockAndDataSchain,
) -> Result<()> {
    let policy = ConstantWithMaxRetryCount::new(
        REGISTRATION_POLL_INTERVAL,
        REGISTRATION_POLL_RETRIES,
    );
    backoff::future::retry(policy, || async {
        let registered = lock_and_data
            .has_deposit_box(client)
            .await
            .map_err(backoff::Error::permanent)?;
        if registered {
            Ok(())
        } else {
            Err(backoff::Error::transient(Error::RegistrationIncomplete(
                "deposit box not visible in the S-chain registry yet".into(),
            )))
        }
    })
    .await
}
