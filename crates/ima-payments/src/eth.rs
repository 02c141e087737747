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

//! ETH movements across the bridge.

use ethers::types::{Address, U256};
use ima_chain::contracts::{
    self, DepositBox, LockAndDataMainNet, MessageProxy, TokenManager,
};
use ima_chain::ChainClient;
use ima_tx::receipts::ReceiptRecord;
use ima_tx::sender::CallSpec;
use ima_tx::verify;
use ima_utils::Result;

use crate::{PaymentSide, SchainPacing, GAS_LIMIT_BRIDGE_OP};

/// Locks `amount_wei` in the main-net deposit box for `to` on the
/// S-chain.
///
/// A sound deposit queues an `OutgoingMessage`, lands `ETHReceived` on the
/// deposit box and never trips its `Error` refund path; all three are
/// checked against the mined block.
pub async fn deposit_eth_to_s_chain(
    main: &PaymentSide,
    deposit_box: &DepositBox,
    main_proxy: &MessageProxy,
    schain_name: &str,
    to: Address,
    amount_wei: U256,
) -> Result<ReceiptRecord> {
    let data = deposit_box.deposit_calldata(schain_name, to)?;
    let spec = CallSpec::builder()
        .label("deposit")
        .to(deposit_box.address)
        .data(data)
        .value(amount_wei)
        .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
        .build();
    let receipt = main.sender().execute(&spec).await?;
    verify::require_event(
        &*main.client,
        main_proxy.address,
        contracts::outgoing_message_event(),
        &receipt,
    )
    .await?;
    verify::require_event(
        &*main.client,
        deposit_box.address,
        contracts::eth_received_event(),
        &receipt,
    )
    .await?;
    verify::forbid_event(
        &*main.client,
        deposit_box.address,
        contracts::error_event(),
        &receipt,
    )
    .await?;
    Ok(ReceiptRecord::new("deposit ETH to S-chain", &receipt))
}

/// Burns S-chain ETH and queues the exit message towards main net.
///
/// When `add_eth_cost_wei` is set, the exit gas cost deposit is topped up
/// first, with pacing in between.
pub async fn exit_eth_to_main_net(
    schain: &PaymentSide,
    token_manager: &TokenManager,
    schain_proxy: &MessageProxy,
    to: Address,
    amount_wei: U256,
    add_eth_cost_wei: Option<U256>,
    pacing: &SchainPacing,
) -> Result<Vec<ReceiptRecord>> {
    let mut records = Vec::new();
    if let Some(cost) = add_eth_cost_wei {
        let spec = CallSpec::builder()
            .label("addEthCost")
            .to(token_manager.address)
            .data(token_manager.add_eth_cost_calldata(cost)?)
            .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
            .build();
        let receipt = schain.sender().execute(&spec).await?;
        records.push(ReceiptRecord::new("addEthCost", &receipt));
        pacing.pace(&*schain.client).await?;
    }
    let spec = CallSpec::builder()
        .label("exitToMain")
        .to(token_manager.address)
        .data(token_manager.exit_to_main_calldata(to, amount_wei)?)
        .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
        .build();
    let receipt = schain.sender().execute(&spec).await?;
    verify::require_event(
        &*schain.client,
        schain_proxy.address,
        contracts::outgoing_message_event(),
        &receipt,
    )
    .await?;
    records.push(ReceiptRecord::new("exitToMain", &receipt));
    Ok(records)
}

/// Withdraws the caller's approved exited ETH on main net.
pub async fn receive_eth_on_main_net(
    main: &PaymentSide,
    lock_and_data: &LockAndDataMainNet,
) -> Result<ReceiptRecord> {
    let spec = CallSpec::builder()
        .label("getMyEth")
        .to(lock_and_data.address)
        .data(lock_and_data.get_my_eth_calldata()?)
        .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
        .build();
    let receipt = main.sender().execute(&spec).await?;
    Ok(ReceiptRecord::new("getMyEth", &receipt))
}

/// ETH already exited and waiting for withdrawal by `owner`, in wei.
pub async fn view_pending_eth_on_main_net(
    client: &dyn ChainClient,
    lock_and_data: &LockAndDataMainNet,
    owner: Address,
) -> Result<U256> {
    lock_and_data.approved_transfers(client, owner).await
}
