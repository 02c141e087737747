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

//! ERC721 movements across the bridge. Deposits carry a fixed processing
//! value; the exit hands the token to the token manager with a
//! `transferFrom` before burning it out.

use ethers::types::{Address, U256};
use ima_chain::contracts::{
    self, DepositBox, Erc721Token, MessageProxy, TokenManager,
};
use ima_tx::receipts::ReceiptRecord;
use ima_tx::sender::CallSpec;
use ima_tx::verify;
use ima_utils::Result;

use crate::{
    PaymentSide, SchainPacing, TokenPairing, ERC721_DEPOSIT_PROCESSING_WEI,
    GAS_LIMIT_BRIDGE_OP, GAS_LIMIT_TOKEN_OP,
};

/// Approves the deposit box for `token_id` and deposits it towards
/// `schain_name`.
pub async fn deposit_erc721_to_s_chain(
    main: &PaymentSide,
    deposit_box: &DepositBox,
    main_proxy: &MessageProxy,
    pairing: &TokenPairing,
    schain_name: &str,
    to: Address,
    token_id: U256,
) -> Result<Vec<ReceiptRecord>> {
    let token = Erc721Token::new(pairing.token);
    let nonce = main.client.transaction_count(main.account.address).await?;
    let approve = CallSpec::builder()
        .label("approve")
        .to(token.address)
        .data(token.approve_calldata(deposit_box.address, token_id)?)
        .gas_limit(U256::from(GAS_LIMIT_TOKEN_OP))
        .nonce_override(Some(nonce))
        .build();
    let approve_receipt = main.sender().execute(&approve).await?;
    let deposit_data = match pairing.paired_token {
        Some(schain_token) => deposit_box.raw_deposit_erc721_calldata(
            schain_name,
            token.address,
            schain_token,
            to,
            token_id,
        )?,
        None => deposit_box.deposit_erc721_calldata(
            schain_name,
            token.address,
            to,
            token_id,
        )?,
    };
    let deposit = CallSpec::builder()
        .label("depositERC721")
        .to(deposit_box.address)
        .data(deposit_data)
        .value(U256::from(ERC721_DEPOSIT_PROCESSING_WEI))
        .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
        .nonce_override(Some(nonce + U256::one()))
        .build();
    let deposit_receipt = main.sender().execute(&deposit).await?;
    verify::require_event(
        &*main.client,
        main_proxy.address,
        contracts::outgoing_message_event(),
        &deposit_receipt,
    )
    .await?;
    verify::forbid_event(
        &*main.client,
        deposit_box.address,
        contracts::error_event(),
        &deposit_receipt,
    )
    .await?;
    Ok(vec![
        ReceiptRecord::new("approve ERC721", &approve_receipt),
        ReceiptRecord::new("deposit ERC721 to S-chain", &deposit_receipt),
    ])
}

/// Hands `token_id` to the token manager and exits it back to main net,
/// topping up the exit gas cost deposit if asked to.
pub async fn exit_erc721_to_main_net(
    schain: &PaymentSide,
    token_manager: &TokenManager,
    schain_proxy: &MessageProxy,
    pairing: &TokenPairing,
    to: Address,
    token_id: U256,
    add_eth_cost_wei: Option<U256>,
    pacing: &SchainPacing,
) -> Result<Vec<ReceiptRecord>> {
    let token = Erc721Token::new(pairing.token);
    let mut records = Vec::new();
    let hand_over = CallSpec::builder()
        .label("transferFrom")
        .to(token.address)
        .data(token.transfer_from_calldata(
            schain.account.address,
            token_manager.address,
            token_id,
        )?)
        .gas_limit(U256::from(GAS_LIMIT_TOKEN_OP))
        .build();
    let receipt = schain.sender().execute(&hand_over).await?;
    records.push(ReceiptRecord::new("transferFrom ERC721", &receipt));
    pacing.pace(&*schain.client).await?;
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
    let exit_data = match pairing.paired_token {
        Some(main_net_token) => token_manager.raw_exit_to_main_erc721_calldata(
            token.address,
            main_net_token,
            to,
            token_id,
        )?,
        None => token_manager.exit_to_main_erc721_calldata(
            token.address,
            to,
            token_id,
        )?,
    };
    let exit = CallSpec::builder()
        .label("exitToMainERC721")
        .to(token_manager.address)
        .data(exit_data)
        .gas_limit(U256::from(GAS_LIMIT_BRIDGE_OP))
        .build();
    let receipt = schain.sender().execute(&exit).await?;
    verify::require_event(
        &*schain.client,
        schain_proxy.address,
        contracts::outgoing_message_event(),
        &receipt,
    )
    .await?;
    records.push(ReceiptRecord::new("exit ERC721 to main net", &receipt));
    Ok(records)
}
