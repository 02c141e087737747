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

//! ERC20 movements across the bridge. Every flow is approve-then-act;
//! the deposit queues both transactions back to back with explicit
//! nonces, the exit paces between sends instead.

use ethers::types::{Address, U256};
use ima_chain::contracts::{
    self, DepositBox, Erc20Token, MessageProxy, TokenManager,
};
use ima_tx::receipts::ReceiptRecord;
use ima_tx::sender::CallSpec;
use ima_tx::verify;
use ima_utils::Result;

use crate::{
    PaymentSide, SchainPacing, TokenPairing, GAS_LIMIT_BRIDGE_OP,
    GAS_LIMIT_TOKEN_OP,
};

/// Approves the deposit box and deposits `amount` of the token towards
/// `schain_name`.
pub async fn deposit_erc20_to_s_chain(
    main: &PaymentSide,
    deposit_box: &DepositBox,
    main_proxy: &MessageProxy,
    pairing: &TokenPairing,
    schain_name: &str,
    to: Address,
    amount: U256,
) -> Result<Vec<ReceiptRecord>> {
    let token = Erc20Token::new(pairing.token);
    let nonce = main.client.transaction_count(main.account.address).await?;
    let approve = CallSpec::builder()
        .label("approve")
        .to(token.address)
        .data(token.approve_calldata(deposit_box.address, amount)?)
        .gas_limit(U256::from(GAS_LIMIT_TOKEN_OP))
        .nonce_override(Some(nonce))
        .build();
    let approve_receipt = main.sender().execute(&approve).await?;
    let deposit_data = match pairing.paired_token {
        Some(schain_token) => deposit_box.raw_deposit_erc20_calldata(
            schain_name,
            token.address,
            schain_token,
            to,
            amount,
        )?,
        None => deposit_box.deposit_erc20_calldata(
            schain_name,
            token.address,
            to,
            amount,
        )?,
    };
    let deposit = CallSpec::builder()
        .label("depositERC20")
        .to(deposit_box.address)
        .data(deposit_data)
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
        ReceiptRecord::new("approve ERC20", &approve_receipt),
        ReceiptRecord::new("deposit ERC20 to S-chain", &deposit_receipt),
    ])
}

/// Approves the token manager and exits `amount` of the token back to
/// main net, topping up the exit gas cost deposit if asked to.
pub async fn exit_erc20_to_main_net(
    schain: &PaymentSide,
    token_manager: &TokenManager,
    schain_proxy: &MessageProxy,
    pairing: &TokenPairing,
    to: Address,
    amount: U256,
    add_eth_cost_wei: Option<U256>,
    pacing: &SchainPacing,
) -> Result<Vec<ReceiptRecord>> {
    let token = Erc20Token::new(pairing.token);
    let mut records = Vec::new();
    let approve = CallSpec::builder()
        .label("approve")
        .to(token.address)
        .data(token.approve_calldata(token_manager.address, amount)?)
        .gas_limit(U256::from(GAS_LIMIT_TOKEN_OP))
        .build();
    let receipt = schain.sender().execute(&approve).await?;
    records.push(ReceiptRecord::new("approve ERC20", &receipt));
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
        Some(main_net_token) => token_manager.raw_exit_to_main_erc20_calldata(
            token.address,
            main_net_token,
            to,
            amount,
        )?,
        None => token_manager.exit_to_main_erc20_calldata(
            token.address,
            to,
            amount,
        )?,
    };
    let exit = CallSpec::builder()
        .label("exitToMainERC20")
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
    records.push(ReceiptRecord::new("exit ERC20 to main net", &receipt));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Bytes, Log};
    use ima_chain::contracts::functions;
    use ima_chain::mock::MockClient;
    use ima_tx::customize::TransactionCustomizer;
    use ima_tx::dry_run::DryRunGate;
    use ima_tx::sign::{Account, Credential};
    use std::sync::Arc;

    fn side(client: Arc<MockClient>) -> PaymentSide {
        let wallet: ethers::signers::LocalWallet =
            "0x0000000000000000000000000000000000000000000000000000000000000005"
                .parse()
                .unwrap();
        use ethers::signers::Signer;
        PaymentSide {
            client,
            account: Account {
                address: wallet.address(),
                credential: Credential::Direct { wallet },
            },
            chain_id: 1,
            customizer: TransactionCustomizer::main_net(),
            gate: DryRunGate::default(),
        }
    }

    fn outgoing_log(proxy: &MessageProxy) -> Log {
        Log {
            address: proxy.address,
            topics: vec![contracts::outgoing_message_event().signature()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn deposit_queues_approve_and_deposit_with_consecutive_nonces() {
        let client = Arc::new(MockClient::new());
        client.set_nonce(11);
        client.set_gas_price(1_000_000_000);
        client.stub_call(functions::approve(), Bytes::default());
        client.stub_call(functions::deposit_erc20(), Bytes::default());
        let deposit_box = DepositBox::new(Address::repeat_byte(1));
        let proxy = MessageProxy::new(Address::repeat_byte(2));
        client.emit_logs_on_next_send(Vec::new());
        client.emit_logs_on_next_send(vec![outgoing_log(&proxy)]);
        let pairing = TokenPairing {
            token: Address::repeat_byte(8),
            paired_token: None,
        };
        let records = deposit_erc20_to_s_chain(
            &side(client.clone()),
            &deposit_box,
            &proxy,
            &pairing,
            "Bob",
            Address::repeat_byte(7),
            U256::from(1000u64),
        )
        .await
        .unwrap();
        assert_eq!(records.len(), 2);
        let sent = client.sent();
        assert_eq!(sent.len(), 2);
        // nonce sits in the second RLP item of a legacy transaction
        let first = ethers::core::utils::rlp::Rlp::new(sent[0].as_ref());
        let second = ethers::core::utils::rlp::Rlp::new(sent[1].as_ref());
        assert_eq!(first.val_at::<U256>(0).unwrap(), U256::from(11u64));
        assert_eq!(second.val_at::<U256>(0).unwrap(), U256::from(12u64));
    }

    #[tokio::test]
    async fn raw_pairing_selects_the_raw_deposit_entry_point() {
        let client = Arc::new(MockClient::new());
        client.set_gas_price(1_000_000_000);
        // rawDepositERC20 reverts in the dry run, proving it was selected
        client.stub_call(functions::approve(), Bytes::default());
        let deposit_box = DepositBox::new(Address::repeat_byte(1));
        let proxy = MessageProxy::new(Address::repeat_byte(2));
        client.emit_logs_on_next_send(Vec::new());
        let pairing = TokenPairing {
            token: Address::repeat_byte(8),
            paired_token: Some(Address::repeat_byte(9)),
        };
        let err = deposit_erc20_to_s_chain(
            &side(client.clone()),
            &deposit_box,
            &proxy,
            &pairing,
            "Bob",
            Address::repeat_byte(7),
            U256::from(1000u64),
        )
        .await
        .unwrap_err();
        // only the approve went through, rawDepositERC20 had no stub
        assert_eq!(client.sent_count(), 1);
        let _ = err;
    }

    #[tokio::test]
    async fn exit_without_cost_topup_sends_approve_then_exit() {
        let client = Arc::new(MockClient::new());
        client.stub_call(functions::approve(), Bytes::default());
        client.stub_call(functions::exit_to_main_erc20(), Bytes::default());
        let token_manager = TokenManager::new(Address::repeat_byte(3));
        let proxy = MessageProxy::new(Address::repeat_byte(4));
        client.emit_logs_on_next_send(Vec::new());
        client.emit_logs_on_next_send(vec![outgoing_log(&proxy)]);
        let mut schain = side(client.clone());
        schain.customizer = TransactionCustomizer::s_chain();
        let pairing = TokenPairing {
            token: Address::repeat_byte(8),
            paired_token: None,
        };
        let records = exit_erc20_to_main_net(
            &schain,
            &token_manager,
            &proxy,
            &pairing,
            Address::repeat_byte(7),
            U256::from(500u64),
            None,
            &SchainPacing::default(),
        )
        .await
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(client.sent_count(), 2);
    }
}
