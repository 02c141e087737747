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

//! Typed facades over the IMA contracts: `MessageProxy`, `DepositBox`,
//! `TokenManager`, the `LockAndData` registries and plain ERC20/ERC721
//! tokens. Facades hold only the contract address; calldata building and
//! log decoding are pure, view reads go through a [`ChainClient`].

use ethers::abi::{
    Event, EventParam, Function, Param, ParamType, RawLog, StateMutability,
    Token,
};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, Filter, Log, TransactionRequest, H256, U256,
    U64,
};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

use crate::ChainClient;
use ima_utils::{Error, Result};

/// One message of the `OutgoingMessage` queue, in `postIncomingMessages`
/// wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender contract on the source chain.
    pub sender: Address,
    /// Receiver contract on the destination chain.
    pub destination_contract: Address,
    /// Final beneficiary address.
    pub to: Address,
    /// Amount carried with the message.
    pub amount: U256,
    /// Opaque message payload.
    pub data: Bytes,
}

impl Message {
    fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.sender),
            Token::Address(self.destination_contract),
            Token::Address(self.to),
            Token::Uint(self.amount),
            Token::Bytes(self.data.to_vec()),
        ])
    }
}

/// A decoded `OutgoingMessage` log entry.
#[derive(Debug, Clone)]
pub struct OutgoingMessageEvent {
    /// Destination chain name as emitted (the indexed hash is only a
    /// filter key, the string is authoritative).
    pub dst_chain: String,
    /// Message counter of this entry.
    pub counter: u64,
    /// Block the event was mined in.
    pub block_number: U64,
    /// The relayed message body.
    pub message: Message,
}

/// BLS signature block of a `postIncomingMessages` submission.
///
/// [`BatchSignature::zero`] is the sentinel used when no message signer is
/// configured; the destination proxy accepts it only when signature checks
/// are disabled on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSignature {
    /// G1 signature point `[X, Y]`.
    pub signature: [U256; 2],
    /// X coordinate of the hashed-to-curve message point.
    pub hash_a: U256,
    /// Y coordinate of the hashed-to-curve message point.
    pub hash_b: U256,
    /// Counter hint produced by the signing glue.
    pub counter: U256,
}

impl BatchSignature {
    /// The all-zeros sentinel signature.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            signature: [U256::zero(), U256::zero()],
            hash_a: U256::zero(),
            hash_b: U256::zero(),
            counter: U256::zero(),
        }
    }

    /// Whether this is the zero sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::FixedArray(vec![
                Token::Uint(self.signature[0]),
                Token::Uint(self.signature[1]),
            ]),
            Token::Uint(self.hash_a),
            Token::Uint(self.hash_b),
            Token::Uint(self.counter),
        ])
    }
}

/// keccak256 of a chain name, the value of the indexed `dstChainHash`
/// event topic.
#[must_use]
pub fn chain_hash(name: &str) -> H256 {
    H256(keccak256(name.as_bytes()))
}

fn u256_topic(value: U256) -> H256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    H256(bytes)
}

#[allow(deprecated)]
fn function(
    name: &str,
    inputs: &[ParamType],
    outputs: &[ParamType],
    state_mutability: StateMutability,
) -> Function {
    let param = |kind: &ParamType| Param {
        name: String::new(),
        kind: kind.clone(),
        internal_type: None,
    };
    Function {
        name: name.into(),
        inputs: inputs.iter().map(param).collect(),
        outputs: outputs.iter().map(param).collect(),
        constant: None,
        state_mutability,
    }
}

async fn view_call(
    client: &dyn ChainClient,
    to: Address,
    function: &Function,
    args: &[Token],
) -> Result<Vec<Token>> {
    let data = function.encode_input(args)?;
    let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
    let output = client.call(&tx).await?;
    Ok(function.decode_output(output.as_ref())?)
}

static OUTGOING_MESSAGE_EVENT: Lazy<Event> = Lazy::new(|| {
    let input = |name: &str, kind: ParamType, indexed: bool| EventParam {
        name: name.into(),
        kind,
        indexed,
    };
    Event {
        name: "OutgoingMessage".into(),
        inputs: vec![
            input("dstChain", ParamType::String, false),
            input("dstChainHash", ParamType::FixedBytes(32), true),
            input("msgCounter", ParamType::Uint(256), true),
            input("srcContract", ParamType::Address, true),
            input("dstContract", ParamType::Address, false),
            input("to", ParamType::Address, false),
            input("amount", ParamType::Uint(256), false),
            input("data", ParamType::Bytes, false),
            input("length", ParamType::Uint(256), false),
        ],
        anonymous: false,
    }
});

static ETH_RECEIVED_EVENT: Lazy<Event> = Lazy::new(|| Event {
    name: "ETHReceived".into(),
    inputs: vec![
        EventParam {
            name: "from".into(),
            kind: ParamType::Address,
            indexed: false,
        },
        EventParam {
            name: "amount".into(),
            kind: ParamType::Uint(256),
            indexed: false,
        },
    ],
    anonymous: false,
});

static ERROR_EVENT: Lazy<Event> = Lazy::new(|| Event {
    name: "Error".into(),
    inputs: vec![
        EventParam {
            name: "to".into(),
            kind: ParamType::Address,
            indexed: false,
        },
        EventParam {
            name: "amount".into(),
            kind: ParamType::Uint(256),
            indexed: false,
        },
        EventParam {
            name: "message".into(),
            kind: ParamType::String,
            indexed: false,
        },
    ],
    anonymous: false,
});

/// The `OutgoingMessage` event descriptor.
#[must_use]
pub fn outgoing_message_event() -> &'static Event {
    &OUTGOING_MESSAGE_EVENT
}

/// The DepositBox `ETHReceived` event descriptor.
#[must_use]
pub fn eth_received_event() -> &'static Event {
    &ETH_RECEIVED_EVENT
}

/// The `Error` event descriptor emitted by DepositBox on refund paths.
#[must_use]
pub fn error_event() -> &'static Event {
    &ERROR_EVENT
}

static GET_OUTGOING_MESSAGES_COUNTER: Lazy<Function> = Lazy::new(|| {
    function(
        "getOutgoingMessagesCounter",
        &[ParamType::String],
        &[ParamType::Uint(256)],
        StateMutability::View,
    )
});

static GET_INCOMING_MESSAGES_COUNTER: Lazy<Function> = Lazy::new(|| {
    function(
        "getIncomingMessagesCounter",
        &[ParamType::String],
        &[ParamType::Uint(256)],
        StateMutability::View,
    )
});

static POST_INCOMING_MESSAGES: Lazy<Function> = Lazy::new(|| {
    let message_tuple = ParamType::Tuple(vec![
        ParamType::Address,
        ParamType::Address,
        ParamType::Address,
        ParamType::Uint(256),
        ParamType::Bytes,
    ]);
    let signature_tuple = ParamType::Tuple(vec![
        ParamType::FixedArray(Box::new(ParamType::Uint(256)), 2),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
    ]);
    function(
        "postIncomingMessages",
        &[
            ParamType::String,
            ParamType::Uint(256),
            ParamType::Array(Box::new(message_tuple)),
            signature_tuple,
            ParamType::Uint(256),
        ],
        &[],
        StateMutability::NonPayable,
    )
});

/// The `MessageProxy` contract of one chain.
#[derive(Debug, Clone, Copy)]
pub struct MessageProxy {
    /// Deployed address.
    pub address: Address,
}

impl MessageProxy {
    /// Facade over the proxy at `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// How many messages this chain has queued towards `dst_chain`.
    pub async fn outgoing_messages_counter(
        &self,
        client: &dyn ChainClient,
        dst_chain: &str,
    ) -> Result<U256> {
        let tokens = view_call(
            client,
            self.address,
            &GET_OUTGOING_MESSAGES_COUNTER,
            &[Token::String(dst_chain.into())],
        )
        .await?;
        uint_output(tokens, "getOutgoingMessagesCounter")
    }

    /// How many messages this chain has accepted from `src_chain`.
    pub async fn incoming_messages_counter(
        &self,
        client: &dyn ChainClient,
        src_chain: &str,
    ) -> Result<U256> {
        let tokens = view_call(
            client,
            self.address,
            &GET_INCOMING_MESSAGES_COUNTER,
            &[Token::String(src_chain.into())],
        )
        .await?;
        uint_output(tokens, "getIncomingMessagesCounter")
    }

    /// Log filter for one `OutgoingMessage` entry addressed to `dst_chain`.
    ///
    /// The indexed topics narrow by destination hash and counter; the
    /// decoded `dstChain` string must still be compared by the caller since
    /// hashes of distinct names could be configured to collide off-chain.
    #[must_use]
    pub fn outgoing_message_filter(
        &self,
        dst_chain: &str,
        counter: u64,
    ) -> Filter {
        Filter::new()
            .address(self.address)
            .topic0(OUTGOING_MESSAGE_EVENT.signature())
            .topic1(chain_hash(dst_chain))
            .topic2(u256_topic(U256::from(counter)))
            .from_block(BlockNumber::Earliest)
            .to_block(BlockNumber::Latest)
    }

    /// Decodes one `OutgoingMessage` log entry.
    pub fn decode_outgoing_message(
        &self,
        log: &Log,
    ) -> Result<OutgoingMessageEvent> {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let parsed = OUTGOING_MESSAGE_EVENT.parse_log(raw)?;
        let mut dst_chain = None;
        let mut counter = None;
        let mut dst_contract = None;
        let mut src_contract = None;
        let mut to = None;
        let mut amount = None;
        let mut data = None;
        for param in parsed.params {
            match (param.name.as_str(), param.value) {
                ("dstChain", Token::String(v)) => dst_chain = Some(v),
                ("msgCounter", Token::Uint(v)) => counter = Some(v),
                ("srcContract", Token::Address(v)) => src_contract = Some(v),
                ("dstContract", Token::Address(v)) => dst_contract = Some(v),
                ("to", Token::Address(v)) => to = Some(v),
                ("amount", Token::Uint(v)) => amount = Some(v),
                ("data", Token::Bytes(v)) => data = Some(v),
                _ => {}
            }
        }
        let block_number = log
            .block_number
            .ok_or(Error::Generic("log entry carries no block number"))?;
        match (dst_chain, counter, src_contract, dst_contract, to, amount, data)
        {
            (
                Some(dst_chain),
                Some(counter),
                Some(sender),
                Some(destination_contract),
                Some(to),
                Some(amount),
                Some(data),
            ) => Ok(OutgoingMessageEvent {
                dst_chain,
                counter: counter.low_u64(),
                block_number,
                message: Message {
                    sender,
                    destination_contract,
                    to,
                    amount,
                    data: data.into(),
                },
            }),
            _ => Err(Error::Generic("malformed OutgoingMessage log entry")),
        }
    }

    /// Calldata for `postIncomingMessages`.
    pub fn post_incoming_messages_calldata(
        &self,
        src_chain: &str,
        starting_counter: U256,
        messages: &[Message],
        sign: &BatchSignature,
        idx_last_to_pop_not_including: U256,
    ) -> Result<Bytes> {
        let data = POST_INCOMING_MESSAGES.encode_input(&[
            Token::String(src_chain.into()),
            Token::Uint(starting_counter),
            Token::Array(messages.iter().map(Message::to_token).collect()),
            sign.to_token(),
            Token::Uint(idx_last_to_pop_not_including),
        ])?;
        Ok(data.into())
    }
}

fn uint_output(tokens: Vec<Token>, call: &'static str) -> Result<U256> {
    match tokens.into_iter().next() {
        Some(Token::Uint(v)) => Ok(v),
        _ => {
            tracing::warn!(%call, "view call returned unexpected output shape");
            Err(Error::Generic("view call returned unexpected output shape"))
        }
    }
}

fn bool_output(tokens: Vec<Token>, call: &'static str) -> Result<bool> {
    match tokens.into_iter().next() {
        Some(Token::Bool(v)) => Ok(v),
        _ => {
            tracing::warn!(%call, "view call returned unexpected output shape");
            Err(Error::Generic("view call returned unexpected output shape"))
        }
    }
}

static DEPOSIT: Lazy<Function> = Lazy::new(|| {
    function(
        "deposit",
        &[ParamType::String, ParamType::Address, ParamType::Bytes],
        &[],
        StateMutability::Payable,
    )
});

static DEPOSIT_ERC20: Lazy<Function> = Lazy::new(|| {
    function(
        "depositERC20",
        &[
            ParamType::String,
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
        ],
        &[],
        StateMutability::Payable,
    )
});

static RAW_DEPOSIT_ERC20: Lazy<Function> = Lazy::new(|| {
    function(
        "rawDepositERC20",
        &[
            ParamType::String,
            ParamType::Address,
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
        ],
        &[],
        StateMutability::Payable,
    )
});

static DEPOSIT_ERC721: Lazy<Function> = Lazy::new(|| {
    function(
        "depositERC721",
        &[
            ParamType::String,
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
        ],
        &[],
        StateMutability::Payable,
    )
});

static RAW_DEPOSIT_ERC721: Lazy<Function> = Lazy::new(|| {
    function(
        "rawDepositERC721",
        &[
            ParamType::String,
            ParamType::Address,
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
        ],
        &[],
        StateMutability::Payable,
    )
});

/// The main-net `DepositBox` contract.
#[derive(Debug, Clone, Copy)]
pub struct DepositBox {
    /// Deployed address.
    pub address: Address,
}

impl DepositBox {
    /// Facade over the deposit box at `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Calldata for an ETH deposit towards `schain_name`.
    pub fn deposit_calldata(
        &self,
        schain_name: &str,
        to: Address,
    ) -> Result<Bytes> {
        let data = DEPOSIT.encode_input(&[
            Token::String(schain_name.into()),
            Token::Address(to),
            Token::Bytes(Vec::new()),
        ])?;
        Ok(data.into())
    }

    /// Calldata for an ERC20 deposit of a registered token.
    pub fn deposit_erc20_calldata(
        &self,
        schain_name: &str,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<Bytes> {
        let data = DEPOSIT_ERC20.encode_input(&[
            Token::String(schain_name.into()),
            Token::Address(token),
            Token::Address(to),
            Token::Uint(amount),
        ])?;
        Ok(data.into())
    }

    /// Calldata for an ERC20 deposit of a raw (unregistered) token pairing.
    pub fn raw_deposit_erc20_calldata(
        &self,
        schain_name: &str,
        token: Address,
        schain_token: Address,
        to: Address,
        amount: U256,
    ) -> Result<Bytes> {
        let data = RAW_DEPOSIT_ERC20.encode_input(&[
            Token::String(schain_name.into()),
            Token::Address(token),
            Token::Address(schain_token),
            Token::Address(to),
            Token::Uint(amount),
        ])?;
        Ok(data.into())
    }

    /// Calldata for an ERC721 deposit of a registered token.
    pub fn deposit_erc721_calldata(
        &self,
        schain_name: &str,
        token: Address,
        to: Address,
        token_id: U256,
    ) -> Result<Bytes> {
        let data = DEPOSIT_ERC721.encode_input(&[
            Token::String(schain_name.into()),
            Token::Address(token),
            Token::Address(to),
            Token::Uint(token_id),
        ])?;
        Ok(data.into())
    }

    /// Calldata for an ERC721 deposit of a raw token pairing.
    pub fn raw_deposit_erc721_calldata(
        &self,
        schain_name: &str,
        token: Address,
        schain_token: Address,
        to: Address,
        token_id: U256,
    ) -> Result<Bytes> {
        let data = RAW_DEPOSIT_ERC721.encode_input(&[
            Token::String(schain_name.into()),
            Token::Address(token),
            Token::Address(schain_token),
            Token::Address(to),
            Token::Uint(token_id),
        ])?;
        Ok(data.into())
    }
}

static EXIT_TO_MAIN: Lazy<Function> = Lazy::new(|| {
    function(
        "exitToMain",
        &[ParamType::Address, ParamType::Uint(256), ParamType::Bytes],
        &[],
        StateMutability::NonPayable,
    )
});

static EXIT_TO_MAIN_ERC20: Lazy<Function> = Lazy::new(|| {
    function(
        "exitToMainERC20",
        &[ParamType::Address, ParamType::Address, ParamType::Uint(256)],
        &[],
        StateMutability::NonPayable,
    )
});

static RAW_EXIT_TO_MAIN_ERC20: Lazy<Function> = Lazy::new(|| {
    function(
        "rawExitToMainERC20",
        &[
            ParamType::Address,
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
        ],
        &[],
        StateMutability::NonPayable,
    )
});

static EXIT_TO_MAIN_ERC721: Lazy<Function> = Lazy::new(|| {
    function(
        "exitToMainERC721",
        &[ParamType::Address, ParamType::Address, ParamType::Uint(256)],
        &[],
        StateMutability::NonPayable,
    )
});

static RAW_EXIT_TO_MAIN_ERC721: Lazy<Function> = Lazy::new(|| {
    function(
        "rawExitToMainERC721",
        &[
            ParamType::Address,
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
        ],
        &[],
        StateMutability::NonPayable,
    )
});

static ADD_ETH_COST: Lazy<Function> = Lazy::new(|| {
    function(
        "addEthCost",
        &[ParamType::Uint(256)],
        &[],
        StateMutability::NonPayable,
    )
});

/// The side-chain `TokenManager` contract.
#[derive(Debug, Clone, Copy)]
pub struct TokenManager {
    /// Deployed address.
    pub address: Address,
}

impl TokenManager {
    /// Facade over the token manager at `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Calldata for an ETH exit to main net.
    pub fn exit_to_main_calldata(
        &self,
        to: Address,
        amount_wei: U256,
    ) -> Result<Bytes> {
        let data = EXIT_TO_MAIN.encode_input(&[
            Token::Address(to),
            Token::Uint(amount_wei),
            Token::Bytes(Vec::new()),
        ])?;
        Ok(data.into())
    }

    /// Calldata for topping up the exit gas cost deposit.
    pub fn add_eth_cost_calldata(&self, amount_wei: U256) -> Result<Bytes> {
        let data = ADD_ETH_COST.encode_input(&[Token::Uint(amount_wei)])?;
        Ok(data.into())
    }

    /// Calldata for an ERC20 exit of a registered token.
    pub fn exit_to_main_erc20_calldata(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<Bytes> {
        let data = EXIT_TO_MAIN_ERC20.encode_input(&[
            Token::Address(token),
            Token::Address(to),
            Token::Uint(amount),
        ])?;
        Ok(data.into())
    }

    /// Calldata for an ERC20 exit of a raw token pairing.
    pub fn raw_exit_to_main_erc20_calldata(
        &self,
        token: Address,
        main_net_token: Address,
        to: Address,
        amount: U256,
    ) -> Result<Bytes> {
        let data = RAW_EXIT_TO_MAIN_ERC20.encode_input(&[
            Token::Address(token),
            Token::Address(main_net_token),
            Token::Address(to),
            Token::Uint(amount),
        ])?;
        Ok(data.into())
    }

    /// Calldata for an ERC721 exit of a registered token.
    pub fn exit_to_main_erc721_calldata(
        &self,
        token: Address,
        to: Address,
        token_id: U256,
    ) -> Result<Bytes> {
        let data = EXIT_TO_MAIN_ERC721.encode_input(&[
            Token::Address(token),
            Token::Address(to),
            Token::Uint(token_id),
        ])?;
        Ok(data.into())
    }

    /// Calldata for an ERC721 exit of a raw token pairing.
    pub fn raw_exit_to_main_erc721_calldata(
        &self,
        token: Address,
        main_net_token: Address,
        to: Address,
        token_id: U256,
    ) -> Result<Bytes> {
        let data = RAW_EXIT_TO_MAIN_ERC721.encode_input(&[
            Token::Address(token),
            Token::Address(main_net_token),
            Token::Address(to),
            Token::Uint(token_id),
        ])?;
        Ok(data.into())
    }
}

static ADD_SCHAIN: Lazy<Function> = Lazy::new(|| {
    function(
        "addSchain",
        &[ParamType::String, ParamType::Address],
        &[],
        StateMutability::NonPayable,
    )
});

static HAS_SCHAIN: Lazy<Function> = Lazy::new(|| {
    function(
        "hasSchain",
        &[ParamType::String],
        &[ParamType::Bool],
        StateMutability::View,
    )
});

static GET_MY_ETH: Lazy<Function> = Lazy::new(|| {
    function("getMyEth", &[], &[], StateMutability::NonPayable)
});

static APPROVE_TRANSFERS: Lazy<Function> = Lazy::new(|| {
    function(
        "approveTransfers",
        &[ParamType::Address],
        &[ParamType::Uint(256)],
        StateMutability::View,
    )
});

/// The main-net `LockAndData` registry and ETH escrow.
#[derive(Debug, Clone, Copy)]
pub struct LockAndDataMainNet {
    /// Deployed address.
    pub address: Address,
}

impl LockAndDataMainNet {
    /// Facade over the registry at `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Whether the named S-chain is registered.
    pub async fn has_schain(
        &self,
        client: &dyn ChainClient,
        schain_name: &str,
    ) -> Result<bool> {
        let tokens = view_call(
            client,
            self.address,
            &HAS_SCHAIN,
            &[Token::String(schain_name.into())],
        )
        .await?;
        bool_output(tokens, "hasSchain")
    }

    /// Calldata registering an S-chain with its token manager.
    pub fn add_schain_calldata(
        &self,
        schain_name: &str,
        token_manager: Address,
    ) -> Result<Bytes> {
        let data = ADD_SCHAIN.encode_input(&[
            Token::String(schain_name.into()),
            Token::Address(token_manager),
        ])?;
        Ok(data.into())
    }

    /// Calldata withdrawing the caller's approved exited ETH.
    pub fn get_my_eth_calldata(&self) -> Result<Bytes> {
        let data = GET_MY_ETH.encode_input(&[])?;
        Ok(data.into())
    }

    /// ETH amount approved for withdrawal by `owner`, in wei.
    pub async fn approved_transfers(
        &self,
        client: &dyn ChainClient,
        owner: Address,
    ) -> Result<U256> {
        let tokens = view_call(
            client,
            self.address,
            &APPROVE_TRANSFERS,
            &[Token::Address(owner)],
        )
        .await?;
        uint_output(tokens, "approveTransfers")
    }
}

static ADD_DEPOSIT_BOX: Lazy<Function> = Lazy::new(|| {
    function(
        "addDepositBox",
        &[ParamType::Address],
        &[],
        StateMutability::NonPayable,
    )
});

static HAS_DEPOSIT_BOX: Lazy<Function> = Lazy::new(|| {
    function("hasDepositBox", &[], &[ParamType::Bool], StateMutability::View)
});

/// The side-chain `LockAndData` registry.
#[derive(Debug, Clone, Copy)]
pub struct LockAndDataSchain {
    /// Deployed address.
    pub address: Address,
}

impl LockAndDataSchain {
    /// Facade over the registry at `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Whether the main-net deposit box is registered.
    pub async fn has_deposit_box(
        &self,
        client: &dyn ChainClient,
    ) -> Result<bool> {
        let tokens =
            view_call(client, self.address, &HAS_DEPOSIT_BOX, &[]).await?;
        bool_output(tokens, "hasDepositBox")
    }

    /// Calldata registering the main-net deposit box.
    pub fn add_deposit_box_calldata(
        &self,
        deposit_box: Address,
    ) -> Result<Bytes> {
        let data =
            ADD_DEPOSIT_BOX.encode_input(&[Token::Address(deposit_box)])?;
        Ok(data.into())
    }
}

static APPROVE: Lazy<Function> = Lazy::new(|| {
    function(
        "approve",
        &[ParamType::Address, ParamType::Uint(256)],
        &[ParamType::Bool],
        StateMutability::NonPayable,
    )
});

static TRANSFER_FROM: Lazy<Function> = Lazy::new(|| {
    function(
        "transferFrom",
        &[ParamType::Address, ParamType::Address, ParamType::Uint(256)],
        &[ParamType::Bool],
        StateMutability::NonPayable,
    )
});

/// An ERC20 token, as far as the agent needs it.
#[derive(Debug, Clone, Copy)]
pub struct Erc20Token {
    /// Deployed address.
    pub address: Address,
}

impl Erc20Token {
    /// Facade over the token at `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Calldata approving `spender` for `amount`.
    pub fn approve_calldata(
        &self,
        spender: Address,
        amount: U256,
    ) -> Result<Bytes> {
        let data = APPROVE
            .encode_input(&[Token::Address(spender), Token::Uint(amount)])?;
        Ok(data.into())
    }
}

/// An ERC721 token, as far as the agent needs it.
#[derive(Debug, Clone, Copy)]
pub struct Erc721Token {
    /// Deployed address.
    pub address: Address,
}

impl Erc721Token {
    /// Facade over the token at `address`.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Calldata approving `spender` for `token_id`.
    pub fn approve_calldata(
        &self,
        spender: Address,
        token_id: U256,
    ) -> Result<Bytes> {
        let data = APPROVE
            .encode_input(&[Token::Address(spender), Token::Uint(token_id)])?;
        Ok(data.into())
    }

    /// Calldata moving `token_id` from `from` to `to`.
    pub fn transfer_from_calldata(
        &self,
        from: Address,
        to: Address,
        token_id: U256,
    ) -> Result<Bytes> {
        let data = TRANSFER_FROM.encode_input(&[
            Token::Address(from),
            Token::Address(to),
            Token::Uint(token_id),
        ])?;
        Ok(data.into())
    }
}

/// Function descriptors, exposed so test doubles can script responses per
/// selector.
pub mod functions {
    use super::*;

    /// `getOutgoingMessagesCounter(string)`.
    pub fn get_outgoing_messages_counter() -> &'static Function {
        &GET_OUTGOING_MESSAGES_COUNTER
    }
    /// `getIncomingMessagesCounter(string)`.
    pub fn get_incoming_messages_counter() -> &'static Function {
        &GET_INCOMING_MESSAGES_COUNTER
    }
    /// `postIncomingMessages(...)`.
    pub fn post_incoming_messages() -> &'static Function {
        &POST_INCOMING_MESSAGES
    }
    /// `deposit(string,address,bytes)`.
    pub fn deposit() -> &'static Function {
        &DEPOSIT
    }
    /// `exitToMain(address,uint256,bytes)`.
    pub fn exit_to_main() -> &'static Function {
        &EXIT_TO_MAIN
    }
    /// `addEthCost(uint256)`.
    pub fn add_eth_cost() -> &'static Function {
        &ADD_ETH_COST
    }
    /// `hasSchain(string)`.
    pub fn has_schain() -> &'static Function {
        &HAS_SCHAIN
    }
    /// `hasDepositBox()`.
    pub fn has_deposit_box() -> &'static Function {
        &HAS_DEPOSIT_BOX
    }
    /// `addSchain(string,address)`.
    pub fn add_schain() -> &'static Function {
        &ADD_SCHAIN
    }
    /// `addDepositBox(address)`.
    pub fn add_deposit_box() -> &'static Function {
        &ADD_DEPOSIT_BOX
    }
    /// `getMyEth()`.
    pub fn get_my_eth() -> &'static Function {
        &GET_MY_ETH
    }
    /// `approveTransfers(address)`.
    pub fn approve_transfers() -> &'static Function {
        &APPROVE_TRANSFERS
    }
    /// `approve(address,uint256)`.
    pub fn approve() -> &'static Function {
        &APPROVE
    }
    /// `transferFrom(address,address,uint256)`.
    pub fn transfer_from() -> &'static Function {
        &TRANSFER_FROM
    }
    /// `depositERC20(string,address,address,uint256)`.
    pub fn deposit_erc20() -> &'static Function {
        &DEPOSIT_ERC20
    }
    /// `depositERC721(string,address,address,uint256)`.
    pub fn deposit_erc721() -> &'static Function {
        &DEPOSIT_ERC721
    }
    /// `exitToMainERC20(address,address,uint256)`.
    pub fn exit_to_main_erc20() -> &'static Function {
        &EXIT_TO_MAIN_ERC20
    }
    /// `exitToMainERC721(address,address,uint256)`.
    pub fn exit_to_main_erc721() -> &'static Function {
        &EXIT_TO_MAIN_ERC721
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::encode;

    fn sample_log(dst_chain: &str, counter: u64, block: u64) -> Log {
        // non-indexed params in event order: dstChain, dstContract, to,
        // amount, data, length
        let data = encode(&[
            Token::String(dst_chain.into()),
            Token::Address(Address::repeat_byte(5)),
            Token::Address(Address::repeat_byte(6)),
            Token::Uint(U256::from(42u64)),
            Token::Bytes(vec![0xde, 0xad]),
            Token::Uint(U256::from(2u64)),
        ]);
        Log {
            address: Address::repeat_byte(1),
            topics: vec![
                OUTGOING_MESSAGE_EVENT.signature(),
                chain_hash(dst_chain),
                u256_topic(U256::from(counter)),
                H256::from(Address::repeat_byte(4)),
            ],
            data: data.into(),
            block_number: Some(U64::from(block)),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_outgoing_message_log() {
        let proxy = MessageProxy::new(Address::repeat_byte(1));
        let log = sample_log("Bob", 7, 123);
        let event = proxy.decode_outgoing_message(&log).unwrap();
        assert_eq!(event.dst_chain, "Bob");
        assert_eq!(event.counter, 7);
        assert_eq!(event.block_number, U64::from(123u64));
        assert_eq!(event.message.to, Address::repeat_byte(6));
        assert_eq!(event.message.amount, U256::from(42u64));
        assert_eq!(event.message.data.to_vec(), vec![0xde, 0xad]);
    }

    #[test]
    fn post_incoming_messages_calldata_is_deterministic() {
        let proxy = MessageProxy::new(Address::repeat_byte(1));
        let messages = vec![Message {
            sender: Address::repeat_byte(2),
            destination_contract: Address::repeat_byte(3),
            to: Address::repeat_byte(4),
            amount: U256::from(10u64),
            data: Bytes::default(),
        }];
        let a = proxy
            .post_incoming_messages_calldata(
                "Mainnet",
                U256::from(3u64),
                &messages,
                &BatchSignature::zero(),
                U256::from(1u64),
            )
            .unwrap();
        let b = proxy
            .post_incoming_messages_calldata(
                "Mainnet",
                U256::from(3u64),
                &messages,
                &BatchSignature::zero(),
                U256::from(1u64),
            )
            .unwrap();
        assert_eq!(a, b);
        // selector comes first
        assert_eq!(&a[..4], &POST_INCOMING_MESSAGES.short_signature());
    }

    #[test]
    fn zero_signature_sentinel() {
        let zero = BatchSignature::zero();
        assert!(zero.is_zero());
        let nonzero = BatchSignature {
            counter: U256::one(),
            ..BatchSignature::zero()
        };
        assert!(!nonzero.is_zero());
    }

    #[test]
    fn chain_hash_matches_keccak_of_utf8_name() {
        assert_eq!(chain_hash("Mainnet"), H256(keccak256(b"Mainnet")));
        assert_ne!(chain_hash("Mainnet"), chain_hash("mainnet"));
    }
}
