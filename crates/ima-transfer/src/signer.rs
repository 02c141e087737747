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

//! The BLS batch-signing seam of the transfer engine.
//!
//! Collecting a threshold signature over a message batch is the business
//! of external glue (the S-chain's BLS machinery); the engine only needs
//! something implementing [`MessageSigner`]. Without a signer the engine
//! submits the zero sentinel and relies on signature checks being disabled
//! on the destination proxy.

use ethers::types::U256;
use ima_chain::contracts::{BatchSignature, Message};
use ima_utils::Result;

/// Produces the BLS signature block for one `postIncomingMessages`
/// submission.
#[async_trait::async_trait]
pub trait MessageSigner: Send + Sync {
    /// Signs `messages` starting at `starting_counter`, as queued by
    /// `src_chain`.
    async fn sign_messages(
        &self,
        src_chain: &str,
        messages: &[Message],
        starting_counter: U256,
    ) -> Result<BatchSignature>;
}
