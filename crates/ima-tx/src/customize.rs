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

//! Per-chain gas price policy.

use ethers::types::U256;
use ima_chain::ChainClient;
use ima_utils::Result;

/// Scales the node-recommended gas price by an optional multiplier.
///
/// `None` keeps the recommendation untouched, a non-positive multiplier
/// forces a zero gas price (gas-free S-chains), a positive one rounds the
/// scaled price to the nearest wei.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionCustomizer {
    multiplier: Option<f64>,
}

impl TransactionCustomizer {
    /// Policy with an explicit multiplier.
    #[must_use]
    pub const fn new(multiplier: Option<f64>) -> Self {
        Self { multiplier }
    }

    /// Default main-net policy: pay 25% over the recommendation.
    #[must_use]
    pub const fn main_net() -> Self {
        Self::new(Some(1.25))
    }

    /// Default S-chain policy: take the recommendation as-is.
    #[must_use]
    pub const fn s_chain() -> Self {
        Self::new(None)
    }

    /// Applies the policy to a recommended price.
    #[must_use]
    pub fn apply(&self, recommended: U256) -> U256 {
        match self.multiplier {
            None => recommended,
            Some(m) if m <= 0.0 => U256::zero(),
            Some(m) => {
                let scaled = recommended.low_u128() as f64 * m;
                U256::from(scaled.round() as u128)
            }
        }
    }

    /// Fetches the node recommendation and applies the policy.
    pub async fn compute_gas_price(
        &self,
        client: &dyn ChainClient,
    ) -> Result<U256> {
        Ok(self.apply(client.gas_price().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ima_chain::mock::MockClient;

    #[test]
    fn no_multiplier_keeps_recommendation() {
        let tc = TransactionCustomizer::s_chain();
        assert_eq!(tc.apply(U256::from(123u64)), U256::from(123u64));
    }

    #[test]
    fn non_positive_multiplier_forces_zero() {
        assert_eq!(
            TransactionCustomizer::new(Some(0.0)).apply(U256::from(10u64)),
            U256::zero()
        );
        assert_eq!(
            TransactionCustomizer::new(Some(-2.5)).apply(U256::from(10u64)),
            U256::zero()
        );
    }

    #[test]
    fn positive_multiplier_rounds_scaled_price() {
        let tc = TransactionCustomizer::main_net();
        assert_eq!(tc.apply(U256::from(100u64)), U256::from(125u64));
        // 10 * 1.25 = 12.5 rounds to 13
        assert_eq!(tc.apply(U256::from(10u64)), U256::from(13u64));
    }

    #[tokio::test]
    async fn compute_uses_node_recommendation() {
        let client = MockClient::new();
        client.set_gas_price(1_000_000_000);
        let tc = TransactionCustomizer::main_net();
        let price = tc.compute_gas_price(&client).await.unwrap();
        assert_eq!(price, U256::from(1_250_000_000u64));
    }
}
