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

//! Retry policies for operations that are expected to converge after a
//! bounded number of polls, like waiting for a transaction receipt or for
//! a chain registration to become visible on-chain.

use std::time::Duration;

/// A retry policy that retries at a constant interval, up to a maximum
/// number of retries. Used with [`backoff::future::retry`].
#[derive(Debug, Clone, Copy)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a policy that yields `interval` a total of `max_retry_count`
    /// times before giving up.
    #[must_use]
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }

    /// The configured maximum number of retries.
    #[must_use]
    pub fn max_retry_count(&self) -> usize {
        self.max_retry_count
    }
}

impl backoff::backoff::Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.count < self.max_retry_count {
            self.count += 1;
            Some(self.interval)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}
