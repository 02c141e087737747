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

//! The transaction pipeline of the IMA agent.
//!
//! A contract call travels compose -> dry-run -> sign -> submit -> verify;
//! [`sender::TxSender`] strings the stages together for callers that do not
//! need to intervene in between.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compose;
pub mod customize;
pub mod dry_run;
pub mod receipts;
pub mod sender;
pub mod sign;
pub mod submit;
pub mod verify;
