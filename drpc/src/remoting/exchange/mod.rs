//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The exchange layer: requests correlated with responses over channels.
//!
//! A client registers every two-way request in its [`PendingRequests`]
//! before writing it; the response, the timeout scanner or the channel
//! closing completes the matching [`ResponseFuture`], whichever comes
//! first. Servers hand calls to an [`ExchangeHandler`] and write its result
//! back under the request's id.

mod client;
mod handler;
mod pending;
mod server;

pub use client::ExchangeClient;
pub use handler::{ExchangeHandler, HeaderExchangeHandler};
pub use pending::{response_result, PendingRequests, ResponseFuture};
pub use server::ExchangeServer;

use crate::remoting::ExponentialBackoff;
use std::time::Duration;

/// Exchange client tuning.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Period of the timeout scan.
    ///
    /// Default: 30 ms.
    pub scan_interval: Duration,
    /// Delays between reconnect attempts.
    pub reconnect: ExponentialBackoff,
    /// Attempts per reconnect round of the heartbeat watchdog.
    ///
    /// Default: 3.
    pub reconnect_attempts: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(30),
            reconnect: ExponentialBackoff::builder()
                .initial_delay(Duration::from_millis(100))
                .max_delay(Duration::from_secs(2))
                .build(),
            reconnect_attempts: 3,
        }
    }
}
