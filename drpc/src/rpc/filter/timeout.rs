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

use crate::common::constants;
use crate::rpc::filter::Filter;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::RpcError;
use async_trait::async_trait;
use std::time::Instant;
use tracing::warn;

/// Logs provider invocations that outlive the configured `timeout`. The
/// call itself is not interrupted.
#[derive(Debug, Default)]
pub struct TimeoutFilter;

#[async_trait]
impl Filter for TimeoutFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        let start = Instant::now();
        let result = next.invoke(invocation).await;
        let elapsed = start.elapsed().as_millis() as u64;
        let timeout = next.url().method_get(
            invocation.method_name(),
            constants::TIMEOUT_KEY,
            constants::DEFAULT_TIMEOUT,
        );
        if elapsed > timeout {
            warn!(
                method = invocation.method_name(),
                url = %next.url(),
                elapsed_ms = elapsed,
                timeout_ms = timeout,
                "invoke time out"
            );
        }
        result
    }
}
