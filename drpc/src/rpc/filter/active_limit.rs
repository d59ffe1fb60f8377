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
use crate::rpc::{Invocation, Invoker, RpcResult, RpcStatus};
use crate::RpcError;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Counts calls in flight per provider and method, and holds a call back
/// while the `actives` limit is reached.
///
/// The counters feed the least-active load balancer.
#[derive(Debug, Default)]
pub struct ActiveLimitFilter;

#[async_trait]
impl Filter for ActiveLimitFilter {
    async fn invoke(&self, next: &dyn Invoker, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        let url = next.url();
        let method = invocation.method_name();
        let max = url.method_get(method, constants::ACTIVES_KEY, 0i64);
        let status = RpcStatus::of_method(url, method);

        if max > 0 {
            let timeout = Duration::from_millis(url.method_get(
                method,
                constants::TIMEOUT_KEY,
                constants::DEFAULT_TIMEOUT,
            ));
            let start = Instant::now();
            loop {
                let released = status.released();
                tokio::pin!(released);
                released.as_mut().enable();
                let active = status.active();
                if active < max {
                    break;
                }
                let remaining = timeout.saturating_sub(start.elapsed());
                if remaining.is_zero()
                    || tokio::time::timeout(remaining, released).await.is_err()
                {
                    return Err(RpcError::unknown(format!(
                        "Waiting concurrent invoke timeout in client-side for service: {}, method: {}, elapsed: {}, timeout: {}. concurrent invokes: {}. max concurrent invoke limit: {}",
                        next.interface(),
                        method,
                        start.elapsed().as_millis(),
                        timeout.as_millis(),
                        active,
                        max
                    )));
                }
            }
        }

        let start = Instant::now();
        RpcStatus::begin_count(url, method);
        let result = next.invoke(invocation).await;
        RpcStatus::end_count(url, method, start.elapsed(), result.is_ok());
        result
    }
}
