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

//! Load balancers: picking one invoker out of a candidate list.
//!
//! Every balancer shares the same preamble: an empty list selects nothing and
//! a single candidate is returned as is. Weights are read per method from
//! the candidate URL (`weight`, default 100) and ramp up linearly over the
//! provider's `warmup` window after its start `timestamp`.

mod consistent_hash;
mod least_active;
mod random;
mod round_robin;

pub use consistent_hash::ConsistentHashLoadBalance;
pub use least_active::LeastActiveLoadBalance;
pub use random::RandomLoadBalance;
pub use round_robin::RoundRobinLoadBalance;

use crate::common::{constants, now_millis, HasUrl, Url};
use crate::rpc::{Invocation, Invoker};
use crate::spi;
use crate::RpcError;
use std::sync::Arc;

/// Picks the invoker an attempt goes to.
///
/// The adaptive balancer reads the method scoped `loadbalance` parameter of
/// the consumer URL.
#[spi(name = "drpc.cluster.LoadBalance", default = "random")]
pub trait LoadBalance: Send + Sync {
    /// Selects one of `invokers` for `invocation` on behalf of the consumer
    /// at `url`; `None` only when `invokers` is empty.
    ///
    /// # Errors
    ///
    /// Extension lookup failures of the adaptive balancer.
    #[adaptive("loadbalance")]
    fn select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        url: &Url,
        invocation: &Invocation,
    ) -> Result<Option<Arc<dyn Invoker>>, RpcError> {
        match invokers {
            [] => Ok(None),
            [only] => Ok(Some(Arc::clone(only))),
            _ => self.do_select(invokers, url, invocation).map(Some),
        }
    }

    /// Selects among two or more candidates.
    ///
    /// # Errors
    ///
    /// Implementation specific; the built-in balancers never fail.
    fn do_select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        url: &Url,
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>, RpcError>;
}

/// The effective weight of `invoker` for `invocation`, warm-up included.
pub fn weight(invoker: &dyn Invoker, invocation: &Invocation) -> i32 {
    let url = invoker.url();
    let weight = url.method_get(invocation.method_name(), constants::WEIGHT_KEY, constants::DEFAULT_WEIGHT);
    if weight <= 0 {
        return weight;
    }
    let timestamp: i64 = url.get(constants::TIMESTAMP_KEY, 0);
    if timestamp <= 0 {
        return weight;
    }
    let uptime = now_millis() - timestamp;
    let warmup: i64 = url.get(constants::WARMUP_KEY, constants::DEFAULT_WARMUP);
    if uptime > 0 && uptime < warmup {
        warmup_weight(uptime, warmup, weight)
    } else {
        weight
    }
}

/// Scales `weight` by how far `uptime` is into `warmup`, never below 1.
pub fn warmup_weight(uptime: i64, warmup: i64, weight: i32) -> i32 {
    let ramped = (uptime as f64 / (warmup as f64 / f64::from(weight))) as i32;
    ramped.clamp(1, weight.max(1))
}
