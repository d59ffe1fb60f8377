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

//! Least-active selection.

use crate::cluster::loadbalance::random::weighted_index;
use crate::cluster::loadbalance::{weight, LoadBalance};
use crate::common::{HasUrl, Url};
use crate::rpc::{Invocation, Invoker, RpcStatus};
use crate::RpcError;
use rand::Rng;
use std::sync::Arc;

/// Prefers the candidate with the fewest outstanding calls to the invoked
/// method, breaking ties by weighted random choice.
///
/// Outstanding calls are counted by the consumer side `activelimit` filter
/// in [`RpcStatus`].
#[derive(Debug, Default)]
pub struct LeastActiveLoadBalance;

impl LoadBalance for LeastActiveLoadBalance {
    fn do_select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        _url: &Url,
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>, RpcError> {
        let method = invocation.method_name();
        let mut least_active = i64::MAX;
        let mut least: Vec<usize> = Vec::with_capacity(invokers.len());
        let mut weights: Vec<i32> = Vec::with_capacity(invokers.len());
        for (index, invoker) in invokers.iter().enumerate() {
            let active = RpcStatus::of_method(invoker.url(), method).active();
            let weight = weight(&**invoker, invocation);
            if active < least_active {
                least_active = active;
                least.clear();
                weights.clear();
            }
            if active == least_active {
                least.push(index);
                weights.push(weight);
            }
        }

        if let [only] = least.as_slice() {
            return Ok(Arc::clone(&invokers[*only]));
        }
        let total: i64 = weights.iter().map(|w| i64::from(*w)).sum();
        let same = weights.windows(2).all(|pair| pair[0] == pair[1]);
        let mut rng = rand::thread_rng();
        if total > 0 && !same {
            if let Some(position) = weighted_index(&weights, rng.gen_range(0..total)) {
                return Ok(Arc::clone(&invokers[least[position]]));
            }
        }
        Ok(Arc::clone(&invokers[least[rng.gen_range(0..least.len())]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::loadbalance::tests::{call, Stub};

    #[test]
    fn test_prefers_idle_provider() {
        let busy = Stub::arc("dubbo://10.1.0.1:20880/acme.LeastActive");
        let idle = Stub::arc("dubbo://10.1.0.2:20880/acme.LeastActive");
        RpcStatus::begin_count(busy.url(), "query");
        RpcStatus::begin_count(busy.url(), "query");

        let url = Url::parse("consumer://10.0.0.9/acme.LeastActive").unwrap();
        let invokers = vec![busy, idle];
        for _ in 0..50 {
            let picked = LeastActiveLoadBalance.select(&invokers, &url, &call("query")).unwrap().unwrap();
            assert_eq!(picked.url().host(), "10.1.0.2");
        }
    }

    #[test]
    fn test_ties_spread_over_tied_set() {
        let invokers = vec![
            Stub::arc("dubbo://10.2.0.1:20880/acme.LeastActive"),
            Stub::arc("dubbo://10.2.0.2:20880/acme.LeastActive"),
        ];
        let url = Url::parse("consumer://10.0.0.9/acme.LeastActive").unwrap();
        let mut first = 0;
        for _ in 0..400 {
            let picked = LeastActiveLoadBalance.select(&invokers, &url, &call("list")).unwrap().unwrap();
            if picked.url().host() == "10.2.0.1" {
                first += 1;
            }
        }
        assert!((100..300).contains(&first), "{first}");
    }
}
