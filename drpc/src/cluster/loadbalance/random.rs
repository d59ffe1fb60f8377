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

//! Weighted random selection.

use crate::cluster::loadbalance::{weight, LoadBalance};
use crate::common::Url;
use crate::rpc::{Invocation, Invoker};
use crate::RpcError;
use rand::Rng;
use std::sync::Arc;

/// Picks uniformly when all weights are equal, otherwise proportionally to
/// the effective weights.
#[derive(Debug, Default)]
pub struct RandomLoadBalance;

/// The index `offset` falls on when `weights` are laid end to end.
pub(crate) fn weighted_index(weights: &[i32], offset: i64) -> Option<usize> {
    let mut remaining = offset;
    for (index, weight) in weights.iter().enumerate() {
        remaining -= i64::from(*weight);
        if remaining < 0 {
            return Some(index);
        }
    }
    None
}

impl LoadBalance for RandomLoadBalance {
    fn do_select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        _url: &Url,
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>, RpcError> {
        let weights: Vec<i32> = invokers.iter().map(|invoker| weight(&**invoker, invocation)).collect();
        let total: i64 = weights.iter().map(|w| i64::from(*w)).sum();
        let same = weights.windows(2).all(|pair| pair[0] == pair[1]);
        let mut rng = rand::thread_rng();
        if total > 0 && !same {
            if let Some(index) = weighted_index(&weights, rng.gen_range(0..total)) {
                return Ok(Arc::clone(&invokers[index]));
            }
        }
        Ok(Arc::clone(&invokers[rng.gen_range(0..invokers.len())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::loadbalance::tests::{call, Stub};
    use crate::common::{now_millis, HasUrl};
    use crate::rpc::contains_invoker;

    #[test]
    fn test_weighted_index() {
        let weights = [10, 0, 30];
        assert_eq!(weighted_index(&weights, 0), Some(0));
        assert_eq!(weighted_index(&weights, 9), Some(0));
        assert_eq!(weighted_index(&weights, 10), Some(2));
        assert_eq!(weighted_index(&weights, 39), Some(2));
        assert_eq!(weighted_index(&weights, 40), None);
    }

    #[test]
    fn test_selection_stays_in_list() {
        let invokers = vec![
            Stub::arc("dubbo://10.0.0.1:20880/acme.Greeter?weight=1"),
            Stub::arc("dubbo://10.0.0.2:20880/acme.Greeter?weight=5"),
            Stub::arc("dubbo://10.0.0.3:20880/acme.Greeter"),
        ];
        let url = Url::parse("consumer://10.0.0.9/acme.Greeter").unwrap();
        for _ in 0..200 {
            let picked = RandomLoadBalance.select(&invokers, &url, &call("hello")).unwrap().unwrap();
            assert!(contains_invoker(&invokers, &picked));
        }
    }

    #[test]
    fn test_zero_weight_is_never_picked_against_positive() {
        let invokers = vec![
            Stub::arc("dubbo://10.0.0.1:20880/acme.Greeter?weight=0"),
            Stub::arc("dubbo://10.0.0.2:20880/acme.Greeter?weight=10"),
        ];
        let url = Url::parse("consumer://10.0.0.9/acme.Greeter").unwrap();
        for _ in 0..200 {
            let picked = RandomLoadBalance.select(&invokers, &url, &call("hello")).unwrap().unwrap();
            assert_eq!(picked.url().host(), "10.0.0.2");
        }
    }

    #[test]
    fn test_warming_provider_gets_fewer_calls() {
        let now = now_millis();
        let warming = Stub::arc(&format!(
            "dubbo://10.0.0.1:20880/acme.Greeter?timestamp={}&warmup=600000",
            now - 60_000
        ));
        let warm = Stub::arc(&format!(
            "dubbo://10.0.0.2:20880/acme.Greeter?timestamp={}&warmup=600000",
            now - 700_000
        ));
        let invokers = vec![warming, warm];
        let url = Url::parse("consumer://10.0.0.9/acme.Greeter").unwrap();
        let mut warming_picks = 0;
        for _ in 0..10_000 {
            let picked = RandomLoadBalance.select(&invokers, &url, &call("hello")).unwrap().unwrap();
            if picked.url().host() == "10.0.0.1" {
                warming_picks += 1;
            }
        }
        // Expected 10/110 of the calls: about 909, sigma about 29.
        assert!((800..1020).contains(&warming_picks), "{warming_picks}");
    }
}
