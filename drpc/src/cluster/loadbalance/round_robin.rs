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

//! Smooth weighted round robin.

use crate::cluster::loadbalance::{weight, LoadBalance};
use crate::common::{HasUrl, Url};
use crate::rpc::{Invocation, Invoker};
use crate::RpcError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Slots not selected from for this long are forgotten.
const RECYCLE_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Slot {
    weight: i32,
    current: i64,
    updated: Instant,
}

#[derive(Debug, Default)]
struct Rotation {
    slots: HashMap<String, Slot>,
    // Plain rotation used while every candidate weighs 0.
    sequence: usize,
}

/// Cycles through the candidates in proportion to their weights.
///
/// Each service method keeps one running counter per provider. Every pick
/// adds each provider's weight to its counter, selects the largest counter
/// and subtracts the total weight from it, so a provider of weight 1 next to
/// one of weight 9 is still chosen once every ten calls.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalance {
    methods: DashMap<String, Arc<Mutex<Rotation>>>,
}

impl LoadBalance for RoundRobinLoadBalance {
    fn do_select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        _url: &Url,
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>, RpcError> {
        let key = format!("{}.{}", invokers[0].url().service_key(), invocation.method_name());
        let rotation = Arc::clone(self.methods.entry(key).or_default().value());
        let mut rotation = rotation.lock();
        let Rotation { slots, sequence } = &mut *rotation;
        let now = Instant::now();

        let mut total = 0i64;
        let mut best: Option<(usize, String, i64)> = None;
        for (index, invoker) in invokers.iter().enumerate() {
            let identity = invoker.url().to_identity_string();
            let weight = weight(&**invoker, invocation);
            let slot = slots.entry(identity.clone()).or_insert(Slot {
                weight,
                current: 0,
                updated: now,
            });
            if slot.weight != weight {
                slot.weight = weight;
                slot.current = 0;
            }
            slot.current += i64::from(weight);
            slot.updated = now;
            total += i64::from(weight);
            if best.as_ref().map_or(true, |(_, _, current)| slot.current > *current) {
                best = Some((index, identity, slot.current));
            }
        }
        if slots.len() != invokers.len() {
            slots.retain(|_, slot| now.duration_since(slot.updated) < RECYCLE_PERIOD);
        }

        if total <= 0 {
            let index = *sequence % invokers.len();
            *sequence = sequence.wrapping_add(1);
            return Ok(Arc::clone(&invokers[index]));
        }

        let (index, identity, _) = best.unwrap_or((0, String::new(), 0));
        if let Some(slot) = slots.get_mut(&identity) {
            slot.current -= total;
        }
        Ok(Arc::clone(&invokers[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::loadbalance::tests::{call, Stub};

    fn picks(lb: &RoundRobinLoadBalance, invokers: &[Arc<dyn Invoker>], rounds: usize) -> Vec<String> {
        let url = Url::parse("consumer://10.0.0.9/acme.Greeter").unwrap();
        (0..rounds)
            .map(|_| {
                lb.select(invokers, &url, &call("hello"))
                    .unwrap()
                    .unwrap()
                    .url()
                    .host()
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_equal_weights_alternate() {
        let invokers = vec![
            Stub::arc("dubbo://10.0.0.1:20880/acme.Greeter"),
            Stub::arc("dubbo://10.0.0.2:20880/acme.Greeter"),
        ];
        let hosts = picks(&RoundRobinLoadBalance::default(), &invokers, 4);
        assert_eq!(hosts, ["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_weights_are_respected_without_starvation() {
        let invokers = vec![
            Stub::arc("dubbo://10.0.0.1:20880/acme.Greeter?weight=1"),
            Stub::arc("dubbo://10.0.0.2:20880/acme.Greeter?weight=9"),
        ];
        let hosts = picks(&RoundRobinLoadBalance::default(), &invokers, 10);
        assert_eq!(hosts.iter().filter(|h| *h == "10.0.0.1").count(), 1);
        assert_eq!(hosts.iter().filter(|h| *h == "10.0.0.2").count(), 9);
        // The light provider is interleaved, not left for the end.
        assert_ne!(hosts[9], "10.0.0.1");
    }

    #[test]
    fn test_all_zero_weights_still_rotate() {
        let invokers = vec![
            Stub::arc("dubbo://10.0.0.1:20880/acme.Greeter?weight=0"),
            Stub::arc("dubbo://10.0.0.2:20880/acme.Greeter?weight=0"),
            Stub::arc("dubbo://10.0.0.3:20880/acme.Greeter?weight=0"),
        ];
        let hosts = picks(&RoundRobinLoadBalance::default(), &invokers, 6);
        assert_eq!(
            hosts,
            ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
    }
}
