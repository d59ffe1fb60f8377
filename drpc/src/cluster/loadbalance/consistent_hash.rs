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

//! Consistent hashing over the invocation arguments.

use crate::cluster::loadbalance::LoadBalance;
use crate::common::{constants, HasUrl, Url};
use crate::rpc::{Invocation, Invoker};
use crate::RpcError;
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Sends calls with the same key arguments to the same provider.
///
/// Each provider is placed on a ring of 32-bit positions `hash.nodes` times
/// (default 160), four positions per MD5 digest of its full URL string
/// followed by the replica number. A call is keyed by the textual form of
/// the arguments listed in `hash.arguments` (default `0`) and goes to the
/// first ring position at or after the hash of that key, wrapping around.
///
/// Rings are cached per service method and rebuilt whenever the candidate
/// list changes.
#[derive(Default)]
pub struct ConsistentHashLoadBalance {
    selectors: DashMap<String, Arc<Selector>>,
}

impl std::fmt::Debug for ConsistentHashLoadBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistentHashLoadBalance")
            .field("selectors", &self.selectors.len())
            .finish()
    }
}

/// Reads ring position `number` (0..4) of `digest` as a little-endian `u32`.
pub fn ring_hash(digest: &[u8; 16], number: usize) -> u32 {
    let at = number * 4;
    u32::from_le_bytes([digest[at], digest[at + 1], digest[at + 2], digest[at + 3]])
}

/// MD5 of the UTF-8 bytes of `value`.
pub fn md5(value: &str) -> [u8; 16] {
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&Md5::digest(value.as_bytes()));
    digest
}

/// Identifies a candidate list by the invokers it holds.
fn identity(invokers: &[Arc<dyn Invoker>]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for invoker in invokers {
        (Arc::as_ptr(invoker) as *const () as usize).hash(&mut hasher);
    }
    hasher.finish()
}

struct Selector {
    identity: u64,
    ring: BTreeMap<u32, Arc<dyn Invoker>>,
    arguments: Vec<usize>,
}

impl Selector {
    fn new(invokers: &[Arc<dyn Invoker>], method: &str, identity: u64) -> Self {
        let url = invokers[0].url();
        let replicas = url.method_get(method, constants::HASH_NODES_KEY, constants::DEFAULT_HASH_NODES);
        let arguments = url
            .method_parameter_or(method, constants::HASH_ARGUMENTS_KEY, constants::DEFAULT_HASH_ARGUMENTS)
            .split(',')
            .filter_map(|index| index.trim().parse::<usize>().ok())
            .collect();

        let mut ring = BTreeMap::new();
        for invoker in invokers {
            let address = invoker.url().to_full_string();
            for replica in 0..replicas / 4 {
                let digest = md5(&format!("{address}{replica}"));
                for number in 0..4 {
                    ring.insert(ring_hash(&digest, number), Arc::clone(invoker));
                }
            }
        }
        Self {
            identity,
            ring,
            arguments,
        }
    }

    fn key(&self, invocation: &Invocation) -> String {
        let arguments = invocation.arguments();
        self.arguments
            .iter()
            .filter_map(|index| arguments.get(*index))
            .map(ToString::to_string)
            .collect()
    }

    fn select(&self, invocation: &Invocation) -> Option<Arc<dyn Invoker>> {
        let hash = ring_hash(&md5(&self.key(invocation)), 0);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, invoker)| Arc::clone(invoker))
    }
}

impl LoadBalance for ConsistentHashLoadBalance {
    fn do_select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        _url: &Url,
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>, RpcError> {
        let method = invocation.method_name();
        let key = format!("{}.{method}", invokers[0].url().service_key());
        let identity = identity(invokers);
        let cached = self
            .selectors
            .get(&key)
            .filter(|selector| selector.identity == identity)
            .map(|selector| Arc::clone(selector.value()));
        let selector = match cached {
            Some(selector) => selector,
            None => {
                let selector = Arc::new(Selector::new(invokers, method, identity));
                self.selectors.insert(key, Arc::clone(&selector));
                selector
            }
        };
        Ok(selector
            .select(invocation)
            .unwrap_or_else(|| Arc::clone(&invokers[0])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::loadbalance::tests::Stub;
    use crate::rpc::Value;

    fn user_call(user: &str) -> Invocation {
        Invocation::new("find", ["java.lang.String"], vec![Value::from(user)])
    }

    fn providers(count: usize) -> Vec<Arc<dyn Invoker>> {
        (1..=count)
            .map(|i| Stub::arc(&format!("dubbo://10.0.0.{i}:20880/acme.UserService")))
            .collect()
    }

    #[test]
    fn test_ring_hash_reads_little_endian() {
        let digest = md5("user-42");
        assert_eq!(digest[..4], [0x76, 0x31, 0xbc, 0x07]);
        assert_eq!(ring_hash(&digest, 0), 129_773_942);
        assert_eq!(ring_hash(&digest, 3), 1_128_987_570);
    }

    #[test]
    fn test_ring_size() {
        let selector = Selector::new(&providers(3), "find", 0);
        assert_eq!(selector.ring.len(), 3 * 160);
    }

    #[test]
    fn test_known_key_owner() {
        let lb = ConsistentHashLoadBalance::default();
        let url = Url::parse("consumer://10.0.0.9/acme.UserService").unwrap();
        let picked = lb.select(&providers(3), &url, &user_call("user-42")).unwrap().unwrap();
        assert_eq!(picked.url().host(), "10.0.0.1");
        let picked = lb.select(&providers(4), &url, &user_call("user-42")).unwrap().unwrap();
        assert_eq!(picked.url().host(), "10.0.0.1");
    }

    #[test]
    fn test_removal_only_moves_keys_of_removed_provider() {
        let (lb_all, lb_fewer) = (ConsistentHashLoadBalance::default(), ConsistentHashLoadBalance::default());
        let url = Url::parse("consumer://10.0.0.9/acme.UserService").unwrap();
        let all = providers(4);
        let fewer: Vec<_> = all[..3].to_vec();
        let mut moved = 0;
        for user in 0..1000 {
            let call = user_call(&format!("user-{user}"));
            let before = lb_all.select(&all, &url, &call).unwrap().unwrap();
            let after = lb_fewer.select(&fewer, &url, &call).unwrap().unwrap();
            if before.url().host() != after.url().host() {
                assert_eq!(before.url().host(), "10.0.0.4");
                moved += 1;
            }
        }
        assert!(moved < 400, "{moved}");
    }
}
