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

//! Integration tests for cluster invokers and load balancers.
//!
//! These tests drive the public cluster API over scripted invokers:
//! - Sticky selection after the sticky provider goes away
//! - Failover retries and their exhaustion message
//! - Weighted random selection during warm-up
//! - Consistent hashing stability as providers join
//! - Adaptive dispatch matching the named extension

use async_trait::async_trait;
use drpc::cluster::support::{BroadcastCluster, FailoverCluster, ForkingCluster};
use drpc::cluster::{Cluster, Directory, LoadBalance, StaticDirectory};
use drpc::common::{now_millis, HasUrl, Url};
use drpc::extension::ExtensionRegistry;
use drpc::rpc::{Invocation, Invoker, RpcResult, Value};
use drpc::{RpcError, RpcErrorKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A provider whose availability and failures are scripted by the test.
struct Node {
    url: Url,
    available: AtomicBool,
    failure: Option<RpcErrorKind>,
    calls: AtomicUsize,
}

impl Node {
    fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Url::parse(url).unwrap(),
            available: AtomicBool::new(true),
            failure: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(url: &str, kind: RpcErrorKind) -> Arc<Self> {
        Arc::new(Self {
            url: Url::parse(url).unwrap(),
            available: AtomicBool::new(true),
            failure: Some(kind),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HasUrl for Node {
    fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Invoker for Node {
    fn interface(&self) -> &str {
        "acme.Greeter"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn invoke(&self, _invocation: &Invocation) -> Result<RpcResult, RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Some(kind) => Err(RpcError::new(kind, format!("{} refused", self.url.address()))),
            None => Ok(RpcResult::new(Value::from(self.url.address()))),
        }
    }

    fn destroy(&self) {
        self.available.store(false, Ordering::SeqCst);
    }
}

fn as_invokers(nodes: &[Arc<Node>]) -> Vec<Arc<dyn Invoker>> {
    nodes.iter().map(|node| Arc::clone(node) as Arc<dyn Invoker>).collect()
}

fn join(cluster: &dyn Cluster, url: &str, nodes: &[Arc<Node>]) -> Arc<dyn Invoker> {
    let directory: Arc<dyn Directory> = Arc::new(StaticDirectory::new(Url::parse(url).unwrap(), as_invokers(nodes)));
    cluster.join(directory).unwrap()
}

fn greet() -> Invocation {
    Invocation::new("greet", ["java.lang.String"], vec![Value::from("ada")])
}

#[tokio::test]
async fn test_sticky_moves_off_unavailable_provider() {
    let extensions = ExtensionRegistry::new();
    let nodes = vec![
        Node::new("dubbo://10.0.0.1:20880/acme.Greeter?sticky=true"),
        Node::new("dubbo://10.0.0.2:20880/acme.Greeter?sticky=true"),
        Node::new("dubbo://10.0.0.3:20880/acme.Greeter?sticky=true"),
    ];
    let cluster = FailoverCluster::new(extensions.loader::<dyn LoadBalance>());
    let invoker = join(&cluster, "dubbo://10.0.0.9/acme.Greeter", &nodes);

    let first = invoker.invoke(&greet()).await.unwrap().value().to_string();
    for _ in 0..10 {
        let again = invoker.invoke(&greet()).await.unwrap().value().to_string();
        assert_eq!(again, first);
    }

    let sticky = nodes.iter().find(|node| node.url.address() == first).unwrap();
    sticky.available.store(false, Ordering::SeqCst);
    let moved = invoker.invoke(&greet()).await.unwrap().value().to_string();
    assert_ne!(moved, first);

    for _ in 0..10 {
        let again = invoker.invoke(&greet()).await.unwrap().value().to_string();
        assert_eq!(again, moved);
    }
}

#[tokio::test]
async fn test_failover_exhaustion_cites_every_provider() {
    let extensions = ExtensionRegistry::new();
    let nodes = vec![
        Node::failing("dubbo://10.0.0.1:20880/acme.Greeter", RpcErrorKind::Network),
        Node::failing("dubbo://10.0.0.2:20880/acme.Greeter", RpcErrorKind::Network),
    ];
    let cluster = FailoverCluster::new(extensions.loader::<dyn LoadBalance>());
    let invoker = join(&cluster, "dubbo://10.0.0.9/acme.Greeter?retries=2", &nodes);

    let err = invoker.invoke(&greet()).await.unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::Network);
    assert!(err.message().contains("Tried 3 times"), "{err}");
    assert!(err.message().contains("10.0.0.1:20880"), "{err}");
    assert!(err.message().contains("10.0.0.2:20880"), "{err}");
    assert_eq!(nodes[0].calls() + nodes[1].calls(), 3);
}

#[tokio::test]
async fn test_failover_reaches_surviving_provider() {
    let extensions = ExtensionRegistry::new();
    let nodes = vec![
        Node::failing("dubbo://10.0.0.1:20880/acme.Greeter", RpcErrorKind::Timeout),
        Node::failing("dubbo://10.0.0.2:20880/acme.Greeter", RpcErrorKind::Network),
        Node::new("dubbo://10.0.0.3:20880/acme.Greeter"),
    ];
    let cluster = FailoverCluster::new(extensions.loader::<dyn LoadBalance>());
    let invoker = join(&cluster, "dubbo://10.0.0.9/acme.Greeter?retries=2", &nodes);

    for _ in 0..20 {
        let result = invoker.invoke(&greet()).await.unwrap();
        assert_eq!(result.value(), &Value::from("10.0.0.3:20880"));
    }
    // no provider is tried twice within one call
    assert!(nodes[0].calls() <= 20);
    assert!(nodes[1].calls() <= 20);
}

#[tokio::test]
async fn test_biz_failures_are_not_retried() {
    let extensions = ExtensionRegistry::new();
    let nodes = vec![
        Node::failing("dubbo://10.0.0.1:20880/acme.Greeter", RpcErrorKind::Biz),
        Node::failing("dubbo://10.0.0.2:20880/acme.Greeter", RpcErrorKind::Biz),
    ];
    let cluster = FailoverCluster::new(extensions.loader::<dyn LoadBalance>());
    let invoker = join(&cluster, "dubbo://10.0.0.9/acme.Greeter?retries=5", &nodes);

    let err = invoker.invoke(&greet()).await.unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::Biz);
    assert_eq!(nodes[0].calls() + nodes[1].calls(), 1);
}

#[tokio::test]
async fn test_broadcast_calls_everyone() {
    let extensions = ExtensionRegistry::new();
    let nodes = vec![
        Node::new("dubbo://10.0.0.1:20880/acme.Greeter"),
        Node::failing("dubbo://10.0.0.2:20880/acme.Greeter", RpcErrorKind::Network),
        Node::new("dubbo://10.0.0.3:20880/acme.Greeter"),
    ];
    let cluster = BroadcastCluster::new(extensions.loader::<dyn LoadBalance>());
    let invoker = join(&cluster, "dubbo://10.0.0.9/acme.Greeter", &nodes);

    let err = invoker.invoke(&greet()).await.unwrap_err();
    assert_eq!(err.kind(), RpcErrorKind::Network);
    assert!(nodes.iter().all(|node| node.calls() == 1));
}

#[tokio::test]
async fn test_forking_returns_first_success() {
    let extensions = ExtensionRegistry::new();
    let nodes = vec![
        Node::failing("dubbo://10.0.0.1:20880/acme.Greeter", RpcErrorKind::Network),
        Node::new("dubbo://10.0.0.2:20880/acme.Greeter"),
    ];
    let cluster = ForkingCluster::new(extensions.loader::<dyn LoadBalance>());
    let invoker = join(&cluster, "dubbo://10.0.0.9/acme.Greeter?forks=0&timeout=1000", &nodes);

    let result = invoker.invoke(&greet()).await.unwrap();
    assert_eq!(result.value(), &Value::from("10.0.0.2:20880"));
}

#[tokio::test]
async fn test_destroyed_cluster_refuses_calls() {
    let extensions = ExtensionRegistry::new();
    let nodes = vec![Node::new("dubbo://10.0.0.1:20880/acme.Greeter")];
    let cluster = FailoverCluster::new(extensions.loader::<dyn LoadBalance>());
    let invoker = join(&cluster, "dubbo://10.0.0.9/acme.Greeter", &nodes);

    invoker.destroy();
    invoker.destroy();
    let err = invoker.invoke(&greet()).await.unwrap_err();
    assert!(err.message().contains("is now destroyed"), "{err}");
    assert!(!nodes[0].is_available());
}

#[test]
fn test_warmup_weights_random_selection() {
    let extensions = ExtensionRegistry::new();
    let random = extensions.loader::<dyn LoadBalance>().get_extension("random").unwrap();
    let now = now_millis();
    let warming = Node::new(&format!(
        "dubbo://10.0.0.1:20880/acme.Greeter?weight=100&warmup=600000&timestamp={}",
        now - 60_000
    ));
    let warm = Node::new(&format!(
        "dubbo://10.0.0.2:20880/acme.Greeter?weight=100&warmup=600000&timestamp={}",
        now - 700_000
    ));
    let invokers = as_invokers(&[warming.clone(), warm]);
    let url = Url::parse("dubbo://10.0.0.9/acme.Greeter").unwrap();

    let mut warming_picks = 0;
    for _ in 0..10_000 {
        let picked = random.select(&invokers, &url, &greet()).unwrap().unwrap();
        if picked.url() == warming.url() {
            warming_picks += 1;
        }
    }
    // 10:100 weights give an expected 909 picks with a deviation near 29
    assert!((800..=1020).contains(&warming_picks), "{warming_picks}");
}

#[test]
fn test_every_balancer_returns_a_candidate() {
    let extensions = ExtensionRegistry::new();
    let loader = extensions.loader::<dyn LoadBalance>();
    let nodes: Vec<Arc<Node>> = (1..=5)
        .map(|i| Node::new(&format!("dubbo://10.0.0.{i}:20880/acme.Greeter?weight={}", i * 10)))
        .collect();
    let invokers = as_invokers(&nodes);
    let url = Url::parse("dubbo://10.0.0.9/acme.Greeter").unwrap();

    for name in loader.supported_extensions().unwrap() {
        let balancer = loader.get_extension(&name).unwrap();
        for len in 1..=invokers.len() {
            let candidates = &invokers[..len];
            let picked = balancer.select(candidates, &url, &greet()).unwrap().unwrap();
            assert!(
                candidates.iter().any(|c| Arc::ptr_eq(c, &picked)),
                "{name} picked outside the candidates"
            );
        }
        assert!(balancer.select(&[], &url, &greet()).unwrap().is_none());
    }
}

#[test]
fn test_consistent_hash_survives_a_joining_provider() {
    // separate registries keep one ring per provider set
    let (small, large) = (ExtensionRegistry::new(), ExtensionRegistry::new());
    let before_ring = small.loader::<dyn LoadBalance>().get_extension("consistenthash").unwrap();
    let after_ring = large.loader::<dyn LoadBalance>().get_extension("consistenthash").unwrap();
    let url = Url::parse("dubbo://10.0.0.9/acme.Greeter").unwrap();
    let nodes: Vec<Arc<Node>> = (1..=4)
        .map(|i| Node::new(&format!("dubbo://10.0.0.{i}:20880/acme.Greeter?hash.nodes=160")))
        .collect();
    let three = as_invokers(&nodes[..3]);
    let four = as_invokers(&nodes);

    let mut moved = 0;
    for key in 0..1000 {
        let invocation = Invocation::new("find", ["java.lang.String"], vec![Value::from(format!("user-{key}"))]);
        let before = before_ring.select(&three, &url, &invocation).unwrap().unwrap();
        let again = before_ring.select(&three, &url, &invocation).unwrap().unwrap();
        assert!(Arc::ptr_eq(&before, &again));

        let after = after_ring.select(&four, &url, &invocation).unwrap().unwrap();
        if !Arc::ptr_eq(&before, &after) {
            assert_eq!(after.url(), nodes[3].url(), "a key moved between surviving providers");
            moved += 1;
        }
    }
    // the newcomer takes roughly a quarter of the keyspace
    assert!((100..=450).contains(&moved), "{moved}");
}

#[test]
fn test_adaptive_balancer_matches_named_extension() {
    let extensions = ExtensionRegistry::new();
    let loader = extensions.loader::<dyn LoadBalance>();
    let adaptive = loader.adaptive_extension().unwrap();
    let nodes: Vec<Arc<Node>> = (1..=4)
        .map(|i| Node::new(&format!("dubbo://10.0.0.{i}:20880/acme.Greeter")))
        .collect();
    let invokers = as_invokers(&nodes);
    let url = Url::parse("dubbo://10.0.0.9/acme.Greeter?loadbalance=consistenthash").unwrap();
    let named = loader.get_extension("consistenthash").unwrap();

    for key in 0..50 {
        let invocation = Invocation::new("find", ["java.lang.String"], vec![Value::from(format!("k{key}"))]);
        let via_adaptive = adaptive.select(&invokers, &url, &invocation).unwrap().unwrap();
        let via_name = named.select(&invokers, &url, &invocation).unwrap().unwrap();
        assert!(Arc::ptr_eq(&via_adaptive, &via_name));
    }
    assert!(Arc::ptr_eq(&named, &loader.get_extension("consistenthash").unwrap()));
}

#[test]
fn test_adaptive_cluster_reads_directory_url() {
    let extensions = ExtensionRegistry::new();
    let cluster = extensions.loader::<dyn Cluster>().adaptive_extension().unwrap();
    let nodes = vec![Node::new("dubbo://10.0.0.1:20880/acme.Greeter")];
    let directory: Arc<dyn Directory> = Arc::new(StaticDirectory::new(
        Url::parse("dubbo://10.0.0.9/acme.Greeter?cluster=nosuch").unwrap(),
        as_invokers(&nodes),
    ));
    assert!(cluster.join(directory).is_err());
}
