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

//! Selection cost of every load balancer over growing provider lists.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drpc::cluster::LoadBalance;
use drpc::common::{HasUrl, Url};
use drpc::extension::ExtensionRegistry;
use drpc::rpc::{Invocation, Invoker, RpcResult, Value};
use drpc::RpcError;
use std::sync::Arc;

struct Provider(Url);

impl HasUrl for Provider {
    fn url(&self) -> &Url {
        &self.0
    }
}

#[async_trait]
impl Invoker for Provider {
    fn interface(&self) -> &str {
        "bench.Service"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn invoke(&self, _invocation: &Invocation) -> Result<RpcResult, RpcError> {
        Ok(RpcResult::empty())
    }

    fn destroy(&self) {}
}

fn providers(count: usize) -> Vec<Arc<dyn Invoker>> {
    (0..count)
        .map(|i| {
            let url = Url::new("dubbo", format!("10.0.{}.{}", i / 250, i % 250 + 1), 20880, "bench.Service")
                .with_parameter("weight", 100 + (i % 3) * 50);
            Arc::new(Provider(url)) as Arc<dyn Invoker>
        })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let extensions = ExtensionRegistry::new();
    let loader = extensions.loader::<dyn LoadBalance>();
    let consumer = Url::new("consumer", "127.0.0.1", 0, "bench.Service");

    for name in ["random", "roundrobin", "leastactive", "consistenthash"] {
        let mut group = c.benchmark_group(format!("select_{name}"));
        let balancer = loader.get_extension(name).unwrap();
        for count in [3, 30, 300] {
            let invokers = providers(count);
            group.bench_with_input(BenchmarkId::from_parameter(count), &invokers, |b, invokers| {
                let mut n = 0i64;
                b.iter(|| {
                    n += 1;
                    let invocation = Invocation::new("get", ["long"], vec![Value::from(n)]);
                    black_box(balancer.select(invokers, &consumer, &invocation).unwrap())
                });
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
