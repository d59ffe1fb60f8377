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

//! Frame encode and decode throughput per serialization and argument size.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use drpc::common::Url;
use drpc::extension::ExtensionRegistry;
use drpc::protocol::DubboCodec;
use drpc::remoting::{ExchangeCodec, Message, Payload, Request};
use drpc::rpc::{Invocation, Value};
use drpc::serialization::Serialization;
use std::sync::Arc;

fn serializations() -> Vec<&'static str> {
    let mut names = vec!["json"];
    if cfg!(feature = "postcard") {
        names.push("postcard");
    }
    names
}

fn request(size: usize) -> Message {
    let invocation = Invocation::new("upload", ["java.lang.String"], vec![Value::from("x".repeat(size))])
        .with_attachment("path", "bench.Service")
        .with_attachment("version", "1.0.0");
    Request::with_id(1, Payload::Invocation(invocation)).into()
}

fn bench_codec(c: &mut Criterion) {
    let extensions = ExtensionRegistry::new();
    let codec = ExchangeCodec::new(Arc::new(DubboCodec), extensions.loader::<dyn Serialization>());

    for serialization in serializations() {
        let url = Url::new("dubbo", "127.0.0.1", 20880, "bench.Service").with_parameter("serialization", serialization);
        let mut group = c.benchmark_group(format!("codec_{serialization}"));
        for size in [64usize, 1024, 16 * 1024] {
            let message = request(size);
            let mut frame = BytesMut::new();
            codec.encode(&url, &message, &mut frame).unwrap();
            group.throughput(Throughput::Bytes(frame.len() as u64));

            group.bench_with_input(BenchmarkId::new("encode", size), &message, |b, message| {
                let mut dst = BytesMut::with_capacity(frame.len());
                b.iter(|| {
                    dst.clear();
                    codec.encode(&url, message, &mut dst).unwrap();
                    black_box(dst.len())
                });
            });

            group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, frame| {
                b.iter(|| {
                    let mut src = frame.clone();
                    black_box(codec.decode(&url, &mut src).unwrap())
                });
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
