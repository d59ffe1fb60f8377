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

//! Integration tests for request/response correlation over TCP.
//!
//! These tests verify that the exchange layer correctly handles:
//! - Concurrent calls answered out of order
//! - Service failures reported through the response status
//! - Timeouts that leave later responses unmatched
//! - Closing a client with calls outstanding

use async_trait::async_trait;
use drpc::common::Url;
use drpc::extension::ExtensionRegistry;
use drpc::protocol::DubboCodec;
use drpc::remoting::exchange::{response_result, ExchangeClient, ExchangeConfig, ExchangeHandler, ExchangeServer};
use drpc::remoting::{AllDispatcher, CachedThreadPool, Channel, DirectDispatcher, ExchangeCodec, RemotingError, Status};
use drpc::rpc::{Invocation, RpcResult, Value};
use drpc::serialization::Serialization;
use drpc::{RpcError, RpcErrorKind};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sleeps for the requested number of milliseconds, then echoes it back.
struct Sleeper {
    calls: AtomicU64,
}

#[async_trait]
impl ExchangeHandler for Sleeper {
    async fn reply(&self, _channel: &Channel, invocation: Invocation) -> Result<RpcResult, RpcError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match invocation.method_name() {
            "sleep" => {
                let millis = invocation.arguments().first().and_then(Value::as_i64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(millis as u64)).await;
                Ok(RpcResult::new(Value::from(millis)))
            }
            other => Err(RpcError::new(RpcErrorKind::Unknown, format!("no method {other}"))),
        }
    }
}

/// Ignores every server-initiated call.
struct Silent;

#[async_trait]
impl ExchangeHandler for Silent {
    async fn reply(&self, _channel: &Channel, _invocation: Invocation) -> Result<RpcResult, RpcError> {
        Ok(RpcResult::empty())
    }
}

fn codec() -> Arc<ExchangeCodec> {
    let extensions = ExtensionRegistry::global();
    Arc::new(ExchangeCodec::new(Arc::new(DubboCodec), extensions.loader::<dyn Serialization>()))
}

fn free_url() -> Url {
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    Url::new("dubbo", "127.0.0.1", port, "acme.Sleeper").with_parameter("heartbeat", 0)
}

async fn start() -> (ExchangeServer, ExchangeClient, Arc<Sleeper>) {
    let url = free_url();
    let sleeper = Arc::new(Sleeper {
        calls: AtomicU64::new(0),
    });
    let server = ExchangeServer::bind(
        &url,
        codec(),
        sleeper.clone(),
        &AllDispatcher::new(Arc::new(CachedThreadPool)),
    )
    .await
    .unwrap();
    let client = ExchangeClient::connect(&url, codec(), Arc::new(Silent), &DirectDispatcher, ExchangeConfig::default())
        .await
        .unwrap();
    (server, client, sleeper)
}

fn sleep_for(millis: i64) -> Invocation {
    Invocation::new("sleep", ["long"], vec![Value::from(millis)])
}

#[tokio::test]
async fn test_concurrent_calls_match_their_responses() {
    let (server, client, sleeper) = start().await;

    let mut futures = Vec::new();
    for millis in [120, 10, 60, 0, 90] {
        let future = client.request(sleep_for(millis), Duration::from_secs(5)).await.unwrap();
        futures.push((millis, future));
    }
    let ids: Vec<u64> = futures.iter().map(|(_, future)| future.id()).collect();
    assert!(ids.windows(2).all(|pair| pair[0] != pair[1]));

    for (millis, future) in futures {
        let response = future.await.unwrap();
        let result = response_result(response).unwrap();
        assert_eq!(result.value(), &Value::from(millis));
    }
    assert_eq!(sleeper.calls.load(Ordering::Relaxed), 5);
    assert_eq!(client.pending(), 0);

    client.close();
    server.close();
}

#[tokio::test]
async fn test_service_failure_carries_status() {
    let (server, client, _) = start().await;

    let invocation = Invocation::new("explode", Vec::<String>::new(), Vec::new());
    let response = client.request(invocation, Duration::from_secs(5)).await.unwrap().await.unwrap();
    assert_eq!(response.status, Status::SERVICE_ERROR);
    assert!(response.error_message.as_deref().unwrap_or_default().contains("no method explode"));
    assert!(matches!(response_result(response), Err(RemotingError::Status { .. })));

    client.close();
    server.close();
}

#[tokio::test]
async fn test_timeout_fires_before_slow_response() {
    let (server, client, _) = start().await;

    let slow = client.request(sleep_for(400), Duration::from_millis(50)).await.unwrap();
    let err = slow.await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert!(err.to_string().contains("127.0.0.1"), "{err}");

    // the late answer to the expired request is dropped; the connection stays usable
    let fast = client.request(sleep_for(0), Duration::from_secs(5)).await.unwrap();
    let result = response_result(fast.await.unwrap()).unwrap();
    assert_eq!(result.value(), &Value::from(0));

    client.close();
    server.close();
}

#[tokio::test]
async fn test_close_fails_outstanding_calls() {
    let (server, client, _) = start().await;

    let pending = client.request(sleep_for(1000), Duration::from_secs(5)).await.unwrap();
    assert_eq!(client.pending(), 1);
    client.close();
    assert!(client.is_closed());
    assert!(pending.await.is_err());
    assert!(client.request(sleep_for(0), Duration::from_secs(1)).await.is_err());

    server.close();
}
