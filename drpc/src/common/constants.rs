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

//! Parameter names and defaults read from URLs.
//!
//! Every component reads its options from a [`Url`](crate::common::Url); the
//! names below are the keys it looks up and the values it falls back to.

#![allow(missing_docs)]

// Sides and categories
pub const SIDE_KEY: &str = "side";
pub const PROVIDER_SIDE: &str = "provider";
pub const CONSUMER_SIDE: &str = "consumer";
pub const PROVIDER: &str = "provider";
pub const CONSUMER: &str = "consumer";
pub const CATEGORY_KEY: &str = "category";
pub const PROVIDERS_CATEGORY: &str = "providers";
pub const CONSUMERS_CATEGORY: &str = "consumers";
pub const ROUTERS_CATEGORY: &str = "routers";
pub const DEFAULT_CATEGORY: &str = PROVIDERS_CATEGORY;

// Service identity
pub const INTERFACE_KEY: &str = "interface";
pub const PATH_KEY: &str = "path";
pub const GROUP_KEY: &str = "group";
pub const VERSION_KEY: &str = "version";
pub const DEFAULT_SERVICE_VERSION: &str = "0.0.0";
pub const METHODS_KEY: &str = "methods";
pub const ANY_VALUE: &str = "*";
pub const ANYHOST_KEY: &str = "anyhost";
pub const ANYHOST_VALUE: &str = "0.0.0.0";
pub const LOCALHOST_VALUE: &str = "127.0.0.1";
pub const ENABLED_KEY: &str = "enabled";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const REMOTE_TIMESTAMP_KEY: &str = "remote.timestamp";
pub const PID_KEY: &str = "pid";
pub const DUBBO_VERSION_KEY: &str = "dubbo";
pub const RELEASE_KEY: &str = "release";
pub const TOKEN_KEY: &str = "token";

// Load balancing
pub const LOADBALANCE_KEY: &str = "loadbalance";
pub const DEFAULT_LOADBALANCE: &str = "random";
pub const WEIGHT_KEY: &str = "weight";
pub const DEFAULT_WEIGHT: i32 = 100;
pub const WARMUP_KEY: &str = "warmup";
pub const DEFAULT_WARMUP: i64 = 10 * 60 * 1000;
pub const HASH_NODES_KEY: &str = "hash.nodes";
pub const DEFAULT_HASH_NODES: usize = 160;
pub const HASH_ARGUMENTS_KEY: &str = "hash.arguments";
pub const DEFAULT_HASH_ARGUMENTS: &str = "0";

// Cluster
pub const CLUSTER_KEY: &str = "cluster";
pub const DEFAULT_CLUSTER: &str = "failover";
pub const RETRIES_KEY: &str = "retries";
pub const DEFAULT_RETRIES: i32 = 2;
pub const STICKY_KEY: &str = "sticky";
pub const DEFAULT_STICKY: bool = false;
pub const CLUSTER_AVAILABLE_CHECK_KEY: &str = "cluster.availablecheck";
pub const DEFAULT_CLUSTER_AVAILABLE_CHECK: bool = true;
pub const FORKS_KEY: &str = "forks";
pub const DEFAULT_FORKS: usize = 2;
pub const FAILBACK_RETRY_PERIOD_MS: u64 = 5000;
pub const CHECK_KEY: &str = "check";
pub const ROUTER_KEY: &str = "router";
pub const RULE_KEY: &str = "rule";
pub const FORCE_KEY: &str = "force";
pub const PRIORITY_KEY: &str = "priority";

// Invocation
pub const TIMEOUT_KEY: &str = "timeout";
pub const DEFAULT_TIMEOUT: u64 = 1000;
pub const ASYNC_KEY: &str = "async";
pub const RETURN_KEY: &str = "return";
pub const SENT_KEY: &str = "sent";
pub const ACTIVES_KEY: &str = "actives";
pub const CONNECT_TIMEOUT_KEY: &str = "connect.timeout";
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 3000;
pub const CONNECTIONS_KEY: &str = "connections";
pub const SERVICE_FILTER_KEY: &str = "service.filter";
pub const REFERENCE_FILTER_KEY: &str = "reference.filter";
pub const ECHO_METHOD: &str = "$echo";

// Protocols and registries
pub const PROTOCOL_KEY: &str = "protocol";
pub const DEFAULT_PROTOCOL: &str = "dubbo";
pub const DUBBO_PROTOCOL: &str = "dubbo";
pub const INJVM_PROTOCOL: &str = "injvm";
pub const REGISTRY_PROTOCOL: &str = "registry";
pub const EMPTY_PROTOCOL: &str = "empty";
pub const ROUTE_PROTOCOL: &str = "route";
pub const CONDITION_PROTOCOL: &str = "condition";
pub const REGISTRY_KEY: &str = "registry";
pub const DEFAULT_REGISTRY: &str = "memory";
pub const EXPORT_KEY: &str = "export";
pub const REFER_KEY: &str = "refer";
pub const REGISTER_KEY: &str = "register";
pub const DEFAULT_DUBBO_PORT: u16 = 20880;
pub const PROXY_KEY: &str = "proxy";

// Exchange and transport
pub const HEARTBEAT_KEY: &str = "heartbeat";
pub const DEFAULT_HEARTBEAT: u64 = 60 * 1000;
pub const HEARTBEAT_TIMEOUT_KEY: &str = "heartbeat.timeout";
pub const RECONNECT_KEY: &str = "reconnect";
pub const PAYLOAD_KEY: &str = "payload";
pub const DEFAULT_PAYLOAD: usize = 8 * 1024 * 1024;
pub const SERIALIZATION_KEY: &str = "serialization";
pub const DECODE_IN_IO_THREAD_KEY: &str = "decode.in.io.thread";
pub const DEFAULT_DECODE_IN_IO_THREAD: bool = true;

// Worker dispatch
pub const DISPATCHER_KEY: &str = "dispatcher";
pub const DISPATHER_KEY: &str = "dispather";
pub const CHANNEL_HANDLER_KEY: &str = "channel.handler";
pub const THREADPOOL_KEY: &str = "threadpool";
pub const THREAD_NAME_KEY: &str = "threadname";
pub const DEFAULT_THREAD_NAME: &str = "DrpcServerHandler";
pub const THREADS_KEY: &str = "threads";
pub const DEFAULT_THREADS: usize = 200;
pub const QUEUES_KEY: &str = "queues";
pub const DEFAULT_QUEUES: i64 = 0;
pub const CORE_THREADS_KEY: &str = "corethreads";
pub const DEFAULT_CORE_THREADS: usize = 0;
pub const ALIVE_KEY: &str = "alive";
pub const DEFAULT_ALIVE: u64 = 60 * 1000;

/// Parameters that only make sense on the provider and are dropped when a
/// provider URL is merged into a consumer URL.
pub const PROVIDER_ONLY_KEYS: &[&str] = &[
    THREAD_NAME_KEY,
    THREADPOOL_KEY,
    CORE_THREADS_KEY,
    THREADS_KEY,
    QUEUES_KEY,
    ALIVE_KEY,
    "transporter",
];

/// Parameters on which the provider URL stays authoritative after a merge.
pub const PROVIDER_AUTHORITATIVE_KEYS: &[&str] = &[
    DUBBO_VERSION_KEY,
    RELEASE_KEY,
    VERSION_KEY,
    GROUP_KEY,
    METHODS_KEY,
    TIMESTAMP_KEY,
    TOKEN_KEY,
];
