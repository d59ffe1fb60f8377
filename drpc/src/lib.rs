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


#![doc = include_str!("../../README.md")]
#![allow(clippy::module_inception)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! ## Architecture
//!
//! DRPC is organized into layers, each depending only on those below it:
//!
//! - **[`extension`]**: named, pluggable implementations of every extension
//!   point, with adaptive dispatch on URL parameters
//! - **[`common`]**: the [`Url`](common::Url) configuration carrier and
//!   parameter names
//! - **[`serialization`]**: object formats selected per frame
//! - **[`remoting`]**: framing, request correlation, heartbeats and worker
//!   dispatch
//! - **[`rpc`]**: invocations, invokers, filters, protocols and proxies
//! - **[`protocol`]**: the `dubbo` and `injvm` protocols
//! - **[`cluster`]**: directories, routers, load balancers and
//!   fault-tolerance policies
//! - **[`registry`]**: service discovery and the `registry` protocol
//! - **[`config`]**: programmatic publication and consumption
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use drpc::config::{ReferenceConfig, ServiceConfig};
//! use drpc::rpc::{Invocation, RemoteException, Service, Value};
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Service for Greeter {
//!     fn methods(&self) -> Vec<String> {
//!         vec!["greet".into()]
//!     }
//!
//!     async fn call(&self, invocation: &Invocation) -> Result<Value, RemoteException> {
//!         let name = invocation.arguments().first().cloned().unwrap_or_default();
//!         Ok(Value::from(format!("hello {name}")))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), drpc::RpcError> {
//!     let registry: drpc::common::Url = "memory://127.0.0.1:2181".parse()?;
//!
//!     let mut service = ServiceConfig::new("acme.Greeter", Arc::new(Greeter))
//!         .with_host("127.0.0.1")
//!         .with_port(20880)
//!         .with_registry(registry.clone());
//!     service.export().await?;
//!
//!     let mut reference = ReferenceConfig::new("acme.Greeter").with_registry(registry);
//!     let proxy = reference.get().await?;
//!     let reply = proxy.call("greet", ["java.lang.String"], vec!["ada".into()]).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

extern crate self as drpc;

pub mod cluster;
pub mod common;
pub mod config;
pub mod error;
pub mod extension;
pub mod protocol;
pub mod registry;
pub mod remoting;
pub mod rpc;
pub mod serialization;

pub use drpc_macros::spi;

pub use error::{RpcError, RpcErrorKind};
pub use extension::ExtensionError;
pub use remoting::RemotingError;
