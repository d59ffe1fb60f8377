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

//! The invocation model: invocations, results, invokers, protocols,
//! filters and proxies.

pub mod descriptor;
pub mod filter;
mod invocation;
mod invoker;
mod protocol;
mod proxy;
mod result;
mod status;
mod value;

pub use filter::Filter;
pub use invocation::Invocation;
pub use invoker::{contains_invoker, same_invoker, Exporter, Invoker, InvokerDelegate};
pub use protocol::{AdaptiveProtocol, Protocol, ProtocolFilterWrapper, ProtocolLoggingWrapper};
pub use proxy::{AdaptiveProxyFactory, DefaultProxyFactory, ProxyFactory, Service, ServiceProxy};
pub use result::{AsyncResult, RemoteException, RpcResult, FORBIDDEN_EXCEPTION, RUNTIME_EXCEPTION};
pub use status::RpcStatus;
pub use value::Value;
