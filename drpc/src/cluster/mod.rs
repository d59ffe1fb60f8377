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

//! Client-side clustering: turning a changing set of providers into one call.
//!
//! A [`Directory`] lists the invokers currently able to serve a reference,
//! [`Router`]s narrow that list per invocation, a [`LoadBalance`] picks one
//! candidate and a [`Cluster`] wraps the whole arrangement into a single
//! [`Invoker`] applying a fault-tolerance policy (failover, failfast,
//! failsafe, failback, forking, broadcast).

mod directory;
pub mod loadbalance;
mod router;
pub mod support;

pub(crate) use directory::destroyed_error;
pub use directory::{Directory, StaticDirectory};
pub use loadbalance::{AdaptiveLoadBalance, LoadBalance};
pub use router::{route, AdaptiveRouterFactory, ConditionRouter, ConditionRouterFactory, Router, RouterFactory};

use crate::rpc::Invoker;
use crate::spi;
use crate::RpcError;
use std::sync::Arc;

/// Merges the invokers of a directory into one fault-tolerant invoker.
///
/// The adaptive cluster reads the `cluster` parameter of the directory URL.
#[spi(name = "drpc.cluster.Cluster", default = "failover")]
pub trait Cluster: Send + Sync {
    /// Wraps `directory` into a cluster invoker.
    ///
    /// # Errors
    ///
    /// Failures resolving the load balancer extension point.
    #[adaptive("cluster", url = directory)]
    fn join(&self, directory: Arc<dyn Directory>) -> Result<Arc<dyn Invoker>, RpcError>;
}
