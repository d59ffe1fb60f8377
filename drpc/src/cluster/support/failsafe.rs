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

//! Failsafe: failures become empty results.

use crate::cluster::support::{invoke_once, ClusterInvoker, ClusterPolicy, ClusterSupport};
use crate::cluster::{Cluster, Directory, LoadBalance};
use crate::extension::ExtensionLoader;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Builds [`FailsafePolicy`] cluster invokers.
pub struct FailsafeCluster {
    loadbalances: ExtensionLoader<dyn LoadBalance>,
}

impl FailsafeCluster {
    /// A cluster choosing balancers from `loadbalances`.
    pub fn new(loadbalances: ExtensionLoader<dyn LoadBalance>) -> Self {
        Self { loadbalances }
    }
}

impl Cluster for FailsafeCluster {
    fn join(&self, directory: Arc<dyn Directory>) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(ClusterInvoker::new(directory, self.loadbalances.clone(), FailsafePolicy)))
    }
}

/// Invokes one provider; a failure is logged and answered with an empty
/// result. Suited to audit logging and similar fire-and-forget calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailsafePolicy;

#[async_trait]
impl ClusterPolicy for FailsafePolicy {
    async fn do_invoke(
        &self,
        cluster: &Arc<ClusterSupport>,
        invocation: &Invocation,
        invokers: Vec<Arc<dyn Invoker>>,
        loadbalance: Arc<dyn LoadBalance>,
    ) -> Result<RpcResult, RpcError> {
        match invoke_once(cluster, invocation, &invokers, &*loadbalance).await {
            Ok(result) => Ok(result),
            Err(err) => {
                error!(method = invocation.method_name(), error = %err, "failsafe ignored exception");
                Ok(RpcResult::empty())
            }
        }
    }
}
