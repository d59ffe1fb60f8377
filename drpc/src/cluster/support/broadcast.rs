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

//! Broadcast: every provider is called.

use crate::cluster::support::{ClusterInvoker, ClusterPolicy, ClusterSupport};
use crate::cluster::{Cluster, Directory, LoadBalance};
use crate::common::HasUrl;
use crate::extension::ExtensionLoader;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Builds [`BroadcastPolicy`] cluster invokers.
pub struct BroadcastCluster {
    loadbalances: ExtensionLoader<dyn LoadBalance>,
}

impl BroadcastCluster {
    /// A cluster choosing balancers from `loadbalances`.
    pub fn new(loadbalances: ExtensionLoader<dyn LoadBalance>) -> Self {
        Self { loadbalances }
    }
}

impl Cluster for BroadcastCluster {
    fn join(&self, directory: Arc<dyn Directory>) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(ClusterInvoker::new(directory, self.loadbalances.clone(), BroadcastPolicy)))
    }
}

/// Calls every provider in turn. Failures are logged; the last one is
/// surfaced after all calls finished, otherwise the last result is returned.
/// Suited to cache refresh notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct BroadcastPolicy;

#[async_trait]
impl ClusterPolicy for BroadcastPolicy {
    async fn do_invoke(
        &self,
        cluster: &Arc<ClusterSupport>,
        invocation: &Invocation,
        invokers: Vec<Arc<dyn Invoker>>,
        _loadbalance: Arc<dyn LoadBalance>,
    ) -> Result<RpcResult, RpcError> {
        cluster.check_invokers(&invokers, invocation)?;
        let mut result = RpcResult::empty();
        let mut last_error = None;
        for invoker in &invokers {
            match invoker.invoke(invocation).await {
                Ok(outcome) => result = outcome,
                Err(err) => {
                    warn!(provider = %invoker.url().address(), error = %err, "broadcast call failed");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }
}
