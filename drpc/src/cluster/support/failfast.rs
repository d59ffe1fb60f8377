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

//! Failfast: a single attempt.

use crate::cluster::support::{ClusterInvoker, ClusterPolicy, ClusterSupport};
use crate::cluster::{Cluster, Directory, LoadBalance};
use crate::common::{local_host, version, HasUrl};
use crate::extension::ExtensionLoader;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;

/// Builds [`FailfastPolicy`] cluster invokers.
pub struct FailfastCluster {
    loadbalances: ExtensionLoader<dyn LoadBalance>,
}

impl FailfastCluster {
    /// A cluster choosing balancers from `loadbalances`.
    pub fn new(loadbalances: ExtensionLoader<dyn LoadBalance>) -> Self {
        Self { loadbalances }
    }
}

impl Cluster for FailfastCluster {
    fn join(&self, directory: Arc<dyn Directory>) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(ClusterInvoker::new(directory, self.loadbalances.clone(), FailfastPolicy)))
    }
}

/// Invokes one provider and surfaces any failure. Suited to calls that are
/// not idempotent.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailfastPolicy;

#[async_trait]
impl ClusterPolicy for FailfastPolicy {
    async fn do_invoke(
        &self,
        cluster: &Arc<ClusterSupport>,
        invocation: &Invocation,
        invokers: Vec<Arc<dyn Invoker>>,
        loadbalance: Arc<dyn LoadBalance>,
    ) -> Result<RpcResult, RpcError> {
        cluster.check_invokers(&invokers, invocation)?;
        let Some(invoker) = cluster.select(&*loadbalance, invocation, &invokers, &[])? else {
            return Err(cluster.no_provider(invocation));
        };
        invoker.invoke(invocation).await.map_err(|err| {
            if err.is_biz() {
                return err;
            }
            let message = format!(
                "Failfast invoke providers {} select from all providers for service {} method {} on consumer {} use drpc version {}, but no luck to perform the invocation. Last error is: {}",
                invoker.url().address(),
                cluster.interface(),
                invocation.method_name(),
                local_host(),
                version(),
                err.message(),
            );
            err.with_message(message)
        })
    }
}
