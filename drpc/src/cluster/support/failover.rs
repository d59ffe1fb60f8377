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

//! Failover: retry other providers on transport failures.

use crate::cluster::support::{addresses, ClusterInvoker, ClusterPolicy, ClusterSupport};
use crate::cluster::{Cluster, Directory, LoadBalance};
use crate::common::{constants, local_host, version, HasUrl};
use crate::extension::ExtensionLoader;
use crate::rpc::{contains_invoker, Invocation, Invoker, RpcResult};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds [`FailoverPolicy`] cluster invokers. The default cluster.
pub struct FailoverCluster {
    loadbalances: ExtensionLoader<dyn LoadBalance>,
}

impl FailoverCluster {
    /// A cluster choosing balancers from `loadbalances`.
    pub fn new(loadbalances: ExtensionLoader<dyn LoadBalance>) -> Self {
        Self { loadbalances }
    }
}

impl Cluster for FailoverCluster {
    fn join(&self, directory: Arc<dyn Directory>) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(ClusterInvoker::new(directory, self.loadbalances.clone(), FailoverPolicy)))
    }
}

/// Tries up to `retries + 1` providers in turn, never the same one twice
/// while untried ones remain. Timeouts and network failures move on to the
/// next provider; any other error is surfaced at once. Each attempt
/// re-lists the directory so providers that appeared meanwhile are used.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailoverPolicy;

#[async_trait]
impl ClusterPolicy for FailoverPolicy {
    async fn do_invoke(
        &self,
        cluster: &Arc<ClusterSupport>,
        invocation: &Invocation,
        invokers: Vec<Arc<dyn Invoker>>,
        loadbalance: Arc<dyn LoadBalance>,
    ) -> Result<RpcResult, RpcError> {
        let method = invocation.method_name();
        let mut candidates = invokers;
        cluster.check_invokers(&candidates, invocation)?;
        let retries: i32 = cluster
            .url()
            .method_get(method, constants::RETRIES_KEY, constants::DEFAULT_RETRIES);
        let attempts = usize::try_from(retries.saturating_add(1)).unwrap_or(1).max(1);

        let mut tried: Vec<Arc<dyn Invoker>> = Vec::with_capacity(attempts);
        let mut last_error: Option<RpcError> = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                cluster.check_destroyed()?;
                candidates = cluster.list(invocation)?;
                cluster.check_invokers(&candidates, invocation)?;
            }
            let Some(invoker) = cluster.select(&*loadbalance, invocation, &candidates, &tried)? else {
                break;
            };
            if !contains_invoker(&tried, &invoker) {
                tried.push(Arc::clone(&invoker));
            }
            match invoker.invoke(invocation).await {
                Ok(result) => {
                    if let Some(err) = &last_error {
                        warn!(
                            method,
                            interface = cluster.interface(),
                            tried = %addresses(&tried),
                            error = %err,
                            "call succeeded on a later provider after earlier ones failed"
                        );
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    debug!(method, attempt, provider = %invoker.url().address(), error = %err, "attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let (kind, last) = match &last_error {
            Some(err) => (err.kind(), err.to_string()),
            None => (RpcErrorKind::Unknown, String::from("no provider selected")),
        };
        Err(RpcError::new(
            kind,
            format!(
                "Failed to invoke the method {method} in the service {}. Tried {attempts} times of the providers {} ({}/{}) from the registry {} on the consumer {} using the drpc version {}. Last error is: {last}",
                cluster.interface(),
                addresses(&tried),
                tried.len(),
                candidates.len(),
                cluster.url().address(),
                local_host(),
                version(),
            ),
        ))
    }
}
