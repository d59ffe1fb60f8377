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

//! Forking: parallel attempts, first success wins.

use crate::cluster::support::{addresses, ClusterInvoker, ClusterPolicy, ClusterSupport};
use crate::cluster::{Cluster, Directory, LoadBalance};
use crate::common::constants;
use crate::extension::ExtensionLoader;
use crate::rpc::{contains_invoker, Invocation, Invoker, RpcResult};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Builds [`ForkingPolicy`] cluster invokers.
pub struct ForkingCluster {
    loadbalances: ExtensionLoader<dyn LoadBalance>,
}

impl ForkingCluster {
    /// A cluster choosing balancers from `loadbalances`.
    pub fn new(loadbalances: ExtensionLoader<dyn LoadBalance>) -> Self {
        Self { loadbalances }
    }
}

impl Cluster for ForkingCluster {
    fn join(&self, directory: Arc<dyn Directory>) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(ClusterInvoker::new(directory, self.loadbalances.clone(), ForkingPolicy)))
    }
}

/// Calls up to `forks` distinct providers at once (default 2, all of them
/// when `forks` is not positive) and returns the first success. Fails with
/// the last error when every attempt fails, or with a timeout when none
/// finishes within `timeout`. Suited to latency-critical reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkingPolicy;

#[async_trait]
impl ClusterPolicy for ForkingPolicy {
    async fn do_invoke(
        &self,
        cluster: &Arc<ClusterSupport>,
        invocation: &Invocation,
        invokers: Vec<Arc<dyn Invoker>>,
        loadbalance: Arc<dyn LoadBalance>,
    ) -> Result<RpcResult, RpcError> {
        cluster.check_invokers(&invokers, invocation)?;
        let url = cluster.url();
        let forks: i64 = url.get(constants::FORKS_KEY, constants::DEFAULT_FORKS as i64);
        let timeout = Duration::from_millis(url.get(constants::TIMEOUT_KEY, constants::DEFAULT_TIMEOUT));

        let selected: Vec<Arc<dyn Invoker>> = match usize::try_from(forks) {
            Ok(forks) if forks > 0 && forks < invokers.len() => {
                let mut selected = Vec::with_capacity(forks);
                for _ in 0..forks {
                    if let Some(invoker) = cluster.select(&*loadbalance, invocation, &invokers, &selected)? {
                        if !contains_invoker(&selected, &invoker) {
                            selected.push(invoker);
                        }
                    }
                }
                selected
            }
            _ => invokers,
        };

        let (tx, mut rx) = mpsc::channel(selected.len().max(1));
        for invoker in &selected {
            let invoker = Arc::clone(invoker);
            let invocation = invocation.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(invoker.invoke(&invocation).await).await;
            });
        }
        drop(tx);

        let first = tokio::time::timeout(timeout, async {
            let mut last_error = None;
            while let Some(outcome) = rx.recv().await {
                match outcome {
                    Ok(result) => return Ok(result),
                    Err(err) => last_error = Some(err),
                }
            }
            Err(last_error)
        })
        .await;

        match first {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(Some(err))) => {
                let message = format!(
                    "Failed to forking invoke provider {}, but no luck to perform the invocation. Last error is: {}",
                    addresses(&selected),
                    err.message()
                );
                Err(err.with_message(message))
            }
            Ok(Err(None)) => Err(cluster.no_provider(invocation)),
            Err(_) => Err(RpcError::new(
                RpcErrorKind::Timeout,
                format!(
                    "Failed to forking invoke provider {}, but no luck to perform the invocation. Last error is: timeout after {} ms",
                    addresses(&selected),
                    timeout.as_millis()
                ),
            )),
        }
    }
}
