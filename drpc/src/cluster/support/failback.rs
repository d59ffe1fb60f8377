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

//! Failback: failures are retried in the background.

use crate::cluster::support::{invoke_once, ClusterInvoker, ClusterPolicy, ClusterSupport};
use crate::cluster::{Cluster, Directory, LoadBalance};
use crate::common::constants;
use crate::extension::ExtensionLoader;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::RpcError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info};

/// Builds [`FailbackPolicy`] cluster invokers.
pub struct FailbackCluster {
    loadbalances: ExtensionLoader<dyn LoadBalance>,
}

impl FailbackCluster {
    /// A cluster choosing balancers from `loadbalances`.
    pub fn new(loadbalances: ExtensionLoader<dyn LoadBalance>) -> Self {
        Self { loadbalances }
    }
}

impl Cluster for FailbackCluster {
    fn join(&self, directory: Arc<dyn Directory>) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(ClusterInvoker::new(
            directory,
            self.loadbalances.clone(),
            FailbackPolicy::default(),
        )))
    }
}

type Failed = Arc<DashMap<u64, Invocation>>;

/// Invokes one provider; a failed call is answered with an empty result and
/// remembered. A background task retries remembered calls every period
/// (5 seconds by default) until each succeeds or the cluster is destroyed.
/// Suited to notifications that must eventually arrive.
pub struct FailbackPolicy {
    period: Duration,
    failed: Failed,
    next_id: AtomicU64,
    retry_task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for FailbackPolicy {
    fn default() -> Self {
        Self::with_period(Duration::from_millis(constants::FAILBACK_RETRY_PERIOD_MS))
    }
}

impl FailbackPolicy {
    /// A policy retrying every `period`.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            failed: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            retry_task: Mutex::new(None),
        }
    }

    /// Number of calls waiting for a retry.
    pub fn pending(&self) -> usize {
        self.failed.len()
    }

    fn add_failed(&self, cluster: &Arc<ClusterSupport>, invocation: Invocation) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.failed.insert(id, invocation);

        let mut task = self.retry_task.lock();
        if task.is_none() {
            let cluster = Arc::downgrade(cluster);
            let failed = Arc::clone(&self.failed);
            let period = self.period;
            *task = Some(tokio::spawn(retry_loop(cluster, failed, period)));
        }
    }
}

async fn retry_loop(cluster: Weak<ClusterSupport>, failed: Failed, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(cluster) = cluster.upgrade() else {
            break;
        };
        if cluster.is_destroyed() {
            break;
        }
        retry_failed(&cluster, &failed).await;
    }
    debug!("failback retry task stopped");
}

async fn retry_failed(cluster: &ClusterSupport, failed: &DashMap<u64, Invocation>) {
    let entries: Vec<(u64, Invocation)> = failed
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
    for (id, invocation) in entries {
        let outcome = async {
            let invokers = cluster.list(&invocation)?;
            let loadbalance = cluster.load_balance(&invokers, &invocation)?;
            invoke_once(cluster, &invocation, &invokers, &*loadbalance).await
        }
        .await;
        match outcome {
            Ok(_) => {
                failed.remove(&id);
                info!(method = invocation.method_name(), "failback retry succeeded");
            }
            Err(err) => {
                error!(method = invocation.method_name(), error = %err, "failed retry to invoke method");
            }
        }
    }
}

#[async_trait]
impl ClusterPolicy for FailbackPolicy {
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
                error!(
                    method = invocation.method_name(),
                    error = %err,
                    "failback to invoke method, wait for retry in background"
                );
                self.add_failed(cluster, invocation.clone());
                Ok(RpcResult::empty())
            }
        }
    }

    fn destroy(&self) {
        if let Some(task) = self.retry_task.lock().take() {
            task.abort();
        }
        self.failed.clear();
    }
}
