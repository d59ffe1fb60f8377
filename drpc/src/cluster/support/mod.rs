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

//! Fault-tolerant cluster invokers.
//!
//! [`ClusterInvoker`] carries what every policy shares: listing the
//! directory, choosing the load balancer, sticky affinity and the
//! avoid-already-tried selection. A [`ClusterPolicy`] decides how many
//! attempts are made and what a failure turns into.

mod broadcast;
mod failback;
mod failfast;
mod failover;
mod failsafe;
mod forking;

pub use broadcast::{BroadcastCluster, BroadcastPolicy};
pub use failback::{FailbackCluster, FailbackPolicy};
pub use failfast::{FailfastCluster, FailfastPolicy};
pub use failover::{FailoverCluster, FailoverPolicy};
pub use failsafe::{FailsafeCluster, FailsafePolicy};
pub use forking::{ForkingCluster, ForkingPolicy};

use crate::cluster::{Directory, LoadBalance};
use crate::common::{constants, local_host, version, HasUrl, Url};
use crate::extension::ExtensionLoader;
use crate::rpc::{contains_invoker, Invocation, Invoker, RpcResult};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// The fault-tolerance strategy of a [`ClusterInvoker`].
#[async_trait]
pub trait ClusterPolicy: Send + Sync + 'static {
    /// Performs `invocation` against `invokers`, the directory listing for
    /// this call.
    ///
    /// # Errors
    ///
    /// Whatever the policy surfaces after its attempts.
    async fn do_invoke(
        &self,
        cluster: &Arc<ClusterSupport>,
        invocation: &Invocation,
        invokers: Vec<Arc<dyn Invoker>>,
        loadbalance: Arc<dyn LoadBalance>,
    ) -> Result<RpcResult, RpcError>;

    /// Releases background work of the policy.
    fn destroy(&self) {}
}

/// State shared by every cluster policy: the directory, the load balancer
/// loader, and the sticky invoker.
pub struct ClusterSupport {
    directory: Arc<dyn Directory>,
    loadbalances: ExtensionLoader<dyn LoadBalance>,
    available_check: bool,
    sticky: RwLock<Option<Arc<dyn Invoker>>>,
    destroyed: AtomicBool,
}

impl ClusterSupport {
    /// Support over `directory`; `cluster.availablecheck` is read from the
    /// directory URL.
    pub fn new(directory: Arc<dyn Directory>, loadbalances: ExtensionLoader<dyn LoadBalance>) -> Self {
        let available_check = directory
            .url()
            .get(constants::CLUSTER_AVAILABLE_CHECK_KEY, constants::DEFAULT_CLUSTER_AVAILABLE_CHECK);
        Self {
            directory,
            loadbalances,
            available_check,
            sticky: RwLock::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// The directory the cluster chooses from.
    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// The consumer URL of the directory.
    pub fn url(&self) -> &Url {
        self.directory.url()
    }

    /// The served interface.
    pub fn interface(&self) -> &str {
        self.directory.interface()
    }

    /// Whether [`ClusterInvoker::destroy`] has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Fails once the cluster is destroyed.
    ///
    /// # Errors
    ///
    /// A destroyed cluster.
    pub fn check_destroyed(&self) -> Result<(), RpcError> {
        if self.is_destroyed() {
            return Err(RpcError::new(
                RpcErrorKind::Unknown,
                format!(
                    "Rpc cluster invoker for {} on consumer {} use drpc version {} is now destroyed! Can not invoke any more.",
                    self.interface(),
                    local_host(),
                    version()
                ),
            ));
        }
        Ok(())
    }

    /// The current candidates for `invocation`.
    ///
    /// # Errors
    ///
    /// See [`Directory::list`].
    pub fn list(&self, invocation: &Invocation) -> Result<Vec<Arc<dyn Invoker>>, RpcError> {
        self.directory.list(invocation)
    }

    /// Fails with [`no_provider`](Self::no_provider) when `invokers` is
    /// empty.
    ///
    /// # Errors
    ///
    /// [`RpcErrorKind::NoProvider`].
    pub fn check_invokers(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Result<(), RpcError> {
        if invokers.is_empty() {
            return Err(self.no_provider(invocation));
        }
        Ok(())
    }

    /// The no-provider error for `invocation`, naming the service, the
    /// registry and this host.
    pub fn no_provider(&self, invocation: &Invocation) -> RpcError {
        let url = self.url();
        RpcError::new(
            RpcErrorKind::NoProvider,
            format!(
                "Failed to invoke the method {} in the service {}. No provider available for the service {} from registry {} on the consumer {} using the drpc version {}. Please check if the providers have been started and registered.",
                invocation.method_name(),
                self.interface(),
                url.service_key(),
                url.address(),
                local_host(),
                version()
            ),
        )
    }

    /// The balancer named by the method scoped `loadbalance` parameter of
    /// the first candidate, `random` without candidates.
    ///
    /// # Errors
    ///
    /// An unknown balancer name.
    pub fn load_balance(
        &self,
        invokers: &[Arc<dyn Invoker>],
        invocation: &Invocation,
    ) -> Result<Arc<dyn LoadBalance>, RpcError> {
        let name = match invokers.first() {
            Some(invoker) => invoker
                .url()
                .method_parameter_or(
                    invocation.method_name(),
                    constants::LOADBALANCE_KEY,
                    constants::DEFAULT_LOADBALANCE,
                )
                .to_string(),
            None => constants::DEFAULT_LOADBALANCE.to_string(),
        };
        Ok(self.loadbalances.get_extension(&name)?)
    }

    /// Chooses the invoker for one attempt.
    ///
    /// A live sticky invoker that is still listed and not yet tried wins.
    /// Otherwise the load balancer picks, and a pick that was already tried
    /// or is unavailable is replaced by a reselection among the remaining
    /// candidates.
    ///
    /// # Errors
    ///
    /// Load balancer failures.
    pub fn select(
        &self,
        loadbalance: &dyn LoadBalance,
        invocation: &Invocation,
        invokers: &[Arc<dyn Invoker>],
        tried: &[Arc<dyn Invoker>],
    ) -> Result<Option<Arc<dyn Invoker>>, RpcError> {
        let Some(first) = invokers.first() else {
            return Ok(None);
        };
        let sticky = first
            .url()
            .method_get(invocation.method_name(), constants::STICKY_KEY, constants::DEFAULT_STICKY);

        let current = self.sticky.read().clone();
        if let Some(current) = current {
            if !contains_invoker(invokers, &current) {
                *self.sticky.write() = None;
            } else if sticky
                && !contains_invoker(tried, &current)
                && (!self.available_check || current.is_available())
            {
                return Ok(Some(current));
            }
        }

        let invoker = self.do_select(loadbalance, invocation, invokers, tried)?;
        if sticky {
            *self.sticky.write() = invoker.clone();
        }
        Ok(invoker)
    }

    fn do_select(
        &self,
        loadbalance: &dyn LoadBalance,
        invocation: &Invocation,
        invokers: &[Arc<dyn Invoker>],
        tried: &[Arc<dyn Invoker>],
    ) -> Result<Option<Arc<dyn Invoker>>, RpcError> {
        match invokers {
            [] => return Ok(None),
            [only] => return Ok(Some(Arc::clone(only))),
            [a, b] if !tried.is_empty() => {
                let untried = if contains_invoker(tried, a) { b } else { a };
                return Ok(Some(Arc::clone(untried)));
            }
            _ => {}
        }

        let Some(picked) = loadbalance.select(invokers, self.url(), invocation)? else {
            return Ok(None);
        };
        if !contains_invoker(tried, &picked) && (!self.available_check || picked.is_available()) {
            return Ok(Some(picked));
        }

        match self.reselect(loadbalance, invocation, invokers, tried) {
            Ok(Some(reselected)) => Ok(Some(reselected)),
            Ok(None) => {
                let index = invokers
                    .iter()
                    .position(|invoker| crate::rpc::same_invoker(invoker, &picked));
                match index {
                    Some(index) if index + 1 < invokers.len() => Ok(Some(Arc::clone(&invokers[index + 1]))),
                    _ => Ok(Some(picked)),
                }
            }
            Err(err) => {
                error!(
                    error = %err,
                    "cluster reselect failed; set cluster.availablecheck=false on the url if this persists"
                );
                Ok(Some(picked))
            }
        }
    }

    fn reselect(
        &self,
        loadbalance: &dyn LoadBalance,
        invocation: &Invocation,
        invokers: &[Arc<dyn Invoker>],
        tried: &[Arc<dyn Invoker>],
    ) -> Result<Option<Arc<dyn Invoker>>, RpcError> {
        let mut candidates: Vec<Arc<dyn Invoker>> = invokers
            .iter()
            .filter(|invoker| {
                (!self.available_check || invoker.is_available()) && !contains_invoker(tried, invoker)
            })
            .cloned()
            .collect();
        if !candidates.is_empty() {
            return loadbalance.select(&candidates, self.url(), invocation);
        }

        for invoker in tried {
            if invoker.is_available() && !contains_invoker(&candidates, invoker) {
                candidates.push(Arc::clone(invoker));
            }
        }
        if !candidates.is_empty() {
            return loadbalance.select(&candidates, self.url(), invocation);
        }
        Ok(None)
    }

    fn is_available(&self) -> bool {
        match self.sticky.read().as_ref() {
            Some(sticky) => sticky.is_available(),
            None => self.directory.is_available(),
        }
    }

    fn destroy(&self) {
        self.directory.destroy();
        self.destroyed.store(true, Ordering::Release);
    }
}

/// Selects one candidate and invokes it once.
pub(crate) async fn invoke_once(
    cluster: &ClusterSupport,
    invocation: &Invocation,
    invokers: &[Arc<dyn Invoker>],
    loadbalance: &dyn LoadBalance,
) -> Result<RpcResult, RpcError> {
    cluster.check_invokers(invokers, invocation)?;
    match cluster.select(loadbalance, invocation, invokers, &[])? {
        Some(invoker) => invoker.invoke(invocation).await,
        None => Err(cluster.no_provider(invocation)),
    }
}

/// Formats the addresses of `invokers` for error messages.
pub(crate) fn addresses(invokers: &[Arc<dyn Invoker>]) -> String {
    let addresses: Vec<String> = invokers.iter().map(|invoker| invoker.url().address()).collect();
    format!("[{}]", addresses.join(", "))
}

/// An invoker over a whole directory, applying the policy `P`.
pub struct ClusterInvoker<P> {
    support: Arc<ClusterSupport>,
    policy: P,
}

impl<P: ClusterPolicy> ClusterInvoker<P> {
    /// A cluster invoker over `directory`.
    pub fn new(directory: Arc<dyn Directory>, loadbalances: ExtensionLoader<dyn LoadBalance>, policy: P) -> Self {
        Self {
            support: Arc::new(ClusterSupport::new(directory, loadbalances)),
            policy,
        }
    }

    /// The shared selection state.
    pub fn support(&self) -> &Arc<ClusterSupport> {
        &self.support
    }
}

impl<P> HasUrl for ClusterInvoker<P> {
    fn url(&self) -> &Url {
        self.support.url()
    }
}

#[async_trait]
impl<P: ClusterPolicy> Invoker for ClusterInvoker<P> {
    fn interface(&self) -> &str {
        self.support.interface()
    }

    fn is_available(&self) -> bool {
        self.support.is_available()
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        self.support.check_destroyed()?;
        let invokers = self.support.list(invocation)?;
        let loadbalance = self.support.load_balance(&invokers, invocation)?;
        self.policy
            .do_invoke(&self.support, invocation, invokers, loadbalance)
            .await
    }

    fn destroy(&self) {
        if self.support.is_destroyed() {
            return;
        }
        self.policy.destroy();
        self.support.destroy();
        debug!(interface = self.support.interface(), url = %self.support.url(), "destroyed cluster invoker");
    }
}

impl<P> std::fmt::Display for ClusterInvoker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.support.interface(), self.support.url())
    }
}
