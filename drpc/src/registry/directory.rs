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

//! A directory fed by registry notifications.

use crate::cluster::{destroyed_error, route, Directory, Router, RouterFactory};
use crate::common::{constants, local_host, version, HasUrl, Url};
use crate::registry::{NotifyListener, Registry};
use crate::rpc::{Invocation, Invoker, Protocol};
use crate::{RpcError, RpcErrorKind};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Snapshot {
    invokers: Vec<Arc<dyn Invoker>>,
    routers: Vec<Arc<dyn Router>>,
}

/// The candidates of one reference, kept current by registry pushes.
///
/// Each push replaces the published snapshot atomically; listings taken
/// before a push keep the invokers they were handed. Provider URLs are
/// merged with the consumer URL before being referred, and an invoker is
/// reused for as long as its merged URL stays unchanged.
pub struct RegistryDirectory {
    me: Weak<Self>,
    url: Url,
    consumer_url: Url,
    interface: String,
    registry: Arc<dyn Registry>,
    protocol: Arc<dyn Protocol>,
    router_factory: Arc<dyn RouterFactory>,
    snapshot: ArcSwap<Snapshot>,
    referred: tokio::sync::Mutex<HashMap<String, Arc<dyn Invoker>>>,
    subscription: Mutex<Option<Url>>,
    registered: Mutex<Option<Url>>,
    forbidden: AtomicBool,
    destroyed: AtomicBool,
}

impl RegistryDirectory {
    /// A directory for `consumer_url` over `registry`.
    ///
    /// The directory URL takes the registry address with the consumer's
    /// parameters, so cluster settings such as `retries` or `loadbalance`
    /// read from it see what the consumer configured.
    pub fn new(
        interface: impl Into<String>,
        consumer_url: Url,
        registry: Arc<dyn Registry>,
        protocol: Arc<dyn Protocol>,
        router_factory: Arc<dyn RouterFactory>,
    ) -> Arc<Self> {
        let interface = interface.into();
        let url = registry
            .url()
            .without_all_parameters()
            .with_path(interface.clone())
            .with_parameters(consumer_url.parameters().clone());
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            url,
            consumer_url,
            interface,
            registry,
            protocol,
            router_factory,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            referred: tokio::sync::Mutex::new(HashMap::new()),
            subscription: Mutex::new(None),
            registered: Mutex::new(None),
            forbidden: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    /// The consumer URL this directory serves.
    pub fn consumer_url(&self) -> &Url {
        &self.consumer_url
    }

    /// Subscribes to `url` on the registry; the first snapshot is applied
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Registry failures.
    pub async fn subscribe(self: &Arc<Self>, url: &Url) -> Result<(), RpcError> {
        *self.subscription.lock() = Some(url.clone());
        let listener: Arc<dyn NotifyListener> = self.clone();
        self.registry.subscribe(url, listener).await
    }

    /// Registers the consumer `url`; it is withdrawn again on
    /// [`destroy`](Directory::destroy).
    ///
    /// # Errors
    ///
    /// Registry failures.
    pub async fn register_consumer(&self, url: &Url) -> Result<(), RpcError> {
        self.registry.register(url).await?;
        *self.registered.lock() = Some(url.clone());
        Ok(())
    }

    /// Number of invokers in the current snapshot.
    pub fn invoker_count(&self) -> usize {
        self.snapshot.load().invokers.len()
    }

    fn merge_url(&self, provider: &Url) -> Url {
        let consumer = self
            .consumer_url
            .parameters()
            .iter()
            .filter(|(key, _)| !constants::PROVIDER_AUTHORITATIVE_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()));
        let mut merged = provider
            .without_parameters(constants::PROVIDER_ONLY_KEYS)
            .with_parameters(consumer);
        if let Some(timestamp) = provider.parameter(constants::TIMESTAMP_KEY) {
            merged = merged.with_parameter(constants::REMOTE_TIMESTAMP_KEY, timestamp);
        }
        merged
    }

    fn accepts(&self, provider: &Url) -> bool {
        if provider.protocol() == constants::EMPTY_PROTOCOL {
            return false;
        }
        match self.consumer_url.parameter(constants::PROTOCOL_KEY) {
            Some(accepted) => accepted.split(',').any(|p| p.trim() == provider.protocol()),
            None => true,
        }
    }

    fn to_routers(&self, urls: Vec<Url>) -> Vec<Arc<dyn Router>> {
        let mut routers = Vec::new();
        for url in urls {
            if url.protocol() == constants::EMPTY_PROTOCOL {
                continue;
            }
            let url = match url.parameter(constants::ROUTER_KEY) {
                Some(kind) if !kind.is_empty() => url.with_protocol(kind),
                _ => url,
            };
            match self.router_factory.get_router(&url) {
                Ok(router) => routers.push(router),
                Err(error) => warn!(url = %url, %error, "failed to build router"),
            }
        }
        routers.sort_by_key(|router| std::cmp::Reverse(router.priority()));
        routers
    }

    async fn refresh_invokers(&self, urls: Vec<Url>) -> Vec<Arc<dyn Invoker>> {
        let mut referred = self.referred.lock().await;
        if urls.len() == 1 && urls[0].protocol() == constants::EMPTY_PROTOCOL {
            self.forbidden.store(true, Ordering::Release);
            for (_, invoker) in referred.drain() {
                invoker.destroy();
            }
            info!(interface = %self.interface, "no providers left, calls are forbidden");
            return Vec::new();
        }
        self.forbidden.store(false, Ordering::Release);

        let mut fresh: HashMap<String, Arc<dyn Invoker>> = HashMap::new();
        let mut invokers = Vec::new();
        for provider in urls.iter().filter(|url| self.accepts(url)) {
            let merged = self.merge_url(provider);
            let key = merged.to_full_string();
            if fresh.contains_key(&key) {
                continue;
            }
            let invoker = match referred.remove(&key) {
                Some(existing) => existing,
                None => match self.protocol.refer(&self.interface, &merged).await {
                    Ok(invoker) => invoker,
                    Err(error) => {
                        warn!(url = %merged, %error, "failed to refer provider");
                        continue;
                    }
                },
            };
            invokers.push(Arc::clone(&invoker));
            fresh.insert(key, invoker);
        }

        for (key, stale) in referred.drain() {
            debug!(url = %key, "destroying invoker of withdrawn provider");
            stale.destroy();
        }
        if self.is_destroyed() {
            for (_, invoker) in fresh {
                invoker.destroy();
            }
            return Vec::new();
        }
        *referred = fresh;
        invokers
    }
}

impl HasUrl for RegistryDirectory {
    fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl NotifyListener for RegistryDirectory {
    async fn notify(&self, urls: Vec<Url>) {
        if self.is_destroyed() {
            return;
        }
        let mut providers: Option<Vec<Url>> = None;
        let mut routers: Option<Vec<Url>> = None;
        for url in urls {
            let category = url.parameter_or(constants::CATEGORY_KEY, constants::DEFAULT_CATEGORY);
            if category == constants::ROUTERS_CATEGORY || url.protocol() == constants::ROUTE_PROTOCOL {
                routers.get_or_insert_with(Vec::new).push(url);
            } else if category == constants::PROVIDERS_CATEGORY {
                providers.get_or_insert_with(Vec::new).push(url);
            }
        }

        let routers = routers.map(|urls| self.to_routers(urls));
        let invokers = match providers {
            Some(urls) => Some(self.refresh_invokers(urls).await),
            None => None,
        };
        if self.is_destroyed() {
            return;
        }
        let current = self.snapshot.load_full();
        let next = Snapshot {
            invokers: invokers.unwrap_or_else(|| current.invokers.clone()),
            routers: routers.unwrap_or_else(|| current.routers.clone()),
        };
        debug!(
            interface = %self.interface,
            invokers = next.invokers.len(),
            routers = next.routers.len(),
            "directory refreshed"
        );
        self.snapshot.store(Arc::new(next));
    }
}

impl Directory for RegistryDirectory {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn list(&self, invocation: &Invocation) -> Result<Vec<Arc<dyn Invoker>>, RpcError> {
        if self.is_destroyed() {
            return Err(destroyed_error(&self.url));
        }
        if self.forbidden.load(Ordering::Acquire) {
            return Err(RpcError::new(
                RpcErrorKind::Forbidden,
                format!(
                    "No provider available from registry {} for service {} on consumer {} use drpc version {}, please check status of providers(disabled, not registered or in blacklist).",
                    self.url.address(),
                    self.consumer_url.service_key(),
                    local_host(),
                    version()
                ),
            ));
        }
        let snapshot = self.snapshot.load_full();
        Ok(route(&snapshot.routers, snapshot.invokers.clone(), &self.url, invocation))
    }

    fn is_available(&self) -> bool {
        !self.is_destroyed() && self.snapshot.load().invokers.iter().any(|invoker| invoker.is_available())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = self.subscription.lock().take();
        let registered = self.registered.lock().take();
        if subscription.is_some() || registered.is_some() {
            match (tokio::runtime::Handle::try_current(), self.me.upgrade()) {
                (Ok(handle), Some(me)) => {
                    let registry = Arc::clone(&self.registry);
                    handle.spawn(async move {
                        if let Some(url) = registered {
                            if let Err(error) = registry.unregister(&url).await {
                                warn!(url = %url, %error, "failed to unregister consumer");
                            }
                        }
                        if let Some(url) = subscription {
                            let listener: Arc<dyn NotifyListener> = me;
                            if let Err(error) = registry.unsubscribe(&url, &listener).await {
                                warn!(url = %url, %error, "failed to unsubscribe");
                            }
                        }
                    });
                }
                _ => warn!(interface = %self.interface, "no runtime to leave the registry on"),
            }
        }
        self.snapshot.store(Arc::new(Snapshot::default()));
        match self.referred.try_lock() {
            Ok(mut referred) => {
                for (_, invoker) in referred.drain() {
                    invoker.destroy();
                }
            }
            // A refresh holds the lock; it sees the flag before publishing,
            // and this task cleans up whatever it left behind.
            Err(_) => match (tokio::runtime::Handle::try_current(), self.me.upgrade()) {
                (Ok(handle), Some(me)) => {
                    handle.spawn(async move {
                        for (_, invoker) in me.referred.lock().await.drain() {
                            invoker.destroy();
                        }
                    });
                }
                _ => warn!(interface = %self.interface, "invokers left behind by an in-flight refresh"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ConditionRouterFactory;
    use crate::registry::MemoryRegistry;
    use crate::rpc::{Exporter, RpcResult};
    use std::sync::atomic::AtomicUsize;

    struct Remote {
        url: Url,
        destroyed: AtomicBool,
    }

    impl HasUrl for Remote {
        fn url(&self) -> &Url {
            &self.url
        }
    }

    #[async_trait]
    impl Invoker for Remote {
        fn interface(&self) -> &str {
            "acme.Greeter"
        }

        fn is_available(&self) -> bool {
            !self.destroyed.load(Ordering::Acquire)
        }

        async fn invoke(&self, _invocation: &Invocation) -> Result<RpcResult, RpcError> {
            Ok(RpcResult::empty())
        }

        fn destroy(&self) {
            self.destroyed.store(true, Ordering::Release);
        }
    }

    #[derive(Default)]
    struct Referrer {
        refers: AtomicUsize,
    }

    #[async_trait]
    impl Protocol for Referrer {
        async fn export(&self, _invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError> {
            Err(RpcError::new(RpcErrorKind::Unknown, "export unsupported"))
        }

        async fn refer(&self, _interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
            self.refers.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Remote {
                url: url.clone(),
                destroyed: AtomicBool::new(false),
            }))
        }
    }

    fn url(text: &str) -> Url {
        Url::parse(text).unwrap()
    }

    async fn setup() -> (Arc<MemoryRegistry>, Arc<Referrer>, Arc<RegistryDirectory>) {
        let registry = Arc::new(MemoryRegistry::new(url("memory://127.0.0.1:2181")));
        let protocol = Arc::new(Referrer::default());
        let consumer = url("consumer://10.0.0.9/acme.Greeter?side=consumer&retries=5");
        let directory = RegistryDirectory::new(
            "acme.Greeter",
            consumer.clone(),
            registry.clone(),
            protocol.clone(),
            Arc::new(ConditionRouterFactory),
        );
        directory
            .subscribe(&consumer.with_parameter(constants::CATEGORY_KEY, "providers,routers"))
            .await
            .unwrap();
        (registry, protocol, directory)
    }

    fn call() -> Invocation {
        Invocation::new("greet", Vec::<String>::new(), Vec::new())
    }

    #[tokio::test]
    async fn test_empty_registry_forbids_calls() {
        let (_registry, _protocol, directory) = setup().await;
        let err = directory.list(&call()).err().unwrap();
        assert_eq!(err.kind(), RpcErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_providers_are_merged_and_reused() {
        let (registry, protocol, directory) = setup().await;
        let first = url("dubbo://10.0.0.1:20880/acme.Greeter?threads=200&timestamp=42&retries=1");
        registry.register(&first).await.unwrap();

        let listed = directory.list(&call()).unwrap();
        assert_eq!(listed.len(), 1);
        let merged = listed[0].url();
        assert_eq!(merged.parameter("threads"), None);
        assert_eq!(merged.parameter("retries"), Some("5"));
        assert_eq!(merged.parameter("timestamp"), Some("42"));
        assert_eq!(merged.parameter("remote.timestamp"), Some("42"));
        assert_eq!(directory.url().parameter("retries"), Some("5"));

        registry.register(&url("dubbo://10.0.0.2:20880/acme.Greeter")).await.unwrap();
        assert_eq!(directory.invoker_count(), 2);
        assert_eq!(protocol.refers.load(Ordering::SeqCst), 2);

        registry.unregister(&first).await.unwrap();
        assert_eq!(directory.invoker_count(), 1);
        assert!(!listed[0].is_available());
        assert_eq!(protocol.refers.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_listing_is_a_stable_snapshot() {
        let (registry, _protocol, directory) = setup().await;
        registry.register(&url("dubbo://10.0.0.1:20880/acme.Greeter")).await.unwrap();
        let before = directory.list(&call()).unwrap();

        registry.register(&url("dubbo://10.0.0.2:20880/acme.Greeter")).await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(directory.list(&call()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_router_urls_narrow_the_listing() {
        let (registry, _protocol, directory) = setup().await;
        registry.register(&url("dubbo://10.0.0.1:20880/acme.Greeter")).await.unwrap();
        registry.register(&url("dubbo://10.0.0.2:20880/acme.Greeter")).await.unwrap();
        let rule = crate::common::percent_encode("=> host = 10.0.0.2");
        registry
            .register(&url(&format!(
                "route://0.0.0.0/acme.Greeter?category=routers&router=condition&rule={rule}"
            )))
            .await
            .unwrap();

        let listed = directory.list(&call()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].url().host(), "10.0.0.2");
    }

    /// Refers providers only once the test opens the gate.
    #[derive(Default)]
    struct Gated {
        entered: tokio::sync::Notify,
        gate: tokio::sync::Notify,
        referred: Mutex<Vec<Arc<Remote>>>,
    }

    #[async_trait]
    impl Protocol for Gated {
        async fn export(&self, _invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError> {
            Err(RpcError::new(RpcErrorKind::Unknown, "export unsupported"))
        }

        async fn refer(&self, _interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
            self.entered.notify_one();
            self.gate.notified().await;
            let remote = Arc::new(Remote {
                url: url.clone(),
                destroyed: AtomicBool::new(false),
            });
            self.referred.lock().push(Arc::clone(&remote));
            Ok(remote)
        }
    }

    #[tokio::test]
    async fn test_destroy_during_refresh_releases_new_invokers() {
        let protocol = Arc::new(Gated::default());
        let directory = RegistryDirectory::new(
            "acme.Greeter",
            url("consumer://10.0.0.9/acme.Greeter?side=consumer"),
            Arc::new(MemoryRegistry::new(url("memory://127.0.0.1:2181"))),
            protocol.clone(),
            Arc::new(ConditionRouterFactory),
        );

        let notifying = {
            let directory = Arc::clone(&directory);
            tokio::spawn(async move {
                directory
                    .notify(vec![url("dubbo://10.0.0.1:20880/acme.Greeter")])
                    .await;
            })
        };
        protocol.entered.notified().await;
        directory.destroy();
        protocol.gate.notify_one();
        notifying.await.unwrap();
        tokio::task::yield_now().await;

        let referred = protocol.referred.lock();
        assert_eq!(referred.len(), 1);
        assert!(!referred[0].is_available());
        assert_eq!(directory.invoker_count(), 0);
        assert!(directory.list(&call()).is_err());
    }

    #[tokio::test]
    async fn test_destroy_stops_listing() {
        let (registry, _protocol, directory) = setup().await;
        registry.register(&url("dubbo://10.0.0.1:20880/acme.Greeter")).await.unwrap();
        let listed = directory.list(&call()).unwrap();
        directory.destroy();
        assert!(directory.list(&call()).is_err());
        assert!(!listed[0].is_available());
        assert!(!directory.is_available());
    }
}
