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

//! An in-process registry.

use crate::common::{constants, HasUrl, Url};
use crate::registry::{is_match, NotifyListener, Registry, RegistryFactory};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A registry living in the memory of this process.
///
/// Providers and consumers of the same process reach each other through it,
/// which makes it the registry of tests and single-binary deployments.
/// Every change is pushed to the affected subscribers as a full snapshot;
/// pushes are serialized so a subscriber never sees an older snapshot after
/// a newer one.
pub struct MemoryRegistry {
    url: Url,
    registered: RwLock<BTreeSet<Url>>,
    subscribers: Mutex<Vec<(Url, Arc<dyn NotifyListener>)>>,
    notifying: tokio::sync::Mutex<()>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegistry")
            .field("url", &self.url)
            .field("registered", &self.registered.read().len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

fn category_of(url: &Url) -> &str {
    url.parameter_or(constants::CATEGORY_KEY, constants::DEFAULT_CATEGORY)
}

impl MemoryRegistry {
    /// An empty registry addressed by `url`.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            registered: RwLock::new(BTreeSet::new()),
            subscribers: Mutex::new(Vec::new()),
            notifying: tokio::sync::Mutex::new(()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Every registered URL.
    pub fn registered(&self) -> Vec<Url> {
        self.registered.read().iter().cloned().collect()
    }

    fn check_destroyed(&self) -> Result<(), RpcError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(RpcError::new(
                RpcErrorKind::Network,
                format!("registry {} is destroyed", self.url.address()),
            ));
        }
        Ok(())
    }

    /// The snapshot a subscriber to `subscription` sees now.
    fn snapshot(&self, subscription: &Url) -> Vec<Url> {
        let registered = self.registered.read();
        let subscribed = category_of(subscription);
        if subscribed == constants::ANY_VALUE {
            return registered
                .iter()
                .filter(|url| is_match(subscription, url))
                .cloned()
                .collect();
        }
        let mut urls = Vec::new();
        for category in subscribed.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let before = urls.len();
            urls.extend(
                registered
                    .iter()
                    .filter(|url| category_of(url) == category && is_match(subscription, url))
                    .cloned(),
            );
            if urls.len() == before {
                urls.push(
                    subscription
                        .with_protocol(constants::EMPTY_PROTOCOL)
                        .with_parameter(constants::CATEGORY_KEY, category),
                );
            }
        }
        urls
    }

    async fn notify_affected(&self, changed: &Url) {
        let _serial = self.notifying.lock().await;
        let targets: Vec<(Url, Arc<dyn NotifyListener>)> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(subscription, _)| is_match(subscription, changed))
            .cloned()
            .collect();
        for (subscription, listener) in targets {
            let urls = self.snapshot(&subscription);
            debug!(subscription = %subscription, urls = urls.len(), "notifying subscriber");
            listener.notify(urls).await;
        }
    }
}

impl HasUrl for MemoryRegistry {
    fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    async fn register(&self, url: &Url) -> Result<(), RpcError> {
        self.check_destroyed()?;
        if self.registered.write().insert(url.clone()) {
            info!(url = %url, registry = %self.url.address(), "registered");
            self.notify_affected(url).await;
        }
        Ok(())
    }

    async fn unregister(&self, url: &Url) -> Result<(), RpcError> {
        self.check_destroyed()?;
        if self.registered.write().remove(url) {
            info!(url = %url, registry = %self.url.address(), "unregistered");
            self.notify_affected(url).await;
        }
        Ok(())
    }

    async fn subscribe(&self, url: &Url, listener: Arc<dyn NotifyListener>) -> Result<(), RpcError> {
        self.check_destroyed()?;
        let _serial = self.notifying.lock().await;
        self.subscribers.lock().push((url.clone(), Arc::clone(&listener)));
        listener.notify(self.snapshot(url)).await;
        Ok(())
    }

    async fn unsubscribe(&self, url: &Url, listener: &Arc<dyn NotifyListener>) -> Result<(), RpcError> {
        self.subscribers.lock().retain(|(subscription, subscriber)| {
            !(subscription == url && Arc::ptr_eq(subscriber, listener))
        });
        Ok(())
    }

    async fn lookup(&self, url: &Url) -> Result<Vec<Url>, RpcError> {
        self.check_destroyed()?;
        Ok(self
            .registered
            .read()
            .iter()
            .filter(|registered| is_match(url, registered))
            .cloned()
            .collect())
    }

    fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.registered.write().clear();
            self.subscribers.lock().clear();
        }
    }
}

/// Hands out one [`MemoryRegistry`] per registry address.
#[derive(Default)]
pub struct MemoryRegistryFactory {
    registries: DashMap<String, Arc<MemoryRegistry>>,
}

impl RegistryFactory for MemoryRegistryFactory {
    fn get_registry(&self, url: &Url) -> Result<Arc<dyn Registry>, RpcError> {
        let key = format!("{}://{}", url.protocol(), url.address());
        let registry = self
            .registries
            .entry(key)
            .or_insert_with(|| {
                Arc::new(MemoryRegistry::new(
                    url.without_all_parameters()
                        .with_path("drpc.registry.RegistryService"),
                ))
            })
            .value()
            .clone();
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Vec<Url>>>);

    #[async_trait]
    impl NotifyListener for Recorder {
        async fn notify(&self, urls: Vec<Url>) {
            self.0.lock().push(urls);
        }
    }

    fn url(text: &str) -> Url {
        Url::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_receives_snapshots() {
        let registry = MemoryRegistry::new(url("memory://127.0.0.1:2181"));
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn NotifyListener> = recorder.clone();
        let subscription = url("consumer://10.0.0.9/acme.Greeter?category=providers");

        registry.subscribe(&subscription, Arc::clone(&listener)).await.unwrap();
        let provider = url("dubbo://10.0.0.1:20880/acme.Greeter");
        registry.register(&provider).await.unwrap();
        registry.register(&url("dubbo://10.0.0.1:20880/acme.Other")).await.unwrap();
        registry.unregister(&provider).await.unwrap();

        let seen = recorder.0.lock().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0][0].protocol(), "empty");
        assert_eq!(seen[1], vec![provider]);
        assert_eq!(seen[2][0].protocol(), "empty");

        registry.unsubscribe(&subscription, &listener).await.unwrap();
        registry.register(&url("dubbo://10.0.0.2:20880/acme.Greeter")).await.unwrap();
        assert_eq!(recorder.0.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_factory_shares_registry_per_address() {
        let factory = MemoryRegistryFactory::default();
        let a = factory.get_registry(&url("memory://127.0.0.1:2181?x=1")).unwrap();
        let b = factory.get_registry(&url("memory://127.0.0.1:2181?y=2")).unwrap();
        a.register(&url("dubbo://10.0.0.1:20880/acme.Greeter")).await.unwrap();
        let found = b.lookup(&url("consumer://10.0.0.9/acme.Greeter")).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
