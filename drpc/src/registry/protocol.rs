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

//! The `registry` protocol.

use crate::cluster::{Cluster, Directory, RouterFactory};
use crate::common::{constants, HasUrl, Url};
use crate::registry::{Registry, RegistryDirectory, RegistryFactory};
use crate::rpc::{Exporter, Invoker, InvokerDelegate, Protocol};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Links export and refer to service discovery.
///
/// A registry URL carries the real target in a parameter:
///
/// ```text
/// registry://10.0.0.7:2181/drpc.registry.RegistryService?registry=memory&export=dubbo%3A%2F%2F...
/// ```
///
/// Exporting such a URL exports the embedded provider URL through its own
/// protocol and registers it; referring subscribes a [`RegistryDirectory`]
/// to the providers of the embedded consumer URL and joins it into a
/// cluster invoker.
pub struct RegistryProtocol {
    protocol: Arc<dyn Protocol>,
    registries: Arc<dyn RegistryFactory>,
    cluster: Arc<dyn Cluster>,
    routers: Arc<dyn RouterFactory>,
    bounds: Arc<tokio::sync::Mutex<HashMap<String, Arc<dyn Exporter>>>>,
}

impl RegistryProtocol {
    /// A protocol exporting through `protocol` and discovering through
    /// `registries`.
    pub fn new(
        protocol: Arc<dyn Protocol>,
        registries: Arc<dyn RegistryFactory>,
        cluster: Arc<dyn Cluster>,
        routers: Arc<dyn RouterFactory>,
    ) -> Self {
        Self {
            protocol,
            registries,
            cluster,
            routers,
            bounds: Arc::default(),
        }
    }

    fn registry_url(url: &Url) -> Url {
        let scheme = url
            .parameter_or(constants::REGISTRY_KEY, constants::DEFAULT_REGISTRY)
            .to_string();
        url.with_protocol(scheme).without_parameters(&[
            constants::REGISTRY_KEY,
            constants::EXPORT_KEY,
            constants::REFER_KEY,
        ])
    }

    fn embedded(url: &Url, key: &str) -> Result<Url, RpcError> {
        let text = url.parameter(key).ok_or_else(|| {
            RpcError::new(
                RpcErrorKind::Unknown,
                format!("The registry url {url} has no {key} parameter"),
            )
        })?;
        Ok(Url::parse(text)?)
    }
}

#[async_trait]
impl Protocol for RegistryProtocol {
    fn default_port(&self) -> u16 {
        9090
    }

    async fn export(&self, invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError> {
        let provider_url = Self::embedded(invoker.url(), constants::EXPORT_KEY)?;
        let registry = self.registries.get_registry(&Self::registry_url(invoker.url()))?;

        let key = provider_url.to_full_string();
        let exporter = {
            let mut bounds = self.bounds.lock().await;
            match bounds.get(&key) {
                Some(exporter) => Arc::clone(exporter),
                None => {
                    let delegate: Arc<dyn Invoker> =
                        Arc::new(InvokerDelegate::new(invoker, provider_url.clone()));
                    let exporter = self.protocol.export(delegate).await?;
                    bounds.insert(key.clone(), Arc::clone(&exporter));
                    exporter
                }
            }
        };

        let registered = if provider_url.get(constants::REGISTER_KEY, true) {
            registry.register(&provider_url).await?;
            info!(url = %provider_url, registry = %registry.url().address(), "registered provider");
            Some(provider_url)
        } else {
            None
        };

        Ok(Arc::new(RegistryExporter {
            key,
            exporter,
            registry,
            registered,
            bounds: Arc::clone(&self.bounds),
        }))
    }

    async fn refer(&self, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
        let consumer_url = Self::embedded(url, constants::REFER_KEY)?;
        let registry = self.registries.get_registry(&Self::registry_url(url))?;
        let directory = RegistryDirectory::new(
            interface,
            consumer_url.clone(),
            registry,
            Arc::clone(&self.protocol),
            Arc::clone(&self.routers),
        );

        if consumer_url.get(constants::REGISTER_KEY, true) {
            let registered = consumer_url
                .with_parameter(constants::CATEGORY_KEY, constants::CONSUMERS_CATEGORY)
                .with_parameter(constants::CHECK_KEY, false);
            directory.register_consumer(&registered).await?;
        }
        let subscription = consumer_url.with_parameter(
            constants::CATEGORY_KEY,
            format!("{},{}", constants::PROVIDERS_CATEGORY, constants::ROUTERS_CATEGORY),
        );
        directory.subscribe(&subscription).await?;

        let directory: Arc<dyn Directory> = directory;
        self.cluster.join(directory)
    }

    fn destroy(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let bounds = Arc::clone(&self.bounds);
        handle.spawn(async move {
            let exporters: Vec<_> = bounds.lock().await.drain().map(|(_, e)| e).collect();
            for exporter in exporters {
                exporter.unexport().await;
            }
        });
    }
}

struct RegistryExporter {
    key: String,
    exporter: Arc<dyn Exporter>,
    registry: Arc<dyn Registry>,
    registered: Option<Url>,
    bounds: Arc<tokio::sync::Mutex<HashMap<String, Arc<dyn Exporter>>>>,
}

#[async_trait]
impl Exporter for RegistryExporter {
    fn invoker(&self) -> Arc<dyn Invoker> {
        self.exporter.invoker()
    }

    async fn unexport(&self) {
        if let Some(url) = &self.registered {
            if let Err(error) = self.registry.unregister(url).await {
                warn!(url = %url, %error, "failed to unregister provider");
            }
        }
        if self.bounds.lock().await.remove(&self.key).is_some() {
            self.exporter.unexport().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::support::FailoverCluster;
    use crate::cluster::ConditionRouterFactory;
    use crate::extension::ExtensionRegistry;
    use crate::protocol::InjvmProtocol;
    use crate::registry::MemoryRegistryFactory;
    use crate::cluster::LoadBalance;
    use crate::common::percent_encode;
    use crate::rpc::{DefaultProxyFactory, Invocation, ProxyFactory, RemoteException, Service, Value};

    struct Greeter;

    #[async_trait]
    impl Service for Greeter {
        fn methods(&self) -> Vec<String> {
            vec!["greet".into()]
        }

        async fn call(&self, invocation: &Invocation) -> Result<Value, RemoteException> {
            let name = invocation.arguments().first().cloned().unwrap_or_default();
            Ok(Value::from(format!("hello {name}")))
        }
    }

    #[tokio::test]
    async fn test_export_then_refer_through_memory_registry() {
        let extensions = ExtensionRegistry::new();
        let protocol = RegistryProtocol::new(
            Arc::new(InjvmProtocol::new()),
            Arc::new(MemoryRegistryFactory::default()),
            Arc::new(FailoverCluster::new(extensions.loader::<dyn LoadBalance>())),
            Arc::new(ConditionRouterFactory),
        );

        let provider = Url::parse("injvm://127.0.0.1/acme.Greeter").unwrap();
        let registry = format!(
            "registry://127.0.0.1:2181/drpc.registry.RegistryService?registry=memory&export={}",
            percent_encode(&provider.to_full_string())
        );
        let invoker = DefaultProxyFactory
            .get_invoker(Arc::new(Greeter), "acme.Greeter", &Url::parse(&registry).unwrap())
            .unwrap();
        let exporter = protocol.export(invoker).await.unwrap();

        let consumer = Url::parse("consumer://127.0.0.1/acme.Greeter?side=consumer").unwrap();
        let reference = Url::parse(&format!(
            "registry://127.0.0.1:2181/drpc.registry.RegistryService?registry=memory&refer={}",
            percent_encode(&consumer.to_full_string())
        ))
        .unwrap();
        let proxy = DefaultProxyFactory
            .get_proxy(protocol.refer("acme.Greeter", &reference).await.unwrap())
            .unwrap();
        let reply = proxy.call("greet", ["java.lang.String"], vec!["ada".into()]).await.unwrap();
        assert_eq!(reply, Value::from("hello ada"));

        exporter.unexport().await;
        let err = proxy.call("greet", ["java.lang.String"], vec!["ada".into()]).await.unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::Forbidden);
    }
}
