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

//! Consuming a service.

use super::{process_parameters, registry_url};
use crate::cluster::{Cluster, Directory, StaticDirectory};
use crate::common::{constants, local_host, version, HasUrl, Url};
use crate::extension::ExtensionRegistry;
use crate::rpc::{Invoker, Protocol, ProxyFactory, ServiceProxy};
use crate::{RpcError, RpcErrorKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Builder and handle for one reference to a remote service.
///
/// Providers are found either at explicit URLs ([`with_url`]) or through
/// registries ([`with_registry`]). Several sources are joined into a single
/// cluster invoker.
///
/// [`with_url`]: Self::with_url
/// [`with_registry`]: Self::with_registry
///
/// # Examples
///
/// ```rust,no_run
/// use drpc::config::ReferenceConfig;
/// use drpc::rpc::Value;
///
/// async fn greet() -> Result<Value, drpc::RpcError> {
///     let mut reference = ReferenceConfig::new("acme.Greeter")
///         .with_registry("memory://127.0.0.1:2181".parse()?)
///         .with_parameter("loadbalance", "roundrobin")
///         .with_timeout(500);
///     let proxy = reference.get().await?;
///     proxy.call("greet", ["java.lang.String"], vec!["ada".into()]).await
/// }
/// ```
pub struct ReferenceConfig {
    interface: String,
    urls: Vec<Url>,
    registries: Vec<Url>,
    parameters: BTreeMap<String, String>,
    check: bool,
    extensions: Arc<ExtensionRegistry>,
    invoker: Option<Arc<dyn Invoker>>,
}

impl fmt::Debug for ReferenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceConfig")
            .field("interface", &self.interface)
            .field("urls", &self.urls)
            .field("registries", &self.registries)
            .field("parameters", &self.parameters)
            .field("check", &self.check)
            .field("referred", &self.invoker.is_some())
            .finish()
    }
}

impl ReferenceConfig {
    /// A reference to `interface`.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            urls: Vec::new(),
            registries: Vec::new(),
            parameters: BTreeMap::new(),
            check: true,
            extensions: ExtensionRegistry::global(),
            invoker: None,
        }
    }

    /// Calls the provider at `url` directly, bypassing registries.
    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.urls.push(url);
        self
    }

    /// Discovers providers through the registry at `url`.
    #[must_use]
    pub fn with_registry(mut self, url: Url) -> Self {
        self.registries.push(url);
        self
    }

    /// Whether [`get`](Self::get) fails when no provider is available,
    /// `true` by default.
    #[must_use]
    pub fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Service group.
    #[must_use]
    pub fn with_group(self, group: impl ToString) -> Self {
        self.with_parameter(constants::GROUP_KEY, group)
    }

    /// Service version.
    #[must_use]
    pub fn with_version(self, version: impl ToString) -> Self {
        self.with_parameter(constants::VERSION_KEY, version)
    }

    /// Call timeout in milliseconds.
    #[must_use]
    pub fn with_timeout(self, millis: u64) -> Self {
        self.with_parameter(constants::TIMEOUT_KEY, millis)
    }

    /// Fault-tolerance policy, `failover` by default.
    #[must_use]
    pub fn with_cluster(self, cluster: impl ToString) -> Self {
        self.with_parameter(constants::CLUSTER_KEY, cluster)
    }

    /// Adds a URL parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.insert(key.into(), value.to_string());
        self
    }

    /// Adds a parameter scoped to `method`.
    #[must_use]
    pub fn with_method_parameter(self, method: &str, key: &str, value: impl ToString) -> Self {
        self.with_parameter(format!("{method}.{key}"), value)
    }

    /// Resolves extensions from `extensions` instead of the global registry.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    /// The consumer URL.
    pub fn consumer_url(&self) -> Url {
        Url::new(constants::CONSUMER_SIDE, local_host(), 0, self.interface.clone())
            .with_parameters(process_parameters(constants::CONSUMER_SIDE, &self.interface))
            .with_parameters(self.parameters.clone())
    }

    /// The invoker behind the proxy, once referred.
    pub fn invoker(&self) -> Option<&Arc<dyn Invoker>> {
        self.invoker.as_ref()
    }

    /// Refers the service on first use and returns a proxy for it.
    ///
    /// # Errors
    ///
    /// Fails without a provider source, on extension lookup or connection
    /// failures, and, with `check` enabled, when no provider is available.
    pub async fn get(&mut self) -> Result<ServiceProxy, RpcError> {
        let invoker = match &self.invoker {
            Some(invoker) => Arc::clone(invoker),
            None => {
                let invoker = self.refer().await?;
                self.invoker = Some(Arc::clone(&invoker));
                invoker
            }
        };
        let consumer = self.consumer_url();
        let proxies = self.extensions.loader::<dyn ProxyFactory>();
        proxies
            .get_extension(consumer.parameter_or(constants::PROXY_KEY, "true"))?
            .get_proxy(invoker)
    }

    async fn refer(&self) -> Result<Arc<dyn Invoker>, RpcError> {
        let consumer = self.consumer_url();
        let targets: Vec<Url> = if !self.urls.is_empty() {
            self.urls
                .iter()
                .map(|url| {
                    if url.protocol() == constants::REGISTRY_PROTOCOL {
                        url.with_parameter(constants::REFER_KEY, consumer.to_full_string())
                    } else {
                        let consumer_params = consumer
                            .parameters()
                            .iter()
                            .filter(|(key, _)| !constants::PROVIDER_AUTHORITATIVE_KEYS.contains(&key.as_str()))
                            .map(|(key, value)| (key.clone(), value.clone()));
                        url.with_path(self.interface.clone()).with_parameters(consumer_params)
                    }
                })
                .collect()
        } else if !self.registries.is_empty() {
            self.registries
                .iter()
                .map(|registry| registry_url(registry, constants::REFER_KEY, &consumer))
                .collect()
        } else {
            return Err(RpcError::new(
                RpcErrorKind::NoProvider,
                format!(
                    "No provider url or registry configured for the reference to {}",
                    self.interface
                ),
            ));
        };

        let protocol = self.extensions.loader::<dyn Protocol>().adaptive_extension()?;
        let mut invokers = Vec::with_capacity(targets.len());
        for target in &targets {
            debug!(interface = %self.interface, url = %target, "referring");
            invokers.push(protocol.refer(&self.interface, target).await?);
        }

        let invoker = if invokers.len() == 1 {
            invokers.remove(0)
        } else {
            let url = invokers
                .iter()
                .find(|invoker| invoker.url().protocol() != constants::REGISTRY_PROTOCOL)
                .map(|invoker| invoker.url().clone())
                .unwrap_or_else(|| consumer.clone());
            let directory: Arc<dyn Directory> = Arc::new(StaticDirectory::new(url, invokers));
            self.extensions.loader::<dyn Cluster>().adaptive_extension()?.join(directory)?
        };

        if self.check && !invoker.is_available() {
            invoker.destroy();
            return Err(RpcError::new(
                RpcErrorKind::NoProvider,
                format!(
                    "Failed to check the status of the service {}. No provider available for the service {} from the url {} to the consumer {} use drpc version {}",
                    self.interface,
                    consumer.service_key(),
                    targets.first().map(Url::to_string).unwrap_or_default(),
                    local_host(),
                    version()
                ),
            ));
        }
        info!(interface = %self.interface, "referred service");
        Ok(invoker)
    }

    /// Destroys the referred invoker; the next [`get`](Self::get) refers
    /// again.
    pub fn destroy(&mut self) {
        if let Some(invoker) = self.invoker.take() {
            invoker.destroy();
        }
    }
}

