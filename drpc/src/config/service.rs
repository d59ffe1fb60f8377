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

//! Publishing a service.

use super::{process_parameters, registry_url};
use crate::common::{constants, local_host, Url};
use crate::extension::ExtensionRegistry;
use crate::rpc::{Exporter, Protocol, ProxyFactory, Service};
use crate::{RpcError, RpcErrorKind};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Builder and handle for one published service.
///
/// Without registries the service is exported directly through its
/// protocol. With registries it is exported once per registry through the
/// `registry` protocol, which also registers the provider URL.
///
/// # Examples
///
/// ```rust,no_run
/// use drpc::config::ServiceConfig;
/// use drpc::rpc::Service;
/// use std::sync::Arc;
///
/// async fn publish(greeter: Arc<dyn Service>) -> Result<ServiceConfig, drpc::RpcError> {
///     let mut config = ServiceConfig::new("acme.Greeter", greeter)
///         .with_port(20880)
///         .with_version("1.0.0")
///         .with_registry("memory://127.0.0.1:2181".parse()?);
///     config.export().await?;
///     Ok(config)
/// }
/// ```
pub struct ServiceConfig {
    interface: String,
    service: Arc<dyn Service>,
    protocol: String,
    host: Option<String>,
    port: Option<u16>,
    registries: Vec<Url>,
    parameters: BTreeMap<String, String>,
    extensions: Arc<ExtensionRegistry>,
    exporters: Vec<Arc<dyn Exporter>>,
    urls: Vec<Url>,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("interface", &self.interface)
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("registries", &self.registries)
            .field("parameters", &self.parameters)
            .field("exported", &self.exporters.len())
            .finish()
    }
}

impl ServiceConfig {
    /// Publishes `service` under `interface` over `dubbo`.
    pub fn new(interface: impl Into<String>, service: Arc<dyn Service>) -> Self {
        Self {
            interface: interface.into(),
            service,
            protocol: constants::DEFAULT_PROTOCOL.to_string(),
            host: None,
            port: None,
            registries: Vec::new(),
            parameters: BTreeMap::new(),
            extensions: ExtensionRegistry::global(),
            exporters: Vec::new(),
            urls: Vec::new(),
        }
    }

    /// Protocol extension to publish with, `dubbo` by default.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Advertised host, the local address by default.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Listening port, the protocol's default port by default.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Registers the service with the registry at `url`, e.g.
    /// `memory://127.0.0.1:2181`.
    #[must_use]
    pub fn with_registry(mut self, url: Url) -> Self {
        self.registries.push(url);
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

    /// Token consumers must present.
    #[must_use]
    pub fn with_token(self, token: impl ToString) -> Self {
        self.with_parameter(constants::TOKEN_KEY, token)
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

    /// The provider URLs exported so far.
    pub fn exported_urls(&self) -> &[Url] {
        &self.urls
    }

    /// Whether [`export`](Self::export) has succeeded.
    pub fn is_exported(&self) -> bool {
        !self.exporters.is_empty()
    }

    /// Builds the provider URL.
    ///
    /// # Errors
    ///
    /// Unknown protocol names.
    pub fn provider_url(&self) -> Result<Url, RpcError> {
        let port = match self.port {
            Some(port) => port,
            None => self
                .extensions
                .loader::<dyn Protocol>()
                .get_extension(&self.protocol)?
                .default_port(),
        };
        let host = self.host.clone().unwrap_or_else(|| local_host().to_string());
        let mut methods = self.service.methods();
        methods.sort();
        let url = Url::new(self.protocol.clone(), host, port, self.interface.clone())
            .with_parameters(process_parameters(constants::PROVIDER_SIDE, &self.interface))
            .with_parameter(constants::METHODS_KEY, methods.join(","))
            .with_parameters(self.parameters.clone());
        Ok(url)
    }

    /// Exports the service.
    ///
    /// # Errors
    ///
    /// Extension lookup, server startup or registration failures. A second
    /// call fails without exporting again.
    pub async fn export(&mut self) -> Result<(), RpcError> {
        if self.is_exported() {
            return Err(RpcError::new(
                RpcErrorKind::Unknown,
                format!("Service {} is already exported", self.interface),
            ));
        }
        let provider = self.provider_url()?;
        let protocol = self.extensions.loader::<dyn Protocol>().adaptive_extension()?;
        let proxy = self
            .extensions
            .loader::<dyn ProxyFactory>()
            .get_extension(provider.parameter_or(constants::PROXY_KEY, "true"))?;

        let targets: Vec<Url> = if self.registries.is_empty() {
            vec![provider.clone()]
        } else {
            self.registries
                .iter()
                .map(|registry| registry_url(registry, constants::EXPORT_KEY, &provider))
                .collect()
        };
        for target in targets {
            let invoker = proxy.get_invoker(Arc::clone(&self.service), &self.interface, &target)?;
            match protocol.export(invoker).await {
                Ok(exporter) => self.exporters.push(exporter),
                Err(error) => {
                    self.unexport().await;
                    return Err(error);
                }
            }
        }
        info!(interface = %self.interface, url = %provider, "service exported");
        self.urls.push(provider);
        Ok(())
    }

    /// Withdraws every export.
    pub async fn unexport(&mut self) {
        for exporter in self.exporters.drain(..) {
            exporter.unexport().await;
        }
        self.urls.clear();
    }
}
