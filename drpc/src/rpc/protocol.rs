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

//! The `Protocol` extension point and its wrappers.

use crate::common::{constants, HasUrl, Url};
use crate::extension::ExtensionLoader;
use crate::rpc::filter::{build_chain, Filter};
use crate::rpc::{Exporter, Invoker};
use crate::spi;
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Publishes invokers and creates invokers for remote services.
///
/// The adaptive protocol dispatches on the URL scheme: an invoker whose URL
/// is `dubbo://...` is exported by the `dubbo` protocol, a reference to
/// `registry://...` goes through the `registry` protocol.
#[spi(name = "drpc.rpc.Protocol", default = "dubbo")]
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Port used when a URL names none.
    fn default_port(&self) -> u16 {
        0
    }

    /// Makes `invoker` reachable by consumers.
    ///
    /// # Errors
    ///
    /// Server startup or registration failures.
    #[adaptive(url = invoker)]
    async fn export(&self, invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError>;

    /// Creates an invoker for `interface` at `url`.
    ///
    /// # Errors
    ///
    /// Connection or subscription failures.
    #[adaptive]
    async fn refer(&self, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError>;

    /// Releases every export and reference of this protocol.
    fn destroy(&self) {}
}

fn is_registry(url: &Url) -> bool {
    url.protocol() == constants::REGISTRY_PROTOCOL
}

/// Chains activated filters around exported and referred invokers.
///
/// Providers get the filters of group `provider` plus those named by the
/// `service.filter` parameter; consumers get group `consumer` plus
/// `reference.filter`. Registry URLs pass through untouched.
pub struct ProtocolFilterWrapper {
    protocol: Arc<dyn Protocol>,
    filters: ExtensionLoader<dyn Filter>,
}

impl ProtocolFilterWrapper {
    /// Wraps `protocol`.
    pub fn new(protocol: Arc<dyn Protocol>, filters: ExtensionLoader<dyn Filter>) -> Self {
        Self { protocol, filters }
    }
}

#[async_trait]
impl Protocol for ProtocolFilterWrapper {
    fn default_port(&self) -> u16 {
        self.protocol.default_port()
    }

    async fn export(&self, invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError> {
        if is_registry(invoker.url()) {
            return self.protocol.export(invoker).await;
        }
        let filters = self.filters.activate_extensions_for_key(
            invoker.url(),
            constants::SERVICE_FILTER_KEY,
            Some(constants::PROVIDER),
        )?;
        self.protocol.export(build_chain(invoker, filters)).await
    }

    async fn refer(&self, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
        let invoker = self.protocol.refer(interface, url).await?;
        if is_registry(url) {
            return Ok(invoker);
        }
        let filters = self.filters.activate_extensions_for_key(
            url,
            constants::REFERENCE_FILTER_KEY,
            Some(constants::CONSUMER),
        )?;
        Ok(build_chain(invoker, filters))
    }

    fn destroy(&self) {
        self.protocol.destroy();
    }
}

/// Logs the export and reference lifecycle of the wrapped protocol.
pub struct ProtocolLoggingWrapper {
    protocol: Arc<dyn Protocol>,
}

impl ProtocolLoggingWrapper {
    /// Wraps `protocol`.
    pub fn new(protocol: Arc<dyn Protocol>) -> Self {
        Self { protocol }
    }
}

struct LoggedExporter {
    exporter: Arc<dyn Exporter>,
}

#[async_trait]
impl Exporter for LoggedExporter {
    fn invoker(&self) -> Arc<dyn Invoker> {
        self.exporter.invoker()
    }

    async fn unexport(&self) {
        let invoker = self.exporter.invoker();
        self.exporter.unexport().await;
        info!(url = %invoker.url(), "unexported service");
    }
}

#[async_trait]
impl Protocol for ProtocolLoggingWrapper {
    fn default_port(&self) -> u16 {
        self.protocol.default_port()
    }

    async fn export(&self, invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError> {
        let url = invoker.url().clone();
        let exporter = self.protocol.export(invoker).await?;
        if !is_registry(&url) {
            info!(url = %url, "exported service");
        }
        Ok(Arc::new(LoggedExporter { exporter }))
    }

    async fn refer(&self, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
        let invoker = self.protocol.refer(interface, url).await?;
        debug!(interface, url = %url, "referred service");
        Ok(invoker)
    }

    fn destroy(&self) {
        self.protocol.destroy();
    }
}
