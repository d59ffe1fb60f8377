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

//! Invokers and exporters.

use crate::common::{HasUrl, Url};
use crate::rpc::{Invocation, RpcResult};
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;

/// A handle that performs invocations against one target: a remote
/// provider, a local service, or a whole cluster.
#[async_trait]
pub trait Invoker: HasUrl + Send + Sync + 'static {
    /// The served interface name.
    fn interface(&self) -> &str;

    /// Whether the target can currently take calls.
    fn is_available(&self) -> bool;

    /// Performs `invocation`.
    ///
    /// # Errors
    ///
    /// Transport and lookup failures. Service exceptions are carried inside
    /// the returned [`RpcResult`].
    async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError>;

    /// Releases the invoker's resources. Later calls fail.
    fn destroy(&self);
}

/// A published invoker; dropping the export requires [`unexport`].
///
/// [`unexport`]: Exporter::unexport
#[async_trait]
pub trait Exporter: Send + Sync + 'static {
    /// The exported invoker.
    fn invoker(&self) -> Arc<dyn Invoker>;

    /// Withdraws the export and destroys the invoker.
    async fn unexport(&self);
}

/// Whether `a` and `b` are the same invoker instance.
pub fn same_invoker(a: &Arc<dyn Invoker>, b: &Arc<dyn Invoker>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Whether `invokers` contains `invoker`, compared by identity.
pub fn contains_invoker(invokers: &[Arc<dyn Invoker>], invoker: &Arc<dyn Invoker>) -> bool {
    invokers.iter().any(|candidate| same_invoker(candidate, invoker))
}

/// Presents an invoker under a different URL, for example a provider URL
/// behind a registry URL.
pub struct InvokerDelegate {
    invoker: Arc<dyn Invoker>,
    url: Url,
}

impl InvokerDelegate {
    /// Wraps `invoker`, reporting `url` instead of its own.
    pub fn new(invoker: Arc<dyn Invoker>, url: Url) -> Self {
        Self { invoker, url }
    }

    /// The wrapped invoker.
    pub fn inner(&self) -> &Arc<dyn Invoker> {
        &self.invoker
    }
}

impl HasUrl for InvokerDelegate {
    fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Invoker for InvokerDelegate {
    fn interface(&self) -> &str {
        self.invoker.interface()
    }

    fn is_available(&self) -> bool {
        self.invoker.is_available()
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        self.invoker.invoke(invocation).await
    }

    fn destroy(&self) {
        self.invoker.destroy();
    }
}
