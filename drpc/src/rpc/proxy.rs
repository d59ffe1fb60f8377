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

//! Bridges between user services and invokers.

use crate::common::{constants, HasUrl, Url};
use crate::rpc::{Invocation, Invoker, RemoteException, RpcResult, Value};
use crate::spi;
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A service implementation published by a provider.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use drpc::rpc::{Invocation, RemoteException, Service, Value};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Service for Greeter {
///     fn methods(&self) -> Vec<String> {
///         vec!["sayHello".to_string()]
///     }
///
///     async fn call(&self, invocation: &Invocation) -> Result<Value, RemoteException> {
///         let name = invocation.arguments().first().and_then(Value::as_str).unwrap_or("world");
///         Ok(Value::from(format!("hello {name}")))
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Names of the methods the service answers, advertised in its URL.
    fn methods(&self) -> Vec<String>;

    /// Runs one method. A returned exception travels back to the consumer
    /// as a service exception.
    async fn call(&self, invocation: &Invocation) -> Result<Value, RemoteException>;
}

/// The consumer-side face of a referred service.
#[derive(Clone)]
pub struct ServiceProxy {
    invoker: Arc<dyn Invoker>,
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("interface", &self.invoker.interface())
            .field("url", &self.invoker.url().to_string())
            .finish()
    }
}

impl ServiceProxy {
    /// Wraps `invoker`.
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    /// Calls `method` and returns its value.
    ///
    /// Asynchronous references resolve the pending result before returning.
    ///
    /// # Errors
    ///
    /// Transport failures, and service exceptions as
    /// [`RpcErrorKind::Biz`].
    pub async fn call<I, S>(&self, method: &str, parameter_types: I, arguments: Vec<Value>) -> Result<Value, RpcError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new(method, parameter_types, arguments);
        self.invoke(&invocation).await?.resolve().await?.recreate()
    }

    /// Performs `invocation`, returning the raw result. With `async=true`
    /// the result may still be pending.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        self.invoker.invoke(invocation).await
    }

    /// Sends `$echo` and returns the echoed value.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn echo(&self, value: Value) -> Result<Value, RpcError> {
        self.call(constants::ECHO_METHOD, ["java.lang.Object"], vec![value]).await
    }

    /// The invoker behind the proxy.
    pub fn invoker(&self) -> &Arc<dyn Invoker> {
        &self.invoker
    }
}

/// Creates proxies for consumers and invokers for providers.
#[spi(name = "drpc.rpc.ProxyFactory", default = "default")]
pub trait ProxyFactory: Send + Sync {
    /// Wraps a referred invoker.
    ///
    /// # Errors
    ///
    /// Extension lookup failures.
    #[adaptive("proxy", url = invoker)]
    fn get_proxy(&self, invoker: Arc<dyn Invoker>) -> Result<ServiceProxy, RpcError>;

    /// Wraps a service implementation into an invoker for `url`.
    ///
    /// # Errors
    ///
    /// Extension lookup failures.
    #[adaptive("proxy")]
    fn get_invoker(&self, service: Arc<dyn Service>, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError>;
}

/// The built-in proxy factory.
#[derive(Debug, Default)]
pub struct DefaultProxyFactory;

impl ProxyFactory for DefaultProxyFactory {
    fn get_proxy(&self, invoker: Arc<dyn Invoker>) -> Result<ServiceProxy, RpcError> {
        Ok(ServiceProxy::new(invoker))
    }

    fn get_invoker(&self, service: Arc<dyn Service>, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(ServiceInvoker {
            service,
            interface: interface.to_string(),
            url: url.clone(),
            destroyed: AtomicBool::new(false),
        }))
    }
}

/// Provider-side invoker calling a [`Service`].
struct ServiceInvoker {
    service: Arc<dyn Service>,
    interface: String,
    url: Url,
    destroyed: AtomicBool,
}

impl HasUrl for ServiceInvoker {
    fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Invoker for ServiceInvoker {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        if !self.is_available() {
            return Err(RpcError::new(
                RpcErrorKind::Unknown,
                format!("Service {} has been destroyed", self.interface),
            ));
        }
        Ok(match self.service.call(invocation).await {
            Ok(value) => RpcResult::new(value),
            Err(exception) => RpcResult::from_exception(exception),
        })
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}
