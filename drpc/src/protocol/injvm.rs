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

//! The `injvm` protocol: export and refer within one process.

use crate::common::{HasUrl, Url};
use crate::rpc::{Exporter, Invocation, Invoker, Protocol, RpcResult};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type ExporterMap = Arc<DashMap<String, Arc<dyn Invoker>>>;

/// Calls services exported in the same process without a network hop.
#[derive(Default)]
pub struct InjvmProtocol {
    exporters: ExporterMap,
}

impl InjvmProtocol {
    /// An empty protocol.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a service with `url`'s service key is exported here.
    pub fn is_exported(&self, url: &Url) -> bool {
        self.exporters.contains_key(&url.service_key())
    }
}

#[async_trait]
impl Protocol for InjvmProtocol {
    async fn export(&self, invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError> {
        let key = invoker.url().service_key();
        self.exporters.insert(key.clone(), invoker.clone());
        Ok(Arc::new(InjvmExporter {
            key,
            invoker,
            exporters: self.exporters.clone(),
        }))
    }

    async fn refer(&self, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
        Ok(Arc::new(InjvmInvoker {
            interface: interface.to_string(),
            key: url.service_key(),
            url: url.clone(),
            exporters: self.exporters.clone(),
            destroyed: AtomicBool::new(false),
        }))
    }

    fn destroy(&self) {
        for entry in self.exporters.iter() {
            entry.value().destroy();
        }
        self.exporters.clear();
    }
}

struct InjvmExporter {
    key: String,
    invoker: Arc<dyn Invoker>,
    exporters: ExporterMap,
}

#[async_trait]
impl Exporter for InjvmExporter {
    fn invoker(&self) -> Arc<dyn Invoker> {
        self.invoker.clone()
    }

    async fn unexport(&self) {
        self.exporters.remove(&self.key);
        self.invoker.destroy();
    }
}

struct InjvmInvoker {
    interface: String,
    key: String,
    url: Url,
    exporters: ExporterMap,
    destroyed: AtomicBool,
}

impl HasUrl for InjvmInvoker {
    fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Invoker for InjvmInvoker {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire) && self.exporters.contains_key(&self.key)
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        let exported = self.exporters.get(&self.key).map(|entry| entry.value().clone());
        match exported {
            Some(invoker) => invoker.invoke(invocation).await,
            None => Err(RpcError::new(
                RpcErrorKind::NoProvider,
                format!("Service [{}] not found.", self.key),
            )),
        }
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{DefaultProxyFactory, ProxyFactory, RemoteException, Service, Value};

    struct Echo;

    #[async_trait]
    impl Service for Echo {
        fn methods(&self) -> Vec<String> {
            vec!["echo".into()]
        }

        async fn call(&self, invocation: &Invocation) -> Result<Value, RemoteException> {
            Ok(invocation.arguments().first().cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_export_refer_unexport() {
        let protocol = InjvmProtocol::new();
        let url = Url::parse("injvm://127.0.0.1/demo.Echo?version=1.0").unwrap();
        let invoker = DefaultProxyFactory.get_invoker(Arc::new(Echo), "demo.Echo", &url).unwrap();
        let exporter = protocol.export(invoker).await.unwrap();
        assert!(protocol.is_exported(&url));

        let proxy = DefaultProxyFactory
            .get_proxy(protocol.refer("demo.Echo", &url).await.unwrap())
            .unwrap();
        let value = proxy.call("echo", ["java.lang.String"], vec!["hi".into()]).await.unwrap();
        assert_eq!(value, Value::from("hi"));

        exporter.unexport().await;
        let err = proxy.call("echo", ["java.lang.String"], vec!["hi".into()]).await.unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::NoProvider);
    }
}
