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

//! The `dubbo` protocol: TCP servers shared per address, exporters keyed by
//! service key, clients shared per provider address.

use crate::common::{constants, HasUrl, Url};
use crate::extension::ExtensionLoader;
use crate::protocol::dubbo::{DubboCodec, DubboInvoker};
use crate::protocol::service_key;
use crate::remoting::exchange::{ExchangeClient, ExchangeConfig, ExchangeHandler, ExchangeServer};
use crate::remoting::{Channel, Dispatcher, ExchangeCodec, RemotingError};
use crate::rpc::{Exporter, Invocation, Invoker, Protocol, RemoteException, RpcResult, FORBIDDEN_EXCEPTION};
use crate::serialization::Serialization;
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

type ExporterMap = Arc<DashMap<String, Arc<dyn Invoker>>>;

struct SharedClient {
    client: ExchangeClient,
    references: usize,
}

/// The `dubbo` protocol.
pub struct DubboProtocol {
    me: Weak<DubboProtocol>,
    dispatcher: Arc<dyn Dispatcher>,
    codec: Arc<ExchangeCodec>,
    config: ExchangeConfig,
    exporters: ExporterMap,
    servers: tokio::sync::Mutex<HashMap<String, Arc<ExchangeServer>>>,
    shared_clients: Mutex<HashMap<String, SharedClient>>,
    invokers: Mutex<Vec<Weak<DubboInvoker>>>,
}

impl DubboProtocol {
    /// Creates the protocol; servers and clients dispatch with
    /// `dispatcher` and encode with `serializations`.
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        serializations: ExtensionLoader<dyn Serialization>,
    ) -> Arc<Self> {
        Self::with_config(dispatcher, serializations, ExchangeConfig::default())
    }

    /// As [`new`](Self::new), with explicit client tuning.
    pub fn with_config(
        dispatcher: Arc<dyn Dispatcher>,
        serializations: ExtensionLoader<dyn Serialization>,
        config: ExchangeConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            dispatcher,
            codec: Arc::new(ExchangeCodec::new(Arc::new(DubboCodec), serializations)),
            config,
            exporters: Arc::new(DashMap::new()),
            servers: tokio::sync::Mutex::new(HashMap::new()),
            shared_clients: Mutex::new(HashMap::new()),
            invokers: Mutex::new(Vec::new()),
        })
    }

    /// Service keys of every exported invoker.
    pub fn exported_keys(&self) -> Vec<String> {
        self.exporters.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Addresses of the open servers.
    pub async fn server_addresses(&self) -> Vec<String> {
        self.servers.lock().await.keys().cloned().collect()
    }

    fn handler(&self) -> Arc<dyn ExchangeHandler> {
        Arc::new(DubboExchangeHandler {
            exporters: self.exporters.clone(),
        })
    }

    async fn open_server(&self, url: &Url) -> Result<(), RemotingError> {
        let address = url.address();
        let mut servers = self.servers.lock().await;
        if servers.get(&address).is_some_and(|server| server.is_bound()) {
            return Ok(());
        }
        let server = ExchangeServer::bind(url, self.codec.clone(), self.handler(), &*self.dispatcher).await?;
        servers.insert(address, Arc::new(server));
        Ok(())
    }

    async fn connect(&self, url: &Url) -> Result<ExchangeClient, RemotingError> {
        ExchangeClient::connect(
            url,
            self.codec.clone(),
            self.handler(),
            &*self.dispatcher,
            self.config.clone(),
        )
        .await
    }

    async fn shared_client(&self, url: &Url) -> Result<ExchangeClient, RemotingError> {
        let address = url.address();
        {
            let mut clients = self.shared_clients.lock();
            if let Some(shared) = clients.get_mut(&address) {
                if !shared.client.is_closed() {
                    shared.references += 1;
                    return Ok(shared.client.clone());
                }
                clients.remove(&address);
            }
        }
        let client = self.connect(url).await?;
        let mut clients = self.shared_clients.lock();
        if let Some(shared) = clients.get_mut(&address) {
            shared.references += 1;
            client.close();
            return Ok(shared.client.clone());
        }
        clients.insert(
            address,
            SharedClient {
                client: client.clone(),
                references: 1,
            },
        );
        Ok(client)
    }

    pub(crate) fn release_shared_client(&self, client: &ExchangeClient) {
        let address = client.url().address();
        let mut clients = self.shared_clients.lock();
        if let Some(shared) = clients.get_mut(&address) {
            shared.references = shared.references.saturating_sub(1);
            if shared.references == 0 {
                debug!(address = %address, "closing last reference to shared client");
                shared.client.close();
                clients.remove(&address);
            }
        }
    }

    pub(crate) fn forget_invoker(&self, invoker: &DubboInvoker) {
        self.invokers
            .lock()
            .retain(|weak| !std::ptr::eq(weak.as_ptr(), invoker) && weak.strong_count() > 0);
    }
}

#[async_trait]
impl Protocol for DubboProtocol {
    fn default_port(&self) -> u16 {
        constants::DEFAULT_DUBBO_PORT
    }

    async fn export(&self, invoker: Arc<dyn Invoker>) -> Result<Arc<dyn Exporter>, RpcError> {
        let url = invoker.url().clone();
        let key = service_key(
            url.port(),
            url.path(),
            url.parameter(constants::VERSION_KEY),
            url.parameter(constants::GROUP_KEY),
        );
        self.exporters.insert(key.clone(), invoker.clone());
        if let Err(err) = self.open_server(&url).await {
            self.exporters.remove(&key);
            let message = format!("Failed to export service {key} on {}, cause: {err}", url.address());
            return Err(RpcError::from(err).with_message(message));
        }
        debug!(key = %key, "exporter registered");
        Ok(Arc::new(DubboExporter {
            key,
            invoker,
            exporters: self.exporters.clone(),
        }))
    }

    async fn refer(&self, interface: &str, url: &Url) -> Result<Arc<dyn Invoker>, RpcError> {
        let connections = url.get(constants::CONNECTIONS_KEY, 0usize);
        let shared = connections == 0;
        let mut clients = Vec::with_capacity(connections.max(1));
        let connected = if shared {
            self.shared_client(url).await.map(|client| clients.push(client))
        } else {
            let mut outcome = Ok(());
            for _ in 0..connections {
                match self.connect(url).await {
                    Ok(client) => clients.push(client),
                    Err(err) => {
                        outcome = Err(err);
                        break;
                    }
                }
            }
            outcome
        };
        if let Err(err) = connected {
            for client in &clients {
                client.close();
            }
            let message = format!("Fail to create remoting client for service({url}), cause: {err}");
            return Err(RpcError::from(err).with_message(message));
        }
        let invoker = Arc::new(DubboInvoker::new(interface, url, clients, shared, self.me.clone()));
        self.invokers.lock().push(Arc::downgrade(&invoker));
        Ok(invoker)
    }

    fn destroy(&self) {
        let servers = match self.servers.try_lock() {
            Ok(mut servers) => servers.drain().collect::<Vec<_>>(),
            Err(_) => {
                warn!("server map busy during destroy");
                Vec::new()
            }
        };
        for (address, server) in servers {
            info!(address = %address, "closing server");
            server.close();
        }
        let invokers: Vec<_> = self.invokers.lock().drain(..).collect();
        for invoker in invokers.iter().filter_map(Weak::upgrade) {
            invoker.destroy();
        }
        for (_, shared) in self.shared_clients.lock().drain() {
            shared.client.close();
        }
        for entry in self.exporters.iter() {
            entry.value().destroy();
        }
        self.exporters.clear();
    }
}

struct DubboExporter {
    key: String,
    invoker: Arc<dyn Invoker>,
    exporters: ExporterMap,
}

#[async_trait]
impl Exporter for DubboExporter {
    fn invoker(&self) -> Arc<dyn Invoker> {
        self.invoker.clone()
    }

    async fn unexport(&self) {
        self.exporters.remove(&self.key);
        self.invoker.destroy();
    }
}

struct DubboExchangeHandler {
    exporters: ExporterMap,
}

#[async_trait]
impl ExchangeHandler for DubboExchangeHandler {
    async fn reply(&self, channel: &Channel, invocation: Invocation) -> Result<RpcResult, RpcError> {
        let key = service_key(
            channel.local_addr().port(),
            invocation.attachment_or(constants::PATH_KEY, ""),
            invocation.attachment(constants::VERSION_KEY),
            invocation.attachment(constants::GROUP_KEY),
        );
        let invoker = self
            .exporters
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                let known: Vec<String> = self.exporters.iter().map(|entry| entry.key().clone()).collect();
                RpcError::unknown(format!(
                    "Not found exported service: {key} in {known:?}, may be version or group mismatch, \
                     channel: consumer: {} --> provider: {}, method: {}",
                    channel.remote_addr(),
                    channel.local_addr(),
                    invocation.method_name()
                ))
            })?;
        let outcome = match invoker.invoke(&invocation).await {
            Ok(result) => result.resolve().await,
            Err(err) => Err(err),
        };
        match outcome {
            Err(err) if err.kind() == RpcErrorKind::Forbidden => Ok(RpcResult::from_exception(
                RemoteException::new(FORBIDDEN_EXCEPTION, err.message()),
            )),
            other => other,
        }
    }
}
