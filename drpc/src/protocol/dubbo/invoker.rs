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

//! Consumer-side invoker of the `dubbo` protocol.

use crate::common::{constants, local_host, version, HasUrl, Url, PROTOCOL_VERSION};
use crate::protocol::dubbo::DubboProtocol;
use crate::remoting::exchange::{response_result, ExchangeClient};
use crate::remoting::RemotingError;
use crate::rpc::{Invocation, Invoker, RpcResult};
use crate::{RpcError, RpcErrorKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Weak;
use std::time::Duration;
use tracing::debug;

/// Calls a remote service over one or more exchange clients.
pub struct DubboInvoker {
    interface: String,
    url: Url,
    clients: Vec<ExchangeClient>,
    shared: bool,
    index: AtomicUsize,
    destroyed: AtomicBool,
    destroy_lock: Mutex<()>,
    protocol: Weak<DubboProtocol>,
}

impl DubboInvoker {
    pub(crate) fn new(
        interface: &str,
        url: &Url,
        clients: Vec<ExchangeClient>,
        shared: bool,
        protocol: Weak<DubboProtocol>,
    ) -> Self {
        Self {
            interface: interface.to_string(),
            url: url.clone(),
            clients,
            shared,
            index: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
            destroy_lock: Mutex::new(()),
            protocol,
        }
    }

    fn next_client(&self) -> Result<&ExchangeClient, RpcError> {
        match self.clients.len() {
            0 => Err(RpcError::new(RpcErrorKind::Network, format!("no connection to {}", self.url.address()))),
            1 => Ok(&self.clients[0]),
            n => Ok(&self.clients[self.index.fetch_add(1, Ordering::Relaxed) % n]),
        }
    }

    fn failure(url: &Url, method: &str, error: RemotingError) -> RpcError {
        let timeout = error.is_timeout()
            || matches!(
                &error,
                RemotingError::Status { status, .. }
                    if *status == crate::remoting::Status::CLIENT_TIMEOUT
                        || *status == crate::remoting::Status::SERVER_TIMEOUT
            );
        if timeout {
            let message = format!("Invoke remote method timeout. method: {method}, provider: {url}, cause: {error}");
            return RpcError::new(RpcErrorKind::Timeout, message);
        }
        let message = format!("Failed to invoke remote method: {method}, provider: {url}, cause: {error}");
        RpcError::from(error).with_message(message)
    }
}

impl HasUrl for DubboInvoker {
    fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Invoker for DubboInvoker {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire) && self.clients.iter().any(ExchangeClient::is_connected)
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<RpcResult, RpcError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(RpcError::unknown(format!(
                "Rpc invoker for service {} on consumer {} use drpc version {} is DESTROYED, can not be invoked any more!",
                self.url,
                local_host(),
                version()
            )));
        }
        let method = invocation.method_name().to_string();
        let mut invocation = invocation.clone();
        invocation.set_attachment(constants::PATH_KEY, self.url.path());
        invocation.set_attachment(constants::VERSION_KEY, self.url.version());
        invocation.set_attachment_if_absent(constants::DUBBO_VERSION_KEY, PROTOCOL_VERSION);
        if let Some(group) = self.url.parameter(constants::GROUP_KEY) {
            invocation.set_attachment(constants::GROUP_KEY, group);
        }

        let timeout = self
            .url
            .method_get(&method, constants::TIMEOUT_KEY, constants::DEFAULT_TIMEOUT);
        invocation.set_attachment(constants::TIMEOUT_KEY, timeout.to_string());
        let is_async = self.url.method_get(&method, constants::ASYNC_KEY, false)
            || invocation.attachment(constants::ASYNC_KEY) == Some("true");
        let is_oneway = !self.url.method_get(&method, constants::RETURN_KEY, true);
        let client = self.next_client()?;

        if is_oneway {
            let sent = self.url.method_get(&method, constants::SENT_KEY, false);
            client
                .send(invocation, sent)
                .await
                .map_err(|err| Self::failure(&self.url, &method, err))?;
            return Ok(RpcResult::empty());
        }

        let future = client
            .request(invocation, Duration::from_millis(timeout))
            .await
            .map_err(|err| Self::failure(&self.url, &method, err))?;
        if is_async {
            let url = self.url.clone();
            debug!(id = future.id(), method = %method, "async invocation sent");
            return Ok(RpcResult::pending(Box::pin(async move {
                let response = future.await.map_err(|err| Self::failure(&url, &method, err))?;
                response_result(response).map_err(|err| Self::failure(&url, &method, err))
            })));
        }
        let response = future.await.map_err(|err| Self::failure(&self.url, &method, err))?;
        response_result(response).map_err(|err| Self::failure(&self.url, &method, err))
    }

    fn destroy(&self) {
        let _guard = self.destroy_lock.lock();
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(url = %self.url, "destroying invoker");
        match self.protocol.upgrade() {
            Some(protocol) => {
                for client in &self.clients {
                    if self.shared {
                        protocol.release_shared_client(client);
                    } else {
                        client.close();
                    }
                }
                protocol.forget_invoker(self);
            }
            None => {
                for client in &self.clients {
                    client.close();
                }
            }
        }
    }
}
