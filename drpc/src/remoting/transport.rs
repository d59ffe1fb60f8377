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

//! TCP servers and client connections.

use crate::common::{constants, Url};
use crate::remoting::{Channel, ChannelHandler, ExchangeCodec, Message, RemotingError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// A listening socket whose accepted connections become [`Channel`]s.
pub struct TcpServer {
    url: Url,
    local_addr: SocketAddr,
    channels: Arc<DashMap<u64, Channel>>,
    shutdown: watch::Sender<bool>,
}

impl TcpServer {
    /// Binds the host and port of `url` and starts accepting. With
    /// `anyhost=true` every interface is bound.
    ///
    /// # Errors
    ///
    /// Returns [`RemotingError::BindFailed`] if the address cannot be bound.
    #[instrument(skip(codec, handler), fields(url = %url))]
    pub async fn bind(
        url: &Url,
        codec: Arc<ExchangeCodec>,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<Self, RemotingError> {
        let host = if url.get(constants::ANYHOST_KEY, false) {
            constants::ANYHOST_VALUE
        } else {
            url.host()
        };
        let address = format!("{host}:{}", url.port());
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| RemotingError::BindFailed {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "server listening");

        let channels = Arc::new(DashMap::new());
        let (shutdown, closed) = watch::channel(false);
        let tracked: Arc<dyn ChannelHandler> = Arc::new(TrackingHandler {
            channels: channels.clone(),
            inner: handler,
        });
        tokio::spawn(accept_loop(listener, url.clone(), codec, tracked, closed));

        Ok(Self {
            url: url.clone(),
            local_addr,
            channels,
            shutdown,
        })
    }

    /// The URL the server was bound for.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Every connected channel.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Whether the server still accepts connections.
    pub fn is_bound(&self) -> bool {
        !*self.shutdown.borrow()
    }

    /// Stops accepting and closes every channel.
    pub fn close(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        info!(local_addr = %self.local_addr, "server closing");
        for channel in self.channels() {
            channel.close();
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(
    listener: TcpListener,
    url: Url,
    codec: Arc<ExchangeCodec>,
    handler: Arc<dyn ChannelHandler>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = closed.wait_for(|closed| *closed) => break,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                if let Err(err) = Channel::spawn(stream, url.clone(), codec.clone(), handler.clone()) {
                    warn!(%peer, error = %err, "failed to set up accepted connection");
                }
            }
            Err(err) => {
                error!(error = %err, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    debug!("accept loop stopped");
}

struct TrackingHandler {
    channels: Arc<DashMap<u64, Channel>>,
    inner: Arc<dyn ChannelHandler>,
}

#[async_trait]
impl ChannelHandler for TrackingHandler {
    async fn connected(&self, channel: &Channel) -> Result<(), RemotingError> {
        self.channels.insert(channel.id(), channel.clone());
        self.inner.connected(channel).await
    }

    async fn disconnected(&self, channel: &Channel) -> Result<(), RemotingError> {
        self.channels.remove(&channel.id());
        self.inner.disconnected(channel).await
    }

    async fn sent(&self, channel: &Channel, message: &Message) -> Result<(), RemotingError> {
        self.inner.sent(channel, message).await
    }

    async fn received(&self, channel: &Channel, message: Message) -> Result<(), RemotingError> {
        self.inner.received(channel, message).await
    }

    async fn caught(&self, channel: &Channel, error: RemotingError) -> Result<(), RemotingError> {
        self.inner.caught(channel, error).await
    }
}

/// Connects to the host and port of `url`, bounded by its
/// `connect.timeout`.
///
/// # Errors
///
/// Returns [`RemotingError::ConnectionFailed`] when the connection is
/// refused and [`RemotingError::Timeout`] when it takes too long.
#[instrument(skip(codec, handler), fields(url = %url))]
pub async fn connect(
    url: &Url,
    codec: Arc<ExchangeCodec>,
    handler: Arc<dyn ChannelHandler>,
) -> Result<Channel, RemotingError> {
    let address = url.address();
    let timeout = Duration::from_millis(url.get(constants::CONNECT_TIMEOUT_KEY, constants::DEFAULT_CONNECT_TIMEOUT));
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(RemotingError::ConnectionFailed { address, source }),
        Err(_) => {
            return Err(RemotingError::Timeout {
                server_side: false,
                elapsed: timeout,
                message: format!("client failed to connect to server {address}, client-side timeout {timeout:?}"),
            })
        }
    };
    let channel = Channel::spawn(stream, url.clone(), codec, handler)?;
    debug!(channel = %channel, "connected");
    Ok(channel)
}
