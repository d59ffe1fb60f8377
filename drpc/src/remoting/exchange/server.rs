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

//! Exchange servers.

use crate::common::{constants, now_millis, Url};
use crate::remoting::exchange::{ExchangeHandler, HeaderExchangeHandler, PendingRequests};
use crate::remoting::{
    Channel, ChannelHandler, DecodeHandler, Dispatcher, ExchangeCodec, RemotingError, TcpServer,
};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// A server answering calls with an [`ExchangeHandler`].
///
/// Channels that stay silent for three heartbeat periods are closed.
pub struct ExchangeServer {
    server: Arc<TcpServer>,
    idle_check: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ExchangeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeServer")
            .field("local_addr", &self.server.local_addr())
            .finish()
    }
}

impl ExchangeServer {
    /// Binds a server for `url`.
    ///
    /// # Errors
    ///
    /// Fails when the dispatcher cannot be built or the address cannot be
    /// bound.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn bind(
        url: &Url,
        codec: Arc<ExchangeCodec>,
        handler: Arc<dyn ExchangeHandler>,
        dispatcher: &dyn Dispatcher,
    ) -> Result<Self, RemotingError> {
        let exchange: Arc<dyn ChannelHandler> = Arc::new(HeaderExchangeHandler::new(
            handler,
            Arc::new(PendingRequests::new()),
        ));
        let handler = dispatcher.dispatch(Arc::new(DecodeHandler::new(exchange)), url)?;
        let server = Arc::new(TcpServer::bind(url, codec, handler).await?);

        let heartbeat = url.get(constants::HEARTBEAT_KEY, constants::DEFAULT_HEARTBEAT);
        let idle_check = (heartbeat > 0).then(|| {
            let idle_timeout = url
                .get(constants::HEARTBEAT_TIMEOUT_KEY, heartbeat * 3)
                .max(heartbeat * 2);
            tokio::spawn(close_idle(
                Arc::downgrade(&server),
                Duration::from_millis(heartbeat),
                idle_timeout as i64,
            ))
        });
        Ok(Self { server, idle_check })
    }

    /// The URL the server was bound for.
    pub fn url(&self) -> &Url {
        self.server.url()
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Connected channels.
    pub fn channels(&self) -> Vec<Channel> {
        self.server.channels()
    }

    /// Whether the server still accepts connections.
    pub fn is_bound(&self) -> bool {
        self.server.is_bound()
    }

    /// Stops accepting and closes every channel.
    pub fn close(&self) {
        if let Some(task) = &self.idle_check {
            task.abort();
        }
        self.server.close();
    }
}

impl Drop for ExchangeServer {
    fn drop(&mut self) {
        self.close();
    }
}

async fn close_idle(server: Weak<TcpServer>, period: Duration, idle_timeout: i64) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(server) = server.upgrade() else {
            return;
        };
        let now = now_millis();
        for channel in server.channels() {
            if now - channel.last_read() > idle_timeout {
                warn!(channel = %channel, "closing idle channel");
                channel.close();
            }
        }
        if !server.is_bound() {
            info!(local_addr = %server.local_addr(), "idle check stopped");
            return;
        }
    }
}
