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

//! Exchange clients: one reconnecting connection with request correlation.

use crate::common::{constants, now_millis, Url};
use crate::remoting::exchange::{
    ExchangeConfig, ExchangeHandler, HeaderExchangeHandler, PendingRequests, ResponseFuture,
};
use crate::remoting::{
    transport, Channel, ChannelHandler, DecodeHandler, Dispatcher, ExchangeCodec, Payload,
    RemotingError, Request,
};
use crate::rpc::Invocation;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

struct ClientInner {
    url: Url,
    codec: Arc<ExchangeCodec>,
    handler: Arc<dyn ChannelHandler>,
    pending: Arc<PendingRequests>,
    channel: RwLock<Option<Channel>>,
    config: ExchangeConfig,
    closed: AtomicBool,
    reconnecting: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        if let Some(channel) = self.channel.get_mut().take() {
            channel.close();
        }
    }
}

/// A client connection to one server.
///
/// Requests are correlated with their responses through a
/// [`PendingRequests`] map that a scanner task sweeps for timeouts. A
/// heartbeat task keeps the connection alive and reconnects, with
/// exponential backoff, when nothing has been read for three heartbeat
/// periods.
#[derive(Clone)]
pub struct ExchangeClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("url", &self.inner.url.to_string())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ExchangeClient {
    /// Connects to the server at `url`.
    ///
    /// # Errors
    ///
    /// Fails when the initial connection cannot be established.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(
        url: &Url,
        codec: Arc<ExchangeCodec>,
        handler: Arc<dyn ExchangeHandler>,
        dispatcher: &dyn Dispatcher,
        config: ExchangeConfig,
    ) -> Result<Self, RemotingError> {
        let pending = Arc::new(PendingRequests::new());
        let exchange: Arc<dyn ChannelHandler> =
            Arc::new(HeaderExchangeHandler::new(handler, pending.clone()));
        let handler = dispatcher.dispatch(Arc::new(DecodeHandler::new(exchange)), url)?;
        let channel = transport::connect(url, codec.clone(), handler.clone()).await?;
        info!(channel = %channel, "client connected");

        let client = Self {
            inner: Arc::new(ClientInner {
                url: url.clone(),
                codec,
                handler,
                pending,
                channel: RwLock::new(Some(channel)),
                config,
                closed: AtomicBool::new(false),
                reconnecting: tokio::sync::Mutex::new(()),
                tasks: Mutex::new(Vec::new()),
            }),
        };
        client.start_tasks();
        Ok(client)
    }

    fn start_tasks(&self) {
        let weak = Arc::downgrade(&self.inner);
        let scan = tokio::spawn(scan_timeouts(weak.clone(), self.inner.config.scan_interval));
        let mut tasks = vec![scan];
        let heartbeat = self.inner.url.get(constants::HEARTBEAT_KEY, constants::DEFAULT_HEARTBEAT);
        if heartbeat > 0 {
            let heartbeat_timeout = self
                .inner
                .url
                .get(constants::HEARTBEAT_TIMEOUT_KEY, heartbeat * 3)
                .max(heartbeat * 2);
            tasks.push(tokio::spawn(watch_heartbeat(
                weak,
                Duration::from_millis(heartbeat),
                heartbeat_timeout as i64,
            )));
        }
        *self.inner.tasks.lock() = tasks;
    }

    /// The URL this client connects to.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Whether the connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.current().map_or(false, |channel| channel.is_connected())
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of requests awaiting a response.
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }

    fn current(&self) -> Option<Channel> {
        self.inner.channel.read().clone()
    }

    async fn channel(&self) -> Result<Channel, RemotingError> {
        if self.is_closed() {
            return Err(RemotingError::Closed(format!("client to {}", self.inner.url.address())));
        }
        match self.current() {
            Some(channel) if channel.is_connected() => Ok(channel),
            _ => reconnect(&self.inner, 1).await,
        }
    }

    /// Sends `invocation` and registers a future for its response, expiring
    /// after `timeout`.
    ///
    /// # Errors
    ///
    /// Fails when the client is closed, the connection cannot be restored
    /// or the request cannot be written.
    pub async fn request(&self, invocation: Invocation, timeout: Duration) -> Result<ResponseFuture, RemotingError> {
        let channel = self.channel().await?;
        let request = Request::new(Payload::Invocation(invocation));
        let id = request.id;
        let future = self.inner.pending.register(&channel, id, timeout);
        if let Err(err) = channel.send(&request.into(), false).await {
            self.inner.pending.cancel(id, RemotingError::connection_lost("send failed"));
            return Err(err);
        }
        Ok(future)
    }

    /// Sends `invocation` without waiting for an answer. With `sent` set,
    /// returns once the frame has been written.
    ///
    /// # Errors
    ///
    /// As for [`request`](Self::request).
    pub async fn send(&self, invocation: Invocation, sent: bool) -> Result<(), RemotingError> {
        let channel = self.channel().await?;
        let mut request = Request::new(Payload::Invocation(invocation));
        request.two_way = false;
        channel.send(&request.into(), sent).await
    }

    /// Closes the connection. Outstanding requests fail.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(url = %self.inner.url, "closing client");
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(channel) = self.inner.channel.write().take() {
            self.inner.pending.fail_channel(channel.id(), "client closed");
            channel.close();
        }
    }

    /// Waits up to `timeout` for outstanding requests, then closes.
    pub async fn close_gracefully(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.inner.pending.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.close();
    }
}

async fn reconnect(inner: &Arc<ClientInner>, max_attempts: u32) -> Result<Channel, RemotingError> {
    let _guard = inner.reconnecting.lock().await;
    if let Some(channel) = inner.channel.read().clone() {
        if channel.is_connected() {
            return Ok(channel);
        }
    }
    let mut attempt = 0;
    loop {
        if inner.closed.load(Ordering::Acquire) {
            return Err(RemotingError::Closed(format!("client to {}", inner.url.address())));
        }
        match transport::connect(&inner.url, inner.codec.clone(), inner.handler.clone()).await {
            Ok(channel) => {
                info!(channel = %channel, attempt, "client reconnected");
                *inner.channel.write() = Some(channel.clone());
                return Ok(channel);
            }
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!(url = %inner.url, attempt, error = %err, "reconnect failed");
                    return Err(err);
                }
                tokio::time::sleep(inner.config.reconnect.delay(attempt)).await;
            }
        }
    }
}

async fn scan_timeouts(inner: Weak<ClientInner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.pending.scan_timeouts();
    }
}

async fn watch_heartbeat(inner: Weak<ClientInner>, heartbeat: Duration, heartbeat_timeout: i64) {
    let mut interval = tokio::time::interval(heartbeat);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.closed.load(Ordering::Acquire) {
            return;
        }
        let channel = inner.channel.read().clone();
        if let Some(channel) = channel.filter(Channel::is_connected) {
            let now = now_millis();
            if now - channel.last_read() <= heartbeat_timeout {
                if now - channel.last_read().max(channel.last_write()) >= heartbeat.as_millis() as i64 {
                    debug!(channel = %channel, "sending heartbeat");
                    if let Err(err) = channel.send(&Request::heartbeat().into(), false).await {
                        warn!(channel = %channel, error = %err, "failed to send heartbeat");
                    }
                }
                continue;
            }
            warn!(channel = %channel, "no frames received within heartbeat timeout, reconnecting");
            channel.close();
        }
        if inner.url.get(constants::RECONNECT_KEY, true) {
            let attempts = inner.config.reconnect_attempts;
            if let Err(err) = reconnect(&inner, attempts).await {
                debug!(url = %inner.url, error = %err, "reconnect attempt failed");
            }
        }
    }
}
