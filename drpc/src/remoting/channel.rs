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

//! Framed duplex channels over TCP.

use crate::common::{now_millis, Url};
use crate::remoting::{ChannelHandler, ExchangeCodec, Message, RemotingError};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

const READ_BUFFER_SIZE: usize = 8 * 1024;

struct Outbound {
    bytes: Bytes,
    done: Option<oneshot::Sender<Result<(), RemotingError>>>,
}

struct ChannelInner {
    id: u64,
    url: Url,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    codec: Arc<ExchangeCodec>,
    handler: Arc<dyn ChannelHandler>,
    writer: mpsc::UnboundedSender<Outbound>,
    closing: watch::Sender<bool>,
    closed: AtomicBool,
    last_read: AtomicI64,
    last_write: AtomicI64,
}

/// One TCP connection carrying frames.
///
/// A channel owns a writer task, which writes frames in the order they were
/// sent, and a reader task, which decodes inbound frames and passes them to
/// the channel's [`ChannelHandler`]. Cloning a channel yields another handle
/// to the same connection.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Starts the reader and writer tasks for `stream`.
    ///
    /// The handler sees `connected` before any `received`, and
    /// `disconnected` once the reader stops.
    ///
    /// # Errors
    ///
    /// Fails when the socket addresses cannot be read.
    pub fn spawn(
        stream: TcpStream,
        url: Url,
        codec: Arc<ExchangeCodec>,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<Channel, RemotingError> {
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "failed to set TCP_NODELAY");
        }
        let (read_half, write_half) = stream.into_split();
        let (writer, outbound) = mpsc::unbounded_channel();
        let (closing, _) = watch::channel(false);
        let now = now_millis();
        let channel = Channel {
            inner: Arc::new(ChannelInner {
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
                url,
                local_addr,
                remote_addr,
                codec,
                handler,
                writer,
                closing,
                closed: AtomicBool::new(false),
                last_read: AtomicI64::new(now),
                last_write: AtomicI64::new(now),
            }),
        };
        tokio::spawn(write_loop(channel.clone(), write_half, outbound));
        tokio::spawn(read_loop(channel.clone(), read_half));
        Ok(channel)
    }

    /// Process-unique channel id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The URL of the endpoint owning this channel.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Peer socket address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    /// Whether the channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire)
    }

    /// Millisecond timestamp of the last inbound frame.
    pub fn last_read(&self) -> i64 {
        self.inner.last_read.load(Ordering::Relaxed)
    }

    /// Millisecond timestamp of the last outbound frame.
    pub fn last_write(&self) -> i64 {
        self.inner.last_write.load(Ordering::Relaxed)
    }

    /// Encodes `message` and queues it for writing. With `sent` set, waits
    /// until the frame has been written to the socket.
    ///
    /// # Errors
    ///
    /// Fails when the channel is closed, the message cannot be encoded or,
    /// with `sent`, the write fails.
    pub async fn send(&self, message: &Message, sent: bool) -> Result<(), RemotingError> {
        if !self.is_connected() {
            return Err(RemotingError::Closed(self.to_string()));
        }
        let mut buf = BytesMut::new();
        self.inner.codec.encode(&self.inner.url, message, &mut buf)?;
        let (done, written) = if sent {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        self.inner
            .writer
            .send(Outbound { bytes: buf.freeze(), done })
            .map_err(|_| RemotingError::Closed(self.to_string()))?;
        if let Some(written) = written {
            written
                .await
                .map_err(|_| RemotingError::connection_lost(format!("{self} closed while writing")))??;
        }
        self.inner.handler.sent(self, message).await
    }

    /// Closes the channel. The reader reports `disconnected` once it stops.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!(channel = %self, "closing channel");
            self.inner.closing.send_replace(true);
        }
    }

    pub(crate) fn codec(&self) -> &ExchangeCodec {
        &self.inner.codec
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Channel {}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel {} {} -> {}",
            self.inner.id, self.inner.local_addr, self.inner.remote_addr
        )
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("local_addr", &self.inner.local_addr)
            .field("remote_addr", &self.inner.remote_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn write_loop(
    channel: Channel,
    mut stream: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut closing = channel.inner.closing.subscribe();
    loop {
        let next = tokio::select! {
            next = outbound.recv() => next,
            _ = closing.wait_for(|closing| *closing) => None,
        };
        let Some(Outbound { bytes, done }) = next else {
            break;
        };
        let result = stream.write_all(&bytes).await.map_err(RemotingError::from);
        if result.is_ok() {
            channel.inner.last_write.store(now_millis(), Ordering::Relaxed);
            trace!(channel = %channel, len = bytes.len(), "frame written");
        }
        let failed = result.as_ref().err().map(ToString::to_string);
        if let Some(done) = done {
            let _ = done.send(result);
        }
        if let Some(reason) = failed {
            warn!(channel = %channel, error = %reason, "write failed");
            channel.close();
            break;
        }
    }
    let _ = stream.shutdown().await;
}

async fn read_loop(channel: Channel, mut stream: OwnedReadHalf) {
    let handler = channel.inner.handler.clone();
    if let Err(err) = handler.connected(&channel).await {
        let _ = handler.caught(&channel, err).await;
    }

    let mut closing = channel.inner.closing.subscribe();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    'read: loop {
        if buf.capacity() - buf.len() < READ_BUFFER_SIZE / 2 {
            buf.reserve(READ_BUFFER_SIZE);
        }
        let read = tokio::select! {
            read = stream.read_buf(&mut buf) => read,
            _ = closing.wait_for(|closing| *closing) => break,
        };
        match read {
            Ok(0) => {
                debug!(channel = %channel, "peer closed connection");
                break;
            }
            Ok(_) => {
                channel.inner.last_read.store(now_millis(), Ordering::Relaxed);
            }
            Err(err) => {
                let _ = handler.caught(&channel, err.into()).await;
                break;
            }
        }
        loop {
            match channel.inner.codec.decode(&channel.inner.url, &mut buf) {
                Ok(Some(message)) => {
                    trace!(channel = %channel, id = message.id(), "frame received");
                    if let Err(err) = handler.received(&channel, message).await {
                        let _ = handler.caught(&channel, err).await;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(channel = %channel, error = %err, "undecodable frame, closing");
                    let _ = handler.caught(&channel, err).await;
                    break 'read;
                }
            }
        }
    }

    channel.close();
    if let Err(err) = handler.disconnected(&channel).await {
        let _ = handler.caught(&channel, err).await;
    }
}
