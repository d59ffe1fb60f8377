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

//! Channel event handlers.

use crate::remoting::{Channel, Message, RemotingError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Receives the events of a [`Channel`].
///
/// Events of one channel are delivered from its reader task in order; a
/// dispatcher may move them onto a worker pool, after which only the order
/// of connect and disconnect is kept (and only by the `connection`
/// dispatcher).
#[async_trait]
pub trait ChannelHandler: Send + Sync + 'static {
    /// The channel is connected.
    async fn connected(&self, channel: &Channel) -> Result<(), RemotingError> {
        let _ = channel;
        Ok(())
    }

    /// The channel is closed.
    async fn disconnected(&self, channel: &Channel) -> Result<(), RemotingError> {
        let _ = channel;
        Ok(())
    }

    /// A message was written to the channel.
    async fn sent(&self, channel: &Channel, message: &Message) -> Result<(), RemotingError> {
        let _ = (channel, message);
        Ok(())
    }

    /// A message was read from the channel.
    async fn received(&self, channel: &Channel, message: Message) -> Result<(), RemotingError>;

    /// Another event failed, or the channel hit an error.
    async fn caught(&self, channel: &Channel, error: RemotingError) -> Result<(), RemotingError> {
        warn!(channel = %channel, error = %error, "unhandled channel error");
        Ok(())
    }
}

/// Decodes bodies the reader task left raw, then passes the message on.
pub struct DecodeHandler {
    inner: Arc<dyn ChannelHandler>,
}

impl DecodeHandler {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn ChannelHandler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChannelHandler for DecodeHandler {
    async fn connected(&self, channel: &Channel) -> Result<(), RemotingError> {
        self.inner.connected(channel).await
    }

    async fn disconnected(&self, channel: &Channel) -> Result<(), RemotingError> {
        self.inner.disconnected(channel).await
    }

    async fn sent(&self, channel: &Channel, message: &Message) -> Result<(), RemotingError> {
        self.inner.sent(channel, message).await
    }

    async fn received(&self, channel: &Channel, mut message: Message) -> Result<(), RemotingError> {
        channel.codec().decode_body(channel.url(), &mut message);
        self.inner.received(channel, message).await
    }

    async fn caught(&self, channel: &Channel, error: RemotingError) -> Result<(), RemotingError> {
        self.inner.caught(channel, error).await
    }
}
