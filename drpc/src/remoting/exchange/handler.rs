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

//! Request/response semantics on top of channel events.

use crate::remoting::exchange::PendingRequests;
use crate::remoting::{Channel, ChannelHandler, Message, Payload, RemotingError, Request, Response, Status};
use crate::rpc::{Invocation, RpcResult};
use crate::RpcError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Answers calls arriving on a server.
#[async_trait]
pub trait ExchangeHandler: Send + Sync + 'static {
    /// Produces the result of `invocation`. An error is sent back as a
    /// [`Status::SERVICE_ERROR`] response.
    async fn reply(&self, channel: &Channel, invocation: Invocation) -> Result<RpcResult, RpcError>;

    /// A peer connected.
    async fn connected(&self, channel: &Channel) -> Result<(), RemotingError> {
        let _ = channel;
        Ok(())
    }

    /// A peer disconnected.
    async fn disconnected(&self, channel: &Channel) -> Result<(), RemotingError> {
        let _ = channel;
        Ok(())
    }
}

/// Answers heartbeats and broken requests, routes calls to an
/// [`ExchangeHandler`] and completes pending requests with responses.
pub struct HeaderExchangeHandler {
    handler: Arc<dyn ExchangeHandler>,
    pending: Arc<PendingRequests>,
}

impl HeaderExchangeHandler {
    /// Creates a handler completing requests registered in `pending`.
    pub fn new(handler: Arc<dyn ExchangeHandler>, pending: Arc<PendingRequests>) -> Self {
        Self { handler, pending }
    }

    async fn handle_request(&self, channel: &Channel, request: Request) -> Result<(), RemotingError> {
        if request.event {
            if request.two_way {
                trace!(channel = %channel, id = request.id, "answering heartbeat");
                channel.send(&Response::heartbeat(request.id).into(), false).await?;
            }
            return Ok(());
        }

        if let Some(broken) = &request.broken {
            warn!(channel = %channel, id = request.id, cause = %broken, "undecodable request");
            if request.two_way {
                let response = Response::error(
                    request.id,
                    Status::BAD_REQUEST,
                    format!("Fail to decode request due to: {broken}"),
                );
                channel.send(&response.into(), false).await?;
            }
            return Ok(());
        }

        let Payload::Invocation(invocation) = request.data else {
            if request.two_way {
                let response = Response::error(request.id, Status::BAD_REQUEST, "request carries no invocation");
                channel.send(&response.into(), false).await?;
            }
            return Ok(());
        };

        let outcome = self.handler.reply(channel, invocation).await;
        if !request.two_way {
            if let Err(err) = outcome {
                warn!(channel = %channel, id = request.id, error = %err, "one-way invocation failed");
            }
            return Ok(());
        }
        let response = match outcome {
            Ok(result) => Response::ok(request.id, Payload::Result(result)),
            Err(err) => Response::error(request.id, Status::SERVICE_ERROR, err.to_string()),
        };
        if let Err(err) = channel.send(&response.into(), false).await {
            warn!(channel = %channel, id = request.id, error = %err, "failed to send response");
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelHandler for HeaderExchangeHandler {
    async fn connected(&self, channel: &Channel) -> Result<(), RemotingError> {
        self.handler.connected(channel).await
    }

    async fn disconnected(&self, channel: &Channel) -> Result<(), RemotingError> {
        let failed = self.pending.fail_channel(channel.id(), "channel disconnected");
        if failed > 0 {
            debug!(channel = %channel, failed, "failed outstanding requests of closed channel");
        }
        self.handler.disconnected(channel).await
    }

    async fn sent(&self, _channel: &Channel, message: &Message) -> Result<(), RemotingError> {
        if let Message::Request(request) = message {
            self.pending.sent(request.id);
        }
        Ok(())
    }

    async fn received(&self, channel: &Channel, message: Message) -> Result<(), RemotingError> {
        match message {
            Message::Request(request) => self.handle_request(channel, request).await,
            Message::Response(response) if response.is_heartbeat() => {
                trace!(channel = %channel, id = response.id, "heartbeat answered");
                Ok(())
            }
            Message::Response(response) => {
                self.pending.received(response);
                Ok(())
            }
        }
    }
}
