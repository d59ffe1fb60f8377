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

//! Outstanding requests and the futures waiting on them.

use crate::remoting::{Channel, Payload, RemotingError, Response, Status};
use crate::rpc::RpcResult;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

type Completion = oneshot::Sender<Result<Response, RemotingError>>;

struct Pending {
    channel_id: u64,
    channel: String,
    started: Instant,
    sent: Option<Instant>,
    timeout: Duration,
    completion: Completion,
}

/// The requests of one client awaiting a response, keyed by correlation id.
///
/// Every entry is completed exactly once: by its response, by the timeout
/// scan, by a cancel, or by its channel closing. Whichever removes the entry
/// from the map first completes it.
#[derive(Default)]
pub struct PendingRequests {
    requests: DashMap<u64, Pending>,
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("len", &self.requests.len())
            .finish()
    }
}

impl PendingRequests {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers request `id` sent on `channel`, expiring after `timeout`.
    pub fn register(&self, channel: &Channel, id: u64, timeout: Duration) -> ResponseFuture {
        self.insert(channel.id(), channel.to_string(), id, timeout)
    }

    fn insert(&self, channel_id: u64, channel: String, id: u64, timeout: Duration) -> ResponseFuture {
        let (completion, receiver) = oneshot::channel();
        self.requests.insert(
            id,
            Pending {
                channel_id,
                channel,
                started: Instant::now(),
                sent: None,
                timeout,
                completion,
            },
        );
        ResponseFuture { id, receiver }
    }

    /// Marks request `id` as written.
    pub fn sent(&self, id: u64) {
        if let Some(mut pending) = self.requests.get_mut(&id) {
            pending.sent = Some(Instant::now());
        }
    }

    /// Completes the request answered by `response`. Returns `false` when
    /// nothing waits for it any more.
    pub fn received(&self, response: Response) -> bool {
        match self.requests.remove(&response.id) {
            Some((_, pending)) => {
                let _ = pending.completion.send(Ok(response));
                true
            }
            None => {
                warn!(
                    id = response.id,
                    status = %response.status,
                    "response arrived after its request timed out or was cancelled"
                );
                false
            }
        }
    }

    /// Fails request `id` with `error`.
    pub fn cancel(&self, id: u64, error: RemotingError) -> bool {
        match self.requests.remove(&id) {
            Some((_, pending)) => {
                let _ = pending.completion.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fails every request that has outlived its timeout; returns how many.
    pub fn scan_timeouts(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .requests
            .iter()
            .filter(|entry| now.duration_since(entry.started) >= entry.timeout)
            .map(|entry| *entry.key())
            .collect();
        let mut count = 0;
        for id in expired {
            if let Some((_, pending)) = self.requests.remove(&id) {
                let error = timeout_error(id, &pending, now);
                debug!(id, error = %error, "request timed out");
                let _ = pending.completion.send(Err(error));
                count += 1;
            }
        }
        count
    }

    /// Fails every request sent on channel `channel_id`.
    pub fn fail_channel(&self, channel_id: u64, reason: &str) -> usize {
        let ids: Vec<u64> = self
            .requests
            .iter()
            .filter(|entry| entry.channel_id == channel_id)
            .map(|entry| *entry.key())
            .collect();
        let mut count = 0;
        for id in ids {
            if let Some((_, pending)) = self.requests.remove(&id) {
                let message = format!("{reason}, request id {id} on {} failed", pending.channel);
                let _ = pending.completion.send(Err(RemotingError::connection_lost(message)));
                count += 1;
            }
        }
        count
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

fn timeout_error(id: u64, pending: &Pending, now: Instant) -> RemotingError {
    let elapsed = now.duration_since(pending.started);
    let message = match pending.sent {
        Some(sent) => format!(
            "Waiting server-side response timeout by scan timer. client elapsed: {} ms, \
             server elapsed: {} ms, timeout: {} ms, request id: {id}, channel: {}",
            sent.duration_since(pending.started).as_millis(),
            now.duration_since(sent).as_millis(),
            pending.timeout.as_millis(),
            pending.channel
        ),
        None => format!(
            "Sending request timeout in client-side by scan timer. client elapsed: {} ms, \
             timeout: {} ms, request id: {id}, channel: {}",
            elapsed.as_millis(),
            pending.timeout.as_millis(),
            pending.channel
        ),
    };
    RemotingError::Timeout {
        server_side: pending.sent.is_some(),
        elapsed,
        message,
    }
}

/// Resolves with the response to one request.
#[derive(Debug)]
pub struct ResponseFuture {
    id: u64,
    receiver: oneshot::Receiver<Result<Response, RemotingError>>,
}

impl ResponseFuture {
    /// Correlation id of the request.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response, RemotingError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RemotingError::connection_lost(format!(
                "request {} abandoned",
                self.id
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Converts a response into the call outcome it carries.
///
/// # Errors
///
/// A non-OK status becomes [`RemotingError::Status`].
pub fn response_result(response: Response) -> Result<RpcResult, RemotingError> {
    if !response.status.is_ok() {
        let message = response
            .error_message
            .unwrap_or_else(|| format!("status {}", response.status));
        return Err(RemotingError::Status {
            status: response.status,
            message,
        });
    }
    match response.result {
        Payload::Result(result) => Ok(result),
        Payload::Null => Ok(RpcResult::empty()),
        _ => Err(RemotingError::Status {
            status: Status::CLIENT_ERROR,
            message: format!("undecoded body in response {}", response.id),
        }),
    }
}
