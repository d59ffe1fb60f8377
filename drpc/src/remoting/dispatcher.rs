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

//! Dispatchers decide which channel events run on a worker pool.
//!
//! | Name         | On the pool                         |
//! |--------------|-------------------------------------|
//! | `all`        | every event                         |
//! | `direct`     | nothing                             |
//! | `message`    | requests and responses              |
//! | `execution`  | requests                            |
//! | `connection` | connect and disconnect, one at a time |
//!
//! Events not moved to a pool run on the channel's reader task.

use crate::common::Url;
use crate::remoting::{
    Channel, ChannelHandler, Executor, Message, RemotingError, Response, Status, ThreadPool,
};
use crate::spi;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Wraps a channel handler with a dispatch policy.
#[spi(name = "drpc.remoting.Dispatcher", default = "all")]
pub trait Dispatcher: Send + Sync {
    /// Wraps `handler` for the endpoint at `url`.
    #[adaptive("dispatcher", "dispather", "channel.handler")]
    fn dispatch(
        &self,
        handler: Arc<dyn ChannelHandler>,
        url: &Url,
    ) -> Result<Arc<dyn ChannelHandler>, RemotingError>;
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    events: bool,
    requests: bool,
    responses: bool,
}

struct ExecutorChannelHandler {
    inner: Arc<dyn ChannelHandler>,
    executor: Arc<Executor>,
    placement: Placement,
}

#[async_trait]
impl ChannelHandler for ExecutorChannelHandler {
    async fn connected(&self, channel: &Channel) -> Result<(), RemotingError> {
        if !self.placement.events {
            return self.inner.connected(channel).await;
        }
        let inner = self.inner.clone();
        let channel = channel.clone();
        self.executor.execute(async move {
            if let Err(err) = inner.connected(&channel).await {
                let _ = inner.caught(&channel, err).await;
            }
        })
    }

    async fn disconnected(&self, channel: &Channel) -> Result<(), RemotingError> {
        if !self.placement.events {
            return self.inner.disconnected(channel).await;
        }
        let inner = self.inner.clone();
        let channel = channel.clone();
        self.executor.execute(async move {
            if let Err(err) = inner.disconnected(&channel).await {
                let _ = inner.caught(&channel, err).await;
            }
        })
    }

    async fn sent(&self, channel: &Channel, message: &Message) -> Result<(), RemotingError> {
        self.inner.sent(channel, message).await
    }

    async fn received(&self, channel: &Channel, message: Message) -> Result<(), RemotingError> {
        let pooled = match &message {
            Message::Request(_) => self.placement.requests,
            Message::Response(_) => self.placement.responses,
        };
        if !pooled {
            return self.inner.received(channel, message).await;
        }

        let reply_to = match &message {
            Message::Request(request) if request.two_way && !request.event => Some(request.id),
            _ => None,
        };
        let inner = self.inner.clone();
        let task_channel = channel.clone();
        let submitted = self.executor.execute(async move {
            if let Err(err) = inner.received(&task_channel, message).await {
                let _ = inner.caught(&task_channel, err).await;
            }
        });
        match (submitted, reply_to) {
            (Ok(()), _) => Ok(()),
            (Err(RemotingError::ExecutionRejected { message }), Some(id)) => {
                warn!(channel = %channel, id, "request rejected by worker pool");
                let busy = Response::error(id, Status::SERVER_THREADPOOL_EXHAUSTED, message);
                channel.send(&busy.into(), false).await
            }
            (Err(err), _) => Err(err),
        }
    }

    async fn caught(&self, channel: &Channel, error: RemotingError) -> Result<(), RemotingError> {
        if !self.placement.events {
            return self.inner.caught(channel, error).await;
        }
        let inner = self.inner.clone();
        let task_channel = channel.clone();
        self.executor.execute(async move {
            let _ = inner.caught(&task_channel, error).await;
        })
    }
}

fn pooled(
    pool: &dyn ThreadPool,
    handler: Arc<dyn ChannelHandler>,
    url: &Url,
    placement: Placement,
) -> Result<Arc<dyn ChannelHandler>, RemotingError> {
    Ok(Arc::new(ExecutorChannelHandler {
        inner: handler,
        executor: pool.executor(url)?,
        placement,
    }))
}

/// Runs every event on the worker pool.
pub struct AllDispatcher {
    pool: Arc<dyn ThreadPool>,
}

impl AllDispatcher {
    /// Creates pools with `pool`.
    pub fn new(pool: Arc<dyn ThreadPool>) -> Self {
        Self { pool }
    }
}

impl Dispatcher for AllDispatcher {
    fn dispatch(
        &self,
        handler: Arc<dyn ChannelHandler>,
        url: &Url,
    ) -> Result<Arc<dyn ChannelHandler>, RemotingError> {
        let placement = Placement {
            events: true,
            requests: true,
            responses: true,
        };
        pooled(&*self.pool, handler, url, placement)
    }
}

/// Runs requests and responses on the worker pool.
pub struct MessageOnlyDispatcher {
    pool: Arc<dyn ThreadPool>,
}

impl MessageOnlyDispatcher {
    /// Creates pools with `pool`.
    pub fn new(pool: Arc<dyn ThreadPool>) -> Self {
        Self { pool }
    }
}

impl Dispatcher for MessageOnlyDispatcher {
    fn dispatch(
        &self,
        handler: Arc<dyn ChannelHandler>,
        url: &Url,
    ) -> Result<Arc<dyn ChannelHandler>, RemotingError> {
        let placement = Placement {
            events: false,
            requests: true,
            responses: true,
        };
        pooled(&*self.pool, handler, url, placement)
    }
}

/// Runs requests on the worker pool.
pub struct ExecutionDispatcher {
    pool: Arc<dyn ThreadPool>,
}

impl ExecutionDispatcher {
    /// Creates pools with `pool`.
    pub fn new(pool: Arc<dyn ThreadPool>) -> Self {
        Self { pool }
    }
}

impl Dispatcher for ExecutionDispatcher {
    fn dispatch(
        &self,
        handler: Arc<dyn ChannelHandler>,
        url: &Url,
    ) -> Result<Arc<dyn ChannelHandler>, RemotingError> {
        let placement = Placement {
            events: false,
            requests: true,
            responses: false,
        };
        pooled(&*self.pool, handler, url, placement)
    }
}

/// Runs every event on the reader task.
#[derive(Debug, Default)]
pub struct DirectDispatcher;

impl Dispatcher for DirectDispatcher {
    fn dispatch(
        &self,
        handler: Arc<dyn ChannelHandler>,
        _url: &Url,
    ) -> Result<Arc<dyn ChannelHandler>, RemotingError> {
        Ok(handler)
    }
}

/// Runs connect and disconnect on a single ordered worker.
#[derive(Debug, Default)]
pub struct ConnectionOrderedDispatcher;

impl Dispatcher for ConnectionOrderedDispatcher {
    fn dispatch(
        &self,
        handler: Arc<dyn ChannelHandler>,
        url: &Url,
    ) -> Result<Arc<dyn ChannelHandler>, RemotingError> {
        Ok(Arc::new(ConnectionOrderedHandler {
            inner: handler,
            ordered: Executor::ordered(format!("DrpcConnectionEvent-{}", url.address()), url.clone()),
        }))
    }
}

struct ConnectionOrderedHandler {
    inner: Arc<dyn ChannelHandler>,
    ordered: Arc<Executor>,
}

#[async_trait]
impl ChannelHandler for ConnectionOrderedHandler {
    async fn connected(&self, channel: &Channel) -> Result<(), RemotingError> {
        let inner = self.inner.clone();
        let channel = channel.clone();
        self.ordered.execute(async move {
            if let Err(err) = inner.connected(&channel).await {
                let _ = inner.caught(&channel, err).await;
            }
        })
    }

    async fn disconnected(&self, channel: &Channel) -> Result<(), RemotingError> {
        let inner = self.inner.clone();
        let channel = channel.clone();
        self.ordered.execute(async move {
            if let Err(err) = inner.disconnected(&channel).await {
                let _ = inner.caught(&channel, err).await;
            }
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionRegistry;
    use crate::protocol::DubboCodec;
    use crate::remoting::{DecodeHandler, ExchangeCodec, FixedThreadPool, Payload, QueueKind, Request};
    use crate::rpc::Invocation;
    use crate::serialization::Serialization;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::{mpsc, oneshot};

    tokio::task_local! {
        static READER: ();
    }

    fn on_reader() -> bool {
        READER.try_with(|_| ()).is_ok()
    }

    #[derive(Debug)]
    enum Event {
        Connected { reader: bool },
        Disconnected { reader: bool },
        Request { id: u64, reader: bool },
        Response { id: u64, reader: bool },
    }

    struct Recorder {
        events: mpsc::UnboundedSender<Event>,
        connect_delay: Duration,
    }

    #[async_trait]
    impl ChannelHandler for Recorder {
        async fn connected(&self, _channel: &Channel) -> Result<(), RemotingError> {
            let reader = on_reader();
            tokio::time::sleep(self.connect_delay).await;
            let _ = self.events.send(Event::Connected { reader });
            Ok(())
        }

        async fn disconnected(&self, _channel: &Channel) -> Result<(), RemotingError> {
            let _ = self.events.send(Event::Disconnected { reader: on_reader() });
            Ok(())
        }

        async fn received(&self, _channel: &Channel, message: Message) -> Result<(), RemotingError> {
            let reader = on_reader();
            let event = match message {
                Message::Request(request) => Event::Request { id: request.id, reader },
                Message::Response(response) => Event::Response { id: response.id, reader },
            };
            let _ = self.events.send(event);
            Ok(())
        }
    }

    /// Collects what the far end of the connection reads.
    struct Inbox(mpsc::UnboundedSender<Message>);

    #[async_trait]
    impl ChannelHandler for Inbox {
        async fn received(&self, _channel: &Channel, message: Message) -> Result<(), RemotingError> {
            let _ = self.0.send(message);
            Ok(())
        }
    }

    /// Hands out one shared pool.
    struct Shared(Arc<Executor>);

    impl ThreadPool for Shared {
        fn executor(&self, _url: &Url) -> Result<Arc<Executor>, RemotingError> {
            Ok(self.0.clone())
        }
    }

    fn url() -> Url {
        Url::parse("dubbo://127.0.0.1:20880/acme.Greeter?threads=2").unwrap()
    }

    /// A connected channel and a receiver of the messages its peer reads.
    async fn channel() -> (Channel, mpsc::UnboundedReceiver<Message>) {
        let codec = Arc::new(ExchangeCodec::new(
            Arc::new(DubboCodec),
            ExtensionRegistry::global().loader::<dyn Serialization>(),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let (quiet, _) = mpsc::unbounded_channel();
        let channel = Channel::spawn(server, url(), codec.clone(), Arc::new(Inbox(quiet))).unwrap();
        Channel::spawn(client, url(), codec, Arc::new(DecodeHandler::new(Arc::new(Inbox(tx))))).unwrap();
        (channel, rx)
    }

    fn recorder(connect_delay: Duration) -> (Arc<dyn ChannelHandler>, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { events, connect_delay }), rx)
    }

    fn request(id: u64) -> Message {
        Request::with_id(id, Payload::Invocation(Invocation::new("greet", ["java.lang.String"], vec![]))).into()
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// Feeds one event of each kind through `handler` from a reader task and
    /// returns them in the order connect, disconnect, request, response.
    async fn drive(handler: Arc<dyn ChannelHandler>, mut events: mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let (channel, _inbox) = channel().await;
        READER
            .scope((), async {
                handler.connected(&channel).await.unwrap();
                handler.disconnected(&channel).await.unwrap();
                handler.received(&channel, request(1)).await.unwrap();
                handler.received(&channel, Response::ok(2, Payload::Null).into()).await.unwrap();
            })
            .await;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(next(&mut events).await);
        }
        seen.sort_by_key(|event| match event {
            Event::Connected { .. } => 0,
            Event::Disconnected { .. } => 1,
            Event::Request { .. } => 2,
            Event::Response { .. } => 3,
        });
        seen
    }

    fn placement(events: &[Event]) -> Vec<bool> {
        events
            .iter()
            .map(|event| match event {
                Event::Connected { reader }
                | Event::Disconnected { reader }
                | Event::Request { reader, .. }
                | Event::Response { reader, .. } => *reader,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_execution_pools_only_requests() {
        let (handler, events) = recorder(Duration::ZERO);
        let handler = ExecutionDispatcher::new(Arc::new(FixedThreadPool))
            .dispatch(handler, &url())
            .unwrap();
        let seen = drive(handler, events).await;
        assert_eq!(placement(&seen), [true, true, false, true]);
        assert!(matches!(seen[2], Event::Request { id: 1, .. }));
        assert!(matches!(seen[3], Event::Response { id: 2, .. }));
    }

    #[tokio::test]
    async fn test_message_keeps_connection_events_on_reader() {
        let (handler, events) = recorder(Duration::ZERO);
        let handler = MessageOnlyDispatcher::new(Arc::new(FixedThreadPool))
            .dispatch(handler, &url())
            .unwrap();
        let seen = drive(handler, events).await;
        assert_eq!(placement(&seen), [true, true, false, false]);
    }

    #[tokio::test]
    async fn test_all_and_direct() {
        let (handler, events) = recorder(Duration::ZERO);
        let all = AllDispatcher::new(Arc::new(FixedThreadPool)).dispatch(handler, &url()).unwrap();
        assert_eq!(placement(&drive(all, events).await), [false, false, false, false]);

        let (handler, events) = recorder(Duration::ZERO);
        let direct = DirectDispatcher.dispatch(handler, &url()).unwrap();
        assert_eq!(placement(&drive(direct, events).await), [true, true, true, true]);
    }

    #[tokio::test]
    async fn test_connection_events_run_in_order() {
        let (handler, mut events) = recorder(Duration::from_millis(50));
        let handler = ConnectionOrderedDispatcher.dispatch(handler, &url()).unwrap();
        let (channel, _inbox) = channel().await;
        READER
            .scope((), async {
                handler.connected(&channel).await.unwrap();
                handler.disconnected(&channel).await.unwrap();
                handler.received(&channel, request(3)).await.unwrap();
            })
            .await;

        // The request is handled inline, before the delayed connect completes.
        assert!(matches!(next(&mut events).await, Event::Request { id: 3, reader: true }));
        assert!(matches!(next(&mut events).await, Event::Connected { reader: false }));
        assert!(matches!(next(&mut events).await, Event::Disconnected { reader: false }));
    }

    #[tokio::test]
    async fn test_rejected_request_is_answered_busy() {
        let pool = Executor::new("busy", url(), 1, 1, QueueKind::Handoff, None);
        let (release, hold) = oneshot::channel::<()>();
        pool.execute(async move {
            let _ = hold.await;
        })
        .unwrap();

        let (handler, _events) = recorder(Duration::ZERO);
        let handler = ExecutionDispatcher::new(Arc::new(Shared(pool)))
            .dispatch(handler, &url())
            .unwrap();
        let (channel, mut inbox) = channel().await;

        handler.received(&channel, request(77)).await.unwrap();
        match next(&mut inbox).await {
            Message::Response(response) => {
                assert_eq!(response.id, 77);
                assert_eq!(response.status, Status::SERVER_THREADPOOL_EXHAUSTED);
                let message = response.error_message.unwrap_or_default();
                assert!(message.contains("Thread pool is EXHAUSTED"), "{message}");
            }
            other => panic!("expected a response, got {other:?}"),
        }

        let mut oneway = Request::with_id(78, Payload::Null);
        oneway.two_way = false;
        let err = handler.received(&channel, oneway.into()).await.unwrap_err();
        assert!(matches!(err, RemotingError::ExecutionRejected { .. }));
        let _ = release.send(());
    }
}
