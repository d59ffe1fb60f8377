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

//! The remoting layer: frames, channels, dispatch and request exchange.
//!
//! Data flows through these pieces on a call:
//!
//! ```text
//! ExchangeClient ─request─▶ Channel ─ExchangeCodec─▶ TCP ─▶ reader task
//!                                                              │
//!           Dispatcher (worker pool) ◀─ DecodeHandler ◀────────┘
//!                 │
//!                 ▼
//!      HeaderExchangeHandler ─▶ ExchangeHandler::reply / PendingRequests
//! ```

mod channel;
mod codec;
mod dispatcher;
mod error;
pub mod exchange;
mod handler;
mod message;
mod reconnect;
mod threadpool;
mod transport;

pub use channel::Channel;
pub use codec::{
    BodyCodec, ExchangeCodec, FrameHeader, FLAG_EVENT, FLAG_REQUEST, FLAG_TWOWAY, HEADER_LENGTH,
    MAGIC, SERIALIZATION_MASK,
};
pub use dispatcher::{
    AdaptiveDispatcher, AllDispatcher, ConnectionOrderedDispatcher, DirectDispatcher, Dispatcher,
    ExecutionDispatcher, MessageOnlyDispatcher,
};
pub use error::RemotingError;
pub use handler::{ChannelHandler, DecodeHandler};
pub use message::{Message, Payload, RawBody, Request, Response, Status};
pub use reconnect::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use threadpool::{
    AdaptiveThreadPool, CachedThreadPool, Executor, FixedThreadPool, Job, LimitedThreadPool,
    QueueKind, ThreadPool,
};
pub use transport::{connect, TcpServer};
