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

//! Exchange messages.

use crate::common::PROTOCOL_VERSION;
use crate::rpc::{Invocation, RpcResult};
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Response status code, carried in the fourth header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u8);

impl Status {
    /// Success.
    pub const OK: Status = Status(20);
    /// The client gave up before the request was sent or answered.
    pub const CLIENT_TIMEOUT: Status = Status(30);
    /// The server did not answer in time.
    pub const SERVER_TIMEOUT: Status = Status(31);
    /// The request could not be decoded.
    pub const BAD_REQUEST: Status = Status(40);
    /// The response could not be encoded or decoded.
    pub const BAD_RESPONSE: Status = Status(50);
    /// No exporter serves the requested service.
    pub const SERVICE_NOT_FOUND: Status = Status(60);
    /// The service invocation failed.
    pub const SERVICE_ERROR: Status = Status(70);
    /// The server failed outside the service.
    pub const SERVER_ERROR: Status = Status(80);
    /// The client failed to process the response.
    pub const CLIENT_ERROR: Status = Status(90);
    /// The server worker pool rejected the request.
    pub const SERVER_THREADPOOL_EXHAUSTED: Status = Status(100);

    /// Whether the status is [`Status::OK`].
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A body kept undecoded by the I/O task, to be decoded on a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBody {
    /// Content type id from the frame flags.
    pub serialization_id: u8,
    /// Body bytes.
    pub bytes: Bytes,
}

/// What a request or response carries.
#[derive(Debug, Default)]
pub enum Payload {
    /// Nothing, or the null body of an event.
    #[default]
    Null,
    /// A call.
    Invocation(Invocation),
    /// The outcome of a call.
    Result(RpcResult),
    /// An undecoded body.
    Raw(RawBody),
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A request frame.
#[derive(Debug)]
pub struct Request {
    /// Correlation id.
    pub id: u64,
    /// Protocol version.
    pub version: String,
    /// Whether the sender waits for a response.
    pub two_way: bool,
    /// Whether this is an event (heartbeat) rather than a call.
    pub event: bool,
    /// Why the body failed to decode, if it did.
    pub broken: Option<String>,
    /// The body.
    pub data: Payload,
}

impl Request {
    /// A two-way request with a fresh id.
    pub fn new(data: Payload) -> Self {
        Self::with_id(NEXT_ID.fetch_add(1, Ordering::Relaxed), data)
    }

    /// A two-way request with a given id.
    pub fn with_id(id: u64, data: Payload) -> Self {
        Self {
            id,
            version: PROTOCOL_VERSION.to_string(),
            two_way: true,
            event: false,
            broken: None,
            data,
        }
    }

    /// A two-way heartbeat with a fresh id.
    pub fn heartbeat() -> Self {
        Self {
            event: true,
            ..Self::new(Payload::Null)
        }
    }

    /// Whether this is a heartbeat event.
    pub fn is_heartbeat(&self) -> bool {
        self.event && matches!(self.data, Payload::Null)
    }
}

/// A response frame.
#[derive(Debug)]
pub struct Response {
    /// Correlation id of the answered request.
    pub id: u64,
    /// Protocol version.
    pub version: String,
    /// Outcome status.
    pub status: Status,
    /// Whether this answers an event.
    pub event: bool,
    /// Error message of a non-OK status.
    pub error_message: Option<String>,
    /// The body of an OK status.
    pub result: Payload,
}

impl Response {
    /// An OK response to request `id`.
    pub fn ok(id: u64, result: Payload) -> Self {
        Self {
            id,
            version: PROTOCOL_VERSION.to_string(),
            status: Status::OK,
            event: false,
            error_message: None,
            result,
        }
    }

    /// A failed response to request `id`.
    pub fn error(id: u64, status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            error_message: Some(message.into()),
            ..Self::ok(id, Payload::Null)
        }
    }

    /// The answer to heartbeat `id`.
    pub fn heartbeat(id: u64) -> Self {
        Self {
            event: true,
            ..Self::ok(id, Payload::Null)
        }
    }

    /// Whether this answers a heartbeat.
    pub fn is_heartbeat(&self) -> bool {
        self.event && matches!(self.result, Payload::Null)
    }
}

/// A decoded frame.
#[derive(Debug)]
pub enum Message {
    /// A request.
    Request(Request),
    /// A response.
    Response(Response),
}

impl Message {
    /// Correlation id.
    pub fn id(&self) -> u64 {
        match self {
            Self::Request(request) => request.id,
            Self::Response(response) => response.id,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_increase() {
        let a = Request::new(Payload::Null);
        let b = Request::new(Payload::Null);
        assert!(b.id > a.id);
        assert!(a.two_way);
    }

    #[test]
    fn test_heartbeat_flags() {
        let request = Request::heartbeat();
        assert!(request.is_heartbeat());
        let response = Response::heartbeat(request.id);
        assert!(response.is_heartbeat());
        assert!(response.status.is_ok());
    }
}
