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

//! Frame codec.
//!
//! Every message is a 16 byte header followed by a body:
//!
//! ```text
//! 0      2       3        4                12           16
//! +------+-------+--------+----------------+------------+--------+
//! | dabb | flags | status | correlation id | body length| body   |
//! +------+-------+--------+----------------+------------+--------+
//! ```
//!
//! Multibyte fields are big-endian. Flags: `0x80` request, `0x40` two-way,
//! `0x20` event, low five bits the serialization id. The body is a sequence
//! of serialized objects; its layout for calls is defined by a
//! [`BodyCodec`], events carry a single null value and failed responses a
//! single error message string.

use crate::common::{constants, Url, PROTOCOL_VERSION};
use crate::extension::ExtensionLoader;
use crate::remoting::{Message, Payload, RawBody, RemotingError, Request, Response, Status};
use crate::rpc::{Invocation, RpcResult, Value};
use crate::serialization::{
    self, DeserializationError, ObjectInput, ObjectOutput, Serialization, SerializationError,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Header size in bytes.
pub const HEADER_LENGTH: usize = 16;
/// Frame magic.
pub const MAGIC: u16 = 0xdabb;
/// Set on requests.
pub const FLAG_REQUEST: u8 = 0x80;
/// Set on requests expecting a response.
pub const FLAG_TWOWAY: u8 = 0x40;
/// Set on events.
pub const FLAG_EVENT: u8 = 0x20;
/// Serialization id bits.
pub const SERIALIZATION_MASK: u8 = 0x1f;

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Flag byte.
    pub flags: u8,
    /// Status byte, meaningful on responses.
    pub status: u8,
    /// Correlation id.
    pub id: u64,
    /// Body length.
    pub length: u32,
}

impl FrameHeader {
    /// Parses the header at the start of `buf`; `None` when fewer than
    /// [`HEADER_LENGTH`] bytes are available.
    ///
    /// # Errors
    ///
    /// Fails on a wrong magic.
    pub fn parse(mut buf: &[u8]) -> Result<Option<Self>, RemotingError> {
        if buf.len() < HEADER_LENGTH {
            return Ok(None);
        }
        let magic = buf.get_u16();
        if magic != MAGIC {
            return Err(RemotingError::codec(format!("bad magic 0x{magic:04x}")));
        }
        Ok(Some(Self {
            flags: buf.get_u8(),
            status: buf.get_u8(),
            id: buf.get_u64(),
            length: buf.get_u32(),
        }))
    }

    /// Appends the header to `dst`.
    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u16(MAGIC);
        dst.put_u8(self.flags);
        dst.put_u8(self.status);
        dst.put_u64(self.id);
        dst.put_u32(self.length);
    }

    /// Whether the frame is a request.
    pub fn is_request(&self) -> bool {
        self.flags & FLAG_REQUEST != 0
    }

    /// Whether the request expects a response.
    pub fn is_two_way(&self) -> bool {
        self.flags & FLAG_TWOWAY != 0
    }

    /// Whether the frame is an event.
    pub fn is_event(&self) -> bool {
        self.flags & FLAG_EVENT != 0
    }

    /// The serialization id.
    pub fn serialization_id(&self) -> u8 {
        self.flags & SERIALIZATION_MASK
    }
}

/// Lays out the bodies of calls and their results.
pub trait BodyCodec: Send + Sync + 'static {
    /// Writes the body of a call request.
    fn encode_request_data(
        &self,
        out: &mut dyn ObjectOutput,
        invocation: &Invocation,
    ) -> Result<(), SerializationError>;

    /// Reads the body of a call request.
    fn decode_request_data(&self, input: &mut dyn ObjectInput) -> Result<Invocation, DeserializationError>;

    /// Writes the body of an OK response.
    fn encode_response_data(
        &self,
        out: &mut dyn ObjectOutput,
        result: &RpcResult,
    ) -> Result<(), SerializationError>;

    /// Reads the body of an OK response.
    fn decode_response_data(&self, input: &mut dyn ObjectInput) -> Result<RpcResult, DeserializationError>;
}

/// Encodes and decodes frames.
pub struct ExchangeCodec {
    body: Arc<dyn BodyCodec>,
    serializations: ExtensionLoader<dyn Serialization>,
}

impl fmt::Debug for ExchangeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeCodec").finish_non_exhaustive()
    }
}

impl ExchangeCodec {
    /// Creates a codec laying out call bodies with `body`.
    pub fn new(body: Arc<dyn BodyCodec>, serializations: ExtensionLoader<dyn Serialization>) -> Self {
        Self { body, serializations }
    }

    fn serialization(&self, url: &Url) -> Result<Arc<dyn Serialization>, RemotingError> {
        match url.parameter(constants::SERIALIZATION_KEY) {
            Some(name) => Ok(self.serializations.get_extension(name)?),
            None => self
                .serializations
                .default_extension()?
                .ok_or_else(|| RemotingError::codec("no default serialization declared")),
        }
    }

    fn check_payload(url: &Url, size: usize) -> Result<(), RemotingError> {
        let limit = url.get(constants::PAYLOAD_KEY, constants::DEFAULT_PAYLOAD);
        if limit > 0 && size > limit {
            return Err(RemotingError::PayloadTooLarge {
                size,
                limit,
                channel: url.address(),
            });
        }
        Ok(())
    }

    /// Appends the frame of `message` to `dst`.
    ///
    /// A response whose body cannot be encoded is replaced by a
    /// [`Status::BAD_RESPONSE`] response describing the failure.
    ///
    /// # Errors
    ///
    /// Request encoding failures and oversized requests.
    pub fn encode(&self, url: &Url, message: &Message, dst: &mut BytesMut) -> Result<(), RemotingError> {
        let serialization = self.serialization(url)?;
        match message {
            Message::Request(request) => self.encode_request(url, &*serialization, request, dst),
            Message::Response(response) => self.encode_response(url, &*serialization, response, dst),
        }
    }

    fn encode_request(
        &self,
        url: &Url,
        serialization: &dyn Serialization,
        request: &Request,
        dst: &mut BytesMut,
    ) -> Result<(), RemotingError> {
        let mut flags = FLAG_REQUEST | serialization.content_type_id();
        if request.two_way {
            flags |= FLAG_TWOWAY;
        }
        if request.event {
            flags |= FLAG_EVENT;
        }

        let mut body = Vec::new();
        if let Payload::Raw(raw) = &request.data {
            flags = (flags & !SERIALIZATION_MASK) | raw.serialization_id;
            body.extend_from_slice(&raw.bytes);
        } else {
            let mut out = serialization.serialize(url, &mut body);
            match &request.data {
                Payload::Invocation(invocation) if !request.event => {
                    self.body.encode_request_data(&mut *out, invocation)?
                }
                Payload::Null => out.write_value(&Value::Null)?,
                _ => return Err(RemotingError::codec("unexpected request payload")),
            }
        }
        Self::check_payload(url, body.len())?;
        write_frame(dst, flags, 0, request.id, &body);
        Ok(())
    }

    fn encode_response(
        &self,
        url: &Url,
        serialization: &dyn Serialization,
        response: &Response,
        dst: &mut BytesMut,
    ) -> Result<(), RemotingError> {
        let mut flags = serialization.content_type_id();
        if response.event {
            flags |= FLAG_EVENT;
        }
        let encoded = self
            .encode_response_body(url, serialization, response)
            .and_then(|body| Self::check_payload(url, body.len()).map(|_| body));
        match encoded {
            Ok(body) => {
                write_frame(dst, flags, response.status.0, response.id, &body);
                Ok(())
            }
            Err(err) if response.status.is_ok() => {
                warn!(id = response.id, error = %err, "failed to encode response");
                let failure = Response::error(
                    response.id,
                    Status::BAD_RESPONSE,
                    format!("Failed to send response: {}, cause: {err}", response.id),
                );
                let body = self.encode_response_body(url, serialization, &failure)?;
                write_frame(dst, flags, failure.status.0, failure.id, &body);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn encode_response_body(
        &self,
        url: &Url,
        serialization: &dyn Serialization,
        response: &Response,
    ) -> Result<Vec<u8>, RemotingError> {
        let mut body = Vec::new();
        if let Payload::Raw(raw) = &response.result {
            body.extend_from_slice(&raw.bytes);
            return Ok(body);
        }
        {
            let mut out = serialization.serialize(url, &mut body);
            if !response.status.is_ok() {
                out.write_str(response.error_message.as_deref().unwrap_or_default())?;
            } else if response.event {
                out.write_value(&Value::Null)?;
            } else {
                match &response.result {
                    Payload::Result(result) => self.body.encode_response_data(&mut *out, result)?,
                    Payload::Null => self.body.encode_response_data(&mut *out, &RpcResult::empty())?,
                    _ => return Err(RemotingError::codec("unexpected response payload")),
                }
            }
        }
        Ok(body)
    }

    /// Takes one frame off the front of `src`; `None` until a whole frame
    /// is buffered.
    ///
    /// # Errors
    ///
    /// A wrong magic, an oversized body or an unknown serialization id. The
    /// connection cannot be resynchronized after such an error.
    pub fn decode(&self, url: &Url, src: &mut BytesMut) -> Result<Option<Message>, RemotingError> {
        let Some(header) = FrameHeader::parse(src)? else {
            return Ok(None);
        };
        let length = header.length as usize;
        Self::check_payload(url, length)?;
        let total = HEADER_LENGTH + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let frame = src.split_to(total).freeze();
        let body = frame.slice(HEADER_LENGTH..);
        self.decode_frame(url, header, body).map(Some)
    }

    fn decode_frame(&self, url: &Url, header: FrameHeader, body: Bytes) -> Result<Message, RemotingError> {
        let serialization = serialization::find_by_id(&self.serializations, header.serialization_id())?;
        let in_io = url.get(
            constants::DECODE_IN_IO_THREAD_KEY,
            constants::DEFAULT_DECODE_IN_IO_THREAD,
        );
        let raw = || {
            Payload::Raw(RawBody {
                serialization_id: header.serialization_id(),
                bytes: body.clone(),
            })
        };

        if header.is_request() {
            let mut request = Request::with_id(header.id, Payload::Null);
            request.version = PROTOCOL_VERSION.to_string();
            request.two_way = header.is_two_way();
            request.event = header.is_event();
            if request.event {
                if let Err(err) = serialization.deserialize(url, &body).read_value() {
                    request.broken = Some(err.to_string());
                }
            } else if in_io {
                let mut input = serialization.deserialize(url, &body);
                match self.body.decode_request_data(&mut *input) {
                    Ok(invocation) => request.data = Payload::Invocation(invocation),
                    Err(err) => request.broken = Some(err.to_string()),
                }
            } else {
                request.data = raw();
            }
            return Ok(Message::Request(request));
        }

        let status = Status(header.status);
        let mut response = Response::ok(header.id, Payload::Null);
        response.status = status;
        response.event = header.is_event();
        let mut input = serialization.deserialize(url, &body);
        if !status.is_ok() {
            response.error_message = Some(
                input
                    .read_string()
                    .unwrap_or_else(|err| format!("failed to decode error message: {err}")),
            );
        } else if response.event {
            if let Err(err) = input.read_value() {
                warn!(id = header.id, error = %err, "failed to decode event response");
            }
        } else if in_io {
            match self.body.decode_response_data(&mut *input) {
                Ok(result) => response.result = Payload::Result(result),
                Err(err) => {
                    response.status = Status::CLIENT_ERROR;
                    response.error_message = Some(err.to_string());
                }
            }
        } else {
            response.result = raw();
        }
        Ok(Message::Response(response))
    }

    /// Decodes a body left raw by [`decode`](Self::decode). Failures mark
    /// requests broken and turn responses into [`Status::CLIENT_ERROR`].
    pub fn decode_body(&self, url: &Url, message: &mut Message) {
        match message {
            Message::Request(request) => {
                if !matches!(request.data, Payload::Raw(_)) {
                    return;
                }
                let Payload::Raw(raw) = std::mem::take(&mut request.data) else {
                    return;
                };
                match self.decode_raw(url, &raw, |input| self.body.decode_request_data(input)) {
                    Ok(invocation) => request.data = Payload::Invocation(invocation),
                    Err(err) => request.broken = Some(err.to_string()),
                }
            }
            Message::Response(response) => {
                if !matches!(response.result, Payload::Raw(_)) {
                    return;
                }
                let Payload::Raw(raw) = std::mem::take(&mut response.result) else {
                    return;
                };
                match self.decode_raw(url, &raw, |input| self.body.decode_response_data(input)) {
                    Ok(result) => response.result = Payload::Result(result),
                    Err(err) => {
                        response.status = Status::CLIENT_ERROR;
                        response.error_message = Some(err.to_string());
                    }
                }
            }
        }
    }

    fn decode_raw<T>(
        &self,
        url: &Url,
        raw: &RawBody,
        read: impl FnOnce(&mut dyn ObjectInput) -> Result<T, DeserializationError>,
    ) -> Result<T, DeserializationError> {
        let serialization = serialization::find_by_id(&self.serializations, raw.serialization_id)?;
        let mut input = serialization.deserialize(url, &raw.bytes);
        read(&mut *input)
    }
}

fn write_frame(dst: &mut BytesMut, flags: u8, status: u8, id: u64, body: &[u8]) {
    dst.reserve(HEADER_LENGTH + body.len());
    FrameHeader {
        flags,
        status,
        id,
        length: body.len() as u32,
    }
    .write(dst);
    dst.put_slice(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bits() {
        let mut bytes = vec![0xda, 0xbb, 0xc2, 0x00];
        bytes.extend_from_slice(&5u64.to_be_bytes());
        bytes.extend_from_slice(&11u32.to_be_bytes());
        let header = FrameHeader::parse(&bytes).unwrap().unwrap();
        assert!(header.is_request());
        assert!(header.is_two_way());
        assert!(!header.is_event());
        assert_eq!(header.serialization_id(), 2);
        assert_eq!(header.id, 5);
        assert_eq!(header.length, 11);
    }

    #[test]
    fn test_header_needs_sixteen_bytes() {
        assert!(FrameHeader::parse(&[0xda, 0xbb, 0xc2]).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let bytes = [0u8; HEADER_LENGTH];
        assert!(FrameHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_header_write_parse() {
        let header = FrameHeader {
            flags: FLAG_REQUEST | FLAG_EVENT | 2,
            status: 0,
            id: u64::MAX - 1,
            length: 7,
        };
        let mut dst = BytesMut::new();
        header.write(&mut dst);
        assert_eq!(dst.len(), HEADER_LENGTH);
        assert_eq!(FrameHeader::parse(&dst).unwrap(), Some(header));
    }
}
