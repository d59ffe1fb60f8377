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

//! Transport and exchange layer errors.

use crate::extension::ExtensionError;
use crate::remoting::Status;
use crate::serialization::{DeserializationError, SerializationError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while moving frames between peers.
///
/// # Examples
///
/// ```rust
/// use drpc::remoting::RemotingError;
///
/// let error = RemotingError::connection_lost("reset by peer");
/// assert!(error.should_reconnect());
/// assert!(!error.is_timeout());
/// ```
#[derive(Debug, Error)]
pub enum RemotingError {
    /// Connecting to the peer failed.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// Peer address.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An established connection went away.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Why the connection was lost.
        reason: String,
    },

    /// A response did not arrive in time.
    #[error("{message}")]
    Timeout {
        /// Whether the request reached the wire before the deadline.
        server_side: bool,
        /// Time spent waiting.
        elapsed: Duration,
        /// Description including request and channel.
        message: String,
    },

    /// The channel or endpoint is closed.
    #[error("{0} is closed")]
    Closed(String),

    /// Binding a server socket failed.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        /// Address that failed to bind.
        address: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A worker pool refused a task.
    #[error("{message}")]
    ExecutionRejected {
        /// Pool state and originating URL.
        message: String,
    },

    /// A frame or body exceeded the payload limit.
    #[error("Data length too large: {size}, max payload: {limit}, channel: {channel}")]
    PayloadTooLarge {
        /// Actual size.
        size: usize,
        /// Configured limit.
        limit: usize,
        /// Channel description.
        channel: String,
    },

    /// A frame header or body was malformed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Encoding a body failed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Decoding a body failed.
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),

    /// The peer answered with a non-OK status.
    #[error("{message}")]
    Status {
        /// Response status.
        status: Status,
        /// Error message carried by the response.
        message: String,
    },

    /// An extension required by the transport could not be resolved.
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// Other I/O failure.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl RemotingError {
    /// Whether the error is a response timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether a client should try to re-establish its connection.
    pub fn should_reconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionLost { .. }
                | Self::Closed(_)
                | Self::Io { .. }
        )
    }

    /// A lost connection.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// A malformed frame.
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec(reason.into())
    }
}

impl From<io::Error> for RemotingError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::ConnectionLost {
                reason: error.to_string(),
            },
            _ => Self::Io { source: error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(RemotingError::from(reset), RemotingError::ConnectionLost { .. }));

        let other = io::Error::new(io::ErrorKind::Other, "other");
        assert!(matches!(RemotingError::from(other), RemotingError::Io { .. }));
    }

    #[test]
    fn test_should_reconnect() {
        assert!(RemotingError::Closed("channel".into()).should_reconnect());
        assert!(!RemotingError::codec("bad magic").should_reconnect());
        assert!(!RemotingError::ExecutionRejected {
            message: "full".into()
        }
        .should_reconnect());
    }
}
