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

//! The user-visible error of a remote call.
//!
//! Lower layers report their own errors ([`RemotingError`],
//! [`ExtensionError`], [`SerializationError`]); everything that reaches a
//! caller is an [`RpcError`] whose [`RpcErrorKind`] decides whether a
//! cluster may retry the call on another provider.
//!
//! # Examples
//!
//! ```rust
//! use drpc::{RpcError, RpcErrorKind};
//!
//! let error = RpcError::new(RpcErrorKind::Timeout, "Invoke remote method timeout");
//! assert!(error.is_retryable());
//!
//! let error = RpcError::new(RpcErrorKind::Forbidden, "invalid token");
//! assert!(!error.is_retryable());
//! ```

use crate::common::UrlError;
use crate::extension::ExtensionError;
use crate::remoting::{RemotingError, Status};
use crate::serialization::{DeserializationError, SerializationError};
use std::fmt;

/// The failure categories a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// Unclassified failure, including failures reported by the server
    /// through a response status.
    Unknown,
    /// Transport disconnect or write failure.
    Network,
    /// No response within the configured window.
    Timeout,
    /// The service method failed.
    Biz,
    /// The provider refused the call.
    Forbidden,
    /// Encoding or decoding failed at either end.
    Serialization,
    /// The provider's worker pool rejected the call.
    ServerBusy,
    /// The directory produced no candidate.
    NoProvider,
}

impl RpcErrorKind {
    /// Whether a cluster may retry a call that failed with this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unknown | Self::Network | Self::Timeout)
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Biz => "biz",
            Self::Forbidden => "forbidden",
            Self::Serialization => "serialization",
            Self::ServerBusy => "server busy",
            Self::NoProvider => "no provider",
        };
        f.write_str(name)
    }
}

/// Error returned by invokers, clusters and proxies.
#[derive(Debug)]
pub struct RpcError {
    kind: RpcErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RpcError {
    /// Creates an error of `kind`.
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error of `kind` caused by `source`.
    pub fn with_source(
        kind: RpcErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for [`RpcErrorKind::Unknown`].
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Unknown, message)
    }

    /// Shorthand for [`RpcErrorKind::Biz`].
    pub fn biz(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Biz, message)
    }

    /// The failure category.
    pub fn kind(&self) -> RpcErrorKind {
        self.kind
    }

    /// The message without the source chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// See [`RpcErrorKind::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether the call timed out.
    pub fn is_timeout(&self) -> bool {
        self.kind == RpcErrorKind::Timeout
    }

    /// Whether the service method failed.
    pub fn is_biz(&self) -> bool {
        self.kind == RpcErrorKind::Biz
    }

    /// Replaces the message, keeping kind and source.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(source) = &self.source {
            write!(f, ", cause: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ExtensionError> for RpcError {
    fn from(error: ExtensionError) -> Self {
        Self::with_source(RpcErrorKind::Unknown, "extension lookup failed", error)
    }
}

impl From<UrlError> for RpcError {
    fn from(error: UrlError) -> Self {
        Self::with_source(RpcErrorKind::Unknown, "malformed url", error)
    }
}

impl From<RemotingError> for RpcError {
    fn from(error: RemotingError) -> Self {
        let kind = match &error {
            RemotingError::Timeout { .. } => RpcErrorKind::Timeout,
            RemotingError::ExecutionRejected { .. } => RpcErrorKind::ServerBusy,
            RemotingError::Serialization(_)
            | RemotingError::Deserialization(_)
            | RemotingError::PayloadTooLarge { .. } => RpcErrorKind::Serialization,
            RemotingError::Status { status, .. } => match *status {
                Status::CLIENT_TIMEOUT | Status::SERVER_TIMEOUT => RpcErrorKind::Timeout,
                Status::SERVER_THREADPOOL_EXHAUSTED => RpcErrorKind::ServerBusy,
                _ => RpcErrorKind::Unknown,
            },
            RemotingError::Extension(_) => RpcErrorKind::Unknown,
            _ => RpcErrorKind::Network,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<SerializationError> for RpcError {
    fn from(error: SerializationError) -> Self {
        Self::with_source(RpcErrorKind::Serialization, "failed to serialize", error)
    }
}

impl From<DeserializationError> for RpcError {
    fn from(error: DeserializationError) -> Self {
        Self::with_source(RpcErrorKind::Serialization, "failed to deserialize", error)
    }
}
