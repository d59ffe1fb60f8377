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

//! Errors raised while writing or reading object streams.
//!
//! Both types name the format that failed (`json`, `postcard`) when the
//! failure comes from the underlying encoder, so a codec error in a log line
//! says which serialization the peer negotiated.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A value could not be written by an [`ObjectOutput`](crate::serialization::ObjectOutput).
///
/// # Examples
///
/// ```rust
/// use drpc::serialization::SerializationError;
///
/// let error = SerializationError::new("map keys must be strings");
/// assert_eq!(error.to_string(), "cannot serialize: map keys must be strings");
/// ```
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The value has no representation in the stream.
    #[error("cannot serialize: {0}")]
    Unsupported(String),

    /// The encoder of `format` failed.
    #[error("{format} encoding failed: {source}")]
    Format {
        /// Serialization name
        format: &'static str,
        /// Encoder error
        #[source]
        source: BoxError,
    },

    /// Writing failed for another reason.
    #[error("{message}: {source}")]
    Other {
        /// What was being written
        message: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },
}

impl SerializationError {
    /// A value the stream cannot represent.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// A write of `message` failed because of `source`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

/// A value could not be read by an [`ObjectInput`](crate::serialization::ObjectInput).
///
/// # Examples
///
/// ```rust
/// use drpc::common::Url;
/// use drpc::serialization::{JsonSerialization, Serialization};
///
/// let url = Url::parse("dubbo://127.0.0.1:20880/demo.Greeter").unwrap();
/// let mut input = JsonSerialization.deserialize(&url, b"{broken");
/// assert!(input.read_string().is_err());
/// ```
#[derive(Debug, Error)]
pub enum DeserializationError {
    /// The stream ended before the expected object.
    #[error("unexpected end of input")]
    EndOfInput,

    /// The stream holds something other than what the body layout expects.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// The decoder of `format` failed.
    #[error("{format} decoding failed: {source}")]
    Format {
        /// Serialization name
        format: &'static str,
        /// Decoder error
        #[source]
        source: BoxError,
    },

    /// Reading failed for another reason.
    #[error("{message}: {source}")]
    Other {
        /// What was being read
        message: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },
}

impl DeserializationError {
    /// Input that does not match the expected layout.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// A read of `message` failed because of `source`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Input ended before the expected object.
    pub fn end_of_input() -> Self {
        Self::EndOfInput
    }

    /// Whether the stream simply ran out.
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, Self::EndOfInput)
    }
}

#[cfg(feature = "postcard")]
impl From<postcard::Error> for SerializationError {
    fn from(err: postcard::Error) -> Self {
        Self::Format {
            format: "postcard",
            source: Box::new(err),
        }
    }
}

#[cfg(feature = "postcard")]
impl From<postcard::Error> for DeserializationError {
    fn from(err: postcard::Error) -> Self {
        match err {
            postcard::Error::DeserializeUnexpectedEnd => Self::EndOfInput,
            err => Self::Format {
                format: "postcard",
                source: Box::new(err),
            },
        }
    }
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format {
            format: "json",
            source: Box::new(err),
        }
    }
}

impl From<serde_json::Error> for DeserializationError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() {
            return Self::EndOfInput;
        }
        Self::Format {
            format: "json",
            source: Box::new(err),
        }
    }
}
