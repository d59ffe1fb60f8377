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

//! The `Serialization` extension point and the object streams it creates.

use crate::common::Url;
use crate::rpc::{RemoteException, Value};
use crate::serialization::{DeserializationError, SerializationError};
use crate::spi;
use std::collections::BTreeMap;

/// Writes the objects of one message body in order.
pub trait ObjectOutput {
    /// Writes a single byte object.
    fn write_u8(&mut self, value: u8) -> Result<(), SerializationError>;

    /// Writes a string object.
    fn write_str(&mut self, value: &str) -> Result<(), SerializationError>;

    /// Writes a value object.
    fn write_value(&mut self, value: &Value) -> Result<(), SerializationError>;

    /// Writes a string map object.
    fn write_attachments(&mut self, value: &BTreeMap<String, String>) -> Result<(), SerializationError>;

    /// Writes an exception object.
    fn write_exception(&mut self, value: &RemoteException) -> Result<(), SerializationError>;
}

/// Reads the objects of one message body in the order they were written.
pub trait ObjectInput {
    /// Reads a single byte object.
    fn read_u8(&mut self) -> Result<u8, DeserializationError>;

    /// Reads a string object.
    fn read_string(&mut self) -> Result<String, DeserializationError>;

    /// Reads a value object.
    fn read_value(&mut self) -> Result<Value, DeserializationError>;

    /// Reads a string map object.
    fn read_attachments(&mut self) -> Result<BTreeMap<String, String>, DeserializationError>;

    /// Reads an exception object.
    fn read_exception(&mut self) -> Result<RemoteException, DeserializationError>;

    /// Whether every byte has been consumed.
    fn is_exhausted(&self) -> bool;
}

/// An object serialization format, identified on the wire by a content type
/// id in the low five bits of the frame flags.
#[spi(name = "drpc.serialization.Serialization", default = "json")]
pub trait Serialization: Send + Sync {
    /// Wire id, `1..=31`.
    fn content_type_id(&self) -> u8;

    /// MIME style name.
    fn content_type(&self) -> &'static str;

    /// Creates a writer appending to `output`.
    fn serialize<'a>(&self, url: &Url, output: &'a mut Vec<u8>) -> Box<dyn ObjectOutput + 'a>;

    /// Creates a reader over `input`.
    fn deserialize<'a>(&self, url: &Url, input: &'a [u8]) -> Box<dyn ObjectInput + 'a>;
}
