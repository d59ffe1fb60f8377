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

//! JSON serialization.
//!
//! Every object is written as one JSON text followed by a newline, so a body
//! stays readable when dumped.

use crate::common::Url;
use crate::rpc::{RemoteException, Value};
use crate::serialization::{DeserializationError, ObjectInput, ObjectOutput, Serialization, SerializationError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Wire id of [`JsonSerialization`].
pub const JSON_SERIALIZATION_ID: u8 = 2;

/// Newline delimited JSON objects.
///
/// # Examples
///
/// ```rust
/// use drpc::common::Url;
/// use drpc::rpc::Value;
/// use drpc::serialization::{JsonSerialization, Serialization};
///
/// let url = Url::parse("dubbo://127.0.0.1:20880/demo.Greeter").unwrap();
/// let mut body = Vec::new();
/// {
///     let mut out = JsonSerialization.serialize(&url, &mut body);
///     out.write_str("2.0.2").unwrap();
///     out.write_value(&Value::from(42)).unwrap();
/// }
/// assert_eq!(body, b"\"2.0.2\"\n{\"Int\":42}\n");
///
/// let mut input = JsonSerialization.deserialize(&url, &body);
/// assert_eq!(input.read_string().unwrap(), "2.0.2");
/// assert_eq!(input.read_value().unwrap(), Value::Int(42));
/// assert!(input.is_exhausted());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerialization;

impl Serialization for JsonSerialization {
    fn content_type_id(&self) -> u8 {
        JSON_SERIALIZATION_ID
    }

    fn content_type(&self) -> &'static str {
        "text/json"
    }

    fn serialize<'a>(&self, _url: &Url, output: &'a mut Vec<u8>) -> Box<dyn ObjectOutput + 'a> {
        Box::new(JsonObjectOutput { output })
    }

    fn deserialize<'a>(&self, _url: &Url, input: &'a [u8]) -> Box<dyn ObjectInput + 'a> {
        Box::new(JsonObjectInput { input, position: 0 })
    }
}

struct JsonObjectOutput<'a> {
    output: &'a mut Vec<u8>,
}

impl JsonObjectOutput<'_> {
    fn write_object<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut *self.output, value)?;
        self.output.push(b'\n');
        Ok(())
    }
}

impl ObjectOutput for JsonObjectOutput<'_> {
    fn write_u8(&mut self, value: u8) -> Result<(), SerializationError> {
        self.write_object(&value)
    }

    fn write_str(&mut self, value: &str) -> Result<(), SerializationError> {
        self.write_object(value)
    }

    fn write_value(&mut self, value: &Value) -> Result<(), SerializationError> {
        self.write_object(value)
    }

    fn write_attachments(&mut self, value: &BTreeMap<String, String>) -> Result<(), SerializationError> {
        self.write_object(value)
    }

    fn write_exception(&mut self, value: &RemoteException) -> Result<(), SerializationError> {
        self.write_object(value)
    }
}

struct JsonObjectInput<'a> {
    input: &'a [u8],
    position: usize,
}

impl JsonObjectInput<'_> {
    fn read_object<T: DeserializeOwned>(&mut self) -> Result<T, DeserializationError> {
        let rest = self.input.get(self.position..).unwrap_or_default();
        let mut stream = serde_json::Deserializer::from_slice(rest).into_iter::<T>();
        match stream.next() {
            Some(Ok(value)) => {
                self.position += stream.byte_offset();
                Ok(value)
            }
            Some(Err(err)) => Err(err.into()),
            None => Err(DeserializationError::end_of_input()),
        }
    }
}

impl ObjectInput for JsonObjectInput<'_> {
    fn read_u8(&mut self) -> Result<u8, DeserializationError> {
        self.read_object()
    }

    fn read_string(&mut self) -> Result<String, DeserializationError> {
        self.read_object()
    }

    fn read_value(&mut self) -> Result<Value, DeserializationError> {
        self.read_object()
    }

    fn read_attachments(&mut self) -> Result<BTreeMap<String, String>, DeserializationError> {
        self.read_object()
    }

    fn read_exception(&mut self) -> Result<RemoteException, DeserializationError> {
        self.read_object()
    }

    fn is_exhausted(&self) -> bool {
        self.input
            .get(self.position..)
            .map_or(true, |rest| rest.iter().all(u8::is_ascii_whitespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("dubbo://127.0.0.1:20880/demo.Greeter").unwrap()
    }

    #[test]
    fn test_reads_objects_in_order() {
        let mut body = Vec::new();
        {
            let mut out = JsonSerialization.serialize(&url(), &mut body);
            out.write_u8(1).unwrap();
            out.write_attachments(&BTreeMap::from([("path".to_string(), "a.B".to_string())]))
                .unwrap();
            out.write_exception(&RemoteException::new("x.Y", "boom")).unwrap();
        }
        let mut input = JsonSerialization.deserialize(&url(), &body);
        assert_eq!(input.read_u8().unwrap(), 1);
        assert_eq!(input.read_attachments().unwrap()["path"], "a.B");
        assert_eq!(input.read_exception().unwrap().message, "boom");
        assert!(input.read_value().is_err());
    }

    #[test]
    fn test_trailing_whitespace_is_exhausted() {
        let mut input = JsonSerialization.deserialize(&url(), b"\"Null\"       ");
        assert_eq!(input.read_value().unwrap(), Value::Null);
        assert!(input.is_exhausted());
    }
}
