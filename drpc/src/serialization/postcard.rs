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

//! Postcard serialization.
//!
//! A compact binary format. Postcard values are self-delimiting, so objects
//! are simply written back to back.

use crate::common::Url;
use crate::rpc::{RemoteException, Value};
use crate::serialization::{DeserializationError, ObjectInput, ObjectOutput, Serialization, SerializationError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Wire id of [`PostcardSerialization`].
pub const POSTCARD_SERIALIZATION_ID: u8 = 12;

/// Back to back postcard objects.
///
/// # Examples
///
/// ```rust
/// use drpc::common::Url;
/// use drpc::rpc::Value;
/// use drpc::serialization::{PostcardSerialization, Serialization};
///
/// let url = Url::parse("dubbo://127.0.0.1:20880/demo.Greeter?serialization=postcard").unwrap();
/// let mut body = Vec::new();
/// {
///     let mut out = PostcardSerialization.serialize(&url, &mut body);
///     out.write_str("sayHello").unwrap();
///     out.write_value(&Value::Null).unwrap();
/// }
/// let mut input = PostcardSerialization.deserialize(&url, &body);
/// assert_eq!(input.read_string().unwrap(), "sayHello");
/// assert_eq!(input.read_value().unwrap(), Value::Null);
/// assert!(input.is_exhausted());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct PostcardSerialization;

impl Serialization for PostcardSerialization {
    fn content_type_id(&self) -> u8 {
        POSTCARD_SERIALIZATION_ID
    }

    fn content_type(&self) -> &'static str {
        "x-application/postcard"
    }

    fn serialize<'a>(&self, _url: &Url, output: &'a mut Vec<u8>) -> Box<dyn ObjectOutput + 'a> {
        Box::new(PostcardObjectOutput { output })
    }

    fn deserialize<'a>(&self, _url: &Url, input: &'a [u8]) -> Box<dyn ObjectInput + 'a> {
        Box::new(PostcardObjectInput { remaining: input })
    }
}

struct PostcardObjectOutput<'a> {
    output: &'a mut Vec<u8>,
}

impl PostcardObjectOutput<'_> {
    fn write_object<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializationError> {
        let bytes = postcard::to_stdvec(value)?;
        self.output.extend_from_slice(&bytes);
        Ok(())
    }
}

impl ObjectOutput for PostcardObjectOutput<'_> {
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

struct PostcardObjectInput<'a> {
    remaining: &'a [u8],
}

impl PostcardObjectInput<'_> {
    fn read_object<T: DeserializeOwned>(&mut self) -> Result<T, DeserializationError> {
        let (value, rest) = postcard::take_from_bytes::<T>(self.remaining)?;
        self.remaining = rest;
        Ok(value)
    }
}

impl ObjectInput for PostcardObjectInput<'_> {
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
        self.remaining.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_values() {
        let url = Url::parse("dubbo://127.0.0.1:1/t").unwrap();
        let value = Value::List(vec![
            Value::from("a"),
            Value::Float(0.5),
            Value::Bytes(vec![1, 2, 3]),
            Value::Map(BTreeMap::from([("k".to_string(), Value::Bool(true))])),
        ]);
        let mut body = Vec::new();
        PostcardSerialization
            .serialize(&url, &mut body)
            .write_value(&value)
            .unwrap();
        let mut input = PostcardSerialization.deserialize(&url, &body);
        assert_eq!(input.read_value().unwrap(), value);
        assert!(input.read_u8().is_err());
    }
}
