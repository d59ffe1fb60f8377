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

//! Call body layout of the `dubbo` protocol.
//!
//! Request: protocol version, service path, service version, method name,
//! parameter type descriptor, one value per argument, attachments.
//!
//! Response: a flag byte, then the exception or value the flag announces,
//! then attachments when the flag says so.

use crate::common::{constants, PROTOCOL_VERSION};
use crate::remoting::BodyCodec;
use crate::rpc::descriptor::desc_to_types;
use crate::rpc::{Invocation, RpcResult, Value};
use crate::serialization::{DeserializationError, ObjectInput, ObjectOutput, SerializationError};
use std::collections::BTreeMap;

/// Response flag: an exception follows.
pub const RESPONSE_WITH_EXCEPTION: u8 = 0;
/// Response flag: a value follows.
pub const RESPONSE_VALUE: u8 = 1;
/// Response flag: nothing follows.
pub const RESPONSE_NULL_VALUE: u8 = 2;
/// Response flag: an exception and attachments follow.
pub const RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS: u8 = 3;
/// Response flag: a value and attachments follow.
pub const RESPONSE_VALUE_WITH_ATTACHMENTS: u8 = 4;
/// Response flag: attachments follow.
pub const RESPONSE_NULL_VALUE_WITH_ATTACHMENTS: u8 = 5;

/// The [`BodyCodec`] of the `dubbo` protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct DubboCodec;

impl BodyCodec for DubboCodec {
    fn encode_request_data(
        &self,
        out: &mut dyn ObjectOutput,
        invocation: &Invocation,
    ) -> Result<(), SerializationError> {
        out.write_str(invocation.attachment_or(constants::DUBBO_VERSION_KEY, PROTOCOL_VERSION))?;
        out.write_str(invocation.attachment_or(constants::PATH_KEY, ""))?;
        out.write_str(invocation.attachment_or(constants::VERSION_KEY, constants::DEFAULT_SERVICE_VERSION))?;
        out.write_str(invocation.method_name())?;
        out.write_str(&invocation.parameter_desc())?;
        for argument in invocation.arguments() {
            out.write_value(argument)?;
        }
        out.write_attachments(invocation.attachments())
    }

    fn decode_request_data(&self, input: &mut dyn ObjectInput) -> Result<Invocation, DeserializationError> {
        let dubbo_version = input.read_string()?;
        let path = input.read_string()?;
        let version = input.read_string()?;
        let method = input.read_string()?;
        let desc = input.read_string()?;
        let parameter_types = desc_to_types(&desc)?;
        let arguments = parameter_types
            .iter()
            .map(|_| input.read_value())
            .collect::<Result<Vec<Value>, _>>()?;
        let mut attachments: BTreeMap<String, String> = input.read_attachments()?;
        attachments.insert(constants::DUBBO_VERSION_KEY.to_string(), dubbo_version);
        attachments.insert(constants::PATH_KEY.to_string(), path);
        attachments.insert(constants::VERSION_KEY.to_string(), version);
        Ok(Invocation::from_parts(method, parameter_types, arguments, attachments))
    }

    fn encode_response_data(
        &self,
        out: &mut dyn ObjectOutput,
        result: &RpcResult,
    ) -> Result<(), SerializationError> {
        let with_attachments = !result.attachments().is_empty();
        match result.exception() {
            Some(exception) => {
                out.write_u8(if with_attachments {
                    RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS
                } else {
                    RESPONSE_WITH_EXCEPTION
                })?;
                out.write_exception(exception)?;
            }
            None if result.value().is_null() => {
                out.write_u8(if with_attachments {
                    RESPONSE_NULL_VALUE_WITH_ATTACHMENTS
                } else {
                    RESPONSE_NULL_VALUE
                })?;
            }
            None => {
                out.write_u8(if with_attachments {
                    RESPONSE_VALUE_WITH_ATTACHMENTS
                } else {
                    RESPONSE_VALUE
                })?;
                out.write_value(result.value())?;
            }
        }
        if with_attachments {
            out.write_attachments(result.attachments())?;
        }
        Ok(())
    }

    fn decode_response_data(&self, input: &mut dyn ObjectInput) -> Result<RpcResult, DeserializationError> {
        let flag = input.read_u8()?;
        let (value, exception) = match flag {
            RESPONSE_NULL_VALUE | RESPONSE_NULL_VALUE_WITH_ATTACHMENTS => (Value::Null, None),
            RESPONSE_VALUE | RESPONSE_VALUE_WITH_ATTACHMENTS => (input.read_value()?, None),
            RESPONSE_WITH_EXCEPTION | RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS => {
                (Value::Null, Some(input.read_exception()?))
            }
            other => {
                return Err(DeserializationError::new(format!(
                    "Unknown result flag, expect '0' '1' '2' '3' '4' '5', but received: {other}"
                )))
            }
        };
        let attachments = if flag >= RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS {
            input.read_attachments()?
        } else {
            BTreeMap::new()
        };
        Ok(RpcResult::from_parts(value, exception, attachments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Url;
    use crate::rpc::RemoteException;
    use crate::serialization::{JsonSerialization, Serialization};

    fn url() -> Url {
        Url::parse("dubbo://127.0.0.1:20880/demo.Greeter").unwrap()
    }

    #[test]
    fn test_request_body_order() {
        let invocation = Invocation::new("sayHello", ["java.lang.String", "int"], vec!["world".into(), 3.into()])
            .with_attachment(constants::PATH_KEY, "demo.Greeter")
            .with_attachment(constants::VERSION_KEY, "1.0.0");
        let mut body = Vec::new();
        {
            let mut out = JsonSerialization.serialize(&url(), &mut body);
            DubboCodec.encode_request_data(&mut *out, &invocation).unwrap();
        }
        let mut input = JsonSerialization.deserialize(&url(), &body);
        assert_eq!(input.read_string().unwrap(), PROTOCOL_VERSION);
        assert_eq!(input.read_string().unwrap(), "demo.Greeter");
        assert_eq!(input.read_string().unwrap(), "1.0.0");
        assert_eq!(input.read_string().unwrap(), "sayHello");
        assert_eq!(input.read_string().unwrap(), "Ljava/lang/String;I");
    }

    #[test]
    fn test_request_decode_restores_attachments() {
        let invocation = Invocation::new("find", ["long"], vec![42i64.into()])
            .with_attachment(constants::PATH_KEY, "demo.Users")
            .with_attachment("trace", "abc");
        let mut body = Vec::new();
        {
            let mut out = JsonSerialization.serialize(&url(), &mut body);
            DubboCodec.encode_request_data(&mut *out, &invocation).unwrap();
        }
        let mut input = JsonSerialization.deserialize(&url(), &body);
        let decoded = DubboCodec.decode_request_data(&mut *input).unwrap();
        assert_eq!(decoded.method_name(), "find");
        assert_eq!(decoded.parameter_types(), ["long"]);
        assert_eq!(decoded.arguments(), [Value::Int(42)]);
        assert_eq!(decoded.attachment("trace"), Some("abc"));
        assert_eq!(decoded.attachment(constants::VERSION_KEY), Some("0.0.0"));
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_response_flags() {
        let cases = [
            (RpcResult::empty(), RESPONSE_NULL_VALUE),
            (RpcResult::new("x".into()), RESPONSE_VALUE),
            (
                RpcResult::from_exception(RemoteException::new("acme.Failure", "boom")),
                RESPONSE_WITH_EXCEPTION,
            ),
        ];
        for (result, flag) in cases {
            let mut body = Vec::new();
            {
                let mut out = JsonSerialization.serialize(&url(), &mut body);
                DubboCodec.encode_response_data(&mut *out, &result).unwrap();
            }
            let mut input = JsonSerialization.deserialize(&url(), &body);
            assert_eq!(input.read_u8().unwrap(), flag);
        }
    }

    #[test]
    fn test_response_attachments() {
        let mut result = RpcResult::new(Value::Int(7));
        result.set_attachment("k", "v");
        let mut body = Vec::new();
        {
            let mut out = JsonSerialization.serialize(&url(), &mut body);
            DubboCodec.encode_response_data(&mut *out, &result).unwrap();
        }
        let mut input = JsonSerialization.deserialize(&url(), &body);
        let decoded = DubboCodec.decode_response_data(&mut *input).unwrap();
        assert_eq!(decoded.value(), &Value::Int(7));
        assert_eq!(decoded.attachment("k"), Some("v"));
    }

    #[test]
    fn test_unknown_flag() {
        let mut body = Vec::new();
        {
            let mut out = JsonSerialization.serialize(&url(), &mut body);
            out.write_u8(9).unwrap();
        }
        let mut input = JsonSerialization.deserialize(&url(), &body);
        assert!(DubboCodec.decode_response_data(&mut *input).is_err());
    }
}
