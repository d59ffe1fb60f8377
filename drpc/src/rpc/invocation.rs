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

//! One call of one method.

use crate::rpc::descriptor;
use crate::rpc::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Describes one call: the method, its parameter types, the argument values
/// and out-of-band attachments (path, version, token, async flag).
///
/// # Examples
///
/// ```rust
/// use drpc::rpc::{Invocation, Value};
///
/// let invocation = Invocation::new("sayHello", ["java.lang.String"], vec![Value::from("world")])
///     .with_attachment("version", "1.0.0");
/// assert_eq!(invocation.parameter_desc(), "Ljava/lang/String;");
/// assert_eq!(invocation.attachment("version"), Some("1.0.0"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    method_name: String,
    parameter_types: Vec<String>,
    arguments: Vec<Value>,
    attachments: BTreeMap<String, String>,
}

impl Invocation {
    /// Creates an invocation without attachments.
    pub fn new<I, S>(method_name: impl Into<String>, parameter_types: I, arguments: Vec<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method_name: method_name.into(),
            parameter_types: parameter_types.into_iter().map(Into::into).collect(),
            arguments,
            attachments: BTreeMap::new(),
        }
    }

    /// Adds an attachment.
    #[must_use]
    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    /// The called method.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Parameter type names.
    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    /// The parameter type descriptor string.
    pub fn parameter_desc(&self) -> String {
        descriptor::types_to_desc(&self.parameter_types)
    }

    /// Argument values.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// All attachments.
    pub fn attachments(&self) -> &BTreeMap<String, String> {
        &self.attachments
    }

    /// One attachment.
    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    /// One attachment or `default`.
    pub fn attachment_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.attachment(key).unwrap_or(default)
    }

    /// Sets an attachment, replacing any previous value.
    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    /// Sets an attachment unless one is present.
    pub fn set_attachment_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Merges `attachments`, replacing existing keys.
    pub fn add_attachments(&mut self, attachments: &BTreeMap<String, String>) {
        self.attachments
            .extend(attachments.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub(crate) fn from_parts(
        method_name: String,
        parameter_types: Vec<String>,
        arguments: Vec<Value>,
        attachments: BTreeMap<String, String>,
    ) -> Self {
        Self {
            method_name,
            parameter_types,
            arguments,
            attachments,
        }
    }
}
