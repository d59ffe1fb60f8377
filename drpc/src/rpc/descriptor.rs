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

//! Parameter type descriptors.
//!
//! A request names the parameter types of the called method in a compact
//! signature string: `java.lang.String` becomes `Ljava/lang/String;`, `int`
//! becomes `I` and `long[]` becomes `[J`. Providers use it to pick among
//! overloads, so both sides must agree on it byte for byte.

use crate::serialization::DeserializationError;

const PRIMITIVES: &[(&str, char)] = &[
    ("void", 'V'),
    ("boolean", 'Z'),
    ("byte", 'B'),
    ("char", 'C'),
    ("double", 'D'),
    ("float", 'F'),
    ("int", 'I'),
    ("long", 'J'),
    ("short", 'S'),
];

/// Converts a type name into its descriptor.
///
/// ```rust
/// use drpc::rpc::descriptor::type_to_desc;
///
/// assert_eq!(type_to_desc("java.lang.String"), "Ljava/lang/String;");
/// assert_eq!(type_to_desc("long[]"), "[J");
/// ```
pub fn type_to_desc(name: &str) -> String {
    let mut base = name.trim();
    let mut desc = String::new();
    while let Some(inner) = base.strip_suffix("[]") {
        desc.push('[');
        base = inner;
    }
    match PRIMITIVES.iter().find(|(n, _)| *n == base) {
        Some((_, code)) => desc.push(*code),
        None => {
            desc.push('L');
            desc.push_str(&base.replace('.', "/"));
            desc.push(';');
        }
    }
    desc
}

/// Concatenates the descriptors of `names`.
pub fn types_to_desc<S: AsRef<str>>(names: &[S]) -> String {
    names.iter().map(|n| type_to_desc(n.as_ref())).collect()
}

/// Splits a descriptor string back into type names.
///
/// # Errors
///
/// Fails on an unknown primitive code or an unterminated class name.
pub fn desc_to_types(desc: &str) -> Result<Vec<String>, DeserializationError> {
    let mut types = Vec::new();
    let mut chars = desc.chars().peekable();
    while chars.peek().is_some() {
        let mut dims = 0;
        while chars.peek() == Some(&'[') {
            chars.next();
            dims += 1;
        }
        let base = match chars.next() {
            Some('L') => {
                let mut class = String::new();
                loop {
                    match chars.next() {
                        Some(';') => break,
                        Some('/') => class.push('.'),
                        Some(c) => class.push(c),
                        None => {
                            return Err(DeserializationError::new(format!(
                                "unterminated class name in descriptor {desc}"
                            )))
                        }
                    }
                }
                class
            }
            Some(code) => PRIMITIVES
                .iter()
                .find(|(_, c)| *c == code)
                .map(|(name, _)| name.to_string())
                .ok_or_else(|| {
                    DeserializationError::new(format!("unknown type code {code} in descriptor {desc}"))
                })?,
            None => {
                return Err(DeserializationError::new(format!(
                    "dangling array marker in descriptor {desc}"
                )))
            }
        };
        types.push(format!("{base}{}", "[]".repeat(dims)));
    }
    Ok(types)
}
