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

//! Extension registry error types.

use thiserror::Error;

/// Errors raised while resolving or constructing extensions.
///
/// Load-time problems with individual declaration lines do not fail the
/// whole extension point; they are kept and reported as possible causes
/// when a lookup by a similar name later fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    /// No extension is declared under the requested name.
    #[error("No such extension {interface} by name {name}{}", format_causes(.causes))]
    NotFound {
        /// Extension point name
        interface: String,
        /// Requested extension name
        name: String,
        /// Load failures of declaration lines mentioning `name`
        causes: Vec<String>,
    },

    /// Two different classes are marked adaptive for one extension point.
    #[error("More than 1 adaptive class found for {interface}: {first}, {second}")]
    DuplicateAdaptive {
        /// Extension point name
        interface: String,
        /// Adaptive class loaded first
        first: String,
        /// Adaptive class loaded second
        second: String,
    },

    /// One name is declared for two different classes.
    #[error("Duplicate extension {interface} name {name} on {first} and {second}")]
    DuplicateName {
        /// Extension point name
        interface: String,
        /// The clashing name
        name: String,
        /// Class already bound to the name
        first: String,
        /// Class that tried to take the name
        second: String,
    },

    /// No adaptive class is declared and the trait has no adaptive method.
    #[error("Can not create adaptive extension {interface}, cause: no adaptive method on extension {interface}, refuse to create the adaptive class")]
    NoAdaptiveMethod {
        /// Extension point name
        interface: String,
    },

    /// A non-adaptive method was called on an adaptive forwarder.
    #[error("method {method} of interface {interface} is not an adaptive method")]
    UnsupportedOperation {
        /// Extension point name
        interface: String,
        /// Method that was called
        method: String,
    },

    /// The URL carried none of the adaptive keys and there is no default.
    #[error("Fail to get extension({interface}) name from url({url}) use keys({})", .keys.join(", "))]
    CannotDetermineName {
        /// Extension point name
        interface: String,
        /// The URL that was inspected
        url: String,
        /// Keys that were tried
        keys: Vec<String>,
    },

    /// An argument was not acceptable.
    #[error("{0}")]
    IllegalArgument(String),

    /// Constructing an extension required the extension itself.
    #[error("Cyclic dependency while creating extension {name} of {interface}")]
    CyclicDependency {
        /// Extension point name
        interface: String,
        /// Extension being constructed
        name: String,
    },

    /// The constructor of an extension failed.
    #[error("Extension instance (name: {name}, class: {interface}) could not be instantiated: {message}")]
    Construction {
        /// Extension point name
        interface: String,
        /// Extension name
        name: String,
        /// Failure reported by the constructor
        message: String,
    },

    /// The registry owning a loader has been dropped.
    #[error("extension registry for {interface} is no longer available")]
    RegistryClosed {
        /// Extension point name
        interface: String,
    },
}

impl ExtensionError {
    /// Creates a [`ExtensionError::Construction`] error.
    pub fn construction(
        interface: impl Into<String>,
        name: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Construction {
            interface: interface.into(),
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Whether this is a [`ExtensionError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn format_causes(causes: &[String]) -> String {
    if causes.is_empty() {
        return String::new();
    }
    let mut out = String::from(", possible causes: ");
    for (i, cause) in causes.iter().enumerate() {
        out.push_str(&format!("\n({}) {}", i + 1, cause));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_causes() {
        let err = ExtensionError::NotFound {
            interface: "drpc.rpc.Protocol".into(),
            name: "http".into(),
            causes: vec!["no class named x.HttpProtocol is registered".into()],
        };
        let text = err.to_string();
        assert!(text.starts_with("No such extension drpc.rpc.Protocol by name http"));
        assert!(text.contains("(1) no class named x.HttpProtocol"));
    }

    #[test]
    fn test_cannot_determine_name_lists_keys() {
        let err = ExtensionError::CannotDetermineName {
            interface: "drpc.cluster.Cluster".into(),
            url: "mock://h:1/s".into(),
            keys: vec!["cluster".into(), "fallback".into()],
        };
        assert!(err.to_string().ends_with("use keys(cluster, fallback)"));
    }
}
