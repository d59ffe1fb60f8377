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

//! Extension declaration files.
//!
//! A declaration file is named after the extension point and lists one
//! implementation per line:
//!
//! ```text
//! # comment
//! random=drpc::cluster::loadbalance::RandomLoadBalance
//! rr,roundrobin=drpc::cluster::loadbalance::RoundRobinLoadBalance
//! drpc::cluster::loadbalance::LeastActiveLoadBalance
//! ```
//!
//! A bare class name derives its extension name from the class's simple name
//! with the extension point's simple name stripped, lowercased
//! (`LeastActiveLoadBalance` becomes `leastactive`).

use std::path::Path;
use tracing::warn;

/// Declarations compiled into the crate, keyed by extension point name.
const INTERNAL: &[(&str, &str)] = &[
    (
        "drpc.rpc.Protocol",
        include_str!("../../resources/extensions/drpc.rpc.Protocol"),
    ),
    (
        "drpc.rpc.Filter",
        include_str!("../../resources/extensions/drpc.rpc.Filter"),
    ),
    (
        "drpc.rpc.ProxyFactory",
        include_str!("../../resources/extensions/drpc.rpc.ProxyFactory"),
    ),
    (
        "drpc.cluster.Cluster",
        include_str!("../../resources/extensions/drpc.cluster.Cluster"),
    ),
    (
        "drpc.cluster.LoadBalance",
        include_str!("../../resources/extensions/drpc.cluster.LoadBalance"),
    ),
    (
        "drpc.remoting.Dispatcher",
        include_str!("../../resources/extensions/drpc.remoting.Dispatcher"),
    ),
    (
        "drpc.remoting.ThreadPool",
        include_str!("../../resources/extensions/drpc.remoting.ThreadPool"),
    ),
    (
        "drpc.serialization.Serialization",
        include_str!("../../resources/extensions/drpc.serialization.Serialization"),
    ),
    (
        "drpc.cluster.RouterFactory",
        include_str!("../../resources/extensions/drpc.cluster.RouterFactory"),
    ),
    (
        "drpc.registry.RegistryFactory",
        include_str!("../../resources/extensions/drpc.registry.RegistryFactory"),
    ),
];

/// One non-comment line of a declaration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    /// Explicit names, empty for a bare class line.
    pub names: Vec<String>,
    pub class: String,
    pub line: String,
}

/// Parses declaration text, skipping blank lines and `#` comments.
pub(crate) fn parse(text: &str) -> Vec<Declaration> {
    text.lines()
        .filter_map(|raw| {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                return None;
            }
            let (names, class) = match line.split_once('=') {
                Some((names, class)) => (
                    names
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                        .collect(),
                    class.trim(),
                ),
                None => (Vec::new(), line),
            };
            if class.is_empty() {
                return None;
            }
            Some(Declaration {
                names,
                class: class.to_string(),
                line: line.to_string(),
            })
        })
        .collect()
}

/// Derives an extension name from a class name.
pub(crate) fn derive_name(class: &str, interface_simple_name: &str) -> String {
    let simple = class
        .rsplit(|c| c == ':' || c == '.')
        .next()
        .unwrap_or(class);
    let stripped = match simple.strip_suffix(interface_simple_name) {
        Some(prefix) if !prefix.is_empty() => prefix,
        _ => simple,
    };
    stripped.to_lowercase()
}

/// Returns the declaration texts for `interface`, internal root first, then
/// the user root directory.
pub(crate) fn load_files(interface: &str, user_root: Option<&Path>) -> Vec<(String, String)> {
    let mut sources = Vec::new();
    if let Some((_, text)) = INTERNAL.iter().find(|(name, _)| *name == interface) {
        sources.push((format!("internal:{interface}"), text.to_string()));
    }
    if let Some(root) = user_root {
        let path = root.join(interface);
        match std::fs::read_to_string(&path) {
            Ok(text) => sources.push((path.display().to_string(), text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to read extension declarations"),
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let text = "\n# header\nrandom=a::RandomLoadBalance\n rr , roundrobin = a::RoundRobinLoadBalance # trailing\nb::LeastActiveLoadBalance\n=\n";
        let decls = parse(text);
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[0].names, vec!["random"]);
        assert_eq!(decls[1].names, vec!["rr", "roundrobin"]);
        assert_eq!(decls[1].class, "a::RoundRobinLoadBalance");
        assert!(decls[2].names.is_empty());
    }

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("b::LeastActiveLoadBalance", "LoadBalance"), "leastactive");
        assert_eq!(derive_name("com.acme.MockProtocol", "Protocol"), "mock");
        assert_eq!(derive_name("Protocol", "Protocol"), "protocol");
    }

    #[test]
    fn test_internal_declarations_exist() {
        let files = load_files("drpc.cluster.LoadBalance", None);
        assert_eq!(files.len(), 1);
        assert!(parse(&files[0].1).iter().any(|d| d.names == vec!["random"]));
    }
}
