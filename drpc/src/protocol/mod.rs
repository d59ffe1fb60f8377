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

//! Built-in protocols.

pub mod dubbo;
mod injvm;

pub use dubbo::{DubboCodec, DubboInvoker, DubboProtocol};
pub use injvm::InjvmProtocol;

use crate::common::constants;

/// The key a provider files an exported invoker under:
/// `[group/]path[:version]:port`. The default version `0.0.0` is omitted.
///
/// # Examples
///
/// ```rust
/// use drpc::protocol::service_key;
///
/// assert_eq!(service_key(20880, "demo.Greeter", Some("1.0"), Some("g")), "g/demo.Greeter:1.0:20880");
/// assert_eq!(service_key(20880, "demo.Greeter", Some("0.0.0"), None), "demo.Greeter:20880");
/// ```
pub fn service_key(port: u16, path: &str, version: Option<&str>, group: Option<&str>) -> String {
    let mut key = String::new();
    if let Some(group) = group.filter(|g| !g.is_empty()) {
        key.push_str(group);
        key.push('/');
    }
    key.push_str(path);
    if let Some(version) = version.filter(|v| !v.is_empty() && *v != constants::DEFAULT_SERVICE_VERSION) {
        key.push(':');
        key.push_str(version);
    }
    key.push(':');
    key.push_str(&port.to_string());
    key
}
