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

//! Programmatic publication and consumption.
//!
//! [`ServiceConfig`] turns a [`Service`](crate::rpc::Service) into exported
//! providers; [`ReferenceConfig`] turns an interface name into a
//! [`ServiceProxy`](crate::rpc::ServiceProxy). Both assemble the URLs the
//! rest of the framework runs on and hand them to the adaptive protocol.

mod reference;
mod service;

pub use reference::ReferenceConfig;
pub use service::ServiceConfig;

use crate::common::{constants, now_millis, version, Url, PROTOCOL_VERSION};
use std::collections::BTreeMap;

/// Path under which registries are addressed.
pub const REGISTRY_SERVICE: &str = "drpc.registry.RegistryService";

/// Parameters every published or referred URL carries.
fn process_parameters(side: &str, interface: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (constants::SIDE_KEY.to_string(), side.to_string()),
        (constants::INTERFACE_KEY.to_string(), interface.to_string()),
        (constants::TIMESTAMP_KEY.to_string(), now_millis().to_string()),
        (constants::PID_KEY.to_string(), std::process::id().to_string()),
        (constants::DUBBO_VERSION_KEY.to_string(), PROTOCOL_VERSION.to_string()),
        (constants::RELEASE_KEY.to_string(), version().to_string()),
    ])
}

/// `registry://host:port/drpc.registry.RegistryService?registry=<scheme>&<key>=<target>`
fn registry_url(registry: &Url, key: &str, target: &Url) -> Url {
    registry
        .with_protocol(constants::REGISTRY_PROTOCOL)
        .with_path(REGISTRY_SERVICE)
        .with_parameter(constants::REGISTRY_KEY, registry.protocol())
        .with_parameter(key, target.to_full_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_url_embeds_target() {
        let registry = Url::parse("memory://10.0.0.7:2181").unwrap();
        let target = Url::parse("dubbo://10.0.0.1:20880/acme.Greeter?side=provider").unwrap();
        let url = registry_url(&registry, constants::EXPORT_KEY, &target);
        assert_eq!(url.protocol(), "registry");
        assert_eq!(url.path(), REGISTRY_SERVICE);
        assert_eq!(url.parameter("registry"), Some("memory"));
        assert_eq!(
            Url::parse(url.parameter("export").unwrap()).unwrap(),
            target
        );
    }

    #[test]
    fn test_process_parameters() {
        let params = process_parameters("consumer", "acme.Greeter");
        assert_eq!(params["side"], "consumer");
        assert_eq!(params["interface"], "acme.Greeter");
        assert_eq!(params["dubbo"], PROTOCOL_VERSION);
        assert!(params.contains_key("pid"));
    }
}
