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

//! Shared building blocks: the [`Url`] configuration carrier, parameter
//! names, and process-level facts (local host, framework version).

pub mod constants;
mod url;

pub use url::{percent_decode, percent_encode, HasUrl, Url, UrlError};

use std::net::{IpAddr, UdpSocket};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Release version of this crate, advertised in URLs and error messages.
pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol version written into every request body.
pub const PROTOCOL_VERSION: &str = "2.0.2";

/// Returns the release version of the framework.
pub fn version() -> &'static str {
    RELEASE
}

/// Returns the address other hosts most likely reach this process on.
///
/// Resolved once by asking the OS which interface routes to a public
/// address; no packet is sent. Falls back to `127.0.0.1`.
pub fn local_host() -> &'static str {
    static LOCAL_HOST: OnceLock<String> = OnceLock::new();
    LOCAL_HOST.get_or_init(|| {
        probe_local_address()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| constants::LOCALHOST_VALUE.to_string())
    })
}

fn probe_local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_unspecified() || ip.is_loopback() {
        None
    } else {
        Some(ip)
    }
}

/// Whether `host` names this machine generically (`0.0.0.0`, `localhost`,
/// loopback).
pub fn is_local_host(host: &str) -> bool {
    host.is_empty()
        || host == "localhost"
        || host == constants::ANYHOST_VALUE
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_host_is_stable() {
        assert_eq!(local_host(), local_host());
        assert!(local_host().parse::<IpAddr>().is_ok());
    }

    #[test]
    fn test_is_local_host() {
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("0.0.0.0"));
        assert!(is_local_host("localhost"));
        assert!(!is_local_host("10.1.2.3"));
    }
}
