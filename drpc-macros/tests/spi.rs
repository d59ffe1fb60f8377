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

//! Tests for the `#[spi]` attribute as seen from a downstream crate.

use async_trait::async_trait;
use drpc::common::{HasUrl, Url};
use drpc::extension::{ExtensionClass, ExtensionError, ExtensionRegistry, Spi};
use drpc::rpc::Invocation;
use drpc::spi;
use std::sync::Arc;

#[spi(name = "acme.Greeter", default = "english")]
pub trait Greeter: Send + Sync {
    #[adaptive("greeter", "language")]
    fn greet(&self, url: &Url, who: &str) -> Result<String, ExtensionError>;

    #[adaptive("greeter")]
    fn greet_call(&self, url: &Url, invocation: &Invocation) -> Result<String, ExtensionError>;

    fn language(&self) -> Result<String, ExtensionError>;

    fn polite(&self) -> bool {
        true
    }
}

struct English;

impl Greeter for English {
    fn greet(&self, _url: &Url, who: &str) -> Result<String, ExtensionError> {
        Ok(format!("hello {who}"))
    }

    fn greet_call(&self, _url: &Url, invocation: &Invocation) -> Result<String, ExtensionError> {
        Ok(format!("hello from {}", invocation.method_name()))
    }

    fn language(&self) -> Result<String, ExtensionError> {
        Ok("english".into())
    }
}

struct French;

impl Greeter for French {
    fn greet(&self, _url: &Url, who: &str) -> Result<String, ExtensionError> {
        Ok(format!("bonjour {who}"))
    }

    fn greet_call(&self, _url: &Url, invocation: &Invocation) -> Result<String, ExtensionError> {
        Ok(format!("bonjour de {}", invocation.method_name()))
    }

    fn language(&self) -> Result<String, ExtensionError> {
        Ok("french".into())
    }
}

#[spi(name = "acme.Transport")]
#[async_trait]
pub trait Transport: Send + Sync {
    #[adaptive]
    async fn send(&self, url: &Url, bytes: usize) -> Result<String, ExtensionError>;
}

struct Loopback;

#[async_trait]
impl Transport for Loopback {
    async fn send(&self, url: &Url, bytes: usize) -> Result<String, ExtensionError> {
        Ok(format!("{bytes} bytes to {}", url.address()))
    }
}

struct Endpoint(Url);

impl HasUrl for Endpoint {
    fn url(&self) -> &Url {
        &self.0
    }
}

#[spi(name = "acme.Sink")]
pub trait Sink: Send + Sync {
    #[adaptive(url = endpoint)]
    fn accept(&self, endpoint: &Endpoint) -> Result<&'static str, ExtensionError>;
}

struct Null;

impl Sink for Null {
    fn accept(&self, _endpoint: &Endpoint) -> Result<&'static str, ExtensionError> {
        Ok("null")
    }
}

/// Not an adaptive extension point: no forwarder is generated.
#[spi(name = "acme.Plain", default = "plain")]
pub trait Plain: Send + Sync {
    fn id(&self) -> u8;
}

fn greeters() -> Arc<ExtensionRegistry> {
    let registry = ExtensionRegistry::new();
    registry.register_class(ExtensionClass::<dyn Greeter>::named("acme::English", |_| {
        Ok(Arc::new(English) as Arc<dyn Greeter>)
    }));
    registry.register_class(ExtensionClass::<dyn Greeter>::named("acme::French", |_| {
        Ok(Arc::new(French) as Arc<dyn Greeter>)
    }));
    registry.declare::<dyn Greeter>("english=acme::English\nfrench=acme::French");
    registry
}

fn url(query: &str) -> Url {
    format!("test://127.0.0.1:1/acme.Greeter{query}").parse().unwrap()
}

#[test]
fn test_spi_constants() {
    assert_eq!(<dyn Greeter as Spi>::INTERFACE, "acme.Greeter");
    assert_eq!(<dyn Greeter as Spi>::SIMPLE_NAME, "Greeter");
    assert_eq!(<dyn Greeter as Spi>::DEFAULT, Some("english"));
    assert_eq!(<dyn Transport as Spi>::DEFAULT, None);
}

#[test]
fn test_adaptive_reads_keys_in_order() {
    let adaptive = greeters().loader::<dyn Greeter>().adaptive_extension().unwrap();
    assert_eq!(adaptive.greet(&url("?greeter=french"), "ada").unwrap(), "bonjour ada");
    assert_eq!(adaptive.greet(&url("?language=french"), "ada").unwrap(), "bonjour ada");
    assert_eq!(
        adaptive.greet(&url("?greeter=english&language=french"), "ada").unwrap(),
        "hello ada"
    );
    assert_eq!(adaptive.greet(&url(""), "ada").unwrap(), "hello ada");
}

#[test]
fn test_adaptive_scopes_by_invocation_method() {
    let adaptive = greeters().loader::<dyn Greeter>().adaptive_extension().unwrap();
    let invocation = Invocation::new("welcome", Vec::<String>::new(), Vec::new());
    let scoped = url("?greeter=english&welcome.greeter=french");
    assert_eq!(adaptive.greet_call(&scoped, &invocation).unwrap(), "bonjour de welcome");

    let other = Invocation::new("farewell", Vec::<String>::new(), Vec::new());
    assert_eq!(adaptive.greet_call(&scoped, &other).unwrap(), "hello from farewell");
}

#[test]
fn test_non_adaptive_method_is_unsupported() {
    let adaptive = greeters().loader::<dyn Greeter>().adaptive_extension().unwrap();
    let err = adaptive.language().unwrap_err();
    assert!(matches!(err, ExtensionError::UnsupportedOperation { ref method, .. } if method == "language"));
    assert!(adaptive.polite());
}

#[test]
fn test_unknown_name_is_reported() {
    let adaptive = greeters().loader::<dyn Greeter>().adaptive_extension().unwrap();
    let err = adaptive.greet(&url("?greeter=klingon"), "ada").unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn test_async_adaptive_uses_derived_key() {
    let registry = ExtensionRegistry::new();
    registry.register_class(ExtensionClass::<dyn Transport>::named("acme::Loopback", |_| {
        Ok(Arc::new(Loopback) as Arc<dyn Transport>)
    }));
    registry.declare::<dyn Transport>("loopback=acme::Loopback");
    let adaptive = registry.loader::<dyn Transport>().adaptive_extension().unwrap();

    let reply = adaptive.send(&url("?transport=loopback"), 3).await.unwrap();
    assert_eq!(reply, "3 bytes to 127.0.0.1:1");

    let err = adaptive.send(&url(""), 3).await.unwrap_err();
    assert!(matches!(err, ExtensionError::CannotDetermineName { ref keys, .. } if keys == &["transport"]));
}

#[test]
fn test_url_getter_parameter() {
    let registry = ExtensionRegistry::new();
    registry.register_class(ExtensionClass::<dyn Sink>::named("acme::Null", |_| Ok(Arc::new(Null) as Arc<dyn Sink>)));
    registry.declare::<dyn Sink>("null=acme::Null");
    let adaptive = registry.loader::<dyn Sink>().adaptive_extension().unwrap();
    assert_eq!(adaptive.accept(&Endpoint(url("?sink=null"))).unwrap(), "null");
}

#[test]
fn test_plain_trait_has_no_adaptive() {
    let err = ExtensionRegistry::new().loader::<dyn Plain>().adaptive_extension().err().unwrap();
    assert!(matches!(err, ExtensionError::NoAdaptiveMethod { .. }));
}
