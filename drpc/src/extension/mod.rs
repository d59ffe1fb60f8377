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

//! Named, pluggable extension points.
//!
//! An extension point is a trait annotated with [`#[spi]`](crate::spi). Its
//! implementations are registered as [`ExtensionClass`]es and bound to short
//! names by declaration files, so that the implementation used for a call is
//! chosen by a URL parameter instead of by code:
//!
//! ```text
//! dubbo://10.0.0.5:20880/acme.Greeter?loadbalance=roundrobin&cluster=failfast
//! ```
//!
//! The [`ExtensionLoader`] of a point resolves names to cached instances,
//! applies wrapper classes around them, builds the adaptive forwarder and
//! computes activated extension lists.

mod builtin;
mod class;
mod declaration;
mod error;
mod loader;
mod registry;

pub use class::{Activate, Constructor, ExtensionClass, Injector, WrapperConstructor};
pub use error::ExtensionError;
pub use loader::ExtensionLoader;
pub use registry::ExtensionRegistry;

use crate::common::{constants, Url};
use std::sync::Arc;

/// Implemented by `#[spi]` for `dyn Trait` of every extension point.
pub trait Spi: Send + Sync + 'static {
    /// Fully qualified extension point name, also the declaration file name.
    const INTERFACE: &'static str;
    /// The trait's simple name, stripped from class names to derive
    /// extension names.
    const SIMPLE_NAME: &'static str;
    /// Default extension name.
    const DEFAULT: Option<&'static str>;

    /// Builds the generated adaptive forwarder, if the trait has adaptive
    /// methods.
    fn synthesize_adaptive(loader: ExtensionLoader<Self>) -> Option<Arc<Self>>;
}

/// Derives the lookup key of an adaptive method without explicit keys from
/// the extension point's simple name: `LoadBalance` becomes `load.balance`.
pub fn default_adaptive_key(simple_name: &str) -> String {
    let mut key = String::with_capacity(simple_name.len() + 4);
    for (index, ch) in simple_name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if index > 0 {
                key.push('.');
            }
            key.push(ch.to_ascii_lowercase());
        } else {
            key.push(ch);
        }
    }
    key
}

/// Resolves the extension name an adaptive call on `T` selects.
///
/// Keys are tried in order: `protocol` reads the URL scheme, any other key
/// reads the method scoped parameter when `method` is given and the plain
/// parameter otherwise. The first non-empty value wins; the declared default
/// applies when none is found.
///
/// # Errors
///
/// [`ExtensionError::CannotDetermineName`] when no key yields a name and no
/// default is declared.
pub fn adaptive_name<T: ?Sized + Spi>(
    url: &Url,
    method: Option<&str>,
    keys: &[&str],
) -> Result<String, ExtensionError> {
    let derived;
    let keys: Vec<&str> = if keys.is_empty() {
        derived = default_adaptive_key(T::SIMPLE_NAME);
        vec![derived.as_str()]
    } else {
        keys.to_vec()
    };

    for key in &keys {
        let value = if *key == constants::PROTOCOL_KEY {
            Some(url.protocol())
        } else {
            match method {
                Some(method) => url.method_parameter(method, key),
                None => url.parameter(key),
            }
        };
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            return Ok(value.to_string());
        }
    }

    T::DEFAULT
        .map(str::to_string)
        .ok_or_else(|| ExtensionError::CannotDetermineName {
            interface: T::INTERFACE.to_string(),
            url: url.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
}

/// Resolves the extension an adaptive call on `T` forwards to.
///
/// # Errors
///
/// See [`adaptive_name`] and [`ExtensionLoader::get_extension`].
pub fn adaptive_extension<T: ?Sized + Spi>(
    loader: &ExtensionLoader<T>,
    url: &Url,
    method: Option<&str>,
    keys: &[&str],
) -> Result<Arc<T>, ExtensionError> {
    let name = adaptive_name::<T>(url, method, keys)?;
    loader.get_extension(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::LoadBalance;
    use crate::rpc::Protocol;

    #[test]
    fn test_default_adaptive_key() {
        assert_eq!(default_adaptive_key("LoadBalance"), "load.balance");
        assert_eq!(default_adaptive_key("Protocol"), "protocol");
        assert_eq!(default_adaptive_key("ThreadPool"), "thread.pool");
    }

    #[test]
    fn test_adaptive_name_prefers_first_key() {
        let url = Url::parse("dubbo://h:1/s?a=x&b=y").unwrap();
        assert_eq!(adaptive_name::<dyn LoadBalance>(&url, None, &["b", "a"]).unwrap(), "y");
        assert_eq!(adaptive_name::<dyn LoadBalance>(&url, None, &["c", "a"]).unwrap(), "x");
    }

    #[test]
    fn test_adaptive_name_protocol_key_reads_scheme() {
        let url = Url::parse("injvm://h:1/s?protocol=dubbo").unwrap();
        assert_eq!(adaptive_name::<dyn Protocol>(&url, None, &["protocol"]).unwrap(), "injvm");
    }

    #[test]
    fn test_adaptive_name_method_scope() {
        let url = Url::parse("dubbo://h:1/s?loadbalance=random&sayHello.loadbalance=roundrobin").unwrap();
        let scoped = adaptive_name::<dyn LoadBalance>(&url, Some("sayHello"), &["loadbalance"]);
        let other = adaptive_name::<dyn LoadBalance>(&url, Some("bye"), &["loadbalance"]);
        assert_eq!(scoped.unwrap(), "roundrobin");
        assert_eq!(other.unwrap(), "random");
    }

    #[test]
    fn test_adaptive_name_falls_back_to_default() {
        let url = Url::parse("dubbo://h:1/s").unwrap();
        assert_eq!(
            adaptive_name::<dyn LoadBalance>(&url, None, &["loadbalance"]).unwrap(),
            "random"
        );
    }
}
