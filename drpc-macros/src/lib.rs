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

//! Procedural macros for the drpc framework.
//!
//! This crate provides the `#[drpc::spi]` attribute macro that turns a trait
//! into an extension point known to the drpc extension registry.
//!
//! # Example
//!
//! ```ignore
//! use drpc::spi;
//! use drpc::common::Url;
//!
//! #[spi(name = "acme.Greeter", default = "english")]
//! pub trait Greeter: Send + Sync {
//!     // Dispatched on the `greeter` parameter of `url`.
//!     #[adaptive("greeter")]
//!     fn greet(&self, url: &Url, who: &str) -> Result<String, drpc::RpcError>;
//!
//!     // Not adaptive: the forwarder reports an unsupported operation.
//!     fn language(&self) -> Result<String, drpc::RpcError>;
//! }
//! ```
//!
//! This will generate:
//! - An `impl drpc::extension::Spi for dyn Greeter` carrying the extension
//!   point name and its default extension
//! - An `AdaptiveGreeter` struct that resolves the concrete extension from
//!   the URL on every adaptive call
//!
//! When `#[async_trait]` is also used it must be placed *below* `#[spi]` so
//! the macro sees the `async fn` declarations.

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemTrait};

mod generate;
mod parse;

/// Marks a trait as an extension point.
///
/// # Arguments
///
/// - `name = "..."`: fully qualified extension point name. Declaration files
///   are looked up by this name. Defaults to the trait name.
/// - `default = "..."`: name of the default extension.
///
/// # Adaptive methods
///
/// Methods marked `#[adaptive]` are forwarded by the generated
/// `Adaptive<Trait>` type. The extension name is read from the URL found in
/// the method parameters, trying each listed key in turn:
///
/// - `#[adaptive]` derives the key from the trait name (`LoadBalance` reads
///   `load.balance`, `Protocol` reads the URL scheme)
/// - `#[adaptive("a", "b")]` reads `a`, then `b`
/// - `#[adaptive(url = invoker)]` takes the URL from a parameter implementing
///   `drpc::common::HasUrl` instead of a `Url` parameter
///
/// When a parameter of type `Invocation` is present its method name scopes
/// the lookup (`<method>.<key>` before `<key>`).
///
/// Adaptive methods must return `Result<_, E>` where `E: From<ExtensionError>`.
#[proc_macro_attribute]
pub fn spi(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as parse::SpiArgs);
    let item = parse_macro_input!(input as ItemTrait);

    match parse::parse_spi(args, item) {
        Ok(def) => generate::generate_spi(&def).into(),
        Err(err) => err.to_compile_error().into(),
    }
}
