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

//! Code generation for the `#[spi]` attribute.

use crate::parse::{AdaptiveDef, MethodDef, SpiDef, UrlSource};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, Ident, Pat, PatIdent, Signature};

/// Generates the trait, its `Spi` implementation and, when the trait has
/// adaptive methods, the `Adaptive<Trait>` forwarder.
pub fn generate_spi(def: &SpiDef) -> TokenStream {
    let item = &def.item;
    let ident = &item.ident;
    let interface = &def.interface;
    let simple_name = ident.to_string();
    let default = match &def.default {
        Some(name) => quote! { ::core::option::Option::Some(#name) },
        None => quote! { ::core::option::Option::None },
    };

    let (forwarder, synthesize) = if def.has_adaptive_method() {
        let adaptive_ident = format_ident!("Adaptive{}", ident);
        (
            generate_forwarder(def, &adaptive_ident),
            quote! {
                ::core::option::Option::Some(::std::sync::Arc::new(#adaptive_ident {
                    loader: __drpc_loader,
                }))
            },
        )
    } else {
        (
            quote! {},
            quote! {
                let _ = __drpc_loader;
                ::core::option::Option::None
            },
        )
    };

    quote! {
        #item

        impl ::drpc::extension::Spi for dyn #ident {
            const INTERFACE: &'static str = #interface;
            const SIMPLE_NAME: &'static str = #simple_name;
            const DEFAULT: ::core::option::Option<&'static str> = #default;

            fn synthesize_adaptive(
                __drpc_loader: ::drpc::extension::ExtensionLoader<Self>,
            ) -> ::core::option::Option<::std::sync::Arc<Self>> {
                #synthesize
            }
        }

        #forwarder
    }
}

fn generate_forwarder(def: &SpiDef, adaptive_ident: &Ident) -> TokenStream {
    let item = &def.item;
    let ident = &item.ident;
    let vis = &item.vis;
    let doc = format!(
        "Adaptive [`{ident}`]: every adaptive call reads an extension name from the \
         call's URL and forwards to that extension."
    );
    let async_attr = if def.has_async_method() {
        quote! { #[::async_trait::async_trait] }
    } else {
        quote! {}
    };

    let methods = def
        .methods
        .iter()
        .filter(|m| m.adaptive.is_some() || !m.has_default)
        .map(|m| generate_method(ident, m));

    quote! {
        #[doc = #doc]
        #vis struct #adaptive_ident {
            loader: ::drpc::extension::ExtensionLoader<dyn #ident>,
        }

        impl ::core::fmt::Debug for #adaptive_ident {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_struct(stringify!(#adaptive_ident))
                    .field("interface", &<dyn #ident as ::drpc::extension::Spi>::INTERFACE)
                    .finish()
            }
        }

        #async_attr
        impl #ident for #adaptive_ident {
            #(#methods)*
        }
    }
}

fn generate_method(trait_ident: &Ident, method: &MethodDef) -> TokenStream {
    let (sig, args) = renamed_signature(&method.sig);
    let name = &method.sig.ident;
    let name_str = name.to_string();

    let body = match &method.adaptive {
        Some(adaptive) => {
            let lookup = generate_lookup(trait_ident, adaptive, &args);
            let call = if method.sig.asyncness.is_some() {
                quote! { <dyn #trait_ident as #trait_ident>::#name(&*__drpc_ext, #(#args),*).await }
            } else {
                quote! { <dyn #trait_ident as #trait_ident>::#name(&*__drpc_ext, #(#args),*) }
            };
            quote! {
                let __drpc_ext = { #lookup };
                #call
            }
        }
        None => quote! {
            ::core::result::Result::Err(::core::convert::From::from(
                ::drpc::extension::ExtensionError::UnsupportedOperation {
                    interface: <dyn #trait_ident as ::drpc::extension::Spi>::INTERFACE.to_string(),
                    method: #name_str.to_string(),
                },
            ))
        },
    };

    quote! {
        #sig {
            #body
        }
    }
}

fn generate_lookup(trait_ident: &Ident, adaptive: &AdaptiveDef, args: &[Ident]) -> TokenStream {
    let url = match adaptive.url {
        UrlSource::Direct { index, by_ref: true } => {
            let arg = &args[index];
            quote! { #arg }
        }
        UrlSource::Direct { index, by_ref: false } => {
            let arg = &args[index];
            quote! { &#arg }
        }
        UrlSource::Getter { index } => {
            let arg = &args[index];
            quote! { ::drpc::common::HasUrl::url(&#arg) }
        }
    };
    let method = match adaptive.invocation {
        Some(index) => {
            let arg = &args[index];
            quote! { ::core::option::Option::Some(#arg.method_name()) }
        }
        None => quote! { ::core::option::Option::None },
    };
    let keys = &adaptive.keys;
    quote! {
        let __drpc_url: &::drpc::common::Url = #url;
        let __drpc_method: ::core::option::Option<&str> = #method;
        match ::drpc::extension::adaptive_extension::<dyn #trait_ident>(
            &self.loader,
            __drpc_url,
            __drpc_method,
            &[#(#keys),*],
        ) {
            ::core::result::Result::Ok(ext) => ext,
            ::core::result::Result::Err(err) => {
                return ::core::result::Result::Err(::core::convert::From::from(err));
            }
        }
    }
}

/// Replaces every typed parameter pattern with a generated identifier so
/// forwarding never depends on the names used in the trait.
fn renamed_signature(sig: &Signature) -> (Signature, Vec<Ident>) {
    let mut sig = sig.clone();
    let mut names = Vec::new();
    for (index, arg) in sig
        .inputs
        .iter_mut()
        .filter_map(|arg| match arg {
            FnArg::Typed(typed) => Some(typed),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
    {
        let name = format_ident!("__drpc_arg{}", index);
        arg.attrs.clear();
        arg.pat = Box::new(Pat::Ident(PatIdent {
            attrs: Vec::new(),
            by_ref: None,
            mutability: None,
            ident: name.clone(),
            subpat: None,
        }));
        names.push(name);
    }
    (sig, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_spi, SpiArgs};
    use syn::parse_quote;

    #[test]
    fn test_forwarder_is_generated_for_adaptive_traits() {
        let item = parse_quote! {
            pub trait Cluster: Send + Sync {
                #[adaptive("cluster")]
                fn join(&self, url: &Url) -> Result<(), Error>;
            }
        };
        let def = parse_spi(SpiArgs::default(), item).unwrap();
        let tokens = generate_spi(&def).to_string();
        assert!(tokens.contains("AdaptiveCluster"));
        assert!(tokens.contains("adaptive_extension"));
    }

    #[test]
    fn test_no_forwarder_without_adaptive_methods() {
        let item = parse_quote! {
            pub trait Filter: Send + Sync {
                fn invoke(&self, value: u8) -> Result<(), Error>;
            }
        };
        let def = parse_spi(SpiArgs::default(), item).unwrap();
        let tokens = generate_spi(&def).to_string();
        assert!(!tokens.contains("AdaptiveFilter"));
        assert!(tokens.contains("Option :: None"));
    }

    #[test]
    fn test_parameters_are_renamed() {
        let sig: Signature = parse_quote! {
            fn select(&self, _unused: &[u8], url: &Url) -> Result<(), Error>
        };
        let (renamed, names) = renamed_signature(&sig);
        assert_eq!(names.len(), 2);
        let text = quote!(#renamed).to_string();
        assert!(text.contains("__drpc_arg0"));
        assert!(!text.contains("_unused"));
    }
}
