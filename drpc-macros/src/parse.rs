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

//! Parsing logic for the `#[spi]` attribute.
//!
//! Extracts the extension-point name, the default extension and the
//! `#[adaptive]` markers from a trait definition. The markers are stripped
//! from the trait before it is emitted again.

use proc_macro2::Span;
use syn::{
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    Attribute, Error, FnArg, Ident, ItemTrait, LitStr, Pat, Result, ReturnType, Signature, Token,
    TraitItem, Type,
};

/// Arguments given to `#[spi(...)]`.
#[derive(Debug, Default)]
pub struct SpiArgs {
    /// Fully qualified extension-point name, used as the declaration file name.
    pub name: Option<LitStr>,
    /// Name of the default extension.
    pub default: Option<LitStr>,
}

impl Parse for SpiArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut args = SpiArgs::default();
        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            let value: LitStr = input.parse()?;
            match key.to_string().as_str() {
                "name" => args.name = Some(value),
                "default" => args.default = Some(value),
                other => {
                    return Err(Error::new(
                        key.span(),
                        format!("unknown spi argument `{other}`, expected `name` or `default`"),
                    ))
                }
            }
            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }
        Ok(args)
    }
}

/// One element inside `#[adaptive(...)]`.
enum AdaptiveArg {
    Key(LitStr),
    Url(Ident),
}

impl Parse for AdaptiveArg {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.peek(LitStr) {
            return Ok(AdaptiveArg::Key(input.parse()?));
        }
        let key: Ident = input.parse()?;
        if key != "url" {
            return Err(Error::new(
                key.span(),
                "expected a string key or `url = <parameter>`",
            ));
        }
        input.parse::<Token![=]>()?;
        Ok(AdaptiveArg::Url(input.parse()?))
    }
}

/// Where the adaptive forwarder finds its URL.
#[derive(Debug, Clone)]
pub enum UrlSource {
    /// A parameter of type `Url` or `&Url`.
    Direct { index: usize, by_ref: bool },
    /// A parameter whose value implements `HasUrl`.
    Getter { index: usize },
}

/// An `#[adaptive]` marker on a method.
#[derive(Debug, Clone)]
pub struct AdaptiveDef {
    pub keys: Vec<String>,
    pub url: UrlSource,
    /// Index of an `Invocation` parameter, if any.
    pub invocation: Option<usize>,
}

/// A trait method as seen by the generator.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub sig: Signature,
    pub has_default: bool,
    pub returns_result: bool,
    pub adaptive: Option<AdaptiveDef>,
}

/// Parsed extension point.
#[derive(Debug)]
pub struct SpiDef {
    /// The trait with `#[adaptive]` markers removed.
    pub item: ItemTrait,
    pub interface: String,
    pub default: Option<String>,
    pub methods: Vec<MethodDef>,
}

impl SpiDef {
    pub fn has_adaptive_method(&self) -> bool {
        self.methods.iter().any(|m| m.adaptive.is_some())
    }

    pub fn has_async_method(&self) -> bool {
        self.methods
            .iter()
            .any(|m| !m.has_default && m.sig.asyncness.is_some())
    }
}

/// Parses the trait and its `#[spi]` arguments.
pub fn parse_spi(args: SpiArgs, mut item: ItemTrait) -> Result<SpiDef> {
    if !item.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &item.generics,
            "extension points cannot be generic",
        ));
    }
    let interface = match &args.name {
        Some(name) => name.value(),
        None => item.ident.to_string(),
    };
    if interface.trim().is_empty() {
        return Err(Error::new(Span::call_site(), "extension name must not be empty"));
    }

    let mut methods = Vec::new();
    for trait_item in &mut item.items {
        if let TraitItem::Fn(method) = trait_item {
            let adaptive_attr = take_adaptive(&mut method.attrs)?;
            let params = method
                .sig
                .inputs
                .iter()
                .filter_map(|arg| match arg {
                    FnArg::Receiver(_) => None,
                    FnArg::Typed(typed) => Some(match &*typed.pat {
                        Pat::Ident(ident) => Some(ident.ident.clone()),
                        _ => None,
                    }),
                })
                .collect::<Vec<_>>();
            let adaptive = match adaptive_attr {
                Some(args) => Some(resolve_adaptive(&method.sig, &params, args)?),
                None => None,
            };
            methods.push(MethodDef {
                returns_result: returns_result(&method.sig.output),
                has_default: method.default.is_some(),
                sig: method.sig.clone(),
                adaptive,
            });
        }
    }

    let has_adaptive = methods.iter().any(|m| m.adaptive.is_some());
    for method in &methods {
        if method.adaptive.is_some() && !method.returns_result {
            return Err(Error::new_spanned(
                &method.sig,
                "adaptive methods must return a Result so lookup failures can be reported",
            ));
        }
        if has_adaptive && method.adaptive.is_none() && !method.has_default && !method.returns_result {
            return Err(Error::new_spanned(
                &method.sig,
                "non-adaptive methods of an adaptive extension point must return a Result or provide a default body",
            ));
        }
        if method.sig.receiver().is_none() {
            return Err(Error::new_spanned(
                &method.sig,
                "extension methods must take `&self`",
            ));
        }
    }

    Ok(SpiDef {
        item,
        interface,
        default: args.default.map(|lit| lit.value()),
        methods,
    })
}

/// Removes the `#[adaptive]` attribute from a method, returning its arguments.
fn take_adaptive(attrs: &mut Vec<Attribute>) -> Result<Option<Vec<AdaptiveArg>>> {
    let Some(position) = attrs.iter().position(|a| a.path().is_ident("adaptive")) else {
        return Ok(None);
    };
    let attr = attrs.remove(position);
    if attrs.iter().any(|a| a.path().is_ident("adaptive")) {
        return Err(Error::new_spanned(attr, "duplicate #[adaptive] marker"));
    }
    match &attr.meta {
        syn::Meta::Path(_) => Ok(Some(Vec::new())),
        syn::Meta::List(_) => {
            let args = attr.parse_args_with(Punctuated::<AdaptiveArg, Token![,]>::parse_terminated)?;
            Ok(Some(args.into_iter().collect()))
        }
        syn::Meta::NameValue(_) => Err(Error::new_spanned(
            attr,
            "expected #[adaptive] or #[adaptive(\"key\", ...)]",
        )),
    }
}

fn resolve_adaptive(
    sig: &Signature,
    params: &[Option<Ident>],
    args: Vec<AdaptiveArg>,
) -> Result<AdaptiveDef> {
    let types: Vec<&Type> = sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(typed) => Some(&*typed.ty),
            FnArg::Receiver(_) => None,
        })
        .collect();

    let mut keys = Vec::new();
    let mut explicit_url = None;
    for arg in args {
        match arg {
            AdaptiveArg::Key(key) => keys.push(key.value()),
            AdaptiveArg::Url(ident) => {
                let index = params
                    .iter()
                    .position(|p| p.as_ref() == Some(&ident))
                    .ok_or_else(|| {
                        Error::new(ident.span(), format!("no parameter named `{ident}`"))
                    })?;
                explicit_url = Some(UrlSource::Getter { index });
            }
        }
    }

    let url = match explicit_url {
        Some(source) => source,
        None => types
            .iter()
            .enumerate()
            .find_map(|(index, ty)| {
                type_named(ty, "Url").map(|by_ref| UrlSource::Direct { index, by_ref })
            })
            .ok_or_else(|| {
                Error::new_spanned(
                    sig,
                    "adaptive method has no `Url` parameter; name one with `url = <parameter>`",
                )
            })?,
    };

    let invocation = types
        .iter()
        .position(|ty| type_named(ty, "Invocation").is_some());

    Ok(AdaptiveDef {
        keys,
        url,
        invocation,
    })
}

/// Returns `Some(by_ref)` when the last path segment of `ty` is `name`.
fn type_named(ty: &Type, name: &str) -> Option<bool> {
    match ty {
        Type::Reference(reference) => type_named(&reference.elem, name).map(|_| true),
        Type::Path(path) => path
            .path
            .segments
            .last()
            .filter(|seg| seg.ident == name)
            .map(|_| false),
        Type::Paren(inner) => type_named(&inner.elem, name),
        _ => None,
    }
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => match &**ty {
            Type::Path(path) => path
                .path
                .segments
                .last()
                .is_some_and(|seg| seg.ident == "Result"),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_parse_args() {
        let args: SpiArgs = syn::parse_str(r#"name = "a.b.Protocol", default = "dubbo""#).unwrap();
        assert_eq!(args.name.unwrap().value(), "a.b.Protocol");
        assert_eq!(args.default.unwrap().value(), "dubbo");
    }

    #[test]
    fn test_adaptive_with_url_param() {
        let item: ItemTrait = parse_quote! {
            pub trait LoadBalance: Send + Sync {
                #[adaptive("loadbalance")]
                fn select(&self, invokers: &[u8], url: &Url, invocation: &Invocation) -> Result<(), E>;
            }
        };
        let def = parse_spi(SpiArgs::default(), item).unwrap();
        assert_eq!(def.interface, "LoadBalance");
        let adaptive = def.methods[0].adaptive.clone().unwrap();
        assert_eq!(adaptive.keys, vec!["loadbalance".to_string()]);
        assert!(matches!(adaptive.url, UrlSource::Direct { index: 1, by_ref: true }));
        assert_eq!(adaptive.invocation, Some(2));
    }

    #[test]
    fn test_adaptive_marker_is_stripped() {
        let item: ItemTrait = parse_quote! {
            pub trait Cluster {
                #[adaptive(url = directory)]
                fn join(&self, directory: Arc<dyn Directory>) -> Result<(), E>;
            }
        };
        let def = parse_spi(SpiArgs::default(), item).unwrap();
        let TraitItem::Fn(method) = &def.item.items[0] else {
            panic!("expected a method");
        };
        assert!(method.attrs.is_empty());
        assert!(matches!(
            def.methods[0].adaptive.as_ref().unwrap().url,
            UrlSource::Getter { index: 0 }
        ));
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let item: ItemTrait = parse_quote! {
            pub trait Broken {
                #[adaptive]
                fn run(&self, name: &str) -> Result<(), E>;
            }
        };
        assert!(parse_spi(SpiArgs::default(), item).is_err());
    }

    #[test]
    fn test_non_result_without_body_is_rejected() {
        let item: ItemTrait = parse_quote! {
            pub trait Broken {
                fn id(&self) -> u8;
                #[adaptive]
                fn run(&self, url: &Url) -> Result<(), E>;
            }
        };
        assert!(parse_spi(SpiArgs::default(), item).is_err());
    }

    #[test]
    fn test_plain_methods_allowed_without_adaptive() {
        let item: ItemTrait = parse_quote! {
            pub trait Serialization {
                fn content_type_id(&self) -> u8;
            }
        };
        let def = parse_spi(SpiArgs::default(), item).unwrap();
        assert!(!def.has_adaptive_method());
    }
}
