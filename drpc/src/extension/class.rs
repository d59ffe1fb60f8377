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

//! Extension classes: the constructors the registry knows how to run.
//!
//! Rust has no runtime class loading, so every implementation is registered
//! under a class name together with its constructor. Declaration files then
//! bind extension names to those class names.

use crate::common::Url;
use crate::extension::{ExtensionError, ExtensionLoader, ExtensionRegistry, Spi};
use std::fmt;
use std::sync::Arc;

/// Builds a named or adaptive extension.
pub type Constructor<T> =
    Arc<dyn Fn(&Injector<'_>) -> Result<Arc<T>, ExtensionError> + Send + Sync>;

/// Builds a wrapper around an already constructed extension.
pub type WrapperConstructor<T> =
    Arc<dyn Fn(Arc<T>, &Injector<'_>) -> Result<Arc<T>, ExtensionError> + Send + Sync>;

pub(crate) enum ClassKind<T: ?Sized> {
    Named(Constructor<T>),
    Wrapper(WrapperConstructor<T>),
    Adaptive(Constructor<T>),
}

impl<T: ?Sized> Clone for ClassKind<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Named(ctor) => Self::Named(Arc::clone(ctor)),
            Self::Wrapper(ctor) => Self::Wrapper(Arc::clone(ctor)),
            Self::Adaptive(ctor) => Self::Adaptive(Arc::clone(ctor)),
        }
    }
}

/// A registered implementation of the extension point `T`.
///
/// # Examples
///
/// ```rust
/// use drpc::cluster::LoadBalance;
/// use drpc::cluster::loadbalance::RandomLoadBalance;
/// use drpc::extension::{ExtensionClass, ExtensionRegistry};
/// use std::sync::Arc;
///
/// let registry = ExtensionRegistry::new();
/// registry.register_class(ExtensionClass::<dyn LoadBalance>::named(
///     "acme::SecondRandom",
///     |_| Ok(Arc::new(RandomLoadBalance::default()) as Arc<dyn LoadBalance>),
/// ));
/// registry.declare::<dyn LoadBalance>("second=acme::SecondRandom");
/// assert!(registry.loader::<dyn LoadBalance>().has_extension("second"));
/// ```
pub struct ExtensionClass<T: ?Sized> {
    pub(crate) name: String,
    pub(crate) kind: ClassKind<T>,
    pub(crate) activate: Option<Activate>,
}

impl<T: ?Sized + Spi> ExtensionClass<T> {
    /// A plain named implementation.
    pub fn named<F>(class_name: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(&Injector<'_>) -> Result<Arc<T>, ExtensionError> + Send + Sync + 'static,
    {
        Self {
            name: class_name.into(),
            kind: ClassKind::Named(Arc::new(ctor)),
            activate: None,
        }
    }

    /// A decorator: receives the instance it wraps.
    pub fn wrapper<F>(class_name: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(Arc<T>, &Injector<'_>) -> Result<Arc<T>, ExtensionError> + Send + Sync + 'static,
    {
        Self {
            name: class_name.into(),
            kind: ClassKind::Wrapper(Arc::new(ctor)),
            activate: None,
        }
    }

    /// A hand-written adaptive implementation that replaces the generated
    /// forwarder.
    pub fn adaptive<F>(class_name: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(&Injector<'_>) -> Result<Arc<T>, ExtensionError> + Send + Sync + 'static,
    {
        Self {
            name: class_name.into(),
            kind: ClassKind::Adaptive(Arc::new(ctor)),
            activate: None,
        }
    }

    /// Attaches activation metadata.
    #[must_use]
    pub fn with_activate(mut self, activate: Activate) -> Self {
        self.activate = Some(activate);
        self
    }
}

impl<T: ?Sized> ExtensionClass<T> {
    /// The class name declaration files refer to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Activation metadata, if any.
    pub fn activate(&self) -> Option<&Activate> {
        self.activate.as_ref()
    }

    pub(crate) fn is_wrapper(&self) -> bool {
        matches!(self.kind, ClassKind::Wrapper(_))
    }

    pub(crate) fn is_adaptive(&self) -> bool {
        matches!(self.kind, ClassKind::Adaptive(_))
    }
}

impl<T: ?Sized> Clone for ExtensionClass<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            activate: self.activate.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ExtensionClass<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ClassKind::Named(_) => "named",
            ClassKind::Wrapper(_) => "wrapper",
            ClassKind::Adaptive(_) => "adaptive",
        };
        f.debug_struct("ExtensionClass")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("activate", &self.activate)
            .finish()
    }
}

/// Conditions under which an extension is auto-activated.
///
/// An extension matches a request when no group is requested or its `group`
/// list contains the requested one, and when its `value` list is empty or the
/// URL has a non-empty parameter named `k` or ending in `.k` for some `k` in
/// it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activate {
    group: Vec<String>,
    value: Vec<String>,
    order: i32,
}

impl Activate {
    /// Activation without conditions, order `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts activation to the given groups.
    #[must_use]
    pub fn group(mut self, groups: &[&str]) -> Self {
        self.group = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Requires one of the URL keys to be present.
    #[must_use]
    pub fn value(mut self, keys: &[&str]) -> Self {
        self.value = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Sort position among activated extensions, ascending.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// The sort position.
    pub fn sort_order(&self) -> i32 {
        self.order
    }

    pub(crate) fn matches_group(&self, group: Option<&str>) -> bool {
        match group {
            None | Some("") => true,
            Some(group) => self.group.iter().any(|g| g == group),
        }
    }

    pub(crate) fn is_active(&self, url: &Url) -> bool {
        if self.value.is_empty() {
            return true;
        }
        self.value.iter().any(|key| {
            let suffix = format!(".{key}");
            url.parameters()
                .iter()
                .any(|(k, v)| (k == key || k.ends_with(&suffix)) && !v.is_empty())
        })
    }
}

/// Supplies dependencies to extension constructors.
///
/// A dependency named `property` resolves to an instance bound under that
/// name with [`ExtensionRegistry::bind`], or else to the adaptive extension
/// of the requested extension point.
pub struct Injector<'a> {
    registry: &'a ExtensionRegistry,
}

impl<'a> Injector<'a> {
    pub(crate) fn new(registry: &'a ExtensionRegistry) -> Self {
        Self { registry }
    }

    /// Resolves the dependency `property` of type `T`.
    ///
    /// # Errors
    ///
    /// Fails when nothing is bound and `T` has no adaptive extension.
    pub fn inject<T: ?Sized + Spi>(&self, property: &str) -> Result<Arc<T>, ExtensionError> {
        match self.registry.bean::<T>(property) {
            Some(bean) => Ok(bean),
            None => self.registry.loader::<T>().adaptive_extension(),
        }
    }

    /// The loader for `T`, for extensions that pick implementations by name
    /// at call time.
    pub fn loader<T: ?Sized + Spi>(&self) -> ExtensionLoader<T> {
        self.registry.loader::<T>()
    }

    /// The owning registry.
    pub fn registry(&self) -> &'a ExtensionRegistry {
        self.registry
    }
}
