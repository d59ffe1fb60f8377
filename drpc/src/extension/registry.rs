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

//! The registry owning every class, declaration and loader.

use crate::extension::declaration;
use crate::extension::{builtin, ExtensionClass, ExtensionLoader, Spi};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;

type AnyBox = Box<dyn Any + Send + Sync>;

/// Owns the extension classes, declarations and loaders of one process or
/// test.
///
/// Class registration binds a class name to a constructor; declaration files
/// bind extension names to class names. Loaders are created on demand, one
/// per extension point, and live as long as the registry.
///
/// # Examples
///
/// ```rust
/// use drpc::cluster::Cluster;
/// use drpc::extension::ExtensionRegistry;
///
/// let registry = ExtensionRegistry::new();
/// let names = registry.loader::<dyn Cluster>().supported_extensions().unwrap();
/// assert!(names.contains(&"failover".to_string()));
/// ```
pub struct ExtensionRegistry {
    me: Weak<ExtensionRegistry>,
    user_root: Option<PathBuf>,
    classes: RwLock<HashMap<(TypeId, String), AnyBox>>,
    declarations: RwLock<HashMap<&'static str, Vec<String>>>,
    loaders: Mutex<HashMap<TypeId, AnyBox>>,
    beans: RwLock<HashMap<(TypeId, String), AnyBox>>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("user_root", &self.user_root)
            .field("classes", &self.classes.read().len())
            .field("loaders", &self.loaders.lock().len())
            .finish()
    }
}

impl ExtensionRegistry {
    /// A registry with every built-in class registered.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// A registry that also reads declaration files from `root`, one file
    /// per extension point named after it.
    pub fn with_user_root(root: impl Into<PathBuf>) -> Arc<Self> {
        Self::build(Some(root.into()))
    }

    fn build(user_root: Option<PathBuf>) -> Arc<Self> {
        let registry = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            user_root,
            classes: RwLock::new(HashMap::new()),
            declarations: RwLock::new(HashMap::new()),
            loaders: Mutex::new(HashMap::new()),
            beans: RwLock::new(HashMap::new()),
        });
        builtin::install(&registry);
        registry
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ExtensionRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(ExtensionRegistry::new))
    }

    /// Makes `class` available to declarations under its class name.
    /// A later registration under the same name replaces the earlier one.
    pub fn register_class<T: ?Sized + Spi>(&self, class: ExtensionClass<T>) {
        debug!(interface = T::INTERFACE, class = class.name(), "registered extension class");
        self.classes
            .write()
            .insert((TypeId::of::<T>(), class.name().to_string()), Box::new(class));
    }

    /// Adds declaration lines for `T`, read after the internal and user
    /// roots. Only affects loaders that have not loaded yet.
    pub fn declare<T: ?Sized + Spi>(&self, text: &str) {
        self.declarations
            .write()
            .entry(T::INTERFACE)
            .or_default()
            .push(text.to_string());
    }

    /// Binds `instance` as the dependency named `property` of type `T`.
    pub fn bind<T: ?Sized + Spi>(&self, property: &str, instance: Arc<T>) {
        self.beans
            .write()
            .insert((TypeId::of::<T>(), property.to_string()), Box::new(instance));
    }

    /// The loader of extension point `T`.
    ///
    /// Loaders only hold a weak reference back to the registry. Once the
    /// last `Arc<ExtensionRegistry>` is dropped, lookups that still need to
    /// load classes fail with
    /// [`ExtensionError::RegistryClosed`](crate::extension::ExtensionError::RegistryClosed).
    pub fn loader<T: ?Sized + Spi>(&self) -> ExtensionLoader<T> {
        let mut loaders = self.loaders.lock();
        let entry = loaders
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ExtensionLoader::<T>::new(self.me.clone())));
        match entry.downcast_ref::<ExtensionLoader<T>>() {
            Some(loader) => loader.clone(),
            None => ExtensionLoader::new(self.me.clone()),
        }
    }

    pub(crate) fn class<T: ?Sized + Spi>(&self, name: &str) -> Option<ExtensionClass<T>> {
        self.classes
            .read()
            .get(&(TypeId::of::<T>(), name.to_string()))
            .and_then(|class| class.downcast_ref::<ExtensionClass<T>>())
            .cloned()
    }

    pub(crate) fn bean<T: ?Sized + Spi>(&self, property: &str) -> Option<Arc<T>> {
        self.beans
            .read()
            .get(&(TypeId::of::<T>(), property.to_string()))
            .and_then(|bean| bean.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub(crate) fn declaration_sources(&self, interface: &str) -> Vec<(String, String)> {
        let mut sources = declaration::load_files(interface, self.user_root.as_deref());
        if let Some(texts) = self.declarations.read().get(interface) {
            sources.extend(
                texts
                    .iter()
                    .enumerate()
                    .map(|(index, text)| (format!("declared:{interface}#{index}"), text.clone())),
            );
        }
        sources
    }
}
