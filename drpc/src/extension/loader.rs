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

//! Per extension point loader: name resolution, instance caching, wrapper
//! composition, adaptive and activated extensions.

use crate::common::Url;
use crate::extension::class::{ClassKind, Constructor, WrapperConstructor};
use crate::extension::declaration;
use crate::extension::{Activate, ExtensionClass, ExtensionError, ExtensionRegistry, Injector, Spi};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

enum Slot<T: ?Sized> {
    Empty,
    Creating,
    Ready(Arc<T>),
    Failed(ExtensionError),
}

/// Publication point of one instance. Re-entrant so that a constructor
/// asking for its own extension reports a cycle instead of deadlocking.
type Holder<T> = ReentrantMutex<RefCell<Slot<T>>>;

fn new_holder<T: ?Sized>() -> Holder<T> {
    ReentrantMutex::new(RefCell::new(Slot::Empty))
}

struct NamedClass<T: ?Sized> {
    class: String,
    ctor: Constructor<T>,
}

impl<T: ?Sized> Clone for NamedClass<T> {
    fn clone(&self) -> Self {
        Self {
            class: self.class.clone(),
            ctor: Arc::clone(&self.ctor),
        }
    }
}

/// The classified declarations of one extension point.
struct LoadedClasses<T: ?Sized> {
    named: BTreeMap<String, NamedClass<T>>,
    wrappers: Vec<(String, WrapperConstructor<T>)>,
    adaptive: Option<(String, Constructor<T>)>,
    activates: BTreeMap<String, Activate>,
    failures: Vec<String>,
}

impl<T: ?Sized> Clone for LoadedClasses<T> {
    fn clone(&self) -> Self {
        Self {
            named: self.named.clone(),
            wrappers: self
                .wrappers
                .iter()
                .map(|(name, ctor)| (name.clone(), Arc::clone(ctor)))
                .collect(),
            adaptive: self
                .adaptive
                .as_ref()
                .map(|(name, ctor)| (name.clone(), Arc::clone(ctor))),
            activates: self.activates.clone(),
            failures: self.failures.clone(),
        }
    }
}

impl<T: ?Sized + Spi> LoadedClasses<T> {
    fn load(registry: &ExtensionRegistry) -> Result<Self, ExtensionError> {
        let mut loaded = Self {
            named: BTreeMap::new(),
            wrappers: Vec::new(),
            adaptive: None,
            activates: BTreeMap::new(),
            failures: Vec::new(),
        };
        for (origin, text) in registry.declaration_sources(T::INTERFACE) {
            for decl in declaration::parse(&text) {
                match registry.class::<T>(&decl.class) {
                    Some(class) => loaded.add(decl.names, class)?,
                    None => loaded.failures.push(format!(
                        "Failed to load extension class (interface: {}, class line: {}) in {}, cause: no class named {} is registered",
                        T::INTERFACE,
                        decl.line,
                        origin,
                        decl.class
                    )),
                }
            }
        }
        debug!(
            interface = T::INTERFACE,
            names = ?loaded.named.keys().collect::<Vec<_>>(),
            wrappers = loaded.wrappers.len(),
            "loaded extension classes"
        );
        Ok(loaded)
    }

    fn add(&mut self, names: Vec<String>, class: ExtensionClass<T>) -> Result<(), ExtensionError> {
        let ExtensionClass {
            name: class_name,
            kind,
            activate,
        } = class;
        match kind {
            ClassKind::Adaptive(ctor) => match &self.adaptive {
                Some((existing, _)) if *existing != class_name => {
                    Err(ExtensionError::DuplicateAdaptive {
                        interface: T::INTERFACE.to_string(),
                        first: existing.clone(),
                        second: class_name,
                    })
                }
                Some(_) => Ok(()),
                None => {
                    self.adaptive = Some((class_name, ctor));
                    Ok(())
                }
            },
            ClassKind::Wrapper(ctor) => {
                if !self.wrappers.iter().any(|(name, _)| *name == class_name) {
                    self.wrappers.push((class_name, ctor));
                }
                Ok(())
            }
            ClassKind::Named(ctor) => {
                let names = if names.is_empty() {
                    vec![declaration::derive_name(&class_name, T::SIMPLE_NAME)]
                } else {
                    names
                };
                if let (Some(activate), Some(first)) = (activate, names.first()) {
                    self.activates.entry(first.clone()).or_insert(activate);
                }
                for name in names {
                    match self.named.get(&name) {
                        Some(existing) if existing.class != class_name => {
                            return Err(ExtensionError::DuplicateName {
                                interface: T::INTERFACE.to_string(),
                                name,
                                first: existing.class.clone(),
                                second: class_name,
                            });
                        }
                        Some(_) => {}
                        None => {
                            self.named.insert(
                                name,
                                NamedClass {
                                    class: class_name.clone(),
                                    ctor: Arc::clone(&ctor),
                                },
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn not_found(&self, name: &str) -> ExtensionError {
        let needle = name.to_lowercase();
        ExtensionError::NotFound {
            interface: T::INTERFACE.to_string(),
            name: name.to_string(),
            causes: self
                .failures
                .iter()
                .filter(|f| f.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
        }
    }
}

struct LoaderInner<T: ?Sized> {
    registry: Weak<ExtensionRegistry>,
    classes: RwLock<Option<Arc<LoadedClasses<T>>>>,
    load_lock: Mutex<()>,
    instances: Mutex<HashMap<String, Arc<Holder<T>>>>,
    adaptive: Holder<T>,
}

/// Resolves and caches the extensions of one extension point.
///
/// Loaders are cheap handles; clones share the same caches. Obtain one from
/// [`ExtensionRegistry::loader`].
///
/// # Examples
///
/// ```rust
/// use drpc::cluster::LoadBalance;
/// use drpc::extension::ExtensionRegistry;
/// use std::sync::Arc;
///
/// let registry = ExtensionRegistry::new();
/// let loader = registry.loader::<dyn LoadBalance>();
///
/// let first = loader.get_extension("roundrobin").unwrap();
/// let second = loader.get_extension("roundrobin").unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(loader.default_extension_name().as_deref(), Some("random"));
/// ```
pub struct ExtensionLoader<T: ?Sized + Spi> {
    inner: Arc<LoaderInner<T>>,
}

impl<T: ?Sized + Spi> Clone for ExtensionLoader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized + Spi> fmt::Debug for ExtensionLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("interface", &T::INTERFACE)
            .finish()
    }
}

impl<T: ?Sized + Spi> ExtensionLoader<T> {
    pub(crate) fn new(registry: Weak<ExtensionRegistry>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                registry,
                classes: RwLock::new(None),
                load_lock: Mutex::new(()),
                instances: Mutex::new(HashMap::new()),
                adaptive: new_holder(),
            }),
        }
    }

    /// The extension point name.
    pub fn interface(&self) -> &'static str {
        T::INTERFACE
    }

    fn registry(&self) -> Result<Arc<ExtensionRegistry>, ExtensionError> {
        self.inner
            .registry
            .upgrade()
            .ok_or_else(|| ExtensionError::RegistryClosed {
                interface: T::INTERFACE.to_string(),
            })
    }

    fn classes(&self) -> Result<Arc<LoadedClasses<T>>, ExtensionError> {
        if let Some(classes) = self.inner.classes.read().as_ref() {
            return Ok(Arc::clone(classes));
        }
        let _loading = self.inner.load_lock.lock();
        if let Some(classes) = self.inner.classes.read().as_ref() {
            return Ok(Arc::clone(classes));
        }
        let registry = self.registry()?;
        let loaded = Arc::new(LoadedClasses::<T>::load(&registry)?);
        *self.inner.classes.write() = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Returns the extension named `name`, constructing it on first use.
    ///
    /// The same instance is returned for the life of the registry. The name
    /// `"true"` selects the default extension.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::NotFound`] for unknown names, listing load failures
    /// of similarly named declarations; constructor failures otherwise.
    pub fn get_extension(&self, name: &str) -> Result<Arc<T>, ExtensionError> {
        if name.is_empty() {
            return Err(ExtensionError::IllegalArgument(
                "Extension name == null".to_string(),
            ));
        }
        if name == "true" {
            return self
                .default_extension()?
                .ok_or_else(|| ExtensionError::NotFound {
                    interface: T::INTERFACE.to_string(),
                    name: name.to_string(),
                    causes: Vec::new(),
                });
        }
        let classes = self.classes()?;
        if !classes.named.contains_key(name) {
            return Err(classes.not_found(name));
        }

        let holder = {
            let mut instances = self.inner.instances.lock();
            Arc::clone(
                instances
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(new_holder())),
            )
        };
        let guard = holder.lock();
        match &*guard.borrow() {
            Slot::Ready(instance) => return Ok(Arc::clone(instance)),
            Slot::Creating => {
                return Err(ExtensionError::CyclicDependency {
                    interface: T::INTERFACE.to_string(),
                    name: name.to_string(),
                })
            }
            Slot::Empty | Slot::Failed(_) => {}
        }
        *guard.borrow_mut() = Slot::Creating;
        let created = self.create_extension(&classes, name);
        *guard.borrow_mut() = match &created {
            Ok(instance) => Slot::Ready(Arc::clone(instance)),
            Err(_) => Slot::Empty,
        };
        created
    }

    fn create_extension(
        &self,
        classes: &LoadedClasses<T>,
        name: &str,
    ) -> Result<Arc<T>, ExtensionError> {
        let class = classes
            .named
            .get(name)
            .ok_or_else(|| classes.not_found(name))?;
        let registry = self.registry()?;
        let injector = Injector::new(&registry);
        let mut instance = (class.ctor)(&injector)?;
        for (_, wrapper) in &classes.wrappers {
            instance = wrapper(instance, &injector)?;
        }
        debug!(
            interface = T::INTERFACE,
            name,
            class = %class.class,
            wrappers = classes.wrappers.len(),
            "created extension"
        );
        Ok(instance)
    }

    /// The declared default extension name, if any.
    pub fn default_extension_name(&self) -> Option<String> {
        T::DEFAULT
            .filter(|name| !name.is_empty() && *name != "true")
            .map(str::to_string)
    }

    /// The default extension, or `None` when no default is declared.
    ///
    /// # Errors
    ///
    /// Fails when the default is declared but cannot be resolved.
    pub fn default_extension(&self) -> Result<Option<Arc<T>>, ExtensionError> {
        match self.default_extension_name() {
            Some(name) => self.get_extension(&name).map(Some),
            None => Ok(None),
        }
    }

    /// Whether `name` is declared.
    pub fn has_extension(&self, name: &str) -> bool {
        self.classes()
            .map(|classes| classes.named.contains_key(name))
            .unwrap_or(false)
    }

    /// All declared names, sorted.
    ///
    /// # Errors
    ///
    /// Fails when the declarations cannot be loaded.
    pub fn supported_extensions(&self) -> Result<Vec<String>, ExtensionError> {
        Ok(self.classes()?.named.keys().cloned().collect())
    }

    /// Names whose instance has already been constructed, sorted.
    pub fn loaded_extensions(&self) -> Vec<String> {
        let instances: Vec<(String, Arc<Holder<T>>)> = self
            .inner
            .instances
            .lock()
            .iter()
            .map(|(name, holder)| (name.clone(), Arc::clone(holder)))
            .collect();
        let mut names: Vec<String> = instances
            .into_iter()
            .filter(|(_, holder)| matches!(&*holder.lock().borrow(), Slot::Ready(_)))
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    /// Registers `class_name` under `name` at runtime.
    ///
    /// # Errors
    ///
    /// Fails when the class is unknown to the registry, when `name` is taken,
    /// or when a second adaptive class is added.
    pub fn add_extension(&self, name: &str, class_name: &str) -> Result<(), ExtensionError> {
        let registry = self.registry()?;
        let class = registry.class::<T>(class_name).ok_or_else(|| {
            ExtensionError::IllegalArgument(format!(
                "no class named {class_name} is registered for {}",
                T::INTERFACE
            ))
        })?;
        self.classes()?;
        let _loading = self.inner.load_lock.lock();
        let mut updated = match self.inner.classes.read().as_ref() {
            Some(current) => LoadedClasses::clone(current),
            None => LoadedClasses::load(&registry)?,
        };
        if !class.is_wrapper() && !class.is_adaptive() && updated.named.contains_key(name) {
            return Err(ExtensionError::IllegalArgument(format!(
                "Extension name {name} already existed (Extension {})",
                T::INTERFACE
            )));
        }
        updated.add(vec![name.to_string()], class)?;
        *self.inner.classes.write() = Some(Arc::new(updated));
        Ok(())
    }

    /// Returns the adaptive extension: a declared adaptive class if there is
    /// one, otherwise the forwarder generated by `#[spi]`.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::NoAdaptiveMethod`] when neither exists. A creation
    /// failure is remembered and reported on every later call.
    pub fn adaptive_extension(&self) -> Result<Arc<T>, ExtensionError> {
        let guard = self.inner.adaptive.lock();
        match &*guard.borrow() {
            Slot::Ready(instance) => return Ok(Arc::clone(instance)),
            Slot::Failed(err) => return Err(err.clone()),
            Slot::Creating => {
                return Err(ExtensionError::CyclicDependency {
                    interface: T::INTERFACE.to_string(),
                    name: "adaptive".to_string(),
                })
            }
            Slot::Empty => {}
        }
        *guard.borrow_mut() = Slot::Creating;
        let created = self.create_adaptive();
        *guard.borrow_mut() = match &created {
            Ok(instance) => Slot::Ready(Arc::clone(instance)),
            Err(err) => Slot::Failed(err.clone()),
        };
        created
    }

    fn create_adaptive(&self) -> Result<Arc<T>, ExtensionError> {
        let classes = self.classes()?;
        if let Some((_, ctor)) = &classes.adaptive {
            let registry = self.registry()?;
            return ctor(&Injector::new(&registry));
        }
        T::synthesize_adaptive(self.clone()).ok_or_else(|| ExtensionError::NoAdaptiveMethod {
            interface: T::INTERFACE.to_string(),
        })
    }

    /// Returns the extensions activated for `url`, `names` and `group`.
    ///
    /// Auto-activated extensions (matching group and URL keys, not named
    /// explicitly) come first, sorted by order. Explicit `names` follow in
    /// the given order, except that names listed before `default` are moved
    /// in front of the auto-activated ones. `-name` removes an extension and
    /// `-default` disables auto-activation.
    ///
    /// # Errors
    ///
    /// Fails when an explicit name is unknown or a constructor fails.
    pub fn activate_extensions(
        &self,
        url: &Url,
        names: &[&str],
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>, ExtensionError> {
        let excluded = |name: &str| names.contains(&format!("-{name}").as_str());
        let mut activated = Vec::new();

        if !names.contains(&"-default") {
            let classes = self.classes()?;
            let mut candidates: Vec<(&String, &Activate)> = classes
                .activates
                .iter()
                .filter(|(name, activate)| {
                    activate.matches_group(group)
                        && !names.contains(&name.as_str())
                        && !excluded(name)
                        && activate.is_active(url)
                })
                .collect();
            candidates.sort_by_key(|(_, activate)| activate.sort_order());
            for (name, _) in candidates {
                activated.push(self.get_extension(name)?);
            }
        }

        let mut users = Vec::new();
        for name in names {
            if name.starts_with('-') || excluded(name) {
                continue;
            }
            if *name == "default" {
                activated.splice(0..0, users.drain(..));
            } else {
                users.push(self.get_extension(name)?);
            }
        }
        activated.extend(users);
        Ok(activated)
    }

    /// Like [`activate_extensions`](Self::activate_extensions), reading the
    /// comma separated names from the URL parameter `key`.
    ///
    /// # Errors
    ///
    /// See [`activate_extensions`](Self::activate_extensions).
    pub fn activate_extensions_for_key(
        &self,
        url: &Url,
        key: &str,
        group: Option<&str>,
    ) -> Result<Vec<Arc<T>>, ExtensionError> {
        let names: Vec<&str> = url
            .parameter(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        self.activate_extensions(url, &names, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi;

    #[spi(name = "drpc.test.Label", default = "plain")]
    pub trait Label: Send + Sync {
        fn label(&self) -> String;
    }

    #[spi(name = "drpc.test.Stage", default = "first")]
    pub trait Stage: Send + Sync {
        #[adaptive("stage")]
        fn stage(&self, url: &Url) -> Result<String, ExtensionError>;
    }

    struct Named(&'static str);

    impl Label for Named {
        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    struct Wrapped {
        tag: &'static str,
        inner: Arc<dyn Label>,
    }

    impl Label for Wrapped {
        fn label(&self) -> String {
            format!("{}({})", self.tag, self.inner.label())
        }
    }

    struct Staged(Arc<dyn Stage>);

    impl Label for Staged {
        fn label(&self) -> String {
            let url = Url::parse("test://127.0.0.1/acme.Greeter").unwrap();
            self.0.stage(&url).unwrap()
        }
    }

    struct Fixed(&'static str);

    impl Stage for Fixed {
        fn stage(&self, _url: &Url) -> Result<String, ExtensionError> {
            Ok(self.0.to_string())
        }
    }

    fn named(class: &'static str, label: &'static str) -> ExtensionClass<dyn Label> {
        ExtensionClass::named(class, move |_| Ok(Arc::new(Named(label)) as Arc<dyn Label>))
    }

    fn wrapper(class: &'static str, tag: &'static str) -> ExtensionClass<dyn Label> {
        ExtensionClass::wrapper(class, move |inner, _| Ok(Arc::new(Wrapped { tag, inner }) as Arc<dyn Label>))
    }

    const LABELS: &str = "\
plain=acme::Plain
alpha=acme::Alpha
beta=acme::Beta
gamma=acme::Gamma
delta=acme::Delta
";

    /// A registry with the test classes registered and `declared` declared.
    fn registry(declared: &str) -> Arc<ExtensionRegistry> {
        let registry = ExtensionRegistry::new();
        registry.register_class(named("acme::Plain", "plain"));
        registry.register_class(named("acme::Alpha", "alpha").with_activate(Activate::new().group(&["consumer"]).order(2)));
        registry.register_class(named("acme::Beta", "beta").with_activate(Activate::new().group(&["consumer"]).order(1)));
        registry.register_class(named("acme::Gamma", "gamma").with_activate(Activate::new().group(&["provider"])));
        registry.register_class(
            named("acme::Delta", "delta").with_activate(Activate::new().group(&["consumer"]).value(&["delta"])),
        );
        registry.register_class(wrapper("acme::Logging", "logging"));
        registry.register_class(wrapper("acme::Metering", "metering"));
        registry.register_class(ExtensionClass::<dyn Label>::adaptive("acme::AdaptiveOne", |_| {
            Ok(Arc::new(Named("adaptive-one")) as Arc<dyn Label>)
        }));
        registry.register_class(ExtensionClass::<dyn Label>::adaptive("acme::AdaptiveTwo", |_| {
            Ok(Arc::new(Named("adaptive-two")) as Arc<dyn Label>)
        }));
        registry.register_class(ExtensionClass::<dyn Label>::named("acme::Ouroboros", |injector| {
            injector.loader::<dyn Label>().get_extension("ouroboros")
        }));
        registry.register_class(ExtensionClass::<dyn Label>::named("acme::Staged", |injector| {
            Ok(Arc::new(Staged(injector.inject::<dyn Stage>("stage")?)) as Arc<dyn Label>)
        }));
        registry.register_class(ExtensionClass::<dyn Stage>::named("acme::FirstStage", |_| {
            Ok(Arc::new(Fixed("first")) as Arc<dyn Stage>)
        }));
        registry.declare::<dyn Stage>("first=acme::FirstStage");
        registry.declare::<dyn Label>(declared);
        registry
    }

    fn labels(extensions: &[Arc<dyn Label>]) -> Vec<String> {
        extensions.iter().map(|e| e.label()).collect()
    }

    fn activated(loader: &ExtensionLoader<dyn Label>, url: &str, names: &[&str], group: &str) -> Vec<String> {
        let url = Url::parse(url).unwrap();
        labels(&loader.activate_extensions(&url, names, Some(group)).unwrap())
    }

    #[test]
    fn test_get_extension_is_cached() {
        let registry = registry(LABELS);
        let loader = registry.loader::<dyn Label>();
        let first = loader.get_extension("alpha").unwrap();
        let again = registry.loader::<dyn Label>().get_extension("alpha").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(loader.loaded_extensions(), ["alpha"]);
    }

    #[test]
    fn test_true_selects_the_default() {
        let registry = registry(LABELS);
        let loader = registry.loader::<dyn Label>();
        let default = loader.get_extension("true").unwrap();
        assert!(Arc::ptr_eq(&default, &loader.get_extension("plain").unwrap()));
        assert_eq!(loader.default_extension_name().as_deref(), Some("plain"));
    }

    #[test]
    fn test_unknown_and_empty_names() {
        let registry = registry("broken=acme::Missing\nplain=acme::Plain");
        let loader = registry.loader::<dyn Label>();
        assert!(matches!(loader.get_extension(""), Err(ExtensionError::IllegalArgument(_))));
        match loader.get_extension("broken") {
            Err(ExtensionError::NotFound { causes, .. }) => {
                assert_eq!(causes.len(), 1);
                assert!(causes[0].contains("acme::Missing"));
            }
            other => panic!("unexpected {:?}", other.map(|e| e.label())),
        }
        assert!(!loader.has_extension("broken"));
        assert_eq!(loader.supported_extensions().unwrap(), ["plain"]);
    }

    #[test]
    fn test_supported_extensions_are_sorted() {
        let registry = registry(LABELS);
        let names = registry.loader::<dyn Label>().supported_extensions().unwrap();
        assert_eq!(names, ["alpha", "beta", "delta", "gamma", "plain"]);
    }

    #[test]
    fn test_wrappers_compose_in_declaration_order() {
        let registry = registry("plain=acme::Plain\nacme::Logging\nacme::Metering");
        let plain = registry.loader::<dyn Label>().get_extension("plain").unwrap();
        assert_eq!(plain.label(), "metering(logging(plain))");
    }

    #[test]
    fn test_same_name_for_two_classes_fails() {
        let registry = registry("alpha=acme::Alpha\nalpha=acme::Beta");
        let err = registry.loader::<dyn Label>().get_extension("alpha").map(|e| e.label()).unwrap_err();
        assert!(matches!(err, ExtensionError::DuplicateName { ref name, .. } if name == "alpha"));
    }

    #[test]
    fn test_same_class_twice_is_fine() {
        let registry = registry("alpha=acme::Alpha\nalpha=acme::Alpha");
        assert_eq!(registry.loader::<dyn Label>().get_extension("alpha").unwrap().label(), "alpha");
    }

    #[test]
    fn test_declared_adaptive_class_is_used() {
        let registry = registry("acme::AdaptiveOne\nplain=acme::Plain");
        let adaptive = registry.loader::<dyn Label>().adaptive_extension().unwrap();
        assert_eq!(adaptive.label(), "adaptive-one");
    }

    #[test]
    fn test_two_adaptive_classes_fail() {
        let registry = registry("acme::AdaptiveOne\nacme::AdaptiveTwo");
        let err = registry.loader::<dyn Label>().adaptive_extension().map(|e| e.label()).unwrap_err();
        assert!(matches!(err, ExtensionError::DuplicateAdaptive { .. }));
    }

    #[test]
    fn test_no_adaptive_method_is_remembered() {
        let registry = registry(LABELS);
        let loader = registry.loader::<dyn Label>();
        for _ in 0..2 {
            let err = loader.adaptive_extension().map(|e| e.label()).unwrap_err();
            assert!(matches!(err, ExtensionError::NoAdaptiveMethod { .. }));
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let registry = registry("ouroboros=acme::Ouroboros");
        let err = registry.loader::<dyn Label>().get_extension("ouroboros").map(|e| e.label()).unwrap_err();
        assert!(matches!(err, ExtensionError::CyclicDependency { ref name, .. } if name == "ouroboros"));
    }

    #[test]
    fn test_injection_prefers_bound_instances() {
        let registry = registry("staged=acme::Staged");
        registry.bind::<dyn Stage>("stage", Arc::new(Fixed("bound")));
        let staged = registry.loader::<dyn Label>().get_extension("staged").unwrap();
        assert_eq!(staged.label(), "bound");
    }

    #[test]
    fn test_injection_falls_back_to_adaptive() {
        let registry = registry("staged=acme::Staged");
        registry.bind::<dyn Stage>("other", Arc::new(Fixed("bound")));
        let staged = registry.loader::<dyn Label>().get_extension("staged").unwrap();
        // No `stage` parameter on the URL, so the adaptive stage uses the default.
        assert_eq!(staged.label(), "first");
    }

    #[test]
    fn test_add_extension() {
        let registry = registry(LABELS);
        let loader = registry.loader::<dyn Label>();
        assert!(matches!(
            loader.add_extension("plain", "acme::Beta"),
            Err(ExtensionError::IllegalArgument(_))
        ));
        assert!(matches!(
            loader.add_extension("extra", "acme::Unregistered"),
            Err(ExtensionError::IllegalArgument(_))
        ));
        loader.add_extension("extra", "acme::Beta").unwrap();
        assert_eq!(loader.get_extension("extra").unwrap().label(), "beta");
        assert!(loader.supported_extensions().unwrap().contains(&"extra".to_string()));
    }

    #[test]
    fn test_activation_by_group_and_order() {
        let registry = registry(LABELS);
        let loader = registry.loader::<dyn Label>();
        let url = "dubbo://127.0.0.1:20880/acme.Greeter";
        assert_eq!(activated(&loader, url, &[], "consumer"), ["beta", "alpha"]);
        assert_eq!(activated(&loader, url, &[], "provider"), ["gamma"]);
        assert_eq!(
            activated(&loader, "dubbo://127.0.0.1:20880/acme.Greeter?delta=on", &[], "consumer"),
            ["delta", "beta", "alpha"]
        );
    }

    #[test]
    fn test_activation_with_explicit_names() {
        let registry = registry(LABELS);
        let loader = registry.loader::<dyn Label>();
        let url = "dubbo://127.0.0.1:20880/acme.Greeter";
        assert_eq!(activated(&loader, url, &["plain"], "consumer"), ["beta", "alpha", "plain"]);
        assert_eq!(
            activated(&loader, url, &["plain", "default"], "consumer"),
            ["plain", "beta", "alpha"]
        );
        assert_eq!(activated(&loader, url, &["alpha"], "consumer"), ["beta", "alpha"]);
        assert_eq!(activated(&loader, url, &["-alpha"], "consumer"), ["beta"]);
        assert_eq!(activated(&loader, url, &["-default", "plain"], "consumer"), ["plain"]);
    }

    #[test]
    fn test_activation_names_from_url_key() {
        let registry = registry(LABELS);
        let loader = registry.loader::<dyn Label>();
        let url = Url::parse("dubbo://127.0.0.1:20880/acme.Greeter?label=plain,-beta").unwrap();
        let extensions = loader.activate_extensions_for_key(&url, "label", Some("consumer")).unwrap();
        assert_eq!(labels(&extensions), ["alpha", "plain"]);
    }

    #[test]
    fn test_loader_needs_a_live_registry() {
        let loader = registry(LABELS).loader::<dyn Label>();
        let err = loader.get_extension("plain").map(|e| e.label()).unwrap_err();
        assert!(matches!(err, ExtensionError::RegistryClosed { .. }));
    }
}
