use std::{any::Any, marker::PhantomData, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    configuration::Configuration,
    logging::warn,
    trackable::{Trackable, TypeTag, upcast_ref},
};

/// Populates a fresh configuration for objects of one type and, by fallback,
/// its descendants.
pub trait Initializer {
    /// Exact type this initializer is registered under.
    fn for_type(&self) -> TypeTag;

    /// Set the properties to persist and a default key derived from `target`.
    fn initialize(&self, target: &dyn Trackable, config: &Configuration);
}

/// Root initializer: keys by type name plus tracking id, tracks the declared properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInitializer;

/// Initializer from a closure over the typed target.
pub struct TypedInitializer<T, F> {
    init_fn: F,
    _phantom: PhantomData<fn(&T)>,
}

/// Registers initializers with every tracker created afterwards.
///
/// ```ignore
/// fn register(registry: &mut InitializerRegistry) {
///     registry.insert(Rc::new(initializer_for::<Editor, _>(|editor, config| {
///         config.set_key(format!("Editor_{}", editor.path));
///     })));
/// }
///
/// inventory::submit! { RegisterInitializerFn(register) }
/// ```
pub struct RegisterInitializerFn(pub fn(&mut InitializerRegistry));

inventory::collect!(RegisterInitializerFn);

/// Initializers by exact type, resolved along a lineage.
#[derive(Clone)]
pub struct InitializerRegistry(FxHashMap<TypeTag, Rc<dyn Initializer>>);

pub fn initializer_for<T, F>(init_fn: F) -> TypedInitializer<T, F>
where
    T: Any,
    F: Fn(&T, &Configuration),
{
    TypedInitializer {
        init_fn,
        _phantom: PhantomData,
    }
}

// Implementations

impl Initializer for DefaultInitializer {
    fn for_type(&self) -> TypeTag {
        TypeTag::root()
    }

    fn initialize(&self, target: &dyn Trackable, config: &Configuration) {
        let name = config.target_type().short_name();

        match target.tracking_id() {
            Some(id) => config.set_key(format!("{name}_{id}")),
            None => config.set_key(name),
        };

        for property in target.tracked_properties() {
            config.track(property);
        }
    }
}

impl<T, F> Initializer for TypedInitializer<T, F>
where
    T: Any,
    F: Fn(&T, &Configuration),
{
    fn for_type(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn initialize(&self, target: &dyn Trackable, config: &Configuration) {
        match upcast_ref::<T>(target) {
            Some(target) => (self.init_fn)(target, config),
            None => warn!(
                "Initializer for {} applied to unrelated {}",
                self.for_type(),
                config.target_type()
            ),
        }
    }
}

impl InitializerRegistry {
    /// Registry with the root default and every submitted initializer.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.insert(Rc::new(DefaultInitializer));

        for register_fn in inventory::iter::<RegisterInitializerFn> {
            (register_fn.0)(&mut registry);
        }

        registry
    }

    /// Registry without even the root default. Resolution may fail.
    pub fn empty() -> Self {
        Self(FxHashMap::default())
    }

    /// Register under `initializer.for_type()`, replacing any previous one.
    pub fn insert(&mut self, initializer: Rc<dyn Initializer>) -> Option<Rc<dyn Initializer>> {
        self.0.insert(initializer.for_type(), initializer)
    }

    pub fn get(&self, tag: &TypeTag) -> Option<&Rc<dyn Initializer>> {
        self.0.get(tag)
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.0.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Most specific registered initializer along `lineage`, then the root's.
    pub fn resolve(&self, lineage: &[TypeTag]) -> Option<Rc<dyn Initializer>> {
        let root = TypeTag::root();

        lineage
            .iter()
            .chain(std::iter::once(&root))
            .find_map(|tag| self.0.get(tag))
            .cloned()
    }
}

impl Default for InitializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
