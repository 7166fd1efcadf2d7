use std::{
    cell::RefCell,
    fmt::{self, Debug},
    rc::{Rc, Weak},
};

use crate::{
    errors::{Result, TrackError},
    logging::{debug, trace, warn},
    store::{Store, StoreFactory},
    trackable::{AnyTracked, Trackable, TypeTag},
    value::{Record, Value},
};

pub type PropertyHook = Rc<dyn Fn(&mut PropertyEvent)>;

/// Passed to applying/persisting hooks for every property on its way in or out.
#[derive(Debug, Clone)]
pub struct PropertyEvent {
    property: String,
    value: Value,
    cancel: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedProperty {
    name: String,
    default: Option<Value>,
}

/// Per-object record of what to persist, where, and when.
///
/// Cheap to clone; clones are the same configuration. The target is held weakly,
/// so a configuration never keeps its object alive.
#[derive(Clone)]
pub struct Configuration(Rc<RefCell<ConfigurationState>>);

struct ConfigurationState {
    target: Weak<RefCell<dyn Trackable>>,
    target_type: TypeTag,
    key: String,
    properties: Vec<TrackedProperty>,
    auto_persist: bool,
    initialized: bool,
    store_factory: Rc<dyn StoreFactory>,
    store: Option<Rc<dyn Store>>,
    applying: Vec<PropertyHook>,
    persisting: Vec<PropertyHook>,
}

// Implementations

impl PropertyEvent {
    fn new(property: &str, value: Value) -> Self {
        Self {
            property: property.to_string(),
            value,
            cancel: false,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Skip this property; the others are still applied or persisted.
    pub fn cancel(&mut self) {
        self.cancel = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
    }
}

impl TrackedProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applied when the store holds no value for the property.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

impl Configuration {
    pub(crate) fn new(
        target: Weak<RefCell<dyn Trackable>>,
        target_type: TypeTag,
        store_factory: Rc<dyn StoreFactory>,
    ) -> Self {
        Self(Rc::new(RefCell::new(ConfigurationState {
            target,
            target_type,
            key: target_type.short_name().to_string(),
            properties: Vec::new(),
            auto_persist: true,
            initialized: false,
            store_factory,
            store: None,
            applying: Vec::new(),
            persisting: Vec::new(),
        })))
    }

    pub fn key(&self) -> String {
        self.0.borrow().key.clone()
    }

    /// Change the storage location. Takes effect on the next persist or apply.
    pub fn set_key(&self, key: impl Into<String>) -> &Self {
        let key = key.into();
        let mut state = self.0.borrow_mut();

        if state.key != key {
            trace!("Configuration key changed from '{}' to '{key}'", state.key);
            state.key = key;
            state.store = None;
        }

        self
    }

    pub fn auto_persist(&self) -> bool {
        self.0.borrow().auto_persist
    }

    pub fn set_auto_persist(&self, enabled: bool) -> &Self {
        self.0.borrow_mut().auto_persist = enabled;
        self
    }

    /// Persist `property`. Tracking an already tracked property keeps its default.
    pub fn track(&self, property: impl Into<String>) -> &Self {
        let property = property.into();
        let mut state = self.0.borrow_mut();

        if !state.properties.iter().any(|p| p.name == property) {
            state.properties.push(TrackedProperty {
                name: property,
                default: None,
            });
        }

        self
    }

    /// Persist `property`, falling back to `default` while nothing is stored.
    pub fn track_with_default(&self, property: impl Into<String>, default: Value) -> &Self {
        let property = property.into();
        let mut state = self.0.borrow_mut();

        match state.properties.iter_mut().find(|p| p.name == property) {
            Some(tracked) => tracked.default = Some(default),
            None => state.properties.push(TrackedProperty {
                name: property,
                default: Some(default),
            }),
        }

        self
    }

    pub fn untrack(&self, property: &str) -> bool {
        let mut state = self.0.borrow_mut();
        let before = state.properties.len();
        state.properties.retain(|p| p.name != property);
        state.properties.len() != before
    }

    /// Tracked property names in the order they were added.
    pub fn properties(&self) -> Vec<String> {
        self.0
            .borrow()
            .properties
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn tracked_property(&self, property: &str) -> Option<TrackedProperty> {
        self.0
            .borrow()
            .properties
            .iter()
            .find(|p| p.name == property)
            .cloned()
    }

    pub fn is_tracked(&self, property: &str) -> bool {
        self.0.borrow().properties.iter().any(|p| p.name == property)
    }

    /// Hooks see each value before any of them is written to the target.
    pub fn on_applying(&self, hook: impl Fn(&mut PropertyEvent) + 'static) -> &Self {
        self.0.borrow_mut().applying.push(Rc::new(hook));
        self
    }

    pub fn on_persisting(&self, hook: impl Fn(&mut PropertyEvent) + 'static) -> &Self {
        self.0.borrow_mut().persisting.push(Rc::new(hook));
        self
    }

    pub fn target(&self) -> Option<AnyTracked> {
        self.0.borrow().target.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.0.borrow().target.strong_count() > 0
    }

    pub fn target_type(&self) -> TypeTag {
        self.0.borrow().target_type
    }

    pub fn is_initialized(&self) -> bool {
        self.0.borrow().initialized
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Write the current value of every tracked property to the store.
    ///
    /// A dropped target is not an error; there is simply nothing to persist.
    pub fn persist(&self) -> Result<()> {
        let Some(target) = self.target() else {
            trace!("Target of '{}' is dropped, skipping persist", self.key());
            return Ok(());
        };

        let (key, properties, hooks) = {
            let state = self.0.borrow();
            (
                state.key.clone(),
                state.properties.clone(),
                state.persisting.clone(),
            )
        };

        let values = {
            let target = target
                .try_borrow()
                .map_err(|_| TrackError::TargetBusy { key: key.clone() })?;

            let mut values = Vec::with_capacity(properties.len());

            for property in &properties {
                let value = match target.read_property(&property.name) {
                    None => return Err(self.unknown_property(&key, &property.name)),
                    Some(value) => value.map_err(|source| TrackError::Property {
                        key: key.clone(),
                        property: property.name.clone(),
                        source,
                    })?,
                };

                values.push((property.name.clone(), value));
            }

            values
        };

        // Cancelled and untracked properties keep their last persisted value
        let mut record = self.store().load().map_err(|source| TrackError::Store {
            key: key.clone(),
            source,
        })?;
        let mut written = 0;

        for (property, value) in values {
            let mut event = PropertyEvent::new(&property, value);
            hooks.iter().for_each(|hook| hook(&mut event));

            if event.cancel {
                trace!("Persisting '{property}' of '{key}' cancelled");
                continue;
            }

            record.set(property, event.value);
            written += 1;
        }

        self.store()
            .save(&record)
            .map_err(|source| TrackError::Store {
                key: key.clone(),
                source,
            })?;

        debug!("Persisted {written} properties of '{key}'");

        Ok(())
    }

    /// Write stored values, or defaults where nothing is stored, into the target.
    ///
    /// A stored value that no longer decodes is skipped with a warning so the
    /// target keeps its current value; the next persist replaces it.
    pub fn apply(&self) -> Result<()> {
        let Some(target) = self.target() else {
            trace!("Target of '{}' is dropped, skipping apply", self.key());
            return Ok(());
        };

        let (key, properties, hooks) = {
            let state = self.0.borrow();
            (
                state.key.clone(),
                state.properties.clone(),
                state.applying.clone(),
            )
        };

        let record = self.store().load().map_err(|source| TrackError::Store {
            key: key.clone(),
            source,
        })?;

        // Hooks run before the target is borrowed so they may read it
        let mut pending = Vec::with_capacity(properties.len());

        for property in &properties {
            let Some(value) = record.get(&property.name).or(property.default.as_ref()) else {
                continue;
            };

            let mut event = PropertyEvent::new(&property.name, value.clone());
            hooks.iter().for_each(|hook| hook(&mut event));

            if event.cancel {
                trace!("Applying '{}' of '{key}' cancelled", property.name);
                continue;
            }

            pending.push((property.name.as_str(), event.value));
        }

        let mut target = target
            .try_borrow_mut()
            .map_err(|_| TrackError::TargetBusy { key: key.clone() })?;

        let mut applied = 0;

        for (property, value) in &pending {
            match target.write_property(property, value) {
                None => return Err(self.unknown_property(&key, property)),
                Some(Err(_e)) => {
                    warn!("Failed to apply '{property}' of '{key}': {_e}");
                }
                Some(Ok(())) => applied += 1,
            }
        }

        debug!("Applied {applied} properties to '{key}'");

        Ok(())
    }

    /// Called once after the initializer ran. Loads previously persisted state.
    pub fn complete_initialization(&self) -> Result<()> {
        {
            let mut state = self.0.borrow_mut();
            if state.initialized {
                return Ok(());
            }
            state.initialized = true;
        }

        self.apply()
    }

    fn store(&self) -> Rc<dyn Store> {
        let (factory, key) = {
            let state = self.0.borrow();
            if let Some(store) = &state.store {
                return store.clone();
            }
            (state.store_factory.clone(), state.key.clone())
        };

        let store = factory.create_store(&key);
        self.0.borrow_mut().store = Some(store.clone());
        store
    }

    fn unknown_property(&self, key: &str, property: &str) -> TrackError {
        TrackError::UnknownProperty {
            key: key.to_string(),
            property: property.to_string(),
            ty: self.target_type(),
        }
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Configuration {}

impl Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("Configuration")
            .field("key", &state.key)
            .field("target_type", &state.target_type)
            .field("properties", &state.properties)
            .field("auto_persist", &state.auto_persist)
            .field("alive", &(state.target.strong_count() > 0))
            .finish()
    }
}
