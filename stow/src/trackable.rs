use std::{
    any::{Any, TypeId, type_name},
    cell::RefCell,
    fmt::{self, Display},
    hash::{Hash, Hasher},
    rc::Rc,
};

use crate::{configuration::Configuration, value::Value};

/// Shared handle to a tracked object. The tracker only ever keeps a `Weak` of it.
pub type Tracked<T> = Rc<RefCell<T>>;

pub type AnyTracked = Rc<RefCell<dyn Trackable>>;

/// Runtime tag of a trackable type, used to key initializers.
#[derive(Debug, Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

/// An object whose state can be persisted by a [`Tracker`](crate::Tracker).
///
/// Usually derived with `#[derive(Trackable)]`. Rust has no inheritance, so a
/// "derived" type embeds its parent and delegates to it: `lineage` lists the type
/// itself first followed by the parent's lineage, and property access falls through
/// to the parent for names the type does not own.
///
/// The universal root tag is never part of the lineage; resolution appends it.
pub trait Trackable: Any {
    /// Tags from the most specific (the type itself) to the least specific.
    fn lineage(&self) -> Vec<TypeTag>;

    /// View of `self`, or of an embedded ancestor, as the type with the given id.
    fn ancestor(&self, id: TypeId) -> Option<&dyn Any>;

    /// Current value of a property, `None` if the type has no such property.
    fn read_property(&self, property: &str) -> Option<anyhow::Result<Value>>;

    /// Overwrite a property, `None` if the type has no such property.
    fn write_property(&mut self, property: &str, value: &Value) -> Option<anyhow::Result<()>>;

    /// Properties the type marks for persistence, used by the default initializer.
    fn tracked_properties(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Distinguishes instances of the same type in the default key.
    fn tracking_id(&self) -> Option<String> {
        None
    }

    fn tracking_aware(&self) -> Option<&dyn TrackingAware> {
        None
    }
}

/// Objects that finish their own configuration after the type's initializer ran.
pub trait TrackingAware {
    fn configure_tracking(&self, config: &Configuration);
}

/// Typed access to `target` as `T`, where `T` is the target's type or one of its ancestors.
pub fn upcast_ref<T: Any>(target: &dyn Trackable) -> Option<&T> {
    target.ancestor(TypeId::of::<T>())?.downcast_ref::<T>()
}

// Implementations

impl TypeTag {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Tag of the universal base type every lineage implicitly ends with.
    pub fn root() -> Self {
        Self {
            id: TypeId::of::<dyn Any>(),
            name: "dyn Any",
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_root(&self) -> bool {
        self.id == TypeId::of::<dyn Any>()
    }

    /// Last path segment of the type name, generics stripped.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
