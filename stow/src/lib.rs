//! Persist the state of live objects and restore it the next time they are created.
//!
//! A [`Tracker`] hands out one [`Configuration`] per object, built by the most
//! specific [`Initializer`] registered along the object's lineage. Objects are
//! tracked weakly; an auto-persist sweep writes every live one to its
//! [`Store`](store::Store), usually when a [`PersistTrigger`] fires on shutdown.

extern crate self as stow;

mod logging;

pub mod configuration;
pub mod errors;
pub mod initializer;
pub mod store;
pub mod trackable;
pub mod tracker;
pub mod trigger;
pub mod value;

mod registry;

pub use configuration::{Configuration, PropertyEvent, TrackedProperty};
pub use errors::{Result, TrackError};
pub use initializer::{
    DefaultInitializer, Initializer, InitializerRegistry, RegisterInitializerFn, initializer_for,
};
pub use trackable::{AnyTracked, Trackable, Tracked, TrackingAware, TypeTag, upcast_ref};
pub use tracker::Tracker;
pub use trigger::{ManualTrigger, PersistTrigger, Subscription};
pub use value::{Record, Value};

#[cfg(feature = "macros")]
pub use stow_macros::Trackable;

#[doc(hidden)]
pub mod __private {
    pub use anyhow;
    pub use inventory;
}

// Re-exports

pub mod prelude {
    pub use crate::configuration::{Configuration, PropertyEvent};
    pub use crate::errors::TrackError;
    pub use crate::initializer::{Initializer, initializer_for};
    #[cfg(feature = "file-store")]
    pub use crate::store::FileStoreFactory;
    pub use crate::store::{MemoryStoreFactory, StoreFactory};
    pub use crate::trackable::{Trackable, Tracked, TrackingAware};
    pub use crate::tracker::Tracker;
    pub use crate::trigger::{ManualTrigger, PersistTrigger};
    pub use crate::value::Value;

    #[cfg(feature = "macros")]
    pub use stow_macros::Trackable;
}
