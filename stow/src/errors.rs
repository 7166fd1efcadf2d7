use thiserror::Error;

use crate::trackable::TypeTag;

pub type Result<T> = std::result::Result<T, TrackError>;

#[derive(Debug, Error)]
pub enum TrackError {
    /// Invalid argument passed to configure.
    #[error("Invalid tracking target: {0}")]
    InvalidTarget(&'static str),

    /// Not even the root default initializer is registered. A setup bug.
    #[error("No initializer resolvable for {0}")]
    UnresolvedInitializer(TypeTag),

    #[error("Target of '{key}' is already borrowed")]
    TargetBusy { key: String },

    #[error("'{key}' tracks property '{property}' which {ty} does not expose")]
    UnknownProperty {
        key: String,
        property: String,
        ty: TypeTag,
    },

    #[error("Failed to convert property '{property}' of '{key}': {source}")]
    Property {
        key: String,
        property: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Store failure for '{key}': {source}")]
    Store {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Every failure of one auto-persist sweep. The sweep itself ran to the end.
    #[error("{} configuration(s) failed to persist, {persisted} persisted", .failures.len())]
    Sweep {
        persisted: usize,
        failures: Vec<TrackError>,
    },
}

impl TrackError {
    /// Key of the configuration the error belongs to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            TrackError::TargetBusy { key }
            | TrackError::UnknownProperty { key, .. }
            | TrackError::Property { key, .. }
            | TrackError::Store { key, .. } => Some(key),
            TrackError::InvalidTarget(_)
            | TrackError::UnresolvedInitializer(_)
            | TrackError::Sweep { .. } => None,
        }
    }
}
