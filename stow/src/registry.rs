use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use rustc_hash::FxHashMap;

use crate::{configuration::Configuration, trackable::Trackable};

const MIN_PRUNE_AT: usize = 16;

/// Identity of a shared object: the address of its allocation.
///
/// Stable for as long as any `Rc` or `Weak` to it exists, so a registered `Weak`
/// keeps the identity from being reused by another object.
pub(crate) type Identity = usize;

/// Tracked objects in registration order, indexed by identity.
///
/// Holds targets weakly. Slots of dropped targets stay until the next prune,
/// which runs whenever the slot count has doubled since the last one.
pub(crate) struct Registry {
    entries: Vec<TrackedEntry>,
    index: FxHashMap<Identity, usize>,
    prune_at: usize,
}

struct TrackedEntry {
    target: Weak<RefCell<dyn Trackable>>,
    config: Configuration,
}

pub(crate) fn identity<T: ?Sized>(target: &Rc<T>) -> Identity {
    Rc::as_ptr(target) as *const () as Identity
}

// Implementations

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
            prune_at: MIN_PRUNE_AT,
        }
    }

    /// Configuration of a live target.
    pub(crate) fn get(&self, identity: Identity) -> Option<&Configuration> {
        let entry = &self.entries[*self.index.get(&identity)?];

        (entry.target.strong_count() > 0).then_some(&entry.config)
    }

    /// Register `config` for the target, replacing an entry with the same identity.
    pub(crate) fn insert(
        &mut self,
        identity: Identity,
        target: Weak<RefCell<dyn Trackable>>,
        config: Configuration,
    ) -> Option<Configuration> {
        let entry = TrackedEntry { target, config };

        if let Some(&slot) = self.index.get(&identity) {
            return Some(std::mem::replace(&mut self.entries[slot], entry).config);
        }

        if self.entries.len() >= self.prune_at {
            self.prune();
            self.prune_at = (self.entries.len() * 2).max(MIN_PRUNE_AT);
        }

        self.index.insert(identity, self.entries.len());
        self.entries.push(entry);

        None
    }

    /// Drop slots of targets that no longer exist. Returns how many were dropped.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.target.strong_count() > 0);

        if self.entries.len() != before {
            // Identities are recomputed from the still-live targets
            self.index = self
                .entries
                .iter()
                .enumerate()
                .filter_map(|(slot, entry)| entry.target.upgrade().map(|t| (identity(&t), slot)))
                .collect();
        }

        before - self.entries.len()
    }

    /// Configurations of live targets in registration order.
    pub(crate) fn live(&self) -> Vec<Configuration> {
        self.entries
            .iter()
            .filter(|entry| entry.target.strong_count() > 0)
            .map(|entry| entry.config.clone())
            .collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.target.strong_count() > 0)
            .count()
    }

    /// Slots including those of dropped targets.
    pub(crate) fn slot_count(&self) -> usize {
        self.entries.len()
    }
}
