use std::{
    cell::{Cell, RefCell},
    fmt::{self, Debug},
    future::Future,
    rc::Rc,
};

use crate::logging::debug;

pub type Listener = Rc<dyn Fn()>;

/// Source of "persist now" signals, e.g. application shutdown.
pub trait PersistTrigger {
    /// Call `listener` on every signal until the returned subscription is dropped.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

/// Live attachment to a trigger; unsubscribes on drop.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

/// Trigger fired explicitly, on drop of a guard, or after a future resolves.
#[derive(Clone, Default)]
pub struct ManualTrigger(Rc<Listeners>);

/// Fires its trigger when dropped, typically held for the lifetime of `main`.
#[must_use = "the trigger fires as soon as the guard is dropped"]
pub struct FireOnDrop(Option<ManualTrigger>);

#[derive(Default)]
struct Listeners {
    next_id: Cell<u64>,
    slots: RefCell<Vec<(u64, Listener)>>,
}

// Implementations

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Subscription with nothing to undo, for triggers that never fire twice.
    pub fn detached() -> Self {
        Self { unsubscribe: None }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.unsubscribe.is_some())
            .finish()
    }
}

impl ManualTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every current listener. Returns how many were called.
    pub fn fire(&self) -> usize {
        // Listeners may unsubscribe or subscribe while being called
        let listeners: Vec<Listener> = self
            .0
            .slots
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!("Persist trigger fired for {} listener(s)", listeners.len());

        for listener in &listeners {
            listener();
        }

        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.0.slots.borrow().len()
    }

    pub fn fire_on_drop(&self) -> FireOnDrop {
        FireOnDrop(Some(self.clone()))
    }

    /// Wait for `signal`, then fire. Runs on the caller's (current-thread) executor.
    pub async fn fire_after<F: Future>(&self, signal: F) -> F::Output {
        let output = signal.await;
        self.fire();
        output
    }

    /// Fire once the process receives Ctrl-C.
    pub async fn fire_on_ctrl_c(&self) -> std::io::Result<()> {
        tokio::signal::ctrl_c().await?;
        self.fire();
        Ok(())
    }
}

impl PersistTrigger for ManualTrigger {
    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        self.0.slots.borrow_mut().push((id, listener));

        let listeners = Rc::downgrade(&self.0);

        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.slots.borrow_mut().retain(|(slot, _)| *slot != id);
            }
        })
    }
}

impl Debug for ManualTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTrigger")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl FireOnDrop {
    /// Drop without firing.
    pub fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        if let Some(trigger) = self.0.take() {
            trigger.fire();
        }
    }
}

impl Debug for FireOnDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FireOnDrop").field(&self.0.is_some()).finish()
    }
}
