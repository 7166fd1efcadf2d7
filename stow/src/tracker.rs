use std::{
    cell::RefCell,
    fmt::{self, Debug},
    rc::{Rc, Weak},
};

use rustc_hash::FxHashSet;

use crate::{
    configuration::Configuration,
    errors::{Result, TrackError},
    initializer::{Initializer, InitializerRegistry},
    logging::{debug, error, trace, warn},
    registry::{Identity, Registry, identity},
    store::StoreFactory,
    trackable::{AnyTracked, Trackable, Tracked, TypeTag},
    trigger::{PersistTrigger, Subscription},
};

/// Hub tying live objects to their configurations.
///
/// Cheap to clone; clones share the same registry. Objects are tracked weakly, so
/// configuring an object never extends its lifetime.
///
/// ```ignore
/// let tracker = Tracker::new(FileStoreFactory::for_project("org", "Acme", "Editor")?);
/// let shutdown = ManualTrigger::new();
/// tracker.set_auto_persist_trigger(&shutdown);
///
/// let window = Rc::new(RefCell::new(MainWindow::default()));
/// tracker.configure(&window)?; // restores the last persisted state
///
/// let _guard = shutdown.fire_on_drop(); // persists everything still alive on exit
/// ```
#[derive(Clone)]
pub struct Tracker(Rc<TrackerState>);

struct TrackerState {
    store_factory: Rc<dyn StoreFactory>,
    initializers: RefCell<InitializerRegistry>,
    registry: RefCell<Registry>,
    configuring: RefCell<FxHashSet<Identity>>,
    subscription: RefCell<Option<Subscription>>,
}

// Implementations

impl Tracker {
    pub fn new(store_factory: impl StoreFactory + 'static) -> Self {
        Self::with_store_factory(Rc::new(store_factory))
    }

    pub fn with_store_factory(store_factory: Rc<dyn StoreFactory>) -> Self {
        Self::with_initializers(store_factory, InitializerRegistry::new())
    }

    /// Tracker resolving through `initializers` as given. Without a root entry,
    /// configuring a type with no registered ancestor fails.
    pub fn with_initializers(
        store_factory: Rc<dyn StoreFactory>,
        initializers: InitializerRegistry,
    ) -> Self {
        Self(Rc::new(TrackerState {
            store_factory,
            initializers: RefCell::new(initializers),
            registry: RefCell::new(Registry::new()),
            configuring: RefCell::new(FxHashSet::default()),
            subscription: RefCell::new(None),
        }))
    }

    pub fn store_factory(&self) -> Rc<dyn StoreFactory> {
        self.0.store_factory.clone()
    }

    /// Register `initializer` for its exact type, replacing any earlier one.
    /// Objects configured already are not affected.
    pub fn add_initializer(&self, initializer: impl Initializer + 'static) -> &Self {
        let tag = initializer.for_type();

        if self
            .0
            .initializers
            .borrow_mut()
            .insert(Rc::new(initializer))
            .is_some()
        {
            debug!("Initializer for {tag} replaced");
        } else {
            trace!("Initializer for {tag} added");
        }

        self
    }

    pub fn has_initializer(&self, tag: &TypeTag) -> bool {
        self.0.initializers.borrow().contains(tag)
    }

    /// Configuration of `target`, created and applied on the first call.
    pub fn configure<T: Trackable>(&self, target: &Tracked<T>) -> Result<Configuration> {
        let target: AnyTracked = target.clone();
        self.configure_any(&target, None)
    }

    /// As [`configure`](Self::configure), with `identifier` overriding the
    /// initializer's key. Ignored if the target is configured already.
    pub fn configure_as<T: Trackable>(
        &self,
        target: &Tracked<T>,
        identifier: impl Into<String>,
    ) -> Result<Configuration> {
        let target: AnyTracked = target.clone();
        self.configure_any(&target, Some(identifier.into()))
    }

    pub fn configure_weak<T: Trackable>(&self, target: &Weak<RefCell<T>>) -> Result<Configuration> {
        let target = target
            .upgrade()
            .ok_or(TrackError::InvalidTarget("target has already been dropped"))?;

        self.configure(&target)
    }

    pub fn configure_any(
        &self,
        target: &AnyTracked,
        identifier: Option<String>,
    ) -> Result<Configuration> {
        if identifier.as_deref() == Some("") {
            return Err(TrackError::InvalidTarget("identifier must not be empty"));
        }

        let identity = identity(target);

        if let Some(config) = self.0.registry.borrow().get(identity) {
            trace!("{} is tracked already under '{}'", config.target_type(), config.key());
            return Ok(config.clone());
        }

        // Initializers and hooks may configure other objects, never the one in progress
        if !self.0.configuring.borrow_mut().insert(identity) {
            return Err(TrackError::InvalidTarget("target is already being configured"));
        }

        let result = self.configure_new(target, identity, identifier);
        self.0.configuring.borrow_mut().remove(&identity);

        result
    }

    fn configure_new(
        &self,
        target: &AnyTracked,
        identity: Identity,
        identifier: Option<String>,
    ) -> Result<Configuration> {
        let config = {
            let target_ref = target
                .try_borrow()
                .map_err(|_| TrackError::InvalidTarget("target is mutably borrowed"))?;

            let lineage = target_ref.lineage();
            let target_type = lineage.first().copied().unwrap_or_else(TypeTag::root);

            let resolved = self.0.initializers.borrow().resolve(&lineage);
            let Some(initializer) = resolved else {
                error!("No initializer for {target_type}, not even the root default");
                return Err(TrackError::UnresolvedInitializer(target_type));
            };

            trace!("Initializing {target_type} with initializer for {}", initializer.for_type());

            let config = Configuration::new(
                Rc::downgrade(target),
                target_type,
                self.0.store_factory.clone(),
            );

            initializer.initialize(&*target_ref, &config);

            if let Some(aware) = target_ref.tracking_aware() {
                aware.configure_tracking(&config);
            }

            config
        };

        if let Some(identifier) = identifier {
            config.set_key(identifier);
        }

        config.complete_initialization()?;

        self.0
            .registry
            .borrow_mut()
            .insert(identity, Rc::downgrade(target), config.clone());

        debug!("Tracking {} under '{}'", config.target_type(), config.key());

        Ok(config)
    }

    /// Existing configuration of `target`, without creating one.
    pub fn configuration<T: Trackable>(&self, target: &Tracked<T>) -> Option<Configuration> {
        self.0.registry.borrow().get(identity(target)).cloned()
    }

    /// Persist one tracked object. `false` if it is not tracked.
    pub fn persist<T: Trackable>(&self, target: &Tracked<T>) -> Result<bool> {
        let Some(config) = self.configuration(target) else {
            return Ok(false);
        };

        config.persist()?;
        Ok(true)
    }

    /// Re-apply persisted state to one tracked object. `false` if it is not tracked.
    pub fn apply<T: Trackable>(&self, target: &Tracked<T>) -> Result<bool> {
        let Some(config) = self.configuration(target) else {
            return Ok(false);
        };

        config.apply()?;
        Ok(true)
    }

    /// Persist every live tracked object with auto-persist enabled.
    ///
    /// Dropped objects are skipped. A failing object does not stop the sweep; all
    /// failures are returned together once every object was attempted.
    pub fn run_auto_persist(&self) -> Result<usize> {
        let configs = self.0.registry.borrow().live();

        let mut persisted = 0;
        let mut failures = Vec::new();

        for config in configs.iter().filter(|config| config.auto_persist()) {
            match config.persist() {
                Ok(()) => persisted += 1,
                Err(e) => {
                    warn!("Auto-persist of '{}' failed: {e}", config.key());
                    failures.push(e);
                }
            }
        }

        debug!(
            "Auto-persist sweep persisted {persisted} of {} tracked objects",
            configs.len()
        );

        if failures.is_empty() {
            Ok(persisted)
        } else {
            Err(TrackError::Sweep {
                persisted,
                failures,
            })
        }
    }

    /// Run [`run_auto_persist`](Self::run_auto_persist) on every signal of
    /// `trigger`. Replaces the previous trigger, if any.
    pub fn set_auto_persist_trigger(&self, trigger: &dyn PersistTrigger) {
        // Detach first so no signal is ever handled by two subscriptions
        let previous = self.0.subscription.borrow_mut().take();
        drop(previous);

        let tracker = Rc::downgrade(&self.0);

        let subscription = trigger.subscribe(Rc::new(move || {
            let Some(state) = tracker.upgrade() else {
                return;
            };

            if let Err(_e) = Tracker(state).run_auto_persist() {
                error!("Auto-persist sweep failed: {_e}");
            }
        }));

        *self.0.subscription.borrow_mut() = Some(subscription);
    }

    /// Detach from the current trigger. `false` if there was none.
    pub fn clear_auto_persist_trigger(&self) -> bool {
        let previous = self.0.subscription.borrow_mut().take();
        previous.is_some()
    }

    pub fn has_auto_persist_trigger(&self) -> bool {
        self.0.subscription.borrow().is_some()
    }

    /// Number of tracked objects still alive.
    pub fn tracked_count(&self) -> usize {
        self.0.registry.borrow().live_count()
    }

    /// Reclaim bookkeeping of dropped objects. Returns how many slots were freed.
    pub fn prune(&self) -> usize {
        self.0.registry.borrow_mut().prune()
    }
}

impl Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.0.registry.borrow();
        f.debug_struct("Tracker")
            .field("tracked", &registry.live_count())
            .field("slots", &registry.slot_count())
            .field("initializers", &self.0.initializers.borrow().len())
            .field("trigger", &self.0.subscription.borrow().is_some())
            .finish()
    }
}
