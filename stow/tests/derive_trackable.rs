#![cfg(feature = "macros")]

use std::{cell::RefCell, rc::Rc, sync::Once};

use stow::{
    Configuration, Record, Trackable, TrackingAware, TypeTag, Value, initializer_for,
    prelude::*, upcast_ref,
};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Default, Trackable)]
pub struct Window {
    #[track(id)]
    pub name: String,
    #[track]
    pub width: u32,
    #[track]
    pub height: u32,
    pub dirty: bool,
}

#[derive(Debug, Default, Trackable)]
#[trackable(aware)]
pub struct MainWindow {
    #[track(parent)]
    pub window: Window,
    #[track]
    pub maximized: bool,
    #[track(expose)]
    pub recent: Vec<String>,
}

impl TrackingAware for MainWindow {
    fn configure_tracking(&self, config: &Configuration) {
        config.track("recent");
    }
}

#[derive(Debug, Default, Trackable)]
pub struct FloatingWindow {
    #[track(parent)]
    pub window: Window,
    #[track]
    pub opacity: f32,
}

fn window(name: &str) -> Window {
    Window {
        name: name.to_string(),
        width: 800,
        height: 600,
        dirty: false,
    }
}

#[test]
fn test_derived_lineage_is_most_specific_first() {
    let main = MainWindow::default();

    assert_eq!(
        main.lineage(),
        vec![TypeTag::of::<MainWindow>(), TypeTag::of::<Window>()]
    );
    assert_eq!(Window::default().lineage(), vec![TypeTag::of::<Window>()]);
}

#[test]
fn test_upcast_to_parent() {
    let main = MainWindow {
        window: window("main"),
        ..Default::default()
    };

    let as_window = upcast_ref::<Window>(&main).unwrap();

    assert_eq!(as_window.name, "main");
    assert!(upcast_ref::<FloatingWindow>(&main).is_none());
}

#[test]
fn test_derived_property_access_falls_through_to_parent() {
    let mut main = MainWindow::default();

    main.write_property("width", &Value::encode(&1024u32).unwrap())
        .unwrap()
        .unwrap();
    main.write_property("maximized", &Value::encode(&true).unwrap())
        .unwrap()
        .unwrap();

    assert_eq!(main.window.width, 1024);
    assert!(main.maximized);
    assert_eq!(
        main.read_property("width").unwrap().unwrap().decode::<u32>().unwrap(),
        1024
    );
    assert!(main.read_property("dirty").is_none());
}

#[test]
fn test_derived_tracked_properties_and_id() {
    let main = MainWindow {
        window: window("main"),
        ..Default::default()
    };

    assert_eq!(main.tracked_properties(), vec!["width", "height", "maximized"]);
    assert_eq!(main.tracking_id().as_deref(), Some("main"));
    assert!(main.tracking_aware().is_some());
    assert!(main.window.tracking_aware().is_none());
}

#[test]
fn test_tracker_with_derived_types() {
    init_tracing();

    let factory = MemoryStoreFactory::new();
    let tracker = Tracker::new(factory.clone());

    tracker.add_initializer(initializer_for::<Window, _>(|window, config| {
        config
            .set_key(format!("window/{}", window.name))
            .track("width")
            .track_with_default("height", Value::encode(&480u32).unwrap());
    }));

    let floating = Rc::new(RefCell::new(FloatingWindow {
        window: window("palette"),
        opacity: 0.5,
    }));
    let main = Rc::new(RefCell::new(MainWindow {
        window: window("main"),
        ..Default::default()
    }));

    let floating_config = tracker.configure(&floating).unwrap();
    let main_config = tracker.configure(&main).unwrap();

    // Inherited from the Window initializer, no FloatingWindow initializer exists
    assert_eq!(floating_config.key(), "window/palette");
    assert_eq!(floating_config.properties(), vec!["width", "height"]);
    assert_eq!(floating.borrow().window.height, 480);

    // Window initializer plus the object's own TrackingAware hook
    assert_eq!(main_config.properties(), vec!["width", "height", "recent"]);
}

#[test]
fn test_hooks_rewrite_and_cancel() {
    init_tracing();

    let factory = MemoryStoreFactory::new();
    let tracker = Tracker::new(factory.clone());
    let main = Rc::new(RefCell::new(MainWindow {
        window: window("main"),
        maximized: true,
        recent: vec!["a.txt".to_string()],
    }));

    let config = tracker.configure(&main).unwrap();
    config
        .on_persisting(|event| {
            if event.property() == "width" {
                let width = event.value().decode::<u32>().unwrap();
                event.set_value(Value::encode(&(width / 2)).unwrap());
            } else if event.property() == "maximized" {
                event.cancel();
            }
        })
        .set_auto_persist(true);

    tracker.run_auto_persist().unwrap();

    let record: Record = factory.record("MainWindow_main").unwrap();
    assert_eq!(record.get_as::<u32>("width").unwrap().unwrap(), 400);
    assert_eq!(
        record.get_as::<Vec<String>>("recent").unwrap().unwrap(),
        vec!["a.txt".to_string()]
    );
    assert!(!record.contains("maximized"));
}

#[test]
fn test_manual_trigger_sweeps_derived_objects() {
    init_tracing();

    let factory = MemoryStoreFactory::new();
    let tracker = Tracker::new(factory.clone());
    let trigger = ManualTrigger::new();
    tracker.set_auto_persist_trigger(&trigger);

    let windows: Vec<_> = ["one", "two", "three"]
        .into_iter()
        .map(|name| Rc::new(RefCell::new(window(name))))
        .collect();
    for window in &windows {
        tracker.configure(window).unwrap();
    }
    tracker
        .configuration(&windows[2])
        .unwrap()
        .set_auto_persist(false);

    assert_eq!(trigger.fire(), 1);

    assert_eq!(factory.save_count(), 2);
    assert_eq!(factory.keys(), vec!["Window_one", "Window_two"]);
}
