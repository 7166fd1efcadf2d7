#![cfg(all(feature = "macros", feature = "file-store"))]

use std::{cell::RefCell, rc::Rc};

use stow::{prelude::*, store::FileStoreFactory};
use tempfile::TempDir;

#[derive(Debug, Default, Trackable)]
pub struct Session {
    #[track(id)]
    pub user: String,
    #[track]
    pub open_files: Vec<String>,
    #[track]
    pub zoom: f32,
}

fn session(user: &str) -> Rc<RefCell<Session>> {
    Rc::new(RefCell::new(Session {
        user: user.to_string(),
        ..Default::default()
    }))
}

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let tracker = Tracker::new(FileStoreFactory::new(dir.path()));
        let shutdown = ManualTrigger::new();
        tracker.set_auto_persist_trigger(&shutdown);

        let alice = session("alice");
        tracker.configure(&alice).unwrap();
        {
            let mut alice = alice.borrow_mut();
            alice.open_files = vec!["notes.md".to_string(), "todo.md".to_string()];
            alice.zoom = 1.25;
        }

        let _guard = shutdown.fire_on_drop();
    }

    assert!(dir.path().join("Session_alice.bin").exists());

    let tracker = Tracker::new(FileStoreFactory::new(dir.path()));
    let alice = session("alice");
    let bob = session("bob");
    tracker.configure(&alice).unwrap();
    tracker.configure(&bob).unwrap();

    assert_eq!(alice.borrow().open_files, vec!["notes.md", "todo.md"]);
    assert_eq!(alice.borrow().zoom, 1.25);
    assert!(bob.borrow().open_files.is_empty());
}

#[test]
fn test_dropped_session_is_not_written() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(FileStoreFactory::new(dir.path()));

    let alice = session("alice");
    tracker.configure(&alice).unwrap();
    drop(alice);

    assert_eq!(tracker.run_auto_persist().unwrap(), 0);
    assert!(!dir.path().join("Session_alice.bin").exists());
}

#[test]
fn test_identifier_selects_file() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(FileStoreFactory::new(dir.path()));

    let shared = session("alice");
    tracker.configure_as(&shared, "shared/session").unwrap();
    assert!(tracker.persist(&shared).unwrap());

    assert!(dir.path().join("shared%2Fsession.bin").exists());
}

#[test]
fn test_similar_keys_do_not_share_a_file() {
    let dir = TempDir::new().unwrap();

    {
        let tracker = Tracker::new(FileStoreFactory::new(dir.path()));
        let nested = session("a");
        let flat = session("a");
        tracker.configure_as(&nested, "docs/a").unwrap();
        tracker.configure_as(&flat, "docs_a").unwrap();
        nested.borrow_mut().zoom = 1.0;
        flat.borrow_mut().zoom = 2.0;

        assert_eq!(tracker.run_auto_persist().unwrap(), 2);
    }

    let tracker = Tracker::new(FileStoreFactory::new(dir.path()));
    let nested = session("a");
    tracker.configure_as(&nested, "docs/a").unwrap();

    assert_eq!(nested.borrow().zoom, 1.0);
}
