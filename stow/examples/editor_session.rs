use std::{cell::RefCell, rc::Rc};

use stow::{initializer_for, prelude::*, store::FileStoreFactory};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Debug, Default, Trackable)]
pub struct Editor {
    #[track(id)]
    pub path: String,
    #[track]
    pub cursor: (u32, u32),
    #[track]
    pub zoom: f32,
}

#[derive(Debug, Default, Trackable)]
#[trackable(aware)]
pub struct Workspace {
    #[track]
    pub open: Vec<String>,
    #[track]
    pub theme: String,
    #[track(expose)]
    pub launches: u32,
}

impl TrackingAware for Workspace {
    fn configure_tracking(&self, config: &Configuration) {
        config.track("launches").on_applying(|event| {
            if event.property() == "theme" && event.value().decode::<String>().is_err() {
                event.cancel();
            }
        });
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,stow=trace")
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f %Z".into()))
        .init();

    let factory = FileStoreFactory::for_project("org", "Stow", "EditorSession")?;
    info!("Persisting under {}", factory.dir().display());

    let default_zoom = Value::encode(&1.0f32)?;

    let tracker = Tracker::new(factory);
    tracker.add_initializer(initializer_for::<Editor, _>(move |editor, config| {
        config
            .set_key(format!("editor/{}", editor.path))
            .track("cursor")
            .track_with_default("zoom", default_zoom.clone());
    }));

    let shutdown = ManualTrigger::new();
    tracker.set_auto_persist_trigger(&shutdown);

    let workspace = Rc::new(RefCell::new(Workspace::default()));
    tracker.configure(&workspace)?;
    workspace.borrow_mut().launches += 1;
    info!("Workspace restored: {:?}", workspace.borrow());

    let editors: Vec<_> = workspace
        .borrow()
        .open
        .iter()
        .map(|path| {
            Rc::new(RefCell::new(Editor {
                path: path.clone(),
                ..Default::default()
            }))
        })
        .collect();

    for editor in &editors {
        tracker.configure(editor)?;
        info!("Editor restored: {:?}", editor.borrow());
    }

    if editors.is_empty() {
        workspace.borrow_mut().open = vec!["README.md".into(), "src/main.rs".into()];
    }
    for editor in &editors {
        let mut editor = editor.borrow_mut();
        editor.cursor.0 += 1;
    }

    info!("Press Ctrl-C to persist and exit");
    shutdown.fire_on_ctrl_c().await?;

    info!(
        "Persisted {} tracked objects, {} launches so far",
        tracker.tracked_count(),
        workspace.borrow().launches
    );

    Ok(())
}
