use std::rc::Rc;

use crate::value::Record;

#[cfg(feature = "file-store")]
pub mod file;
pub mod memory;

#[cfg(feature = "file-store")]
pub use file::FileStoreFactory;
pub use memory::MemoryStoreFactory;

/// Durable backend of a single key.
pub trait Store {
    /// Last persisted record, empty if nothing was persisted under this key yet.
    fn load(&self) -> anyhow::Result<Record>;

    /// Replace the persisted record.
    fn save(&self, record: &Record) -> anyhow::Result<()>;
}

pub trait StoreFactory {
    fn create_store(&self, key: &str) -> Rc<dyn Store>;
}
