use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use rustc_hash::FxHashMap;

use crate::{
    store::{Store, StoreFactory},
    value::Record,
};

type Records = Rc<RefCell<FxHashMap<String, Record>>>;

/// Keeps every record in memory. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreFactory {
    records: Records,
    saves: Rc<Cell<usize>>,
}

struct MemoryStore {
    key: String,
    records: Records,
    saves: Rc<Cell<usize>>,
}

// Implementations

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str) -> Option<Record> {
        self.records.borrow().get(key).cloned()
    }

    /// Seed a record as if it had been persisted earlier.
    pub fn insert(&self, key: impl Into<String>, record: Record) -> Option<Record> {
        self.records.borrow_mut().insert(key.into(), record)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.records.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of saves across all stores created by this factory.
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

impl StoreFactory for MemoryStoreFactory {
    fn create_store(&self, key: &str) -> Rc<dyn Store> {
        Rc::new(MemoryStore {
            key: key.to_string(),
            records: self.records.clone(),
            saves: self.saves.clone(),
        })
    }
}

impl Store for MemoryStore {
    fn load(&self) -> anyhow::Result<Record> {
        Ok(self
            .records
            .borrow()
            .get(&self.key)
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, record: &Record) -> anyhow::Result<()> {
        self.records
            .borrow_mut()
            .insert(self.key.clone(), record.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_stores_of_one_factory_share_records() {
        let factory = MemoryStoreFactory::new();
        let writer = factory.create_store("MainWindow");
        let reader = factory.create_store("MainWindow");

        assert!(reader.load().unwrap().is_empty());

        let mut record = Record::new();
        record.set("left", Value::encode(&12i32).unwrap());
        writer.save(&record).unwrap();

        assert_eq!(reader.load().unwrap(), record);
        assert_eq!(factory.record("MainWindow"), Some(record));
        assert_eq!(factory.save_count(), 1);
    }

    #[test]
    fn test_keys_are_isolated() {
        let factory = MemoryStoreFactory::new();
        let mut record = Record::new();
        record.set("zoom", Value::encode(&2u8).unwrap());

        factory.insert("Editor_1", record);

        assert!(factory.create_store("Editor_2").load().unwrap().is_empty());
        assert_eq!(factory.keys(), vec!["Editor_1".to_string()]);
        assert_eq!(factory.save_count(), 0);
    }
}
