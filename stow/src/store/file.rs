use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::anyhow;
use directories::ProjectDirs;

use crate::{
    store::{Store, StoreFactory},
    value::Record,
};

/// One postcard encoded file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileStoreFactory {
    dir: PathBuf,
}

struct FileStore {
    path: PathBuf,
}

// Implementations

impl FileStoreFactory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Use the platform data directory of the application, e.g.
    /// `~/.local/share/<application>` on Linux.
    pub fn for_project(qualifier: &str, organization: &str, application: &str) -> anyhow::Result<Self> {
        let dirs = ProjectDirs::from(qualifier, organization, application)
            .ok_or_else(|| anyhow!("No home directory to derive a data directory from"))?;

        Ok(Self::new(dirs.data_dir()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", file_stem(key)))
    }
}

impl StoreFactory for FileStoreFactory {
    fn create_store(&self, key: &str) -> Rc<dyn Store> {
        Rc::new(FileStore {
            path: self.path(key),
        })
    }
}

impl Store for FileStore {
    fn load(&self) -> anyhow::Result<Record> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Record::default()),
            Err(e) => return Err(e.into()),
        };

        Ok(postcard::from_bytes(&bytes)?)
    }

    fn save(&self, record: &Record) -> anyhow::Result<()> {
        let data = postcard::to_stdvec(record)?;

        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            } else if !dir.is_dir() {
                anyhow::bail!("store location exists but is not a directory: {dir:?}");
            }
        }

        std::fs::write(&self.path, data)?;

        Ok(())
    }
}

// Keys are free-form; keep them to one path component. Every other byte is
// written as `%XX`, so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());

    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => stem.push(byte as char),
            _ => stem.push_str(&format!("%{byte:02X}")),
        }
    }

    stem
}
