use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A key-value store of named text slots, shaped after the browser's
/// `localStorage`. Implementations are cheap to clone and share one backing
/// store between clones.
pub trait SlotStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// In-process slots. An optional byte quota makes writes fail the way a full
/// browser store does.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Rc<RefCell<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            slots: Rc::default(),
            quota: Some(quota),
        }
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl SlotStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.slots.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if let Some(quota) = self.quota {
            let needed = self.used_bytes_without(key) + key.len() + value.len();
            if needed > quota {
                return Err(anyhow!(
                    "quota exceeded writing slot '{key}': {needed} bytes > {quota}"
                ));
            }
        }
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.slots.borrow_mut().remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per slot under a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened slot storage");

        Ok(Self { data_dir })
    }

    pub fn slot_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && !key.contains("..")
            && !key.contains(['/', '\\'])
            && !key.contains('\0');
        if !valid {
            return Err(anyhow!("invalid slot key: {key:?}"));
        }
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl SlotStorage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.slot_path(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(file = %path.display(), bytes = text.len(), "read slot");
                Ok(Some(text))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.slot_path(key)?;
        debug!(file = %path.display(), bytes = value.len(), "writing slot atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;

        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        let path = self.slot_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }
}

/// `window.localStorage` for browser builds.
#[cfg(feature = "browser")]
#[derive(Debug, Clone)]
pub struct BrowserStorage {
    storage: web_sys::Storage,
}

#[cfg(feature = "browser")]
impl BrowserStorage {
    pub fn local() -> anyhow::Result<Self> {
        let window = web_sys::window().ok_or_else(|| anyhow!("no window available"))?;
        let storage = window
            .local_storage()
            .map_err(|err| anyhow!("localStorage unavailable: {err:?}"))?
            .ok_or_else(|| anyhow!("localStorage disabled"))?;
        Ok(Self { storage })
    }
}

#[cfg(feature = "browser")]
impl SlotStorage for BrowserStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.storage
            .get_item(key)
            .map_err(|err| anyhow!("localStorage read of '{key}' failed: {err:?}"))
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.storage
            .set_item(key, value)
            .map_err(|err| anyhow!("localStorage write of '{key}' failed: {err:?}"))
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.storage
            .remove_item(key)
            .map_err(|err| anyhow!("localStorage remove of '{key}' failed: {err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{FileStorage, MemoryStorage, SlotStorage};

    #[test]
    fn memory_clones_share_slots() {
        let a = MemoryStorage::new();
        let b = a.clone();
        a.set_item("tasks", "[]").expect("set");
        assert_eq!(b.get_item("tasks").expect("get").as_deref(), Some("[]"));
        b.remove_item("tasks").expect("remove");
        assert_eq!(a.get_item("tasks").expect("get"), None);
    }

    #[test]
    fn memory_quota_rejects_oversized_writes() {
        let storage = MemoryStorage::with_quota(16);
        storage.set_item("theme", "{}").expect("small write fits");
        assert!(storage.set_item("tasks", &"x".repeat(64)).is_err());
        assert_eq!(storage.get_item("tasks").expect("get"), None);
        // Rewriting a slot only counts its new size.
        storage.set_item("theme", "{\"a\":1}").expect("rewrite fits");
    }

    #[test]
    fn file_slots_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let storage = FileStorage::open(temp.path()).expect("open");

        assert_eq!(storage.get_item("tasks").expect("get missing"), None);
        storage.set_item("tasks", "[1,2]").expect("set");
        assert_eq!(
            storage.get_item("tasks").expect("get").as_deref(),
            Some("[1,2]")
        );
        assert!(temp.path().join("tasks.json").exists());

        storage.remove_item("tasks").expect("remove");
        storage.remove_item("tasks").expect("remove twice");
        assert_eq!(storage.get_item("tasks").expect("get removed"), None);
    }

    #[test]
    fn file_slots_reject_path_like_keys() {
        let temp = tempdir().expect("tempdir");
        let storage = FileStorage::open(temp.path()).expect("open");
        for key in ["", "../escape", "a/b", "a\\b", "."] {
            assert!(storage.set_item(key, "x").is_err(), "key {key:?} accepted");
        }
    }
}
