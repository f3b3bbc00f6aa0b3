//! Storage cell shared by every repository table.
//!
//! A [`Persisted`] value lives behind a `RwLock`. In-memory cells never touch
//! disk; file-backed cells load a versioned JSON envelope on open and rewrite
//! it atomically after every successful update:
//!
//! ```text
//! {"version": 1, "data": <value>}
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, RepoResult};

/// Envelope version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    data: serde_json::Value,
}

/// A value guarded by a lock and optionally mirrored to a JSON file.
pub struct Persisted<T> {
    value: RwLock<T>,
    file: Option<PathBuf>,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync,
{
    /// A cell that only lives in memory.
    pub fn in_memory(value: T) -> Self {
        Self {
            value: RwLock::new(value),
            file: None,
        }
    }

    /// A cell mirrored to `path`. A missing file starts from `T::default()`.
    pub fn open(path: impl Into<PathBuf>) -> RepoResult<Self> {
        let path = path.into();
        let value = if path.exists() {
            load(&path)?
        } else {
            T::default()
        };
        Ok(Self {
            value: RwLock::new(value),
            file: Some(path),
        })
    }

    /// Path of the backing file, if any.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Run `f` against the current value.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.value.read().expect("lock poisoned");
        f(&*guard)
    }

    /// Run `f` against the value and persist the result if it succeeds.
    ///
    /// The write lock is held across the mutation and the file write, so
    /// writers to one cell are serialized. File-backed cells mutate a copy
    /// and only install it once the file write succeeds; readers never see
    /// a change that failed to reach disk.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> RepoResult<R>) -> RepoResult<R> {
        let mut guard = self.value.write().expect("lock poisoned");
        let Some(path) = &self.file else {
            return f(&mut *guard);
        };
        let mut next = guard.clone();
        let out = f(&mut next)?;
        save(path, &next)?;
        *guard = next;
        Ok(out)
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> RepoResult<T> {
    let bytes = std::fs::read(path)?;
    let envelope: EnvelopeIn = serde_json::from_slice(&bytes)
        .map_err(|e| RepoError::Serialization(format!("{}: {e}", path.display())))?;
    if envelope.version != FORMAT_VERSION {
        return Err(RepoError::Serialization(format!(
            "{}: unsupported format version {} (expected {FORMAT_VERSION})",
            path.display(),
            envelope.version
        )));
    }
    serde_json::from_value(envelope.data)
        .map_err(|e| RepoError::Serialization(format!("{}: {e}", path.display())))
}

fn save<T: Serialize>(path: &Path, value: &T) -> RepoResult<()> {
    let bytes = serde_json::to_vec_pretty(&EnvelopeOut {
        version: FORMAT_VERSION,
        data: value,
    })
    .map_err(|e| RepoError::Serialization(e.to_string()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.persist(path).map_err(|e| RepoError::Io(e.error))?;
    debug!(file = %path.display(), bytes = bytes.len(), "saved repo file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn memory_cell_update() {
        let cell: Persisted<Vec<u32>> = Persisted::in_memory(vec![]);
        cell.update(|v| {
            v.push(1);
            Ok(())
        })
        .unwrap();
        assert_eq!(cell.read(|v| v.clone()), vec![1]);
        assert!(cell.file().is_none());
    }

    #[test]
    fn failed_update_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cell.json");
        let cell: Persisted<Vec<u32>> = Persisted::open(&path).unwrap();
        let res: RepoResult<()> = cell.update(|_| Err(RepoError::NameRequired));
        assert!(res.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn failed_save_leaves_value_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cell.json");
        let cell: Persisted<Vec<u32>> = Persisted::open(&path).unwrap();
        cell.update(|v| {
            v.push(1);
            Ok(())
        })
        .unwrap();

        // a directory in place of the file makes the rename fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        let res = cell.update(|v| {
            v.push(2);
            Ok(())
        });
        assert!(res.is_err());
        assert_eq!(cell.read(|v| v.clone()), vec![1]);
    }

    #[test]
    fn file_cell_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cell.json");
        {
            let cell: Persisted<BTreeMap<String, u64>> = Persisted::open(&path).unwrap();
            cell.update(|m| {
                m.insert("views".into(), 3);
                Ok(())
            })
            .unwrap();
        }
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["data"]["views"], 3);

        let cell: Persisted<BTreeMap<String, u64>> = Persisted::open(&path).unwrap();
        assert_eq!(cell.read(|m| m.get("views").copied()), Some(3));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cell.json");
        std::fs::write(&path, br#"{"version": 99, "data": []}"#).unwrap();
        let res: RepoResult<Persisted<Vec<u32>>> = Persisted::open(&path);
        assert!(matches!(res, Err(RepoError::Serialization(_))));
    }
}
