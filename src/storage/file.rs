//! File-backed slot store
//!
//! One JSON file per slot inside a slot directory. Writes go through a temporary
//! file in the same directory and are linked into place without clobbering, so a
//! crash mid-write never leaves a truncated slot behind and a committed slot is
//! never replaced by a later `save`.

use crate::config::PipelineConfig;
use crate::storage::{SlotKey, SlotKind, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A persisted slot found in the slot directory
#[derive(Debug, Clone)]
pub struct SlotEntry {
    pub key: SlotKey,
    pub path: PathBuf,
    /// Number of entries in the stored sequence, nulls included; `None` when
    /// the file could not be decoded
    pub len: Option<usize>,
}

/// Saves and loads stage output under deterministic slot names
#[derive(Debug, Clone)]
pub struct SlotStore {
    dir: PathBuf,
    pipeline: String,
}

impl SlotStore {
    /// Creates a store rooted at `dir` for the pipeline run `pipeline`
    ///
    /// The directory is created lazily on the first save.
    pub fn new(dir: impl Into<PathBuf>, pipeline: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            pipeline: pipeline.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.pipeline.slot_dir, &config.pipeline.name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Builds the slot key for a stage of this pipeline
    pub fn key(&self, stage: &str, kind: SlotKind) -> SlotKey {
        SlotKey::new(&self.pipeline, stage, kind)
    }

    /// Path of the file backing `key`
    pub fn path(&self, key: &SlotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn exists(&self, key: &SlotKey) -> bool {
        self.path(key).is_file()
    }

    /// Loads a previously saved sequence
    ///
    /// # Returns
    ///
    /// * `Ok(Some(items))` - The slot exists and was decoded
    /// * `Ok(None)` - No slot was ever saved under `key`
    /// * `Err(StorageError)` - The slot exists but could not be read or decoded
    pub fn load<T: DeserializeOwned>(&self, key: &SlotKey) -> StorageResult<Option<Vec<T>>> {
        let path = self.path(key);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let items = serde_json::from_slice(&bytes)
            .map_err(|source| StorageError::Corrupt { path, source })?;

        Ok(Some(items))
    }

    /// Saves `items` under `key` unless that slot already exists
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The slot was written
    /// * `Ok(false)` - A slot already existed and was left untouched
    pub fn save<T: Serialize>(&self, key: &SlotKey, items: &[T]) -> StorageResult<bool> {
        let path = self.path(key);
        if path.exists() {
            tracing::debug!("Slot {} already exists, keeping committed output", key);
            return Ok(false);
        }

        let tmp = self.write_temp(items)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                tracing::info!("Saved {} entries to {}", items.len(), key);
                Ok(true)
            }
            // Lost a race against another writer of the same slot
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }

    /// Writes `items` under `key`, replacing any existing slot
    pub fn save_forced<T: Serialize>(&self, key: &SlotKey, items: &[T]) -> StorageResult<()> {
        let path = self.path(key);
        let tmp = self.write_temp(items)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        tracing::info!("Overwrote {} with {} entries", key, items.len());
        Ok(())
    }

    /// Deletes the slot for `key`, returning whether one existed
    pub fn remove(&self, key: &SlotKey) -> StorageResult<bool> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys of every slot of this pipeline found in the slot directory
    ///
    /// Sorted by file name. Slot files are not opened, so a corrupt slot is
    /// reported like any other. Files that do not follow the slot naming scheme
    /// are ignored.
    pub fn keys(&self) -> StorageResult<Vec<SlotKey>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for dir_entry in read_dir {
            let path = dir_entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(key) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| self.parse_file_name(n))
            {
                keys.push(key);
            }
        }

        keys.sort_by_key(|k| k.file_name());
        Ok(keys)
    }

    /// Lists every slot of this pipeline with its entry count
    ///
    /// A slot that cannot be decoded is still listed, with an unknown length,
    /// so it can be inspected and removed.
    pub fn list(&self) -> StorageResult<Vec<SlotEntry>> {
        let entries = self
            .keys()?
            .into_iter()
            .map(|key| {
                let len = match self.load::<serde_json::Value>(&key) {
                    Ok(items) => items.map(|v| v.len()),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        None
                    }
                };
                SlotEntry {
                    path: self.path(&key),
                    key,
                    len,
                }
            })
            .collect();
        Ok(entries)
    }

    /// Removes the slots of this pipeline, or only those of `stage`
    ///
    /// Slots are removed without being decoded. Returns the removed keys.
    pub fn clear(&self, stage: Option<&str>) -> StorageResult<Vec<SlotKey>> {
        let mut removed = Vec::new();
        for key in self.keys()? {
            if stage.map_or(true, |s| key.stage == s) && self.remove(&key)? {
                tracing::info!("Removed {}", key);
                removed.push(key);
            }
        }
        Ok(removed)
    }

    fn parse_file_name(&self, name: &str) -> Option<SlotKey> {
        let (rest, suffix) = name.rsplit_once('.')?;
        let kind = SlotKind::from_suffix(suffix)?;

        let stage = if self.pipeline.is_empty() {
            rest
        } else {
            rest.strip_prefix(&self.pipeline)?.strip_prefix('.')?
        };

        if stage.is_empty() {
            return None;
        }
        Some(self.key(stage, kind))
    }

    fn write_temp<T: Serialize>(&self, items: &[T]) -> StorageResult<NamedTempFile> {
        std::fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(items)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}
