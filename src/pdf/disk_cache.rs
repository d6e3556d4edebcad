//! Persistent bitmap cache with a byte budget and LRU eviction
//!
//! Entries are PNG files named by their cache key. A JSON index next to them
//! records recency order (least recently used first) and entry sizes so that
//! eviction order survives restarts.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use image::ImageEncoder;
use log::{debug, info, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::cache::CacheKey;
use super::error::CacheError;
use super::types::Bitmap;

const INDEX_FILE: &str = "journal.json";
const ENTRY_EXTENSION: &str = "png";
const INDEX_VERSION: u32 = 1;

/// Default byte budget (100 MiB)
pub const DEFAULT_DISK_BUDGET: u64 = 100 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    /// Least recently used first
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    key: String,
    bytes: u64,
}

struct DiskState {
    dir: PathBuf,
    budget: u64,
    used: u64,
    /// key digest -> entry size in bytes
    entries: LruCache<String, u64>,
    dirty: bool,
}

impl DiskState {
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn remove_entry(&mut self, key: &str) {
        if let Some(bytes) = self.entries.pop(key) {
            self.used = self.used.saturating_sub(bytes);
            self.dirty = true;
        }
        if let Err(e) = fs::remove_file(self.entry_path(key)) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove cache entry {key}: {e}");
            }
        }
    }

    fn evict_until_fits(&mut self, incoming: u64) {
        while self.used + incoming > self.budget {
            let Some((key, _)) = self.entries.peek_lru().map(|(k, v)| (k.clone(), *v)) else {
                break;
            };
            debug!("Evicting disk cache entry {key}");
            self.remove_entry(&key);
        }
    }

    fn save_index(&mut self) -> Result<(), CacheError> {
        let index = IndexFile {
            version: INDEX_VERSION,
            entries: self
                .entries
                .iter()
                .rev()
                .map(|(key, bytes)| IndexEntry {
                    key: key.clone(),
                    bytes: *bytes,
                })
                .collect(),
        };
        let json = serde_json::to_vec(&index)?;
        write_atomically(&self.dir, &self.index_path(), &json)?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for DiskState {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save_index() {
                warn!("Failed to persist disk cache index: {e}");
            }
        }
    }
}

/// Byte-budgeted on-disk bitmap store, safe to share between threads
#[derive(Clone)]
pub struct DiskCache {
    state: Arc<Mutex<DiskState>>,
}

impl DiskCache {
    /// Open (or create) a cache rooted at `dir` holding at most `budget` bytes
    pub fn open(dir: impl AsRef<Path>, budget: u64) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut state = DiskState {
            dir,
            budget,
            used: 0,
            entries: LruCache::unbounded(),
            dirty: false,
        };

        for (key, bytes) in Self::recover_entries(&state)? {
            state.used += bytes;
            state.entries.push(key, bytes);
        }
        state.evict_until_fits(0);
        state.save_index()?;

        info!(
            "Opened disk cache at {:?}: {} entries, {} bytes",
            state.dir,
            state.entries.len(),
            state.used
        );

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Rebuild recency order from the index and the directory contents.
    /// Files the index doesn't know about are adopted as least recently used,
    /// oldest first; index entries whose file is gone are dropped.
    fn recover_entries(state: &DiskState) -> Result<Vec<(String, u64)>, CacheError> {
        let indexed: Vec<IndexEntry> = match fs::read(state.index_path()) {
            Ok(bytes) => match serde_json::from_slice::<IndexFile>(&bytes) {
                Ok(index) if index.version == INDEX_VERSION => index.entries,
                Ok(index) => {
                    warn!("Ignoring disk cache index version {}", index.version);
                    Vec::new()
                }
                Err(e) => {
                    warn!("Disk cache index is corrupt, rebuilding: {e}");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut on_disk: Vec<(String, u64, SystemTime)> = Vec::new();
        for entry in fs::read_dir(&state.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let meta = entry.metadata()?;
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            on_disk.push((key.to_string(), meta.len(), modified));
        }

        let mut recovered = Vec::with_capacity(on_disk.len());
        let mut orphans: Vec<&(String, u64, SystemTime)> = on_disk
            .iter()
            .filter(|(key, _, _)| !indexed.iter().any(|e| &e.key == key))
            .collect();
        orphans.sort_by_key(|(_, _, modified)| *modified);
        for (key, bytes, _) in orphans {
            recovered.push((key.clone(), *bytes));
        }

        for entry in indexed {
            if let Some((_, bytes, _)) = on_disk.iter().find(|(key, _, _)| *key == entry.key) {
                recovered.push((entry.key, *bytes));
            }
        }

        Ok(recovered)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DiskState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Read and decode an entry, promoting it in recency order.
    ///
    /// The file is read and decoded without holding the lock, so workers can
    /// hit the disk tier in parallel.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Bitmap>, CacheError> {
        let path = {
            let state = self.state();
            if !state.entries.contains(key.as_str()) {
                return Ok(None);
            }
            state.entry_path(key.as_str())
        };

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.state().remove_entry(key.as_str());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match decode_png(&bytes) {
            Ok(bitmap) => {
                let mut state = self.state();
                // Evicted while we were reading: still a valid result, nothing to promote
                if state.entries.get(key.as_str()).is_some() {
                    state.dirty = true;
                }
                Ok(Some(bitmap))
            }
            Err(e) => {
                self.state().remove_entry(key.as_str());
                Err(CacheError::Corrupt {
                    key: key.to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Compress and store an entry, evicting older entries to stay within budget.
    /// The index is written on [`DiskCache::flush`] or when the last handle drops.
    pub fn put(&self, key: &CacheKey, bitmap: &Bitmap) -> Result<(), CacheError> {
        let encoded = encode_png(bitmap)?;
        let size = encoded.len() as u64;

        let mut state = self.state();
        if size > state.budget {
            warn!(
                "Bitmap for {key} is {size} bytes, larger than the whole cache budget; not cached"
            );
            return Ok(());
        }

        state.remove_entry(key.as_str());
        state.evict_until_fits(size);

        let path = state.entry_path(key.as_str());
        write_atomically(&state.dir, &path, &encoded)?;
        state.entries.push(key.as_str().to_string(), size);
        state.used += size;
        state.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state().entries.contains(key.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn bytes_used(&self) -> u64 {
        self.state().used
    }

    #[must_use]
    pub fn budget(&self) -> u64 {
        self.state().budget
    }

    /// Keys from least to most recently used
    #[must_use]
    pub fn keys_lru_first(&self) -> Vec<CacheKey> {
        self.state()
            .entries
            .iter()
            .rev()
            .map(|(key, _)| CacheKey::from_digest(key.clone()))
            .collect()
    }

    /// Persist recency order now instead of on drop
    pub fn flush(&self) -> Result<(), CacheError> {
        let mut state = self.state();
        if state.dirty {
            state.save_index()?;
        }
        Ok(())
    }
}

fn write_atomically(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(dest).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>, CacheError> {
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out).write_image(
        &bitmap.pixels,
        bitmap.width,
        bitmap.height,
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(out)
}

fn decode_png(bytes: &[u8]) -> Result<Bitmap, CacheError> {
    let rgba = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.into_rgba8();
    Ok(Bitmap {
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    })
}
