//! Store Module
//!
//! The deduplicating value store that coordinates the three storage files.
//!
//! ## Responsibilities
//! - Hand out dense ids for distinct payloads
//! - Resolve ids to payloads and payloads back to ids
//! - Keep the three files consistent across inserts, syncs and clears
//! - Check cross-file consistency on open

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard};

use crate::config::{StoreConfig, SyncStrategy};
use crate::error::{Result, StoreError};
use crate::hash::{Crc32Hasher, PayloadHasher};
use crate::storage::{DataFile, HashFile, IdFile, ValueId};

/// The three files making up a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFile {
    Data,
    Id,
    Hash,
}

/// Order in which `sync()` and `close()` flush the files.
///
/// Data is durable before any index entry that points at it.
pub const SYNC_ORDER: [StoreFile; 3] = [StoreFile::Data, StoreFile::Id, StoreFile::Hash];

/// Run `sync_one` for each file in `SYNC_ORDER`, stopping at the first error
fn sync_in_order(mut sync_one: impl FnMut(StoreFile) -> Result<()>) -> Result<()> {
    for file in SYNC_ORDER {
        sync_one(file)?;
    }
    Ok(())
}

/// Point-in-time counters for a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of distinct values (equals the max id)
    pub values: u32,
    /// Data file size in bytes, header included
    pub data_file_size: u64,
    /// Primary buckets in the hash index
    pub hash_buckets: u32,
    /// Entries in the hash index
    pub hash_items: u32,
}

/// Content-addressable value store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Reads** (`get_data`, `get_id`, `max_id`, `iter`, `stats`, `sync`)
///   share a read lock; the files use positioned reads so no cursor is shared.
/// - **Writes** (`store_data`) take an upgradable lock for the duplicate
///   check and upgrade to exclusive only when a new value is appended.
///   Readers never observe a half-appended value.
/// - `clear` is exclusive.
pub struct DataStore<H: PayloadHasher = Crc32Hasher> {
    config: StoreConfig,
    hasher: H,
    files: RwLock<StoreFiles>,
    /// Values stored since the last sync (for `SyncStrategy::EveryNWrites`)
    unsynced_writes: AtomicUsize,
}

struct StoreFiles {
    data: DataFile,
    ids: IdFile,
    hashes: HashFile,
}

impl DataStore<Crc32Hasher> {
    /// Open or create a store with CRC32 hash codes
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_hasher(config, Crc32Hasher)
    }

    /// Open with a directory and name (convenience method)
    ///
    /// Uses default config for everything else
    pub fn open_path(dir: &Path, name: &str) -> Result<Self> {
        let config = StoreConfig::builder().data_dir(dir).name(name).build();
        Self::open(config)
    }
}

impl<H: PayloadHasher> DataStore<H> {
    /// Open or create a store using `hasher` for hash codes
    ///
    /// On startup:
    /// 1. Validate config and create the directory
    /// 2. Open (or create) the three files
    /// 3. Check that the last id points at a complete record
    /// 4. Re-register ids the hash index may have lost
    /// 5. Optionally verify every value
    pub fn open_with_hasher(config: StoreConfig, hasher: H) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let force_sync = config.sync_strategy.forces_sync();
        let data = DataFile::open(&config.data_path(), force_sync)?;
        let ids = IdFile::open(&config.id_path(), force_sync)?;
        let hashes = HashFile::open(&config.hash_path(), config.hash_params(), force_sync)?;

        let mut files = StoreFiles { data, ids, hashes };
        files.check_last_record()?;
        files.recover_hash_index(&hasher, config.recovery_window)?;

        let store = Self {
            config,
            hasher,
            files: RwLock::new(files),
            unsynced_writes: AtomicUsize::new(0),
        };

        if store.config.verify_on_open {
            store.verify()?;
        }

        tracing::debug!(
            "Opened store {:?} in {:?} ({} values)",
            store.config.name,
            store.config.data_dir,
            store.max_id()
        );

        Ok(store)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Payload stored under `id`, or `None` if the id is unassigned
    pub fn get_data(&self, id: ValueId) -> Result<Option<Vec<u8>>> {
        if id == 0 {
            return Ok(None);
        }
        self.files.read().get_data(id)
    }

    /// Id of the stored value equal to `payload`, or `None` if absent
    pub fn get_id(&self, payload: &[u8]) -> Result<Option<ValueId>> {
        let hash = self.hasher.hash32(payload);
        self.files.read().find_id(hash, payload)
    }

    /// Largest id assigned so far, 0 when empty
    pub fn max_id(&self) -> ValueId {
        self.files.read().ids.max_id()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `payload` and return its id
    ///
    /// Storing a payload that is already present returns the existing id
    /// and writes nothing.
    pub fn store_data(&self, payload: &[u8]) -> Result<ValueId> {
        let hash = self.hasher.hash32(payload);

        let files = self.files.upgradable_read();
        if let Some(id) = files.find_id(hash, payload)? {
            tracing::trace!("Value of {} bytes already stored as id {}", payload.len(), id);
            return Ok(id);
        }

        let mut files = RwLockUpgradableReadGuard::upgrade(files);
        let offset = files.data.store_data(payload)?;
        let id = files.ids.store_offset(offset)?;
        files.hashes.store_id(hash, id)?;

        tracing::trace!(
            "Stored {} bytes as id {} (offset {}, hash {:#010x})",
            payload.len(),
            id,
            offset,
            hash
        );

        if let SyncStrategy::EveryNWrites { count } = self.config.sync_strategy {
            if self.unsynced_writes.fetch_add(1, Ordering::SeqCst) + 1 >= count {
                files.sync_all()?;
                self.unsynced_writes.store(0, Ordering::SeqCst);
            }
        }

        Ok(id)
    }

    /// Values stored since the last sync
    pub fn pending_writes(&self) -> usize {
        self.unsynced_writes.load(Ordering::SeqCst)
    }

    /// Flush all files to stable storage in `SYNC_ORDER`
    pub fn sync(&self) -> Result<()> {
        self.files.read().sync_all()?;
        self.unsynced_writes.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Remove every value; the next stored value gets id 1
    ///
    /// Index files are emptied before the data they point into.
    pub fn clear(&self) -> Result<()> {
        let mut files = self.files.write();
        files.hashes.clear()?;
        files.ids.clear()?;
        files.data.clear()?;
        self.unsynced_writes.store(0, Ordering::SeqCst);

        tracing::info!("Cleared store {:?}", self.config.name);
        Ok(())
    }

    /// Sync every file in `SYNC_ORDER` and release them
    pub fn close(self) -> Result<()> {
        let StoreFiles { data, ids, hashes } = self.files.into_inner();
        data.close()?;
        ids.close()?;
        hashes.close()?;

        tracing::debug!("Closed store {:?}", self.config.name);
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Iterate over every `(id, payload)` in id order
    ///
    /// Holds a read lock for the life of the iterator, so inserts wait
    /// until it is dropped.
    pub fn iter(&self) -> StoreIter<'_> {
        let files = self.files.read();
        let max_id = files.ids.max_id();
        StoreIter {
            files,
            next_id: 1,
            max_id,
        }
    }

    /// Current counters
    pub fn stats(&self) -> StoreStats {
        let files = self.files.read();
        StoreStats {
            values: files.ids.max_id(),
            data_file_size: files.data.file_size(),
            hash_buckets: files.hashes.bucket_count(),
            hash_items: files.hashes.item_count(),
        }
    }

    /// Check that every id resolves to a value that looks up to that id
    pub fn verify(&self) -> Result<()> {
        let files = self.files.read();
        for id in 1..=files.ids.max_id() {
            let payload = files
                .get_data(id)?
                .ok_or_else(|| StoreError::Corruption(format!("id {} has no offset", id)))?;

            let found = files.find_id(self.hasher.hash32(&payload), &payload)?;
            if found != Some(id) {
                return Err(StoreError::Corruption(format!(
                    "value of id {} resolves to {:?} through the hash index",
                    id, found
                )));
            }
        }
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl StoreFiles {
    fn get_data(&self, id: ValueId) -> Result<Option<Vec<u8>>> {
        match self.ids.get_offset(id)? {
            Some(offset) => Ok(Some(self.data.get_data(offset)?)),
            None => Ok(None),
        }
    }

    /// Walk the collision chain for `hash` comparing stored bytes exactly
    fn find_id(&self, hash: u32, payload: &[u8]) -> Result<Option<ValueId>> {
        for candidate in self.hashes.ids_for(hash) {
            let id = candidate?;
            // Index entries may outlive their id after a crash
            let Some(offset) = self.ids.get_offset(id)? else {
                continue;
            };
            if self.data.matches(offset, payload)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn sync_file(&self, file: StoreFile) -> Result<()> {
        match file {
            StoreFile::Data => self.data.sync(),
            StoreFile::Id => self.ids.sync(),
            StoreFile::Hash => self.hashes.sync(),
        }
    }

    fn sync_all(&self) -> Result<()> {
        sync_in_order(|file| self.sync_file(file))
    }

    /// The highest id must frame a complete record in the data file
    fn check_last_record(&self) -> Result<()> {
        let max_id = self.ids.max_id();
        if max_id == 0 {
            return Ok(());
        }

        let offset = self.ids.get_offset(max_id)?.ok_or_else(|| {
            StoreError::Corruption(format!("id {} has a zero offset", max_id))
        })?;

        self.data.record_len(offset).map_err(|e| {
            StoreError::Corruption(format!(
                "id {} points at offset {} which is not a complete record: {}",
                max_id, offset, e
            ))
        })?;

        Ok(())
    }

    /// Make every id that may be missing from the hash index resolve again
    ///
    /// The hash file's item count and slots are written separately, so
    /// neither proves an id is indexed. Ids past the hash file's synced
    /// checkpoint are looked up, plus the trailing `window` ids, and any that
    /// do not resolve are registered again.
    fn recover_hash_index<H: PayloadHasher>(&mut self, hasher: &H, window: u32) -> Result<()> {
        let max_id = self.ids.max_id();
        if max_id == 0 {
            return Ok(());
        }

        let synced = self.hashes.synced_through()?.min(max_id);
        let checked_through = synced.min(max_id.saturating_sub(window));
        if checked_through == max_id {
            return Ok(());
        }
        let first = checked_through + 1;

        let mut missing = 0u32;
        for id in first..=max_id {
            let payload = self
                .get_data(id)?
                .ok_or_else(|| StoreError::Corruption(format!("id {} has no offset", id)))?;
            let hash = hasher.hash32(&payload);

            match self.find_id(hash, &payload)? {
                Some(found) if found == id => {}
                Some(found) => {
                    return Err(StoreError::Corruption(format!(
                        "ids {} and {} hold the same value",
                        found, id
                    )))
                }
                None => {
                    self.hashes.store_id(hash, id)?;
                    missing += 1;
                }
            }
        }

        if missing == 0 {
            return Ok(());
        }

        tracing::warn!(
            "Hash index was missing {} of ids {}..={}, re-indexed them",
            missing,
            first,
            max_id
        );
        self.hashes.sync()
    }
}

/// Iterator over `(id, payload)` pairs under a read lock
pub struct StoreIter<'a> {
    files: RwLockReadGuard<'a, StoreFiles>,
    next_id: ValueId,
    max_id: ValueId,
}

impl<'a> Iterator for StoreIter<'a> {
    type Item = Result<(ValueId, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_id != 0 && self.next_id <= self.max_id {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            match self.files.get_data(id) {
                Ok(Some(payload)) => return Some(Ok((id, payload))),
                Ok(None) => continue,
                Err(e) => {
                    self.next_id = 0;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_in_order_visits_data_then_indexes() {
        let mut visited = Vec::new();
        sync_in_order(|file| {
            visited.push(file);
            Ok(())
        })
        .unwrap();

        assert_eq!(visited, vec![StoreFile::Data, StoreFile::Id, StoreFile::Hash]);
    }

    #[test]
    fn test_sync_in_order_stops_when_data_fails() {
        let mut visited = Vec::new();
        let result = sync_in_order(|file| {
            visited.push(file);
            match file {
                StoreFile::Data => Err(StoreError::Corruption("disk full".to_string())),
                _ => Ok(()),
            }
        });

        assert!(result.is_err());
        assert_eq!(visited, vec![StoreFile::Data]);
    }
}
