//! Hash File
//!
//! Disk-resident hash table mapping a 32-bit hash code to the ids of every
//! payload that produced it.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (24 bytes)                                        │
//! │   Magic: "VSHF" (4) | Version: u16 (2) | Reserved (2)    │
//! │   BucketCount: u32 | BucketSize: u32                     │
//! │   ItemCount: u32   | SyncedThrough: u32                  │
//! ├──────────────────────────────────────────────────────────┤
//! │ Bucket 0 .. BucketCount-1 (primary buckets)              │
//! │ ┌─────────────────────────────────┬────────────────────┐ │
//! │ │ BucketSize × [Hash u32][Id u32] │ Overflow: u32      │ │
//! │ └─────────────────────────────────┴────────────────────┘ │
//! ├──────────────────────────────────────────────────────────┤
//! │ Overflow buckets (appended as chains grow)               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A hash lives in primary bucket `hash % BucketCount`. Slots fill front to
//! back and id 0 marks an empty slot, so the first empty slot ends a chain.
//! Overflow 0 means "no next bucket" (bucket 0 is always primary).
//!
//! SyncedThrough is the highest id whose slot was on stable storage when the
//! header was last written by `sync`. Entries past it may not have survived
//! a crash and are re-checked when the store opens.
//!
//! When the table grows past its load factor it is rebuilt with twice the
//! primary buckets into a side file that then replaces the original.

mod iterator;

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use bytes::Buf;

pub use iterator::HashChainIter;

use super::io::{fsync_dir, read_exact_at, read_u32_at, write_all_at};
use super::{check_file_header, open_store_file, write_file_header, ValueId};
use crate::config::HashParams;
use crate::error::{Result, StoreError};

const MAGIC: &[u8; 4] = b"VSHF";
const VERSION: u16 = 1;

/// Full header size, common prefix included
pub(crate) const HEADER_SIZE: u64 = 24;

/// Header field positions
const BUCKET_COUNT_POS: u64 = 8;
const ITEM_COUNT_POS: u64 = 16;
const SYNCED_THROUGH_POS: u64 = 20;

/// Hash (4) + Id (4)
const SLOT_SIZE: u64 = 8;

/// Overflow link at the end of each bucket
const LINK_SIZE: u64 = 4;

/// One bucket as read from disk
pub(crate) struct Bucket {
    /// (hash, id) pairs; id 0 = empty
    pub(crate) slots: Vec<(u32, ValueId)>,
    /// Next bucket in the chain, 0 = end
    pub(crate) overflow: u32,
}

impl Bucket {
    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|&(_, id)| id == 0)
    }
}

/// On-disk hash index
pub struct HashFile {
    path: PathBuf,
    file: File,
    /// Settings used for new tables (creation, clear)
    params: HashParams,
    bucket_count: u32,
    bucket_size: u32,
    item_count: u32,
    /// Highest id written to a slot
    highest_id: ValueId,
    file_size: u64,
    force_sync: bool,
}

impl HashFile {
    /// Open an existing hash file or create an empty table
    ///
    /// An existing file keeps the geometry recorded in its header; `params`
    /// only supplies the load factor and the shape of future empty tables.
    pub fn open(path: &Path, params: HashParams, force_sync: bool) -> Result<Self> {
        let file = open_store_file(path)?;
        let file_size = file.metadata()?.len();

        let table = if file_size == 0 {
            Self::create_table(
                path,
                file,
                params,
                params.initial_buckets,
                params.bucket_size,
                force_sync,
            )?
        } else {
            Self::load_table(path, file, file_size, params, force_sync)?
        };

        tracing::debug!(
            "Opened hash file {:?} ({} buckets, {} items)",
            path,
            table.bucket_count,
            table.item_count
        );

        Ok(table)
    }

    /// Register `id` under `hash`
    pub fn store_id(&mut self, hash: u32, id: ValueId) -> Result<()> {
        if id == 0 {
            return Err(StoreError::InvalidArgument(
                "id 0 cannot be stored in the hash index".to_string(),
            ));
        }

        self.insert(hash, id)?;
        self.item_count += 1;
        self.highest_id = self.highest_id.max(id);
        self.write_item_count()?;

        if self.force_sync {
            self.sync()?;
        }

        if self.needs_rehash() {
            self.rehash()?;
        }

        Ok(())
    }

    /// Lazily iterate over the ids stored under `hash`, in insertion order
    ///
    /// Each call starts a fresh walk of the chain.
    pub fn ids_for(&self, hash: u32) -> HashChainIter<'_> {
        HashChainIter::new(self, hash, self.primary_bucket(hash))
    }

    /// Number of (hash, id) entries in the table
    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Number of primary buckets
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Slots per bucket
    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    /// Highest id recorded as durable by the last `sync`
    pub fn synced_through(&self) -> Result<ValueId> {
        Ok(read_u32_at(&self.file, SYNCED_THROUGH_POS)?)
    }

    /// Force the table to stable storage
    ///
    /// Slots are flushed before the header records them as synced.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        self.write_synced_through()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Replace the table with an empty one of the configured initial size
    pub fn clear(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.bucket_count = self.params.initial_buckets;
        self.bucket_size = self.params.bucket_size;
        self.item_count = 0;
        self.highest_id = 0;
        self.file_size = Self::initialize(&self.file, self.bucket_count, self.bucket_size)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Sync and release the file handle
    pub fn close(self) -> Result<()> {
        self.file.sync_data()?;
        self.write_synced_through()?;
        self.file.sync_all()?;
        Ok(())
    }

    // =========================================================================
    // Table Construction
    // =========================================================================

    fn create_table(
        path: &Path,
        file: File,
        params: HashParams,
        bucket_count: u32,
        bucket_size: u32,
        force_sync: bool,
    ) -> Result<Self> {
        let file_size = Self::initialize(&file, bucket_count, bucket_size)?;
        file.sync_data()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            params,
            bucket_count,
            bucket_size,
            item_count: 0,
            highest_id: 0,
            file_size,
            force_sync,
        })
    }

    fn load_table(
        path: &Path,
        file: File,
        file_size: u64,
        params: HashParams,
        force_sync: bool,
    ) -> Result<Self> {
        check_file_header(&file, file_size, MAGIC, VERSION, "hash")?;

        if file_size < HEADER_SIZE {
            return Err(StoreError::Corruption(format!(
                "hash file is {} bytes, shorter than its header",
                file_size
            )));
        }

        let mut fields = [0u8; (HEADER_SIZE - BUCKET_COUNT_POS) as usize];
        read_exact_at(&file, &mut fields, BUCKET_COUNT_POS)?;
        let mut buf = &fields[..];
        let bucket_count = buf.get_u32();
        let bucket_size = buf.get_u32();
        let item_count = buf.get_u32();
        let synced_through = buf.get_u32();

        if bucket_count == 0 || bucket_size == 0 {
            return Err(StoreError::Corruption(format!(
                "hash file header has {} buckets of {} slots",
                bucket_count, bucket_size
            )));
        }

        let bucket_bytes = Self::bucket_bytes_for(bucket_size);
        let body = file_size - HEADER_SIZE;
        if body % bucket_bytes != 0 || body / bucket_bytes < bucket_count as u64 {
            return Err(StoreError::Corruption(format!(
                "hash file body of {} bytes does not hold {} buckets of {} bytes",
                body, bucket_count, bucket_bytes
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            params,
            bucket_count,
            bucket_size,
            item_count,
            highest_id: synced_through,
            file_size,
            force_sync,
        })
    }

    /// Write an empty table into `file`; returns the new file size
    fn initialize(file: &File, bucket_count: u32, bucket_size: u32) -> Result<u64> {
        write_file_header(file, MAGIC, VERSION)?;

        let mut fields = [0u8; (HEADER_SIZE - BUCKET_COUNT_POS) as usize];
        fields[0..4].copy_from_slice(&bucket_count.to_be_bytes());
        fields[4..8].copy_from_slice(&bucket_size.to_be_bytes());
        write_all_at(file, &fields, BUCKET_COUNT_POS)?;

        let file_size = HEADER_SIZE + bucket_count as u64 * Self::bucket_bytes_for(bucket_size);
        file.set_len(file_size)?;
        Ok(file_size)
    }

    // =========================================================================
    // Bucket Access
    // =========================================================================

    fn bucket_bytes_for(bucket_size: u32) -> u64 {
        bucket_size as u64 * SLOT_SIZE + LINK_SIZE
    }

    fn bucket_bytes(&self) -> u64 {
        Self::bucket_bytes_for(self.bucket_size)
    }

    fn bucket_position(&self, bucket: u32) -> u64 {
        HEADER_SIZE + bucket as u64 * self.bucket_bytes()
    }

    /// Primary plus overflow buckets currently in the file
    pub(crate) fn total_buckets(&self) -> u64 {
        (self.file_size - HEADER_SIZE) / self.bucket_bytes()
    }

    fn primary_bucket(&self, hash: u32) -> u32 {
        hash % self.bucket_count
    }

    pub(crate) fn read_bucket(&self, bucket: u32) -> Result<Bucket> {
        if bucket as u64 >= self.total_buckets() {
            return Err(StoreError::Corruption(format!(
                "hash bucket {} is past the end of the table ({} buckets)",
                bucket,
                self.total_buckets()
            )));
        }

        let mut raw = vec![0u8; self.bucket_bytes() as usize];
        read_exact_at(&self.file, &mut raw, self.bucket_position(bucket))?;

        let mut buf = &raw[..];
        let mut slots = Vec::with_capacity(self.bucket_size as usize);
        for _ in 0..self.bucket_size {
            let hash = buf.get_u32();
            let id = buf.get_u32();
            slots.push((hash, id));
        }
        let overflow = buf.get_u32();

        Ok(Bucket { slots, overflow })
    }

    fn write_slot(&self, bucket: u32, slot: usize, hash: u32, id: ValueId) -> Result<()> {
        let mut entry = [0u8; SLOT_SIZE as usize];
        entry[0..4].copy_from_slice(&hash.to_be_bytes());
        entry[4..8].copy_from_slice(&id.to_be_bytes());
        let position = self.bucket_position(bucket) + slot as u64 * SLOT_SIZE;
        write_all_at(&self.file, &entry, position)?;
        Ok(())
    }

    fn write_link(&self, bucket: u32, next: u32) -> Result<()> {
        let position = self.bucket_position(bucket) + self.bucket_size as u64 * SLOT_SIZE;
        write_all_at(&self.file, &next.to_be_bytes(), position)?;
        Ok(())
    }

    fn write_item_count(&self) -> Result<()> {
        write_all_at(&self.file, &self.item_count.to_be_bytes(), ITEM_COUNT_POS)?;
        Ok(())
    }

    fn write_synced_through(&self) -> Result<()> {
        write_all_at(&self.file, &self.highest_id.to_be_bytes(), SYNCED_THROUGH_POS)?;
        Ok(())
    }

    /// Grow the file by one zeroed bucket and return its number
    fn append_bucket(&mut self) -> Result<u32> {
        let bucket = u32::try_from(self.total_buckets()).map_err(|_| {
            StoreError::Corruption("hash file exceeds the addressable bucket count".to_string())
        })?;
        self.file_size += self.bucket_bytes();
        self.file.set_len(self.file_size)?;
        Ok(bucket)
    }

    /// Place (hash, id) in the first free slot of its chain
    fn insert(&mut self, hash: u32, id: ValueId) -> Result<()> {
        let mut bucket_no = self.primary_bucket(hash);
        let mut visited = 0u64;

        loop {
            visited += 1;
            if visited > self.total_buckets() {
                return Err(StoreError::Corruption(format!(
                    "overflow chain starting at bucket {} loops",
                    self.primary_bucket(hash)
                )));
            }

            let bucket = self.read_bucket(bucket_no)?;
            if let Some(slot) = bucket.first_free() {
                return self.write_slot(bucket_no, slot, hash, id);
            }
            if bucket.overflow != 0 {
                bucket_no = bucket.overflow;
                continue;
            }

            // New bucket is written before the link that points at it
            let overflow = self.append_bucket()?;
            self.write_slot(overflow, 0, hash, id)?;
            return self.write_link(bucket_no, overflow);
        }
    }

    // =========================================================================
    // Rehashing
    // =========================================================================

    fn needs_rehash(&self) -> bool {
        let capacity = self.bucket_count as f64 * self.bucket_size as f64;
        self.item_count as f64 > capacity * self.params.load_factor as f64
    }

    /// Rebuild the table with twice the primary buckets
    ///
    /// Chains are copied in order, so each hash keeps its insertion order.
    fn rehash(&mut self) -> Result<()> {
        let Some(new_count) = self.bucket_count.checked_mul(2) else {
            tracing::warn!("Hash file {:?} cannot grow past {} buckets", self.path, self.bucket_count);
            return Ok(());
        };

        let tmp_path = Self::rehash_path(&self.path);
        let tmp_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut table = Self::create_table(
            &tmp_path,
            tmp_file,
            self.params,
            new_count,
            self.bucket_size,
            false,
        )?;

        for primary in 0..self.bucket_count {
            let mut bucket_no = primary;
            let mut visited = 0u64;
            'chain: loop {
                visited += 1;
                if visited > self.total_buckets() {
                    return Err(StoreError::Corruption(format!(
                        "overflow chain starting at bucket {} loops",
                        primary
                    )));
                }

                let bucket = self.read_bucket(bucket_no)?;
                for &(hash, id) in &bucket.slots {
                    if id == 0 {
                        break 'chain;
                    }
                    table.insert(hash, id)?;
                }
                if bucket.overflow == 0 {
                    break;
                }
                bucket_no = bucket.overflow;
            }
        }

        table.item_count = self.item_count;
        table.highest_id = self.highest_id;
        table.write_item_count()?;
        table.write_synced_through()?;
        table.file.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        fsync_dir(&self.path)?;
        table.path = self.path.clone();
        table.force_sync = self.force_sync;

        tracing::debug!(
            "Rehashed {:?}: {} -> {} buckets ({} items)",
            self.path,
            self.bucket_count,
            new_count,
            self.item_count
        );

        *self = table;
        Ok(())
    }

    fn rehash_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".rehash");
        PathBuf::from(name)
    }
}
