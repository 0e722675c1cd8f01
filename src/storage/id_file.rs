//! ID File
//!
//! Maps dense ids to data file offsets. Slot `id - 1` holds the offset of
//! the record for `id`, so the file length alone determines the max id.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Header (6 bytes)                         │
//! │   Magic: "VSID" (4) | Version: u16 (2)   │
//! ├──────────────────────────────────────────┤
//! │ Offset: u64 (8)    ← id 1                │
//! │ Offset: u64 (8)    ← id 2                │
//! │ ...                                      │
//! └──────────────────────────────────────────┘
//! ```

use std::fs::File;
use std::path::Path;

use super::io::{read_u64_at, write_all_at};
use super::{check_file_header, open_store_file, write_file_header, ValueId, FILE_HEADER_SIZE};
use crate::error::{Result, StoreError};

const MAGIC: &[u8; 4] = b"VSID";
const VERSION: u16 = 1;

/// Bytes per id slot
const SLOT_SIZE: u64 = 8;

/// Append-only id → offset ledger
pub struct IdFile {
    file: File,
    max_id: ValueId,
    force_sync: bool,
}

impl IdFile {
    /// Open an existing id file or create an empty one
    pub fn open(path: &Path, force_sync: bool) -> Result<Self> {
        let file = open_store_file(path)?;
        let file_size = file.metadata()?.len();

        let max_id = if file_size == 0 {
            write_file_header(&file, MAGIC, VERSION)?;
            file.sync_data()?;
            0
        } else {
            check_file_header(&file, file_size, MAGIC, VERSION, "id")?;

            let slots_len = file_size - FILE_HEADER_SIZE;
            if slots_len % SLOT_SIZE != 0 {
                return Err(StoreError::Corruption(format!(
                    "id file slot region is {} bytes, not a multiple of {}",
                    slots_len, SLOT_SIZE
                )));
            }
            ValueId::try_from(slots_len / SLOT_SIZE).map_err(|_| {
                StoreError::Corruption(format!("id file holds too many slots ({} bytes)", slots_len))
            })?
        };

        tracing::debug!("Opened id file {:?} (max id {})", path, max_id);

        Ok(Self {
            file,
            max_id,
            force_sync,
        })
    }

    /// Append `offset` as the next slot and return its id
    pub fn store_offset(&mut self, offset: u64) -> Result<ValueId> {
        if offset == 0 {
            return Err(StoreError::InvalidArgument(
                "offset 0 never addresses a record".to_string(),
            ));
        }

        let id = self.max_id.checked_add(1).ok_or(StoreError::IdSpaceExhausted)?;
        write_all_at(&self.file, &offset.to_be_bytes(), Self::slot_position(id))?;
        self.max_id = id;

        if self.force_sync {
            self.file.sync_data()?;
        }

        Ok(id)
    }

    /// Offset stored for `id`, or `None` if the id was never assigned
    pub fn get_offset(&self, id: ValueId) -> Result<Option<u64>> {
        if id == 0 || id > self.max_id {
            return Ok(None);
        }

        let offset = read_u64_at(&self.file, Self::slot_position(id))?;
        Ok((offset != 0).then_some(offset))
    }

    /// Largest id assigned so far, 0 when empty
    pub fn max_id(&self) -> ValueId {
        self.max_id
    }

    /// Force written slots to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Drop every slot; the next id handed out is 1 again
    pub fn clear(&mut self) -> Result<()> {
        self.file.set_len(FILE_HEADER_SIZE)?;
        self.max_id = 0;
        self.file.sync_all()?;
        Ok(())
    }

    /// Sync and release the file handle
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn slot_position(id: ValueId) -> u64 {
        FILE_HEADER_SIZE + (id as u64 - 1) * SLOT_SIZE
    }
}
