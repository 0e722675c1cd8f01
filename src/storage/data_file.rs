//! Data File
//!
//! Append-only ledger of payload records.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header (6 bytes)                        │
//! │   Magic: "VSDF" (4) | Version: u16 (2)  │
//! ├─────────────────────────────────────────┤
//! │ Record 1                                │
//! │ ┌──────────────┬──────────────────────┐ │
//! │ │ Len: u32 (4) │ Payload (Len bytes)  │ │
//! │ └──────────────┴──────────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2 ...                            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The offset of a record is the position of its length prefix. The header
//! guarantees no record starts at offset 0.

use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};

use super::io::{read_exact_at, read_u32_at, write_all_at};
use super::{check_file_header, open_store_file, write_file_header, FILE_HEADER_SIZE};
use crate::error::{Result, StoreError};

const MAGIC: &[u8; 4] = b"VSDF";
const VERSION: u16 = 1;

/// Length prefix size in bytes
const LEN_SIZE: u64 = 4;

/// Append-only payload ledger
pub struct DataFile {
    path: PathBuf,
    file: File,
    /// Logical end of file; next record is written here
    file_size: u64,
    /// fsync after every append
    force_sync: bool,
}

impl DataFile {
    /// Open an existing data file or create an empty one
    pub fn open(path: &Path, force_sync: bool) -> Result<Self> {
        let file = open_store_file(path)?;
        let mut file_size = file.metadata()?.len();

        if file_size == 0 {
            write_file_header(&file, MAGIC, VERSION)?;
            file.sync_data()?;
            file_size = FILE_HEADER_SIZE;
        } else {
            check_file_header(&file, file_size, MAGIC, VERSION, "data")?;
        }

        tracing::debug!("Opened data file {:?} ({} bytes)", path, file_size);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_size,
            force_sync,
        })
    }

    /// Append a payload and return the offset of its record
    pub fn store_data(&mut self, payload: &[u8]) -> Result<u64> {
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::PayloadTooLarge(payload.len()))?;

        let mut record = BytesMut::with_capacity(LEN_SIZE as usize + payload.len());
        record.put_u32(len);
        record.put_slice(payload);

        let offset = self.file_size;
        write_all_at(&self.file, &record, offset)?;
        self.file_size += record.len() as u64;

        if self.force_sync {
            self.file.sync_data()?;
        }

        Ok(offset)
    }

    /// Read the payload of the record starting at `offset`
    pub fn get_data(&self, offset: u64) -> Result<Vec<u8>> {
        let len = self.record_len(offset)?;
        let mut payload = vec![0u8; len as usize];
        read_exact_at(&self.file, &mut payload, offset + LEN_SIZE)?;
        Ok(payload)
    }

    /// Validate the framing of the record at `offset` and return its payload length
    pub fn record_len(&self, offset: u64) -> Result<u32> {
        if offset < FILE_HEADER_SIZE || offset + LEN_SIZE > self.file_size {
            return Err(StoreError::OffsetOutOfRange {
                offset,
                file_size: self.file_size,
            });
        }

        let len = read_u32_at(&self.file, offset)?;
        let end = offset + LEN_SIZE + len as u64;
        if end > self.file_size {
            return Err(StoreError::Corruption(format!(
                "record at offset {} of {:?} ends at {}, past end of file ({})",
                offset, self.path, end, self.file_size
            )));
        }

        Ok(len)
    }

    /// Compare the record at `offset` with `payload` byte for byte
    ///
    /// The body is only read when the lengths agree.
    pub fn matches(&self, offset: u64, payload: &[u8]) -> Result<bool> {
        let len = self.record_len(offset)?;
        if len as usize != payload.len() {
            return Ok(false);
        }

        let mut stored = vec![0u8; len as usize];
        read_exact_at(&self.file, &mut stored, offset + LEN_SIZE)?;
        Ok(stored == payload)
    }

    /// Current size of the file, header included
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Force written records to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Drop every record, keeping only the header
    pub fn clear(&mut self) -> Result<()> {
        self.file.set_len(FILE_HEADER_SIZE)?;
        self.file_size = FILE_HEADER_SIZE;
        self.file.sync_all()?;
        Ok(())
    }

    /// Sync and release the file handle
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
