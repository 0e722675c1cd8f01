//! Storage Module
//!
//! The three append-only files a store is built from.
//!
//! ## Responsibilities
//! - `DataFile`: framed payload records, addressed by byte offset
//! - `IdFile`: dense id → data offset ledger
//! - `HashFile`: disk-resident hash table, hash code → candidate ids
//!
//! Every file starts with a 4-byte magic and a u16 format version so that
//! no record ever begins at offset 0. All integers are big-endian.

mod data_file;
mod hash_file;
mod id_file;
pub(crate) mod io;

use std::fs::{File, OpenOptions};
use std::path::Path;

pub use data_file::DataFile;
pub use hash_file::{HashChainIter, HashFile};
pub use id_file::IdFile;

use crate::error::{Result, StoreError};

/// Dense identifier handed out by the store, starting at 1
pub type ValueId = u32;

/// Magic (4) + Version (2)
pub(crate) const FILE_HEADER_SIZE: u64 = 6;

/// Open a store file for reading and writing, creating it if missing
pub(crate) fn open_store_file(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(file)
}

/// Write the magic/version prefix at the start of `file`
pub(crate) fn write_file_header(file: &File, magic: &[u8; 4], version: u16) -> Result<()> {
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    header[0..4].copy_from_slice(magic);
    header[4..6].copy_from_slice(&version.to_be_bytes());
    io::write_all_at(file, &header, 0)?;
    Ok(())
}

/// Validate the magic/version prefix of an existing file
pub(crate) fn check_file_header(
    file: &File,
    file_size: u64,
    magic: &[u8; 4],
    version: u16,
    kind: &str,
) -> Result<()> {
    if file_size < FILE_HEADER_SIZE {
        return Err(StoreError::Corruption(format!(
            "{} file is {} bytes, shorter than its header",
            kind, file_size
        )));
    }

    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    io::read_exact_at(file, &mut header, 0)?;

    if &header[0..4] != magic {
        return Err(StoreError::Corruption(format!(
            "Invalid {} magic: expected {:?}, got {:?}",
            kind,
            magic,
            &header[0..4]
        )));
    }

    let found = u16::from_be_bytes([header[4], header[5]]);
    if found != version {
        return Err(StoreError::Corruption(format!(
            "Unsupported {} version: {}",
            kind, found
        )));
    }

    Ok(())
}
