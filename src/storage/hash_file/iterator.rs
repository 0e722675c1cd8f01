//! Hash Chain Iterator
//!
//! Walks one collision chain bucket by bucket, yielding the ids whose
//! stored hash equals the requested one.

use crate::error::{Result, StoreError};
use crate::storage::ValueId;

use super::HashFile;

/// Lazy iterator over the ids stored under one hash code
///
/// Only one bucket is held in memory at a time. After an error the iterator
/// is exhausted.
pub struct HashChainIter<'a> {
    table: &'a HashFile,
    hash: u32,
    /// Bucket to load once the current slots run out
    next_bucket: Option<u32>,
    slots: std::vec::IntoIter<(u32, ValueId)>,
    buckets_read: u64,
    done: bool,
}

impl<'a> HashChainIter<'a> {
    pub(super) fn new(table: &'a HashFile, hash: u32, primary: u32) -> Self {
        Self {
            table,
            hash,
            next_bucket: Some(primary),
            slots: Vec::new().into_iter(),
            buckets_read: 0,
            done: false,
        }
    }

    fn load_next_bucket(&mut self) -> Result<bool> {
        let Some(bucket_no) = self.next_bucket.take() else {
            return Ok(false);
        };

        self.buckets_read += 1;
        if self.buckets_read > self.table.total_buckets() {
            return Err(StoreError::Corruption(format!(
                "overflow chain for hash {:#010x} loops",
                self.hash
            )));
        }

        let bucket = self.table.read_bucket(bucket_no)?;
        self.next_bucket = (bucket.overflow != 0).then_some(bucket.overflow);
        self.slots = bucket.slots.into_iter();
        Ok(true)
    }
}

impl<'a> Iterator for HashChainIter<'a> {
    type Item = Result<ValueId>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.slots.next() {
                // Empty slot: nothing was ever stored past this point
                Some((_, 0)) => self.done = true,
                Some((hash, id)) if hash == self.hash => return Some(Ok(id)),
                Some(_) => {}
                None => match self.load_next_bucket() {
                    Ok(true) => {}
                    Ok(false) => self.done = true,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
            }
        }
        None
    }
}
