//! # valuestore
//!
//! An embedded content-addressable value store with:
//! - Dense ids (1, 2, 3, ...) for every distinct payload
//! - Deduplicating inserts: storing a payload twice returns the same id
//! - Reverse lookup (payload → id) through a disk-resident hash index
//! - Append-only files that stay well-formed across crashes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        DataStore                             │
//! │        store_data / get_data / get_id / sync / clear         │
//! │            (Single Writer / Multi Reader, RwLock)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        │              │              │
//!        ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌────────────┐
//!  │ DataFile  │  │  IdFile   │  │  HashFile  │
//!  │ len+bytes │◄─│ id→offset │◄─│ hash→[ids] │
//!  │ (.dat)    │  │ (.id)     │  │ (.hash)    │
//!  └───────────┘  └───────────┘  └────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use valuestore::{DataStore, StoreConfig};
//!
//! let config = StoreConfig::builder().data_dir("/tmp/values").name("terms").build();
//! let store = DataStore::open(config)?;
//!
//! let id = store.store_data(b"hello")?;
//! assert_eq!(store.store_data(b"hello")?, id);
//! assert_eq!(store.get_id(b"hello")?, Some(id));
//! assert_eq!(store.get_data(id)?.as_deref(), Some(&b"hello"[..]));
//!
//! store.close()?;
//! # Ok::<(), valuestore::StoreError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod hash;

pub mod storage;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::{StoreConfig, SyncStrategy};
pub use hash::{Crc32Hasher, PayloadHasher};
pub use storage::ValueId;
pub use store::{DataStore, StoreStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of valuestore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
