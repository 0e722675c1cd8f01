//! Configuration for valuestore
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Main configuration for a store instance
#[derive(Debug, Clone)]
pub struct StoreConfig {
    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------
    /// Directory holding the store files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {name}.dat     (payload ledger)
    ///     ├── {name}.id      (id → offset ledger)
    ///     └── {name}.hash    (hash → ids index)
    pub data_dir: PathBuf,

    /// File name prefix shared by the three store files
    pub name: String,

    // -------------------------------------------------------------------------
    // Durability
    // -------------------------------------------------------------------------
    /// How often written data is forced to stable storage
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Hash Index
    // -------------------------------------------------------------------------
    /// Number of primary buckets in a freshly created hash file
    pub hash_initial_buckets: u32,

    /// Slots per bucket
    pub hash_bucket_size: u32,

    /// Fill ratio that triggers doubling the bucket count
    pub hash_load_factor: f32,

    // -------------------------------------------------------------------------
    // Open-time Checks
    // -------------------------------------------------------------------------
    /// Run a full `verify()` scan when the store is opened
    pub verify_on_open: bool,

    /// Trailing ids whose hash entries are re-checked on open, on top of
    /// every id the hash file has not recorded as synced
    pub recovery_window: u32,
}

/// Sync strategy: when to fsync the store files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Only on explicit `sync()` / `close()` (fastest)
    Manual,

    /// Every leaf write is flushed before returning (safest, slowest)
    EveryWrite,

    /// The store syncs after every N newly stored values
    EveryNWrites { count: usize },
}

impl SyncStrategy {
    /// Whether leaf files should flush on every write
    pub fn forces_sync(&self) -> bool {
        matches!(self, SyncStrategy::EveryWrite)
    }
}

/// Tuning for the on-disk hash index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashParams {
    pub initial_buckets: u32,
    pub bucket_size: u32,
    pub load_factor: f32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            initial_buckets: 64,
            bucket_size: 8,
            load_factor: 0.75,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let hash = HashParams::default();
        Self {
            data_dir: PathBuf::from("./valuestore_data"),
            name: "values".to_string(),
            sync_strategy: SyncStrategy::Manual,
            hash_initial_buckets: hash.initial_buckets,
            hash_bucket_size: hash.bucket_size,
            hash_load_factor: hash.load_factor,
            verify_on_open: false,
            recovery_window: 1024,
        }
    }
}

impl StoreConfig {
    const DATA_SUFFIX: &'static str = "dat";
    const ID_SUFFIX: &'static str = "id";
    const HASH_SUFFIX: &'static str = "hash";

    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Check that the settings describe a usable store
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(StoreError::Config("store name must not be empty".to_string()));
        }
        if self.name.contains(|c| c == '/' || c == '\\') {
            return Err(StoreError::Config(format!(
                "store name must not contain path separators: {:?}",
                self.name
            )));
        }
        if self.hash_initial_buckets == 0 {
            return Err(StoreError::Config("hash_initial_buckets must be > 0".to_string()));
        }
        if self.hash_bucket_size == 0 {
            return Err(StoreError::Config("hash_bucket_size must be > 0".to_string()));
        }
        if !(self.hash_load_factor > 0.0 && self.hash_load_factor <= 1.0) {
            return Err(StoreError::Config(format!(
                "hash_load_factor must be in (0, 1], got {}",
                self.hash_load_factor
            )));
        }
        if let SyncStrategy::EveryNWrites { count: 0 } = self.sync_strategy {
            return Err(StoreError::Config("EveryNWrites count must be > 0".to_string()));
        }
        Ok(())
    }

    /// Hash index tuning as a single value
    pub fn hash_params(&self) -> HashParams {
        HashParams {
            initial_buckets: self.hash_initial_buckets,
            bucket_size: self.hash_bucket_size,
            load_factor: self.hash_load_factor,
        }
    }

    /// Path of the payload ledger
    pub fn data_path(&self) -> PathBuf {
        self.file_path(Self::DATA_SUFFIX)
    }

    /// Path of the id → offset ledger
    pub fn id_path(&self) -> PathBuf {
        self.file_path(Self::ID_SUFFIX)
    }

    /// Path of the hash index
    pub fn hash_path(&self) -> PathBuf {
        self.file_path(Self::HASH_SUFFIX)
    }

    fn file_path(&self, suffix: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", self.name, suffix))
    }
}

/// Builder for StoreConfig
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the directory holding the store files
    pub fn data_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the file name prefix
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Shorthand for `SyncStrategy::EveryWrite`
    pub fn force_sync(mut self, force: bool) -> Self {
        self.config.sync_strategy = if force {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::Manual
        };
        self
    }

    /// Set the number of primary buckets for a new hash file
    pub fn hash_initial_buckets(mut self, count: u32) -> Self {
        self.config.hash_initial_buckets = count;
        self
    }

    /// Set the number of slots per hash bucket
    pub fn hash_bucket_size(mut self, size: u32) -> Self {
        self.config.hash_bucket_size = size;
        self
    }

    /// Set the load factor that triggers a rehash
    pub fn hash_load_factor(mut self, factor: f32) -> Self {
        self.config.hash_load_factor = factor;
        self
    }

    /// Run a full consistency scan on open
    pub fn verify_on_open(mut self, verify: bool) -> Self {
        self.config.verify_on_open = verify;
        self
    }

    /// Set how many trailing ids are re-checked against the hash index on open
    pub fn recovery_window(mut self, ids: u32) -> Self {
        self.config.recovery_window = ids;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_file_paths_share_prefix() {
        let config = StoreConfig::builder().data_dir("/tmp/store").name("terms").build();

        assert_eq!(config.data_path(), PathBuf::from("/tmp/store/terms.dat"));
        assert_eq!(config.id_path(), PathBuf::from("/tmp/store/terms.id"));
        assert_eq!(config.hash_path(), PathBuf::from("/tmp/store/terms.hash"));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let bad = [
            StoreConfig::builder().name("").build(),
            StoreConfig::builder().name("a/b").build(),
            StoreConfig::builder().hash_initial_buckets(0).build(),
            StoreConfig::builder().hash_bucket_size(0).build(),
            StoreConfig::builder().hash_load_factor(0.0).build(),
            StoreConfig::builder().hash_load_factor(1.5).build(),
            StoreConfig::builder()
                .sync_strategy(SyncStrategy::EveryNWrites { count: 0 })
                .build(),
        ];

        for config in bad {
            assert!(matches!(config.validate(), Err(StoreError::Config(_))), "{:?}", config);
        }
    }

    #[test]
    fn test_force_sync_toggles_strategy() {
        let config = StoreConfig::builder().force_sync(true).build();
        assert!(config.sync_strategy.forces_sync());

        let config = StoreConfig::builder().force_sync(false).build();
        assert_eq!(config.sync_strategy, SyncStrategy::Manual);
    }
}
