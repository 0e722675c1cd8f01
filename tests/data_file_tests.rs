//! Tests for DataFile
//!
//! These tests verify:
//! - Header creation and validation
//! - Appending records and reading them back by offset
//! - Bounds and truncation errors
//! - Clear and reopen

use std::fs::OpenOptions;
use std::path::PathBuf;

use tempfile::TempDir;
use valuestore::storage::DataFile;
use valuestore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_data_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.dat");
    (temp_dir, path)
}

// =============================================================================
// Open/Create Tests
// =============================================================================

#[test]
fn test_open_creates_file_with_header() {
    let (_temp, path) = setup_temp_data_file();

    let data = DataFile::open(&path, false).unwrap();

    assert!(path.exists());
    assert_eq!(data.file_size(), 6);
    assert_eq!(std::fs::read(&path).unwrap(), b"VSDF\x00\x01");
}

#[test]
fn test_open_rejects_bad_magic() {
    let (_temp, path) = setup_temp_data_file();
    std::fs::write(&path, b"NOPE\x00\x01").unwrap();

    let result = DataFile::open(&path, false);

    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

#[test]
fn test_open_rejects_short_header() {
    let (_temp, path) = setup_temp_data_file();
    std::fs::write(&path, b"VS").unwrap();

    let result = DataFile::open(&path, false);

    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

#[test]
fn test_open_rejects_unknown_version() {
    let (_temp, path) = setup_temp_data_file();
    std::fs::write(&path, b"VSDF\x00\x09").unwrap();

    let result = DataFile::open(&path, false);

    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

// =============================================================================
// Store/Get Tests
// =============================================================================

#[test]
fn test_first_record_starts_after_header() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();

    let offset = data.store_data(b"hello").unwrap();

    assert_eq!(offset, 6);
    assert_eq!(data.file_size(), 6 + 4 + 5);
}

#[test]
fn test_record_framing_is_big_endian_length_prefix() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();

    data.store_data(&[0xAA, 0xBB, 0xCC]).unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[6..], &[0, 0, 0, 3, 0xAA, 0xBB, 0xCC]);
}

#[test]
fn test_store_and_get_multiple() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();

    let payloads: Vec<Vec<u8>> = (0..50).map(|i| vec![i as u8; i]).collect();
    let offsets: Vec<u64> = payloads.iter().map(|p| data.store_data(p).unwrap()).collect();

    // Offsets strictly increase
    for pair in offsets.windows(2) {
        assert!(pair[0] < pair[1]);
    }

    for (offset, payload) in offsets.iter().zip(&payloads) {
        assert_eq!(&data.get_data(*offset).unwrap(), payload);
    }
}

#[test]
fn test_empty_payload() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();

    let first = data.store_data(b"").unwrap();
    let second = data.store_data(b"").unwrap();

    assert_eq!(data.get_data(first).unwrap(), Vec::<u8>::new());
    assert_eq!(second, first + 4);
}

#[test]
fn test_force_sync_writes() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, true).unwrap();

    let offset = data.store_data(b"durable").unwrap();

    assert_eq!(data.get_data(offset).unwrap(), b"durable");
}

#[test]
fn test_matches_compares_bytes() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();

    let offset = data.store_data(b"abc").unwrap();

    assert!(data.matches(offset, b"abc").unwrap());
    assert!(!data.matches(offset, b"abd").unwrap());
    assert!(!data.matches(offset, b"abcd").unwrap());
    assert!(!data.matches(offset, b"").unwrap());
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_get_offset_zero_is_out_of_range() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();
    data.store_data(b"x").unwrap();

    let result = data.get_data(0);

    assert!(matches!(result, Err(StoreError::OffsetOutOfRange { offset: 0, .. })));
}

#[test]
fn test_get_past_end_is_out_of_range() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();
    data.store_data(b"x").unwrap();

    let result = data.get_data(1_000);

    assert!(matches!(
        result,
        Err(StoreError::OffsetOutOfRange { offset: 1_000, file_size: 11 })
    ));
}

#[test]
fn test_truncated_record_is_reported() {
    let (_temp, path) = setup_temp_data_file();
    let offset = {
        let mut data = DataFile::open(&path, false).unwrap();
        let offset = data.store_data(b"0123456789").unwrap();
        data.close().unwrap();
        offset
    };

    // Cut the record in half
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(6 + 4 + 5).unwrap();
    drop(file);

    let data = DataFile::open(&path, false).unwrap();
    let result = data.get_data(offset);

    assert!(matches!(result, Err(StoreError::Corruption(_))));
}

// =============================================================================
// Clear / Persistence Tests
// =============================================================================

#[test]
fn test_clear_restarts_offsets() {
    let (_temp, path) = setup_temp_data_file();
    let mut data = DataFile::open(&path, false).unwrap();

    data.store_data(b"first").unwrap();
    data.store_data(b"second").unwrap();
    data.clear().unwrap();

    assert_eq!(data.file_size(), 6);
    assert!(matches!(
        data.get_data(6),
        Err(StoreError::OffsetOutOfRange { .. })
    ));
    assert_eq!(data.store_data(b"third").unwrap(), 6);
}

#[test]
fn test_reopen_appends_after_existing_records() {
    let (_temp, path) = setup_temp_data_file();

    let first = {
        let mut data = DataFile::open(&path, false).unwrap();
        let offset = data.store_data(b"persisted").unwrap();
        data.sync().unwrap();
        data.close().unwrap();
        offset
    };

    let mut data = DataFile::open(&path, false).unwrap();
    assert_eq!(data.get_data(first).unwrap(), b"persisted");

    let second = data.store_data(b"next").unwrap();
    assert_eq!(second, 6 + 4 + 9);
}
