//! Positioned file I/O
//!
//! Reads and writes at explicit offsets so readers can share a `&File`
//! without racing on a seek cursor.

use std::fs::File;
use std::io;
use std::path::Path;

#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
pub(crate) fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
pub(crate) fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Read a big-endian u32 at `offset`
pub(crate) fn read_u32_at(file: &File, offset: u64) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    read_exact_at(file, &mut buf, offset)?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a big-endian u64 at `offset`
pub(crate) fn read_u64_at(file: &File, offset: u64) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    read_exact_at(file, &mut buf, offset)?;
    Ok(u64::from_be_bytes(buf))
}

/// Flush the directory entry of `path` so a rename over it survives a crash
#[cfg(unix)]
pub(crate) fn fsync_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let dir = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(dir)?;
    dir.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn fsync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsync_dir_of_file_in_temp_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("table.hash");
        std::fs::write(&path, b"x").unwrap();

        fsync_dir(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_fsync_dir_fails_for_missing_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("gone").join("table.hash");

        assert!(fsync_dir(&path).is_err());
    }
}
