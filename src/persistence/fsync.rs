//! fsync helpers.
//!
//! A rename is only durable once the containing directory has been synced,
//! so snapshot writes sync both the temp file and its directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Flushes a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Flushes a directory's entries to disk.
///
/// Only meaningful for directories, though the call itself succeeds on
/// regular files as well.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    OpenOptions::new().read(true).open(dir_path)?.sync_all()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn syncs_written_file_and_its_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut file = File::create(&path).unwrap();
        file.write_all(b"{}").unwrap();

        fsync_file(&file).unwrap();
        fsync_dir(dir.path()).unwrap();
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(fsync_dir(Path::new("/definitely/not/a/real/dir")).is_err());
    }
}
