//! Atomic "temp file in the same directory, then rename" writes, shared by
//! the daily cache (C2), the state store (C8), and the renderer contract
//! (C7). Grounded in the teacher's `ohlc.rs` temp-file pattern and
//! `original_source/app/services/renderer.py::_write_file_atomic`.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes `bytes` to `target` via a sibling temp file + rename so readers
/// never observe a partial write. The temp file is always in `target`'s
/// parent directory so the rename is a same-filesystem, atomic POSIX
/// operation.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.as_file_mut().write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_atomic_str(target: &Path, contents: &str) -> std::io::Result<()> {
    write_atomic(target, contents.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_is_visible_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        write_atomic_str(&target, r#"{"a":1}"#).unwrap();
        let read_back = std::fs::read_to_string(&target).unwrap();
        assert_eq!(read_back, r#"{"a":1}"#);
    }

    #[test]
    fn overwrite_replaces_contents_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        write_atomic_str(&target, "first").unwrap();
        write_atomic_str(&target, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
    }
}
