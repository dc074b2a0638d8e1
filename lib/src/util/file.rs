use std::{fs::File, path::Path};

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, Result};

/// Opens a memory mapped file.
pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let map = unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::io(path, e))?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn maps_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[version]\n").unwrap();
        let map = map_file(file.path()).unwrap();
        assert_eq!(&map[..9], b"[version]");
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ogf");
        match map_file(&path) {
            Err(Error::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
