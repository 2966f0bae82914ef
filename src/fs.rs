//! Filesystem access used while mounting an image.
//!
//! Everything goes through the `FileSystem` trait so that images can
//! be mounted out of something else than the host filesystem (an
//! archive, an in-memory buffer...).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{CdError, CdResult};

/// Maximum length of a cue sheet. Anything bigger is certainly not a
/// cue sheet.
pub const CUE_SHEET_MAX_LENGTH: u64 = 1024 * 1024;

/// A seekable reader
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Boxed seekable reader returned by `FileSystem::open`
pub type FileHandle = Box<dyn ReadSeek + Send>;

/// Filesystem abstraction
pub trait FileSystem: Send + Sync {
    /// List the files contained in `dir` (not recursive)
    fn glob(&self, dir: &Path) -> CdResult<Vec<PathBuf>>;

    /// Returns true if `path` is an existing file
    fn exists(&self, path: &Path) -> bool;

    /// Length of the file at `path` in bytes
    fn len(&self, path: &Path) -> CdResult<u64>;

    /// Open `path` for reading
    fn open(&self, path: &Path) -> CdResult<FileHandle>;

    /// Read a whole file, failing if it's bigger than `max_len`
    fn read_to_end(&self, path: &Path, max_len: u64) -> CdResult<Vec<u8>> {
        let len = self.len(path)?;

        if len > max_len {
            return Err(CdError::BadImage {
                path: path.to_path_buf(),
                desc: format!("File too big ({} bytes)", len),
            });
        }

        let mut buf = Vec::with_capacity(len as usize);

        self.open(path)?.read_to_end(&mut buf)?;

        Ok(buf)
    }
}

/// The host filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn glob(&self, dir: &Path) -> CdResult<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;

            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }

        // `read_dir` order is platform-dependent
        files.sort();

        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn len(&self, path: &Path) -> CdResult<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn open(&self, path: &Path) -> CdResult<FileHandle> {
        Ok(Box::new(File::open(path)?))
    }
}

/// In-memory filesystem, mostly useful to mount images generated on
/// the fly
#[derive(Clone, Debug, Default)]
pub struct MemoryFileSystem {
    files: HashMap<PathBuf, Arc<Vec<u8>>>,
}

impl MemoryFileSystem {
    /// Create an empty filesystem
    pub fn new() -> MemoryFileSystem {
        MemoryFileSystem::default()
    }

    /// Add (or replace) a file
    pub fn insert<P: Into<PathBuf>>(&mut self, path: P, contents: Vec<u8>) {
        self.files.insert(path.into(), Arc::new(contents));
    }

    fn get(&self, path: &Path) -> CdResult<&Arc<Vec<u8>>> {
        self.files.get(path).ok_or_else(|| {
            CdError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }
}

/// Shares the file contents between all the handles
struct SharedBuffer(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FileSystem for MemoryFileSystem {
    fn glob(&self, dir: &Path) -> CdResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();

        files.sort();

        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn len(&self, path: &Path) -> CdResult<u64> {
        Ok(self.get(path)?.len() as u64)
    }

    fn open(&self, path: &Path) -> CdResult<FileHandle> {
        let data = self.get(path)?.clone();

        Ok(Box::new(Cursor::new(SharedBuffer(data))))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn std_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track01.bin");

        File::create(&path).unwrap().write_all(&[1, 2, 3]).unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let fs = StdFileSystem;

        assert_eq!(fs.glob(dir.path()).unwrap(), vec![path.clone()]);
        assert!(fs.exists(&path));
        assert!(!fs.exists(&dir.path().join("nope.bin")));
        assert_eq!(fs.len(&path).unwrap(), 3);
        assert_eq!(fs.read_to_end(&path, 16).unwrap(), vec![1, 2, 3]);
        assert!(fs.read_to_end(&path, 2).is_err());
    }

    #[test]
    fn memory_filesystem() {
        let mut fs = MemoryFileSystem::new();

        fs.insert("/img/a.bin", vec![0; 10]);
        fs.insert("/img/b.cue", b"FILE".to_vec());
        fs.insert("/other/c.bin", vec![]);

        assert_eq!(
            fs.glob(Path::new("/img")).unwrap(),
            vec![PathBuf::from("/img/a.bin"), PathBuf::from("/img/b.cue")]
        );
        assert_eq!(fs.len(Path::new("/img/a.bin")).unwrap(), 10);
        assert!(fs.open(Path::new("/img/missing")).is_err());

        let mut s = String::new();
        fs.open(Path::new("/img/b.cue"))
            .unwrap()
            .read_to_string(&mut s)
            .unwrap();
        assert_eq!(s, "FILE");
    }
}
