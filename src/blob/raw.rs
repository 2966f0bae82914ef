//! Plain files read through a shared buffered cursor

use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use super::{lock, Blob};
use crate::fs::{FileHandle, FileSystem};
use crate::CdResult;

/// Size of the read buffer: two seconds of audio
const BUFFER_SIZE: usize = 2352 * 75 * 2;

struct Cursor {
    reader: BufReader<FileHandle>,
    /// Current position in the file
    pos: u64,
}

/// Blob reading straight from a file, optionally starting at `base`
pub struct RawFileBlob {
    cursor: Mutex<Cursor>,
    base: u64,
    len: u64,
}

impl RawFileBlob {
    /// Blob covering `len` bytes of `file` starting at `base`
    pub fn new(file: FileHandle, base: u64, len: u64) -> RawFileBlob {
        RawFileBlob {
            cursor: Mutex::new(Cursor {
                reader: BufReader::with_capacity(BUFFER_SIZE, file),
                pos: 0,
            }),
            base,
            len,
        }
    }

    /// Open the whole file at `path`
    pub fn open(fs: &dyn FileSystem, path: &Path) -> CdResult<RawFileBlob> {
        let len = fs.len(path)?;
        let file = fs.open(path)?;

        Ok(RawFileBlob::new(file, 0, len))
    }
}

impl Blob for RawFileBlob {
    fn read(&self, offset: u64, buf: &mut [u8]) -> CdResult<usize> {
        if offset >= self.len {
            return Ok(0);
        }

        let todo = (buf.len() as u64).min(self.len - offset) as usize;
        let buf = &mut buf[..todo];

        let mut cursor = lock(&self.cursor);
        let target = self.base + offset;

        if cursor.pos != target {
            cursor.reader.seek(SeekFrom::Start(target))?;
            cursor.pos = target;
        }

        let mut done = 0;

        while done < todo {
            let n = cursor.reader.read(&mut buf[done..])?;

            if n == 0 {
                break;
            }

            done += n;
            cursor.pos += n as u64;
        }

        Ok(done)
    }

    fn len(&self) -> u64 {
        self.len
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn blob(data: Vec<u8>, base: u64, len: u64) -> RawFileBlob {
        RawFileBlob::new(Box::new(IoCursor::new(data)), base, len)
    }

    #[test]
    fn random_access() {
        let data: Vec<u8> = (0..=255).collect();
        let b = blob(data, 0, 256);
        let mut buf = [0u8; 4];

        assert_eq!(b.read(100, &mut buf).unwrap(), 4);
        assert_eq!(buf, [100, 101, 102, 103]);

        // Backwards
        assert_eq!(b.read(3, &mut buf).unwrap(), 4);
        assert_eq!(buf, [3, 4, 5, 6]);

        // Sequential
        assert_eq!(b.read(7, &mut buf).unwrap(), 4);
        assert_eq!(buf, [7, 8, 9, 10]);

        assert_eq!(b.read(254, &mut buf).unwrap(), 2);
        assert_eq!(b.read(256, &mut buf).unwrap(), 0);
    }

    #[test]
    fn base_offset() {
        let data: Vec<u8> = (0..32).collect();
        let b = blob(data, 8, 16);
        let mut buf = [0u8; 4];

        assert_eq!(b.len(), 16);
        assert_eq!(b.read(0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [8, 9, 10, 11]);
        assert_eq!(b.read(14, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[22, 23]);
    }

    #[test]
    fn open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");

        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let b = RawFileBlob::open(&crate::fs::StdFileSystem, &path).unwrap();
        let mut buf = [0u8; 8];

        assert_eq!(b.len(), 3);
        assert_eq!(b.read(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}
