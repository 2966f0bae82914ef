//! Byte sources backing the tracks of a disc.
//!
//! A blob is a positional reader over one file referenced by the disc
//! image. The sector jobs only ever see `Arc<dyn Blob>`, the storage
//! format (plain file, ECM, WAVE, decoded audio) is hidden behind
//! the trait.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{CdError, CdResult};

pub use self::ecm::EcmBlob;
pub use self::raw::RawFileBlob;
pub use self::wave::WaveBlob;

pub(crate) mod ecm;
mod raw;
mod wave;

/// Positional byte reader
pub trait Blob: Send + Sync {
    /// Read up to `buf.len()` bytes at `offset`. Returns the number of
    /// bytes actually read, which can be less than requested at the
    /// end of the blob.
    fn read(&self, offset: u64, buf: &mut [u8]) -> CdResult<usize>;

    /// Length of the blob in bytes
    fn len(&self) -> u64;

    /// Returns true if the blob contains no data
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fill `buf` completely or fail with `CdError::ShortRead`
pub fn read_exact(blob: &dyn Blob, offset: u64, buf: &mut [u8]) -> CdResult<()> {
    let got = blob.read(offset, buf)?;

    if got != buf.len() {
        return Err(CdError::ShortRead {
            expected: buf.len(),
            got,
        });
    }

    Ok(())
}

/// Lock a blob's state. A panic while reading can't leave the state
/// inconsistent (the position is always re-checked before reading)
/// so poisoning is ignored.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Blob wrapper that pretends its source is `len` bytes long: reads
/// past the end of the source return zeroes instead of failing.
pub struct ZeroPadBlob {
    source: Arc<dyn Blob>,
    len: u64,
}

impl ZeroPadBlob {
    /// Wrap `source`, padding it to `len` bytes
    pub fn new(source: Arc<dyn Blob>, len: u64) -> ZeroPadBlob {
        ZeroPadBlob { source, len }
    }
}

impl Blob for ZeroPadBlob {
    fn read(&self, offset: u64, buf: &mut [u8]) -> CdResult<usize> {
        let available = self.len.saturating_sub(offset);
        let todo = (buf.len() as u64).min(available) as usize;

        let (data, padding) = buf.split_at_mut(todo);

        padding.fill(0);

        if !data.is_empty() {
            let got = self.source.read(offset, data)?;

            data[got..].fill(0);
        }

        Ok(buf.len())
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// In-memory blob, used for decoded audio
pub struct PcmBufferBlob {
    data: Vec<u8>,
}

impl PcmBufferBlob {
    /// Wrap raw PCM data
    pub fn new(data: Vec<u8>) -> PcmBufferBlob {
        PcmBufferBlob { data }
    }
}

impl Blob for PcmBufferBlob {
    fn read(&self, offset: u64, buf: &mut [u8]) -> CdResult<usize> {
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }

        let src = &self.data[offset as usize..];
        let n = src.len().min(buf.len());

        buf[..n].copy_from_slice(&src[..n]);

        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn source(len: usize) -> Arc<dyn Blob> {
        Arc::new(PcmBufferBlob::new((1..=len as u8).collect()))
    }

    #[test]
    fn pcm_buffer() {
        let b = source(10);
        let mut buf = [0u8; 4];

        assert_eq!(b.len(), 10);
        assert_eq!(b.read(8, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[9, 10]);
        assert_eq!(b.read(10, &mut buf).unwrap(), 0);
        assert!(matches!(
            read_exact(&*b, 8, &mut buf),
            Err(CdError::ShortRead { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn zero_pad() {
        let l = 10;
        let pad = ZeroPadBlob::new(source(l), l as u64);
        let mut buf = [0xaau8; 8];

        // [L-3, L+5)
        assert_eq!(pad.read(l as u64 - 3, &mut buf).unwrap(), 8);
        assert_eq!(buf, [8, 9, 10, 0, 0, 0, 0, 0]);

        // Entirely past the end
        let mut buf = [0xaau8; 4];
        assert_eq!(pad.read(100, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn zero_pad_longer_than_source() {
        // Logical length bigger than the actual source
        let pad = ZeroPadBlob::new(source(4), 8);
        let mut buf = [0xaau8; 8];

        assert_eq!(pad.read(0, &mut buf).unwrap(), 8);
        assert_eq!(buf, [1, 2, 3, 4, 0, 0, 0, 0]);
    }
}
