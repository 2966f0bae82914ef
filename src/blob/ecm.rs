//! ECM ("Error Code Modeler") decoder.
//!
//! ECM files are disc images with everything that can be recomputed
//! (sync, mode byte, EDC and ECC) stripped out. The file is a sequence
//! of blocks, each one a run of sectors of the same type:
//!
//! | type | stored per sector            | decoded per sector    |
//! |------|------------------------------|-----------------------|
//! | 0    | 1 raw byte                   | 1 byte                |
//! | 1    | address (3) + data (2048)    | Mode 1, 2352 bytes    |
//! | 2    | subheader (4) + data (2048)  | Mode 2 Form 1, 2336   |
//! | 3    | subheader (4) + data (2324)  | Mode 2 Form 2, 2336   |
//!
//! Mode 2 sectors are decoded without their sync and header (2336
//! bytes) since the header isn't stored.

use std::io::{BufReader, Read, Seek, SeekFrom};
use std::sync::Mutex;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace};

use super::{lock, Blob};
use crate::ecc;
use crate::fs::FileHandle;
use crate::sector::SYNC_PATTERN;
use crate::{CdError, CdResult};

/// Magic at the start of every ECM file
pub const ECM_MAGIC: [u8; 4] = *b"ECM\0";

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
struct IndexEntry {
    /// Block type (0 to 3)
    kind: u8,
    /// Number of units (bytes for type 0, sectors otherwise)
    count: u32,
    /// Offset of the block payload in the ECM file
    ecm_offset: u64,
    /// Offset of the block in the decoded image
    logical_offset: u64,
}

impl IndexEntry {
    /// (stored size, decoded size, offset of the decoded data in the
    /// reconstructed 2352 byte sector)
    fn geometry(&self) -> (u64, u64, usize) {
        match self.kind {
            0 => (1, 1, 0),
            1 => (2051, 2352, 0),
            2 => (2052, 2336, 16),
            _ => (2328, 2336, 16),
        }
    }

    fn logical_len(&self) -> u64 {
        self.geometry().1 * self.count as u64
    }
}

/// Reader state, shared by the index lookup and the read that follows
struct Decoder {
    file: FileHandle,
    /// Index entry used by the previous read
    last_index: usize,
    /// Scratch sector
    sector: [u8; 2352],
}

/// Random-access reader over an ECM file
pub struct EcmBlob {
    index: Vec<IndexEntry>,
    len: u64,
    /// EDC of the whole decoded image, as stored at the end of the
    /// file. Not verified.
    edc: u32,
    decoder: Mutex<Decoder>,
}

impl EcmBlob {
    /// Returns true if `file` starts with the ECM magic
    pub fn has_magic(file: &mut FileHandle) -> bool {
        let mut magic = [0; 4];

        file.seek(SeekFrom::Start(0)).is_ok()
            && file.read_exact(&mut magic).is_ok()
            && magic == ECM_MAGIC
    }

    /// Parse the block index of `file`
    pub fn load(file: FileHandle) -> CdResult<EcmBlob> {
        let mut reader = BufReader::new(file);

        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| CdError::BadEcm("file too short".into()))?;

        if magic != ECM_MAGIC {
            return Err(CdError::BadEcm("bad magic".into()));
        }

        let mut pos = 4u64;
        let mut logical_offset = 0u64;
        let mut index = Vec::new();

        loop {
            let (kind, n, header_len) = read_block_header(&mut reader)?;
            pos += header_len;

            if n == 0xffff_ffff {
                break;
            }

            if n >= 1 << 32 {
                return Err(CdError::BadEcm(format!("block count too large ({})", n)));
            }

            let entry = IndexEntry {
                kind,
                count: (n + 1) as u32,
                ecm_offset: pos,
                logical_offset,
            };

            let stored = entry.geometry().0 * entry.count as u64;

            reader.seek_relative(stored as i64)?;
            pos += stored;
            logical_offset += entry.logical_len();

            index.push(entry);
        }

        let edc = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| CdError::BadEcm("missing trailing EDC".into()))?;

        debug!(
            "ECM index: {} blocks, {} decoded bytes",
            index.len(),
            logical_offset
        );

        Ok(EcmBlob {
            index,
            len: logical_offset,
            edc,
            decoder: Mutex::new(Decoder {
                file: reader.into_inner(),
                last_index: 0,
                sector: [0; 2352],
            }),
        })
    }

    /// EDC stored at the end of the ECM file
    pub fn stored_edc(&self) -> u32 {
        self.edc
    }

    /// Find the index entry containing `offset`, trying the last entry
    /// used and its successor before falling back to a binary search.
    fn find(&self, offset: u64, mut last: usize) -> usize {
        let n = self.index.len();

        for _ in 0..2 {
            if last >= n {
                break;
            }

            let e = &self.index[last];

            if last == n - 1 {
                if offset >= e.logical_offset {
                    return last;
                }
                break;
            }

            let next = &self.index[last + 1];

            if offset >= e.logical_offset && offset < next.logical_offset {
                return last;
            }

            last += 1;
        }

        trace!("ECM index lookup for offset {}", offset);

        self.index
            .partition_point(|e| e.logical_offset <= offset)
            .saturating_sub(1)
    }
}

/// Read a variable length block header. Returns the block type, the
/// raw count and the number of bytes consumed.
fn read_block_header<R: Read>(reader: &mut R) -> CdResult<(u8, u64, u64)> {
    let truncated = |_| CdError::BadEcm("truncated block header".into());

    let mut b = reader.read_u8().map_err(truncated)?;
    let mut bytes = 1;

    let kind = b & 3;
    let mut n = ((b >> 2) & 0x1f) as u64;
    let mut bits = 5;

    while b & 0x80 != 0 {
        if bytes == 5 {
            return Err(CdError::BadEcm("block header too long".into()));
        }

        b = reader.read_u8().map_err(truncated)?;
        bytes += 1;

        n |= ((b & 0x7f) as u64) << bits;
        bits += 7;
    }

    Ok((kind, n, bytes))
}

/// Rebuild the fields ECM stripped from `sector`
fn reconstruct(sector: &mut [u8; 2352], kind: u8) {
    sector[..12].copy_from_slice(&SYNC_PATTERN);

    match kind {
        1 => {
            sector[15] = 1;
            ecc::ecm_mode1(sector);
        }
        2 | 3 => {
            sector[15] = 2;
            // Only the second copy of the subheader is stored
            sector.copy_within(0x14..0x18, 0x10);

            if kind == 2 {
                ecc::ecm_mode2_form1(sector);
            } else {
                ecc::ecm_mode2_form2(sector);
            }
        }
        _ => (),
    }
}

/// Fill `buf` from `file`, returning false on a short read
fn fill(file: &mut FileHandle, buf: &mut [u8]) -> CdResult<bool> {
    let mut done = 0;

    while done < buf.len() {
        let n = file.read(&mut buf[done..])?;

        if n == 0 {
            return Ok(false);
        }

        done += n;
    }

    Ok(true)
}

impl Blob for EcmBlob {
    fn read(&self, mut offset: u64, buf: &mut [u8]) -> CdResult<usize> {
        let mut decoder = lock(&self.decoder);
        let decoder = &mut *decoder;
        let mut completed = 0;

        while completed < buf.len() && offset < self.len {
            let i = self.find(offset, decoder.last_index);
            let e = self.index[i];

            decoder.last_index = i;

            let block_offset = offset - e.logical_offset;
            let remaining = (buf.len() - completed) as u64;
            let out = &mut buf[completed..];

            let done = if e.kind == 0 {
                let todo = remaining.min(e.count as u64 - block_offset) as usize;

                decoder
                    .file
                    .seek(SeekFrom::Start(e.ecm_offset + block_offset))?;

                if !fill(&mut decoder.file, &mut out[..todo])? {
                    break;
                }

                todo
            } else {
                let (stored, decoded, out_offset) = e.geometry();
                let sector_no = block_offset / decoded;
                let into = (block_offset % decoded) as usize;
                let todo = remaining.min(decoded - into as u64) as usize;

                decoder
                    .file
                    .seek(SeekFrom::Start(e.ecm_offset + stored * sector_no))?;

                let sector = &mut decoder.sector;

                let ok = if e.kind == 1 {
                    fill(&mut decoder.file, &mut sector[12..15])?
                        && fill(&mut decoder.file, &mut sector[16..2064])?
                } else {
                    let end = 0x14 + stored as usize;

                    fill(&mut decoder.file, &mut sector[0x14..end])?
                };

                if !ok {
                    break;
                }

                reconstruct(sector, e.kind);

                let start = out_offset + into;
                out[..todo].copy_from_slice(&sector[start..start + todo]);

                todo
            };

            completed += done;
            offset += done as u64;
        }

        Ok(completed)
    }

    fn len(&self) -> u64 {
        self.len
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::sector::write_header;
    use std::io::Cursor;

    /// Encode a block header
    pub(crate) fn block_header(kind: u8, count: u32) -> Vec<u8> {
        let mut n = count.wrapping_sub(1) as u64;
        let mut out = Vec::new();

        let mut b = (((n & 0x1f) as u8) << 2) | kind;
        n >>= 5;

        while n != 0 {
            out.push(b | 0x80);
            b = (n & 0x7f) as u8;
            n >>= 7;
        }
        out.push(b);

        out
    }

    /// Terminator: the count field is 0xffffffff
    pub(crate) fn end_of_blocks() -> Vec<u8> {
        vec![0xfc, 0xff, 0xff, 0xff, 0x3f]
    }

    /// A valid Mode 1 sector at `lba` filled with a pattern
    pub(crate) fn mode1_sector(lba: i32) -> [u8; 2352] {
        let mut s = [0u8; 2352];

        write_header(array_mut_ref![s, 0, 16], lba, 1);

        for (i, b) in s[16..2064].iter_mut().enumerate() {
            *b = (i as i32 * 3 + lba * 7) as u8;
        }

        ecc::ecm_mode1(&mut s);

        s
    }

    /// ECM-encode a list of Mode 1 sectors as a single type 1 block
    pub(crate) fn encode_mode1(sectors: &[[u8; 2352]]) -> Vec<u8> {
        let mut out = ECM_MAGIC.to_vec();

        out.extend(block_header(1, sectors.len() as u32));

        for s in sectors {
            out.extend_from_slice(&s[12..15]);
            out.extend_from_slice(&s[16..2064]);
        }

        out.extend(end_of_blocks());
        out.extend_from_slice(&[0, 0, 0, 0]);

        out
    }

    fn load(data: Vec<u8>) -> CdResult<EcmBlob> {
        EcmBlob::load(Box::new(Cursor::new(data)))
    }

    #[test]
    fn header_encoding() {
        let mut r: &[u8] = &end_of_blocks();
        assert_eq!(read_block_header(&mut r).unwrap(), (0, 0xffff_ffff, 5));

        let h = block_header(1, 10);
        assert_eq!(h, vec![0x25]);

        let h = block_header(2, 1000);
        let mut r: &[u8] = &h;
        assert_eq!(read_block_header(&mut r).unwrap(), (2, 999, 2));

        let mut r: &[u8] = &[0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(read_block_header(&mut r).is_err());
    }

    #[test]
    fn ten_mode1_sectors() {
        let sectors: Vec<[u8; 2352]> = (0..10).map(mode1_sector).collect();
        let blob = load(encode_mode1(&sectors)).unwrap();

        assert_eq!(blob.len(), 10 * 2352);

        // Out of order to exercise the index cache
        for &i in &[0usize, 9, 3, 4, 5, 1] {
            let mut buf = [0u8; 2352];

            assert_eq!(blob.read(i as u64 * 2352, &mut buf).unwrap(), 2352);
            assert!(buf[..] == sectors[i][..]);
        }

        // Read straddling two sectors
        let mut buf = [0u8; 100];
        assert_eq!(blob.read(2352 * 2 - 50, &mut buf).unwrap(), 100);
        assert!(buf[..50] == sectors[1][2302..]);
        assert!(buf[50..] == sectors[2][..50]);

        // Past the end
        assert_eq!(blob.read(10 * 2352 - 10, &mut buf).unwrap(), 10);
    }

    #[test]
    fn mixed_blocks() {
        let mut file = ECM_MAGIC.to_vec();

        file.extend(block_header(0, 5));
        file.extend_from_slice(&[1, 2, 3, 4, 5]);

        // One Mode 2 Form 2 sector
        let mut form2 = [0u8; 2352];
        form2[0x10..0x18].copy_from_slice(&[0, 0, 0x20, 0, 0, 0, 0x20, 0]);
        for (i, b) in form2[0x18..0x18 + 2324].iter_mut().enumerate() {
            *b = i as u8;
        }
        ecc::ecm_mode2_form2(&mut form2);

        file.extend(block_header(3, 1));
        file.extend_from_slice(&form2[0x14..0x14 + 2328]);

        file.extend(block_header(0, 3));
        file.extend_from_slice(&[6, 7, 8]);

        file.extend(end_of_blocks());
        file.extend_from_slice(&0x1234_5678u32.to_le_bytes());

        let blob = load(file).unwrap();

        assert_eq!(blob.len(), 5 + 2336 + 3);
        assert_eq!(blob.stored_edc(), 0x1234_5678);

        let mut buf = vec![0u8; 2336];
        assert_eq!(blob.read(5, &mut buf).unwrap(), 2336);
        assert!(buf[..] == form2[16..]);

        let mut buf = [0u8; 8];
        assert_eq!(blob.read(2336 + 5 - 2, &mut buf).unwrap(), 5);
        assert_eq!(&buf[2..5], &[6, 7, 8]);

        let mut buf = [0u8; 3];
        assert_eq!(blob.read(0, &mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn bad_files() {
        assert!(matches!(load(b"ECN\0".to_vec()), Err(CdError::BadEcm(_))));
        assert!(matches!(load(b"EC".to_vec()), Err(CdError::BadEcm(_))));

        // Missing terminator
        let mut file = ECM_MAGIC.to_vec();
        file.extend(block_header(0, 2));
        file.extend_from_slice(&[1, 2]);
        assert!(matches!(load(file), Err(CdError::BadEcm(_))));

        let mut h: FileHandle = Box::new(Cursor::new(ECM_MAGIC.to_vec()));
        assert!(EcmBlob::has_magic(&mut h));
    }
}
