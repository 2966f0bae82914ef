//! SBI files: Q subchannel patches for copy-protected discs.
//!
//! Some PlayStation discs (LibCrypt) deliberately carry corrupted Q
//! subchannel data in a handful of sectors. Regular BIN dumps lose
//! that, SBI files list the sectors and their original Q bytes.

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};

use crate::disc::Disc;
use crate::fs::FileSystem;
use crate::msf::{Msf, LBA_MSF_OFFSET};
use crate::reader::DiscSectorReader;
use crate::subchannel::write_crc;
use crate::synth::{GapSector, PatchQ, SectorJob};
use crate::{CdError, CdResult, TrackType};

/// "SBI\0"
pub const SBI_MAGIC: u32 = 0x0049_4253;

/// SBI files are tiny, anything bigger than this is not an SBI file
const SBI_MAX_LENGTH: u64 = 1024 * 1024;

/// Patch for one sector. `None` bytes are left untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SbiRecord {
    /// Absolute sector index (LBA + 150)
    pub aba: u32,
    /// Q bytes 0 to 9
    pub patch: [Option<u8>; 10],
}

impl SbiRecord {
    /// Patch `q` in place
    pub fn apply(&self, q: &mut [u8; 12]) {
        for (b, p) in q.iter_mut().zip(self.patch.iter()) {
            if let Some(p) = p {
                *b = *p;
            }
        }
    }
}

/// Contents of an SBI file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SbiPatches {
    /// Patched sectors, in file order
    pub records: Vec<SbiRecord>,
}

impl SbiPatches {
    /// Parse the contents of an SBI file
    pub fn parse(data: &[u8]) -> CdResult<SbiPatches> {
        let mut r = Cursor::new(data);

        let magic = r
            .read_u32::<LittleEndian>()
            .map_err(|_| CdError::BadSbi("file too short".into()))?;

        if magic != SBI_MAGIC {
            return Err(CdError::BadSbi("bad magic".into()));
        }

        let mut records = Vec::new();

        loop {
            let remaining = data.len() as u64 - r.position();

            if remaining == 0 {
                break;
            }

            if remaining < 4 {
                return Err(CdError::BadSbi("truncated record".into()));
            }

            let mut head = [0u8; 4];
            r.read_exact(&mut head)?;

            let aba = match Msf::from_bcd(head[0], head[1], head[2]) {
                Some(msf) => msf.sector_index(),
                None => {
                    return Err(CdError::BadSbi(format!(
                        "invalid timestamp {:02x}:{:02x}:{:02x}",
                        head[0], head[1], head[2]
                    )))
                }
            };

            let range = match head[3] {
                1 => 0..10,
                2 => 3..6,
                3 => 7..10,
                t => return Err(CdError::BadSbi(format!("unknown record type {}", t))),
            };

            let mut patch = [None; 10];

            for slot in &mut patch[range] {
                let b = r
                    .read_u8()
                    .map_err(|_| CdError::BadSbi("truncated record".into()))?;

                *slot = Some(b);
            }

            records.push(SbiRecord { aba, patch });
        }

        Ok(SbiPatches { records })
    }

    /// Load an SBI file
    pub fn load(fs: &dyn FileSystem, path: &Path) -> CdResult<SbiPatches> {
        let data = fs.read_to_end(path, SBI_MAX_LENGTH)?;

        SbiPatches::parse(&data)
    }

    /// Replace the Q subchannel of the patched sectors of `disc`. With
    /// `as_mednafen` the patched Q gets a valid CRC which is then
    /// inverted, so that the sector fails the CRC check like on the
    /// real disc. Otherwise the original CRC is kept.
    ///
    /// Returns the number of sectors patched.
    pub fn apply(&self, disc: &mut Disc, as_mednafen: bool) -> CdResult<usize> {
        let mut count = 0;

        // Each patch is installed before the next record is read so that
        // records for the same sector stack up
        for record in &self.records {
            let lba = record.aba as i32 - LBA_MSF_OFFSET;
            let index = record.aba as usize;

            if index >= disc.sectors.len() {
                warn!("SBI patch for LBA {} is out of the disc, ignoring", lba);
                continue;
            }

            let mut q = [0u8; 12];
            DiscSectorReader::new(disc).read_subq_raw(lba, &mut q)?;

            record.apply(&mut q);

            if as_mednafen {
                write_crc(&mut q);
                q[10] ^= 0xff;
                q[11] ^= 0xff;
            }

            let placeholder = SectorJob::Gap(GapSector {
                track_type: TrackType::Audio,
                q: Default::default(),
                pause: false,
            });

            let original = std::mem::replace(&mut disc.sectors[index], placeholder);

            disc.sectors[index] = SectorJob::PatchQ(PatchQ {
                original: Box::new(original),
                q,
            });

            count += 1;
        }

        debug!("Applied {} SBI patches", count);

        disc.sbi = Some(self.clone());

        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Build an SBI file
    pub(crate) fn build_sbi(records: &[(u8, u8, u8, u8, &[u8])]) -> Vec<u8> {
        let mut out = b"SBI\0".to_vec();

        for &(m, s, f, kind, payload) in records {
            out.extend_from_slice(&[m, s, f, kind]);
            out.extend_from_slice(payload);
        }

        out
    }

    #[test]
    fn parse_records() {
        let q = [0x41, 0x01, 0x01, 0x07, 0x06, 0x05, 0x00, 0x23, 0x08, 0x05];
        let data = build_sbi(&[
            (0x03, 0x08, 0x05, 1, &q[..]),
            (0x03, 0x08, 0x10, 2, &[0x11, 0x12, 0x13][..]),
            (0x00, 0x02, 0x00, 3, &[0x21, 0x22, 0x23][..]),
        ]);

        let sbi = SbiPatches::parse(&data).unwrap();

        assert_eq!(sbi.records.len(), 3);
        assert_eq!(sbi.records[0].aba, 3 * 4500 + 8 * 75 + 5);
        assert_eq!(sbi.records[0].patch[9], Some(0x05));

        assert_eq!(
            sbi.records[1].patch,
            [None, None, None, Some(0x11), Some(0x12), Some(0x13), None, None, None, None]
        );
        assert_eq!(sbi.records[2].aba, 150);

        let mut raw = [0u8; 12];
        sbi.records[2].apply(&mut raw);
        assert_eq!(raw, [0, 0, 0, 0, 0, 0, 0, 0x21, 0x22, 0x23, 0, 0]);
    }

    #[test]
    fn broken_files() {
        assert!(matches!(SbiPatches::parse(b"SBI"), Err(CdError::BadSbi(_))));
        assert!(matches!(SbiPatches::parse(b"SBJ\0"), Err(CdError::BadSbi(_))));

        // Empty but valid
        assert_eq!(SbiPatches::parse(b"SBI\0").unwrap().records.len(), 0);

        // Record header cut short
        assert!(matches!(
            SbiPatches::parse(b"SBI\0\x00\x02"),
            Err(CdError::BadSbi(_))
        ));

        // Payload cut short
        let data = build_sbi(&[(0x00, 0x02, 0x00, 1, &[1, 2, 3][..])]);
        assert!(matches!(SbiPatches::parse(&data), Err(CdError::BadSbi(_))));

        let data = build_sbi(&[(0x00, 0x02, 0x00, 4, &[1, 2, 3][..])]);
        assert!(matches!(SbiPatches::parse(&data), Err(CdError::BadSbi(_))));

        let data = build_sbi(&[(0x00, 0x0a, 0x00, 2, &[1, 2, 3][..])]);
        assert!(matches!(SbiPatches::parse(&data), Err(CdError::BadSbi(_))));
    }
}
