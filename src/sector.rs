//! CD-ROM sector layout helpers: sync pattern, header and the CD-ROM XA
//! subheader.

use crate::msf::{Msf, LBA_MSF_OFFSET};
use crate::{CdError, CdResult};

/// The 12 byte sync pattern at the start of every CD-ROM sector
pub const SYNC_PATTERN: [u8; 12] = [
    0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00,
];

/// Write the sync pattern and header for a data sector at `lba`
pub fn write_header(header: &mut [u8; 16], lba: i32, mode: u8) {
    header[..12].copy_from_slice(&SYNC_PATTERN);

    let (m, s, f) = Msf::from_signed_sector(lba + LBA_MSF_OFFSET).into_bcd();

    header[12] = m.bcd();
    header[13] = s.bcd();
    header[14] = f.bcd();
    header[15] = mode;
}

/// Write a Mode 2 XA subheader. Form 1 subheaders are all zeroes, form
/// 2 only sets the form bit in both copies of the submode.
pub fn write_subheader(subheader: &mut [u8; 8], form: XaForm) {
    subheader.fill(0);

    if form == XaForm::Form2 {
        subheader[2] = 0x20;
        subheader[6] = 0x20;
    }
}

/// Decoded CD-ROM sector header
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CdRomHeader {
    /// Sector MSF (normally should match the one in the metadata, although if the CD is improperly
    /// formatted it could be different)
    pub msf: Msf,
    /// CD-ROM mode for this sector
    pub mode: CdRomMode,
}

impl CdRomHeader {
    /// Parse the first 16 bytes of a raw sector
    pub fn parse(header: &[u8; 16]) -> CdResult<CdRomHeader> {
        if header[..12] != SYNC_PATTERN {
            return Err(CdError::BadSyncPattern);
        }

        let msf = match Msf::from_bcd(header[12], header[13], header[14]) {
            Some(msf) => msf,
            None => return Err(CdError::BadBcd),
        };

        let mode = match header[15] {
            1 => CdRomMode::Mode1,
            2 => CdRomMode::Mode2,
            _ => return Err(CdError::BadFormat),
        };

        Ok(CdRomHeader { msf, mode })
    }
}

/// Mode for a CD-ROM sector
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CdRomMode {
    /// Mode1 ("Regular" CD-ROM)
    Mode1 = 1,
    /// Mode2 (Used for various other sub-formats, such as CD-ROM XA)
    Mode2 = 2,
}

/// The Submode byte in a Mode 2 XA sub-header (byte 18 of the sector)
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct XaSubmode(pub u8);

impl XaSubmode {
    /// True if the Data (D) bit is set.
    pub fn data(self) -> bool {
        self.0 & (1 << 3) != 0
    }

    /// Return the sector form
    pub fn form(self) -> XaForm {
        let form2 = self.0 & (1 << 5) != 0;

        if form2 {
            XaForm::Form2
        } else {
            XaForm::Form1
        }
    }
}

/// CD-ROM XA Mode 2 sectors have two possible forms (advertised in the subheader)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XaForm {
    /// Mode 2 Form 1: 2048 bytes of data, 4 bytes of error detection and 276 bytes of error
    /// correction
    Form1 = 0,
    /// Mode 2 Form 2: 2324 bytes of data, 4 bytes of "quality control".
    ///
    /// The CDi spec says that those bytes are reserved and ignored by the system and *recommends*
    /// to use the same algorithm as for the Form 1 error detection code. It's also possible to
    /// leave it to zero if unused...
    Form2 = 1,
}
