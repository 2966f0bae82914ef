//! Compact discs were originally meant for storing music so positions
//! on the disc are stored in "minute:second:frame" format, where
//! frame means sector.
//!
//! There are 75 frames/sectors in a second, 60 seconds in a
//! minute. All three components are stored as BCD.

use std::cmp;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::bcd::Bcd;
use crate::CdError;

/// Number of sectors in one MSF minute
pub const SECTORS_PER_MINUTE: u32 = 60 * 75;

/// Number of sectors addressable with an MSF (00:00:00 to 99:59:74)
pub const MSF_SECTOR_RANGE: u32 = 100 * SECTORS_PER_MINUTE;

/// Offset between an LBA and the absolute MSF sector index. LBA 0 is
/// 00:02:00.
pub const LBA_MSF_OFFSET: i32 = 150;

/// Anything that's not a digit or a colon, stripped by `Msf::parse_lenient`
static MSF_GARBAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[^0-9:]").unwrap());

/// CD "minute:second:frame" timestamp, given as triplet of *BCD*
/// encoded bytes. In this context "frame" is synonymous with
/// "sector".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Msf(Bcd, Bcd, Bcd);

impl Msf {
    /// MSF for 00:00:00
    pub const ZERO: Msf = Msf(Bcd::ZERO, Bcd::ZERO, Bcd::ZERO);

    /// MSF for 99:59:74
    pub const MAX: Msf = Msf(Bcd::TABLE[99], Bcd::TABLE[59], Bcd::TABLE[74]);

    /// Build an MSF from a BCD triplet. Returns `None` if `s` is
    /// greater than 0x59 or if `f` is greater than 0x74.
    pub const fn new(m: Bcd, s: Bcd, f: Bcd) -> Option<Msf> {
        // Make sure the frame and seconds makes sense (there are only
        // 75 frames per second and obviously 60 seconds per minute)
        if s.bcd() < 0x60 && f.bcd() < 0x75 {
            Some(Msf(m, s, f))
        } else {
            None
        }
    }

    /// Convenience function to build an MSF from BCD values stored in
    /// an `u8`. Returns none if one of the values is not valid BCD of
    /// if it's not a valid Msf
    pub const fn from_bcd(m: u8, s: u8, f: u8) -> Option<Msf> {
        let m = match Bcd::from_bcd(m) {
            Some(b) => b,
            None => return None,
        };

        let s = match Bcd::from_bcd(s) {
            Some(b) => b,
            None => return None,
        };

        let f = match Bcd::from_bcd(f) {
            Some(b) => b,
            None => return None,
        };

        Msf::new(m, s, f)
    }

    /// Build an MSF from binary minute, second and frame values
    pub const fn from_decimal(m: u8, s: u8, f: u8) -> Option<Msf> {
        if m > 99 || s > 59 || f > 74 {
            return None;
        }

        Some(Msf(
            Bcd::TABLE[m as usize],
            Bcd::TABLE[s as usize],
            Bcd::TABLE[f as usize],
        ))
    }

    /// Return the internal BCD triplet
    pub const fn into_bcd(self) -> (Bcd, Bcd, Bcd) {
        (self.0, self.1, self.2)
    }

    /// Returns the value of the minutes in this MSF
    pub const fn minutes(self) -> u8 {
        self.0.binary()
    }

    /// Returns the value of the seconds in this MSF
    pub const fn seconds(self) -> u8 {
        self.1.binary()
    }

    /// Returns the value of the frames in this MSF
    pub const fn frames(self) -> u8 {
        self.2.binary()
    }

    /// Convert an MSF into a sector index. In this convention sector
    /// index 0 is MSF 00:00:00
    pub const fn sector_index(self) -> u32 {
        let Msf(m, s, f) = self;

        let m = m.binary() as u32;
        let s = s.binary() as u32;
        let f = f.binary() as u32;

        // 60 seconds in a minute, 75 sectors(frames) in a second
        (SECTORS_PER_MINUTE * m) + (75 * s) + f
    }

    /// Build an MSF from a sector index. Returns None if the index is
    /// out of range.
    pub const fn from_sector_index(si: u32) -> Option<Msf> {
        let m = si / SECTORS_PER_MINUTE;

        if m > 99 {
            return None;
        }

        let si = si % SECTORS_PER_MINUTE;

        let s = si / 75;
        let f = si % 75;

        let m = Bcd::TABLE[m as usize];
        let s = Bcd::TABLE[s as usize];
        let f = Bcd::TABLE[f as usize];

        Some(Msf(m, s, f))
    }

    /// Build the MSF used to encode a signed sector count in the Q
    /// subchannel. The sign is dropped (pregap timestamps count down
    /// towards index 1) and values past 99:59:74 wrap around.
    pub const fn from_signed_sector(sector: i32) -> Msf {
        let si = sector.unsigned_abs() % MSF_SECTOR_RANGE;

        match Msf::from_sector_index(si) {
            Some(msf) => msf,
            None => Msf::ZERO,
        }
    }

    /// Absolute MSF of the sector at `lba`. Returns `None` if the LBA
    /// is in the lead-in or past 99:59:74.
    pub const fn from_lba(lba: i32) -> Option<Msf> {
        let si = lba + LBA_MSF_OFFSET;

        if si < 0 {
            return None;
        }

        Msf::from_sector_index(si as u32)
    }

    /// Return the MSF timestamp of the next sector. Returns `None` if
    /// the MSF is 99:59:74.
    pub fn next(self) -> Option<Msf> {
        let Msf(m, s, f) = self;

        if f.bcd() < 0x74 {
            return Some(Msf(m, s, f.wrapping_next()));
        }

        if s.bcd() < 0x59 {
            return Some(Msf(m, s.wrapping_next(), Bcd::ZERO));
        }

        if m.bcd() < 0x99 {
            return Some(Msf(m.wrapping_next(), Bcd::ZERO, Bcd::ZERO));
        }

        None
    }

    /// Checked MSF addition. Computes `self + other`, returning
    /// `None` if overflow occurred.
    pub fn checked_add(self, other: Msf) -> Option<Msf> {
        // The maximum sector index for a valid MSF is 449_999 so this
        // can't overflow an `u32`
        Msf::from_sector_index(self.sector_index() + other.sector_index())
    }

    /// Computes `self - rhs`, returning `None` if overflow occurred
    pub fn checked_sub(self, rhs: Msf) -> Option<Msf> {
        self.sector_index()
            .checked_sub(rhs.sector_index())
            .and_then(Msf::from_sector_index)
    }

    /// Parse a cue-style timestamp, falling back on a cleanup pass that
    /// strips everything but digits and colons when the strict parse
    /// fails (so `"01:02:03 "` or `"01:02:0x3"` are accepted).
    pub fn parse_lenient(s: &str) -> Result<Msf, CdError> {
        if let Ok(msf) = Msf::from_str(s) {
            return Ok(msf);
        }

        let cleaned = MSF_GARBAGE.replace_all(s, "");

        Msf::from_str(&cleaned)
    }

    /// Pack the Msf in a single BCD u32, makes it easier to do
    /// comparisons without having to do a full decimal conversion
    /// like `sector_index`.
    fn as_u32_bcd(self) -> u32 {
        let Msf(m, s, f) = self;

        ((m.bcd() as u32) << 16) | ((s.bcd() as u32) << 8) | (f.bcd() as u32)
    }
}

impl fmt::Display for Msf {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let Msf(m, s, f) = *self;

        write!(fmt, "{}:{}:{}", m, s, f)
    }
}

impl fmt::Debug for Msf {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self)
    }
}

impl cmp::PartialOrd for Msf {
    fn partial_cmp(&self, other: &Msf) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::Ord for Msf {
    fn cmp(&self, other: &Msf) -> cmp::Ordering {
        let a = self.as_u32_bcd();
        let b = other.as_u32_bcd();

        a.cmp(&b)
    }
}

/// Strict `mm:ss:ff` parser: exactly two digits per field.
impl FromStr for Msf {
    type Err = CdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();

        if b.len() != 8 || b[2] != b':' || b[5] != b':' {
            return Err(CdError::InvalidMsf(s.to_string()));
        }

        let mut fields = [0u8; 3];

        for (i, field) in fields.iter_mut().enumerate() {
            let hi = b[i * 3];
            let lo = b[i * 3 + 1];

            if !hi.is_ascii_digit() || !lo.is_ascii_digit() {
                return Err(CdError::InvalidMsf(s.to_string()));
            }

            *field = (hi - b'0') * 10 + (lo - b'0');
        }

        Msf::from_decimal(fields[0], fields[1], fields[2])
            .ok_or_else(|| CdError::InvalidMsf(s.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::Msf;
    use crate::bcd::Bcd;
    use std::str::FromStr;

    #[test]
    fn conversions() {
        for &(m, s, f) in &[
            (0x00, 0x00, 0x00),
            (0x01, 0x00, 0x00),
            (0x00, 0x01, 0x00),
            (0x00, 0x00, 0x01),
            (0x12, 0x34, 0x56),
            (0x99, 0x59, 0x74),
        ] {
            let m = msf(m, s, f);

            assert!(m == Msf::from_sector_index(m.sector_index()).unwrap());
        }
    }

    #[test]
    fn sector_round_trip() {
        for m in [0u8, 1, 17, 74, 99] {
            for s in 0..60u8 {
                for f in 0..75u8 {
                    let sector = m as u32 * 4500 + s as u32 * 75 + f as u32;
                    let msf = Msf::from_sector_index(sector).unwrap();

                    assert_eq!(msf.sector_index(), sector);
                    assert_eq!((msf.minutes(), msf.seconds(), msf.frames()), (m, s, f));
                }
            }
        }

        assert!(Msf::from_sector_index(450_000).is_none());
    }

    #[test]
    fn substractions() {
        let m = msf(0x12, 0x34, 0x01);
        let n = msf(0x00, 0x00, 0x02);

        assert!(m.checked_sub(n) == Some(msf(0x12, 0x33, 0x74)));

        let m = msf(0x12, 0x34, 0x01);
        let n = msf(0x00, 0x52, 0x10);

        assert!(m.checked_sub(n) == Some(msf(0x11, 0x41, 0x66)));
        assert!(n.checked_sub(m).is_none());
    }

    #[test]
    fn signed_and_lba() {
        assert!(Msf::from_signed_sector(-150) == msf(0x00, 0x02, 0x00));
        assert!(Msf::from_signed_sector(75) == msf(0x00, 0x01, 0x00));
        assert!(Msf::from_lba(0) == Some(msf(0x00, 0x02, 0x00)));
        assert!(Msf::from_lba(-150) == Some(Msf::ZERO));
        assert!(Msf::from_lba(-151).is_none());
    }

    #[test]
    fn from_str() {
        assert!(Msf::from_str("00:00:00").unwrap() == msf(0x00, 0x00, 0x00));
        assert!(Msf::from_str("01:02:03").unwrap() == msf(0x01, 0x02, 0x03));
        assert!(Msf::from_str("99:59:74").unwrap() == msf(0x99, 0x59, 0x74));

        assert!(Msf::from_str("00").is_err());
        assert!(Msf::from_str("00:00").is_err());
        assert!(Msf::from_str("0:00:00").is_err());
        assert!(Msf::from_str("00:00:00:00").is_err());
        assert!(Msf::from_str("00:60:00").is_err());
        assert!(Msf::from_str("00:00:75").is_err());
        assert!(Msf::from_str("0a:00:00").is_err());
    }

    #[test]
    fn lenient() {
        assert!(Msf::parse_lenient("01:02:03").unwrap() == msf(0x01, 0x02, 0x03));
        assert!(Msf::parse_lenient("01:02:03\r").unwrap() == msf(0x01, 0x02, 0x03));
        assert!(Msf::parse_lenient("\"01:02:03\"").unwrap() == msf(0x01, 0x02, 0x03));
        assert!(Msf::parse_lenient("1:2:3").is_err());
    }

    fn msf(m: u8, s: u8, f: u8) -> Msf {
        Msf::new(
            Bcd::from_bcd(m).unwrap(),
            Bcd::from_bcd(s).unwrap(),
            Bcd::from_bcd(f).unwrap(),
        )
        .unwrap()
    }
}
