//! Subchannel data interface.
//!
//! The subchannel data (sometimes called subcode or control bytes) is
//! stored alongside each sector on the CD. There are 8 subchannels
//! named P, Q, R, S, T, U, V and W. Each of them contain 12 bytes of
//! data per sector for a total of 96bytes of subchannel data per
//! sector.
//!
//! Subchannels generally contain "metadata" about the current sector
//! such as timing information, track name or even some low resolution
//! graphics in certain standards. It also contains the table of
//! contents of the disc in the lead-in area (in the Q subchannel).
//!
//! On the disc the 8 channels are interleaved: each of the 96 bytes
//! contains one bit of every channel. Most of this crate works on the
//! "deinterleaved" layout (12 bytes of P, then 12 bytes of Q etc...)
//! and only interleaves at the very end if the caller asks for it.
//!
//! Some platforms abuse the subchannels for copy-protection since
//! many drives and image formats fail to reproduce the subchannel
//! data correctly. For instance libcrypt on the PlayStation stores a
//! key by purposefully corrupting the Q CRC of a few sectors, which is
//! why `SubchannelQ` never "fixes" a CRC on its own.
//!
//! For more details see section 22 of [ECMA-130]
//! (http://www.ecma-international.org/publications/files/ECMA-ST/Ecma-130.pdf)

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::bcd::Bcd;
use crate::crc::crc16;
use crate::msf::Msf;
use crate::SessionFormat;

/// ADR value for the "mode 1" Q data (position or TOC entry)
pub const ADR_POSITION: u8 = 1;

/// Control nibble of the Q subchannel status byte
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Control(u8);

impl Control {
    /// No flag set: copy-protected two channel audio
    pub const NONE: Control = Control(0);
    /// Pre-emphasis (audio tracks only)
    pub const PRE: Control = Control(1);
    /// Digital copy permitted
    pub const DCP: Control = Control(2);
    /// Data track
    pub const DATA: Control = Control(4);
    /// Four channel audio
    pub const FOUR_CH: Control = Control(8);

    /// Build a `Control` from its raw nibble. The high bits are
    /// ignored.
    pub const fn from_bits(bits: u8) -> Control {
        Control(bits & 0xf)
    }

    /// Raw nibble value
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if all the flags of `other` are set in `self`
    pub const fn contains(self, other: Control) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if the data flag is set
    pub const fn is_data(self) -> bool {
        self.contains(Control::DATA)
    }
}

impl BitOr for Control {
    type Output = Control;

    fn bitor(self, rhs: Control) -> Control {
        Control(self.0 | rhs.0)
    }
}

impl BitOrAssign for Control {
    fn bitor_assign(&mut self, rhs: Control) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Control {
    type Output = Control;

    fn bitand(self, rhs: Control) -> Control {
        Control(self.0 & rhs.0)
    }
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (Control::PRE, "PRE"),
            (Control::DCP, "DCP"),
            (Control::DATA, "DATA"),
            (Control::FOUR_CH, "4CH"),
        ];

        let mut first = true;

        write!(f, "Control(")?;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

/// Q subchannel contents for one sector, kept as the raw BCD bytes
/// found on the disc so that corrupted values survive a round trip.
///
/// The layout on the wire is:
///
/// | byte | contents                                        |
/// |------|-------------------------------------------------|
/// | 0    | status: ADR in the low nibble, control above    |
/// | 1    | track number (0 in the lead-in, 0xaa lead-out)  |
/// | 2    | index, or TOC pointer in the lead-in            |
/// | 3..6 | relative MSF                                    |
/// | 6    | zero                                            |
/// | 7..10| absolute MSF (or TOC pointer payload)           |
/// | 10..12| CRC-16, inverted, big endian                   |
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubchannelQ {
    /// ADR/control byte
    pub status: u8,
    /// Track number (BCD)
    pub track: u8,
    /// Index or TOC pointer (BCD)
    pub index: u8,
    /// Relative minutes (BCD)
    pub min: u8,
    /// Relative seconds (BCD)
    pub sec: u8,
    /// Relative frames (BCD)
    pub frame: u8,
    /// Supposed to be zero
    pub zero: u8,
    /// Absolute minutes (BCD)
    pub ap_min: u8,
    /// Absolute seconds (BCD)
    pub ap_sec: u8,
    /// Absolute frames (BCD)
    pub ap_frame: u8,
    /// Stored CRC. Only meaningful for data read back from a disc,
    /// `to_bytes` always recomputes it.
    pub crc: u16,
}

impl SubchannelQ {
    /// Build the status byte from an ADR and control nibble
    pub fn set_status(&mut self, adr: u8, control: Control) {
        self.status = (adr & 0xf) | (control.bits() << 4);
    }

    /// ADR field (low nibble of the status byte)
    pub fn adr(&self) -> u8 {
        self.status & 0xf
    }

    /// Control field (high nibble of the status byte)
    pub fn control(&self) -> Control {
        Control::from_bits(self.status >> 4)
    }

    /// Store a relative timestamp. The sign is dropped: pregap
    /// timestamps count down towards index 1.
    pub fn set_timestamp(&mut self, sectors: i32) {
        let (m, s, f) = Msf::from_signed_sector(sectors).into_bcd();

        self.min = m.bcd();
        self.sec = s.bcd();
        self.frame = f.bcd();
    }

    /// Store an absolute timestamp (sector count from 00:00:00)
    pub fn set_ap_timestamp(&mut self, sectors: i32) {
        let (m, s, f) = Msf::from_signed_sector(sectors).into_bcd();

        self.ap_min = m.bcd();
        self.ap_sec = s.bcd();
        self.ap_frame = f.bcd();
    }

    /// Relative timestamp as a sector count, `None` if the BCD is
    /// corrupted
    pub fn timestamp(&self) -> Option<u32> {
        Msf::from_bcd(self.min, self.sec, self.frame).map(Msf::sector_index)
    }

    /// Absolute timestamp as a sector count, `None` if the BCD is
    /// corrupted
    pub fn ap_timestamp(&self) -> Option<u32> {
        Msf::from_bcd(self.ap_min, self.ap_sec, self.ap_frame).map(Msf::sector_index)
    }

    /// The 10 bytes covered by the CRC
    fn payload(&self) -> [u8; 10] {
        [
            self.status,
            self.track,
            self.index,
            self.min,
            self.sec,
            self.frame,
            self.zero,
            self.ap_min,
            self.ap_sec,
            self.ap_frame,
        ]
    }

    /// Compute the CRC that should be stored in the last two bytes
    /// (already inverted)
    pub fn compute_crc(&self) -> u16 {
        !crc16(&self.payload())
    }

    /// True if the stored CRC matches the contents
    pub fn is_crc_valid(&self) -> bool {
        self.crc == self.compute_crc()
    }

    /// Serialize into the 12 byte wire format with a freshly computed
    /// CRC
    pub fn to_bytes(&self) -> [u8; 12] {
        let mut raw = [0; 12];

        raw[..10].copy_from_slice(&self.payload());
        write_crc(&mut raw);

        raw
    }

    /// Parse 12 bytes of Q data. The stored CRC is kept as-is.
    pub fn from_bytes(raw: &[u8; 12]) -> SubchannelQ {
        SubchannelQ {
            status: raw[0],
            track: raw[1],
            index: raw[2],
            min: raw[3],
            sec: raw[4],
            frame: raw[5],
            zero: raw[6],
            ap_min: raw[7],
            ap_sec: raw[8],
            ap_frame: raw[9],
            crc: ((raw[10] as u16) << 8) | raw[11] as u16,
        }
    }

    /// Interpret the contents as mode 1 Q data. Returns
    /// `QData::Unsupported` on anything that doesn't decode cleanly.
    pub fn parse_data(&self) -> QData {
        if self.adr() != ADR_POSITION {
            return QData::Unsupported;
        }

        let msf = match Msf::from_bcd(self.min, self.sec, self.frame) {
            Some(m) => m,
            None => return QData::Unsupported,
        };

        if self.track == 0 {
            // Lead-in: this is a TOC entry
            return match self.index {
                0xa0 => {
                    let format = match SessionFormat::from_raw(self.ap_sec) {
                        Some(f) => f,
                        None => return QData::Unsupported,
                    };

                    match Bcd::from_bcd(self.ap_min) {
                        Some(first) => QData::TocFirstTrack(first, format, msf),
                        None => QData::Unsupported,
                    }
                }
                0xa1 => match Bcd::from_bcd(self.ap_min) {
                    Some(last) => QData::TocLastTrack(last, msf),
                    None => QData::Unsupported,
                },
                pointer => {
                    let ap_msf = match Msf::from_bcd(self.ap_min, self.ap_sec, self.ap_frame) {
                        Some(m) => m,
                        None => return QData::Unsupported,
                    };

                    if pointer == 0xa2 {
                        return QData::TocLeadOut(ap_msf, msf);
                    }

                    match Bcd::from_bcd(pointer) {
                        Some(p) => QData::Toc(p, ap_msf, msf),
                        None => QData::Unsupported,
                    }
                }
            };
        }

        let ap_msf = match Msf::from_bcd(self.ap_min, self.ap_sec, self.ap_frame) {
            Some(m) => m,
            None => return QData::Unsupported,
        };

        let index = match Bcd::from_bcd(self.index) {
            Some(b) => b,
            None => return QData::Unsupported,
        };

        if self.track == 0xaa {
            return QData::LeadOut(msf, ap_msf);
        }

        match Bcd::from_bcd(self.track) {
            Some(track) => QData::Position(track, index, msf, ap_msf),
            None => QData::Unsupported,
        }
    }
}

/// Compute the CRC of `raw[..10]` and store it, inverted and big
/// endian, in `raw[10..12]`
pub fn write_crc(raw: &mut [u8; 12]) {
    let crc = !crc16(&raw[..10]);

    raw[10] = (crc >> 8) as u8;
    raw[11] = crc as u8;
}

/// Possible interpretations of mode 1 Q subchannel data.
///
/// See section 22.3.2 of ECMA-130 for more details.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum QData {
    /// Program area: track, index, relative MSF and absolute MSF
    Position(Bcd, Bcd, Msf, Msf),
    /// Lead-out area: relative MSF and absolute MSF
    LeadOut(Msf, Msf),
    /// Table of content entry: track pointer, absolute MSF of the
    /// track's index 01 and MSF of the entry in the lead-in
    Toc(Bcd, Msf, Msf),
    /// Pointer 0xa0: first track and session format
    TocFirstTrack(Bcd, SessionFormat, Msf),
    /// Pointer 0xa1: last track
    TocLastTrack(Bcd, Msf),
    /// Pointer 0xa2: absolute MSF of the lead-out
    TocLeadOut(Msf, Msf),
    /// Unsupported or corrupted data
    Unsupported,
}

/// P subchannel contents: all ones while paused, all zeroes
/// otherwise
pub fn subchannel_p(pause: bool) -> [u8; 12] {
    if pause {
        [0xff; 12]
    } else {
        [0; 12]
    }
}

/// Convert 96 bytes of deinterleaved subchannel data (P, Q, R, ...
/// 12 bytes each) into the on-disc layout where each byte carries one
/// bit of every channel.
pub fn interleave(src: &[u8; 96]) -> [u8; 96] {
    let mut out = [0u8; 96];

    for d in 0..12 {
        for bit in 0..8 {
            let mut raw = 0;

            for ch in 0..8 {
                raw |= ((src[ch * 12 + d] >> (7 - bit)) & 1) << (7 - ch);
            }

            out[(d << 3) + bit] = raw;
        }
    }

    out
}

/// Inverse of `interleave`
pub fn deinterleave(src: &[u8; 96]) -> [u8; 96] {
    let mut out = [0u8; 96];

    for ch in 0..8 {
        for (i, &b) in src.iter().enumerate() {
            out[ch * 12 + (i >> 3)] |= ((b >> (7 - ch)) & 1) << (7 - (i & 7));
        }
    }

    out
}

/// One lead-in TOC entry, as captured while laying out the sectors
/// of a session
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RawTocEntry {
    /// Q subchannel of the entry
    pub q: SubchannelQ,
}

impl RawTocEntry {
    /// Entry for a regular track pointer
    pub fn track(track: u8, control: Control, ap_timestamp: i32) -> RawTocEntry {
        let mut q = SubchannelQ::default();

        q.set_status(ADR_POSITION, control);
        q.index = crate::bcd::decimal_to_bcd(track);
        q.set_ap_timestamp(ap_timestamp);

        RawTocEntry { q }
    }

    /// Entries for the A0 (first track), A1 (last track) and A2
    /// (lead-out) pointers of a session
    pub fn session_pointers(
        first_track: u8,
        last_track: u8,
        format: SessionFormat,
        leadout_timestamp: i32,
    ) -> [RawTocEntry; 3] {
        let mut q = SubchannelQ::default();

        q.set_status(ADR_POSITION, Control::NONE);

        q.index = 0xa0;
        q.ap_min = crate::bcd::decimal_to_bcd(first_track);
        q.ap_sec = format.raw();
        q.ap_frame = 0;
        let a0 = RawTocEntry { q };

        q.index = 0xa1;
        q.ap_min = crate::bcd::decimal_to_bcd(last_track);
        q.ap_sec = 0;
        q.ap_frame = 0;
        let a1 = RawTocEntry { q };

        q.index = 0xa2;
        q.set_ap_timestamp(leadout_timestamp);
        let a2 = RawTocEntry { q };

        [a0, a1, a2]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc_synth_and_check() {
        let mut q = SubchannelQ::default();

        q.set_status(ADR_POSITION, Control::DATA);
        q.track = 0x01;
        q.index = 0x01;
        q.set_timestamp(0);
        q.set_ap_timestamp(150);

        let raw = q.to_bytes();

        assert_eq!(raw[0], 0x41);
        assert_eq!(&raw[7..10], &[0x00, 0x02, 0x00]);

        let stored = ((raw[10] as u16) << 8) | raw[11] as u16;
        assert_eq!(stored, !crc16(&raw[..10]));

        let parsed = SubchannelQ::from_bytes(&raw);
        assert!(parsed.is_crc_valid());
        assert!(parsed.crc == q.compute_crc());

        let mut broken = raw;
        broken[11] ^= 0xff;
        assert!(!SubchannelQ::from_bytes(&broken).is_crc_valid());
    }

    #[test]
    fn status_nibbles() {
        let mut q = SubchannelQ::default();

        q.set_status(1, Control::DATA | Control::DCP);

        assert_eq!(q.status, 0x61);
        assert_eq!(q.adr(), 1);
        assert!(q.control() == Control::DATA | Control::DCP);
        assert!(q.control().is_data());
        assert!(!q.control().contains(Control::PRE));
    }

    #[test]
    fn negative_timestamps() {
        let mut q = SubchannelQ::default();

        q.set_timestamp(-150);
        assert_eq!((q.min, q.sec, q.frame), (0x00, 0x02, 0x00));
        assert_eq!(q.timestamp(), Some(150));
    }

    #[test]
    fn parse_position_and_toc() {
        let mut q = SubchannelQ::default();
        q.set_status(ADR_POSITION, Control::NONE);
        q.track = 0x02;
        q.index = 0x01;
        q.set_timestamp(75);
        q.set_ap_timestamp(4500);

        let expected = QData::Position(
            Bcd::from_bcd(0x02).unwrap(),
            Bcd::ONE,
            Msf::from_bcd(0, 1, 0).unwrap(),
            Msf::from_bcd(1, 0, 0).unwrap(),
        );
        assert!(q.parse_data() == expected);

        let [a0, a1, a2] = RawTocEntry::session_pointers(1, 12, SessionFormat::CdXa, 300);

        match a0.q.parse_data() {
            QData::TocFirstTrack(first, format, _) => {
                assert!(first == Bcd::ONE);
                assert!(format == SessionFormat::CdXa);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(a1.q.parse_data() == QData::TocLastTrack(Bcd::from_bcd(0x12).unwrap(), Msf::ZERO));
        assert!(a2.q.parse_data() == QData::TocLeadOut(Msf::from_bcd(0, 4, 0).unwrap(), Msf::ZERO));

        let mut bad = q;
        bad.frame = 0x75;
        assert!(bad.parse_data() == QData::Unsupported);
    }

    #[test]
    fn interleave_round_trip() {
        let mut src = [0u8; 96];

        for (i, b) in src.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37) ^ 0x5a;
        }

        let inter = interleave(&src);
        assert!(inter[..] != src[..]);
        assert!(deinterleave(&inter)[..] == src[..]);
    }

    #[test]
    fn interleave_p_only() {
        let mut src = [0u8; 96];
        src[..12].copy_from_slice(&subchannel_p(true));

        // P is the MSB of every interleaved byte
        assert!(interleave(&src).iter().all(|&b| b == 0x80));
    }
}
