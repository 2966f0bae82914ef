//! Virtual CD drive backed by disc images.
//!
//! A CUE sheet (with its BIN, WAV, ECM or compressed audio files) is
//! compiled into a `Disc`: a flat list of sector jobs, one per LBA,
//! that rebuild on demand the exact 2352 bytes a drive would read
//! (sync, header, EDC/ECC) along with the 96 bytes of subchannel
//! data.

#![warn(missing_docs)]

#[macro_use]
extern crate arrayref;

pub use bcd::Bcd;
pub use config::MountPolicy;
pub use disc::{Disc, DiscSession, DiscToc, DiscTrack};
pub use msf::Msf;
pub use reader::DiscSectorReader;
pub use synth::SynthParts;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod audio;
pub mod bcd;
pub mod blob;
pub mod config;
pub mod crc;
pub mod cue;
pub mod disc;
pub mod ecc;
pub mod fs;
pub mod msf;
pub mod reader;
pub mod riff;
pub mod sbi;
pub mod sector;
pub mod subchannel;
pub mod synth;

/// Possible session formats, as stored in the PSEC field of the A0
/// TOC entry.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionFormat {
    /// CD-DA (audio CD, "red book" specification) or CD-ROM ("yellow
    /// book" specification) session
    CdDaCdRom,
    /// CD-i (compact disc interactive, "green book"
    /// specification). Used on Philips' CD-i console.
    Cdi,
    /// CD-ROM XA (extended architecture). Used on Sony's PlayStation
    /// console.
    CdXa,
}

impl SessionFormat {
    /// Raw value stored in the TOC
    pub const fn raw(self) -> u8 {
        match self {
            SessionFormat::CdDaCdRom => 0x00,
            SessionFormat::Cdi => 0x10,
            SessionFormat::CdXa => 0x20,
        }
    }

    /// Decode a raw TOC value
    pub const fn from_raw(raw: u8) -> Option<SessionFormat> {
        match raw {
            0x00 => Some(SessionFormat::CdDaCdRom),
            0x10 => Some(SessionFormat::Cdi),
            0x20 => Some(SessionFormat::CdXa),
            _ => None,
        }
    }
}

/// Track types, as named in CUE sheets (`MODE1/2048` etc...)
#[allow(non_camel_case_types)]
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackType {
    /// Unrecognized track type
    Unknown,
    /// CD-DA audio, 2352 bytes per sector
    Audio,
    /// CD+G (audio with graphics in the subchannels)
    CdG,
    /// Cooked Mode 1 sectors (user data only)
    Mode1_2048,
    /// Raw Mode 1 sectors
    Mode1_2352,
    /// Mode 2 sectors without sync and header
    Mode2_2336,
    /// Raw Mode 2 sectors
    Mode2_2352,
    /// CD-i Mode 2 sectors without sync and header
    Cdi_2336,
    /// Raw CD-i Mode 2 sectors
    Cdi_2352,
}

impl TrackType {
    /// Returns true if this is an audio track
    pub fn is_audio(self) -> bool {
        self == TrackType::Audio
    }

    /// Session format implied by a track of this type, if any
    pub fn session_format(self) -> Option<SessionFormat> {
        match self {
            TrackType::Mode2_2336 | TrackType::Mode2_2352 => Some(SessionFormat::CdXa),
            TrackType::Cdi_2336 | TrackType::Cdi_2352 => Some(SessionFormat::Cdi),
            _ => None,
        }
    }
}

/// Error type for disc operations.
#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum CdError {
    #[error("Generic I/O error")]
    IoError(#[from] io::Error),
    #[error("Format missmatch. For instance when one attempts to retrieve CD-ROM payloads on an audio track.")]
    BadFormat,
    #[error("Invalid MSF timestamp `{0}`")]
    InvalidMsf(String),
    #[error("Unexpected or corrupted image format `{path}`|{line}: {desc}")]
    ParseError {
        path: PathBuf,
        line: u32,
        desc: String,
    },
    #[error("Disc format error in file `{path}`: {desc}")]
    BadImage { path: PathBuf, desc: String },
    #[error("Attempted to access an invalid track number")]
    BadTrack,
    #[error(
        "The sync pattern at the start of a CD-ROM sector (0x00, 0xff * 10, 0x00) was invalid"
    )]
    BadSyncPattern,
    #[error("Attempted to parse invalid BCD data")]
    BadBcd,
    #[error("Mis-formed ECM file: {0}")]
    BadEcm(String),
    #[error("Mis-formed RIFF file: {0}")]
    BadRiff(String),
    #[error("Unsupported WAVE file: {0}")]
    BadWave(String),
    #[error("Mis-formed SBI file: {0}")]
    BadSbi(String),
    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Failed to compile cue sheet `{path}`: {}", .errors.join("; "))]
    CueCompile { path: PathBuf, errors: Vec<String> },
    #[error("Mounting would take too long (load time {load_time}, threshold {threshold})")]
    LoadTooSlow { load_time: u32, threshold: u32 },
    #[error("No audio decoding service is available")]
    DecoderUnavailable,
}

/// Convenience type alias for a `Result<R, CdError>`
pub type CdResult<R> = std::result::Result<R, CdError>;

#[test]
fn cderror_display() {
    // Make sure that CdError implements Display. This should be true if we set an
    // `#[error("...")]` for every variant
    println!("{}", CdError::BadTrack);

    let e = CdError::CueCompile {
        path: PathBuf::from("disc.cue"),
        errors: vec!["a".into(), "b".into()],
    };
    assert!(e.to_string().ends_with("a; b"));
}

#[test]
fn session_format_raw() {
    for f in [SessionFormat::CdDaCdRom, SessionFormat::Cdi, SessionFormat::CdXa] {
        assert!(SessionFormat::from_raw(f.raw()) == Some(f));
    }

    assert!(SessionFormat::from_raw(0x32).is_none());
}
