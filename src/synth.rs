//! Sector synthesis.
//!
//! Every sector of a mounted disc is described by a `SectorJob`: where
//! its payload comes from (if anywhere) and the Q subchannel it
//! carries. Synthesizing a job rebuilds the 2448 bytes a drive would
//! return for that sector (2352 bytes of main channel followed by 96
//! bytes of subchannel data), regenerating whatever the image didn't
//! store.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::sync::Arc;

use crate::blob::{self, Blob};
use crate::config::MountPolicy;
use crate::ecc;
use crate::sector::write_header;
use crate::subchannel::{interleave, subchannel_p, Control, SubchannelQ, ADR_POSITION};
use crate::{CdError, CdResult, SessionFormat, TrackType};

/// Size of a full synthesized sector, main channel and subchannels
pub const SECTOR_2448: usize = 2448;

/// Set of sector parts a caller is interested in. Jobs are free to
/// produce more than what was asked for.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct SynthParts(u16);

impl SynthParts {
    /// Sync pattern and header
    pub const HEADER16: SynthParts = SynthParts(1);
    /// The main 2048 bytes of user data
    pub const USER2048: SynthParts = SynthParts(2);
    /// The 276 bytes of ECC
    pub const ECC276: SynthParts = SynthParts(4);
    /// The 12 bytes between the user data and the ECC (EDC and
    /// padding)
    pub const EDC12: SynthParts = SynthParts(8);
    /// Everything ECM regenerates
    pub const ECM_ANY: SynthParts = SynthParts(4 | 8);
    /// Mode 2 payload: everything but the header
    pub const USER2336: SynthParts = SynthParts(2 | 4 | 8);
    /// The whole 2352 byte main channel
    pub const USER2352: SynthParts = SynthParts(1 | 2 | 4 | 8);
    /// P subchannel
    pub const SUBCODE_P: SynthParts = SynthParts(16);
    /// Q subchannel
    pub const SUBCODE_Q: SynthParts = SynthParts(32);
    /// R to W subchannels
    pub const SUBCODE_RSTUVW: SynthParts = SynthParts(0xfc0);
    /// All the subchannels
    pub const SUBCODE_COMPLETE: SynthParts = SynthParts(0xff0);
    /// Return the subchannels deinterleaved (12 bytes per channel)
    /// instead of the raw on-disc layout
    pub const SUBCODE_DEINTERLEAVE: SynthParts = SynthParts(0x1000);
    /// The full 2448 byte sector
    pub const COMPLETE2448: SynthParts = SynthParts(0xfff);

    /// Raw bit value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns true if any of the parts in `other` is requested
    pub const fn intersects(self, other: SynthParts) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns true if all the parts in `other` are requested
    pub const fn contains(self, other: SynthParts) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SynthParts {
    type Output = SynthParts;

    fn bitor(self, rhs: SynthParts) -> SynthParts {
        SynthParts(self.0 | rhs.0)
    }
}

impl BitOrAssign for SynthParts {
    fn bitor_assign(&mut self, rhs: SynthParts) {
        self.0 |= rhs.0
    }
}

impl BitAnd for SynthParts {
    type Output = SynthParts;

    fn bitand(self, rhs: SynthParts) -> SynthParts {
        SynthParts(self.0 & rhs.0)
    }
}

impl fmt::Debug for SynthParts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SynthParts({:#x})", self.0)
    }
}

/// Sector whose payload is read from a blob
#[derive(Clone)]
pub struct BlobSector {
    /// Payload source
    pub blob: Arc<dyn Blob>,
    /// Offset of the payload in the blob
    pub offset: u64,
    /// Q subchannel
    pub q: SubchannelQ,
    /// P subchannel flag
    pub pause: bool,
}

/// Sector with no stored payload (pregap, postgap, lead-out)
#[derive(Clone, Debug)]
pub struct GapSector {
    /// Type of the surrounding track, decides what an empty sector
    /// looks like
    pub track_type: TrackType,
    /// Q subchannel
    pub q: SubchannelQ,
    /// P subchannel flag
    pub pause: bool,
}

/// Lead-out area of the last session. Unlike the other jobs a single
/// instance serves every LBA.
#[derive(Clone, Debug)]
pub struct LeadOut {
    /// First LBA of the lead-out
    pub leadout_lba: i32,
    /// Control nibble of the lead-out Q subchannel
    pub control: Control,
    /// Sector type of the lead-out
    pub track_type: TrackType,
}

impl LeadOut {
    /// Build the lead-out job for a session whose lead-out starts at
    /// `leadout_lba`. `last_control` is the control of the last
    /// information track of the session.
    pub fn new(
        leadout_lba: i32,
        leadout_control: Control,
        last_control: Control,
        format: SessionFormat,
    ) -> LeadOut {
        let control = leadout_control | (last_control & Control::DATA);

        let track_type = if !leadout_control.is_data() {
            TrackType::Audio
        } else {
            match format {
                SessionFormat::CdXa | SessionFormat::Cdi => TrackType::Mode2_2352,
                SessionFormat::CdDaCdRom => TrackType::Mode1_2352,
            }
        };

        LeadOut {
            leadout_lba,
            control,
            track_type,
        }
    }

    /// Q subchannel of the lead-out sector at `lba`
    pub fn subchannel_q(&self, lba: i32) -> SubchannelQ {
        let mut q = SubchannelQ::default();

        q.set_status(ADR_POSITION, self.control);
        q.track = 0xaa;
        q.index = 0x01;
        q.set_timestamp(lba - self.leadout_lba);
        q.set_ap_timestamp(lba + 150);

        q
    }
}

/// Sector with its Q subchannel replaced (SBI patches)
#[derive(Clone)]
pub struct PatchQ {
    /// Job producing everything else
    pub original: Box<SectorJob>,
    /// Replacement Q subchannel, CRC included
    pub q: [u8; 12],
}

/// Synthesis strategy for one sector
#[allow(non_camel_case_types)]
#[derive(Clone)]
pub enum SectorJob {
    /// 2048 bytes of Mode 1 user data
    Mode1_2048(BlobSector),
    /// 2336 bytes of Mode 2 payload (no sync or header)
    Mode2_2336(BlobSector),
    /// Raw 2352 byte sector (audio or data)
    Raw2352(BlobSector),
    /// Generated empty sector
    Gap(GapSector),
    /// Lead-out sector
    LeadOut(LeadOut),
    /// Patched Q subchannel
    PatchQ(PatchQ),
}

impl SectorJob {
    /// Write the requested `parts` of the sector at `lba` to `out`
    pub fn synthesize(
        &self,
        policy: &MountPolicy,
        lba: i32,
        parts: SynthParts,
        out: &mut [u8; SECTOR_2448],
    ) -> CdResult<()> {
        match self {
            SectorJob::Mode1_2048(s) => {
                let mut parts = parts;
                let ecm = parts.intersects(SynthParts::ECM_ANY);

                if ecm {
                    parts |= SynthParts::USER2048 | SynthParts::HEADER16;
                }

                if parts.intersects(SynthParts::USER2048) {
                    blob::read_exact(&*s.blob, s.offset, &mut out[16..2064])?;
                }

                if parts.intersects(SynthParts::HEADER16) {
                    write_header(array_mut_ref![out, 0, 16], lba, 1);
                }

                if ecm {
                    ecc::ecm_mode1(array_mut_ref![out, 0, 2352]);
                }

                finish(out, parts, &s.q, s.pause);
            }
            SectorJob::Mode2_2336(s) => {
                if parts.intersects(SynthParts::USER2336) {
                    blob::read_exact(&*s.blob, s.offset, &mut out[16..2352])?;
                }

                if parts.intersects(SynthParts::HEADER16) {
                    write_header(array_mut_ref![out, 0, 16], lba, 2);
                }

                finish(out, parts, &s.q, s.pause);
            }
            SectorJob::Raw2352(s) => {
                if parts.intersects(SynthParts::USER2352) {
                    blob::read_exact(&*s.blob, s.offset, &mut out[..2352])?;
                }

                finish(out, parts, &s.q, s.pause);
            }
            SectorJob::Gap(g) => synthesize_gap(g, policy, lba, parts, out)?,
            SectorJob::LeadOut(l) => {
                let gap = GapSector {
                    track_type: l.track_type,
                    q: l.subchannel_q(lba),
                    pause: true,
                };

                synthesize_gap(&gap, policy, lba, parts, out)?;
            }
            SectorJob::PatchQ(p) => {
                let forced = parts | SynthParts::SUBCODE_DEINTERLEAVE;

                p.original.synthesize(policy, lba, forced, out)?;

                if parts.intersects(SynthParts::SUBCODE_Q) {
                    out[2364..2376].copy_from_slice(&p.q);
                }

                interleave_if_needed(out, parts);
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SectorJob {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SectorJob::Mode1_2048(s) => write!(f, "Mode1_2048 @ {}", s.offset),
            SectorJob::Mode2_2336(s) => write!(f, "Mode2_2336 @ {}", s.offset),
            SectorJob::Raw2352(s) => write!(f, "Raw2352 @ {}", s.offset),
            SectorJob::Gap(g) => write!(f, "Gap {:?}", g.track_type),
            SectorJob::LeadOut(l) => write!(f, "LeadOut {:?}", l.track_type),
            SectorJob::PatchQ(p) => write!(f, "PatchQ({:?})", p.original),
        }
    }
}

fn synthesize_gap(
    g: &GapSector,
    policy: &MountPolicy,
    lba: i32,
    parts: SynthParts,
    out: &mut [u8; SECTOR_2448],
) -> CdResult<()> {
    out[..2352].fill(0);

    let mut pause = g.pause;

    let mode = match g.track_type {
        TrackType::Audio => 0,
        TrackType::Cdi_2352 | TrackType::Mode1_2352 => 1,
        TrackType::Cdi_2336 | TrackType::Mode2_2336 | TrackType::Mode2_2352 => {
            if policy.pregap_mode2_as_xa_form2 {
                // Submode, both copies
                out[18] = 0x20;
                out[22] = 0x20;
            }
            2
        }
        TrackType::Mode1_2048 => {
            pause = true;
            1
        }
        t => return Err(CdError::Unsupported(format!("gap sector for {:?} track", t))),
    };

    if mode != 0 && parts.intersects(SynthParts::HEADER16) {
        write_header(array_mut_ref![out, 0, 16], lba, mode);
    }

    match mode {
        1 if parts.intersects(SynthParts::ECM_ANY) => ecc::ecm_mode1(array_mut_ref![out, 0, 2352]),
        2 => ecc::ecm_mode2_form2(array_mut_ref![out, 0, 2352]),
        _ => (),
    }

    finish(out, parts, &g.q, pause);

    Ok(())
}

/// Generate the requested subchannels
fn finish(out: &mut [u8; SECTOR_2448], parts: SynthParts, q: &SubchannelQ, pause: bool) {
    if parts.intersects(SynthParts::SUBCODE_P) {
        out[2352..2364].copy_from_slice(&subchannel_p(pause));
    }

    if parts.intersects(SynthParts::SUBCODE_Q) {
        out[2364..2376].copy_from_slice(&q.to_bytes());
    }

    if parts.intersects(SynthParts::SUBCODE_RSTUVW) {
        out[2376..2448].fill(0);
    }

    interleave_if_needed(out, parts);
}

/// Subchannels are generated deinterleaved, convert them to the
/// on-disc layout unless the caller wants them as is
fn interleave_if_needed(out: &mut [u8; SECTOR_2448], parts: SynthParts) {
    if parts.intersects(SynthParts::SUBCODE_COMPLETE)
        && !parts.intersects(SynthParts::SUBCODE_DEINTERLEAVE)
    {
        let raw = interleave(array_ref![out, 2352, 96]);

        out[2352..].copy_from_slice(&raw);
    }
}
