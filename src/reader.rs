//! Drive-like access to the sectors of a mounted disc

use crate::disc::Disc;
use crate::subchannel::SubchannelQ;
use crate::synth::{SynthParts, SECTOR_2448};
use crate::{CdError, CdResult};

/// How `read_2048` finds the user data of a sector
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UserData2048Mode {
    /// Look at the sector header: Mode 1 or Mode 2 form 1
    InspectSector,
    /// Always read Mode 1 sectors
    AssumeMode1,
    /// Always read Mode 2 form 1 sectors
    AssumeMode2Form1,
    /// Use the header for the mode but treat every Mode 2 sector as
    /// form 1
    InspectSectorAssumeForm1,
}

/// Reader configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReaderPolicy {
    /// See `UserData2048Mode`
    pub user_data_2048_mode: UserData2048Mode,
    /// Fail `read_2048` on sectors without 2048 bytes of user data
    /// instead of returning 0 bytes
    pub error_on_2048_failure: bool,
    /// `read_2448` returns the subchannels deinterleaved
    pub deinterleaved_subcode: bool,
    /// Clear the buffers before every read so that parts a job
    /// doesn't produce are always zero
    pub deterministic_clear: bool,
}

impl Default for ReaderPolicy {
    fn default() -> ReaderPolicy {
        ReaderPolicy {
            user_data_2048_mode: UserData2048Mode::InspectSector,
            error_on_2048_failure: true,
            deinterleaved_subcode: true,
            deterministic_clear: true,
        }
    }
}

/// Sector reader over a `Disc`. Every read returns the number of
/// bytes produced, 0 for LBAs with no sector.
pub struct DiscSectorReader<'a> {
    disc: &'a Disc,
    /// Current policy, can be changed between reads
    pub policy: ReaderPolicy,
    buf: [u8; SECTOR_2448],
}

impl<'a> DiscSectorReader<'a> {
    /// Reader with the default policy
    pub fn new(disc: &'a Disc) -> DiscSectorReader<'a> {
        DiscSectorReader::with_policy(disc, ReaderPolicy::default())
    }

    /// Reader with a custom policy
    pub fn with_policy(disc: &'a Disc, policy: ReaderPolicy) -> DiscSectorReader<'a> {
        DiscSectorReader {
            disc,
            policy,
            buf: [0; SECTOR_2448],
        }
    }

    /// Synthesize `parts` of the sector at `lba` into the internal
    /// buffer. Returns false if there's no such sector.
    fn synthesize(&mut self, lba: i32, parts: SynthParts) -> CdResult<bool> {
        if self.policy.deterministic_clear {
            self.buf.fill(0);
        }

        match self.disc.sector_job(lba) {
            Some(job) => {
                job.synthesize(&self.disc.policy, lba, parts, &mut self.buf)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn copy_out(&self, out: &mut [u8], start: usize, len: usize) -> usize {
        let len = len.min(out.len());

        out[..len].copy_from_slice(&self.buf[start..start + len]);

        len
    }

    /// Read the 2352 bytes of main channel data
    pub fn read_2352(&mut self, lba: i32, out: &mut [u8]) -> CdResult<usize> {
        if !self.synthesize(lba, SynthParts::USER2352)? {
            return Ok(0);
        }

        Ok(self.copy_out(out, 0, 2352))
    }

    /// Read the main channel followed by the 96 bytes of subchannel
    /// data
    pub fn read_2448(&mut self, lba: i32, out: &mut [u8]) -> CdResult<usize> {
        let mut parts = SynthParts::COMPLETE2448;

        if self.policy.deinterleaved_subcode {
            parts |= SynthParts::SUBCODE_DEINTERLEAVE;
        }

        if !self.synthesize(lba, parts)? {
            return Ok(0);
        }

        Ok(self.copy_out(out, 0, SECTOR_2448))
    }

    /// Read the user data of a Mode 1 sector
    pub fn read_2048_mode1(&mut self, lba: i32, out: &mut [u8]) -> CdResult<usize> {
        if !self.synthesize(lba, SynthParts::USER2048)? {
            return Ok(0);
        }

        Ok(self.copy_out(out, 16, 2048))
    }

    /// Read the user data of a Mode 2 form 1 sector
    pub fn read_2048_mode2_form1(&mut self, lba: i32, out: &mut [u8]) -> CdResult<usize> {
        if !self.synthesize(lba, SynthParts::USER2336)? {
            return Ok(0);
        }

        Ok(self.copy_out(out, 24, 2048))
    }

    /// Read 2048 bytes of user data, locating them according to
    /// `ReaderPolicy::user_data_2048_mode`
    pub fn read_2048(&mut self, lba: i32, out: &mut [u8]) -> CdResult<usize> {
        let assume_form1 = match self.policy.user_data_2048_mode {
            UserData2048Mode::AssumeMode1 => return self.read_2048_mode1(lba, out),
            UserData2048Mode::AssumeMode2Form1 => return self.read_2048_mode2_form1(lba, out),
            UserData2048Mode::InspectSector => false,
            UserData2048Mode::InspectSectorAssumeForm1 => true,
        };

        let parts = SynthParts::HEADER16 | SynthParts::USER2048 | SynthParts::EDC12;

        if !self.synthesize(lba, parts)? {
            return Ok(0);
        }

        match self.buf[15] {
            1 => Ok(self.copy_out(out, 16, 2048)),
            2 => {
                if !assume_form1 {
                    let form = ((self.buf[18] >> 5) & 1) + 1;

                    if form == 2 {
                        return self.fail_2048();
                    }
                }

                Ok(self.copy_out(out, 24, 2048))
            }
            _ => self.fail_2048(),
        }
    }

    fn fail_2048(&self) -> CdResult<usize> {
        if self.policy.error_on_2048_failure {
            Err(CdError::BadFormat)
        } else {
            Ok(0)
        }
    }

    /// Read the 12 bytes of Q subchannel data, CRC included
    pub fn read_subq_raw(&mut self, lba: i32, out: &mut [u8; 12]) -> CdResult<usize> {
        let parts = SynthParts::SUBCODE_Q | SynthParts::SUBCODE_DEINTERLEAVE;

        if !self.synthesize(lba, parts)? {
            return Ok(0);
        }

        out.copy_from_slice(&self.buf[2364..2376]);

        Ok(12)
    }

    /// Read and decode the Q subchannel. Missing sectors return an
    /// all-zero Q.
    pub fn read_subq(&mut self, lba: i32) -> CdResult<SubchannelQ> {
        let mut raw = [0u8; 12];

        self.read_subq_raw(lba, &mut raw)?;

        Ok(SubchannelQ::from_bytes(&raw))
    }

    /// Mode byte of the sector header. Audio sectors return 0.
    pub fn read_mode(&mut self, lba: i32) -> CdResult<u8> {
        if !self.synthesize(lba, SynthParts::HEADER16)? {
            return Ok(0);
        }

        Ok(self.buf[15])
    }
}
