//! Lay out a compiled cue sheet as a disc: open the blobs, generate one
//! sector job per LBA and capture the TOC entries on the way.

use std::sync::Arc;

use log::{debug, trace};

use super::compiler::{CompiledCue, CueFileKind, CueTrack};
use crate::audio::AudioDecoder;
use crate::bcd::decimal_to_bcd;
use crate::blob::{Blob, EcmBlob, PcmBufferBlob, RawFileBlob, WaveBlob, ZeroPadBlob};
use crate::config::MountPolicy;
use crate::disc::{Disc, DiscSession};
use crate::fs::FileSystem;
use crate::subchannel::{RawTocEntry, SubchannelQ, ADR_POSITION};
use crate::synth::{BlobSector, GapSector, SectorJob};
use crate::{CdError, CdResult, TrackType};

/// Open every file of the sheet, padded to its own length so that
/// sectors straddling the end of a file read as zeroes
fn mount_blobs(
    compiled: &CompiledCue,
    fs: &dyn FileSystem,
    decoder: &dyn AudioDecoder,
) -> CdResult<Vec<Option<Arc<dyn Blob>>>> {
    let mut blobs = Vec::with_capacity(compiled.files.len());

    for file in &compiled.files {
        let file = match file {
            Some(f) => f,
            None => {
                blobs.push(None);
                continue;
            }
        };

        let blob: Arc<dyn Blob> = match file.kind {
            CueFileKind::Bin | CueFileKind::Unknown => Arc::new(RawFileBlob::open(fs, &file.path)?),
            CueFileKind::Ecm => Arc::new(EcmBlob::load(fs.open(&file.path)?)?),
            CueFileKind::Wave => Arc::new(WaveBlob::load(fs.open(&file.path)?)?),
            CueFileKind::DecodeAudio => {
                if !decoder.service_available() {
                    return Err(CdError::DecoderUnavailable);
                }

                Arc::new(PcmBufferBlob::new(decoder.decode(&file.path)?))
            }
        };

        debug!(
            "Mounted {} ({:?}, {} bytes)",
            file.path.display(),
            file.kind,
            blob.len()
        );

        let len = blob.len();

        blobs.push(Some(Arc::new(ZeroPadBlob::new(blob, len)) as Arc<dyn Blob>));
    }

    Ok(blobs)
}

/// Size of one sector of a track in its file
fn stored_sector_size(kind: TrackType) -> CdResult<u64> {
    match kind {
        TrackType::Audio | TrackType::Cdi_2352 | TrackType::Mode1_2352 | TrackType::Mode2_2352 => {
            Ok(2352)
        }
        TrackType::Mode1_2048 => Ok(2048),
        TrackType::Cdi_2336 | TrackType::Mode2_2336 => Ok(2336),
        t => Err(CdError::Unsupported(format!("{:?} tracks", t))),
    }
}

/// Sector layout state carried from one track to the next
struct Layout<'a> {
    compiled: &'a CompiledCue,
    blobs: Vec<Option<Arc<dyn Blob>>>,
    policy: &'a MountPolicy,
    sectors: Vec<SectorJob>,
    sessions: Vec<DiscSession>,
    session: DiscSession,
    blob_index: Option<usize>,
    /// Byte offset in the current blob
    blob_offset: u64,
    /// Sector offset in the current blob
    blob_msf: u32,
}

impl<'a> Layout<'a> {
    fn close_session(&mut self) -> CdResult<()> {
        let info = self
            .compiled
            .sessions
            .get(self.session.number as usize - 1)
            .ok_or(CdError::BadTrack)?;

        self.session
            .raw_toc
            .extend_from_slice(&RawTocEntry::session_pointers(
                info.first_recorded_track,
                info.last_recorded_track,
                info.format,
                self.sectors.len() as i32,
            ));

        debug!(
            "Session {} closed at sector {}",
            self.session.number,
            self.sectors.len()
        );

        Ok(())
    }

    fn track(&mut self, t: usize) -> CdResult<()> {
        let compiled = self.compiled;
        let tracks = &compiled.tracks;
        let ct = &tracks[t];

        stored_sector_size(ct.kind)?;

        if ct.session != self.session.number as u32 {
            if ct.session != self.session.number as u32 + 1 {
                return Err(CdError::Unsupported(format!(
                    "track {} jumps from session {} to session {}",
                    ct.number, self.session.number, ct.session
                )));
            }

            self.close_session()?;

            let next = DiscSession::new(self.session.number + 1);
            let done = std::mem::replace(&mut self.session, next);
            self.sessions.push(done);
        }

        let (index0, index1) = match (ct.indexes.first(), ct.indexes.get(1)) {
            (Some(i0), Some(i1)) => (i0.file_msf.sector_index(), i1.file_msf.sector_index()),
            _ => return Err(CdError::BadTrack),
        };

        let file = ct.file_index.ok_or(CdError::BadTrack)?;
        let blob = match self.blobs.get(file) {
            Some(Some(b)) => b.clone(),
            _ => return Err(CdError::BadTrack),
        };
        let blob_len = blob.len();

        let mut specified_pregap = ct.pregap.sector_index() as i32;
        let implied_pregap = index1 as i32 - index0 as i32;
        let mut rel = -(specified_pregap + implied_pregap);

        if self.blob_index != Some(file) {
            self.blob_index = Some(file);
            self.blob_offset = 0;
            self.blob_msf = 0;
        }

        let mut index = 0;

        trace!(
            "Track {} starts at sector {}, pregap {}+{}",
            ct.number,
            self.sectors.len(),
            specified_pregap,
            implied_pregap
        );

        loop {
            let gap = if specified_pregap > 0 {
                specified_pregap -= 1;
                true
            } else {
                while index < ct.indexes.len() - 1
                    && self.blob_msf >= ct.indexes[index + 1].file_msf.sector_index()
                {
                    index += 1;

                    if index == 1 {
                        self.session.raw_toc.push(RawTocEntry::track(
                            ct.number,
                            ct.flags.control(),
                            self.sectors.len() as i32,
                        ));
                    }
                }
                false
            };

            let mut q_track: &CueTrack = ct;
            let mut q_rel = rel;

            if index == 0 {
                if !self.policy.pregap_contradiction_mode_a {
                    q_rel += 1;
                }

                // The pregap of a data track following an audio track is
                // reported as part of the audio track
                if t != 0 && !ct.kind.is_audio() && tracks[t - 1].kind.is_audio() && rel < -150 {
                    q_track = &tracks[t - 1];
                }
            }

            let mut q = SubchannelQ::default();
            q.set_status(ADR_POSITION, q_track.flags.control());
            q.track = decimal_to_bcd(ct.number);
            q.index = decimal_to_bcd(index as u8);
            q.set_ap_timestamp(self.sectors.len() as i32);
            q.set_timestamp(q_rel);

            let pause = index == 0;

            let job = if gap {
                SectorJob::Gap(GapSector {
                    track_type: q_track.kind,
                    q,
                    pause,
                })
            } else {
                let size = stored_sector_size(q_track.kind)?;
                let sector = BlobSector {
                    blob: blob.clone(),
                    offset: self.blob_offset,
                    q,
                    pause,
                };

                self.blob_offset += size;
                self.blob_msf += 1;

                match size {
                    2048 => SectorJob::Mode1_2048(sector),
                    2336 => SectorJob::Mode2_2336(sector),
                    _ => SectorJob::Raw2352(sector),
                }
            };

            self.sectors.push(job);
            rel += 1;

            let done = if ct.final_in_file {
                self.blob_offset >= blob_len
            } else {
                match tracks.get(t + 1).and_then(|next| next.indexes.first()) {
                    Some(next) => self.blob_msf >= next.file_msf.sector_index(),
                    None => true,
                }
            };

            if done {
                break;
            }
        }

        for _ in 0..ct.postgap.sector_index() {
            let mut q = SubchannelQ::default();
            q.set_status(ADR_POSITION, ct.flags.control());
            q.track = decimal_to_bcd(ct.number);
            q.index = decimal_to_bcd(index as u8);
            q.set_ap_timestamp(self.sectors.len() as i32);
            q.set_timestamp(rel);

            self.sectors.push(SectorJob::Gap(GapSector {
                track_type: ct.kind,
                q,
                pause: true,
            }));

            rel += 1;
        }

        Ok(())
    }
}

/// Build the disc described by `compiled`. The sheet must have compiled
/// without errors.
pub fn mount(
    name: String,
    compiled: &CompiledCue,
    fs: &dyn FileSystem,
    decoder: &dyn AudioDecoder,
    policy: &MountPolicy,
) -> CdResult<Disc> {
    let blobs = mount_blobs(compiled, fs, decoder)?;

    let mut layout = Layout {
        compiled,
        blobs,
        policy,
        sectors: Vec::new(),
        sessions: Vec::new(),
        session: DiscSession::new(1),
        blob_index: None,
        blob_offset: 0,
        blob_msf: 0,
    };

    for t in 0..compiled.tracks.len() {
        layout.track(t)?;
    }

    layout.close_session()?;
    layout.sessions.push(layout.session);

    let mut disc = Disc::new(name, policy.clone());

    disc.sessions = layout.sessions;
    disc.sectors = layout.sectors;
    disc.cd_text = compiled.cd_text.clone();
    disc.catalog = compiled.catalog.clone();

    for t in &compiled.tracks {
        if !t.cd_text.is_empty() {
            disc.track_cd_text.insert(t.number, t.cd_text.clone());
        }
    }

    disc.finalize()?;

    debug!(
        "Mounted {}: {} sessions, {} sectors",
        disc.name,
        disc.sessions.len(),
        disc.sectors.len()
    );

    Ok(disc)
}
