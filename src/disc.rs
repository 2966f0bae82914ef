//! Mounted disc: sessions, TOC, tracks and the per-LBA sector jobs

use std::collections::BTreeMap;
use std::fmt;

use crate::bcd::bcd_to_decimal;
use crate::config::MountPolicy;
use crate::msf::{Msf, LBA_MSF_OFFSET};
use crate::reader::{DiscSectorReader, ReaderPolicy};
use crate::sbi::SbiPatches;
use crate::subchannel::{Control, RawTocEntry};
use crate::synth::{LeadOut, SectorJob};
use crate::{CdResult, SessionFormat};

/// Number of the track representing the lead-out in the track lists
pub const LEADOUT_TRACK: u8 = 0xa0;

/// LBA of the lead-in track, far before anything addressable
pub const LEADIN_LBA: i32 = -(99 * 4500 + 99 * 75 + 99);

/// CD-Text fields captured from a cue sheet
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CdText {
    /// SONGWRITER
    pub songwriter: Option<String>,
    /// PERFORMER
    pub performer: Option<String>,
    /// TITLE
    pub title: Option<String>,
    /// ISRC (tracks only)
    pub isrc: Option<String>,
}

impl CdText {
    /// True if no field is set
    pub fn is_empty(&self) -> bool {
        self.songwriter.is_none()
            && self.performer.is_none()
            && self.title.is_none()
            && self.isrc.is_none()
    }
}

/// One entry of the TOC track table
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TocItem {
    /// Start of the track
    pub lba: i32,
    /// Track control flags
    pub control: Control,
    /// False for the unused slots
    pub exists: bool,
}

/// Table of contents of one session, rebuilt from the raw lead-in
/// entries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscToc {
    /// First information track
    pub first_recorded_track: u8,
    /// Last information track
    pub last_recorded_track: u8,
    /// Format from the A0 entry
    pub session_format: SessionFormat,
    /// Indexed by track number, `[0]` is never used and `[100]` is the
    /// lead-out
    pub items: [TocItem; 101],
}

impl Default for DiscToc {
    fn default() -> DiscToc {
        DiscToc {
            first_recorded_track: 1,
            last_recorded_track: 0,
            session_format: SessionFormat::CdDaCdRom,
            items: [TocItem::default(); 101],
        }
    }
}

impl DiscToc {
    /// Decode raw TOC entries. Missing A0/A1 pointers fall back to the
    /// smallest and largest track number seen.
    pub fn from_raw_entries(entries: &[RawTocEntry]) -> DiscToc {
        let mut toc = DiscToc::default();
        let mut min_track = 100;
        let mut max_track = 1;
        let mut first = None;
        let mut last = None;
        let mut format = None;

        for entry in entries {
            let q = &entry.q;

            match q.index {
                0xa0 => {
                    first = Some(bcd_to_decimal(q.ap_min));
                    format = SessionFormat::from_raw(q.ap_sec);
                }
                0xa1 => last = Some(bcd_to_decimal(q.ap_min)),
                0xa2 => {
                    toc.items[100] = TocItem {
                        lba: ap_lba(entry),
                        control: q.control(),
                        exists: true,
                    };
                }
                point => {
                    let track = bcd_to_decimal(point);

                    if (1..=99).contains(&track) {
                        min_track = min_track.min(track);
                        max_track = max_track.max(track);

                        toc.items[track as usize] = TocItem {
                            lba: ap_lba(entry),
                            control: q.control(),
                            exists: true,
                        };
                    }
                }
            }
        }

        toc.first_recorded_track = first.unwrap_or(if min_track == 100 { 1 } else { min_track });
        toc.last_recorded_track = last.unwrap_or(max_track);
        toc.session_format = format.unwrap_or(SessionFormat::CdDaCdRom);

        toc
    }

    /// LBA of the lead-out
    pub fn leadout_lba(&self) -> i32 {
        self.items[100].lba
    }
}

fn ap_lba(entry: &RawTocEntry) -> i32 {
    entry.q.ap_timestamp().map(|t| t as i32).unwrap_or(0) - LBA_MSF_OFFSET
}

/// A track as seen by the drive. Sessions also list a lead-in track
/// (number 0) and a lead-out track (`LEADOUT_TRACK`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscTrack {
    /// Track number
    pub number: u8,
    /// 0 for audio, otherwise the CD-ROM mode of the first sector
    pub mode: u8,
    /// Control flags
    pub control: Control,
    /// First sector
    pub lba: i32,
    /// Position of the next track in the session's track list
    pub next: Option<usize>,
}

impl DiscTrack {
    /// True for data tracks
    pub fn is_data(&self) -> bool {
        self.control.is_data()
    }

    /// True for audio tracks
    pub fn is_audio(&self) -> bool {
        !self.is_data()
    }

    /// Start of the track as an absolute MSF
    pub fn msf(&self) -> Option<Msf> {
        Msf::from_lba(self.lba)
    }
}

/// One session of the disc
#[derive(Clone, Debug)]
pub struct DiscSession {
    /// Session number, starting at 1
    pub number: u8,
    /// Lead-in entries captured while laying out the sectors
    pub raw_toc: Vec<RawTocEntry>,
    /// TOC decoded from `raw_toc`
    pub toc: DiscToc,
    /// Lead-in, information tracks and lead-out, in this order
    pub tracks: Vec<DiscTrack>,
}

impl DiscSession {
    /// Empty session
    pub fn new(number: u8) -> DiscSession {
        DiscSession {
            number,
            raw_toc: Vec::new(),
            toc: DiscToc::default(),
            tracks: Vec::new(),
        }
    }

    /// Lead-out LBA from the TOC
    pub fn leadout_lba(&self) -> i32 {
        self.toc.leadout_lba()
    }

    /// Information tracks (without the lead-in and lead-out)
    pub fn information_tracks(&self) -> &[DiscTrack] {
        match self.tracks.len() {
            0..=2 => &[],
            n => &self.tracks[1..n - 1],
        }
    }

    /// Look a track up by number
    pub fn track(&self, number: u8) -> Option<&DiscTrack> {
        self.information_tracks().iter().find(|t| t.number == number)
    }

    /// Lead-in track
    pub fn leadin_track(&self) -> Option<&DiscTrack> {
        self.tracks.first()
    }

    /// Lead-out track
    pub fn leadout_track(&self) -> Option<&DiscTrack> {
        self.tracks.last().filter(|t| t.number == LEADOUT_TRACK)
    }

    /// Information track containing `lba`
    pub fn track_at(&self, lba: i32) -> Option<&DiscTrack> {
        if lba >= self.leadout_lba() {
            return None;
        }

        self.information_tracks()
            .iter()
            .rev()
            .find(|t| t.lba <= lba)
    }
}

/// A mounted disc
pub struct Disc {
    /// Name of the image, for display
    pub name: String,
    pub(crate) sessions: Vec<DiscSession>,
    pub(crate) sectors: Vec<SectorJob>,
    pub(crate) leadout: Option<SectorJob>,
    pub(crate) policy: MountPolicy,
    pub(crate) cd_text: CdText,
    pub(crate) track_cd_text: BTreeMap<u8, CdText>,
    pub(crate) catalog: Option<String>,
    pub(crate) warnings: Vec<String>,
    pub(crate) sbi: Option<SbiPatches>,
}

impl Disc {
    /// Empty disc, filled in by the mounting code
    pub(crate) fn new(name: String, policy: MountPolicy) -> Disc {
        Disc {
            name,
            sessions: Vec::new(),
            sectors: Vec::new(),
            leadout: None,
            policy,
            cd_text: CdText::default(),
            track_cd_text: BTreeMap::new(),
            catalog: None,
            warnings: Vec::new(),
            sbi: None,
        }
    }

    /// All the sessions, in order
    pub fn sessions(&self) -> &[DiscSession] {
        &self.sessions
    }

    /// Session `number`, starting at 1
    pub fn session(&self, number: u8) -> Option<&DiscSession> {
        match number {
            0 => None,
            n => self.sessions.get(n as usize - 1),
        }
    }

    /// Last session of the disc
    pub fn last_session(&self) -> Option<&DiscSession> {
        self.sessions.last()
    }

    /// Job producing the sector at `lba`, if any. Everything past the
    /// lead-out of the last session is served by the lead-out
    /// generator.
    pub fn sector_job(&self, lba: i32) -> Option<&SectorJob> {
        if let (Some(leadout), Some(session)) = (&self.leadout, self.sessions.last()) {
            if lba >= session.leadout_lba() {
                return Some(leadout);
            }
        }

        let index = lba.checked_add(LBA_MSF_OFFSET)?;

        if index < 0 {
            return None;
        }

        self.sectors.get(index as usize)
    }

    /// Number of sectors backed by a job, starting at LBA -150
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Policy the disc was mounted with
    pub fn policy(&self) -> &MountPolicy {
        &self.policy
    }

    /// Disc-wide CD-Text
    pub fn cd_text(&self) -> &CdText {
        &self.cd_text
    }

    /// CD-Text of track `number`
    pub fn track_cd_text(&self, number: u8) -> Option<&CdText> {
        self.track_cd_text.get(&number)
    }

    /// Media catalog number
    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    /// Everything that looked wrong in the image but didn't prevent
    /// mounting it
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// SBI patches applied to the disc
    pub fn sbi(&self) -> Option<&SbiPatches> {
        self.sbi.as_ref()
    }

    /// Rebuild the TOC and track list of every session from the raw TOC
    /// entries, then install the lead-out generator
    pub(crate) fn finalize(&mut self) -> CdResult<()> {
        for i in 0..self.sessions.len() {
            let toc = DiscToc::from_raw_entries(&self.sessions[i].raw_toc);
            let tracks = self.synthesize_tracks(&toc)?;

            let session = &mut self.sessions[i];
            session.toc = toc;
            session.tracks = tracks;
        }

        self.leadout = self.sessions.last().and_then(|session| {
            let leadout = session.leadout_track()?;
            let last = session.information_tracks().last()?;

            Some(SectorJob::LeadOut(LeadOut::new(
                session.leadout_lba(),
                leadout.control,
                last.control,
                session.toc.session_format,
            )))
        });

        Ok(())
    }

    fn synthesize_tracks(&self, toc: &DiscToc) -> CdResult<Vec<DiscTrack>> {
        let policy = ReaderPolicy {
            deterministic_clear: false,
            ..ReaderPolicy::default()
        };
        let mut reader = DiscSectorReader::with_policy(self, policy);

        let mut tracks = vec![DiscTrack {
            number: 0,
            mode: 0,
            control: Control::NONE,
            lba: LEADIN_LBA,
            next: None,
        }];

        for number in toc.first_recorded_track..=toc.last_recorded_track {
            let item = match toc.items.get(number as usize) {
                Some(&item) if number != 0 => item,
                _ => continue,
            };

            let mode = if item.control.is_data() {
                reader.read_mode(item.lba)?
            } else {
                0
            };

            tracks.push(DiscTrack {
                number,
                mode,
                control: item.control,
                lba: item.lba,
                next: None,
            });
        }

        let (control, mode) = match tracks.last() {
            Some(t) if t.number != 0 => (t.control, t.mode),
            _ => (Control::NONE, 0),
        };

        tracks.push(DiscTrack {
            number: LEADOUT_TRACK,
            mode,
            control,
            lba: toc.leadout_lba(),
            next: None,
        });

        let count = tracks.len();
        for (i, t) in tracks.iter_mut().enumerate().take(count - 1) {
            t.next = Some(i + 1);
        }

        if count > 2 {
            tracks[0].control = tracks[1].control;
            tracks[0].mode = tracks[1].mode;
        }

        Ok(tracks)
    }
}

impl fmt::Debug for Disc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Disc")
            .field("name", &self.name)
            .field("sessions", &self.sessions)
            .field("sectors", &self.sectors.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::subchannel::SubchannelQ;
    use crate::synth::GapSector;
    use crate::TrackType;

    #[test]
    fn toc_from_raw_entries() {
        let mut entries = vec![
            RawTocEntry::track(1, Control::DATA, 150),
            RawTocEntry::track(2, Control::NONE, 1150),
            RawTocEntry::track(3, Control::NONE, 2150),
        ];
        entries.extend_from_slice(&RawTocEntry::session_pointers(
            1,
            3,
            SessionFormat::CdXa,
            3150,
        ));

        let toc = DiscToc::from_raw_entries(&entries);

        assert_eq!(toc.first_recorded_track, 1);
        assert_eq!(toc.last_recorded_track, 3);
        assert_eq!(toc.session_format, SessionFormat::CdXa);
        assert_eq!(toc.items[1].lba, 0);
        assert!(toc.items[1].control.is_data());
        assert_eq!(toc.items[3].lba, 2000);
        assert!(!toc.items[3].control.is_data());
        assert!(!toc.items[4].exists);
        assert_eq!(toc.leadout_lba(), 3000);
    }

    #[test]
    fn toc_without_pointers() {
        let entries = [
            RawTocEntry::track(4, Control::NONE, 150),
            RawTocEntry::track(5, Control::NONE, 300),
        ];

        let toc = DiscToc::from_raw_entries(&entries);

        assert_eq!(toc.first_recorded_track, 4);
        assert_eq!(toc.last_recorded_track, 5);
        assert_eq!(toc.session_format, SessionFormat::CdDaCdRom);
        assert!(!toc.items[100].exists);

        let empty = DiscToc::from_raw_entries(&[]);
        assert_eq!(empty.first_recorded_track, 1);
        assert_eq!(empty.last_recorded_track, 1);
    }

    fn audio_disc(sectors: usize) -> Disc {
        let mut disc = Disc::new("test".into(), MountPolicy::default());
        let mut session = DiscSession::new(1);

        session
            .raw_toc
            .push(RawTocEntry::track(1, Control::NONE, 150));
        session.raw_toc.extend_from_slice(&RawTocEntry::session_pointers(
            1,
            1,
            SessionFormat::CdDaCdRom,
            sectors as i32,
        ));

        disc.sessions.push(session);

        for _ in 0..sectors {
            disc.sectors.push(SectorJob::Gap(GapSector {
                track_type: TrackType::Audio,
                q: SubchannelQ::default(),
                pause: false,
            }));
        }

        disc.finalize().unwrap();

        disc
    }

    #[test]
    fn tracks_and_providers() {
        let disc = audio_disc(400);
        let session = disc.session(1).unwrap();

        assert!(disc.session(0).is_none());
        assert!(disc.session(2).is_none());

        assert_eq!(session.tracks.len(), 3);
        assert_eq!(session.tracks[0].lba, -453024);
        assert_eq!(session.tracks[0].next, Some(1));
        assert_eq!(session.tracks[1].number, 1);
        assert_eq!(session.tracks[1].lba, 0);
        assert_eq!(session.tracks[1].mode, 0);
        assert_eq!(session.tracks[2].number, LEADOUT_TRACK);
        assert_eq!(session.tracks[2].lba, 250);
        assert_eq!(session.tracks[2].next, None);

        assert_eq!(session.track_at(100).map(|t| t.number), Some(1));
        assert!(session.track_at(250).is_none());
        assert!(session.track_at(-1).is_none());

        assert!(matches!(disc.sector_job(-150), Some(SectorJob::Gap(_))));
        assert!(matches!(disc.sector_job(249), Some(SectorJob::Gap(_))));
        assert!(matches!(disc.sector_job(250), Some(SectorJob::LeadOut(_))));
        assert!(matches!(disc.sector_job(100_000), Some(SectorJob::LeadOut(_))));
        assert!(disc.sector_job(-151).is_none());
    }
}
