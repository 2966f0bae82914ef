//! Turn parsed cue commands into a list of files, tracks and sessions
//! ready to be laid out on a disc.

use std::path::PathBuf;

use log::{debug, error, warn};

use super::parser::{CueCommand, CueFile, CueTrackFlags};
use super::resolver::CueFileResolver;
use crate::audio::AudioDecoder;
use crate::blob::{EcmBlob, WaveBlob};
use crate::disc::CdText;
use crate::fs::FileSystem;
use crate::msf::Msf;
use crate::{SessionFormat, TrackType};

/// Load cost of a file that has to go through the audio decoder
const LOAD_COST_DECODE: u32 = 10;
/// Load cost of an ECM file (the block index is built on load)
const LOAD_COST_ECM: u32 = 1;

/// What a resolved file turned out to be
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CueFileKind {
    /// Unrecognized, mounted as raw data
    Unknown,
    /// Raw sectors
    Bin,
    /// CD audio in a RIFF/WAVE container
    Wave,
    /// ECM-compressed sectors
    Ecm,
    /// Compressed audio (or a WAVE file that isn't CD PCM)
    DecodeAudio,
}

/// A file referenced by the sheet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFile {
    /// Resolved path
    pub path: PathBuf,
    /// Detected type
    pub kind: CueFileKind,
}

/// `INDEX` of a track
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CueIndex {
    /// Index number
    pub number: u8,
    /// Position relative to the start of the file
    pub file_msf: Msf,
}

/// A compiled track
#[derive(Clone, Debug)]
pub struct CueTrack {
    /// Track number
    pub number: u8,
    /// Session the track belongs to, starting at 1
    pub session: u32,
    /// Position of the track's file in `CompiledCue::files`, `None` if
    /// the track came without a file
    pub file_index: Option<usize>,
    /// Flags, `DATA` is set for every non-audio track
    pub flags: CueTrackFlags,
    /// Sector format
    pub kind: TrackType,
    /// `PREGAP`: silence not stored in the file
    pub pregap: Msf,
    /// `POSTGAP`: silence not stored in the file
    pub postgap: Msf,
    /// Indexes in file order. Index 0 is always present once the track
    /// is closed.
    pub indexes: Vec<CueIndex>,
    /// First track of its file
    pub first_in_file: bool,
    /// Last track of its file
    pub final_in_file: bool,
    /// Track CD-Text
    pub cd_text: CdText,
}

impl CueTrack {
    /// MSF of index `number`
    pub fn index(&self, number: u8) -> Option<Msf> {
        self.indexes
            .iter()
            .find(|i| i.number == number)
            .map(|i| i.file_msf)
    }
}

/// Per-session bookkeeping
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// First track of the session, 0 if the session is empty
    pub first_recorded_track: u8,
    /// Last track of the session
    pub last_recorded_track: u8,
    /// Format, decided by the first Mode 2 or CD-i track
    pub format: SessionFormat,
}

impl Default for SessionInfo {
    fn default() -> SessionInfo {
        SessionInfo {
            first_recorded_track: 0,
            last_recorded_track: 0,
            format: SessionFormat::CdDaCdRom,
        }
    }
}

/// Output of the compiler
#[derive(Clone, Debug, Default)]
pub struct CompiledCue {
    /// One entry per `FILE` command, `None` for unresolved files
    pub files: Vec<Option<CompiledFile>>,
    /// Tracks in sheet order
    pub tracks: Vec<CueTrack>,
    /// Session 1 first
    pub sessions: Vec<SessionInfo>,
    /// Disc CD-Text
    pub cd_text: CdText,
    /// `CATALOG`
    pub catalog: Option<String>,
    /// `CDTEXTFILE`
    pub cd_text_file: Option<String>,
    /// Cost of mounting the disc: 10 if audio has to be decoded, 1 for
    /// ECM files, 0 otherwise
    pub load_time: u32,
    /// Non-fatal problems
    pub warnings: Vec<String>,
    /// Problems preventing the disc from being mounted
    pub errors: Vec<String>,
}

impl CompiledCue {
    /// True if the disc can't be mounted
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

struct Compiler<'a> {
    fs: &'a dyn FileSystem,
    resolver: &'a CueFileResolver,
    out: CompiledCue,
    /// True between a FILE command and the next one
    in_file: bool,
    /// Resolved current file
    file_index: Option<usize>,
    file_has_track: bool,
    track: Option<usize>,
    format_determined: bool,
}

impl<'a> Compiler<'a> {
    fn warn(&mut self, msg: String) {
        warn!("{}", msg);
        self.out.warnings.push(msg);
    }

    fn error(&mut self, msg: String) {
        error!("{}", msg);
        self.out.errors.push(msg);
    }

    fn cd_text(&mut self) -> &mut CdText {
        match self.track {
            Some(t) => &mut self.out.tracks[t].cd_text,
            None => &mut self.out.cd_text,
        }
    }

    fn current_session(&self) -> u32 {
        self.out.sessions.len() as u32
    }

    fn command(&mut self, cmd: &CueCommand) {
        match cmd {
            CueCommand::Catalog(c) => {
                if self.out.catalog.is_none() {
                    self.out.catalog = Some(c.clone());
                }
            }
            CueCommand::CdTextFile(f) => {
                if self.out.cd_text_file.is_none() {
                    self.out.cd_text_file = Some(f.clone());
                }
            }
            CueCommand::Rem(_) | CueCommand::Comment(_) => (),
            CueCommand::Performer(s) => self.cd_text().performer = Some(s.clone()),
            CueCommand::Songwriter(s) => self.cd_text().songwriter = Some(s.clone()),
            CueCommand::Title(s) => self.cd_text().title = Some(s.clone()),
            CueCommand::Isrc(s) => match self.track {
                Some(t) => self.out.tracks[t].cd_text.isrc = Some(s.clone()),
                None => self.warn(format!("ISRC {} outside of a track", s)),
            },
            CueCommand::Flags(f) => match self.track {
                Some(t) => {
                    let track = &mut self.out.tracks[t];
                    track.flags = track.flags | *f;
                }
                None => self.warn("FLAGS outside of a track".into()),
            },
            CueCommand::Session(n) => self.session(*n),
            CueCommand::File { path, .. } => self.open_file(path),
            CueCommand::Track { number, kind } => self.open_track(*number, *kind),
            CueCommand::Index { number, timestamp } => match self.track {
                Some(t) => self.out.tracks[t].indexes.push(CueIndex {
                    number: *number,
                    file_msf: *timestamp,
                }),
                None => self.error(format!("INDEX {:02} outside of a track", number)),
            },
            CueCommand::Pregap(msf) => match self.track {
                Some(t) => self.out.tracks[t].pregap = *msf,
                None => self.warn("PREGAP outside of a track".into()),
            },
            CueCommand::Postgap(msf) => match self.track {
                Some(t) => self.out.tracks[t].postgap = *msf,
                None => self.warn("POSTGAP outside of a track".into()),
            },
        }
    }

    fn session(&mut self, n: u32) {
        let current = self.current_session();

        if n == current {
            return;
        }

        if n != current + 1 {
            self.warn(format!(
                "Session {} doesn't follow session {}, ignoring",
                n, current
            ));
            return;
        }

        self.out.sessions.push(SessionInfo::default());
        self.format_determined = false;
    }

    fn open_file(&mut self, path: &str) {
        self.close_file();

        self.in_file = true;
        self.file_has_track = false;

        let candidates = self.resolver.resolve(path);

        let chosen = match candidates.first() {
            Some(c) => c.clone(),
            None => {
                self.error(format!("Couldn't resolve referenced file {}", path));
                self.out.files.push(None);
                self.file_index = None;
                return;
            }
        };

        if candidates.len() > 1 {
            self.warn(format!(
                "Multiple options resolving referenced file {}, choosing {}",
                path,
                chosen.display()
            ));
        }

        let kind = self.classify(&chosen);

        debug!("FILE {} resolved to {} ({:?})", path, chosen.display(), kind);

        self.file_index = Some(self.out.files.len());
        self.out.files.push(Some(CompiledFile { path: chosen, kind }));
    }

    fn classify(&mut self, path: &std::path::Path) -> CueFileKind {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "bin" | "img" | "raw" | "iso" => CueFileKind::Bin,
            "wav" => match self.fs.open(path).and_then(WaveBlob::load) {
                Ok(_) => CueFileKind::Wave,
                Err(e) => {
                    debug!("{} needs decoding: {}", path.display(), e);
                    CueFileKind::DecodeAudio
                }
            },
            "ape" | "mp3" | "mpc" | "flac" => CueFileKind::DecodeAudio,
            "ecm" => {
                let is_ecm = match self.fs.open(path) {
                    Ok(mut f) => EcmBlob::has_magic(&mut f),
                    Err(_) => false,
                };

                if is_ecm {
                    CueFileKind::Ecm
                } else {
                    self.error(format!("{} is not an ECM file", path.display()));
                    CueFileKind::Unknown
                }
            }
            _ => {
                self.error(format!("Unknown file type for {}", path.display()));
                CueFileKind::Unknown
            }
        }
    }

    fn close_file(&mut self) {
        if !self.in_file {
            return;
        }

        if let Some(t) = self.track {
            self.out.tracks[t].final_in_file = true;
        }

        self.in_file = false;
        self.file_index = None;
    }

    fn open_track(&mut self, number: u8, kind: TrackType) {
        self.close_track();

        if !self.in_file {
            self.error(format!("TRACK {:02} without a FILE", number));
        }

        let first_in_file = self.in_file && !self.file_has_track;

        if self.in_file {
            self.file_has_track = true;
        }

        let flags = if kind.is_audio() {
            CueTrackFlags::NONE
        } else {
            CueTrackFlags::DATA
        };

        let session = self.current_session();

        if let Some(info) = self.out.sessions.last_mut() {
            if info.first_recorded_track == 0 {
                info.first_recorded_track = number;
            }
            info.last_recorded_track = number;

            if !self.format_determined {
                if let Some(format) = kind.session_format() {
                    info.format = format;
                    self.format_determined = true;
                }
            }
        }

        self.track = Some(self.out.tracks.len());
        self.out.tracks.push(CueTrack {
            number,
            session,
            file_index: self.file_index,
            flags,
            kind,
            pregap: Msf::ZERO,
            postgap: Msf::ZERO,
            indexes: Vec::new(),
            first_in_file,
            final_in_file: false,
            cd_text: CdText::default(),
        });
    }

    fn close_track(&mut self) {
        let t = match self.track.take() {
            Some(t) => t,
            None => return,
        };

        let track = &mut self.out.tracks[t];
        let number = track.number;

        if track.indexes.is_empty() {
            self.error(format!("Track {:02} has no index", number));
            return;
        }

        if track.indexes[0].number != 0 {
            let file_msf = if track.first_in_file {
                Msf::ZERO
            } else {
                track.indexes[0].file_msf
            };

            track.indexes.insert(0, CueIndex { number: 0, file_msf });
        }

        let has_index1 = track.indexes.get(1).map(|i| i.number) == Some(1);
        let ordered = track
            .indexes
            .windows(2)
            .all(|w| w[0].file_msf <= w[1].file_msf);

        if !has_index1 {
            self.error(format!("Track {:02} has no INDEX 01", number));
        }

        if !ordered {
            self.error(format!("Track {:02} has indexes out of order", number));
        }
    }

    fn finish(&mut self, decoder: &dyn AudioDecoder) {
        self.close_file();
        self.close_track();

        let pregap = self.out.tracks.first().map(|t| t.pregap.sector_index());

        match pregap {
            Some(p) => {
                if p != 0 && p != 150 {
                    self.warn(format!(
                        "Track 1 pregap is {} sectors, forcing it to 150",
                        p
                    ));
                }

                if let Some(t) = self.out.tracks.first_mut() {
                    t.pregap = Msf::from_signed_sector(150);
                }
            }
            None => self.error("No track in cue sheet".into()),
        }

        if self.out.files.is_empty() {
            self.error("No FILE in cue sheet".into());
        }

        let mut needs_codec = false;

        for file in self.out.files.iter().flatten() {
            match file.kind {
                CueFileKind::DecodeAudio => {
                    needs_codec = true;
                    self.out.load_time = self.out.load_time.max(LOAD_COST_DECODE);
                }
                CueFileKind::Ecm => self.out.load_time = self.out.load_time.max(LOAD_COST_ECM),
                _ => (),
            }
        }

        if needs_codec && !decoder.service_available() {
            self.warn("Compressed audio needs decoding but no decoder is available".into());
        }
    }
}

/// Compile `cue`. Problems are collected in the result, check
/// `CompiledCue::has_error` before mounting.
pub fn compile(
    cue: &CueFile,
    resolver: &CueFileResolver,
    fs: &dyn FileSystem,
    decoder: &dyn AudioDecoder,
) -> CompiledCue {
    let mut compiler = Compiler {
        fs,
        resolver,
        out: CompiledCue {
            sessions: vec![SessionInfo::default()],
            ..CompiledCue::default()
        },
        in_file: false,
        file_index: None,
        file_has_track: false,
        track: None,
        format_determined: false,
    };

    for cmd in &cue.commands {
        compiler.command(cmd);
    }

    compiler.finish(decoder);

    compiler.out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::NoDecoder;
    use crate::cue::parser::parse;
    use crate::fs::MemoryFileSystem;
    use crate::riff::test::build_wave;
    use crate::riff::RiffFmt;
    use std::path::Path;

    fn compile_sheet(fs: &MemoryFileSystem, sheet: &str) -> CompiledCue {
        let cue = parse(sheet, false);
        assert!(!cue.has_error(), "{:?}", cue.errors);

        let resolver = CueFileResolver::new(fs, Path::new(""), false).unwrap();

        compile(&cue, &resolver, fs, &NoDecoder)
    }

    fn fs_with(files: &[(&str, Vec<u8>)]) -> MemoryFileSystem {
        let mut fs = MemoryFileSystem::new();

        for (name, data) in files {
            fs.insert(*name, data.clone());
        }

        fs
    }

    #[test]
    fn single_track() {
        let fs = fs_with(&[("game.bin", vec![0; 2048 * 10])]);
        let c = compile_sheet(
            &fs,
            "FILE \"game.bin\" BINARY\n  TRACK 01 MODE1/2048\n    INDEX 01 00:00:00\n",
        );

        assert!(!c.has_error(), "{:?}", c.errors);
        assert!(c.warnings.is_empty());
        assert_eq!(c.files.len(), 1);
        assert_eq!(
            c.files[0],
            Some(CompiledFile {
                path: PathBuf::from("game.bin"),
                kind: CueFileKind::Bin
            })
        );

        let t = &c.tracks[0];
        assert_eq!(t.number, 1);
        assert_eq!(t.session, 1);
        assert_eq!(t.file_index, Some(0));
        assert!(t.flags.contains(CueTrackFlags::DATA));
        assert!(t.first_in_file);
        assert!(t.final_in_file);
        assert_eq!(t.pregap.sector_index(), 150);
        assert_eq!(t.indexes.len(), 2);
        assert_eq!(t.index(0), Some(Msf::ZERO));
        assert_eq!(t.index(1), Some(Msf::ZERO));
        assert_eq!(c.load_time, 0);

        assert_eq!(c.sessions.len(), 1);
        assert_eq!(c.sessions[0].first_recorded_track, 1);
        assert_eq!(c.sessions[0].last_recorded_track, 1);
        assert_eq!(c.sessions[0].format, SessionFormat::CdDaCdRom);
    }

    #[test]
    fn multiple_tracks_per_file() {
        let fs = fs_with(&[("disc.bin", Vec::new())]);
        let c = compile_sheet(
            &fs,
            r#"CATALOG 0123456789012
PERFORMER "Someone"
FILE "disc.bin" BINARY
  TRACK 01 MODE2/2352
    INDEX 01 00:00:00
  TRACK 02 AUDIO
    TITLE "Intro"
    FLAGS DCP PRE
    INDEX 00 01:00:00
    INDEX 01 01:02:00
  TRACK 03 AUDIO
    INDEX 01 02:00:00
"#,
        );

        assert!(!c.has_error(), "{:?}", c.errors);
        assert_eq!(c.catalog.as_deref(), Some("0123456789012"));
        assert_eq!(c.cd_text.performer.as_deref(), Some("Someone"));
        assert_eq!(c.sessions[0].format, SessionFormat::CdXa);
        assert_eq!(c.sessions[0].last_recorded_track, 3);

        let t2 = &c.tracks[1];
        assert!(!t2.first_in_file);
        assert!(!t2.final_in_file);
        assert_eq!(t2.flags, CueTrackFlags::DCP | CueTrackFlags::PRE);
        assert_eq!(t2.cd_text.title.as_deref(), Some("Intro"));
        assert!(c.cd_text.title.is_none());

        // Missing index 0 is placed at index 1
        let t3 = &c.tracks[2];
        assert_eq!(t3.index(0), Msf::from_decimal(2, 0, 0));
        assert!(t3.final_in_file);
        assert!(!c.tracks[0].final_in_file);
    }

    #[test]
    fn pregap_correction() {
        let fs = fs_with(&[("a.bin", Vec::new())]);
        let c = compile_sheet(
            &fs,
            "FILE a.bin BINARY\nTRACK 01 AUDIO\nPREGAP 00:01:00\nINDEX 01 00:00:00\n",
        );

        assert!(!c.has_error());
        assert_eq!(c.tracks[0].pregap.sector_index(), 150);
        assert_eq!(c.warnings.len(), 1);
        assert!(c.warnings[0].contains("pregap"));

        let c = compile_sheet(
            &fs,
            "FILE a.bin BINARY\nTRACK 01 AUDIO\nPREGAP 00:02:00\nINDEX 01 00:00:00\n",
        );
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn sessions() {
        let fs = fs_with(&[("a.bin", Vec::new()), ("b.bin", Vec::new())]);
        let c = compile_sheet(
            &fs,
            r#"REM SESSION 01
FILE a.bin BINARY
  TRACK 01 AUDIO
    INDEX 01 00:00:00
  TRACK 02 AUDIO
    INDEX 01 03:00:00
REM SESSION 03
REM SESSION 02
FILE b.bin BINARY
  TRACK 03 CDI/2352
    INDEX 01 00:00:00
"#,
        );

        assert!(!c.has_error(), "{:?}", c.errors);
        assert_eq!(c.warnings.len(), 1);
        assert_eq!(c.sessions.len(), 2);
        assert_eq!(c.sessions[0].first_recorded_track, 1);
        assert_eq!(c.sessions[0].last_recorded_track, 2);
        assert_eq!(c.sessions[1].first_recorded_track, 3);
        assert_eq!(c.sessions[1].format, SessionFormat::Cdi);
        assert_eq!(c.tracks[2].session, 2);
        assert_eq!(c.tracks[2].file_index, Some(1));
        assert!(c.tracks[1].final_in_file);
        assert!(c.tracks[2].first_in_file);
    }

    #[test]
    fn file_classification() {
        let wave = build_wave(&RiffFmt::cd_audio(), &[0; 8], false);
        let mut mono = RiffFmt::cd_audio();
        mono.channels = 1;

        let fs = fs_with(&[
            ("t1.wav", wave),
            ("t2.wav", build_wave(&mono, &[0; 8], false)),
            ("t3.flac", Vec::new()),
            ("t4.ecm", b"ECM\0".to_vec()),
        ]);

        let c = compile_sheet(
            &fs,
            r#"FILE t1.wav WAVE
TRACK 01 AUDIO
INDEX 01 00:00:00
FILE t2.wav WAVE
TRACK 02 AUDIO
INDEX 01 00:00:00
FILE t3.flac WAVE
TRACK 03 AUDIO
INDEX 01 00:00:00
FILE t4.bin BINARY
TRACK 04 MODE1/2352
INDEX 01 00:00:00
"#,
        );

        assert!(!c.has_error(), "{:?}", c.errors);

        let kinds: Vec<CueFileKind> = c.files.iter().flatten().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CueFileKind::Wave,
                CueFileKind::DecodeAudio,
                CueFileKind::DecodeAudio,
                CueFileKind::Ecm
            ]
        );
        assert_eq!(c.load_time, 10);
        // No decoder
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn compile_errors() {
        let fs = fs_with(&[("a.bin", Vec::new()), ("b.txt", Vec::new()), ("c.ecm", Vec::new())]);

        let c = compile_sheet(
            &fs,
            r#"FILE missing.bin BINARY
TRACK 01 AUDIO
INDEX 01 00:00:00
FILE b.txt BINARY
TRACK 02 AUDIO
INDEX 01 00:00:00
FILE c.ecm BINARY
TRACK 03 AUDIO
INDEX 00 00:00:00
FILE a.bin BINARY
TRACK 04 AUDIO
INDEX 01 00:02:00
INDEX 02 00:01:00
"#,
        );

        // Unresolved file, unknown type, bad ECM, missing index 1,
        // indexes out of order
        assert_eq!(c.errors.len(), 5, "{:?}", c.errors);
        assert_eq!(c.files.len(), 4);
        assert!(c.files[0].is_none());
        assert_eq!(c.tracks[0].file_index, None);

        let c = compile_sheet(&fs, "INDEX 01 00:00:00\nTRACK 01 AUDIO\n");

        // INDEX outside of a track, TRACK without a file, track without
        // index, no file
        assert_eq!(c.errors.len(), 4, "{:?}", c.errors);

        let c = compile_sheet(&fs, "REM nothing\n");
        assert_eq!(c.errors.len(), 2, "{:?}", c.errors);
    }
}
