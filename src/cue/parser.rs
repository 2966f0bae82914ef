//! Cue sheet tokenizer and command parser.
//!
//! Parsing never fails outright: malformed lines are reported as
//! warnings (the line or argument is ignored) or errors (the sheet
//! can't be trusted) and parsing carries on so that every problem is
//! reported at once.

use std::fmt;
use std::ops::BitOr;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use log::{error, warn};
use regex::Regex;

use crate::msf::Msf;
use crate::subchannel::Control;
use crate::{CdError, CdResult, TrackType};

/// `REM SESSION nn`, the de-facto multisession extension
static REM_SESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:SESSION) +(\d+)$").unwrap());

/// Type given in a `FILE` command. Mostly informative: the actual file
/// type is detected when the file is resolved.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum CueFileType {
    /// Missing or unknown type
    Unspecified,
    /// Little endian binary
    Binary,
    /// Big endian binary
    Motorola,
    /// AIFF audio
    Aiff,
    /// WAVE audio
    Wave,
    /// MP3 audio
    Mp3,
}

/// Flags given in a `FLAGS` command
#[derive(PartialEq, Eq, Clone, Copy, Default)]
pub struct CueTrackFlags(u8);

impl CueTrackFlags {
    /// No flag
    pub const NONE: CueTrackFlags = CueTrackFlags(0);
    /// Pre-emphasis
    pub const PRE: CueTrackFlags = CueTrackFlags(1);
    /// Digital copy permitted
    pub const DCP: CueTrackFlags = CueTrackFlags(2);
    /// Data track. Never parsed, set by the compiler.
    pub const DATA: CueTrackFlags = CueTrackFlags(4);
    /// Four channel audio
    pub const FOUR_CH: CueTrackFlags = CueTrackFlags(8);
    /// Serial copy management system
    pub const SCMS: CueTrackFlags = CueTrackFlags(64);

    /// Raw flag bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if all the flags in `other` are set
    pub const fn contains(self, other: CueTrackFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Control nibble stored in the Q subchannel. SCMS has no
    /// counterpart.
    pub const fn control(self) -> Control {
        Control::from_bits(self.0 & 0xf)
    }
}

impl BitOr for CueTrackFlags {
    type Output = CueTrackFlags;

    fn bitor(self, rhs: CueTrackFlags) -> CueTrackFlags {
        CueTrackFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for CueTrackFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (CueTrackFlags::PRE, "PRE"),
            (CueTrackFlags::DCP, "DCP"),
            (CueTrackFlags::DATA, "DATA"),
            (CueTrackFlags::FOUR_CH, "4CH"),
            (CueTrackFlags::SCMS, "SCMS"),
        ];

        let set: Vec<&str> = names
            .iter()
            .filter(|&&(flag, _)| self.contains(flag))
            .map(|&(_, name)| name)
            .collect();

        if set.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", set.join("|"))
        }
    }
}

/// A single parsed cue sheet line
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum CueCommand {
    /// Media catalog number
    Catalog(String),
    /// External CD-Text file
    CdTextFile(String),
    /// Start of a new data file
    File {
        /// Path as written in the sheet
        path: String,
        /// Declared type
        kind: CueFileType,
    },
    /// Track flags
    Flags(CueTrackFlags),
    /// Track index, the timestamp is relative to the start of the
    /// current file
    Index {
        /// Index number (0 to 99)
        number: u8,
        /// Position in the file
        timestamp: Msf,
    },
    /// International standard recording code
    Isrc(String),
    /// CD-Text performer
    Performer(String),
    /// Silence appended after the track data
    Postgap(Msf),
    /// Silence inserted before the track data
    Pregap(Msf),
    /// Remark
    Rem(String),
    /// Comment line (starting with `;`) or trailing comment
    Comment(String),
    /// CD-Text songwriter
    Songwriter(String),
    /// CD-Text title
    Title(String),
    /// Start of a new track
    Track {
        /// Track number (1 to 99)
        number: u8,
        /// Declared track type
        kind: TrackType,
    },
    /// `REM SESSION n`
    Session(u32),
}

/// Result of parsing a cue sheet
#[derive(Clone, Debug, Default)]
pub struct CueFile {
    /// Commands in sheet order
    pub commands: Vec<CueCommand>,
    /// Recoverable problems
    pub warnings: Vec<String>,
    /// Fatal problems, along with the line they were found on
    pub errors: Vec<(u32, String)>,
}

impl CueFile {
    /// Returns true if any error was found
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Turn the first error into a `CdError::ParseError` for the sheet
    /// at `path`
    pub fn check(self, path: &Path) -> CdResult<CueFile> {
        match self.errors.first() {
            Some((line, desc)) => Err(CdError::ParseError {
                path: path.to_path_buf(),
                line: *line,
                desc: desc.clone(),
            }),
            None => Ok(self),
        }
    }
}

/// Tokenizer for a single (trimmed) line
struct LineParser<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> LineParser<'a> {
    fn new(line: &'a str) -> LineParser<'a> {
        LineParser { line, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        let b = self.line.as_bytes();

        while self.pos < b.len() && is_whitespace(b[self.pos]) {
            self.pos += 1;
        }
    }

    /// Returns true once every token has been consumed
    fn eof(&mut self) -> bool {
        self.skip_whitespace();

        self.pos >= self.line.len()
    }

    /// Read a whitespace-delimited word
    fn read_token(&mut self) -> Option<&'a str> {
        if self.eof() {
            return None;
        }

        let b = self.line.as_bytes();
        let start = self.pos;

        while self.pos < b.len() && !is_whitespace(b[self.pos]) {
            self.pos += 1;
        }

        Some(&self.line[start..self.pos])
    }

    /// Read a word which may be quoted to include whitespace. A missing
    /// closing quote extends the path to the end of the line.
    fn read_path(&mut self) -> Option<&'a str> {
        if self.eof() {
            return None;
        }

        let b = self.line.as_bytes();

        if b[self.pos] != b'"' {
            return self.read_token().map(|t| t.trim_matches('"'));
        }

        self.pos += 1;
        let start = self.pos;

        while self.pos < b.len() && b[self.pos] != b'"' {
            self.pos += 1;
        }

        let path = &self.line[start..self.pos];

        if self.pos < b.len() {
            // Closing quote
            self.pos += 1;
        }

        Some(path)
    }

    /// Consume the rest of the line
    fn read_rest(&mut self) -> &'a str {
        let rest = &self.line[self.pos.min(self.line.len())..];

        self.pos = self.line.len();

        rest
    }
}

fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Parser state
struct Parser {
    strict: bool,
    line: u32,
    file: CueFile,
    catalog_seen: bool,
    cdtextfile_seen: bool,
    isrc_seen: bool,
}

impl Parser {
    fn warn(&mut self, msg: String) {
        let msg = format!("line {}: {}", self.line, msg);

        warn!("{}", msg);
        self.file.warnings.push(msg);
    }

    fn error(&mut self, msg: String) {
        error!("line {}: {}", self.line, msg);
        self.file.errors.push((self.line, msg));
    }

    fn push(&mut self, cmd: CueCommand) {
        self.file.commands.push(cmd);
    }

    fn parse_line(&mut self, line: &str) {
        let mut p = LineParser::new(line);

        let mut key = match p.read_token() {
            Some(k) => k.to_ascii_uppercase(),
            None => return,
        };

        if !self.strict {
            // Some sheets have garbage (BOMs, stray characters...) at
            // the start of lines
            let start = key
                .find(|c: char| c == ';' || c.is_ascii_alphabetic())
                .unwrap_or(key.len());

            key.drain(..start);
        }

        if key.starts_with(';') {
            self.push(CueCommand::Comment(line.to_string()));
            return;
        }

        match key.as_str() {
            "CATALOG" => {
                if self.catalog_seen {
                    self.warn("Multiple CATALOG commands, ignoring".into());
                    p.read_rest();
                } else if let Some(c) = p.read_token() {
                    self.catalog_seen = true;
                    self.push(CueCommand::Catalog(c.to_string()));
                } else {
                    self.warn("Empty CATALOG command".into());
                }
            }
            "CDTEXTFILE" => {
                if self.cdtextfile_seen {
                    self.warn("Multiple CDTEXTFILE commands, ignoring".into());
                    p.read_rest();
                } else if let Some(path) = p.read_path() {
                    self.cdtextfile_seen = true;
                    self.push(CueCommand::CdTextFile(path.to_string()));
                } else {
                    self.warn("Empty CDTEXTFILE command".into());
                }
            }
            "FILE" => self.command_file(&mut p),
            "FLAGS" => self.command_flags(&mut p),
            "INDEX" => self.command_index(&mut p),
            "ISRC" => {
                if self.isrc_seen {
                    self.warn("Multiple ISRC commands for track, ignoring".into());
                    p.read_rest();
                } else {
                    match p.read_token() {
                        None => self.warn("Empty ISRC command".into()),
                        Some(isrc) if isrc.len() != 12 => {
                            self.warn(format!("Invalid ISRC code ignored: {}", isrc))
                        }
                        Some(isrc) => {
                            self.isrc_seen = true;
                            self.push(CueCommand::Isrc(isrc.to_string()));
                        }
                    }
                }
            }
            "PERFORMER" => {
                let v = p.read_path().unwrap_or("").to_string();
                self.push(CueCommand::Performer(v));
            }
            "SONGWRITER" => {
                let v = p.read_path().unwrap_or("").to_string();
                self.push(CueCommand::Songwriter(v));
            }
            "TITLE" => {
                let v = p.read_path().unwrap_or("").to_string();
                self.push(CueCommand::Title(v));
            }
            "PREGAP" | "POSTGAP" => {
                let z = p.read_token().unwrap_or("");

                match Msf::from_str(z) {
                    Ok(msf) if key == "PREGAP" => self.push(CueCommand::Pregap(msf)),
                    Ok(msf) => self.push(CueCommand::Postgap(msf)),
                    Err(_) => self.error(format!("Invalid {} length: {}", key, z)),
                }
            }
            "REM" => {
                let comment = p.read_rest();

                let session = REM_SESSION
                    .captures(comment.trim())
                    .and_then(|c| c[1].parse::<u32>().ok())
                    .filter(|&n| n > 0);

                match session {
                    Some(n) => self.push(CueCommand::Session(n)),
                    None => self.push(CueCommand::Rem(comment.trim_start().to_string())),
                }
            }
            "TRACK" => self.command_track(&mut p),
            _ => {
                self.warn(format!("Unknown command: {}", key));
                return;
            }
        }

        if !p.eof() {
            let rest = p.read_rest();

            if rest.starts_with(';') {
                self.push(CueCommand::Comment(rest.to_string()));
            } else {
                self.warn(format!("Unexpected text after {} command: {}", key, rest));
            }
        }
    }

    /// FILE path type
    fn command_file(&mut self, p: &mut LineParser) {
        let path = p.read_path().unwrap_or("").to_string();

        let kind = match p.read_token() {
            None => {
                self.error("FILE command is missing the file type".into());
                CueFileType::Unspecified
            }
            Some(t) => match t.to_ascii_uppercase().as_str() {
                "BINARY" => CueFileType::Binary,
                "MOTOROLA" => CueFileType::Motorola,
                "AIFF" => CueFileType::Aiff,
                "WAVE" => CueFileType::Wave,
                "MP3" => CueFileType::Mp3,
                _ => {
                    self.error(format!("Unknown FILE type: {}", t));
                    CueFileType::Unspecified
                }
            },
        };

        self.push(CueCommand::File { path, kind });
    }

    /// FLAGS flag...
    fn command_flags(&mut self, p: &mut LineParser) {
        let mut flags = CueTrackFlags::NONE;

        while let Some(f) = p.read_token() {
            if f.starts_with(';') {
                // Trailing comment
                p.pos -= f.len();
                break;
            }

            flags = match f.to_ascii_uppercase().as_str() {
                "PRE" => flags | CueTrackFlags::PRE,
                "DCP" => flags | CueTrackFlags::DCP,
                "4CH" => flags | CueTrackFlags::FOUR_CH,
                "SCMS" => flags | CueTrackFlags::SCMS,
                _ => {
                    self.warn(format!("Unknown flag: {}", f));
                    flags
                }
            };
        }

        if flags == CueTrackFlags::NONE {
            self.warn("Empty FLAGS command".into());
        }

        self.push(CueCommand::Flags(flags));
    }

    /// INDEX number mm:ss:ff
    fn command_index(&mut self, p: &mut LineParser) {
        let (n, ts) = match (p.read_token(), p.read_token()) {
            (Some(n), Some(ts)) => (n, ts),
            _ => {
                self.error("Incomplete INDEX command".into());
                return;
            }
        };

        let number = match n.parse::<u8>() {
            Ok(n) if n <= 99 => n,
            _ => {
                self.error(format!("Invalid INDEX number: {}", n));
                return;
            }
        };

        let timestamp = if self.strict {
            Msf::from_str(ts)
        } else {
            Msf::parse_lenient(ts)
        };

        match timestamp {
            Ok(timestamp) => self.push(CueCommand::Index { number, timestamp }),
            Err(_) => {
                if self.strict {
                    self.error(format!("Invalid INDEX timestamp: {}", ts));
                } else {
                    self.warn(format!("Invalid INDEX timestamp ignored: {}", ts));
                }
            }
        }
    }

    /// TRACK number type
    fn command_track(&mut self, p: &mut LineParser) {
        let (n, t) = match (p.read_token(), p.read_token()) {
            (Some(n), Some(t)) => (n, t),
            _ => {
                self.error("Incomplete TRACK command".into());
                return;
            }
        };

        let number = match n.parse::<u8>() {
            Ok(n) if (1..=99).contains(&n) => n,
            _ => {
                self.error(format!("Invalid TRACK number: {}", n));
                return;
            }
        };

        let kind = match t.to_ascii_uppercase().as_str() {
            "AUDIO" => TrackType::Audio,
            "CDG" => TrackType::CdG,
            "MODE1/2048" => TrackType::Mode1_2048,
            "MODE1/2352" => TrackType::Mode1_2352,
            "MODE2/2336" => TrackType::Mode2_2336,
            "MODE2/2352" => TrackType::Mode2_2352,
            "CDI/2336" => TrackType::Cdi_2336,
            "CDI/2352" => TrackType::Cdi_2352,
            _ => {
                self.error(format!("Unknown TRACK type: {}", t));
                TrackType::Unknown
            }
        };

        // ISRC is per-track
        self.isrc_seen = false;

        self.push(CueCommand::Track { number, kind });
    }
}

/// Parse the text of a cue sheet
pub fn parse(text: &str, strict: bool) -> CueFile {
    let mut parser = Parser {
        strict,
        line: 0,
        file: CueFile::default(),
        catalog_seen: false,
        cdtextfile_seen: false,
        isrc_seen: false,
    };

    for line in text.lines() {
        parser.line += 1;

        let line = line.trim();

        if !line.is_empty() {
            parser.parse_line(line);
        }
    }

    parser.file
}

#[cfg(test)]
mod test {
    use super::*;

    fn msf(s: &str) -> Msf {
        Msf::from_str(s).unwrap()
    }

    #[test]
    fn tokenizer() {
        let mut p = LineParser::new("FILE \"my  disc.bin\" BINARY");

        assert_eq!(p.read_token(), Some("FILE"));
        assert_eq!(p.read_path(), Some("my  disc.bin"));
        assert_eq!(p.read_token(), Some("BINARY"));
        assert!(p.eof());
        assert_eq!(p.read_token(), None);

        // Unterminated quote runs to the end of the line
        let mut p = LineParser::new("TITLE \"Some title");
        p.read_token();
        assert_eq!(p.read_path(), Some("Some title"));
        assert!(p.eof());

        let mut p = LineParser::new("REM\tfoo bar");
        p.read_token();
        assert_eq!(p.read_rest(), "\tfoo bar");
    }

    #[test]
    fn simple_sheet() {
        let cue = parse(
            "FILE \"game.bin\" BINARY\n\
             \x20 TRACK 01 MODE2/2352\n\
             \x20   INDEX 01 00:00:00\n\
             \x20 TRACK 02 audio\r\n\
             \x20   FLAGS DCP PRE\n\
             \x20   PREGAP 00:02:00\n\
             \x20   INDEX 01 12:34:56\n",
            false,
        );

        assert!(!cue.has_error());
        assert!(cue.warnings.is_empty());
        assert_eq!(
            cue.commands,
            vec![
                CueCommand::File {
                    path: "game.bin".into(),
                    kind: CueFileType::Binary
                },
                CueCommand::Track {
                    number: 1,
                    kind: TrackType::Mode2_2352
                },
                CueCommand::Index {
                    number: 1,
                    timestamp: Msf::ZERO
                },
                CueCommand::Track {
                    number: 2,
                    kind: TrackType::Audio
                },
                CueCommand::Flags(CueTrackFlags::DCP | CueTrackFlags::PRE),
                CueCommand::Pregap(msf("00:02:00")),
                CueCommand::Index {
                    number: 1,
                    timestamp: msf("12:34:56")
                },
            ]
        );
    }

    #[test]
    fn cd_text_and_rem() {
        let cue = parse(
            "CATALOG 0123456789012\n\
             PERFORMER \"Some Band\"\n\
             TITLE Album\n\
             REM GENRE Rock\n\
             REM session 2\n\
             REM SESSION 0\n\
             ; a comment\n\
             TRACK 01 AUDIO ; trailing\n",
            false,
        );

        assert!(!cue.has_error());
        assert_eq!(
            cue.commands,
            vec![
                CueCommand::Catalog("0123456789012".into()),
                CueCommand::Performer("Some Band".into()),
                CueCommand::Title("Album".into()),
                CueCommand::Rem("GENRE Rock".into()),
                CueCommand::Session(2),
                CueCommand::Rem("SESSION 0".into()),
                CueCommand::Comment("; a comment".into()),
                CueCommand::Track {
                    number: 1,
                    kind: TrackType::Audio
                },
                CueCommand::Comment("; trailing".into()),
            ]
        );
    }

    #[test]
    fn warnings() {
        let cue = parse(
            "CATALOG 1\n\
             CATALOG 2\n\
             FROBNICATE 3\n\
             TRACK 01 AUDIO\n\
             ISRC ABC\n\
             ISRC USRC17607839\n\
             ISRC USRC17607840\n\
             FLAGS DATA\n\
             INDEX 01 00:00:00 garbage\n\
             TRACK 02 AUDIO\n\
             ISRC USRC17607841\n",
            false,
        );

        assert!(!cue.has_error());
        // duplicate CATALOG, unknown command, bad ISRC, duplicate ISRC,
        // unknown flag, empty FLAGS, trailing text
        assert_eq!(cue.warnings.len(), 7);
        assert!(cue.warnings[0].starts_with("line 2:"));

        let isrcs: Vec<_> = cue
            .commands
            .iter()
            .filter(|c| matches!(c, CueCommand::Isrc(_)))
            .collect();
        assert_eq!(isrcs.len(), 2);
        assert!(cue.commands.contains(&CueCommand::Flags(CueTrackFlags::NONE)));
    }

    #[test]
    fn errors() {
        let cue = parse(
            "FILE foo.bin\n\
             FILE foo.bin FLAC\n\
             TRACK 00 AUDIO\n\
             TRACK 01 MODE3/2352\n\
             INDEX 01\n\
             INDEX 100 00:00:00\n\
             PREGAP 00:99:00\n",
            false,
        );

        assert!(cue.has_error());
        assert_eq!(cue.errors.len(), 7);
        assert_eq!(cue.errors[0].0, 1);
        assert_eq!(cue.errors[6].0, 7);

        // Both FILEs and the unknown track type are still recorded
        assert_eq!(
            cue.commands,
            vec![
                CueCommand::File {
                    path: "foo.bin".into(),
                    kind: CueFileType::Unspecified
                },
                CueCommand::File {
                    path: "foo.bin".into(),
                    kind: CueFileType::Unspecified
                },
                CueCommand::Track {
                    number: 1,
                    kind: TrackType::Unknown
                },
            ]
        );

        let e = cue.check(Path::new("disc.cue")).unwrap_err();
        assert!(matches!(e, CdError::ParseError { line: 1, .. }));
    }

    #[test]
    fn lenient_parsing() {
        let sheet = "\u{feff}FILE a.bin BINARY\n\
                     \x20 TRACK 01 AUDIO\n\
                     \x20   INDEX 01 00:0x2:00\n";

        let cue = parse(sheet, false);

        assert!(!cue.has_error());
        assert_eq!(
            cue.commands[2],
            CueCommand::Index {
                number: 1,
                timestamp: msf("00:02:00")
            }
        );

        let cue = parse(sheet, true);

        // Garbage before FILE and the dirty timestamp
        assert!(cue.has_error());
        assert_eq!(cue.warnings.len(), 1);
        assert_eq!(cue.errors.len(), 1);
        assert_eq!(cue.commands.len(), 1);
    }
}
