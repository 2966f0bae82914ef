//! RIFF container parser and writer.
//!
//! Only the chunk tree is loaded in memory, the payload of regular
//! chunks stays in the source file until it's actually needed. A few
//! chunk types are "morphed" into structured representations after
//! loading: `fmt ` becomes a `RiffFmt` and `LIST`/`INFO` becomes a
//! `RiffInfo` dictionary. Morphed chunks serialize back to the same
//! wire format so a loaded tree can always be written out again.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::fs::FileHandle;
use crate::{CdError, CdResult};

/// RIFF chunk identifier
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    /// `RIFF` container
    pub const RIFF: FourCc = FourCc(*b"RIFF");
    /// `LIST` container
    pub const LIST: FourCc = FourCc(*b"LIST");
    /// `WAVE` form type
    pub const WAVE: FourCc = FourCc(*b"WAVE");
    /// `INFO` list type
    pub const INFO: FourCc = FourCc(*b"INFO");
    /// Audio format chunk
    pub const FMT: FourCc = FourCc(*b"fmt ");
    /// Audio payload chunk
    pub const DATA: FourCc = FourCc(*b"data");

    fn is_container(self) -> bool {
        self == FourCc::RIFF || self == FourCc::LIST
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Location of the payload of a regular chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// Payload still in the source file
    Stored {
        /// Offset of the first byte of the payload in the file
        offset: u64,
        /// Payload length (without padding)
        len: u32,
    },
    /// Payload held in memory
    Memory(Vec<u8>),
}

impl Payload {
    fn len(&self) -> u32 {
        match self {
            Payload::Stored { len, .. } => *len,
            Payload::Memory(v) => v.len() as u32,
        }
    }
}

/// Regular (leaf) chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RiffSubchunk {
    /// Chunk tag
    pub tag: FourCc,
    /// Chunk contents
    pub payload: Payload,
}

impl RiffSubchunk {
    /// Build an in-memory chunk
    pub fn new(tag: FourCc, data: Vec<u8>) -> RiffSubchunk {
        RiffSubchunk {
            tag,
            payload: Payload::Memory(data),
        }
    }

    /// Payload length without padding
    pub fn len(&self) -> u32 {
        self.payload.len()
    }

    /// Returns true if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contents of a `fmt ` chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RiffFmt {
    /// Encoding, 1 for PCM
    pub format_tag: u16,
    /// Number of channels
    pub channels: u16,
    /// Sampling rate in Hz
    pub samples_per_sec: u32,
    /// Data rate
    pub avg_bytes_per_sec: u32,
    /// Size of one sample frame
    pub block_align: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl RiffFmt {
    /// Format tag for uncompressed PCM
    pub const FORMAT_PCM: u16 = 1;

    /// Format of CD audio
    pub fn cd_audio() -> RiffFmt {
        RiffFmt {
            format_tag: RiffFmt::FORMAT_PCM,
            channels: 2,
            samples_per_sec: 44_100,
            avg_bytes_per_sec: 44_100 * 4,
            block_align: 4,
            bits_per_sample: 16,
        }
    }

    fn parse(data: &[u8]) -> CdResult<RiffFmt> {
        if data.len() < 16 {
            return Err(CdError::BadRiff(format!("fmt chunk too short ({})", data.len())));
        }

        let mut r = data;

        Ok(RiffFmt {
            format_tag: r.read_u16::<LittleEndian>()?,
            channels: r.read_u16::<LittleEndian>()?,
            samples_per_sec: r.read_u32::<LittleEndian>()?,
            avg_bytes_per_sec: r.read_u32::<LittleEndian>()?,
            block_align: r.read_u16::<LittleEndian>()?,
            bits_per_sample: r.read_u16::<LittleEndian>()?,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(16);

        // Writing to a Vec can't fail
        let _ = v.write_u16::<LittleEndian>(self.format_tag);
        let _ = v.write_u16::<LittleEndian>(self.channels);
        let _ = v.write_u32::<LittleEndian>(self.samples_per_sec);
        let _ = v.write_u32::<LittleEndian>(self.avg_bytes_per_sec);
        let _ = v.write_u16::<LittleEndian>(self.block_align);
        let _ = v.write_u16::<LittleEndian>(self.bits_per_sample);

        v
    }
}

/// `LIST`/`INFO` container as a dictionary of ASCII strings
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RiffInfo {
    /// Entries, keyed by chunk tag
    pub entries: BTreeMap<FourCc, String>,
}

/// `RIFF` or `LIST` container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RiffContainer {
    /// `RIFF` or `LIST`
    pub tag: FourCc,
    /// Form or list type (`WAVE`, `INFO`...)
    pub kind: FourCc,
    /// Children
    pub chunks: Vec<RiffChunk>,
}

impl RiffContainer {
    /// Return the first direct child with the given tag
    pub fn find(&self, tag: FourCc) -> Option<&RiffChunk> {
        self.chunks.iter().find(|c| c.tag() == tag)
    }

    /// Iterate over the direct children with the given tag
    pub fn find_all(&self, tag: FourCc) -> impl Iterator<Item = &RiffChunk> {
        self.chunks.iter().filter(move |c| c.tag() == tag)
    }
}

/// Node of a RIFF chunk tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RiffChunk {
    /// Regular chunk
    Subchunk(RiffSubchunk),
    /// `RIFF` or `LIST` chunk
    Container(RiffContainer),
    /// Morphed `fmt ` chunk
    Fmt(RiffFmt),
    /// Morphed `LIST`/`INFO` chunk
    Info(RiffInfo),
}

impl RiffChunk {
    /// Tag of the chunk
    pub fn tag(&self) -> FourCc {
        match self {
            RiffChunk::Subchunk(s) => s.tag,
            RiffChunk::Container(c) => c.tag,
            RiffChunk::Fmt(_) => FourCc::FMT,
            RiffChunk::Info(_) => FourCc::LIST,
        }
    }

    /// Number of bytes occupied by the chunk payload on disk, padding
    /// included but not the 8 byte chunk header.
    pub fn volume(&self) -> u64 {
        match self {
            RiffChunk::Subchunk(s) => padded(s.len() as u64),
            RiffChunk::Fmt(f) => padded(f.serialize().len() as u64),
            RiffChunk::Container(c) => 4 + c.chunks.iter().map(|c| c.volume() + 8).sum::<u64>(),
            RiffChunk::Info(i) => {
                4 + i
                    .entries
                    .values()
                    .map(|s| padded(s.len() as u64) + 8)
                    .sum::<u64>()
            }
        }
    }
}

fn padded(len: u64) -> u64 {
    len + (len & 1)
}

/// A parsed RIFF file along with its source
pub struct Riff {
    /// Root `RIFF` container
    pub root: RiffContainer,
    source: FileHandle,
}

impl Riff {
    /// Parse the chunk tree from `source`
    pub fn load(mut source: FileHandle) -> CdResult<Riff> {
        source.seek(SeekFrom::Start(0))?;

        let mut parser = ChunkParser {
            source: &mut source,
            pos: 0,
        };

        let root = match parser.read_chunk()? {
            RiffChunk::Container(c) if c.tag == FourCc::RIFF => c,
            _ => return Err(CdError::BadRiff("missing RIFF chunk".into())),
        };

        Ok(Riff { root, source })
    }

    /// Return the payload of a subchunk, reading it from the source
    /// file if needed
    pub fn read_payload(&mut self, sub: &RiffSubchunk) -> CdResult<Vec<u8>> {
        read_payload(&mut self.source, &sub.payload)
    }

    /// Serialize the whole tree to `out`
    pub fn write<W: Write>(&mut self, out: &mut W) -> CdResult<()> {
        let root = RiffChunk::Container(self.root.clone());

        write_chunk(&mut self.source, &root, out)
    }

    /// Give up the chunk tree and return the source file
    pub fn into_source(self) -> FileHandle {
        self.source
    }
}

fn read_payload(source: &mut FileHandle, payload: &Payload) -> CdResult<Vec<u8>> {
    match payload {
        Payload::Memory(v) => Ok(v.clone()),
        Payload::Stored { offset, len } => {
            let mut v = vec![0; *len as usize];

            source.seek(SeekFrom::Start(*offset))?;
            source.read_exact(&mut v)?;

            Ok(v)
        }
    }
}

struct ChunkParser<'a> {
    source: &'a mut FileHandle,
    /// Current position in the source
    pos: u64,
}

impl ChunkParser<'_> {
    fn read_tag(&mut self) -> CdResult<FourCc> {
        let mut tag = [0; 4];

        self.source.read_exact(&mut tag)?;
        self.pos += 4;

        Ok(FourCc(tag))
    }

    fn read_chunk(&mut self) -> CdResult<RiffChunk> {
        let tag = self.read_tag()?;
        let size = self.source.read_u32::<LittleEndian>()?;
        self.pos += 4;

        if size > i32::MAX as u32 {
            return Err(CdError::BadRiff(format!("chunk {:?} too big", tag)));
        }

        let chunk = if tag.is_container() {
            if size < 4 {
                return Err(CdError::BadRiff(format!("truncated {:?} chunk", tag)));
            }

            let kind = self.read_tag()?;
            let end = self.pos - 4 + size as u64;
            let mut chunks = Vec::new();

            while self.pos < end {
                chunks.push(self.read_chunk()?);
            }

            morph_container(self.source, RiffContainer { tag, kind, chunks })?
        } else {
            let sub = RiffSubchunk {
                tag,
                payload: Payload::Stored {
                    offset: self.pos,
                    len: size,
                },
            };

            self.pos += size as u64;
            self.source.seek(SeekFrom::Start(self.pos))?;

            morph_subchunk(self.source, sub)?
        };

        if size & 1 != 0 {
            self.pos += 1;
            self.source.seek(SeekFrom::Start(self.pos))?;
        }

        Ok(chunk)
    }
}

fn morph_subchunk(source: &mut FileHandle, sub: RiffSubchunk) -> CdResult<RiffChunk> {
    if sub.tag != FourCc::FMT {
        return Ok(RiffChunk::Subchunk(sub));
    }

    let data = read_payload(source, &sub.payload)?;

    Ok(RiffChunk::Fmt(RiffFmt::parse(&data)?))
}

fn morph_container(source: &mut FileHandle, c: RiffContainer) -> CdResult<RiffChunk> {
    if c.tag != FourCc::LIST || c.kind != FourCc::INFO {
        return Ok(RiffChunk::Container(c));
    }

    let mut info = RiffInfo::default();

    for chunk in &c.chunks {
        let sub = match chunk {
            RiffChunk::Subchunk(s) => s,
            _ => return Err(CdError::BadRiff("invalid subchunk of INFO list".into())),
        };

        let data = read_payload(source, &sub.payload)?;

        if !data.is_ascii() {
            return Err(CdError::BadRiff(format!("non-ASCII INFO entry {:?}", sub.tag)));
        }

        info.entries
            .insert(sub.tag, String::from_utf8_lossy(&data).into_owned());
    }

    Ok(RiffChunk::Info(info))
}

fn write_header<W: Write>(out: &mut W, tag: FourCc, size: u64) -> CdResult<()> {
    if size > u32::MAX as u64 {
        return Err(CdError::BadRiff("file too big to write out".into()));
    }

    out.write_all(&tag.0)?;
    out.write_u32::<LittleEndian>(size as u32)?;

    Ok(())
}

fn write_leaf<W: Write>(out: &mut W, tag: FourCc, data: &[u8]) -> CdResult<()> {
    write_header(out, tag, data.len() as u64)?;
    out.write_all(data)?;

    if data.len() & 1 != 0 {
        out.write_u8(0)?;
    }

    Ok(())
}

fn write_chunk<W: Write>(source: &mut FileHandle, chunk: &RiffChunk, out: &mut W) -> CdResult<()> {
    match chunk {
        RiffChunk::Subchunk(s) => match &s.payload {
            Payload::Memory(v) => write_leaf(out, s.tag, v),
            Payload::Stored { offset, len } => {
                write_header(out, s.tag, *len as u64)?;

                source.seek(SeekFrom::Start(*offset))?;
                let copied = io::copy(&mut (&mut *source).take(*len as u64), out)?;

                if copied != *len as u64 {
                    return Err(CdError::ShortRead {
                        expected: *len as usize,
                        got: copied as usize,
                    });
                }

                if len & 1 != 0 {
                    out.write_u8(0)?;
                }

                Ok(())
            }
        },
        RiffChunk::Fmt(f) => write_leaf(out, FourCc::FMT, &f.serialize()),
        RiffChunk::Container(c) => {
            write_header(out, c.tag, chunk.volume())?;
            out.write_all(&c.kind.0)?;

            for child in &c.chunks {
                write_chunk(source, child, out)?;
            }

            Ok(())
        }
        RiffChunk::Info(i) => {
            write_header(out, FourCc::LIST, chunk.volume())?;
            out.write_all(&FourCc::INFO.0)?;

            for (tag, s) in &i.entries {
                write_leaf(out, *tag, s.as_bytes())?;
            }

            Ok(())
        }
    }
}
