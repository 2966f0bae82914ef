//! WAVE files containing raw CD audio

use super::{Blob, RawFileBlob};
use crate::fs::FileHandle;
use crate::riff::{FourCc, Payload, Riff, RiffChunk};
use crate::{CdError, CdResult};

/// Blob over the `data` payload of a WAVE file. Only the exact CD
/// audio format (PCM, stereo, 16 bits, 44.1kHz) is accepted since the
/// samples are used as is.
pub struct WaveBlob {
    data: RawFileBlob,
}

impl WaveBlob {
    /// Parse `file` and locate its audio payload
    pub fn load(file: FileHandle) -> CdResult<WaveBlob> {
        let riff = Riff::load(file).map_err(|e| CdError::BadWave(e.to_string()))?;
        let root = &riff.root;

        if root.kind != FourCc::WAVE {
            return Err(CdError::BadWave(format!("not a WAVE file ({:?})", root.kind)));
        }

        let fmt = match root.find(FourCc::FMT) {
            Some(RiffChunk::Fmt(f)) => f,
            _ => return Err(CdError::BadWave("missing fmt chunk".into())),
        };

        if fmt.format_tag != 1 {
            return Err(CdError::BadWave(format!(
                "not PCM (format tag {})",
                fmt.format_tag
            )));
        }

        if fmt.channels != 2 || fmt.bits_per_sample != 16 || fmt.samples_per_sec != 44_100 {
            return Err(CdError::BadWave(format!(
                "not CD audio ({} channels, {} bits, {}Hz)",
                fmt.channels, fmt.bits_per_sample, fmt.samples_per_sec
            )));
        }

        let (offset, len) = {
            let mut data = root.find_all(FourCc::DATA);

            match (data.next(), data.next()) {
                (Some(RiffChunk::Subchunk(s)), None) => match s.payload {
                    Payload::Stored { offset, len } => (offset, len as u64),
                    Payload::Memory(_) => {
                        return Err(CdError::BadWave("detached data chunk".into()))
                    }
                },
                (None, _) => return Err(CdError::BadWave("missing data chunk".into())),
                _ => return Err(CdError::BadWave("multiple data chunks".into())),
            }
        };

        Ok(WaveBlob {
            data: RawFileBlob::new(riff.into_source(), offset, len),
        })
    }
}

impl Blob for WaveBlob {
    fn read(&self, offset: u64, buf: &mut [u8]) -> CdResult<usize> {
        self.data.read(offset, buf)
    }

    fn len(&self) -> u64 {
        self.data.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::riff::test::build_wave;
    use crate::riff::RiffFmt;
    use std::io::Cursor;

    fn load(data: Vec<u8>) -> CdResult<WaveBlob> {
        WaveBlob::load(Box::new(Cursor::new(data)))
    }

    #[test]
    fn cd_audio() {
        let pcm: Vec<u8> = (0..64).collect();
        let blob = load(build_wave(&RiffFmt::cd_audio(), &pcm, false)).unwrap();
        let mut buf = [0u8; 8];

        assert_eq!(blob.len(), 64);
        assert_eq!(blob.read(60, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[60, 61, 62, 63]);
        assert_eq!(blob.read(0, &mut buf).unwrap(), 8);
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn rejected_formats() {
        let pcm = [0u8; 16];

        let mut mono = RiffFmt::cd_audio();
        mono.channels = 1;
        assert!(matches!(
            load(build_wave(&mono, &pcm, false)),
            Err(CdError::BadWave(_))
        ));

        let mut rate = RiffFmt::cd_audio();
        rate.samples_per_sec = 48_000;
        assert!(matches!(
            load(build_wave(&rate, &pcm, false)),
            Err(CdError::BadWave(_))
        ));

        let mut float = RiffFmt::cd_audio();
        float.format_tag = 3;
        assert!(matches!(
            load(build_wave(&float, &pcm, false)),
            Err(CdError::BadWave(_))
        ));

        // Second data chunk
        assert!(matches!(
            load(build_wave(&RiffFmt::cd_audio(), &pcm, true)),
            Err(CdError::BadWave(_))
        ));

        assert!(matches!(load(b"not a wave".to_vec()), Err(CdError::BadWave(_))));
    }
}
