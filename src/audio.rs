//! Compressed audio support.
//!
//! Cue sheets sometimes reference MP3, FLAC or APE files. Decoding
//! those is left to an external service implementing `AudioDecoder`.

use std::path::Path;

use crate::{CdError, CdResult};

/// Service able to decode compressed audio files into CD audio
pub trait AudioDecoder: Send + Sync {
    /// Returns true if the service can be used
    fn service_available(&self) -> bool;

    /// Decode the file at `path` to raw CD-DA PCM: signed 16bit little
    /// endian stereo samples at 44100Hz, no container
    fn decode(&self, path: &Path) -> CdResult<Vec<u8>>;
}

/// Decoder used when no decoding service is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDecoder;

impl AudioDecoder for NoDecoder {
    fn service_available(&self) -> bool {
        false
    }

    fn decode(&self, _path: &Path) -> CdResult<Vec<u8>> {
        Err(CdError::DecoderUnavailable)
    }
}

#[test]
fn no_decoder() {
    assert!(!NoDecoder.service_available());
    assert!(matches!(
        NoDecoder.decode(Path::new("track02.mp3")),
        Err(CdError::DecoderUnavailable)
    ));
}
