//! BIN/CUE image format implementation
//!
//! The CUE sheet format was created for the CDRWIN burning software.
//!
//! The original format was described in the CDRWIN user guide but
//! many extensions and variations exist. Multi-session discs are
//! described with `REM SESSION` comments.
//!
//! Loading goes through three steps: the sheet is parsed into
//! commands, the commands are compiled into files, tracks and
//! sessions, and the result is laid out sector by sector into a
//! `Disc`.

use std::path::Path;

use log::info;

use crate::audio::{AudioDecoder, NoDecoder};
use crate::config::MountPolicy;
use crate::disc::Disc;
use crate::fs::{FileSystem, StdFileSystem, CUE_SHEET_MAX_LENGTH};
use crate::sbi::SbiPatches;
use crate::{CdError, CdResult};

pub use self::compiler::{compile, CompiledCue, CompiledFile, CueFileKind, CueIndex, CueTrack};
pub use self::parser::{parse, CueCommand, CueFile, CueFileType, CueTrackFlags};
pub use self::resolver::CueFileResolver;

pub mod compiler;
pub mod mount;
pub mod parser;
pub mod resolver;

/// Open the cue sheet at `cue_path` from the host filesystem with the
/// default policy. Compressed audio tracks are not supported.
pub fn open(cue_path: &Path) -> CdResult<Disc> {
    load_cue(
        &StdFileSystem,
        &NoDecoder,
        cue_path,
        &MountPolicy::default(),
    )
}

/// Parse, compile and mount the cue sheet at `cue_path`
pub fn load_cue(
    fs: &dyn FileSystem,
    decoder: &dyn AudioDecoder,
    cue_path: &Path,
    policy: &MountPolicy,
) -> CdResult<Disc> {
    let raw = fs.read_to_end(cue_path, CUE_SHEET_MAX_LENGTH)?;
    let text = String::from_utf8_lossy(&raw);
    let text = text.trim_start_matches('\u{feff}');

    let cue = parse(text, policy.strict_parse).check(cue_path)?;

    let base_dir = cue_path.parent().unwrap_or_else(|| Path::new(""));
    let resolver = CueFileResolver::new(fs, base_dir, policy.case_sensitive_resolution)?;

    let compiled = compile(&cue, &resolver, fs, decoder);

    if compiled.has_error() {
        return Err(CdError::CueCompile {
            path: cue_path.to_path_buf(),
            errors: compiled.errors,
        });
    }

    if compiled.load_time > policy.slow_load_abort_threshold {
        return Err(CdError::LoadTooSlow {
            load_time: compiled.load_time,
            threshold: policy.slow_load_abort_threshold,
        });
    }

    let name = cue_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut disc = mount::mount(name, &compiled, fs, decoder, policy)?;

    disc.warnings = cue.warnings;
    disc.warnings.extend(compiled.warnings);

    if policy.load_sbi {
        let sbi_path = cue_path.with_extension("sbi");

        if fs.exists(&sbi_path) {
            let sbi = SbiPatches::load(fs, &sbi_path)?;
            let n = sbi.apply(&mut disc, policy.sbi_as_mednafen)?;

            info!("{}: applied {} SBI patches", sbi_path.display(), n);
        }
    }

    Ok(disc)
}
