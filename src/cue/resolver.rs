//! Locate the files referenced by a cue sheet.
//!
//! Cue sheets are often edited by hand or renamed without updating
//! their contents, so a FILE line is matched loosely against the
//! contents of the cue's directory: `Game.bin` will find `game.bin`,
//! `game.ecm` or `game.bin.ecm`.

use std::path::{Path, PathBuf};

use log::debug;

use crate::fs::FileSystem;
use crate::CdResult;

/// Extensions never picked as track data: other disc image formats,
/// sidecar files and archives
const SKIPPED_EXTENSIONS: &[&str] = &[
    "ccd", "cdi", "chd", "cue", "toc", "mds", "nrg", "m3u", "sbi", "sub", "7z", "rar", "zip",
    "bz2", "gz",
];

/// Resolves the paths used in a cue sheet to files in its directory.
/// The directory is only listed once.
pub struct CueFileResolver {
    base_dir: PathBuf,
    candidates: Vec<PathBuf>,
    case_sensitive: bool,
}

impl CueFileResolver {
    /// List the contents of `base_dir`
    pub fn new(fs: &dyn FileSystem, base_dir: &Path, case_sensitive: bool) -> CdResult<Self> {
        let candidates = fs.glob(base_dir)?;

        debug!(
            "{} candidate files in {}",
            candidates.len(),
            base_dir.display()
        );

        Ok(CueFileResolver {
            base_dir: base_dir.to_path_buf(),
            candidates,
            case_sensitive,
        })
    }

    fn name_eq(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.to_lowercase() == b.to_lowercase()
        }
    }

    /// All the files that could stand for `path`, best match first
    pub fn resolve(&self, path: &str) -> Vec<PathBuf> {
        // Cue sheets made on Windows use backslashes
        let path = path.replace('\\', "/");
        let requested = self.base_dir.join(&path);

        let target_name = file_name(&requested);
        let target_stem = file_stem(&requested);

        let requested_full = requested.to_string_lossy();

        let mut results = Vec::new();

        for candidate in &self.candidates {
            let ext = candidate
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            if SKIPPED_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            if self.name_eq(&candidate.to_string_lossy(), &requested_full) {
                results.insert(0, candidate.clone());
                continue;
            }

            let stem = file_stem(candidate);

            if self.name_eq(&stem, &target_stem) || self.name_eq(&stem, &target_name) {
                results.push(candidate.clone());
            }
        }

        results
    }
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(p: &Path) -> String {
    p.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
