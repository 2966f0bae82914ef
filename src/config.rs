//! Mount-time knobs

/// Policy applied while compiling and mounting a disc image. The
/// defaults match what real drives report for well-formed images.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MountPolicy {
    /// When true the Q relative timestamp of index 0 sectors is not
    /// shifted by one sector. Real drives disagree on this, mode A
    /// matches most dumps.
    pub pregap_contradiction_mode_a: bool,
    /// Generate Mode 2 pregap sectors as XA form 2 (submode 0x20 and
    /// the matching EDC)
    pub pregap_mode2_as_xa_form2: bool,
    /// Refuse to mount images whose estimated load time is above this
    /// value. Decoding compressed audio costs 10, indexing an ECM file
    /// costs 1.
    pub slow_load_abort_threshold: u32,
    /// Match the file names referenced in cue sheets case-sensitively
    pub case_sensitive_resolution: bool,
    /// Don't try to recover from malformed cue sheet lines
    pub strict_parse: bool,
    /// Load `<cue name>.sbi` if it exists next to the cue sheet
    pub load_sbi: bool,
    /// Patched sectors get their Q CRC recomputed and then inverted, as
    /// mednafen does. This makes every patched sector fail the CRC
    /// check like the libcrypt sectors of the pressed discs.
    pub sbi_as_mednafen: bool,
}

impl Default for MountPolicy {
    fn default() -> MountPolicy {
        MountPolicy {
            pregap_contradiction_mode_a: true,
            pregap_mode2_as_xa_form2: true,
            slow_load_abort_threshold: 10,
            case_sensitive_resolution: false,
            strict_parse: false,
            load_sbi: true,
            sbi_as_mednafen: true,
        }
    }
}

impl MountPolicy {
    /// Set `pregap_contradiction_mode_a`
    pub fn with_pregap_contradiction_mode_a(mut self, v: bool) -> MountPolicy {
        self.pregap_contradiction_mode_a = v;
        self
    }

    /// Set `pregap_mode2_as_xa_form2`
    pub fn with_pregap_mode2_as_xa_form2(mut self, v: bool) -> MountPolicy {
        self.pregap_mode2_as_xa_form2 = v;
        self
    }

    /// Set `slow_load_abort_threshold`
    pub fn with_slow_load_abort_threshold(mut self, v: u32) -> MountPolicy {
        self.slow_load_abort_threshold = v;
        self
    }

    /// Set `case_sensitive_resolution`
    pub fn with_case_sensitive_resolution(mut self, v: bool) -> MountPolicy {
        self.case_sensitive_resolution = v;
        self
    }

    /// Set `strict_parse`
    pub fn with_strict_parse(mut self, v: bool) -> MountPolicy {
        self.strict_parse = v;
        self
    }

    /// Set `load_sbi`
    pub fn with_load_sbi(mut self, v: bool) -> MountPolicy {
        self.load_sbi = v;
        self
    }

    /// Set `sbi_as_mednafen`
    pub fn with_sbi_as_mednafen(mut self, v: bool) -> MountPolicy {
        self.sbi_as_mednafen = v;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let p = MountPolicy::default();

        assert!(p.pregap_contradiction_mode_a);
        assert!(p.pregap_mode2_as_xa_form2);
        assert_eq!(p.slow_load_abort_threshold, 10);
        assert!(!p.case_sensitive_resolution);
        assert!(!p.strict_parse);
        assert!(p.load_sbi);
        assert!(p.sbi_as_mednafen);
    }

    #[test]
    fn builder() {
        let p = MountPolicy::default()
            .with_strict_parse(true)
            .with_slow_load_abort_threshold(0);

        assert!(p.strict_parse);
        assert_eq!(p.slow_load_abort_threshold, 0);
        assert!(p != MountPolicy::default());
    }
}
