use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

/// Selects which form of a read's sequence an operation works on
///
/// A selector combines a source (raw or corrected) with optional homopolymer
/// compression and optional trimming:
///
/// ```rust
/// use seqstore::Which;
///
/// let which = Which::CORRECTED | Which::TRIMMED;
/// assert!(which.is_corrected());
/// assert!(!which.is_compressed());
/// assert_eq!(which.to_string(), "corrected-trimmed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Which(u32);
impl Which {
    /// Nothing selected; the store substitutes its default
    pub const UNSET: Self = Self(0x00);
    /// Sequence as it was sequenced
    pub const RAW: Self = Self(0x01);
    /// Sequence after correction
    pub const CORRECTED: Self = Self(0x02);
    /// Homopolymer-compressed sequence
    pub const COMPRESSED: Self = Self(0x04);
    /// Only the clear range of the sequence
    pub const TRIMMED: Self = Self(0x08);
    /// Explicitly uncompressed; prevents the store default from turning on compression
    pub const NORMAL: Self = Self(0x80);

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// True if every flag of `other` is set
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// The raw and corrected bits of the selector
    #[must_use]
    pub fn source(self) -> Self {
        Self(self.0 & (Self::RAW.0 | Self::CORRECTED.0))
    }

    /// Completes a selector that names no source from `default`
    ///
    /// An unset selector becomes `default`. A selector carrying only modifiers (such as
    /// [`Which::TRIMMED`]) keeps them and takes the source of `default`, plus its
    /// compression unless [`Which::NORMAL`] is set. Selectors that name a source are
    /// returned unchanged.
    #[must_use]
    pub fn or_default(self, default: Self) -> Self {
        if !self.source().is_unset() {
            return self;
        }
        let mut which = self | default.source();
        if self.is_unset() && default.is_trimmed() {
            which |= Self::TRIMMED;
        }
        if !self.contains(Self::NORMAL) && default.is_compressed() {
            which |= Self::COMPRESSED;
        }
        which
    }

    #[must_use]
    pub fn is_unset(self) -> bool {
        self.without(Self::NORMAL).0 == 0
    }

    #[must_use]
    pub fn is_raw(self) -> bool {
        self.contains(Self::RAW)
    }

    #[must_use]
    pub fn is_corrected(self) -> bool {
        self.contains(Self::CORRECTED)
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    #[must_use]
    pub fn is_trimmed(self) -> bool {
        self.contains(Self::TRIMMED)
    }

    /// The sequence record variant this selector addresses
    ///
    /// Raw takes precedence when both sources are set. Returns `None` when no source
    /// is selected.
    #[must_use]
    pub fn variant(self) -> Option<Variant> {
        match (self.is_raw(), self.is_corrected(), self.is_compressed()) {
            (true, _, false) => Some(Variant::RawNormal),
            (true, _, true) => Some(Variant::RawCompressed),
            (false, true, false) => Some(Variant::CorrectedNormal),
            (false, true, true) => Some(Variant::CorrectedCompressed),
            (false, false, _) => None,
        }
    }
}
impl BitOr for Which {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
impl BitOrAssign for Which {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
impl fmt::Display for Which {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match (self.is_raw(), self.is_corrected()) {
            (true, false) => Some("raw"),
            (false, true) => Some("corrected"),
            _ => None,
        };
        let name = match (source, self.is_compressed(), self.is_trimmed()) {
            (None, false, false) if self.is_unset() => "unset".to_string(),
            (None, true, false) => "compressed".to_string(),
            (None, false, true) => "trimmed".to_string(),
            (Some(source), false, false) => source.to_string(),
            (Some(source), true, false) => format!("{source}-compressed"),
            (Some(source), false, true) => format!("{source}-trimmed"),
            (Some(source), true, true) => format!("{source}-compressed-trimmed"),
            _ => "undefined-mode".to_string(),
        };
        write!(f, "{name}")
    }
}

/// One of the four persisted forms of a read's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    RawNormal,
    RawCompressed,
    CorrectedNormal,
    CorrectedCompressed,
}
impl Variant {
    pub const ALL: [Self; 4] = [
        Self::RawNormal,
        Self::RawCompressed,
        Self::CorrectedNormal,
        Self::CorrectedCompressed,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::RawNormal => 0,
            Self::RawCompressed => 1,
            Self::CorrectedNormal => 2,
            Self::CorrectedCompressed => 3,
        }
    }

    #[must_use]
    pub fn is_corrected(self) -> bool {
        matches!(self, Self::CorrectedNormal | Self::CorrectedCompressed)
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::RawCompressed | Self::CorrectedCompressed)
    }

    /// The uncompressed variant holding the same bases
    #[must_use]
    pub fn normal(self) -> Self {
        if self.is_corrected() {
            Self::CorrectedNormal
        } else {
            Self::RawNormal
        }
    }

    /// The compressed variant holding the same bases
    #[must_use]
    pub fn compressed(self) -> Self {
        if self.is_corrected() {
            Self::CorrectedCompressed
        } else {
            Self::RawCompressed
        }
    }

    /// Name of the metadata file holding this variant's sequence records
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::RawNormal => "rawU",
            Self::RawCompressed => "rawC",
            Self::CorrectedNormal => "corU",
            Self::CorrectedCompressed => "corC",
        }
    }

    /// The selector addressing this variant, untrimmed
    #[must_use]
    pub fn which(self) -> Which {
        let source = if self.is_corrected() {
            Which::CORRECTED
        } else {
            Which::RAW
        };
        if self.is_compressed() {
            source | Which::COMPRESSED
        } else {
            source
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_selection() {
        assert_eq!(Which::RAW.variant(), Some(Variant::RawNormal));
        assert_eq!(
            (Which::RAW | Which::COMPRESSED | Which::TRIMMED).variant(),
            Some(Variant::RawCompressed)
        );
        assert_eq!(Which::CORRECTED.variant(), Some(Variant::CorrectedNormal));
        assert_eq!(Which::TRIMMED.variant(), None);
        for variant in Variant::ALL {
            assert_eq!(variant.which().variant(), Some(variant));
        }
    }

    #[test]
    fn test_or_default() {
        let default = Which::CORRECTED | Which::COMPRESSED | Which::TRIMMED;
        assert_eq!(Which::UNSET.or_default(default), default);
        assert_eq!(
            Which::NORMAL.or_default(default),
            Which::CORRECTED | Which::TRIMMED | Which::NORMAL
        );
        assert_eq!(Which::TRIMMED.or_default(Which::RAW), Which::RAW | Which::TRIMMED);
        assert_eq!(
            Which::COMPRESSED.or_default(Which::RAW | Which::TRIMMED),
            Which::RAW | Which::COMPRESSED
        );
        assert_eq!(
            (Which::TRIMMED | Which::NORMAL).or_default(default),
            Which::CORRECTED | Which::TRIMMED | Which::NORMAL
        );
        assert_eq!(Which::RAW.or_default(default), Which::RAW);
    }

    #[test]
    fn test_display() {
        assert_eq!(Which::UNSET.to_string(), "unset");
        assert_eq!(Which::NORMAL.to_string(), "unset");
        assert_eq!(Which::RAW.to_string(), "raw");
        assert_eq!(
            (Which::RAW | Which::COMPRESSED | Which::TRIMMED | Which::NORMAL).to_string(),
            "raw-compressed-trimmed"
        );
        assert_eq!((Which::CORRECTED | Which::COMPRESSED).to_string(), "corrected-compressed");
        assert_eq!((Which::RAW | Which::CORRECTED).to_string(), "undefined-mode");
    }
}
