//! Strand orientation
//!
//! Signal channels of a stranded table are indexed by strand; `Plus` is
//! channel 0 and `Minus` is channel 1. On disk and in legacy record formats
//! the strands are spelled `1`/`-1`, `+`/`-` or `0`/`1`.

/// Strand orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub enum Strand {
    #[default]
    Plus,
    Minus,
}

impl Strand {
    /// Both strands in channel order
    pub const BOTH: [Strand; 2] = [Strand::Plus, Strand::Minus];

    /// The other strand
    pub fn complement(&self) -> Self {
        match self {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
        }
    }

    /// Parse strand from a `+`/`-` field
    ///
    /// # Examples
    /// ```
    /// use pileup_engine::core::Strand;
    /// assert_eq!(Strand::from_field("-"), Some(Strand::Minus));
    /// assert_eq!(Strand::from_field("."), None);
    /// ```
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "+" => Some(Strand::Plus),
            "-" => Some(Strand::Minus),
            _ => None,
        }
    }

    /// Convert to char
    pub fn to_char(&self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }

    /// Signed spelling used in array file names (`1` / `-1`)
    pub fn signed(&self) -> i64 {
        match self {
            Strand::Plus => 1,
            Strand::Minus => -1,
        }
    }

    /// Inverse of [`Strand::signed`]
    pub fn from_signed(value: i64) -> Option<Self> {
        match value {
            1 => Some(Strand::Plus),
            -1 => Some(Strand::Minus),
            _ => None,
        }
    }

    /// Channel index inside a stranded table
    pub fn index(&self) -> usize {
        match self {
            Strand::Plus => 0,
            Strand::Minus => 1,
        }
    }

    /// Combine two orientations (block orientation applied to a strand)
    ///
    /// # Examples
    /// ```
    /// use pileup_engine::core::Strand;
    /// assert_eq!(Strand::Plus.combine(Strand::Minus), Strand::Minus);
    /// assert_eq!(Strand::Minus.combine(Strand::Minus), Strand::Plus);
    /// ```
    pub fn combine(&self, other: Strand) -> Strand {
        if *self == other {
            Strand::Plus
        } else {
            Strand::Minus
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_round_trip() {
        for strand in Strand::BOTH {
            assert_eq!(Strand::from_signed(strand.signed()), Some(strand));
        }
        assert_eq!(Strand::from_signed(0), None);
    }

    #[test]
    fn test_channel_index() {
        assert_eq!(Strand::Plus.index(), 0);
        assert_eq!(Strand::Minus.index(), 1);
    }

    #[test]
    fn test_from_field() {
        assert_eq!(Strand::from_field("+"), Some(Strand::Plus));
        assert_eq!(Strand::from_field("-"), Some(Strand::Minus));
        assert_eq!(Strand::from_field("."), None);
        assert_eq!(Strand::from_field(""), None);
    }
}
