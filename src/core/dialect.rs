//! Chromosome naming dialects
//!
//! Every chromosome name that enters a table (assembly tables, records,
//! chain headers, persisted metadata) is translated into the table's dialect
//! first, so `chr1` and `1` address the same track.

use std::fmt;
use std::str::FromStr;

/// Translates chromosome names into one canonical spelling
///
/// Implementations must be idempotent: `translate(translate(x)) == translate(x)`.
pub trait ChromTranslator: Send + Sync {
    fn translate(&self, chrom: &str) -> String;
}

/// Chromosome naming dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum ChromDialect {
    /// Keep names exactly as given
    AsIs,
    /// Long names with "chr" prefix: "chr1", "chrX", "chrM"
    #[default]
    Ucsc,
    /// Short names without prefix: "1", "X", "MT"
    Ensembl,
}

const FLY_MITOCHONDRION: &str = "dmel_mitochondrion_genome";

fn has_chr_prefix(chrom: &str) -> bool {
    chrom.len() > 3 && chrom.as_bytes()[..3].eq_ignore_ascii_case(b"chr")
}

impl ChromDialect {
    /// Name used in persisted metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            ChromDialect::AsIs => "asis",
            ChromDialect::Ucsc => "ucsc",
            ChromDialect::Ensembl => "ensembl",
        }
    }

    /// Translate a chromosome name into this dialect
    ///
    /// # Examples
    /// ```
    /// use pileup_engine::core::ChromDialect;
    ///
    /// assert_eq!(ChromDialect::Ensembl.translate("chr1"), "1");
    /// assert_eq!(ChromDialect::Ensembl.translate("X"), "X");
    /// assert_eq!(ChromDialect::Ucsc.translate("1"), "chr1");
    /// assert_eq!(ChromDialect::Ucsc.translate("CHRX"), "chrX");
    /// assert_eq!(ChromDialect::Ucsc.translate("MT"), "chrM");
    /// assert_eq!(ChromDialect::Ensembl.translate("chrM"), "MT");
    /// assert_eq!(ChromDialect::AsIs.translate("Chr1"), "Chr1");
    /// ```
    pub fn translate(&self, chrom: &str) -> String {
        match self {
            ChromDialect::AsIs => chrom.to_string(),
            ChromDialect::Ensembl => {
                let short = if has_chr_prefix(chrom) { &chrom[3..] } else { chrom };
                if short == "M" {
                    "MT".to_string()
                } else {
                    short.to_string()
                }
            }
            ChromDialect::Ucsc => {
                if chrom == FLY_MITOCHONDRION || chrom == "MT" || chrom == "M" {
                    return "chrM".to_string();
                }
                if has_chr_prefix(chrom) {
                    format!("chr{}", &chrom[3..])
                } else {
                    format!("chr{}", chrom)
                }
            }
        }
    }
}

impl ChromTranslator for ChromDialect {
    fn translate(&self, chrom: &str) -> String {
        ChromDialect::translate(self, chrom)
    }
}

impl FromStr for ChromDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asis" | "as_is" | "as-is" => Ok(ChromDialect::AsIs),
            "ucsc" | "long" | "l" => Ok(ChromDialect::Ucsc),
            "ensembl" | "short" | "s" => Ok(ChromDialect::Ensembl),
            other => Err(format!("unknown chromosome dialect '{}'", other)),
        }
    }
}

impl fmt::Display for ChromDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural ("numerical string") ordering key: `chr2` sorts before `chr10`
pub fn natural_key(name: &str) -> Vec<NaturalPart<'_>> {
    let bytes = name.as_bytes();
    let mut parts = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        let digit = bytes[i].is_ascii_digit();
        while i < bytes.len() && bytes[i].is_ascii_digit() == digit {
            i += 1;
        }
        let run = &name[start..i];
        if digit {
            let trimmed = run.trim_start_matches('0');
            parts.push(NaturalPart::Number(trimmed.len(), trimmed));
        } else {
            parts.push(NaturalPart::Text(run));
        }
    }
    parts
}

/// One component of a [`natural_key`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalPart<'a> {
    /// Digit run compared by (significant length, digits)
    Number(usize, &'a str),
    Text(&'a str),
}

/// Sort chromosome names in natural order
pub fn natural_sort<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by(|a, b| natural_key(a.as_ref()).cmp(&natural_key(b.as_ref())));
}
