//! Genome assemblies: a build name and its chromosome lengths

use crate::core::dialect::ChromTranslator;
use crate::core::error::{EngineError, RecordError, Result};
use crate::core::io::open_text;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

/// Chromosome lengths of one genome build
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assembly {
    pub name: String,
    pub lengths: BTreeMap<String, usize>,
}

impl Assembly {
    /// Build an assembly from (chrom, length) pairs, translating names
    pub fn from_lengths<I, S>(name: impl Into<String>, lengths: I, dialect: &dyn ChromTranslator) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: AsRef<str>,
    {
        let lengths = lengths
            .into_iter()
            .map(|(chrom, len)| (dialect.translate(chrom.as_ref()), len))
            .collect();
        Self {
            name: name.into(),
            lengths,
        }
    }

    /// Load a chromosome-sizes table (`chrom<whitespace>length` per line)
    ///
    /// Blank lines and `#` comments are ignored. Compressed files are
    /// accepted.
    pub fn load_sizes<P: AsRef<Path>>(
        name: impl Into<String>,
        path: P,
        dialect: &dyn ChromTranslator,
    ) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let reader = open_text(path)?;
        let mut lengths = BTreeMap::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (chrom, len) = match (fields.next(), fields.next()) {
                (Some(c), Some(l)) => (c, l),
                _ => {
                    return Err(RecordError::new("sizes", &display, idx + 1, "expected chrom and length").into())
                }
            };
            let len: usize = len.parse().map_err(|_| {
                RecordError::new("sizes", &display, idx + 1, format!("invalid length '{}'", len))
            })?;
            lengths.insert(dialect.translate(chrom), len);
        }

        log::debug!("Loaded {} chromosome sizes from {}", lengths.len(), display);
        Ok(Self {
            name: name.into(),
            lengths,
        })
    }

    /// Sum of declared chromosome lengths
    pub fn genome_size(&self) -> usize {
        self.lengths.values().sum()
    }

    pub fn length(&self, chrom: &str) -> Result<usize> {
        self.lengths
            .get(chrom)
            .copied()
            .ok_or_else(|| EngineError::UnknownChromosome(chrom.to_string()))
    }

    pub fn contains(&self, chrom: &str) -> bool {
        self.lengths.contains_key(chrom)
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.lengths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dialect::ChromDialect;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_sizes_translates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "1\t1000").unwrap();
        writeln!(file, "chrX 500").unwrap();
        writeln!(file).unwrap();
        file.flush().unwrap();

        let asm = Assembly::load_sizes("hg19", file.path(), &ChromDialect::Ucsc).unwrap();
        assert_eq!(asm.length("chr1").unwrap(), 1000);
        assert_eq!(asm.length("chrX").unwrap(), 500);
        assert_eq!(asm.genome_size(), 1500);
    }

    #[test]
    fn test_load_sizes_rejects_bad_length() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1\tlots").unwrap();
        file.flush().unwrap();
        let err = Assembly::load_sizes("x", file.path(), &ChromDialect::AsIs).unwrap_err();
        assert!(matches!(err, EngineError::Record(_)));
    }

    #[test]
    fn test_unknown_chromosome() {
        let asm = Assembly::from_lengths("t", [("chr1", 10)], &ChromDialect::AsIs);
        assert!(matches!(asm.length("chr2"), Err(EngineError::UnknownChromosome(_))));
    }
}
