//! Property-based tests for chain file parsing
//!
//! Headers and steps parse back to the blocks they describe, `-` sides are
//! flipped onto the forward strand, and gzip/bzip2 files parse like plain
//! text.

use pileup_engine::core::{parse_chain_bytes, parse_chain_file, Chain, ChainBlock};
use pileup_engine::Strand;
use proptest::prelude::*;

/// Generate a valid chromosome name
fn arb_chrom_name() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u8..=22).prop_map(|n| format!("chr{}", n)),
        Just("chrX".to_string()),
        Just("chrM".to_string()),
        (1u8..=22).prop_map(|n| format!("{}", n)),
        Just("MT".to_string()),
        Just("chrUn_gl000220".to_string()),
    ]
}

fn arb_strand() -> impl Strategy<Value = Strand> {
    prop_oneof![Just(Strand::Plus), Just(Strand::Minus)]
}

/// One side of a chain header
#[derive(Debug, Clone)]
struct Side {
    name: String,
    size: u64,
    strand: Strand,
    start: u64,
}

/// Chain text pieces plus the blocks they should parse to
#[derive(Debug, Clone)]
struct ChainData {
    score: u64,
    reference: Side,
    query: Side,
    /// `(size, reference_gap, query_gap)`; the last gaps are unused
    steps: Vec<(u64, u64, u64)>,
    chain_id: u64,
}

fn arb_side() -> impl Strategy<Value = Side> {
    (arb_chrom_name(), 10_000u64..1_000_000, arb_strand(), 0u64..5_000)
        .prop_map(|(name, size, strand, start)| Side { name, size, strand, start })
}

fn arb_chain() -> impl Strategy<Value = ChainData> {
    (
        0u64..1_000_000,
        arb_side(),
        arb_side(),
        prop::collection::vec((1u64..500, 0u64..100, 0u64..100), 1..6),
        1u64..10_000,
    )
        .prop_map(|(score, reference, query, steps, chain_id)| ChainData {
            score,
            reference,
            query,
            steps,
            chain_id,
        })
}

impl ChainData {
    /// `(reference_span, query_span)` covered by the steps
    fn spans(&self) -> (u64, u64) {
        let last = self.steps.len() - 1;
        self.steps.iter().enumerate().fold((0, 0), |(r, q), (i, (size, dr, dq))| {
            if i == last {
                (r + size, q + size)
            } else {
                (r + size + dr, q + size + dq)
            }
        })
    }

    fn to_text(&self) -> String {
        let (r_span, q_span) = self.spans();
        let mut text = format!(
            "chain {} {} {} {} {} {} {} {} {} {} {} {}\n",
            self.score,
            self.reference.name,
            self.reference.size,
            self.reference.strand.to_char(),
            self.reference.start,
            self.reference.start + r_span,
            self.query.name,
            self.query.size,
            self.query.strand.to_char(),
            self.query.start,
            self.query.start + q_span,
            self.chain_id,
        );
        let last = self.steps.len() - 1;
        for (i, (size, dr, dq)) in self.steps.iter().enumerate() {
            if i == last {
                text.push_str(&format!("{}\n", size));
            } else {
                text.push_str(&format!("{}\t{}\t{}\n", size, dr, dq));
            }
        }
        text
    }

    /// Blocks in forward-strand coordinates
    fn expected_blocks(&self) -> Vec<ChainBlock> {
        let flip = |side: &Side, pos: u64, len: u64| match side.strand {
            Strand::Plus => (pos, pos + len),
            Strand::Minus => (side.size - (pos + len), side.size - pos),
        };
        let (mut r, mut q) = (self.reference.start, self.query.start);
        let mut blocks = Vec::new();
        for (size, dr, dq) in &self.steps {
            let (reference_start, reference_end) = flip(&self.reference, r, *size);
            let (query_start, query_end) = flip(&self.query, q, *size);
            blocks.push(ChainBlock {
                reference_chrom: self.reference.name.clone(),
                reference_start,
                reference_end,
                query_chrom: self.query.name.clone(),
                query_start,
                query_end,
                orientation: self.reference.strand.combine(self.query.strand),
            });
            r += size + dr;
            q += size + dq;
        }
        blocks
    }
}

fn all_blocks(chains: &[Chain]) -> Vec<ChainBlock> {
    chains.iter().flat_map(|c| c.blocks().collect::<Vec<_>>()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: parsing yields the header fields and the flipped blocks
    #[test]
    fn prop_chain_parse_roundtrip(data in arb_chain()) {
        let text = data.to_text();
        let chains = parse_chain_bytes(text.as_bytes()).unwrap();
        prop_assert_eq!(chains.len(), 1);
        let header = &chains[0].header;
        prop_assert_eq!(header.score, data.score);
        prop_assert_eq!(&header.reference_name, &data.reference.name);
        prop_assert_eq!(header.query_size, data.query.size);
        prop_assert_eq!(header.chain_id.clone(), data.chain_id.to_string());
        prop_assert_eq!((header.reference_span(), header.query_span()), data.spans());
        prop_assert_eq!(chains[0].blocks().collect::<Vec<_>>(), data.expected_blocks());
    }

    /// Property: every block lies inside its chromosome and is non-empty
    #[test]
    fn prop_chain_block_coords_valid(data in arb_chain()) {
        let chains = parse_chain_bytes(data.to_text().as_bytes()).unwrap();
        for block in chains[0].blocks() {
            prop_assert!(block.reference_start < block.reference_end);
            prop_assert!(block.query_start < block.query_end);
            prop_assert!(block.reference_end <= data.reference.size);
            prop_assert!(block.query_end <= data.query.size);
            prop_assert_eq!(block.len(), block.query_end - block.query_start);
        }
    }

    /// Property: chains separated by blank lines parse independently
    #[test]
    fn prop_multiple_chains_parse(first in arb_chain(), second in arb_chain()) {
        let text = format!("{}\n{}", first.to_text(), second.to_text());
        let chains = parse_chain_bytes(text.as_bytes()).unwrap();
        prop_assert_eq!(chains.len(), 2);
        let mut expected = first.expected_blocks();
        expected.extend(second.expected_blocks());
        prop_assert_eq!(all_blocks(&chains), expected);
    }

    /// Property: a block walking past the declared end is rejected
    #[test]
    fn prop_truncated_span_is_rejected(data in arb_chain()) {
        let (r_span, _) = data.spans();
        let text = data.to_text().replacen(
            &format!(" {} {} ", data.reference.start, data.reference.start + r_span),
            &format!(" {} {} ", data.reference.start, data.reference.start + r_span - 1),
            1,
        );
        prop_assert!(parse_chain_bytes(text.as_bytes()).is_err());
    }
}

mod compression_properties {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression as Bz2Compression;
    use flate2::write::GzEncoder;
    use flate2::Compression as GzCompression;
    use std::io::Write;
    use tempfile::TempDir;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Property: plain, gzip and bzip2 chain files parse to the same chains
        #[test]
        fn prop_all_formats_equivalent(data in arb_chain()) {
            let text = data.to_text();
            let dir = TempDir::new().unwrap();

            let plain_path = dir.path().join("plain.chain");
            std::fs::write(&plain_path, &text).unwrap();

            let mut gz = GzEncoder::new(Vec::new(), GzCompression::default());
            gz.write_all(text.as_bytes()).unwrap();
            let gz_path = dir.path().join("test.chain.gz");
            std::fs::write(&gz_path, gz.finish().unwrap()).unwrap();

            let mut bz = BzEncoder::new(Vec::new(), Bz2Compression::default());
            bz.write_all(text.as_bytes()).unwrap();
            let bz_path = dir.path().join("test.chain.bz2");
            std::fs::write(&bz_path, bz.finish().unwrap()).unwrap();

            let plain = parse_chain_file(&plain_path).unwrap();
            prop_assert_eq!(&plain, &parse_chain_bytes(text.as_bytes()).unwrap());
            prop_assert_eq!(&plain, &parse_chain_file(&gz_path).unwrap());
            prop_assert_eq!(&plain, &parse_chain_file(&bz_path).unwrap());
        }
    }
}
