//! Property-based tests for chain liftover
//!
//! Gapped chains copy blocks and leave gaps empty, reverse chains are their
//! own inverse, and mappability counts follow the block layout.

use pileup_engine::core::{parse_chain_bytes, WorkerPool};
use pileup_engine::engine::liftover::{lift_over_chain, mappability_from_chain, ChainFilter, MappabilityDirection};
use pileup_engine::{Assembly, ChromDialect, Layout, SignalTable};
use proptest::prelude::*;

/// Alternating block sizes and gaps; gaps apply to both sides
fn arb_blocks() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((1u64..15, 0u64..6), 1..6)
}

fn chain_text(blocks: &[(u64, u64)], len: u64, query_strand: char) -> String {
    let mut text = format!("chain 1000 chr1 {len} + 0 {len} chr1 {len} {query_strand} 0 {len} 1\n");
    for (i, (size, gap)) in blocks.iter().enumerate() {
        if i + 1 == blocks.len() {
            text.push_str(&format!("{}\n\n", size));
        } else {
            text.push_str(&format!("{} {} {}\n", size, gap, gap));
        }
    }
    text
}

fn span(blocks: &[(u64, u64)]) -> u64 {
    let last = blocks.len() - 1;
    blocks
        .iter()
        .enumerate()
        .map(|(i, (size, gap))| size + if i == last { 0 } else { *gap })
        .sum()
}

fn table(len: usize, layout: Layout, seed: u64) -> SignalTable<f64> {
    let asm = Assembly::from_lengths("a", [("chr1", len)], &ChromDialect::Ucsc);
    let mut table = SignalTable::create("t", &asm, ChromDialect::Ucsc, layout);
    for (_, channels) in table.iter_mut() {
        for (c, track) in channels.iter_mut().enumerate() {
            for (i, v) in track.as_mut_slice().iter_mut().enumerate() {
                *v = (((i as u64 + 1) * (seed + 3) + c as u64 * 7) % 11 + 1) as f64;
            }
        }
    }
    table
}

/// Positions of `chr1` covered by a block
fn covered(blocks: &[(u64, u64)], len: usize) -> Vec<bool> {
    let mut mask = vec![false; len];
    let mut pos = 0usize;
    for (size, gap) in blocks {
        mask[pos..pos + *size as usize].iter_mut().for_each(|m| *m = true);
        pos += (*size + *gap) as usize;
    }
    mask
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: a gapped same-strand chain copies blocks and zeroes gaps
    #[test]
    fn prop_gapped_chain_copies_blocks(blocks in arb_blocks(), seed in 0u64..50, stranded in any::<bool>()) {
        let len = span(&blocks);
        let layout = if stranded { Layout::Stranded } else { Layout::Unstranded };
        let source = table(len as usize, layout, seed);
        let chains = parse_chain_bytes(chain_text(&blocks, len, '+').as_bytes()).unwrap();
        let pool = WorkerPool::new(2).unwrap();
        let report = lift_over_chain(&source, source.assembly(), &chains, &ChainFilter::default(), &pool).unwrap();
        prop_assert_eq!(report.blocks_copied, blocks.len());

        let mask = covered(&blocks, len as usize);
        for ((_, lifted), (_, original)) in report.table.iter().zip(source.iter()) {
            for (lt, ot) in lifted.iter().zip(original.iter()) {
                for (i, (l, o)) in lt.as_slice().iter().zip(ot.as_slice()).enumerate() {
                    if mask[i] {
                        prop_assert_eq!(l, o);
                    } else {
                        prop_assert_eq!(*l, 0.0);
                    }
                }
            }
        }
    }

    /// Property: lifting twice through a whole-chromosome reverse chain is the identity
    #[test]
    fn prop_reverse_chain_is_involution(len in 1u64..80, seed in 0u64..50, stranded in any::<bool>()) {
        let layout = if stranded { Layout::Stranded } else { Layout::Unstranded };
        let source = table(len as usize, layout, seed);
        let chains = parse_chain_bytes(chain_text(&[(len, 0)], len, '-').as_bytes()).unwrap();
        let pool = WorkerPool::new(2).unwrap();
        let filter = ChainFilter::default();
        let once = lift_over_chain(&source, source.assembly(), &chains, &filter, &pool).unwrap().table;
        prop_assert!((once.sum() - source.sum()).abs() < 1e-9);
        let twice = lift_over_chain(&once, source.assembly(), &chains, &filter, &pool).unwrap().table;
        prop_assert_eq!(twice, source);
    }

    /// Property: reference-side mappability is 1 on blocks and 0 in gaps
    #[test]
    fn prop_mappability_marks_blocks(blocks in arb_blocks()) {
        let len = span(&blocks);
        let asm = Assembly::from_lengths("a", [("chr1", len as usize)], &ChromDialect::Ucsc);
        let chains = parse_chain_bytes(chain_text(&blocks, len, '+').as_bytes()).unwrap();
        let pool = WorkerPool::new(1).unwrap();
        for direction in [MappabilityDirection::From, MappabilityDirection::To] {
            let report = mappability_from_chain(
                &asm, &asm, ChromDialect::Ucsc, &chains, &ChainFilter::default(), direction, &pool,
            ).unwrap();
            prop_assert_eq!(report.table.layout(), Layout::Unstranded);
            let counts = report.table.channel("chr1", None).unwrap();
            for (count, is_covered) in counts.iter().zip(covered(&blocks, len as usize)) {
                prop_assert_eq!(*count, u32::from(is_covered));
            }
        }
    }
}
