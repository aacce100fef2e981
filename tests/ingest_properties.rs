//! Property-based tests for read ingestion
//!
//! Whole-region and start-site pileups against a naive per-position count,
//! and BED files (plain or gzipped) against the same records in memory.

use flate2::write::GzEncoder;
use flate2::Compression;
use pileup_engine::core::WorkerPool;
use pileup_engine::engine::ingest::{ingest_records, load_bed, IngestOptions, RegionHandling};
use pileup_engine::{Assembly, ChromDialect, EngineConfig, IntervalRecord, Layout, SignalTable, Strand};
use proptest::prelude::*;
use std::io::Write;

const LEN: i64 = 80;

fn arb_record() -> impl Strategy<Value = IntervalRecord> {
    (0i64..LEN, 1i64..20, any::<bool>(), prop_oneof![Just("chr1"), Just("chr2"), Just("1")]).prop_map(
        |(start, len, plus, chrom)| {
            let strand = if plus { Strand::Plus } else { Strand::Minus };
            IntervalRecord::new(chrom, start, (start + len).min(LEN), Some(strand))
        },
    )
}

fn empty(layout: Layout) -> SignalTable<f64> {
    let asm = Assembly::from_lengths("prop", [("chr1", LEN as usize), ("chr2", LEN as usize)], &ChromDialect::Ucsc);
    SignalTable::create("reads", &asm, ChromDialect::Ucsc, layout)
}

fn ucsc(chrom: &str) -> &str {
    if chrom == "1" {
        "chr1"
    } else {
        chrom
    }
}

fn ingest(table: &mut SignalTable<f64>, records: &[IntervalRecord], handling: RegionHandling) {
    let pool = WorkerPool::new(2).unwrap();
    let config = EngineConfig::default().with_threads(2);
    ingest_records(table, records.iter().cloned().map(Ok), &IngestOptions::new(handling), &pool, &config).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: whole-region ingest matches a per-position count
    #[test]
    fn prop_whole_region_matches_naive(
        records in prop::collection::vec(arb_record(), 0..40),
        stranded in any::<bool>(),
    ) {
        let layout = if stranded { Layout::Stranded } else { Layout::Unstranded };
        let mut table = empty(layout);
        ingest(&mut table, &records, RegionHandling::Whole);

        let mut expected = empty(layout);
        for r in &records {
            let strand = if stranded { r.strand } else { None };
            let channel = expected.channel_mut(ucsc(&r.chrom), strand).unwrap();
            for pos in r.start..r.end {
                channel[pos as usize] += 1.0;
            }
        }
        prop_assert_eq!(&table, &expected);

        let total: i64 = records.iter().map(|r| r.len()).sum();
        prop_assert!((table.sum() - total as f64).abs() < 1e-9);
        prop_assert!((table.meta().total_reads - records.len() as f64).abs() < 1e-9);
    }

    /// Property: each record adds exactly one start on its own strand
    #[test]
    fn prop_starts_count_records(records in prop::collection::vec(arb_record(), 0..40)) {
        let mut table = empty(Layout::Stranded);
        ingest(&mut table, &records, RegionHandling::Starts);

        for strand in Strand::BOTH {
            let count = records.iter().filter(|r| r.strand == Some(strand)).count();
            let one = table.one_strand(strand).unwrap();
            prop_assert!((one.sum() - count as f64).abs() < 1e-9);
        }
        for r in &records {
            let pos = match r.strand {
                Some(Strand::Minus) => r.end - 1,
                _ => r.start,
            };
            prop_assert!(table.channel(ucsc(&r.chrom), r.strand).unwrap()[pos as usize] >= 1.0);
        }
    }

    /// Property: a BED file ingests like its records, compressed or not
    #[test]
    fn prop_bed_file_matches_records(
        records in prop::collection::vec(arb_record(), 1..30),
        gzip in any::<bool>(),
    ) {
        let mut text = String::new();
        for (i, r) in records.iter().enumerate() {
            let strand = r.strand.map_or('.', |s| s.to_char());
            text.push_str(&format!("{}\t{}\t{}\tread{}\t0\t{}\n", r.chrom, r.start, r.end, i, strand));
        }
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(if gzip { "reads.bed.gz" } else { "reads.bed" });
        if gzip {
            let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
            encoder.write_all(text.as_bytes()).unwrap();
            encoder.finish().unwrap();
        } else {
            std::fs::write(&path, &text).unwrap();
        }

        let pool = WorkerPool::new(2).unwrap();
        let config = EngineConfig::default();
        let options = IngestOptions::new(RegionHandling::Starts);
        let mut from_file = empty(Layout::Stranded);
        let report = load_bed(&mut from_file, &path, &options, &pool, &config).unwrap();
        prop_assert_eq!(report.records, records.len());

        let mut in_memory = empty(Layout::Stranded);
        ingest(&mut in_memory, &records, RegionHandling::Starts);
        prop_assert_eq!(&from_file, &in_memory);
    }
}

#[test]
fn test_unknown_chromosome_is_skipped() {
    let mut table = empty(Layout::Stranded);
    let records = vec![
        IntervalRecord::new("chrZ", 0, 5, Some(Strand::Plus)),
        IntervalRecord::new("chr2", 0, 5, Some(Strand::Plus)),
    ];
    let pool = WorkerPool::new(1).unwrap();
    let report = ingest_records(
        &mut table,
        records.into_iter().map(Ok),
        &IngestOptions::new(RegionHandling::Whole),
        &pool,
        &EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(report.skipped, 1);
    assert!(report.missing_chromosomes.contains("chrZ"));
    assert_eq!(table.sum(), 5.0);
}
