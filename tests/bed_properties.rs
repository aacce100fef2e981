//! Property-based tests for the record readers
//!
//! BED, bowtie and tag-directory lines all become the same half-open
//! `IntervalRecord`s.

use pileup_engine::formats::bed::BedRecordView;
use pileup_engine::formats::{BedReader, BowtieReader, TagReader};
use pileup_engine::{IntervalRecord, Strand};
use proptest::prelude::*;

/// Generate a valid chromosome name
fn arb_chrom_name() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u8..=22).prop_map(|n| format!("chr{}", n)),
        Just("chrX".to_string()),
        Just("chrY".to_string()),
    ]
}

/// Generate a valid BED name field
fn arb_bed_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,20}"
}

/// Generate a valid score (0-1000)
fn arb_score() -> impl Strategy<Value = String> {
    (0u32..=1000).prop_map(|n| n.to_string())
}

fn arb_strand() -> impl Strategy<Value = Strand> {
    prop_oneof![Just(Strand::Plus), Just(Strand::Minus)]
}

/// Generate a BED3 line
fn arb_bed3_line() -> impl Strategy<Value = String> {
    (arb_chrom_name(), 1000u64..100000, 100u64..1000)
        .prop_map(|(chrom, start, size)| format!("{}\t{}\t{}", chrom, start, start + size))
}

/// Generate a BED6 line with a strand or `.`
fn arb_bed6_line() -> impl Strategy<Value = String> {
    (
        arb_chrom_name(),
        1000u64..100000,
        100u64..1000,
        arb_bed_name(),
        arb_score(),
        prop_oneof![Just("+"), Just("-"), Just(".")],
    )
        .prop_map(|(chrom, start, size, name, score, strand)| {
            format!("{}\t{}\t{}\t{}\t{}\t{}", chrom, start, start + size, name, score, strand)
        })
}

/// `(chrom, start, length, strand)` of one aligned read
fn arb_read() -> impl Strategy<Value = (String, i64, usize, Strand)> {
    (arb_chrom_name(), 0i64..1_000_000, 20usize..100, arb_strand())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: BED3 parsing extracts correct coordinates
    #[test]
    fn prop_bed3_coordinate_parsing(line in arb_bed3_line()) {
        let view = BedRecordView::parse(line.as_bytes()).unwrap();
        let fields: Vec<&str> = line.split('\t').collect();
        let expected_start: i64 = fields[1].parse().unwrap();
        let expected_end: i64 = fields[2].parse().unwrap();

        prop_assert_eq!(view.chrom, fields[0]);
        prop_assert_eq!(view.start, expected_start);
        prop_assert_eq!(view.end, expected_end);
        prop_assert_eq!(view.field_count(), 3);
        prop_assert!(view.strand_field().is_none());
    }

    /// Property: BED6 parsing keeps the optional fields
    #[test]
    fn prop_bed6_field_parsing(line in arb_bed6_line()) {
        let view = BedRecordView::parse(line.as_bytes()).unwrap();
        let fields: Vec<&str> = line.split('\t').collect();

        prop_assert_eq!(view.field_count(), 6);
        prop_assert_eq!(view.chrom, fields[0]);
        prop_assert_eq!(view.name(), Some(fields[3]));
        prop_assert_eq!(view.field(4), Some(fields[4]));
        prop_assert_eq!(view.strand_field(), Some(fields[5]));
    }

    /// Property: the BED reader yields one record per data line, `.` meaning no strand
    #[test]
    fn prop_bed_reader_records(lines in prop::collection::vec(arb_bed6_line(), 0..20)) {
        let mut text = String::from("track name=reads\n");
        for line in &lines {
            text.push_str(line);
            text.push('\n');
        }
        let records: Vec<IntervalRecord> = BedReader::new(text.as_bytes(), "prop.bed")
            .collect::<pileup_engine::Result<_>>()
            .unwrap();
        prop_assert_eq!(records.len(), lines.len());
        for (record, line) in records.iter().zip(&lines) {
            let fields: Vec<&str> = line.split('\t').collect();
            prop_assert_eq!(&record.chrom, fields[0]);
            prop_assert_eq!(record.start.to_string(), fields[1]);
            prop_assert_eq!(record.end.to_string(), fields[2]);
            let strand = record.strand.map_or(".".to_string(), |s| s.to_char().to_string());
            prop_assert_eq!(strand, fields[5]);
            prop_assert_eq!(record.weight, 1.0);
        }
    }

    /// Property: both bowtie layouts describe the same interval
    #[test]
    fn prop_bowtie_layouts_agree(reads in prop::collection::vec(arb_read(), 1..20)) {
        let mut short = String::new();
        let mut native = String::new();
        for (i, (chrom, start, len, strand)) in reads.iter().enumerate() {
            let seq = "A".repeat(*len);
            short.push_str(&format!("{}\t{}\t{}\t{}\n", chrom, strand.to_char(), start, seq));
            native.push_str(&format!("read{}\t{}\t{}\t{}\t{}\t{}\t0\n", i, strand.to_char(), chrom, start, seq, "I".repeat(*len)));
        }
        let a: Vec<IntervalRecord> = BowtieReader::new(short.as_bytes(), "a.bwt")
            .collect::<pileup_engine::Result<_>>()
            .unwrap();
        let b: Vec<IntervalRecord> = BowtieReader::new(native.as_bytes(), "b.bwt")
            .collect::<pileup_engine::Result<_>>()
            .unwrap();
        prop_assert_eq!(&a, &b);
        for (record, (_, start, len, strand)) in a.iter().zip(&reads) {
            prop_assert_eq!(record.start, *start);
            prop_assert_eq!(record.len(), *len as i64);
            prop_assert_eq!(record.strand, Some(*strand));
        }
    }

    /// Property: a tag's 5' end sits at `position - 1` on both strands
    #[test]
    fn prop_tag_five_prime_end(reads in prop::collection::vec(arb_read(), 1..20), count in 1u32..5) {
        let mut text = String::new();
        for (chrom, start, len, strand) in &reads {
            let position = start + *len as i64;
            let code = if *strand == Strand::Plus { 0 } else { 1 };
            text.push_str(&format!("{}\t{}\t{}\t{}\t{}\n", chrom, position, code, count, len));
        }
        let records: Vec<IntervalRecord> = TagReader::new(text.as_bytes(), "chr.tags.tsv")
            .collect::<pileup_engine::Result<_>>()
            .unwrap();
        for (record, (_, start, len, strand)) in records.iter().zip(&reads) {
            let position = start + *len as i64;
            let five_prime = match strand {
                Strand::Plus => record.start,
                Strand::Minus => record.end - 1,
            };
            prop_assert_eq!(five_prime, position - 1);
            prop_assert_eq!(record.len(), *len as i64);
            prop_assert_eq!(record.weight, count as f64);
        }
    }
}
