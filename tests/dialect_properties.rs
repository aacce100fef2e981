//! Property-based tests for chromosome naming dialects

use pileup_engine::core::natural_sort;
use pileup_engine::{Assembly, ChromDialect, Layout, SignalTable};
use proptest::prelude::*;

fn arb_dialect() -> impl Strategy<Value = ChromDialect> {
    prop_oneof![Just(ChromDialect::AsIs), Just(ChromDialect::Ucsc), Just(ChromDialect::Ensembl)]
}

/// Chromosome names with or without a `chr` prefix
fn arb_name() -> impl Strategy<Value = String> {
    let core = prop_oneof![
        (1u8..=22).prop_map(|n| n.to_string()),
        Just("X".to_string()),
        Just("M".to_string()),
        Just("MT".to_string()),
        Just("Un_gl000220".to_string()),
        "[0-9A-BD-Za-bd-z][0-9A-Za-z_]{0,7}",
    ];
    (prop_oneof![Just(""), Just("chr"), Just("Chr"), Just("CHR")], core)
        .prop_map(|(prefix, core)| format!("{}{}", prefix, core))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: translating twice equals translating once
    #[test]
    fn prop_translate_is_idempotent(dialect in arb_dialect(), name in arb_name()) {
        let once = dialect.translate(&name);
        prop_assert_eq!(dialect.translate(&once), once);
    }

    /// Property: the short name does not depend on the long spelling in between
    #[test]
    fn prop_long_then_short_equals_short(name in arb_name()) {
        let via_long = ChromDialect::Ensembl.translate(&ChromDialect::Ucsc.translate(&name));
        prop_assert_eq!(via_long, ChromDialect::Ensembl.translate(&name));
    }

    /// Property: a table answers to every spelling of its chromosome names
    #[test]
    fn prop_table_resolves_any_spelling(number in 1u8..=22, len in 1usize..100, long in any::<bool>()) {
        let dialect = if long { ChromDialect::Ucsc } else { ChromDialect::Ensembl };
        let asm = Assembly::from_lengths("prop", [(format!("chr{}", number), len)], &dialect);
        let table: SignalTable<f32> = SignalTable::create("t", &asm, dialect, Layout::Unstranded);
        for spelling in [format!("chr{}", number), number.to_string(), format!("CHR{}", number)] {
            prop_assert_eq!(table.chrom_len(&spelling).unwrap(), len);
            prop_assert_eq!(table.resolve(&spelling).unwrap(), dialect.translate(&spelling));
        }
    }

    /// Property: numbered chromosomes sort by number
    #[test]
    fn prop_natural_sort_orders_numbers(mut numbers in prop::collection::vec(1u32..200, 1..20)) {
        let mut names: Vec<String> = numbers.iter().map(|n| format!("chr{}", n)).collect();
        natural_sort(&mut names);
        numbers.sort_unstable();
        let expected: Vec<String> = numbers.iter().map(|n| format!("chr{}", n)).collect();
        prop_assert_eq!(names, expected);
    }
}
