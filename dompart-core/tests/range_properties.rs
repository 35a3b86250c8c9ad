use dompart_core::{Position, SequenceRange};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn arb_positions() -> impl Strategy<Value = BTreeSet<Position>> {
    prop::collection::btree_set(1u32..500, 1..120)
}

fn arb_range_text() -> impl Strategy<Value = String> {
    prop::collection::vec((1u32..400, 0u32..60), 1..6).prop_map(|segments| {
        segments
            .iter()
            .map(|(start, len)| format!("{}-{}", start, start + len))
            .collect::<Vec<_>>()
            .join(",")
    })
}

proptest! {
    #[test]
    fn prop_positions_survive_compaction(positions in arb_positions()) {
        let range = SequenceRange::from_positions(positions.iter().copied(), None).unwrap();
        prop_assert_eq!(range.position_set().unwrap(), positions.clone());
        prop_assert_eq!(range.total_length(), positions.len());
        prop_assert_eq!(range.start_position(), *positions.iter().next().unwrap());
        prop_assert_eq!(range.end_position(), *positions.iter().next_back().unwrap());
    }

    #[test]
    fn prop_display_parses_back(text in arb_range_text()) {
        let range = SequenceRange::parse(&text).unwrap();
        let reparsed: SequenceRange = range.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, range);
    }

    #[test]
    fn prop_merge_gaps_only_adds_positions(text in arb_range_text(), tolerance in 0u32..20) {
        let range = SequenceRange::parse(&text).unwrap();
        let merged = range.merge_gaps(tolerance);
        let before = range.position_set().unwrap();
        let after = merged.position_set().unwrap();

        prop_assert!(before.is_subset(&after));
        prop_assert!(merged.segments().len() <= range.segments().len());
        prop_assert_eq!(merged.span(), range.span());
        for pair in merged.segments().windows(2) {
            let gap = pair[0].gap_to(&pair[1]);
            prop_assert!(gap.map_or(false, |g| g > tolerance));
        }
    }

    #[test]
    fn prop_coverage_is_a_fraction(a in arb_range_text(), b in arb_range_text()) {
        let a = SequenceRange::parse(&a).unwrap();
        let b = SequenceRange::parse(&b).unwrap();
        let coverage = a.coverage(&b);
        prop_assert!((0.0..=1.0).contains(&coverage));
        prop_assert_eq!(coverage > 0.0, a.overlaps(&b));
        prop_assert!((a.coverage(&a) - 1.0).abs() < 1e-12);
    }
}
