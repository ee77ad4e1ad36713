use cubegen::{
    cell::{clean_scalar, split_multi_value_cell, strip_outer_quotes},
    section::{RawTable, SectionKind, SectionRegistry, classify, normalize_header},
};
use proptest::prelude::*;

const HEADER_SPELLINGS: [&str; 16] = [
    "Cube Name",
    "SqlTable",
    "sql table",
    "Name",
    "type",
    "SQL",
    "Primary Key",
    "cube",
    "Relationship",
    "aggregation",
    "desc",
    "notes",
    "Primary Table",
    "secondary table",
    "Table Name",
    "Data Type",
];

#[test]
fn every_alias_maps_to_its_canonical_name() {
    let registry = SectionRegistry::default();
    for kind in SectionKind::ALL {
        for (raw, canonical) in registry.aliases(kind) {
            let remapped = registry.remap_headers(kind, &[normalize_header(raw)]);
            assert_eq!(remapped, vec![canonical.to_string()], "{kind}: {raw}");
        }
    }
}

#[test]
fn every_alias_classifies_into_its_owning_section() {
    let registry = SectionRegistry::default();
    for kind in SectionKind::ALL {
        let required = &registry.rule(kind).required;
        for (raw, canonical) in registry.aliases(kind) {
            let headers = std::iter::once(raw.to_string())
                .chain(required.iter().filter(|name| *name != canonical).cloned())
                .collect::<Vec<_>>();
            let rows = vec![vec!["v".to_string(); headers.len()]];
            let (decision, _) = classify(&RawTable::new("sheet", headers, rows), &registry)
                .expect("non-blank table classifies");

            let owner = decision
                .scores
                .iter()
                .position(|(scored, _)| *scored == kind)
                .expect("every kind is scored");
            let owner_score = decision.scores[owner].1;
            assert_eq!(owner_score, required.len(), "{kind}: {raw}");

            // Dimension and measure rows share one required layout; an alias
            // naming only the cube ties and the earlier section wins.
            if decision.scores[..owner].iter().any(|(_, score)| *score == owner_score) {
                assert!(!required.iter().any(|name| name == canonical), "{kind}: {raw}");
                continue;
            }
            assert_eq!(decision.kind, kind, "{kind}: {raw}");
            assert!(decision.columns.iter().any(|column| column == canonical), "{kind}: {raw}");
        }
    }
}

proptest! {
    #[test]
    fn classifying_the_same_table_twice_agrees(
        picks in proptest::collection::vec(0..HEADER_SPELLINGS.len(), 1..8),
        label in "[a-z ]{0,12}",
        blank_row in any::<bool>()
    ) {
        let registry = SectionRegistry::default();
        let headers = picks.iter().map(|&idx| HEADER_SPELLINGS[idx].to_string()).collect::<Vec<_>>();
        let mut rows = vec![vec!["v".to_string(); headers.len()]];
        if blank_row {
            rows.push(vec![" ".to_string(); headers.len()]);
        }
        let table = RawTable::new(label.as_str(), headers, rows);

        let first = classify(&table, &registry).expect("non-blank table classifies");
        let second = classify(&table, &registry).expect("non-blank table classifies");
        prop_assert_eq!(&first.0, &second.0);
        prop_assert_eq!(&first.1, &second.1);
        let best = first.0.scores.iter().map(|(_, score)| *score).max();
        prop_assert_eq!(best, Some(first.0.score));
    }

    #[test]
    fn reclassifying_remapped_columns_keeps_the_score(
        picks in proptest::collection::vec(0..HEADER_SPELLINGS.len(), 1..8),
        label in prop_oneof![
            Just("sheet1"),
            Just("cube list"),
            Just("joins"),
            Just("dimension map"),
            Just("metrics"),
        ]
    ) {
        let registry = SectionRegistry::default();
        let headers = picks.iter().map(|&idx| HEADER_SPELLINGS[idx].to_string()).collect::<Vec<_>>();
        let rows = vec![vec!["v".to_string(); headers.len()]];
        let (first, _) = classify(&RawTable::new(label, headers, rows.clone()), &registry)
            .expect("non-blank table classifies");

        let again = RawTable::new(label, first.columns.clone(), rows);
        let (second, _) = classify(&again, &registry).expect("classifies again");
        let rescored = second
            .scores
            .iter()
            .find(|(kind, _)| *kind == first.kind)
            .map(|(_, score)| *score);
        prop_assert_eq!(rescored, Some(first.score));
    }

    #[test]
    fn cleaned_cells_are_trimmed_and_unquoted(raw in "[ '\"a-z_]{0,12}") {
        if let Some(clean) = clean_scalar(&raw) {
            prop_assert!(!clean.is_empty());
            prop_assert_eq!(clean.trim(), clean.as_str());
            prop_assert_eq!(strip_outer_quotes(&clean), clean.as_str());
        }
    }

    #[test]
    fn multi_value_cells_never_yield_blank_entries(
        parts in proptest::collection::vec("[a-z_ ]{0,6}", 0..5),
        newline in any::<bool>()
    ) {
        let separator = if newline { "\n" } else { "," };
        let cell = parts.join(separator);
        for value in split_multi_value_cell(&cell) {
            prop_assert!(!value.trim().is_empty());
            prop_assert!(!value.contains(','));
        }
    }
}
