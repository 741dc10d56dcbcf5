//! Property tests for the sparse tableau.

use proptest::prelude::*;
use relux_solver::SparseTableau;

const SIZE: usize = 6;
const EPSILON: f64 = 1e-10;

/// Random sparse matrices over `SIZE` variables with well-separated
/// nonzero values.
fn arbitrary_cells() -> impl Strategy<Value = Vec<(usize, usize, f64)>> {
    prop::collection::vec(
        (0..SIZE, 0..SIZE, -10.0..10.0f64),
        0..20,
    )
    .prop_map(|cells| {
        // One value per position; drop near-zero values up front.
        let mut seen = std::collections::BTreeMap::new();
        for (row, column, value) in cells {
            if value.abs() > 1e-3 {
                seen.insert((row, column), value);
            }
        }
        seen.into_iter()
            .map(|((row, column), value)| (row, column, value))
            .collect()
    })
}

fn build(cells: &[(usize, usize, f64)]) -> SparseTableau {
    let mut tableau = SparseTableau::new(SIZE, EPSILON);
    for &(row, column, value) in cells {
        tableau.add_entry(row, column, value);
    }
    tableau
}

proptest! {
    #[test]
    fn prop_snapshot_matches_inserted_cells(cells in arbitrary_cells()) {
        let tableau = build(&cells);
        prop_assert_eq!(tableau.total_size(), cells.len());
        prop_assert_eq!(tableau.snapshot(), cells);
    }

    #[test]
    fn prop_backup_round_trip(cells in arbitrary_cells()) {
        let tableau = build(&cells);

        let mut copy = SparseTableau::new(SIZE, EPSILON);
        tableau.backup_into(&mut copy);
        prop_assert_eq!(tableau.snapshot(), copy.snapshot());

        // Round trip back.
        let mut back = SparseTableau::new(SIZE, EPSILON);
        copy.backup_into(&mut back);
        prop_assert_eq!(tableau.snapshot(), back.snapshot());
    }

    #[test]
    fn prop_scaled_row_addition_then_subtraction(
        cells in arbitrary_cells(),
        scale in prop::sample::select(vec![-2.0, -1.0, -0.5, 0.5, 1.0, 2.0]),
    ) {
        // Pick two distinct rows; seed the source row with a cell the
        // generator is barred from producing so it is never empty.
        let cells: Vec<_> = cells
            .into_iter()
            .filter(|&(row, column, _)| !(row == 0 && column == 5))
            .collect();
        let mut tableau = build(&cells);
        let source = 0;
        let target = 1;
        tableau.add_entry(source, 5, 3.0);

        let before = tableau.snapshot();
        tableau.add_scaled_row(source, scale, target, None);
        tableau.add_scaled_row(source, -scale, target, None);
        let after = tableau.snapshot();

        // Adding and subtracting the same scaled row is the identity, up
        // to cells that cancelled exactly and were dropped both times.
        let lookup = |snapshot: &[(usize, usize, f64)], row: usize, column: usize| {
            snapshot
                .iter()
                .find(|&&(r, c, _)| r == row && c == column)
                .map(|&(_, _, value)| value)
                .unwrap_or(0.0)
        };

        for row in 0..SIZE {
            for column in 0..SIZE {
                let value_before = lookup(&before, row, column);
                let value_after = lookup(&after, row, column);
                prop_assert!(
                    (value_before - value_after).abs() < 1e-6,
                    "cell ({}, {}) drifted: {} -> {}",
                    row, column, value_before, value_after
                );
            }
        }
    }

    #[test]
    fn prop_erase_column_empties_column_only(cells in arbitrary_cells()) {
        let mut tableau = build(&cells);
        tableau.erase_column(2);

        prop_assert!(!tableau.active_column(2));
        prop_assert_eq!(tableau.column_size(2), 0);

        for &(row, column, value) in &cells {
            if column != 2 {
                prop_assert_eq!(tableau.get(row, column), value);
            }
        }
    }

    #[test]
    fn prop_column_merge_preserves_row_sums(cells in arbitrary_cells()) {
        let mut tableau = build(&cells);

        // Merging column 0 into column 1 must preserve, per row, the sum
        // of the two columns' contributions.
        let expected: Vec<f64> = (0..SIZE)
            .map(|row| tableau.get(row, 0) + tableau.get(row, 1))
            .collect();

        tableau.add_column_erase_source(0, 1);

        prop_assert!(!tableau.active_column(0));
        for (row, &sum) in expected.iter().enumerate() {
            let merged = tableau.get(row, 1);
            prop_assert!(
                (merged - sum).abs() < 1e-9,
                "row {}: expected {}, got {}",
                row, sum, merged
            );
        }
    }
}
