//! End-to-end solver scenarios.

use relux_solver::{DissolutionKind, Reluplex, SolveStatus};

const OOB: f64 = 1e-3;

/// The small satisfiable system: variables x1, x2b, x2f, x3b, x3f, x4 and
/// three equation rows
/// `x5 = x2f + x3f - x4`, `x6 = x1 - x2b`, `x7 = x1 + x3b`,
/// all pinned to zero, with pairs (x2b, x2f) and (x3b, x3f).
fn satisfiable_example() -> Reluplex {
    let mut solver = Reluplex::new(9);

    for (var, name) in [
        (0, "x1"),
        (1, "x2b"),
        (2, "x2f"),
        (3, "x3b"),
        (4, "x3f"),
        (5, "x4"),
        (6, "x5"),
        (7, "x6"),
        (8, "x7"),
    ] {
        solver.set_name(var, name);
    }

    solver.initialize_cell(6, 2, 1.0);
    solver.initialize_cell(6, 4, 1.0);
    solver.initialize_cell(6, 5, -1.0);
    solver.initialize_cell(6, 6, -1.0);

    solver.initialize_cell(7, 0, 1.0);
    solver.initialize_cell(7, 1, -1.0);
    solver.initialize_cell(7, 7, -1.0);

    solver.initialize_cell(8, 0, 1.0);
    solver.initialize_cell(8, 3, 1.0);
    solver.initialize_cell(8, 8, -1.0);

    solver.mark_basic(6);
    solver.mark_basic(7);
    solver.mark_basic(8);

    solver.set_lower_bound(0, 0.0);
    solver.set_upper_bound(0, 1.0);
    solver.set_lower_bound(2, 0.0);
    solver.set_lower_bound(4, 0.0);
    solver.set_lower_bound(5, 0.5);
    solver.set_upper_bound(5, 1.0);
    solver.set_lower_bound(6, 0.0);
    solver.set_upper_bound(6, 0.0);
    solver.set_lower_bound(7, 0.0);
    solver.set_upper_bound(7, 0.0);
    solver.set_lower_bound(8, 0.0);
    solver.set_upper_bound(8, 0.0);

    solver.set_lower_bound(1, -9.0);
    solver.set_upper_bound(1, 9.0);
    solver.set_upper_bound(2, 9.0);
    solver.set_lower_bound(3, -9.0);
    solver.set_upper_bound(3, 9.0);
    solver.set_upper_bound(4, 9.0);

    solver.set_relu_pair(1, 2);
    solver.set_relu_pair(3, 4);

    solver
}

/// A variant that cannot be satisfied: `x7 = -x1 - x3b = 0` forces
/// `x3b <= 0`, while an extra row forces `x3f = x4 >= 0.5`.
fn unsatisfiable_example() -> Reluplex {
    let mut solver = Reluplex::new(10);

    solver.initialize_cell(6, 2, 1.0);
    solver.initialize_cell(6, 5, -1.0);
    solver.initialize_cell(6, 6, -1.0);

    solver.initialize_cell(7, 0, 1.0);
    solver.initialize_cell(7, 1, -1.0);
    solver.initialize_cell(7, 7, -1.0);

    solver.initialize_cell(8, 0, -1.0);
    solver.initialize_cell(8, 3, -1.0);
    solver.initialize_cell(8, 8, -1.0);

    solver.initialize_cell(9, 4, 1.0);
    solver.initialize_cell(9, 5, -1.0);
    solver.initialize_cell(9, 9, -1.0);

    solver.mark_basic(6);
    solver.mark_basic(7);
    solver.mark_basic(8);
    solver.mark_basic(9);

    solver.set_lower_bound(0, 0.0);
    solver.set_upper_bound(0, 1.0);
    solver.set_lower_bound(2, 0.0);
    solver.set_lower_bound(4, 0.0);
    solver.set_lower_bound(5, 0.5);
    solver.set_upper_bound(5, 1.0);
    for aux in 6..10 {
        solver.set_lower_bound(aux, 0.0);
        solver.set_upper_bound(aux, 0.0);
    }

    solver.set_lower_bound(1, -9.0);
    solver.set_upper_bound(1, 9.0);
    solver.set_upper_bound(2, 9.0);
    solver.set_lower_bound(3, -9.0);
    solver.set_upper_bound(3, 9.0);
    solver.set_upper_bound(4, 9.0);

    solver.set_relu_pair(1, 2);
    solver.set_relu_pair(3, 4);

    solver
}

#[test]
fn test_tiny_sat_example() {
    let mut solver = satisfiable_example();
    solver.initialize().unwrap();
    assert_eq!(solver.solve(), SolveStatus::Sat);

    solver.check_invariants().unwrap();

    let value = |var| solver.get_assignment(var);

    // Witness satisfies the equation rows...
    assert!((value(2) + value(4) - value(5)).abs() <= OOB);
    assert!((value(0) - value(1)).abs() <= OOB);
    assert!((value(0) + value(3)).abs() <= OOB);

    // ...the box bounds...
    assert!(value(0) >= -OOB && value(0) <= 1.0 + OOB);
    assert!(value(5) >= 0.5 - OOB && value(5) <= 1.0 + OOB);

    // ...and both rectifier constraints.
    assert!((value(2) - value(1).max(0.0)).abs() <= OOB);
    assert!((value(4) - value(3).max(0.0)).abs() <= OOB);
}

#[test]
fn test_tiny_unsat_example() {
    let mut solver = unsatisfiable_example();
    solver.initialize().unwrap();
    assert_eq!(solver.solve(), SolveStatus::Unsat);
}

#[test]
fn test_level_zero_bound_conflict() {
    let mut solver = Reluplex::new(2);
    solver.initialize_cell(1, 0, 1.0);
    solver.initialize_cell(1, 1, -1.0);
    solver.mark_basic(1);
    solver.set_lower_bound(1, 0.0);
    solver.set_upper_bound(1, 10.0);

    solver.set_lower_bound(0, 5.0);
    solver.set_upper_bound(0, 3.0);

    assert!(solver.initialize().is_err());
    assert_eq!(solver.solve(), SolveStatus::Unsat);
}

/// One pair (b = 1, f = 2) tied to an input x0 by the row
/// `aux = x0 - b` with `aux` pinned to zero.
fn single_pair_solver(input_value: f64) -> Reluplex {
    let mut solver = Reluplex::new(4);

    solver.initialize_cell(3, 0, 1.0);
    solver.initialize_cell(3, 1, -1.0);
    solver.initialize_cell(3, 3, -1.0);
    solver.mark_basic(3);

    solver.set_lower_bound(0, input_value);
    solver.set_upper_bound(0, input_value);
    solver.set_lower_bound(1, -9.0);
    solver.set_upper_bound(1, 9.0);
    solver.set_lower_bound(2, 0.0);
    solver.set_upper_bound(2, 9.0);
    solver.set_lower_bound(3, 0.0);
    solver.set_upper_bound(3, 0.0);

    solver.set_relu_pair(1, 2);
    solver
}

#[test]
fn test_forced_active_pair_merges() {
    let mut solver = single_pair_solver(1.0);
    solver.initialize().unwrap();

    // The row pins b = x0 = 1, so tightening learns lb(b) = 1 >= 0 and the
    // pair merges.
    solver.tighten_all_bounds().unwrap();

    assert_eq!(solver.dissolution_of(2), Some(DissolutionKind::Merge));
    assert!(
        !solver
            .tableau_snapshot()
            .iter()
            .any(|&(_, column, _)| column == 1),
        "merged b column must be empty"
    );
    assert_eq!(solver.lower_bound(2), Some(1.0));
    assert!((solver.get_assignment(1) - 1.0).abs() <= OOB);
    assert!((solver.get_assignment(2) - 1.0).abs() <= OOB);
    solver.check_invariants().unwrap();
}

#[test]
fn test_forced_inactive_pair_splits() {
    let mut solver = single_pair_solver(-1.0);
    solver.initialize().unwrap();

    // The row pins b = x0 = -1, so tightening learns ub(b) = -1 and the
    // pair splits with f fixed at zero.
    solver.tighten_all_bounds().unwrap();

    assert_eq!(solver.dissolution_of(2), Some(DissolutionKind::Split));
    assert_eq!(solver.upper_bound(2), Some(0.0));
    assert_eq!(solver.upper_bound(1), Some(-1.0));
    assert_eq!(solver.get_assignment(2), 0.0);
    solver.check_invariants().unwrap();
}

#[test]
fn test_merge_on_boundary_update() {
    let mut solver = single_pair_solver(0.5);
    solver.initialize().unwrap();

    // Directly asserting lb(b) = 0 must merge the pair.
    let changed = solver.update_lower_bound(1, 0.0, 0).unwrap();
    assert!(changed);
    assert_eq!(solver.dissolution_of(2), Some(DissolutionKind::Merge));
}

#[test]
fn test_split_on_zero_upper_bound() {
    let mut solver = single_pair_solver(0.5);
    solver.initialize().unwrap();

    // Asserting ub(b) = 0 must split the pair.
    solver.update_upper_bound(1, 0.0, 0).unwrap();
    assert_eq!(solver.dissolution_of(2), Some(DissolutionKind::Split));
    assert_eq!(solver.upper_bound(2), Some(0.0));
}

#[test]
fn test_tightening_is_monotone() {
    let mut solver = satisfiable_example();
    solver.initialize().unwrap();

    let lowers_before: Vec<_> = (0..9).map(|var| solver.lower_bound(var)).collect();
    let uppers_before: Vec<_> = (0..9).map(|var| solver.upper_bound(var)).collect();

    solver.tighten_all_bounds().unwrap();

    for var in 0..9 {
        // Skip the merged-away b of a dissolved pair; its bounds are
        // identified with the partner's.
        if solver.dissolution_of(2) == Some(DissolutionKind::Merge) && var == 1 {
            continue;
        }
        if solver.dissolution_of(4) == Some(DissolutionKind::Merge) && var == 3 {
            continue;
        }

        if let (Some(before), Some(after)) = (lowers_before[var], solver.lower_bound(var)) {
            assert!(after >= before - 1e-9, "lb({var}) decreased");
        }
        if let (Some(before), Some(after)) = (uppers_before[var], solver.upper_bound(var)) {
            assert!(after <= before + 1e-9, "ub({var}) increased");
        }
    }
}

#[test]
fn test_almost_broken_elimination() {
    let mut config = relux_core::Config::default();
    config.eliminate_almost_broken_relus = true;

    let mut solver = Reluplex::with_config(4, config);
    solver.initialize_cell(3, 0, 1.0);
    solver.initialize_cell(3, 1, -1.0);
    solver.initialize_cell(3, 3, -1.0);
    solver.mark_basic(3);

    solver.set_lower_bound(0, -1.0);
    solver.set_upper_bound(0, 1.0);
    solver.set_lower_bound(1, -9.0);
    solver.set_upper_bound(1, 9.0);
    solver.set_lower_bound(2, 0.0);
    solver.set_upper_bound(2, 9.0);
    solver.set_lower_bound(3, 0.0);
    solver.set_upper_bound(3, 0.0);
    solver.set_relu_pair(1, 2);

    solver.initialize().unwrap();

    // An upper bound inside the almost-broken margin snaps to zero and
    // dissolves the pair.
    solver.update_upper_bound(2, 5e-4, 0).unwrap();
    assert_eq!(solver.dissolution_of(2), Some(DissolutionKind::Split));
    assert_eq!(solver.upper_bound(2), Some(0.0));
    assert_eq!(solver.stats().almost_broken_relus_fixed, 1);
}

#[test]
fn test_quit_flag_reports_not_done() {
    let mut solver = satisfiable_example();
    solver.initialize().unwrap();
    solver.quit();
    assert_eq!(solver.solve(), SolveStatus::NotDone);
}
