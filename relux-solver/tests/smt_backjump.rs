//! Decision-stack behavior: split/merge ordering, snapshot round trips,
//! and nonchronological backjumping.

use relux_core::SolverError;
use relux_solver::{DissolutionKind, Reluplex, SolveStatus};

/// `pair_count` independent pairs; pair k is `(3k, 3k+1)` with a basic
/// row variable `3k+2` defining `aux_k = b_k`, `aux_k` in `[-1, 1]`.
fn chain_solver(pair_count: usize) -> Reluplex {
    let mut solver = Reluplex::new(3 * pair_count);

    for k in 0..pair_count {
        let b = 3 * k;
        let f = 3 * k + 1;
        let aux = 3 * k + 2;

        solver.initialize_cell(aux, b, 1.0);
        solver.initialize_cell(aux, aux, -1.0);
        solver.mark_basic(aux);

        solver.set_lower_bound(b, -1.0);
        solver.set_upper_bound(b, 1.0);
        solver.set_lower_bound(f, 0.0);
        solver.set_upper_bound(f, 1.0);
        solver.set_lower_bound(aux, -1.0);
        solver.set_upper_bound(aux, 1.0);

        solver.set_relu_pair(b, f);
    }

    solver.initialize().unwrap();
    solver
}

fn dissolve_by_notifications(solver: &mut Reluplex, f: usize) {
    for _ in 0..4 {
        assert!(!solver.notify_broken_relu(f).unwrap());
    }
    assert!(solver.notify_broken_relu(f).unwrap());
}

#[test]
fn test_split_threshold() {
    let mut solver = chain_solver(1);

    // Four notifications repair; the fifth case-splits.
    dissolve_by_notifications(&mut solver, 1);
    assert_eq!(solver.current_depth(), 1);
    // A[f] was zero, so the first branch is the split.
    assert_eq!(solver.dissolution_of(1), Some(DissolutionKind::Split));
    assert_eq!(solver.upper_bound(0), Some(0.0));
}

#[test]
fn test_pop_flips_then_discards() {
    let mut solver = chain_solver(1);

    let lower_before: Vec<_> = (0..3).map(|v| solver.lower_bound(v)).collect();
    let upper_before: Vec<_> = (0..3).map(|v| solver.upper_bound(v)).collect();
    let assignment_before: Vec<_> = (0..3).map(|v| solver.get_assignment(v)).collect();
    let basics_before: Vec<_> = (0..3).map(|v| solver.is_basic(v)).collect();
    let tableau_before = solver.tableau_snapshot();

    dissolve_by_notifications(&mut solver, 1);
    assert_eq!(solver.dissolution_of(1), Some(DissolutionKind::Split));

    // First pop flips to the untried merge at the same depth.
    solver.pop().unwrap();
    assert_eq!(solver.current_depth(), 1);
    assert_eq!(solver.dissolution_of(1), Some(DissolutionKind::Merge));

    // Second pop exhausts the stack and leaves the pre-split state.
    assert_eq!(solver.pop(), Err(SolverError::StackEmpty));
    assert_eq!(solver.current_depth(), 0);
    assert_eq!(solver.dissolution_of(1), None);

    for v in 0..3 {
        assert_eq!(solver.lower_bound(v), lower_before[v]);
        assert_eq!(solver.upper_bound(v), upper_before[v]);
        assert_eq!(solver.get_assignment(v), assignment_before[v]);
        assert_eq!(solver.is_basic(v), basics_before[v]);
    }
    assert_eq!(solver.tableau_snapshot(), tableau_before);
}

#[test]
fn test_backjump_skips_intermediate_levels() {
    let mut solver = chain_solver(3);

    dissolve_by_notifications(&mut solver, 1);
    dissolve_by_notifications(&mut solver, 4);
    dissolve_by_notifications(&mut solver, 7);
    assert_eq!(solver.current_depth(), 3);
    assert_eq!(solver.stats().stack_visited_states, 3);

    // A conflict entailed by a level-1 fact: ub(aux_0) below its level-0
    // lower bound, asserted at level 1.
    let err = solver.update_upper_bound(2, -2.0, 1).unwrap_err();
    assert_eq!(err, SolverError::InvariantViolation { level: 1 });

    solver.pop_to_level(1).unwrap();

    // The stack popped straight down to level 1, flipping each snapshot on
    // the way; only the first pair remains committed (to its alternative).
    assert_eq!(solver.current_depth(), 1);
    assert_eq!(solver.dissolution_of(1), Some(DissolutionKind::Merge));
    assert_eq!(solver.dissolution_of(4), None);
    assert_eq!(solver.dissolution_of(7), None);

    // Far fewer states than exhaustive enumeration of three pairs.
    assert!(solver.stats().stack_visited_states < 8);
    assert_eq!(solver.stats().conflict_pops, 2);

    solver.check_invariants().unwrap();
}

#[test]
fn test_level_zero_conflict_is_unsat() {
    let mut solver = chain_solver(1);
    assert_eq!(
        solver.pop_to_level(0),
        Err(SolverError::StackEmpty),
        "level-0 conflicts exhaust the search"
    );
}

#[test]
fn test_merge_first_when_f_positive() {
    let mut solver = chain_solver(1);

    // Put the pair into its active phase before the split triggers.
    solver.update(1, 0.5, true);
    solver.update(0, 0.5, true);

    dissolve_by_notifications(&mut solver, 1);
    assert_eq!(solver.dissolution_of(1), Some(DissolutionKind::Merge));
    assert_eq!(solver.lower_bound(1), Some(0.0));
    assert_eq!(solver.solve(), SolveStatus::Sat);
}
