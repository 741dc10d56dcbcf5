//! Network-to-verdict scenarios through the encoder.

use relux_cli::encode::{encode, Encoding, Query};
use relux_nnet::parse_network;
use relux_solver::SolveStatus;

/// 2 inputs -> 2 hidden ReLUs -> 2 outputs. The hidden layer copies the
/// inputs, the output layer copies the hidden layer, so
/// `out_i = max(0, x_i)`.
const PASS_THROUGH: &str = r"
2,2,2,2,
2,2,2,
0,
-1.0,-1.0,
1.0,1.0,
0.0,0.0,0.0,
1.0,1.0,1.0,
1.0,0.0,
0.0,1.0,
0.0,
0.0,
1.0,0.0,
0.0,1.0,
0.0,
0.0,
";

/// Same structure, but `out0 = max(0, x0) + 1` and `out1 = max(0, x0)`,
/// so `out0 <= out1` can never hold.
const OFFSET: &str = r"
2,2,2,2,
2,2,2,
0,
-1.0,-1.0,
1.0,1.0,
0.0,0.0,0.0,
1.0,1.0,1.0,
1.0,0.0,
0.0,1.0,
0.0,
0.0,
1.0,0.0,
1.0,0.0,
1.0,
0.0,
";

#[test]
fn test_pass_through_query_is_sat_with_valid_witness() {
    let network = parse_network(PASS_THROUGH).unwrap();
    let Encoding {
        mut solver,
        input_vars,
        output_vars,
    } = encode(&network, &Query::full_box(&network, 0));

    solver.initialize().unwrap();
    assert_eq!(solver.solve(), SolveStatus::Sat);
    solver.check_invariants().unwrap();

    // Re-evaluate the network on the witness inputs; the outputs must
    // agree with the solver's assignment, and the property must hold.
    let witness: Vec<f64> = input_vars
        .iter()
        .map(|&var| solver.get_assignment(var))
        .collect();
    let evaluated = network.evaluate(&witness, false);

    for (i, &var) in output_vars.iter().enumerate() {
        assert!(
            (evaluated[i] - solver.get_assignment(var)).abs() < 1e-3,
            "output {i}: network {} vs solver {}",
            evaluated[i],
            solver.get_assignment(var)
        );
    }

    assert!(
        evaluated[0] <= evaluated[1] + 1e-3,
        "witness must make output 0 minimal: {evaluated:?}"
    );
}

#[test]
fn test_offset_query_is_unsat() {
    let network = parse_network(OFFSET).unwrap();
    let mut encoding = encode(&network, &Query::full_box(&network, 0));

    // out0 - out1 = 1 everywhere, so out0 <= out1 is impossible.
    let _ = encoding.solver.initialize();
    assert_eq!(encoding.solver.solve(), SolveStatus::Unsat);
}

#[test]
fn test_narrowed_box_restricts_witness() {
    let network = parse_network(PASS_THROUGH).unwrap();

    let mut query = Query::full_box(&network, 1);
    query.input_lower[1] = Some(0.5);

    let mut encoding = encode(&network, &query);
    encoding.solver.initialize().unwrap();

    // out1 minimal needs max(0, x1) <= max(0, x0); with x1 >= 0.5 a
    // witness must push x0 at least as high.
    if encoding.solver.solve() == SolveStatus::Sat {
        let x0 = encoding.solver.get_assignment(encoding.input_vars[0]);
        let x1 = encoding.solver.get_assignment(encoding.input_vars[1]);
        assert!(x1 >= 0.5 - 1e-3);
        assert!(x0.max(0.0) >= x1.max(0.0) - 1e-3);
    }
}
