//! Encode a verification query as a solver tableau.
//!
//! Variable layout groups ids by layer: the f instances of layer i, then
//! the b instances of layer i+1, then one auxiliary row variable per
//! neuron of layer i+1, repeating up to the output layer. After those come
//! one comparison variable per non-target output and a single constant
//! variable fixed at 1.0 that carries the biases.
//!
//! Each auxiliary variable is marked basic with bounds `[0, 0]` and its
//! row binds the incoming f's, the bias, and the target b:
//! `aux = Σ w·f_prev + bias·const − b`. Hidden neurons register `(b, f)`
//! as a ReLU pair with `lb(f) = 0`. The property rows assert
//! `target − other ≤ 0` for every other output, so a SAT witness is an
//! input on which the target output is minimal.

use relux_core::Var;
use relux_nnet::Network;
use relux_solver::Reluplex;
use rustc_hash::FxHashMap;
use tracing::debug;

/// A node position in the layered variable layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Node {
    layer: usize,
    neuron: usize,
    forward: bool,
}

/// The query to encode alongside the network.
#[derive(Debug, Clone)]
pub struct Query {
    /// Per-input raw lower bounds; `None` keeps the network's recorded
    /// minimum.
    pub input_lower: Vec<Option<f64>>,
    /// Per-input raw upper bounds; `None` keeps the network's recorded
    /// maximum.
    pub input_upper: Vec<Option<f64>>,
    /// The output that must be minimal for the query to be satisfiable.
    pub target_output: usize,
}

impl Query {
    /// A query over the network's full recorded input box.
    #[must_use]
    pub fn full_box(network: &Network, target_output: usize) -> Self {
        Self {
            input_lower: vec![None; network.input_size],
            input_upper: vec![None; network.input_size],
            target_output,
        }
    }
}

/// A built encoding: the solver plus the variable ids of interest.
pub struct Encoding {
    /// The configured solver, ready for `initialize`/`solve`.
    pub solver: Reluplex,
    /// Input variables (f instances of layer 0), in neuron order.
    pub input_vars: Vec<Var>,
    /// Output variables (b instances of the output layer), in neuron
    /// order.
    pub output_vars: Vec<Var>,
}

/// Encode `network` with `query` into a fresh solver.
#[must_use]
pub fn encode(network: &Network, query: &Query) -> Encoding {
    let layers_in_use = network.num_layers + 1;
    let output_size = network.output_size;
    let input_size = network.input_size;

    let relu_nodes: usize = (1..layers_in_use - 1)
        .map(|layer| network.layer_sizes[layer])
        .sum();

    // Inputs once; each hidden neuron has b, f, and an aux row variable;
    // each output has an instance and an aux row variable; one comparison
    // variable per non-target output; one constant.
    let num_variables =
        input_size + 3 * relu_nodes + 2 * output_size + (output_size - 1) + 1;

    debug!(
        layers = layers_in_use,
        inputs = input_size,
        relu_nodes,
        outputs = output_size,
        num_variables,
        "encoding query"
    );

    let mut solver = Reluplex::new(num_variables);

    let mut node_to_var: FxHashMap<Node, Var> = FxHashMap::default();
    let mut node_to_aux: FxHashMap<Node, Var> = FxHashMap::default();
    let mut next_index = 0;
    let mut alloc = || {
        let index = next_index;
        next_index += 1;
        index
    };

    for layer in 1..layers_in_use {
        let current_size = network.layer_sizes[layer];
        let previous_size = network.layer_sizes[layer - 1];

        for neuron in 0..previous_size {
            node_to_var.insert(
                Node {
                    layer: layer - 1,
                    neuron,
                    forward: true,
                },
                alloc(),
            );
        }
        for neuron in 0..current_size {
            node_to_var.insert(
                Node {
                    layer,
                    neuron,
                    forward: false,
                },
                alloc(),
            );
        }
        for neuron in 0..current_size {
            node_to_aux.insert(
                Node {
                    layer,
                    neuron,
                    forward: false,
                },
                alloc(),
            );
        }
    }

    // Comparison variables between the target output and the others.
    let mut output_to_comparison: FxHashMap<usize, Var> = FxHashMap::default();
    for output in 0..output_size {
        if output != query.target_output {
            output_to_comparison.insert(output, alloc());
        }
    }

    let constant_var = alloc();
    solver.set_lower_bound(constant_var, 1.0);
    solver.set_upper_bound(constant_var, 1.0);
    solver.set_name(constant_var, "one");

    // Input box, normalized; query bounds narrow the recorded box.
    let mut input_vars = Vec::with_capacity(input_size);
    for input in 0..input_size {
        let var = node_to_var[&Node {
            layer: 0,
            neuron: input,
            forward: true,
        }];
        input_vars.push(var);
        solver.set_name(var, format!("in{input}"));

        let raw_lower = query.input_lower[input].unwrap_or(network.input_minimums[input]);
        let raw_upper = query.input_upper[input].unwrap_or(network.input_maximums[input]);
        solver.set_lower_bound(var, network.normalize_input(input, raw_lower));
        solver.set_upper_bound(var, network.normalize_input(input, raw_upper));
    }

    // ReLU pairs for the hidden layers, with the f instances bounded below
    // by zero.
    for layer in 1..layers_in_use - 1 {
        for neuron in 0..network.layer_sizes[layer] {
            let b = node_to_var[&Node {
                layer,
                neuron,
                forward: false,
            }];
            let f = node_to_var[&Node {
                layer,
                neuron,
                forward: true,
            }];
            solver.set_relu_pair(b, f);
            solver.set_lower_bound(f, 0.0);
            solver.set_name(b, format!("b{layer}_{neuron}"));
            solver.set_name(f, format!("f{layer}_{neuron}"));
        }
    }

    // Auxiliary row variables are basic and fixed at zero.
    for (&node, &aux) in &node_to_aux {
        solver.mark_basic(aux);
        solver.set_lower_bound(aux, 0.0);
        solver.set_upper_bound(aux, 0.0);
        solver.set_name(aux, format!("aux{}_{}", node.layer, node.neuron));
    }

    // Comparison variables are basic with a zero upper bound.
    for &comparison in output_to_comparison.values() {
        solver.mark_basic(comparison);
        solver.set_upper_bound(comparison, 0.0);
    }

    // Weight rows: aux = Σ w·f_prev + bias·const − b.
    for layer in 0..layers_in_use - 1 {
        let target_size = network.layer_sizes[layer + 1];

        for target in 0..target_size {
            let aux = node_to_aux[&Node {
                layer: layer + 1,
                neuron: target,
                forward: false,
            }];
            let b = node_to_var[&Node {
                layer: layer + 1,
                neuron: target,
                forward: false,
            }];

            solver.initialize_cell(aux, aux, -1.0);
            solver.initialize_cell(aux, b, -1.0);

            for source in 0..network.layer_sizes[layer] {
                let f = node_to_var[&Node {
                    layer,
                    neuron: source,
                    forward: true,
                }];
                solver.initialize_cell(aux, f, network.weight(layer, source, target));
            }

            solver.initialize_cell(aux, constant_var, network.bias(layer + 1, target));
        }
    }

    // Property rows: comparison = target − other, with ub 0.
    let target_var = node_to_var[&Node {
        layer: layers_in_use - 1,
        neuron: query.target_output,
        forward: false,
    }];
    for (&output, &comparison) in &output_to_comparison {
        let other = node_to_var[&Node {
            layer: layers_in_use - 1,
            neuron: output,
            forward: false,
        }];

        solver.initialize_cell(comparison, comparison, -1.0);
        solver.initialize_cell(comparison, target_var, 1.0);
        solver.initialize_cell(comparison, other, -1.0);
        solver.set_name(comparison, format!("cmp{output}"));
    }

    let output_vars = (0..output_size)
        .map(|neuron| {
            let var = node_to_var[&Node {
                layer: layers_in_use - 1,
                neuron,
                forward: false,
            }];
            solver.set_name(var, format!("out{neuron}"));
            var
        })
        .collect();

    Encoding {
        solver,
        input_vars,
        output_vars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relux_nnet::parse_network;

    const HIDDEN: &str = r"
// 2 layers: 2 inputs -> 3 hidden relu -> 2 outputs
2,2,2,3,
2,3,2,
0,
-1.0,-1.0,
1.0,1.0,
0.0,0.0,0.0,
1.0,1.0,1.0,
1.0,0.0,
0.0,1.0,
1.0,1.0,
0.0,
0.0,
0.0,
1.0,0.0,0.0,
0.0,1.0,1.0,
0.0,
0.0,
";

    #[test]
    fn test_variable_count() {
        let network = parse_network(HIDDEN).unwrap();
        let encoding = encode(&network, &Query::full_box(&network, 0));

        // 2 inputs + 3*3 hidden + 2*2 outputs + 1 comparison + 1 constant.
        assert_eq!(encoding.solver.num_variables(), 2 + 9 + 4 + 1 + 1);
        assert_eq!(encoding.input_vars.len(), 2);
        assert_eq!(encoding.output_vars.len(), 2);
    }

    #[test]
    fn test_input_bounds_are_normalized_box() {
        let network = parse_network(HIDDEN).unwrap();
        let encoding = encode(&network, &Query::full_box(&network, 0));

        for (i, &var) in encoding.input_vars.iter().enumerate() {
            assert_eq!(
                encoding.solver.lower_bound(var),
                Some(network.normalize_input(i, network.input_minimums[i]))
            );
            assert_eq!(
                encoding.solver.upper_bound(var),
                Some(network.normalize_input(i, network.input_maximums[i]))
            );
        }
    }

    #[test]
    fn test_query_narrowing() {
        let network = parse_network(HIDDEN).unwrap();
        let mut query = Query::full_box(&network, 0);
        query.input_lower[0] = Some(0.25);
        query.input_upper[0] = Some(0.5);

        let encoding = encode(&network, &query);
        let var = encoding.input_vars[0];
        assert_eq!(encoding.solver.lower_bound(var), Some(0.25));
        assert_eq!(encoding.solver.upper_bound(var), Some(0.5));
    }
}
