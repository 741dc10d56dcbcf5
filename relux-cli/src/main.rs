//! Relux CLI - verify a ReLU-network query end to end.
//!
//! Loads an `.nnet` network, encodes the "target output is minimal" query
//! over the (optionally narrowed) input box, and runs the solver. A SAT
//! witness is echoed together with an independent re-evaluation of the
//! network on it. SIGQUIT requests a cooperative stop; the final status
//! line can be appended to a CSV file for benchmark harnesses.

use clap::Parser;
use relux_cli::{encode, report};
use relux_solver::SolveStatus;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "relux", about = "ReLU-network verification with the relux solver")]
struct Args {
    /// Path to the network in NNet format.
    network: Option<PathBuf>,

    /// Append the final statistics line to this CSV file.
    output_csv: Option<PathBuf>,

    /// Output that must be minimal for the query to be satisfiable.
    #[arg(long, default_value_t = 0)]
    target_output: usize,

    /// Raw lower bounds for the first inputs, comma separated.
    #[arg(long, value_delimiter = ',')]
    input_lower: Vec<f64>,

    /// Raw upper bounds for the first inputs, comma separated.
    #[arg(long, value_delimiter = ',')]
    input_upper: Vec<f64>,

    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let Some(network_path) = args.network else {
        eprintln!("please specify a network");
        return ExitCode::from(1);
    };

    let network = match relux_nnet::load_network(&network_path) {
        Ok(network) => network,
        Err(error) => {
            error!(%error, "failed to load network");
            return ExitCode::from(2);
        }
    };

    if args.target_output >= network.output_size {
        error!(
            requested = args.target_output,
            outputs = network.output_size,
            "target output out of range"
        );
        return ExitCode::from(2);
    }

    let mut query = encode::Query::full_box(&network, args.target_output);
    for (i, &lower) in args.input_lower.iter().enumerate().take(network.input_size) {
        query.input_lower[i] = Some(lower);
    }
    for (i, &upper) in args.input_upper.iter().enumerate().take(network.input_size) {
        query.input_upper[i] = Some(upper);
    }

    let encode::Encoding {
        mut solver,
        input_vars,
        output_vars,
    } = encode::encode(&network, &query);
    solver.set_query_name(network_path.display().to_string());

    // SIGQUIT flips the solver's cancellation flag; the main loop notices
    // between iterations and reports TIMEOUT.
    if let Err(error) = signal_hook::flag::register(signal_hook::consts::SIGQUIT, solver.cancel_flag())
    {
        warn!(%error, "could not install SIGQUIT handler");
    }

    for (i, &var) in input_vars.iter().enumerate() {
        info!(
            input = i,
            lower = solver.lower_bound(var).unwrap_or(f64::NEG_INFINITY),
            upper = solver.upper_bound(var).unwrap_or(f64::INFINITY),
            "input range (normalized)"
        );
    }

    let start = Instant::now();

    if let Err(error) = solver.initialize() {
        // A level-0 bound conflict surfaces here; solve() reports it as
        // UNSAT. Anything else is reported when solve() maps it to ERROR.
        warn!(%error, "initialization reported a conflict");
    } else {
        for (i, &var) in output_vars.iter().enumerate() {
            info!(
                output = i,
                lower = solver.lower_bound(var).unwrap_or(f64::NEG_INFINITY),
                upper = solver.upper_bound(var).unwrap_or(f64::INFINITY),
                "output range after preprocessing"
            );
        }
    }

    let status = solver.solve();
    let total_millis = start.elapsed().as_millis() as u64;

    match status {
        SolveStatus::Sat => {
            info!("solution found");

            let witness: Vec<f64> = input_vars
                .iter()
                .map(|&var| solver.get_assignment(var))
                .collect();
            for (i, &value) in witness.iter().enumerate() {
                info!(
                    input = i,
                    normalized = value,
                    raw = network.unnormalize_input(i, value),
                    "witness input"
                );
            }

            // Cross-check: run the network on the witness and compare
            // against the solver's output assignment.
            let evaluated = network.evaluate(&witness, false);
            let mut total_error = 0.0;
            for (i, &var) in output_vars.iter().enumerate() {
                let solver_value = solver.get_assignment(var);
                info!(
                    output = i,
                    solver = solver_value,
                    network = evaluated[i],
                    "witness output"
                );
                total_error += (evaluated[i] - solver_value).abs();
            }
            info!(
                total_error,
                average = total_error / output_vars.len() as f64,
                "witness evaluation error"
            );
        }
        SolveStatus::Unsat => info!("no solution exists"),
        SolveStatus::Error => error!("solver error"),
        SolveStatus::NotDone => info!("not done (cancelled)"),
    }

    info!(
        millis = total_millis,
        states_explored = solver.states_explored(),
        stack_states = solver.stats().stack_visited_states,
        "run finished"
    );

    if let Some(csv) = args.output_csv {
        if let Err(error) = report::append_final_statistics(&csv, &solver, total_millis) {
            warn!(%error, "could not append final statistics");
        }
    }

    match status {
        SolveStatus::Error => ExitCode::from(2),
        _ => ExitCode::SUCCESS,
    }
}
