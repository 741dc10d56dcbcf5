//! NNet format support.
//!
//! NNet is the plain-text format used by the ACAS-Xu collision-avoidance
//! benchmarks for fully connected ReLU networks: comment lines starting
//! with `//`, a header (layer count, input size, output size, max layer
//! size), layer sizes, a symmetric flag, input minimums and maximums,
//! normalization means and ranges (inputs plus one output entry), then for
//! each layer a row-major weight matrix followed by a bias vector. Hidden
//! layers are ReLU-activated; the output layer is linear.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ndarray::{Array1, Array2};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from loading or parsing a network.
#[derive(Debug, Error)]
pub enum NnetError {
    /// File could not be read.
    #[error("cannot read network file: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed content.
    #[error("malformed nnet: {0}")]
    Parse(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, NnetError>;

/// A fully connected ReLU network with its normalization metadata.
#[derive(Debug, Clone)]
pub struct Network {
    /// Number of weight layers (the input layer does not count).
    pub num_layers: usize,
    /// Input dimension.
    pub input_size: usize,
    /// Output dimension.
    pub output_size: usize,
    /// Sizes of all layers, input and output included.
    pub layer_sizes: Vec<usize>,
    /// Minimum raw input values (inputs are clamped here before
    /// normalization).
    pub input_minimums: Vec<f64>,
    /// Maximum raw input values.
    pub input_maximums: Vec<f64>,
    /// Per-input normalization means.
    pub input_means: Vec<f64>,
    /// Per-input normalization ranges.
    pub input_ranges: Vec<f64>,
    /// Output denormalization mean.
    pub output_mean: f64,
    /// Output denormalization range.
    pub output_range: f64,
    /// Weight matrices, `layer_sizes[i+1] x layer_sizes[i]`.
    pub weights: Vec<Array2<f64>>,
    /// Bias vectors, `layer_sizes[i+1]`.
    pub biases: Vec<Array1<f64>>,
}

impl Network {
    /// Weight from `source_neuron` in `source_layer` to `target_neuron` in
    /// the next layer.
    #[must_use]
    pub fn weight(&self, source_layer: usize, source_neuron: usize, target_neuron: usize) -> f64 {
        self.weights[source_layer][(target_neuron, source_neuron)]
    }

    /// Bias of `neuron` in `layer` (layer 1 is the first hidden layer).
    #[must_use]
    pub fn bias(&self, layer: usize, neuron: usize) -> f64 {
        self.biases[layer - 1][neuron]
    }

    /// Map a raw input value into normalized network coordinates, clamping
    /// to the recorded input box first.
    #[must_use]
    pub fn normalize_input(&self, index: usize, value: f64) -> f64 {
        let clamped = value.clamp(self.input_minimums[index], self.input_maximums[index]);
        (clamped - self.input_means[index]) / self.input_ranges[index]
    }

    /// Map a normalized input value back into raw coordinates.
    #[must_use]
    pub fn unnormalize_input(&self, index: usize, value: f64) -> f64 {
        value * self.input_ranges[index] + self.input_means[index]
    }

    /// Map a raw network output into normalized coordinates.
    #[must_use]
    pub fn normalize_output(&self, value: f64) -> f64 {
        value * self.output_range + self.output_mean
    }

    /// The input box in normalized coordinates.
    #[must_use]
    pub fn normalized_input_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let lower = self
            .input_minimums
            .iter()
            .enumerate()
            .map(|(i, &min)| (min - self.input_means[i]) / self.input_ranges[i])
            .collect();
        let upper = self
            .input_maximums
            .iter()
            .enumerate()
            .map(|(i, &max)| (max - self.input_means[i]) / self.input_ranges[i])
            .collect();
        (lower, upper)
    }

    /// Forward pass. With `normalize`, inputs are normalized (and clamped)
    /// first and outputs denormalized afterwards.
    #[must_use]
    pub fn evaluate(&self, input: &[f64], normalize: bool) -> Vec<f64> {
        let mut activations: Vec<f64> = if normalize {
            input
                .iter()
                .enumerate()
                .map(|(i, &value)| self.normalize_input(i, value))
                .collect()
        } else {
            input.to_vec()
        };

        for (layer, (weights, bias)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut next = vec![0.0; weights.nrows()];
            for (target, row) in weights.rows().into_iter().enumerate() {
                next[target] = row
                    .iter()
                    .zip(&activations)
                    .map(|(&w, &x)| w * x)
                    .sum::<f64>()
                    + bias[target];
            }

            // ReLU on hidden layers only.
            if layer + 1 < self.num_layers {
                for value in &mut next {
                    *value = value.max(0.0);
                }
            }

            activations = next;
        }

        if normalize {
            for value in &mut activations {
                *value = self.normalize_output(*value);
            }
        }

        activations
    }

    /// Total weight and bias count.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum::<usize>()
            + self.biases.iter().map(|b| b.len()).sum::<usize>()
    }
}

/// Load a network from an `.nnet` file.
pub fn load_network<P: AsRef<Path>>(path: P) -> Result<Network> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading nnet");
    let content = std::fs::read_to_string(path)?;
    parse_network(&content)
}

/// Parse NNet content.
pub fn parse_network(content: &str) -> Result<Network> {
    let mut lines = content
        .lines()
        .filter(|line| !line.starts_with("//") && !line.trim().is_empty());

    let header: Vec<usize> = parse_csv(next_line(&mut lines, "header")?)?;
    if header.len() < 4 {
        return Err(NnetError::Parse(format!(
            "header has {} fields, expected 4",
            header.len()
        )));
    }
    let (num_layers, input_size, output_size) = (header[0], header[1], header[2]);

    let layer_sizes: Vec<usize> = parse_csv(next_line(&mut lines, "layer sizes")?)?;
    if layer_sizes.len() != num_layers + 1 {
        return Err(NnetError::Parse(format!(
            "expected {} layer sizes, got {}",
            num_layers + 1,
            layer_sizes.len()
        )));
    }

    // Symmetric flag, unused.
    let _ = next_line(&mut lines, "symmetric flag")?;

    let input_minimums: Vec<f64> = parse_csv(next_line(&mut lines, "input minimums")?)?;
    let input_maximums: Vec<f64> = parse_csv(next_line(&mut lines, "input maximums")?)?;

    let means: Vec<f64> = parse_csv(next_line(&mut lines, "means")?)?;
    let (input_means, output_mean) = if means.len() > input_size {
        (means[..input_size].to_vec(), means[input_size])
    } else {
        (means.clone(), 0.0)
    };

    let ranges: Vec<f64> = parse_csv(next_line(&mut lines, "ranges")?)?;
    let (input_ranges, output_range) = if ranges.len() > input_size {
        (ranges[..input_size].to_vec(), ranges[input_size])
    } else {
        (ranges.clone(), 1.0)
    };

    let mut weights = Vec::with_capacity(num_layers);
    let mut biases = Vec::with_capacity(num_layers);

    for layer in 0..num_layers {
        let source_size = layer_sizes[layer];
        let target_size = layer_sizes[layer + 1];
        debug!(layer, source_size, target_size, "reading layer");

        let mut weight_data = Vec::with_capacity(target_size * source_size);
        for _ in 0..target_size {
            let row: Vec<f64> = parse_csv(next_line(&mut lines, "weight row")?)?;
            if row.len() < source_size {
                return Err(NnetError::Parse(format!(
                    "weight row has {} values, expected {}",
                    row.len(),
                    source_size
                )));
            }
            weight_data.extend_from_slice(&row[..source_size]);
        }
        let weight = Array2::from_shape_vec((target_size, source_size), weight_data)
            .map_err(|e| NnetError::Parse(format!("bad weight matrix shape: {e}")))?;
        weights.push(weight);

        let mut bias_data = Vec::with_capacity(target_size);
        for _ in 0..target_size {
            let line = next_line(&mut lines, "bias value")?;
            let value: f64 = line
                .trim()
                .trim_end_matches(',')
                .parse()
                .map_err(|e| NnetError::Parse(format!("bad bias value {line:?}: {e}")))?;
            bias_data.push(value);
        }
        biases.push(Array1::from_vec(bias_data));
    }

    let network = Network {
        num_layers,
        input_size,
        output_size,
        layer_sizes,
        input_minimums,
        input_maximums,
        input_means,
        input_ranges,
        output_mean,
        output_range,
        weights,
        biases,
    };

    info!(
        layers = network.num_layers,
        params = network.param_count(),
        "loaded nnet"
    );
    Ok(network)
}

fn next_line<'a>(lines: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str> {
    lines
        .next()
        .ok_or_else(|| NnetError::Parse(format!("missing {what}")))
}

fn parse_csv<T: std::str::FromStr>(line: &str) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    line.split(',')
        .filter(|field| !field.trim().is_empty())
        .map(|field| {
            field
                .trim()
                .parse()
                .map_err(|e| NnetError::Parse(format!("bad value {field:?}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY: &str = r"
// 1 layer, 2 inputs, 2 outputs, identity weights
1,2,2,2,
2,2,
0,
-10.0,-10.0,
10.0,10.0,
0.0,0.0,0.0,
1.0,1.0,1.0,
1.0,0.0,
0.0,1.0,
0.0,
0.0,
";

    const HIDDEN: &str = r"
// 2 layers with a ReLU hidden layer
2,2,1,3,
2,3,1,
0,
-10.0,-10.0,
10.0,10.0,
0.0,0.0,0.0,
1.0,1.0,1.0,
1.0,0.0,
0.0,1.0,
-1.0,1.0,
0.0,
0.0,
0.0,
1.0,1.0,1.0,
0.0,
";

    #[test]
    fn test_parse_header_and_shapes() {
        let network = parse_network(HIDDEN).unwrap();
        assert_eq!(network.num_layers, 2);
        assert_eq!(network.input_size, 2);
        assert_eq!(network.output_size, 1);
        assert_eq!(network.layer_sizes, vec![2, 3, 1]);
        assert_eq!(network.weights[0].shape(), &[3, 2]);
        assert_eq!(network.weights[1].shape(), &[1, 3]);
        assert_eq!(network.param_count(), 6 + 3 + 3 + 1);
    }

    #[test]
    fn test_identity_evaluation() {
        let network = parse_network(TINY).unwrap();
        let output = network.evaluate(&[1.0, 2.0], false);
        assert!((output[0] - 1.0).abs() < 1e-9);
        assert!((output[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_hidden_relu_clips_negative() {
        let network = parse_network(HIDDEN).unwrap();
        // Hidden: [relu(-1), relu(1), relu(-1 + 1)] = [0, 1, 0]; output 1.
        let output = network.evaluate(&[-1.0, 1.0], false);
        assert_eq!(output.len(), 1);
        assert!((output[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_and_bias_accessors() {
        let network = parse_network(HIDDEN).unwrap();
        assert_eq!(network.weight(0, 0, 2), -1.0);
        assert_eq!(network.weight(1, 1, 0), 1.0);
        assert_eq!(network.bias(1, 0), 0.0);
    }

    #[test]
    fn test_normalization_round_trip() {
        let content = r"
1,2,2,2,
2,2,
0,
0.0,0.0,
10.0,20.0,
5.0,10.0,0.0,
2.0,4.0,1.0,
1.0,0.0,
0.0,1.0,
0.0,
0.0,
";
        let network = parse_network(content).unwrap();

        let (lower, upper) = network.normalized_input_bounds();
        assert!((lower[0] - (-2.5)).abs() < 1e-9);
        assert!((upper[1] - 2.5).abs() < 1e-9);

        let normalized = network.normalize_input(0, 7.0);
        assert!((network.unnormalize_input(0, normalized) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_input_clamping() {
        let network = parse_network(TINY).unwrap();
        // 100 clamps to 10 before normalization.
        assert_eq!(network.normalize_input(0, 100.0), 10.0);
    }

    #[test]
    fn test_missing_pieces_error() {
        assert!(parse_network("").is_err());
        assert!(parse_network("1,2,2,2,\n2,2,\n").is_err());

        let truncated = r"
1,2,2,2,
2,2,
0,
-10.0,-10.0,
10.0,10.0,
0.0,0.0,0.0,
1.0,1.0,1.0,
1.0,0.0,
";
        let err = parse_network(truncated).unwrap_err();
        assert!(err.to_string().contains("weight row"));
    }

    #[test]
    fn test_bad_value_errors() {
        let garbage = TINY.replace("1.0,0.0,", "1.0,abc,");
        assert!(parse_network(&garbage).is_err());
    }

    #[test]
    fn test_wrong_layer_size_count() {
        let content = "2,3,2,4,\n3,4,\n";
        let err = parse_network(content).unwrap_err();
        assert!(err.to_string().contains("layer sizes"));
    }
}
