use nalgebra::{DMatrix, DVector};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegressorError {
    #[error("Input batch has {actual} features per row, the model expects {expected}")]
    InputWidth { expected: usize, actual: usize },
}

/// A trained model mapping a batch of descriptors (one row per site) to one output row
/// per site.
pub trait Regressor: fmt::Debug + Send + Sync {
    fn input_width(&self) -> usize;

    fn output_width(&self) -> usize;

    fn predict(&self, inputs: &DMatrix<f64>) -> Result<DMatrix<f64>, RegressorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLayer {
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default = "default_activation")]
    activation: Activation,
}

fn default_activation() -> Activation {
    Activation::Identity
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNetwork {
    layers: Vec<RawLayer>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkShapeError {
    #[error("Network has no layers")]
    Empty,
    #[error("Layer {layer} has no weight rows")]
    EmptyLayer { layer: usize },
    #[error("Layer {layer} row {row} has {actual} weights, expected {expected}")]
    RaggedWeights {
        layer: usize,
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Layer {layer} has {actual} biases for {expected} outputs")]
    BiasLength {
        layer: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Layer {layer} expects {actual} inputs but the previous layer produces {expected}")]
    Chaining {
        layer: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct DenseLayer {
    /// `outputs x inputs`
    weights: DMatrix<f64>,
    bias: DVector<f64>,
    activation: Activation,
}

/// Fully connected feed-forward network, `y = f(W x + b)` per layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseNetwork {
    layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn from_json(text: &str) -> Result<Self, NetworkJsonError> {
        let raw: RawNetwork = serde_json::from_str(text)?;
        Ok(Self::from_raw(raw)?)
    }

    fn from_raw(raw: RawNetwork) -> Result<Self, NetworkShapeError> {
        if raw.layers.is_empty() {
            return Err(NetworkShapeError::Empty);
        }
        let mut layers = Vec::with_capacity(raw.layers.len());
        let mut previous_outputs: Option<usize> = None;
        for (index, layer) in raw.layers.into_iter().enumerate() {
            let outputs = layer.weights.len();
            let inputs = layer
                .weights
                .first()
                .map(Vec::len)
                .ok_or(NetworkShapeError::EmptyLayer { layer: index })?;
            for (row, weights) in layer.weights.iter().enumerate() {
                if weights.len() != inputs {
                    return Err(NetworkShapeError::RaggedWeights {
                        layer: index,
                        row,
                        expected: inputs,
                        actual: weights.len(),
                    });
                }
            }
            if layer.bias.len() != outputs {
                return Err(NetworkShapeError::BiasLength {
                    layer: index,
                    expected: outputs,
                    actual: layer.bias.len(),
                });
            }
            if let Some(expected) = previous_outputs {
                if expected != inputs {
                    return Err(NetworkShapeError::Chaining {
                        layer: index,
                        expected,
                        actual: inputs,
                    });
                }
            }
            previous_outputs = Some(outputs);

            let flat: Vec<f64> = layer.weights.into_iter().flatten().collect();
            layers.push(DenseLayer {
                weights: DMatrix::from_row_slice(outputs, inputs, &flat),
                bias: DVector::from_vec(layer.bias),
                activation: layer.activation,
            });
        }
        Ok(Self { layers })
    }
}

#[derive(Debug, Error)]
pub enum NetworkJsonError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid network shape: {0}")]
    Shape(#[from] NetworkShapeError),
}

impl Regressor for DenseNetwork {
    fn input_width(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.weights.ncols())
    }

    fn output_width(&self) -> usize {
        self.layers.last().map_or(0, |layer| layer.weights.nrows())
    }

    fn predict(&self, inputs: &DMatrix<f64>) -> Result<DMatrix<f64>, RegressorError> {
        if inputs.ncols() != self.input_width() {
            return Err(RegressorError::InputWidth {
                expected: self.input_width(),
                actual: inputs.ncols(),
            });
        }
        let mut activations = inputs.clone();
        for layer in &self.layers {
            let mut next = &activations * layer.weights.transpose();
            for mut row in next.row_iter_mut() {
                for (value, bias) in row.iter_mut().zip(layer.bias.iter()) {
                    *value = layer.activation.apply(*value + bias);
                }
            }
            activations = next;
        }
        Ok(activations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LAYER: &str = r#"{
        "layers": [
            { "weights": [[1.0, -1.0], [0.5, 0.5]], "bias": [0.0, -1.0], "activation": "relu" },
            { "weights": [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], "bias": [0.0, 0.0, 1.0] }
        ]
    }"#;

    #[test]
    fn forward_pass_applies_weights_bias_and_activation() {
        let network = DenseNetwork::from_json(TWO_LAYER).unwrap();
        assert_eq!(network.input_width(), 2);
        assert_eq!(network.output_width(), 3);

        let inputs = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 3.0]);
        let outputs = network.predict(&inputs).unwrap();

        // row 0: hidden = relu([2, 1]) = [2, 1]; out = [2, 1, 4]
        // row 1: hidden = relu([-2, 1]) = [0, 1]; out = [0, 1, 2]
        assert_eq!(outputs.shape(), (2, 3));
        assert_eq!(outputs.row(0).iter().copied().collect::<Vec<_>>(), vec![2.0, 1.0, 4.0]);
        assert_eq!(outputs.row(1).iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn empty_batch_yields_empty_output() {
        let network = DenseNetwork::from_json(TWO_LAYER).unwrap();
        let outputs = network.predict(&DMatrix::zeros(0, 2)).unwrap();
        assert_eq!(outputs.shape(), (0, 3));
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let network = DenseNetwork::from_json(TWO_LAYER).unwrap();
        let err = network.predict(&DMatrix::zeros(1, 3)).unwrap_err();
        assert_eq!(err, RegressorError::InputWidth { expected: 2, actual: 3 });
    }

    #[test]
    fn mismatched_layers_are_rejected() {
        let json = r#"{ "layers": [
            { "weights": [[1.0, 1.0]], "bias": [0.0] },
            { "weights": [[1.0, 1.0]], "bias": [0.0] }
        ] }"#;
        let err = DenseNetwork::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            NetworkJsonError::Shape(NetworkShapeError::Chaining { layer: 1, expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn ragged_weights_and_bad_bias_are_rejected() {
        let ragged = r#"{ "layers": [ { "weights": [[1.0, 1.0], [1.0]], "bias": [0.0, 0.0] } ] }"#;
        assert!(matches!(
            DenseNetwork::from_json(ragged),
            Err(NetworkJsonError::Shape(NetworkShapeError::RaggedWeights { row: 1, .. }))
        ));
        let bias = r#"{ "layers": [ { "weights": [[1.0]], "bias": [0.0, 1.0] } ] }"#;
        assert!(matches!(
            DenseNetwork::from_json(bias),
            Err(NetworkJsonError::Shape(NetworkShapeError::BiasLength { .. }))
        ));
    }
}
