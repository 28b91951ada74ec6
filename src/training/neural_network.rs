//! Neural Network (Multi-Layer Perceptron) implementation
//!
//! A feedforward network with a softmax output, trained on the cross-entropy
//! loss by mini-batch Adam with L2 regularization.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::{check_labels, one_hot, softmax_rows, CancellationToken, Classifier};
use crate::error::{HybridError, Result};

/// Hidden layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Hyperbolic tangent
    Tanh,
    /// Logistic sigmoid
    Sigmoid,
}

/// Neural Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub max_epochs: usize,
    /// Upper bound on the mini-batch size
    pub batch_size: usize,
    /// L2 regularization
    pub alpha: f64,
    pub random_state: u64,
    /// Minimum loss improvement that resets the patience counter
    pub tol: f64,
    /// Epochs without improvement before stopping
    pub n_iter_no_change: usize,
    pub beta_1: f64,
    pub beta_2: f64,
    pub epsilon: f64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100, 50],
            activation: Activation::ReLU,
            learning_rate: 0.001,
            max_epochs: 1000,
            batch_size: 200,
            alpha: 0.0001,
            random_state: 42,
            tol: 1e-4,
            n_iter_no_change: 10,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// First and second moment estimates for one parameter tensor
#[derive(Debug, Clone)]
struct AdamState<D: ndarray::Dimension> {
    m: ndarray::Array<f64, D>,
    v: ndarray::Array<f64, D>,
}

impl<D: ndarray::Dimension> AdamState<D> {
    fn new(shape: D) -> Self {
        Self {
            m: ndarray::Array::zeros(shape.clone()),
            v: ndarray::Array::zeros(shape),
        }
    }

    /// Update moments with `grad` and return the parameter step
    fn step(&mut self, grad: &ndarray::Array<f64, D>, lr_t: f64, config: &MLPConfig) -> ndarray::Array<f64, D> {
        self.m = &self.m * config.beta_1 + grad * (1.0 - config.beta_1);
        self.v = &self.v * config.beta_2 + &grad.mapv(|g| g * g) * (1.0 - config.beta_2);
        let eps = config.epsilon;
        ndarray::Zip::from(&self.m)
            .and(&self.v)
            .map_collect(|&m, &v| -lr_t * m / (v.sqrt() + eps))
    }
}

/// Multi-Layer Perceptron Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    config: MLPConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    n_features: usize,
    n_classes: usize,
    n_epochs: usize,
    loss_curve: Vec<f64>,
}

impl MLPClassifier {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            n_features: 0,
            n_classes: 0,
            n_epochs: 0,
            loss_curve: Vec::new(),
        }
    }

    /// Epochs run by the last fit
    pub fn n_epochs(&self) -> usize {
        self.n_epochs
    }

    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    /// Glorot-uniform initialization of weights and biases
    fn initialize_weights(&mut self, rng: &mut Xoshiro256PlusPlus) {
        self.weights.clear();
        self.biases.clear();

        let mut layer_sizes = vec![self.n_features];
        layer_sizes.extend(&self.config.hidden_layers);
        layer_sizes.push(self.n_classes);

        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let bound = (6.0 / (n_in + n_out) as f64).sqrt();
            let w = Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-bound..bound));
            let b = Array1::from_shape_fn(n_out, |_| rng.gen_range(-bound..bound));
            self.weights.push(w);
            self.biases.push(b);
        }
    }

    /// Activations of every layer, input first, probabilities last
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        activations.push(x.clone());

        let last = self.weights.len() - 1;
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last {
                self.activate(z)
            } else {
                softmax_rows(&z)
            };
            activations.push(a);
        }
        activations
    }

    /// Gradients of the regularized cross-entropy for one batch
    fn backward(&self, y_onehot: &Array2<f64>, activations: &[Array2<f64>]) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = y_onehot.nrows() as f64;
        let mut gradients = Vec::with_capacity(self.weights.len());

        // cross-entropy gradient through softmax
        let mut delta = &activations[activations.len() - 1] - y_onehot;

        for i in (0..self.weights.len()).rev() {
            let grad_w = (activations[i].t().dot(&delta) + &self.weights[i] * self.config.alpha) / n;
            let grad_b = delta.sum_axis(Axis(0)) / n;
            gradients.push((grad_w, grad_b));

            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.activate_derivative(&activations[i]);
            }
        }

        gradients.reverse();
        gradients
    }

    fn batch_loss(&self, y_onehot: &Array2<f64>, proba: &Array2<f64>) -> f64 {
        let n = y_onehot.nrows() as f64;
        let log_loss: f64 = y_onehot
            .iter()
            .zip(proba.iter())
            .filter(|(y, _)| **y > 0.0)
            .map(|(_, p)| -p.clamp(1e-10, 1.0).ln())
            .sum::<f64>()
            / n;
        let l2: f64 = self.weights.iter().map(|w| w.mapv(|v| v * v).sum()).sum();
        log_loss + 0.5 * self.config.alpha * l2 / n
    }

    fn activate(&self, z: Array2<f64>) -> Array2<f64> {
        match self.config.activation {
            Activation::ReLU => z.mapv_into(|v| v.max(0.0)),
            Activation::Tanh => z.mapv_into(f64::tanh),
            Activation::Sigmoid => z.mapv_into(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative expressed through the activation output
    fn activate_derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self.config.activation {
            Activation::ReLU => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Sigmoid => a.mapv(|v| v * (1.0 - v)),
        }
    }
}

impl Classifier for MLPClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        self.fit_cancellable(x, y, n_classes, &CancellationToken::new())
    }

    /// The token is checked before every epoch
    fn fit_cancellable(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_classes: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(HybridError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        let labels = check_labels(y, n_classes)?;

        self.n_features = x.ncols();
        self.n_classes = n_classes;
        self.loss_curve.clear();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.initialize_weights(&mut rng);

        let y_onehot = one_hot(&labels, n_classes);
        let batch_size = self.config.batch_size.clamp(1, n_samples);

        let mut adam_w: Vec<AdamState<ndarray::Ix2>> =
            self.weights.iter().map(|w| AdamState::new(w.raw_dim())).collect();
        let mut adam_b: Vec<AdamState<ndarray::Ix1>> =
            self.biases.iter().map(|b| AdamState::new(b.raw_dim())).collect();

        let mut t = 0i32;
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut indices: Vec<usize> = (0..n_samples).collect();

        for epoch in 0..self.config.max_epochs {
            if cancel.is_cancelled() {
                self.weights.clear();
                self.biases.clear();
                return Err(HybridError::Cancelled);
            }
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch_indices in indices.chunks(batch_size) {
                let x_batch = x.select(Axis(0), batch_indices);
                let y_batch = y_onehot.select(Axis(0), batch_indices);

                let activations = self.forward(&x_batch);
                epoch_loss += self.batch_loss(&y_batch, &activations[activations.len() - 1])
                    * batch_indices.len() as f64;
                let gradients = self.backward(&y_batch, &activations);

                t += 1;
                let lr_t = self.config.learning_rate * (1.0 - self.config.beta_2.powi(t)).sqrt()
                    / (1.0 - self.config.beta_1.powi(t));

                for (i, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
                    let step_w = adam_w[i].step(&grad_w, lr_t, &self.config);
                    let step_b = adam_b[i].step(&grad_b, lr_t, &self.config);
                    self.weights[i] += &step_w;
                    self.biases[i] += &step_b;
                }
            }

            let loss = epoch_loss / n_samples as f64;
            self.loss_curve.push(loss);
            self.n_epochs = epoch + 1;

            if !loss.is_finite() {
                return Err(HybridError::Training("neural network loss diverged".to_string()));
            }
            if loss > best_loss - self.config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if loss < best_loss {
                best_loss = loss;
            }
            if no_improvement > self.config.n_iter_no_change {
                break;
            }
        }

        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(HybridError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(HybridError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        let mut activations = self.forward(x);
        activations.pop().ok_or(HybridError::ModelNotFitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((90, 2), |(i, j)| {
            let class = (i / 30) as f64;
            let jitter = ((i * 13 + j * 7) % 11) as f64 / 11.0 - 0.5;
            if j == 0 {
                class * 3.0 + jitter
            } else {
                -class * 2.0 + jitter
            }
        });
        let y = Array1::from_shape_fn(90, |i| (i / 30) as f64);
        (x, y)
    }

    #[test]
    fn test_mlp_classifier() {
        let (x, y) = create_classification_data();
        let mut mlp = MLPClassifier::new(MLPConfig {
            hidden_layers: vec![16],
            max_epochs: 300,
            learning_rate: 0.01,
            ..Default::default()
        });
        mlp.fit(&x, &y, 3).unwrap();

        let proba = mlp.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (90, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }

        let accuracy = super::super::metrics::accuracy(&y, &mlp.predict(&x).unwrap());
        assert!(accuracy > 0.9, "accuracy {}", accuracy);
    }

    #[test]
    fn test_loss_decreases() {
        let (x, y) = create_classification_data();
        let mut mlp = MLPClassifier::new(MLPConfig {
            hidden_layers: vec![8],
            max_epochs: 50,
            ..Default::default()
        });
        mlp.fit(&x, &y, 3).unwrap();
        let curve = mlp.loss_curve();
        assert!(curve.len() <= 50);
        assert!(curve[curve.len() - 1] < curve[0]);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = create_classification_data();
        let config = MLPConfig {
            hidden_layers: vec![4],
            max_epochs: 5,
            ..Default::default()
        };
        let mut a = MLPClassifier::new(config.clone());
        let mut b = MLPClassifier::new(config);
        a.fit(&x, &y, 3).unwrap();
        b.fit(&x, &y, 3).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_cancelled_before_first_epoch() {
        let (x, y) = create_classification_data();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut mlp = MLPClassifier::new(MLPConfig::default());
        assert!(matches!(mlp.fit_cancellable(&x, &y, 3, &cancel), Err(HybridError::Cancelled)));
        assert!(mlp.loss_curve().is_empty());
        assert!(matches!(mlp.predict_proba(&x), Err(HybridError::ModelNotFitted)));
    }

    #[test]
    fn test_not_fitted() {
        let mlp = MLPClassifier::new(MLPConfig::default());
        assert!(matches!(mlp.predict_proba(&Array2::zeros((1, 2))), Err(HybridError::ModelNotFitted)));
    }
}
