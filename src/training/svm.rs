//! Support Vector Machine classifier
//!
//! Binary machines are trained with SMO (Sequential Minimal Optimization);
//! more than two classes use one machine per class (one-vs-rest). Decision
//! values become probabilities through Platt sigmoid calibration.

use super::{check_labels, CancellationToken, Classifier};
use crate::error::{HybridError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// RBF width. `None` picks γ = 1 / (n_features · Var(X)) at fit time.
    pub gamma: Option<f64>,
    /// Tolerance for the KKT conditions
    pub tol: f64,
    /// Maximum number of full passes over the data
    pub max_iter: usize,
    pub random_state: u64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: None,
            tol: 1e-3,
            max_iter: 1000,
            random_state: 42,
        }
    }
}

/// RBF kernel K(x, y) = exp(-γ * ||x - y||²) with γ resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Kernel {
    gamma: f64,
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let norm_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
        (-self.gamma * norm_sq).exp()
    }
}

/// One trained binary machine with its sigmoid calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i per support vector
    dual_coef: Array1<f64>,
    bias: f64,
    platt_a: f64,
    platt_b: f64,
}

impl BinarySVM {
    fn decision(&self, kernel: &Kernel, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, coef)| coef * kernel.eval(sample, sv))
            .sum::<f64>()
            + self.bias
    }

    /// Calibrated probability of the positive side
    fn probability(&self, kernel: &Kernel, sample: ArrayView1<f64>) -> f64 {
        platt_probability(self.decision(kernel, sample), self.platt_a, self.platt_b)
    }
}

/// Support Vector Machine classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    kernel: Option<Kernel>,
    /// One machine for binary problems, one per class otherwise
    machines: Vec<BinarySVM>,
    n_classes: usize,
    n_features: usize,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            machines: Vec::new(),
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }

    fn resolve_kernel(&self, x: &Array2<f64>) -> Kernel {
        let gamma = self.config.gamma.unwrap_or_else(|| {
            let var = x.var(0.0);
            if var > 0.0 {
                1.0 / (x.ncols() as f64 * var)
            } else {
                1.0
            }
        });
        Kernel { gamma }
    }

    /// Train one machine separating `positive` rows from the rest
    fn train_machine(
        &self,
        x: &Array2<f64>,
        kernel_matrix: &Array2<f64>,
        positive: &[bool],
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<BinarySVM> {
        let y: Array1<f64> = positive.iter().map(|&p| if p { 1.0 } else { -1.0 }).collect();
        let (alphas, bias) = self.smo_train(kernel_matrix, &y, seed, cancel)?;

        let support_indices: Vec<usize> = alphas
            .iter()
            .enumerate()
            .filter(|(_, &a)| a > 1e-8)
            .map(|(i, _)| i)
            .collect();

        let support_vectors = x.select(ndarray::Axis(0), &support_indices);
        let dual_coef: Array1<f64> = support_indices.iter().map(|&i| alphas[i] * y[i]).collect();

        let decisions: Vec<f64> = (0..y.len())
            .map(|i| {
                support_indices
                    .iter()
                    .zip(dual_coef.iter())
                    .map(|(&s, coef)| coef * kernel_matrix[[s, i]])
                    .sum::<f64>()
                    + bias
            })
            .collect();
        let (platt_a, platt_b) = platt_scaling(&decisions, positive);

        Ok(BinarySVM {
            support_vectors,
            dual_coef,
            bias,
            platt_a,
            platt_b,
        })
    }

    /// SMO training algorithm, returns (alphas, bias)
    fn smo_train(
        &self,
        kernel_matrix: &Array2<f64>,
        y: &Array1<f64>,
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<(Array1<f64>, f64)> {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;

        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let mut passes = 0;
        let max_passes = 5;
        let mut total_iter = 0;

        while passes < max_passes && total_iter < self.config.max_iter && n > 1 {
            cancel.check()?;
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision_cached(kernel_matrix, &alphas, y, bias, i) - y[i];

                // KKT violation
                if (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0) {
                    let j = loop {
                        let j = rng.gen_range(0..n);
                        if j != i {
                            break j;
                        }
                    };

                    let e_j = decision_cached(kernel_matrix, &alphas, y, bias, j) - y[j];

                    let alpha_i_old = alphas[i];
                    let alpha_j_old = alphas[j];

                    let (l, h) = if y[i] != y[j] {
                        ((alphas[j] - alphas[i]).max(0.0), (c + alphas[j] - alphas[i]).min(c))
                    } else {
                        ((alphas[i] + alphas[j] - c).max(0.0), (alphas[i] + alphas[j]).min(c))
                    };
                    if (l - h).abs() < 1e-10 {
                        continue;
                    }

                    let eta = 2.0 * kernel_matrix[[i, j]] - kernel_matrix[[i, i]] - kernel_matrix[[j, j]];
                    if eta >= 0.0 {
                        continue;
                    }

                    alphas[j] = (alphas[j] - y[j] * (e_i - e_j) / eta).clamp(l, h);
                    if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                        continue;
                    }
                    alphas[i] += y[i] * y[j] * (alpha_j_old - alphas[j]);

                    let b1 = bias
                        - e_i
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, i]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[i, j]];
                    let b2 = bias
                        - e_j
                        - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, j]]
                        - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[j, j]];

                    bias = if alphas[i] > 0.0 && alphas[i] < c {
                        b1
                    } else if alphas[j] > 0.0 && alphas[j] < c {
                        b2
                    } else {
                        (b1 + b2) / 2.0
                    };

                    num_changed += 1;
                }
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        Ok((alphas, bias))
    }
}

/// Kernel matrix with rows computed in parallel
fn compute_kernel_matrix(kernel: &Kernel, x: &Array2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| (0..n).map(|j| kernel.eval(x.row(i), x.row(j))).collect())
        .collect();

    let mut k = Array2::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, val) in row.into_iter().enumerate() {
            k[[i, j]] = val;
        }
    }
    k
}

fn decision_cached(k: &Array2<f64>, alphas: &Array1<f64>, y: &Array1<f64>, bias: f64, idx: usize) -> f64 {
    let mut sum = 0.0;
    for i in 0..alphas.len() {
        if alphas[i] != 0.0 {
            sum += alphas[i] * y[i] * k[[i, idx]];
        }
    }
    sum + bias
}

fn platt_probability(decision: f64, a: f64, b: f64) -> f64 {
    let f_apb = decision * a + b;
    // numerically stable form of 1 / (1 + exp(fApB))
    if f_apb >= 0.0 {
        (-f_apb).exp() / (1.0 + (-f_apb).exp())
    } else {
        1.0 / (1.0 + f_apb.exp())
    }
}

/// Fit P(positive | f) = 1 / (1 + exp(A·f + B)) by Newton's method with
/// backtracking, on regularized targets.
fn platt_scaling(decisions: &[f64], positive: &[bool]) -> (f64, f64) {
    let prior1 = positive.iter().filter(|p| **p).count() as f64;
    let prior0 = positive.len() as f64 - prior1;

    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = positive
        .iter()
        .map(|&p| if p { hi_target } else { lo_target })
        .collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(&targets)
            .map(|(f, t)| {
                let f_apb = f * a + b;
                if f_apb >= 0.0 {
                    t * f_apb + (1.0 + (-f_apb).exp()).ln()
                } else {
                    (t - 1.0) * f_apb + (1.0 + f_apb.exp()).ln()
                }
            })
            .sum()
    };

    let min_step = 1e-10;
    let sigma = 1e-12;
    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21) = (sigma, sigma, 0.0);
        let (mut g1, mut g2) = (0.0, 0.0);

        for (f, t) in decisions.iter().zip(&targets) {
            let f_apb = f * a + b;
            let (p, q) = if f_apb >= 0.0 {
                let e = (-f_apb).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = f_apb.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }

        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let d_a = -(h22 * g1 - h21 * g2) / det;
        let d_b = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * d_a + g2 * d_b;

        let mut step = 1.0;
        while step >= min_step {
            let new_a = a + step * d_a;
            let new_b = b + step * d_b;
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < min_step {
            break;
        }
    }

    (a, b)
}

impl Classifier for SVMClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        self.fit_cancellable(x, y, n_classes, &CancellationToken::new())
    }

    /// The token is checked before every SMO pass
    fn fit_cancellable(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_classes: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(HybridError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(HybridError::Training(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        let labels = check_labels(y, n_classes)?;

        cancel.check()?;
        let kernel = self.resolve_kernel(x);
        let kernel_matrix = compute_kernel_matrix(&kernel, x);
        let seed = self.config.random_state;

        let machines = if n_classes == 2 {
            let positive: Vec<bool> = labels.iter().map(|&l| l == 1).collect();
            vec![self.train_machine(x, &kernel_matrix, &positive, seed, cancel)?]
        } else {
            (0..n_classes)
                .into_par_iter()
                .map(|k| {
                    let positive: Vec<bool> = labels.iter().map(|&l| l == k).collect();
                    self.train_machine(x, &kernel_matrix, &positive, seed.wrapping_add(k as u64), cancel)
                })
                .collect::<Result<_>>()?
        };

        self.kernel = Some(kernel);
        self.machines = machines;
        self.n_classes = n_classes;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = self.kernel.as_ref().ok_or(HybridError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(HybridError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            if self.n_classes == 2 {
                let p = self.machines[0].probability(kernel, row);
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            } else {
                let scores: Vec<f64> = self.machines.iter().map(|m| m.probability(kernel, row)).collect();
                let total: f64 = scores.iter().sum();
                for (k, s) in scores.iter().enumerate() {
                    proba[[i, k]] = if total > 0.0 {
                        s / total
                    } else {
                        1.0 / self.n_classes as f64
                    };
                }
            }
        }
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_linear_separable_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 1.0],
            [1.5, 1.2],
            [1.2, 1.8],
            [2.0, 1.5],
            [5.0, 5.0],
            [5.5, 5.2],
            [5.2, 5.8],
            [6.0, 5.5]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_svm_fixed_gamma() {
        let (x, y) = create_linear_separable_data();
        let mut svm = SVMClassifier::new(SVMConfig {
            gamma: Some(0.1),
            ..Default::default()
        });
        svm.fit(&x, &y, 2).unwrap();
        assert!(svm.n_support_vectors() > 0);
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_cancelled_svm_trains_no_machines() {
        let (x, y) = create_linear_separable_data();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        assert!(matches!(svm.fit_cancellable(&x, &y, 2, &cancel), Err(HybridError::Cancelled)));
        assert_eq!(svm.n_support_vectors(), 0);
        assert!(matches!(svm.predict_proba(&x), Err(HybridError::ModelNotFitted)));
    }

    #[test]
    fn test_svm_classifier_rbf() {
        let (x, y) = create_linear_separable_data();
        let mut svm = SVMClassifier::new(SVMConfig::default());
        svm.fit(&x, &y, 2).unwrap();

        let proba = svm.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_svm_classifier_multiclass() {
        let x = array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [5.0, 0.0],
            [5.2, 0.1],
            [5.1, 0.3],
            [0.0, 5.0],
            [0.2, 5.1],
            [0.1, 5.3]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut svm = SVMClassifier::new(SVMConfig::default());
        svm.fit(&x, &y, 3).unwrap();

        let proba = svm.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_platt_scaling_orders_probabilities() {
        let decisions = [-2.0, -1.5, -1.0, 1.0, 1.5, 2.0];
        let positive = [false, false, false, true, true, true];
        let (a, b) = platt_scaling(&decisions, &positive);
        assert!(a < 0.0);
        assert!(platt_probability(2.0, a, b) > 0.5);
        assert!(platt_probability(-2.0, a, b) < 0.5);
    }
}
