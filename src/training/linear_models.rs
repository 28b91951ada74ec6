//! Linear model implementations

use super::{check_labels, one_hot, softmax_rows, CancellationToken, Classifier};
use crate::error::{HybridError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Multinomial logistic regression with L2 penalty
///
/// Minimizes the mean cross-entropy plus `||W||² / (2·C·n)` by full-batch
/// gradient descent. The step size is the inverse of an upper bound on the
/// gradient's Lipschitz constant, so iterations never overshoot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Coefficients, one column per class
    pub coefficients: Option<Array2<f64>>,
    pub intercept: Option<Array1<f64>>,
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    /// Gradient-norm convergence tolerance
    pub tol: f64,
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            n_iter: 0,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Iterations run by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn logits(&self, x: &Array2<f64>, weights: &Array2<f64>, bias: &Array1<f64>) -> Array2<f64> {
        x.dot(weights) + bias
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, n_classes: usize) -> Result<()> {
        self.fit_cancellable(x, y, n_classes, &CancellationToken::new())
    }

    fn fit_cancellable(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_classes: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(HybridError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if !(self.c > 0.0) {
            return Err(HybridError::InvalidParameter {
                name: "C".to_string(),
                value: self.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        let labels = check_labels(y, n_classes)?;
        let y_onehot = one_hot(&labels, n_classes);

        let n = n_samples as f64;
        let penalty = 1.0 / (self.c * n);

        // softmax cross-entropy has Hessian bounded by 0.5 · [X 1]ᵀ[X 1] / n
        let frobenius_sq = x.mapv(|v| v * v).sum() / n + 1.0;
        let lr = 1.0 / (0.5 * frobenius_sq + penalty);

        let mut weights = Array2::<f64>::zeros((n_features, n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);

        self.n_iter = 0;
        for _iter in 0..self.max_iter {
            cancel.check()?;
            let proba = softmax_rows(&self.logits(x, &weights, &bias));
            let errors = &proba - &y_onehot;

            let dw = x.t().dot(&errors) / n + &weights * penalty;
            let db = errors.sum_axis(Axis(0)) / n;

            self.n_iter += 1;
            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - dw * lr;
            bias = bias - db * lr;
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(weights), Some(bias)) = (&self.coefficients, &self.intercept) else {
            return Err(HybridError::ModelNotFitted);
        };
        if x.ncols() != weights.nrows() {
            return Err(HybridError::ShapeError {
                expected: format!("{} features", weights.nrows()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(softmax_rows(&self.logits(x, weights, bias)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression_binary() {
        let x = array![[-2.0], [-1.5], [-1.0], [-0.5], [0.5], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new();
        model.fit(&x, &y, 2).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&array![[3.0]]).unwrap();
        assert!(proba[[0, 1]] > 0.8);
        assert!(model.n_iter() <= 1000);
    }

    #[test]
    fn test_logistic_regression_multiclass() {
        let x = array![
            [0.0, 0.0],
            [0.3, 0.1],
            [4.0, 0.0],
            [4.2, 0.3],
            [0.0, 4.0],
            [0.1, 4.3]
        ];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y, 3).unwrap();

        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_stronger_penalty_shrinks_coefficients() {
        let x = array![[-1.0], [-0.5], [0.5], [1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut loose = LogisticRegression::new().with_c(10.0);
        let mut tight = LogisticRegression::new().with_c(0.01);
        loose.fit(&x, &y, 2).unwrap();
        tight.fit(&x, &y, 2).unwrap();

        let norm = |m: &LogisticRegression| m.coefficients.as_ref().unwrap().mapv(f64::abs).sum();
        assert!(norm(&tight) < norm(&loose));
    }

    #[test]
    fn test_not_fitted() {
        let model = LogisticRegression::new();
        assert!(matches!(model.predict_proba(&array![[1.0]]), Err(HybridError::ModelNotFitted)));
    }
}
