use crate::{logloss, rmse, sigmoid};

/// Per-record first and second derivatives of a loss with respect to the prediction.
pub trait Loss: std::marker::Sync {
    fn calc_gradient_hessian(&self, target: &[f64], predictions: &[f64]) -> (Vec<f64>, Vec<f64>);
    fn calc_loss(&self, target: &[f64], predictions: &[f64]) -> f64;
}

/// Half squared error, ie the usual loss for a regression.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RegLoss {
    // Nothing inside
}

impl Loss for RegLoss {
    fn calc_gradient_hessian(&self, target: &[f64], predictions: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let hessian: Vec<f64> = target.iter().map(|_| 1.).collect();
        let grad = predictions
            .iter()
            .zip(target)
            .map(|(&prediction, &target)| prediction - target)
            .collect();
        (grad, hessian)
    }

    fn calc_loss(&self, target: &[f64], predictions: &[f64]) -> f64 {
        let mut loss = 0.;
        for (&target, &prediction) in target.iter().zip(predictions) {
            loss += (target - prediction).powi(2) / 2.;
        }
        loss
    }
}

/// Binary log loss, for two-class classification. Predictions are logits.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BinaryLogLoss {
    // Nothing inside
}

impl Loss for BinaryLogLoss {
    fn calc_gradient_hessian(&self, target: &[f64], predictions: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut hessian: Vec<f64> = Vec::with_capacity(target.len());
        let mut grad = Vec::with_capacity(target.len());
        for (&target, &latent) in target.iter().zip(predictions.iter()) {
            let proba = sigmoid(latent);
            grad.push(proba - target);
            hessian.push(proba * (1. - proba));
        }
        (grad, hessian)
    }

    fn calc_loss(&self, target: &[f64], predictions: &[f64]) -> f64 {
        // target Y = 0 or 1
        // proba p = 1 / (1 + exp(-x))
        // -Loss = Y * log(p) + (1-Y) * log(1-p)
        logloss(target, predictions) * target.len() as f64
    }
}

/// Poisson negative log-likelihood of a rate, predictions are the rates themselves.
///
/// The trees never fold these derivatives row by row: they use the rate and ratio statistics,
/// whose step is the Newton step of this loss when no psi is given.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PoissonLoss {
    // Nothing inside
}

impl Loss for PoissonLoss {
    fn calc_gradient_hessian(&self, target: &[f64], predictions: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut hessian: Vec<f64> = Vec::with_capacity(target.len());
        let mut grad = Vec::with_capacity(target.len());
        for (&target, &rate) in target.iter().zip(predictions.iter()) {
            grad.push(1. - target / rate);
            hessian.push(target / rate.powi(2));
        }
        (grad, hessian)
    }

    fn calc_loss(&self, target: &[f64], predictions: &[f64]) -> f64 {
        let mut loss = 0.;
        for (&target, &rate) in target.iter().zip(predictions) {
            loss += rate - target * rate.ln();
        }
        loss
    }
}

/// The loss families the trees can be fitted with.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    /// Regression on the raw prediction.
    SquaredError,
    /// Binary classification, the prediction is a logit.
    Logistic,
    /// Counts, the prediction is the rate. Uses the rate/psi statistics instead of the Newton ones.
    Poisson,
}

impl Default for LossKind {
    fn default() -> Self {
        LossKind::SquaredError
    }
}

impl LossKind {
    /// Per-record derivatives of the loss. The Newton statistics use them for squared error and
    /// logistic; for Poisson they are the reference the ratio statistics agree with.
    pub(crate) fn loss(&self) -> &'static dyn Loss {
        static REG: RegLoss = RegLoss {};
        static BINARY: BinaryLogLoss = BinaryLogLoss {};
        static POISSON: PoissonLoss = PoissonLoss {};
        match self {
            LossKind::SquaredError => &REG,
            LossKind::Logistic => &BINARY,
            LossKind::Poisson => &POISSON,
        }
    }

    /// Value reported on the learning curves: logloss for classification, RMSE otherwise.
    pub fn monitor_value(&self, target: &[f64], predictions: &[f64]) -> f64 {
        match self {
            LossKind::Logistic => logloss(target, predictions),
            LossKind::SquaredError | LossKind::Poisson => rmse(target, predictions),
        }
    }

    pub(crate) fn monitor_name(&self) -> &'static str {
        match self {
            LossKind::Logistic => "Logloss",
            LossKind::SquaredError | LossKind::Poisson => "RMSE",
        }
    }

    /// Map a raw prediction to the target space.
    pub fn transform(&self, latent: f64) -> f64 {
        match self {
            LossKind::Logistic => sigmoid(latent),
            LossKind::SquaredError | LossKind::Poisson => latent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    /// Clone the vector and increase a given index
    fn inc_vec(v: &[f64], i: usize, eps: f64) -> Vec<f64> {
        let mut v = v.to_vec();
        v[i] += eps;
        v
    }

    macro_rules! assert_close {
        ($a : expr, $b: expr, $delta: expr) => {{
            let (a, b, delta) = ($a, $b, $delta);
            assert!(
                (a - b).abs() <= delta,
                "Difference = {:.6} > {:.6} too important between {:.6} and {:.6}",
                a - b,
                delta,
                a,
                b
            );
        }};
    }

    /// Compare the derivatives with finite differences on the predictions
    fn check_derivatives(loss: &dyn Loss, target: &[f64], predictions: &[f64]) {
        let eps = 1e-4;
        let value = loss.calc_loss(target, predictions);
        let (grad, hessian) = loss.calc_gradient_hessian(target, predictions);
        for i in 0..target.len() {
            // f'(x) = (f(x+eps) - f(x-eps)) / (2*eps)
            let l_plus = loss.calc_loss(target, &inc_vec(predictions, i, eps));
            let l_minus = loss.calc_loss(target, &inc_vec(predictions, i, -eps));
            assert_close!(grad[i], (l_plus - l_minus) / (2. * eps), 1e-5);

            // f"(x) = (f(x+eps) - 2 f(x) + f(x-eps)) / (eps*eps)
            let hessian_emp = (l_plus + l_minus - 2. * value) / eps.powi(2);
            assert_close!(hessian[i], hessian_emp, 1e-3);
        }
    }

    #[test]
    fn test_reg_loss() {
        check_derivatives(&RegLoss::default(), &[0.1, 0.4, 1.3, 0.2], &[0.1, 0.4, 1.0, 0.0]);
    }

    #[test]
    fn test_binary_loss() {
        let target = vec![1., 1., 0., 1.];
        let predictions = vec![0.1, 0.4, 0.9, 0.3];
        let loss = BinaryLogLoss::default().calc_loss(&target, &predictions);
        assert_close!(loss, 2.9529210316741383, 1e-6);
        check_derivatives(&BinaryLogLoss::default(), &target, &predictions);
    }

    #[test]
    fn test_poisson_loss() {
        check_derivatives(&PoissonLoss::default(), &[3., 1., 10.], &[2.5, 1.5, 9.]);
    }

    #[test]
    fn test_loss_kind() {
        assert_eq!(LossKind::default(), LossKind::SquaredError);
        assert_eq!(LossKind::Logistic.transform(0.), 0.5);
        assert_eq!(LossKind::Poisson.transform(3.), 3.);
        assert_eq!(
            LossKind::SquaredError.monitor_value(&[1., 2.], &[1., 2.]),
            0.
        );
    }
}
