use crate::{FitError, FitResult};
use nalgebra::{DMatrix, DVector};

pub fn sum(v: &[f64]) -> f64 {
    let mut o = 0.;
    for e in v.iter() {
        o += *e;
    }
    o
}

pub fn mean(v: &[f64]) -> f64 {
    sum(&v) / (v.len() as f64)
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(&a, &b)| a * b).sum()
}

pub fn sigmoid(latent: f64) -> f64 {
    1. / (1. + (-latent).exp())
}

pub fn rmse(target: &[f64], yhat: &[f64]) -> f64 {
    let rmse: f64 = yhat
        .iter()
        .zip(target.iter())
        .map(|(&a, &b)| (a - b).powi(2))
        .sum();
    (rmse / target.len() as f64).sqrt()
}

/// Mean binary log loss of raw scores: the probabilities are `sigmoid(latent)`.
pub fn logloss(target: &[f64], latent: &[f64]) -> f64 {
    let mut total = 0.;
    for (&target, &latent) in target.iter().zip(latent) {
        let proba = sigmoid(latent);
        total -= target * proba.max(1e-15).ln() + (1. - target) * (1. - proba).max(1e-15).ln();
    }
    total / target.len() as f64
}

/// Solve `(hessian + lambda * I) x = rhs`, where `hessian` is a row-major `size x size` matrix.
pub fn solve_regularized(hessian: &[f64], lambda: f64, rhs: &[f64]) -> FitResult<Vec<f64>> {
    let size = rhs.len();
    if hessian.len() != size * size {
        return Err(FitError::ShapeMismatch(format!(
            "{} hessian values for a system of size {}",
            hessian.len(),
            size
        )));
    }
    let a = DMatrix::from_row_slice(size, size, hessian) + DMatrix::identity(size, size) * lambda;
    let x = a
        .lu()
        .solve(&DVector::from_column_slice(rhs))
        .ok_or(FitError::SingularSystem { size })?;
    if x.iter().any(|e| !e.is_finite()) {
        return Err(FitError::SingularSystem { size });
    }
    Ok(x.iter().copied().collect())
}
