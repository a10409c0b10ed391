//! Running statistics folded by the split scanner.
//!
//! The scanner walks the rows of a node sorted by one interpolating feature. After every row it
//! calls `fold`, and at every change of value it calls `emit` to get the closed-form leaf weight
//! of the rows seen so far and the loss this weight achieves. The two loss families only differ
//! in what they accumulate:
//! * squared error and logistic: gradient vector and Hessian matrix, then a Newton step;
//! * Poisson: a rate for the first tree, then a Newton-like step where the integral of the
//!   bridge features over time (psi) plays the role of the exposure.

use crate::{dot, solve_regularized, FeatureMatrix, FitResult, LossKind};

/// Closed-form step for a group of rows, and the loss reached with it (lower is better).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundaryStat {
    pub(crate) loss: f64,
    pub(crate) weight: Vec<f64>,
}

/// Fold one more row, emit the statistic of all the rows folded so far.
pub(crate) trait LossStatistics {
    /// `row` is an index in the node's matrix.
    fn fold(&mut self, row: usize);
    /// Must only be called after at least one `fold`.
    fn emit(&self) -> FitResult<BoundaryStat>;
}

/// Everything a node needs to create fresh statistics, shared read-only by the column workers.
pub(crate) enum StatisticsSource<'a> {
    Newton {
        matrix: &'a FeatureMatrix,
        grad: Vec<f64>,
        hessian: Vec<f64>,
        lambda: f64,
    },
    Poisson {
        matrix: &'a FeatureMatrix,
        bias: Option<&'a [f64]>,
        lambda: f64,
    },
}

impl<'a> StatisticsSource<'a> {
    /// `bias` is the running prediction of the rows of `matrix`, `None` before the first tree.
    pub(crate) fn new(
        matrix: &'a FeatureMatrix,
        bias: Option<&'a [f64]>,
        loss: LossKind,
        lambda: f64,
    ) -> Self {
        match loss {
            LossKind::Poisson => StatisticsSource::Poisson {
                matrix,
                bias,
                lambda,
            },
            LossKind::SquaredError | LossKind::Logistic => {
                let (grad, hessian) = match bias {
                    Some(bias) => loss.loss().calc_gradient_hessian(&matrix.target, bias),
                    None => {
                        let zeros = vec![0.; matrix.n_rows()];
                        loss.loss().calc_gradient_hessian(&matrix.target, &zeros)
                    }
                };
                StatisticsSource::Newton {
                    matrix,
                    grad,
                    hessian,
                    lambda,
                }
            }
        }
    }

    /// Empty statistics, one instance per scan direction and per column.
    pub(crate) fn statistics(&self) -> Box<dyn LossStatistics + '_> {
        match self {
            StatisticsSource::Newton {
                matrix,
                grad,
                hessian,
                lambda,
            } => Box::new(NewtonStatistics::new(matrix, grad, hessian, *lambda)),
            StatisticsSource::Poisson {
                matrix,
                bias: None,
                lambda,
            } => {
                if matrix.n_extra() == 1 {
                    Box::new(RateStatistics::new(matrix))
                } else {
                    Box::new(RidgeStatistics::new(matrix, *lambda))
                }
            }
            StatisticsSource::Poisson {
                matrix,
                bias: Some(bias),
                lambda,
            } => Box::new(RatioStatistics::new(matrix, bias, *lambda)),
        }
    }

    /// Step and loss of the whole node, without any split.
    pub(crate) fn whole_node(&self) -> FitResult<BoundaryStat> {
        let n_rows = match self {
            StatisticsSource::Newton { matrix, .. } | StatisticsSource::Poisson { matrix, .. } => {
                matrix.n_rows()
            }
        };
        let mut statistics = self.statistics();
        for row in 0..n_rows {
            statistics.fold(row);
        }
        statistics.emit()
    }
}

/// Gradient and Hessian accumulation followed by a Newton step.
pub(crate) struct NewtonStatistics<'a> {
    matrix: &'a FeatureMatrix,
    grad: &'a [f64],
    hessian: &'a [f64],
    lambda: f64,
    sum_grad: Vec<f64>,
    /// Row-major `k x k`
    sum_hessian: Vec<f64>,
}

impl<'a> NewtonStatistics<'a> {
    fn new(matrix: &'a FeatureMatrix, grad: &'a [f64], hessian: &'a [f64], lambda: f64) -> Self {
        let k = matrix.n_extra();
        Self {
            matrix,
            grad,
            hessian,
            lambda,
            sum_grad: vec![0.; k],
            sum_hessian: vec![0.; k * k],
        }
    }
}

impl<'a> LossStatistics for NewtonStatistics<'a> {
    fn fold(&mut self, row: usize) {
        let k = self.sum_grad.len();
        let extra = &self.matrix.extra;
        let (grad, hessian) = (self.grad[row], self.hessian[row]);
        for a in 0..k {
            let ea = extra[(row, a)];
            self.sum_grad[a] += grad * ea;
            for b in 0..k {
                self.sum_hessian[a * k + b] += hessian * ea * extra[(row, b)];
            }
        }
    }

    fn emit(&self) -> FitResult<BoundaryStat> {
        // (H + lambda I) w = -g
        let minus_grad: Vec<f64> = self.sum_grad.iter().map(|e| -e).collect();
        let weight = solve_regularized(&self.sum_hessian, self.lambda, &minus_grad)?;
        let loss = dot(&weight, &self.sum_grad);
        Ok(BoundaryStat { loss, weight })
    }
}

/// First Poisson tree with a single bridge feature: the rate is the mean of the target.
pub(crate) struct RateStatistics<'a> {
    target: &'a [f64],
    count: f64,
    sum_target: f64,
}

impl<'a> RateStatistics<'a> {
    fn new(matrix: &'a FeatureMatrix) -> Self {
        Self {
            target: &matrix.target,
            count: 0.,
            sum_target: 0.,
        }
    }
}

impl<'a> LossStatistics for RateStatistics<'a> {
    fn fold(&mut self, row: usize) {
        self.count += 1.;
        self.sum_target += self.target[row];
    }

    fn emit(&self) -> FitResult<BoundaryStat> {
        let rate = self.sum_target / self.count;
        // Negative log-likelihood, without the constant log(y!) terms
        let loss = if self.sum_target > 0. {
            self.count * rate - rate.ln() * self.sum_target
        } else {
            self.count * rate
        };
        Ok(BoundaryStat {
            loss,
            weight: vec![rate],
        })
    }
}

/// First Poisson tree with several bridge features: ridge regression of the target on them.
pub(crate) struct RidgeStatistics<'a> {
    matrix: &'a FeatureMatrix,
    lambda: f64,
    /// Row-major `k x k`
    sum_outer: Vec<f64>,
    sum_target_extra: Vec<f64>,
}

impl<'a> RidgeStatistics<'a> {
    fn new(matrix: &'a FeatureMatrix, lambda: f64) -> Self {
        let k = matrix.n_extra();
        Self {
            matrix,
            lambda,
            sum_outer: vec![0.; k * k],
            sum_target_extra: vec![0.; k],
        }
    }
}

impl<'a> LossStatistics for RidgeStatistics<'a> {
    fn fold(&mut self, row: usize) {
        let k = self.sum_target_extra.len();
        let extra = &self.matrix.extra;
        let target = self.matrix.target[row];
        for a in 0..k {
            let ea = extra[(row, a)];
            self.sum_target_extra[a] += target * ea;
            for b in 0..k {
                self.sum_outer[a * k + b] += ea * extra[(row, b)];
            }
        }
    }

    fn emit(&self) -> FitResult<BoundaryStat> {
        let weight = solve_regularized(&self.sum_outer, self.lambda, &self.sum_target_extra)?;
        let loss = -dot(&weight, &self.sum_target_extra);
        Ok(BoundaryStat { loss, weight })
    }
}

/// Later Poisson trees: Newton step on the Poisson likelihood of the rate `bias + w.e`.
///
/// The exposure part of the gradient is `objects * psi` when psi is known, where `objects` counts
/// the distinct consecutive group ids folded so far. Without psi every row is its own unit of
/// exposure and the term is the sum of the bridge features.
pub(crate) struct RatioStatistics<'a> {
    matrix: &'a FeatureMatrix,
    bias: &'a [f64],
    lambda: f64,
    /// Row-major `k x k`
    sum_hessian: Vec<f64>,
    sum_ratio: Vec<f64>,
    sum_extra: Vec<f64>,
    objects: f64,
    last_group: Option<i64>,
    min_bias: f64,
}

impl<'a> RatioStatistics<'a> {
    fn new(matrix: &'a FeatureMatrix, bias: &'a [f64], lambda: f64) -> Self {
        let k = matrix.n_extra();
        Self {
            matrix,
            bias,
            lambda,
            sum_hessian: vec![0.; k * k],
            sum_ratio: vec![0.; k],
            sum_extra: vec![0.; k],
            objects: 0.,
            last_group: None,
            min_bias: std::f64::INFINITY,
        }
    }
}

impl<'a> LossStatistics for RatioStatistics<'a> {
    fn fold(&mut self, row: usize) {
        let k = self.sum_ratio.len();
        let extra = &self.matrix.extra;
        let target = self.matrix.target[row];
        let bias = self.bias[row];
        for a in 0..k {
            let ea = extra[(row, a)];
            self.sum_ratio[a] += target * ea / bias;
            self.sum_extra[a] += ea;
            for b in 0..k {
                self.sum_hessian[a * k + b] += target * ea * extra[(row, b)] / bias.powi(2);
            }
        }
        match &self.matrix.group_ids {
            Some(group_ids) => {
                let group = group_ids[row];
                if self.last_group != Some(group) {
                    self.objects += 1.;
                }
                self.last_group = Some(group);
            }
            None => self.objects += 1.,
        }
        self.min_bias = self.min_bias.min(bias);
    }

    fn emit(&self) -> FitResult<BoundaryStat> {
        let grad: Vec<f64> = match &self.matrix.psi {
            Some(psi) => psi
                .iter()
                .zip(&self.sum_ratio)
                .map(|(psi, ratio)| self.objects * psi - ratio)
                .collect(),
            None => self
                .sum_extra
                .iter()
                .zip(&self.sum_ratio)
                .map(|(exposure, ratio)| exposure - ratio)
                .collect(),
        };
        let minus_grad: Vec<f64> = grad.iter().map(|e| -e).collect();
        let mut weight = solve_regularized(&self.sum_hessian, self.lambda, &minus_grad)?;
        if weight.len() == 1 {
            // The rate must stay positive
            weight[0] = weight[0].max(self.lambda - self.min_bias);
        }
        let loss = dot(&weight, &grad);
        Ok(BoundaryStat { loss, weight })
    }
}
