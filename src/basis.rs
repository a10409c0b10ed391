/// One function of time used to build a bridge feature.
///
/// A list of basis functions evaluated at the time of each record gives the bridge features; the
/// leaves of the trees are linear models over them, which is what lets a model continue a trend
/// after the last observed time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Basis {
    /// Always 1: the intercept.
    Constant,
    /// `t^power`
    Power(i32),
    Sin { frequency: f64 },
    Cos { frequency: f64 },
    /// Indicator of `[start, end)`.
    Piecewise { start: f64, end: f64 },
}

impl Basis {
    pub fn eval(&self, t: f64) -> f64 {
        match *self {
            Basis::Constant => 1.,
            Basis::Power(power) => t.powi(power),
            Basis::Sin { frequency } => (frequency * t).sin(),
            Basis::Cos { frequency } => (frequency * t).cos(),
            Basis::Piecewise { start, end } => {
                if t >= start && t < end {
                    1.
                } else {
                    0.
                }
            }
        }
    }

    /// Evaluate all the functions at `t`.
    pub fn eval_all(basis: &[Basis], t: f64) -> Vec<f64> {
        basis.iter().map(|function| function.eval(t)).collect()
    }

    /// Rectangle-rule integral of every function over a uniform grid.
    ///
    /// Returns `None` when the grid has less than 2 points, since the step is unknown.
    pub fn integrate(basis: &[Basis], grid: &[f64]) -> Option<Vec<f64>> {
        if grid.len() < 2 {
            return None;
        }
        let dt = grid[1] - grid[0];
        let mut psi = vec![0.; basis.len()];
        for &t in grid {
            for (acc, function) in psi.iter_mut().zip(basis) {
                *acc += function.eval(t);
            }
        }
        psi.iter_mut().for_each(|e| *e *= dt);
        Some(psi)
    }
}
