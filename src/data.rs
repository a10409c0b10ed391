use crate::{Basis, ColumnMajorMatrix, FitError, FitResult};
use ordered_float::OrderedFloat;

/// Records split into the two feature roles, with their target.
///
/// The interpolating features (`inter`) are only compared against thresholds, they decide in
/// which leaf a record falls. The bridge features (`extra`) are the basis of the linear model
/// stored in every leaf. A matrix owns its rows: `slice` is the only place where rows are copied.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub(crate) inter: ColumnMajorMatrix<f64>,
    pub(crate) extra: ColumnMajorMatrix<f64>,
    pub(crate) target: Vec<f64>,
    /// Object of every record, used by the Poisson loss to count distinct objects.
    pub(crate) group_ids: Option<Vec<i64>>,
    /// Integral of the bridge features over the time range, Poisson loss only.
    pub(crate) psi: Option<Vec<f64>>,
    /// Row of every record in the matrix the user built.
    pub(crate) record_ids: Vec<usize>,
    /// Per interpolating column, the rows by increasing value.
    pub(crate) sort_orders: Vec<Vec<usize>>,
}

fn check_finite(values: &[f64], what: &str) -> FitResult<()> {
    match values.iter().position(|e| !e.is_finite()) {
        Some(pos) => Err(FitError::InvalidValue(format!(
            "non-finite value {} at position {} of {}",
            values[pos], pos, what
        ))),
        None => Ok(()),
    }
}

impl FeatureMatrix {
    /// Build and validate a matrix.
    ///
    /// * `inter` - interpolating features, one row per record
    /// * `extra` - bridge features, one row per record, at least one column
    /// * `target` - one value per record
    pub fn new(
        inter: ColumnMajorMatrix<f64>,
        extra: ColumnMajorMatrix<f64>,
        target: Vec<f64>,
    ) -> FitResult<Self> {
        let n_rows = target.len();
        if n_rows == 0 {
            return Err(FitError::EmptyInput("the target is empty".to_string()));
        }
        if inter.n_cols() == 0 {
            return Err(FitError::EmptyInput(
                "no interpolating feature".to_string(),
            ));
        }
        if extra.n_cols() == 0 {
            return Err(FitError::EmptyInput("no bridge feature".to_string()));
        }
        if inter.n_rows() != n_rows {
            return Err(FitError::ShapeMismatch(format!(
                "{} rows of interpolating features for {} targets",
                inter.n_rows(),
                n_rows
            )));
        }
        if extra.n_rows() != n_rows {
            return Err(FitError::ShapeMismatch(format!(
                "{} rows of bridge features for {} targets",
                extra.n_rows(),
                n_rows
            )));
        }
        check_finite(inter.flat(), "the interpolating features")?;
        check_finite(extra.flat(), "the bridge features")?;
        check_finite(&target, "the target")?;

        let sort_orders = Self::compute_sort_orders(&inter);
        Ok(Self {
            inter,
            extra,
            target,
            group_ids: None,
            psi: None,
            record_ids: (0..n_rows).collect(),
            sort_orders,
        })
    }

    /// Same as `new`, from rows of interpolating and bridge features.
    pub fn from_rows(inter: Vec<Vec<f64>>, extra: Vec<Vec<f64>>, target: Vec<f64>) -> FitResult<Self> {
        Self::new(
            ColumnMajorMatrix::from_rows(inter)?,
            ColumnMajorMatrix::from_rows(extra)?,
            target,
        )
    }

    /// Build the bridge features by evaluating `basis` at the `time` of every record.
    ///
    /// When `time_grid` is given (a uniform grid of at least 2 points), the integral of the basis
    /// over it is attached as `psi` for the Poisson loss.
    pub fn from_basis(
        inter: Vec<Vec<f64>>,
        target: Vec<f64>,
        basis: &[Basis],
        time: &[f64],
        time_grid: Option<&[f64]>,
    ) -> FitResult<Self> {
        if basis.is_empty() {
            return Err(FitError::EmptyInput("no basis function".to_string()));
        }
        if time.len() != target.len() {
            return Err(FitError::ShapeMismatch(format!(
                "{} times for {} targets",
                time.len(),
                target.len()
            )));
        }
        let extra = time.iter().map(|&t| Basis::eval_all(basis, t)).collect();
        let matrix = Self::from_rows(inter, extra, target)?;
        match time_grid.and_then(|grid| Basis::integrate(basis, grid)) {
            Some(psi) => matrix.with_psi(psi),
            None => Ok(matrix),
        }
    }

    /// Attach the object of every record (Poisson loss).
    pub fn with_group_ids(mut self, group_ids: Vec<i64>) -> FitResult<Self> {
        if group_ids.len() != self.n_rows() {
            return Err(FitError::ShapeMismatch(format!(
                "{} group ids for {} records",
                group_ids.len(),
                self.n_rows()
            )));
        }
        self.group_ids = Some(group_ids);
        Ok(self)
    }

    /// Attach the integral of every bridge feature over the time range (Poisson loss).
    pub fn with_psi(mut self, psi: Vec<f64>) -> FitResult<Self> {
        if psi.len() != self.n_extra() {
            return Err(FitError::ShapeMismatch(format!(
                "psi has {} values for {} bridge features",
                psi.len(),
                self.n_extra()
            )));
        }
        check_finite(&psi, "psi")?;
        self.psi = Some(psi);
        Ok(self)
    }

    /// Clamp the target to at least `floor`, for count losses where 0 is not a usable rate.
    pub fn with_target_floor(mut self, floor: f64) -> Self {
        for e in self.target.iter_mut() {
            *e = e.max(floor);
        }
        self
    }

    /// Per column, the indices of the rows by increasing value.
    /// Equal values keep the order of the rows, so the split boundaries don't depend on the run.
    fn compute_sort_orders(inter: &ColumnMajorMatrix<f64>) -> Vec<Vec<usize>> {
        inter
            .columns()
            .map(|column| {
                let mut sorted_indices: Vec<usize> = (0..column.len()).collect();
                // sort_by_key is stable
                sorted_indices.sort_by_key(|&row_id| OrderedFloat::from(column[row_id]));
                sorted_indices
            })
            .collect()
    }

    /// Copy of the records where `mask` is true, with fresh sort orders.
    pub fn slice(&self, mask: &[bool]) -> FitResult<Self> {
        if mask.len() != self.n_rows() {
            return Err(FitError::ShapeMismatch(format!(
                "mask of length {} for {} records",
                mask.len(),
                self.n_rows()
            )));
        }
        if !mask.iter().any(|&keep| keep) {
            return Err(FitError::EmptyInput("the mask selects no record".to_string()));
        }
        let inter = self.inter.select_rows(mask);
        let sort_orders = Self::compute_sort_orders(&inter);
        Ok(Self {
            inter,
            extra: self.extra.select_rows(mask),
            target: select(&self.target, mask),
            group_ids: self.group_ids.as_ref().map(|ids| select(ids, mask)),
            psi: self.psi.clone(),
            record_ids: select(&self.record_ids, mask),
            sort_orders,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    /// Number of interpolating features.
    pub fn n_inter(&self) -> usize {
        self.inter.n_cols()
    }

    /// Number of bridge features, the length of every leaf vector.
    pub fn n_extra(&self) -> usize {
        self.extra.n_cols()
    }

    pub fn inter(&self) -> &ColumnMajorMatrix<f64> {
        &self.inter
    }

    pub fn extra(&self) -> &ColumnMajorMatrix<f64> {
        &self.extra
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn group_ids(&self) -> Option<&[i64]> {
        self.group_ids.as_deref()
    }

    pub fn psi(&self) -> Option<&[f64]> {
        self.psi.as_deref()
    }

    pub fn record_ids(&self) -> &[usize] {
        &self.record_ids
    }

    pub fn sort_order(&self, feature_id: usize) -> &[usize] {
        &self.sort_orders[feature_id]
    }
}

/// Keep the items where `mask` is true.
pub(crate) fn select<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .map(|(val, _)| val.clone())
        .collect()
}
