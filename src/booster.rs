use std::time::Instant;

use crate::dispatch::ColumnDispatcher;
use crate::{
    ColumnMajorMatrix, FeatureMatrix, FitError, FitResult, LossKind, Tree, TreeParams,
    DEFAULT_LEARNING_RATE, DEFAULT_N_STAGES,
};
use log::{debug, info};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BoosterParams {
    /// Number of trees.
    pub n_stages: usize,
    /// Multiplies the leaves of every tree but the first one.
    pub learning_rate: f64,
    pub loss: LossKind,
    /// Fail as soon as a prediction is exactly zero. Only meaningful for the Poisson loss, where
    /// the statistics divide by the current rate.
    pub check_zero: bool,
}

impl BoosterParams {
    pub fn new() -> Self {
        BoosterParams {
            n_stages: DEFAULT_N_STAGES,
            learning_rate: DEFAULT_LEARNING_RATE,
            loss: LossKind::default(),
            check_zero: false,
        }
    }

    fn validate(&self) -> FitResult<()> {
        if !self.learning_rate.is_finite() {
            return Err(FitError::InvalidValue(format!(
                "learning_rate must be finite, got {}",
                self.learning_rate
            )));
        }
        if self.n_stages == 0 {
            return Err(FitError::InvalidValue(
                "n_stages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self::new()
    }
}

/// A held-out dataset evaluated after every stage.
#[derive(Debug, Clone)]
pub struct Monitor<'a> {
    pub name: String,
    pub matrix: &'a FeatureMatrix,
    /// Prediction before the first tree, zero if not given.
    pub initial_bias: Option<Vec<f64>>,
}

impl<'a> Monitor<'a> {
    pub fn new(name: &str, matrix: &'a FeatureMatrix) -> Self {
        Monitor {
            name: name.to_string(),
            matrix,
            initial_bias: None,
        }
    }
}

/// Loss of every monitored dataset after every stage.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LearningCurves {
    /// One title per monitor, like `RMSE for valid`.
    pub titles: Vec<String>,
    /// One row per tree, one column per monitor.
    pub values: Vec<Vec<f64>>,
}

/// Additive ensemble of trees with linear leaves.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Booster {
    trees: Vec<Tree>,
    learning_curve_titles: Vec<String>,
    n_inter: usize,
    n_extra: usize,
    booster_params: BoosterParams,
    tree_params: TreeParams,
}

fn check_bias(bias: &[f64], n_rows: usize, name: &str) -> FitResult<()> {
    if bias.len() != n_rows {
        return Err(FitError::ShapeMismatch(format!(
            "initial bias of {} has {} values for {} records",
            name,
            bias.len(),
            n_rows
        )));
    }
    Ok(())
}

impl Booster {
    /// Train `booster_params.n_stages` trees on `train`.
    ///
    /// * `monitors` - datasets evaluated after every stage, for the learning curves
    /// * `initial_bias` - prediction of every training record before the first tree. Without it the
    /// Newton losses start from zero, and the Poisson loss fits the rates directly with the first
    /// tree.
    pub fn build(
        train: &FeatureMatrix,
        booster_params: &BoosterParams,
        tree_params: &TreeParams,
        monitors: &[Monitor],
        initial_bias: Option<Vec<f64>>,
    ) -> FitResult<Booster> {
        booster_params.validate()?;
        tree_params.validate()?;
        if let Some(bias) = &initial_bias {
            check_bias(bias, train.n_rows(), "the training set")?;
        }
        for monitor in monitors {
            if monitor.matrix.n_inter() != train.n_inter()
                || monitor.matrix.n_extra() != train.n_extra()
            {
                return Err(FitError::ShapeMismatch(format!(
                    "monitor {} has {}+{} features, the training set {}+{}",
                    monitor.name,
                    monitor.matrix.n_inter(),
                    monitor.matrix.n_extra(),
                    train.n_inter(),
                    train.n_extra()
                )));
            }
            if let Some(bias) = &monitor.initial_bias {
                check_bias(bias, monitor.matrix.n_rows(), &monitor.name)?;
            }
        }

        let loss = booster_params.loss;
        let mut o = Booster {
            trees: Vec::with_capacity(booster_params.n_stages),
            learning_curve_titles: monitors
                .iter()
                .map(|monitor| format!("{} for {}", loss.monitor_name(), monitor.name))
                .collect(),
            n_inter: train.n_inter(),
            n_extra: train.n_extra(),
            booster_params: booster_params.clone(),
            tree_params: tree_params.clone(),
        };

        let train_start_time = Instant::now();
        let dispatcher = ColumnDispatcher::new(tree_params.n_threads)?;
        debug!(
            "Training on {} records, {} columns scanned by {} threads",
            train.n_rows(),
            train.n_inter(),
            dispatcher.n_threads()
        );

        let mut bias: Option<Vec<f64>> = match (initial_bias, loss) {
            (Some(bias), _) => Some(bias),
            // The first Poisson tree fits the rates, not a correction
            (None, LossKind::Poisson) => None,
            (None, _) => Some(vec![0.; train.n_rows()]),
        };
        let mut monitor_biases: Vec<Vec<f64>> = monitors
            .iter()
            .map(|monitor| {
                monitor
                    .initial_bias
                    .clone()
                    .unwrap_or_else(|| vec![0.; monitor.matrix.n_rows()])
            })
            .collect();

        for stage in 0..booster_params.n_stages {
            info!("Tree number {}", stage + 1);
            let scale = if stage == 0 {
                1.
            } else {
                booster_params.learning_rate
            };
            let mut tree = Tree::build(
                train,
                bias.as_deref(),
                tree_params,
                loss,
                scale,
                &dispatcher,
            )?;

            let predictions = tree.predict(train.inter(), train.extra())?;
            let mut updated = bias.unwrap_or_else(|| vec![0.; train.n_rows()]);
            for (acc, prediction) in updated.iter_mut().zip(&predictions) {
                *acc += prediction;
            }
            if booster_params.check_zero && updated.iter().any(|&e| e == 0.) {
                return Err(FitError::ZeroPrediction { stage });
            }
            bias = Some(updated);

            for ((monitor, monitor_bias), title) in monitors
                .iter()
                .zip(monitor_biases.iter_mut())
                .zip(&o.learning_curve_titles)
            {
                let predictions = tree.predict(monitor.matrix.inter(), monitor.matrix.extra())?;
                for (acc, prediction) in monitor_bias.iter_mut().zip(&predictions) {
                    *acc += prediction;
                }
                let value = loss.monitor_value(monitor.matrix.target(), monitor_bias);
                info!("{} = {:.6}", title, value);
                tree.learning_curve.push(value);
            }
            o.trees.push(tree);
        }

        info!(
            "Training of {} trees finished. Elapsed: {:.2} secs",
            o.trees.len(),
            train_start_time.elapsed().as_secs_f64()
        );
        Ok(o)
    }

    /// Sum of the predictions of the first `n_trees` trees, or of all of them.
    ///
    /// The result is the raw prediction, `LossKind::transform` maps it to a probability for the
    /// logistic loss.
    pub fn predict(
        &self,
        inter: &ColumnMajorMatrix<f64>,
        extra: &ColumnMajorMatrix<f64>,
        n_trees: Option<usize>,
    ) -> FitResult<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(FitError::InvalidModel("the booster has no tree".to_string()));
        }
        if inter.n_cols() != self.n_inter || extra.n_cols() != self.n_extra {
            return Err(FitError::ShapeMismatch(format!(
                "{}+{} features for a booster trained with {}+{}",
                inter.n_cols(),
                extra.n_cols(),
                self.n_inter,
                self.n_extra
            )));
        }
        if inter.n_rows() != extra.n_rows() {
            return Err(FitError::ShapeMismatch(format!(
                "{} rows of interpolating features for {} rows of bridge features",
                inter.n_rows(),
                extra.n_rows()
            )));
        }
        let n_trees = n_trees.unwrap_or_else(|| self.trees.len());
        if n_trees > self.trees.len() {
            return Err(FitError::InvalidModel(format!(
                "{} trees requested from a booster of {}",
                n_trees,
                self.trees.len()
            )));
        }

        let mut o = vec![0.; inter.n_rows()];
        for tree in &self.trees[..n_trees] {
            for (acc, prediction) in o.iter_mut().zip(tree.predict(inter, extra)?) {
                *acc += prediction;
            }
        }
        Ok(o)
    }

    /// Same as `predict`, on the features of a matrix.
    pub fn predict_matrix(
        &self,
        matrix: &FeatureMatrix,
        n_trees: Option<usize>,
    ) -> FitResult<Vec<f64>> {
        self.predict(matrix.inter(), matrix.extra(), n_trees)
    }

    pub fn learning_curves(&self) -> LearningCurves {
        LearningCurves {
            titles: self.learning_curve_titles.clone(),
            values: self
                .trees
                .iter()
                .map(|tree| tree.learning_curve().to_vec())
                .collect(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn loss(&self) -> LossKind {
        self.booster_params.loss
    }

    pub fn booster_params(&self) -> &BoosterParams {
        &self.booster_params
    }

    pub fn tree_params(&self) -> &TreeParams {
        &self.tree_params
    }
}
