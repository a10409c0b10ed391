use thiserror::Error;

/// Error raised while building a dataset, fitting a model or predicting with it.
///
/// We have to define a specific type because the generic dyn Error is not Sync, so it can't be used
/// with Rayon. Nothing is retried: every variant is an input or programming error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Lengths or widths of the components of a dataset (or of a model) disagree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Zero rows, or zero columns where at least one is required.
    #[error("empty input: {0}")]
    EmptyInput(String),
    /// The regularized Newton system could not be solved.
    #[error("singular {size}x{size} system in the Newton step, try a larger lambda")]
    SingularSystem { size: usize },
    /// Prediction was requested on an empty or malformed model.
    #[error("invalid model: {0}")]
    InvalidModel(String),
    /// NaN or infinite data, or an hyperparameter out of its domain.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// The Poisson rate reached exactly zero.
    #[error("zero prediction after stage {stage}")]
    ZeroPrediction { stage: usize },
    /// The rayon pool scanning the columns could not be built.
    #[error("cannot start the worker pool: {0}")]
    ThreadPool(String),
}

pub type FitResult<T> = Result<T, FitError>;

pub(crate) static SHOULD_NOT_HAPPEN: &str =
    "There is an unexpected error in extraboost. Please raise a bug.";
