//! Split search of a node, one task per interpolating feature.

use crate::scan::scan_column;
use crate::split::{best_split, best_split_of_column, SplitCandidate};
use crate::stats::{BoundaryStat, StatisticsSource};
use crate::{FeatureMatrix, FitError, FitResult};
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Outcome of the search on a node.
#[derive(Debug, Clone)]
pub(crate) struct NodeSearch {
    pub(crate) best: Option<SplitCandidate>,
    /// Step and loss of the node if it doesn't split.
    pub(crate) no_split: BoundaryStat,
}

/// Runs the column scans, on a dedicated pool when more than one thread is requested.
///
/// The pool lives as long as the training, every node reuses it.
pub(crate) struct ColumnDispatcher {
    pool: Option<ThreadPool>,
}

impl ColumnDispatcher {
    pub(crate) fn new(n_threads: usize) -> FitResult<Self> {
        let pool = match n_threads {
            0 => {
                return Err(FitError::InvalidValue(
                    "n_threads must be at least 1".to_string(),
                ))
            }
            1 => None,
            _ => Some(
                ThreadPoolBuilder::new()
                    .num_threads(n_threads)
                    .build()
                    .map_err(|e| FitError::ThreadPool(e.to_string()))?,
            ),
        };
        Ok(Self { pool })
    }

    pub(crate) fn n_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }

    /// Scan every interpolating feature of `matrix` and keep the lowest loss.
    ///
    /// Each column writes its own slot, and the slots are reduced by increasing feature id, so the
    /// result doesn't depend on the number of threads. The first error by feature id is returned.
    pub(crate) fn search(
        &self,
        matrix: &FeatureMatrix,
        source: &StatisticsSource,
        unbalance_penalty: f64,
    ) -> FitResult<NodeSearch> {
        let n_rows = matrix.n_rows();
        let scan_one = |feature_id: usize| -> FitResult<(Option<SplitCandidate>, BoundaryStat)> {
            let scan = scan_column(matrix, feature_id, source, unbalance_penalty)?;
            let best = best_split_of_column(feature_id, &scan, n_rows);
            Ok((best, scan.total))
        };

        let slots: Vec<FitResult<(Option<SplitCandidate>, BoundaryStat)>> = match &self.pool {
            Some(pool) => pool.install(|| {
                (0..matrix.n_inter())
                    .into_par_iter()
                    .map(scan_one)
                    .collect()
            }),
            None => (0..matrix.n_inter()).map(scan_one).collect(),
        };

        let mut candidates = Vec::with_capacity(slots.len());
        let mut no_split = None;
        for slot in slots {
            let (candidate, total) = slot?;
            if no_split.is_none() {
                no_split = Some(total);
            }
            candidates.push(candidate);
        }
        let no_split = match no_split {
            Some(no_split) => no_split,
            None => source.whole_node()?,
        };
        Ok(NodeSearch {
            best: best_split(candidates),
            no_split,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LossKind;
    use rand::prelude::*;

    fn random_matrix(n_rows: usize, seed: u64) -> FeatureMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        // Few distinct values, to have ties inside the columns
        let inter = (0..n_rows)
            .map(|_| (0..6).map(|_| rng.gen_range(0..8) as f64).collect())
            .collect();
        let extra = (0..n_rows).map(|_| vec![1., rng.gen::<f64>()]).collect();
        let target = (0..n_rows).map(|_| rng.gen::<f64>() * 10.).collect();
        FeatureMatrix::from_rows(inter, extra, target).unwrap()
    }

    #[test]
    fn test_thread_count_does_not_change_the_split() {
        let matrix = random_matrix(200, 42);
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 1e-3);
        let sequential = ColumnDispatcher::new(1)
            .unwrap()
            .search(&matrix, &source, 0.1)
            .unwrap();
        let dispatcher = ColumnDispatcher::new(4).unwrap();
        assert_eq!(dispatcher.n_threads(), 4);
        let parallel = dispatcher.search(&matrix, &source, 0.1).unwrap();
        assert!(sequential.best.is_some());
        assert_eq!(sequential.best, parallel.best);
        assert_eq!(sequential.no_split, parallel.no_split);
    }

    #[test]
    fn test_duplicated_columns_pick_the_first() {
        let matrix = FeatureMatrix::from_rows(
            vec![vec![1., 1.], vec![2., 2.], vec![1., 1.], vec![2., 2.]],
            vec![vec![1.]; 4],
            vec![1., 3., 1., 3.],
        )
        .unwrap();
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 0.);
        for n_threads in [1, 4].iter() {
            let search = ColumnDispatcher::new(*n_threads)
                .unwrap()
                .search(&matrix, &source, 0.)
                .unwrap();
            let best = search.best.unwrap();
            assert_eq!(best.feature_id, 0);
            assert_eq!(best.threshold, 1.5);
        }
    }

    #[test]
    fn test_no_thread() {
        assert!(matches!(
            ColumnDispatcher::new(0),
            Err(FitError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_errors_are_propagated() {
        // Two identical bridge features and no regularization: the system is singular
        let matrix = FeatureMatrix::from_rows(
            vec![vec![1.], vec![2.]],
            vec![vec![1., 1.], vec![1., 1.]],
            vec![1., 2.],
        )
        .unwrap();
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 0.);
        let search = ColumnDispatcher::new(2).unwrap().search(&matrix, &source, 0.);
        assert_eq!(search.unwrap_err(), FitError::SingularSystem { size: 2 });
    }
}
