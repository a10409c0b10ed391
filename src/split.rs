use crate::scan::ColumnScan;

/// The best split of a node on one interpolating feature.
///
/// Records with `feature < threshold` go to the left child.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SplitCandidate {
    pub(crate) feature_id: usize,
    pub(crate) threshold: f64,
    /// Step of the left child, relative to the node's current prediction.
    pub(crate) left_weight: Vec<f64>,
    pub(crate) right_weight: Vec<f64>,
    /// Forward loss of the left rows plus backward loss of the right rows.
    pub(crate) loss: f64,
    pub(crate) n_left: usize,
    pub(crate) n_right: usize,
}

/// Lowest-loss boundary of a column of a node of `n_rows` rows.
///
/// `None` when the column has a single distinct value, or when every boundary has a NaN loss. On
/// ties the smallest threshold wins.
pub(crate) fn best_split_of_column(
    feature_id: usize,
    scan: &ColumnScan,
    n_rows: usize,
) -> Option<SplitCandidate> {
    let n_boundaries = scan.forward.len();
    let mut best: Option<SplitCandidate> = None;
    for (j, left) in scan.forward.iter().enumerate() {
        let right = &scan.backward[n_boundaries - 1 - j];
        let loss = left.stat.loss + right.stat.loss;
        if loss.is_nan() {
            continue;
        }
        let better = match &best {
            Some(best) => loss < best.loss,
            None => true,
        };
        if better {
            // Halves first, the sum of two large values overflows
            let mut threshold = left.value / 2. + right.value / 2.;
            if threshold <= left.value {
                // Adjacent floats: the middle rounds down to the left value
                threshold = right.value;
            }
            best = Some(SplitCandidate {
                feature_id,
                threshold,
                left_weight: left.stat.weight.clone(),
                right_weight: right.stat.weight.clone(),
                loss,
                n_left: left.position + 1,
                n_right: n_rows - right.position,
            });
        }
    }
    best
}

/// Lowest loss across columns, given by increasing feature id; ties keep the smallest feature id.
pub(crate) fn best_split<I>(candidates: I) -> Option<SplitCandidate>
where
    I: IntoIterator<Item = Option<SplitCandidate>>,
{
    let mut best: Option<SplitCandidate> = None;
    for candidate in candidates.into_iter().flatten() {
        let better = match &best {
            Some(best) => candidate.loss < best.loss,
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{scan_column, Boundary};
    use crate::stats::{BoundaryStat, StatisticsSource};
    use crate::{FeatureMatrix, LossKind};

    fn boundary(position: usize, value: f64, loss: f64) -> Boundary {
        Boundary {
            position,
            value,
            stat: BoundaryStat {
                loss,
                weight: vec![loss],
            },
        }
    }

    fn candidate(feature_id: usize, loss: f64) -> SplitCandidate {
        SplitCandidate {
            feature_id,
            threshold: 0.,
            left_weight: vec![],
            right_weight: vec![],
            loss,
            n_left: 1,
            n_right: 1,
        }
    }

    #[test]
    fn test_example_split() {
        let matrix = FeatureMatrix::from_rows(
            vec![vec![1.], vec![1.], vec![3.], vec![3.]],
            vec![vec![1., 0.], vec![1., 1.], vec![1., 0.], vec![1., 1.]],
            vec![1., 3., 2., 5.],
        )
        .unwrap();
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 1e-9);
        let scan = scan_column(&matrix, 0, &source, 0.).unwrap();
        let split = best_split_of_column(0, &scan, 4).unwrap();
        assert_eq!(split.threshold, 2.);
        assert_eq!((split.n_left, split.n_right), (2, 2));
        assert!((split.loss + 39.).abs() < 1e-6);
    }

    #[test]
    fn test_pairing_and_ties() {
        // Values 0, 1, 2 at positions 0, 1, 2
        let scan = ColumnScan {
            forward: vec![boundary(0, 0., -1.), boundary(1, 1., -2.)],
            backward: vec![boundary(2, 2., -1.), boundary(1, 1., -2.)],
            total: BoundaryStat {
                loss: 0.,
                weight: vec![0.],
            },
        };
        // Both splits have a loss of -3, the first one wins
        let split = best_split_of_column(7, &scan, 3).unwrap();
        assert_eq!(split.feature_id, 7);
        assert_eq!(split.threshold, 0.5);
        assert_eq!(split.left_weight, vec![-1.]);
        assert_eq!(split.right_weight, vec![-2.]);
        assert_eq!((split.n_left, split.n_right), (1, 2));
    }

    #[test]
    fn test_nan_is_skipped() {
        let scan = ColumnScan {
            forward: vec![boundary(0, 0., f64::NAN), boundary(1, 1., 5.)],
            backward: vec![boundary(2, 2., 1.), boundary(1, 1., 1.)],
            total: BoundaryStat {
                loss: 0.,
                weight: vec![0.],
            },
        };
        let split = best_split_of_column(0, &scan, 3).unwrap();
        assert_eq!(split.threshold, 1.5);
    }

    #[test]
    fn test_threshold_of_large_values() {
        let scan = ColumnScan {
            forward: vec![boundary(1, 1e308, -1.)],
            backward: vec![boundary(2, 1.7e308, -1.)],
            total: BoundaryStat {
                loss: 0.,
                weight: vec![0.],
            },
        };
        let split = best_split_of_column(0, &scan, 4).unwrap();
        assert!(split.threshold.is_finite());
        assert!(1e308 < split.threshold && split.threshold <= 1.7e308);

        let scan = ColumnScan {
            forward: vec![boundary(0, -f64::MAX, -1.)],
            backward: vec![boundary(1, f64::MAX, -1.)],
            ..scan
        };
        assert_eq!(best_split_of_column(0, &scan, 2).unwrap().threshold, 0.);
    }

    #[test]
    fn test_threshold_of_adjacent_floats() {
        let next = 1f64 + f64::EPSILON;
        let scan = ColumnScan {
            forward: vec![boundary(0, 1., -1.)],
            backward: vec![boundary(1, next, -1.)],
            total: BoundaryStat {
                loss: 0.,
                weight: vec![0.],
            },
        };
        assert_eq!(best_split_of_column(0, &scan, 2).unwrap().threshold, next);
    }

    #[test]
    fn test_unbalance_penalty_moves_the_split() {
        // A single outlier at the smallest value: without penalty the split isolates it
        let matrix = FeatureMatrix::from_rows(
            (0..6).map(|i| vec![i as f64]).collect(),
            vec![vec![1.]; 6],
            vec![10., 0., 0., 0., 0., 0.],
        )
        .unwrap();
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 1e-9);

        let scan = scan_column(&matrix, 0, &source, 0.).unwrap();
        let split = best_split_of_column(0, &scan, 6).unwrap();
        assert_eq!(split.threshold, 0.5);
        assert_eq!((split.n_left, split.n_right), (1, 5));

        // Losses become -100 + 4p, -50 + 2p, -100/3 + p, -25 + 2p and -20 + 4p
        let scan = scan_column(&matrix, 0, &source, 30.).unwrap();
        let split = best_split_of_column(0, &scan, 6).unwrap();
        assert_eq!(split.threshold, 2.5);
        assert_eq!((split.n_left, split.n_right), (3, 3));
    }

    #[test]
    fn test_best_split_across_columns() {
        let best = best_split(vec![None, Some(candidate(1, -2.)), Some(candidate(2, -2.))]);
        assert_eq!(best.map(|e| e.feature_id), Some(1));
        let best = best_split(vec![Some(candidate(0, -1.)), Some(candidate(1, -2.))]);
        assert_eq!(best.map(|e| e.feature_id), Some(1));
        assert_eq!(best_split(vec![None, None]), None);
    }
}
