//! Forward and backward cumulative passes over one interpolating feature.

use crate::stats::{BoundaryStat, StatisticsSource};
use crate::{FeatureMatrix, FitResult};

/// Statistic of the rows on one side of a boundary between two distinct values.
#[derive(Debug, Clone)]
pub(crate) struct Boundary {
    /// Position in the sort order of the last row folded before the boundary.
    pub(crate) position: usize,
    /// Feature value of that row.
    pub(crate) value: f64,
    pub(crate) stat: BoundaryStat,
}

/// Result of the two passes over a column of a node.
///
/// With `R` distinct values, `forward` and `backward` both hold `R - 1` boundaries. `forward[j]`
/// covers the `j + 1` smallest values and `backward[R - 2 - j]` covers the others, so together they
/// describe the split between the `j`-th and the `j + 1`-th distinct value.
#[derive(Debug, Clone)]
pub(crate) struct ColumnScan {
    pub(crate) forward: Vec<Boundary>,
    /// By decreasing position.
    pub(crate) backward: Vec<Boundary>,
    /// All the rows of the node, ie the step if the node doesn't split.
    pub(crate) total: BoundaryStat,
}

/// `unbalance_penalty * |position - middle|`, added to every boundary loss.
fn penalty(unbalance_penalty: f64, position: usize, n_rows: usize) -> f64 {
    if unbalance_penalty == 0. {
        return 0.;
    }
    let middle = (n_rows as f64 - 1.) / 2.;
    unbalance_penalty * (position as f64 - middle).abs()
}

/// Scan the rows of `matrix` by increasing `feature_id`, then by decreasing `feature_id`.
pub(crate) fn scan_column(
    matrix: &FeatureMatrix,
    feature_id: usize,
    source: &StatisticsSource,
    unbalance_penalty: f64,
) -> FitResult<ColumnScan> {
    let order = matrix.sort_order(feature_id);
    let column = matrix.inter.column(feature_id);
    let n_rows = order.len();
    let value_at = |pos: usize| column[order[pos]];

    let mut forward = Vec::new();
    let mut total = None;
    let mut statistics = source.statistics();
    for pos in 0..n_rows {
        statistics.fold(order[pos]);
        if pos == n_rows - 1 {
            total = Some(statistics.emit()?);
        } else if value_at(pos + 1) != value_at(pos) {
            let mut stat = statistics.emit()?;
            stat.loss += penalty(unbalance_penalty, pos, n_rows);
            forward.push(Boundary {
                position: pos,
                value: value_at(pos),
                stat,
            });
        }
    }

    let mut backward = Vec::with_capacity(forward.len());
    let mut statistics = source.statistics();
    for pos in (1..n_rows).rev() {
        statistics.fold(order[pos]);
        if value_at(pos - 1) != value_at(pos) {
            let mut stat = statistics.emit()?;
            stat.loss += penalty(unbalance_penalty, pos, n_rows);
            backward.push(Boundary {
                position: pos,
                value: value_at(pos),
                stat,
            });
        }
    }
    debug_assert_eq!(forward.len(), backward.len());

    match total {
        Some(total) => Ok(ColumnScan {
            forward,
            backward,
            total,
        }),
        None => source.whole_node().map(|total| ColumnScan {
            forward,
            backward,
            total,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LossKind;

    macro_rules! assert_close {
        ($a : expr, $b: expr) => {{
            let (a, b) = ($a, $b);
            assert!((a - b).abs() <= 1e-6, "{} != {}", a, b);
        }};
    }

    /// Two records at x=1 and two at x=3, each pair lying on a line in `[1, t]`.
    fn example_matrix() -> FeatureMatrix {
        FeatureMatrix::from_rows(
            vec![vec![1.], vec![1.], vec![3.], vec![3.]],
            vec![vec![1., 0.], vec![1., 1.], vec![1., 0.], vec![1., 1.]],
            vec![1., 3., 2., 5.],
        )
        .unwrap()
    }

    #[test]
    fn test_boundaries() {
        let matrix = example_matrix();
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 1e-9);
        let scan = scan_column(&matrix, 0, &source, 0.).unwrap();

        assert_eq!(scan.forward.len(), 1);
        assert_eq!(scan.backward.len(), 1);
        let (left, right) = (&scan.forward[0], &scan.backward[0]);
        assert_eq!((left.position, left.value), (1, 1.));
        assert_eq!((right.position, right.value), (2, 3.));

        assert_close!(left.stat.weight[0], 1.);
        assert_close!(left.stat.weight[1], 2.);
        assert_close!(left.stat.loss, -10.);
        assert_close!(right.stat.weight[0], 2.);
        assert_close!(right.stat.weight[1], 3.);
        assert_close!(right.stat.loss, -29.);
        // A single line can't fit the four points
        assert!(scan.total.loss > -39.);
    }

    #[test]
    fn test_single_value() {
        let matrix = FeatureMatrix::from_rows(
            vec![vec![2.]; 3],
            vec![vec![1.]; 3],
            vec![1., 2., 3.],
        )
        .unwrap();
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 0.);
        let scan = scan_column(&matrix, 0, &source, 0.).unwrap();
        assert!(scan.forward.is_empty());
        assert!(scan.backward.is_empty());
        assert_close!(scan.total.weight[0], 2.);
        assert_close!(scan.total.loss, -12.);
    }

    #[test]
    fn test_penalty() {
        let matrix = example_matrix();
        let source = StatisticsSource::new(&matrix, None, LossKind::SquaredError, 1e-9);
        let scan = scan_column(&matrix, 0, &source, 2.).unwrap();
        // The middle of 4 rows is 1.5, both boundaries are at distance 0.5
        assert_close!(scan.forward[0].stat.loss, -10. + 1.);
        assert_close!(scan.backward[0].stat.loss, -29. + 1.);
        assert!(penalty(1., 0, 5) > penalty(1., 2, 5));
    }

    #[test]
    fn test_objects_in_both_directions() {
        // Two records per group, psi makes the exposure grow with the number of groups folded
        let matrix = FeatureMatrix::from_rows(
            vec![vec![1.], vec![2.], vec![3.], vec![4.]],
            vec![vec![1., 0.], vec![1., 1.], vec![1., 0.], vec![1., 1.]],
            vec![4.; 4],
        )
        .unwrap()
        .with_group_ids(vec![7, 7, 8, 8])
        .unwrap()
        .with_psi(vec![3., 2.])
        .unwrap();
        let bias = vec![4.; 4];
        let source = StatisticsSource::new(&matrix, Some(&bias), LossKind::Poisson, 0.);
        let scan = scan_column(&matrix, 0, &source, 0.).unwrap();
        assert_eq!(scan.forward.len(), 3);
        assert_eq!(scan.backward.len(), 3);

        // One group on each side: gradient [1, 1], hessian [[0.5, 0.25], [0.25, 0.25]]
        let (left, right) = (&scan.forward[1], &scan.backward[1]);
        assert_eq!((left.position, right.position), (1, 2));
        for stat in &[&left.stat, &right.stat] {
            assert_close!(stat.weight[0], 0.);
            assert_close!(stat.weight[1], -4.);
            assert_close!(stat.loss, -4.);
        }

        // Rows 3, 2 and 1 span two groups: gradient [3, 2], hessian [[0.75, 0.5], [0.5, 0.5]]
        let stat = &scan.backward[2].stat;
        assert_eq!(scan.backward[2].position, 1);
        assert_close!(stat.weight[0], -4.);
        assert_close!(stat.weight[1], 0.);
        assert_close!(stat.loss, -12.);
    }
}
