use crate::data::select;
use crate::dispatch::ColumnDispatcher;
use crate::error::SHOULD_NOT_HAPPEN;
use crate::stats::StatisticsSource;
use crate::{
    ColumnMajorMatrix, FeatureMatrix, FitError, FitResult, LossKind, DEFAULT_LAMBDA,
    DEFAULT_MAX_DEPTH, DEFAULT_MIN_ROWS, DEFAULT_N_THREADS, DEFAULT_UNBALANCE_PENALTY,
};
use itertools::Itertools;
use log::debug;

/// Parameters of a single tree.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TreeParams {
    /// Ridge term added to the diagonal of every Newton system.
    pub lambda: f64,
    pub max_depth: usize,
    /// Nodes below the root with at most this number of records are not split.
    pub min_rows: usize,
    /// Added to the loss of a boundary for each position it is away from the middle of the node.
    pub unbalance_penalty: f64,
    /// Size of the pool scanning the columns, 1 scans them sequentially.
    pub n_threads: usize,
}

impl TreeParams {
    pub fn new() -> Self {
        TreeParams {
            lambda: DEFAULT_LAMBDA,
            max_depth: DEFAULT_MAX_DEPTH,
            min_rows: DEFAULT_MIN_ROWS,
            unbalance_penalty: DEFAULT_UNBALANCE_PENALTY,
            n_threads: DEFAULT_N_THREADS,
        }
    }

    pub(crate) fn validate(&self) -> FitResult<()> {
        if !(self.lambda >= 0. && self.lambda.is_finite()) {
            return Err(FitError::InvalidValue(format!(
                "lambda must be finite and non-negative, got {}",
                self.lambda
            )));
        }
        if !self.unbalance_penalty.is_finite() {
            return Err(FitError::InvalidValue(format!(
                "unbalance_penalty must be finite, got {}",
                self.unbalance_penalty
            )));
        }
        if self.n_threads == 0 {
            return Err(FitError::InvalidValue(
                "n_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TreeParams {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SplitNode {
    pub feature_id: usize,
    /// Records with `feature < threshold` go left.
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
    /// Number of training records in the node.
    pub n_obs: usize,
    /// Loss of the split, the sum of the losses of both children.
    pub loss: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeafNode {
    /// One coefficient per bridge feature, already multiplied by the learning rate.
    pub weight: Vec<f64>,
    pub n_obs: usize,
    /// Loss of the node without split, when a search was run on it.
    pub loss: Option<f64>,
    /// The node could have been split, but no column had two distinct values.
    pub no_split: bool,
    /// Training records that reached the leaf.
    pub record_ids: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum TreeNode {
    Split(SplitNode),
    Leaf(LeafNode),
}

/// A tree stored as an array of nodes, the root at index 0.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    n_inter: usize,
    n_extra: usize,
    /// Monitored losses after the stage that built this tree.
    pub(crate) learning_curve: Vec<f64>,
}

/// Immutable state of a tree build.
struct TreeBuilder<'a> {
    params: &'a TreeParams,
    loss: LossKind,
    /// Multiplies the leaf weights
    scale: f64,
    dispatcher: &'a ColumnDispatcher,
}

impl<'a> TreeBuilder<'a> {
    /// Build the subtree of `matrix` and return the index of its root.
    ///
    /// `inherited` is the step computed for this node by its parent's split, `None` at the root.
    fn build_node(
        &self,
        nodes: &mut Vec<TreeNode>,
        matrix: &FeatureMatrix,
        bias: Option<&[f64]>,
        inherited: Option<Vec<f64>>,
        depth: usize,
    ) -> FitResult<usize> {
        let n_rows = matrix.n_rows();
        let is_root = inherited.is_none();
        let should_split =
            depth < self.params.max_depth && (is_root || n_rows > self.params.min_rows);

        let source = StatisticsSource::new(matrix, bias, self.loss, self.params.lambda);
        let mut no_split = None;
        if should_split {
            let search =
                self.dispatcher
                    .search(matrix, &source, self.params.unbalance_penalty)?;
            if let Some(split) = search.best {
                debug!(
                    "Split on f_{} < {} with loss {:.6}, {} rows -> {} + {}",
                    split.feature_id,
                    split.threshold,
                    split.loss,
                    n_rows,
                    split.n_left,
                    split.n_right
                );
                let node_id = nodes.len();
                nodes.push(TreeNode::Split(SplitNode {
                    feature_id: split.feature_id,
                    threshold: split.threshold,
                    left: 0,
                    right: 0,
                    n_obs: n_rows,
                    loss: split.loss,
                }));

                let left_mask: Vec<bool> = matrix
                    .inter
                    .column(split.feature_id)
                    .iter()
                    .map(|&val| val < split.threshold)
                    .collect();
                let right_mask: Vec<bool> = left_mask.iter().map(|&left| !left).collect();

                let left_bias = bias.map(|bias| select(bias, &left_mask));
                let left = self.build_node(
                    nodes,
                    &matrix.slice(&left_mask)?,
                    left_bias.as_deref(),
                    Some(split.left_weight),
                    depth + 1,
                )?;
                let right_bias = bias.map(|bias| select(bias, &right_mask));
                let right = self.build_node(
                    nodes,
                    &matrix.slice(&right_mask)?,
                    right_bias.as_deref(),
                    Some(split.right_weight),
                    depth + 1,
                )?;

                match &mut nodes[node_id] {
                    TreeNode::Split(node) => {
                        node.left = left;
                        node.right = right;
                    }
                    TreeNode::Leaf(_) => unreachable!("{}", SHOULD_NOT_HAPPEN),
                }
                return Ok(node_id);
            }
            debug!("No valid split on {} rows", n_rows);
            no_split = Some(search.no_split);
        }

        let loss = no_split.as_ref().map(|stat| stat.loss);
        let weight = match (inherited, no_split) {
            (Some(weight), _) => weight,
            (None, Some(stat)) => stat.weight,
            (None, None) => source.whole_node()?.weight,
        };
        nodes.push(TreeNode::Leaf(LeafNode {
            weight: weight.iter().map(|w| w * self.scale).collect(),
            n_obs: n_rows,
            loss,
            no_split: should_split,
            record_ids: matrix.record_ids().to_vec(),
        }));
        Ok(nodes.len() - 1)
    }
}

impl Tree {
    /// Fit a tree on `matrix`, where `bias` is the current prediction of every record.
    ///
    /// The leaves are multiplied by `scale`, the learning rate for all but the first tree.
    pub(crate) fn build(
        matrix: &FeatureMatrix,
        bias: Option<&[f64]>,
        params: &TreeParams,
        loss: LossKind,
        scale: f64,
        dispatcher: &ColumnDispatcher,
    ) -> FitResult<Tree> {
        let builder = TreeBuilder {
            params,
            loss,
            scale,
            dispatcher,
        };
        let mut nodes = Vec::new();
        builder.build_node(&mut nodes, matrix, bias, None, 0)?;
        Ok(Tree {
            nodes,
            n_inter: matrix.n_inter(),
            n_extra: matrix.n_extra(),
            learning_curve: Vec::new(),
        })
    }

    /// Fit a single tree with the given loss, without learning rate.
    pub fn fit(matrix: &FeatureMatrix, params: &TreeParams, loss: LossKind) -> FitResult<Tree> {
        params.validate()?;
        let dispatcher = ColumnDispatcher::new(params.n_threads)?;
        Tree::build(matrix, None, params, loss, 1., &dispatcher)
    }

    fn leaf_of(&self, inter: &ColumnMajorMatrix<f64>, row: usize) -> FitResult<&LeafNode> {
        let mut node_id = 0;
        // A deserialized tree could contain a cycle
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(node_id) {
                Some(TreeNode::Split(node)) => {
                    node_id = if inter[(row, node.feature_id)] < node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                }
                Some(TreeNode::Leaf(leaf)) => return Ok(leaf),
                None => {
                    return Err(FitError::InvalidModel(format!(
                        "node {} does not exist",
                        node_id
                    )))
                }
            }
        }
        Err(FitError::InvalidModel("the tree has a cycle".to_string()))
    }

    fn check_inter(&self, inter: &ColumnMajorMatrix<f64>) -> FitResult<()> {
        if self.nodes.is_empty() {
            return Err(FitError::InvalidModel("empty tree".to_string()));
        }
        if inter.n_cols() != self.n_inter {
            return Err(FitError::ShapeMismatch(format!(
                "{} interpolating features for a tree trained with {}",
                inter.n_cols(),
                self.n_inter
            )));
        }
        Ok(())
    }

    /// Leaf weight vector reached by every record.
    pub fn predict_operator(&self, inter: &ColumnMajorMatrix<f64>) -> FitResult<Vec<&[f64]>> {
        self.check_inter(inter)?;
        (0..inter.n_rows())
            .map(|row| self.leaf_of(inter, row).map(|leaf| leaf.weight.as_slice()))
            .collect()
    }

    /// Contribution of the tree to the prediction of every record.
    pub fn predict(
        &self,
        inter: &ColumnMajorMatrix<f64>,
        extra: &ColumnMajorMatrix<f64>,
    ) -> FitResult<Vec<f64>> {
        if extra.n_cols() != self.n_extra {
            return Err(FitError::ShapeMismatch(format!(
                "{} bridge features for a tree trained with {}",
                extra.n_cols(),
                self.n_extra
            )));
        }
        if extra.n_rows() != inter.n_rows() {
            return Err(FitError::ShapeMismatch(format!(
                "{} rows of bridge features for {} rows of interpolating features",
                extra.n_rows(),
                inter.n_rows()
            )));
        }
        let operators = self.predict_operator(inter)?;
        if operators.iter().any(|weight| weight.len() != self.n_extra) {
            return Err(FitError::InvalidModel(
                "a leaf has the wrong number of coefficients".to_string(),
            ));
        }
        Ok(operators
            .iter()
            .enumerate()
            .map(|(row, weight)| {
                weight
                    .iter()
                    .zip(extra.row(row).iter())
                    .map(|(w, e)| w * e)
                    .sum::<f64>()
            })
            .collect())
    }

    /// Text description of a node, for rendering the tree.
    pub fn describe_node(&self, node_id: usize) -> Option<String> {
        let description = match self.nodes.get(node_id)? {
            TreeNode::Split(node) => format!(
                "#{}\nid: {}\nloss: {}\nf_{} < {:.5}",
                node.n_obs, node_id, node.loss, node.feature_id, node.threshold
            ),
            TreeNode::Leaf(leaf) => {
                let weight = leaf.weight.iter().map(|w| format!("{:.2}", w)).join(", ");
                let mut description = format!("#{}\nid: {}\n[{}]", leaf.n_obs, node_id, weight);
                if leaf.no_split {
                    description.push_str("\nNoSplit");
                }
                description
            }
        };
        Some(description)
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf(_)))
            .count()
    }

    /// Number of splits from the root to the deepest leaf.
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[TreeNode], node_id: usize, budget: usize) -> usize {
            match nodes.get(node_id) {
                Some(TreeNode::Split(node)) if budget > 0 => {
                    1 + depth_of(nodes, node.left, budget - 1)
                        .max(depth_of(nodes, node.right, budget - 1))
                }
                _ => 0,
            }
        }
        depth_of(&self.nodes, 0, self.nodes.len())
    }

    pub fn n_inter(&self) -> usize {
        self.n_inter
    }

    pub fn n_extra(&self) -> usize {
        self.n_extra
    }

    pub fn learning_curve(&self) -> &[f64] {
        &self.learning_curve
    }
}
