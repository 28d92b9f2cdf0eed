use crate::errors::{ErrorKind, SphereError, SphereResult};

/// Statistics describing how well-balanced (or not) a tree is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeStats {
    num_tuples: usize,
    num_leaf_nodes: usize,
    num_inner_nodes: usize,
    mean_page_radius: f64,
    std_dev_page_radius: f64,
}

impl TreeStats {
    pub(crate) fn new(
        num_tuples: usize,
        num_leaf_nodes: usize,
        num_inner_nodes: usize,
        mean_page_radius: f64,
        std_dev_page_radius: f64,
    ) -> SphereResult<TreeStats> {
        if num_tuples == 0 || num_leaf_nodes == 0 || num_inner_nodes == 0 {
            return Err(SphereError::new(
                "Tree statistics require a non-empty tree",
                ErrorKind::State,
            ));
        }
        if mean_page_radius < 0.0 || std_dev_page_radius < 0.0 {
            return Err(SphereError::new(
                "Radius statistics cannot be negative",
                ErrorKind::Invariant,
            ));
        }
        Ok(TreeStats {
            num_tuples,
            num_leaf_nodes,
            num_inner_nodes,
            mean_page_radius,
            std_dev_page_radius,
        })
    }

    /// The number of key/value pairs in the tree.
    pub fn num_tuples(&self) -> usize {
        self.num_tuples
    }

    /// The number of leaf nodes (i.e. DataPages) in the tree.
    pub fn num_leaf_nodes(&self) -> usize {
        self.num_leaf_nodes
    }

    pub fn num_inner_nodes(&self) -> usize {
        self.num_inner_nodes
    }

    /// The total number of nodes (leaves + inner nodes).
    pub fn num_nodes(&self) -> usize {
        self.num_leaf_nodes + self.num_inner_nodes
    }

    /// The average radius of all leaf nodes.
    pub fn mean_page_radius(&self) -> f64 {
        self.mean_page_radius
    }

    /// The sample standard deviation of leaf radii (0 when there is exactly
    /// one leaf).
    pub fn std_dev_page_radius(&self) -> f64 {
        self.std_dev_page_radius
    }

    /// The fraction of all nodes that are leaves. Perfectly balanced trees
    /// maximize this.
    pub fn leaf_node_fraction(&self) -> f64 {
        self.num_leaf_nodes as f64 / self.num_nodes() as f64
    }

    /// Leaves per inner node. Close to the branching factor when the tree is
    /// well balanced.
    pub fn leaves_per_inner_node(&self) -> f64 {
        self.num_leaf_nodes as f64 / self.num_inner_nodes as f64
    }
}

impl std::fmt::Display for TreeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "size: {}", self.num_tuples)?;
        writeln!(f, "number of nodes: {}", self.num_nodes())?;
        writeln!(f, "number of leaf nodes: {}", self.num_leaf_nodes)?;
        writeln!(f, "number of inner nodes: {}", self.num_inner_nodes)?;
        writeln!(f, "leaf node fraction: {}", self.leaf_node_fraction())?;
        writeln!(f, "mean of leaf node radius: {}", self.mean_page_radius)?;
        writeln!(
            f,
            "standard dev of leaf node radius: {}",
            self.std_dev_page_radius
        )
    }
}
