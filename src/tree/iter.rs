use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::id::SphereId;
use crate::node::NodeHeader;
use crate::page::DataPage;
use crate::tree::core::TreeCore;
use std::sync::Arc;

/// A TreeIterator walks the tree depth-first and yields every DataPage
/// exactly once.
///
/// Construction captures the tree's last transaction id. Unless the iterator
/// was built in permissive mode, a tree mutation observed between `next`
/// calls fails the iteration with a concurrent-modification error.
pub struct TreeIterator<K, V> {
    core: Arc<TreeCore<K, V>>,
    expected_tree_id: Option<SphereId>,
    prevent_mutation: bool,
    nodes_to_traverse: Vec<NodeHeader<K>>,
}

impl<K: Clone, V: Clone> TreeIterator<K, V> {
    pub(crate) fn new(core: Arc<TreeCore<K, V>>, prevent_mutation: bool) -> SphereResult<Self> {
        let expected_tree_id = core.last_transaction_id();
        let mut nodes_to_traverse = Vec::new();
        if let Some(root) = core.root_node()? {
            nodes_to_traverse.push(root);
        }
        Ok(TreeIterator {
            core,
            expected_tree_id,
            prevent_mutation,
            nodes_to_traverse,
        })
    }

    fn detect_mutation(&self) -> SphereResult<()> {
        if self.prevent_mutation && self.expected_tree_id != self.core.last_transaction_id() {
            return Err(SphereError::new(
                "The tree has changed underneath this iterator",
                ErrorKind::ConcurrentModification,
            ));
        }
        Ok(())
    }

    fn find_next_page(&mut self) -> SphereResult<Option<DataPage<K, V>>> {
        while let Some(top) = self.nodes_to_traverse.pop() {
            if top.is_leaf() {
                match self.core.data_page_at(top.id())? {
                    Some(page) => return Ok(Some(page)),
                    // in permissive mode a leaf can vanish mid-iteration
                    // (the view is weakly consistent); skip it
                    None if !self.prevent_mutation => continue,
                    None => {
                        return Err(SphereError::new(
                            &format!("Leaf {} has no DataPage", top.id()),
                            ErrorKind::Invariant,
                        ))
                    }
                }
            }
            self.nodes_to_traverse
                .extend(self.core.nodes_below(top.id())?);
        }
        Ok(None)
    }
}

impl<K: Clone, V: Clone> Iterator for TreeIterator<K, V> {
    type Item = SphereResult<DataPage<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.nodes_to_traverse.is_empty() {
            return None;
        }
        if let Err(err) = self.detect_mutation() {
            return Some(Err(err));
        }
        match self.find_next_page() {
            Ok(Some(page)) => Some(Ok(page)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
