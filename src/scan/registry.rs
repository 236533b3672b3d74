use std::collections::HashSet;

use crate::document::NodeId;

/// Write-once set of blocks the pipeline has already visited.
///
/// Node ids are never reused within a document, so an entry stays valid for
/// the document's lifetime and is never removed.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    processed: HashSet<NodeId>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `block` processed. Returns `false` if it already was.
    pub fn mark(&mut self, block: NodeId) -> bool {
        self.processed.insert(block)
    }

    pub fn is_processed(&self, block: NodeId) -> bool {
        self.processed.contains(&block)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
