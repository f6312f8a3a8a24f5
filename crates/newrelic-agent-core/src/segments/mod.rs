//! Segments: the timed units of work recorded for one transaction.
//!
//! The tracer records segments as a flat list. At transaction end the list is
//! handed to [`build_segment_trees`], which rebuilds the call forest that the
//! transaction trace serializer walks.

pub mod tree_maker;

use std::time::Duration;

use serde_json::{Map, Value};

pub use tree_maker::build_segment_trees;

/// Parameter added to a merged segment, holding the number of calls it stands for.
pub const CALL_COUNT_PARAMETER: &str = "call_count";

#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub unique_id: u64,
    /// `None` for the root of a tree.
    pub parent_unique_id: Option<u64>,
    /// Offset from the start of the transaction.
    pub relative_start_time: Duration,
    pub duration: Duration,
    pub name: String,
    /// Only combinable segments are merged with identically named siblings.
    pub combinable: bool,
    /// Insertion ordered, key unique.
    pub parameters: Map<String, Value>,
}

impl Segment {
    #[must_use]
    pub fn new(
        unique_id: u64,
        name: impl Into<String>,
        relative_start_time: Duration,
        duration: Duration,
    ) -> Self {
        Segment {
            unique_id,
            parent_unique_id: None,
            relative_start_time,
            duration,
            name: name.into(),
            combinable: false,
            parameters: Map::new(),
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_unique_id: u64) -> Self {
        self.parent_unique_id = Some(parent_unique_id);
        self
    }

    #[must_use]
    pub fn with_combinable(mut self, combinable: bool) -> Self {
        self.combinable = combinable;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// True when both segments opted into merging and describe the same operation.
    #[must_use]
    pub fn is_combinable_with(&self, other: &Segment) -> bool {
        self.combinable && other.combinable && self.name == other.name
    }

    /// A copy with the same identity but new timing and parameters.
    #[must_use]
    pub fn create_similar(
        &self,
        relative_start_time: Duration,
        duration: Duration,
        parameters: Map<String, Value>,
    ) -> Self {
        Segment {
            unique_id: self.unique_id,
            parent_unique_id: self.parent_unique_id,
            relative_start_time,
            duration,
            name: self.name.clone(),
            combinable: self.combinable,
            parameters,
        }
    }

    #[must_use]
    pub fn end_time(&self) -> Duration {
        self.relative_start_time + self.duration
    }

    #[must_use]
    pub fn call_count(&self) -> Option<u64> {
        self.parameters
            .get(CALL_COUNT_PARAMETER)
            .and_then(Value::as_u64)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentTreeNode {
    pub segment: Segment,
    pub children: Vec<SegmentTreeNode>,
}

impl SegmentTreeNode {
    #[must_use]
    pub fn new(segment: Segment) -> Self {
        SegmentTreeNode {
            segment,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(&node.children);
        }
        count
    }
}

/// Frees descendants from a worklist so that dropping a deep tree does not
/// recurse once per level.
impl Drop for SegmentTreeNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}
