use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::segments::{Segment, SegmentTreeNode, CALL_COUNT_PARAMETER};

/// Rebuilds the call forest for one transaction from its flat segment list.
///
/// # Ordering
///
/// Roots and siblings keep the order in which they appear in `segments`. A
/// child may be listed before its parent.
///
/// # Merging
///
/// Runs of adjacent, combinable, same-named leaf siblings collapse into a
/// single node that keeps the first segment's identity, starts at the
/// earliest start time, lasts for the summed duration and carries a
/// [`CALL_COUNT_PARAMETER`] parameter with the number of merged segments.
///
/// # Malformed Input
///
/// - A segment whose parent id matches no segment in the list is a root.
/// - When ids are duplicated the first occurrence owns the id.
/// - Segments that cannot be reached from any root, such as members of a
///   parent cycle, are dropped and logged at debug.
///
/// Building uses an explicit work stack, so arbitrarily deep call chains are
/// handled without growing the thread stack.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use newrelic_agent_core::segments::{build_segment_trees, Segment};
///
/// let ms = Duration::from_millis;
/// let forest = build_segment_trees(vec![
///     Segment::new(1, "WebTransaction/MVC/Home/Index", ms(0), ms(50)),
///     Segment::new(2, "Datastore/users/select", ms(5), ms(10))
///         .with_parent(1)
///         .with_combinable(true),
///     Segment::new(3, "Datastore/users/select", ms(20), ms(10))
///         .with_parent(1)
///         .with_combinable(true),
/// ]);
///
/// assert_eq!(forest.len(), 1);
/// let query = &forest[0].children[0].segment;
/// assert_eq!(query.duration, ms(20));
/// assert_eq!(query.call_count(), Some(2));
/// ```
pub fn build_segment_trees<I>(segments: I) -> Vec<SegmentTreeNode>
where
    I: IntoIterator<Item = Segment>,
{
    let arena: Vec<Option<Segment>> = segments.into_iter().map(Some).collect();
    if arena.is_empty() {
        return Vec::new();
    }

    let mut positions: HashMap<u64, usize> = HashMap::with_capacity(arena.len());
    for (index, segment) in arena.iter().enumerate() {
        if let Some(segment) = segment {
            positions.entry(segment.unique_id).or_insert(index);
        }
    }

    let mut roots = Vec::new();
    let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
    for (index, segment) in arena.iter().enumerate() {
        let Some(segment) = segment else { continue };
        match segment.parent_unique_id {
            None => roots.push(index),
            Some(parent) if positions.contains_key(&parent) => {
                children.entry(parent).or_default().push(index);
            }
            Some(parent) => {
                debug!(
                    "Segment {} references unknown parent {}, treating it as a root",
                    segment.unique_id, parent
                );
                roots.push(index);
            }
        }
    }

    let mut builder = TreeBuilder { arena, children };
    let forest = builder.build_forest(roots);

    let unreached = builder.arena.iter().filter(|slot| slot.is_some()).count();
    if unreached > 0 {
        debug!("Dropped {unreached} segment(s) not reachable from any root segment");
    }

    forest
}

struct TreeBuilder {
    arena: Vec<Option<Segment>>,
    children: HashMap<u64, Vec<usize>>,
}

/// A node whose children are still being built.
struct Frame {
    segment: Segment,
    pending: std::vec::IntoIter<usize>,
    built: Vec<SegmentTreeNode>,
}

impl TreeBuilder {
    /// Depth-first, pre-order visit; each sibling list is combined once all of
    /// its members are complete.
    fn build_forest(&mut self, roots: Vec<usize>) -> Vec<SegmentTreeNode> {
        let mut forest = Vec::with_capacity(roots.len());
        let mut roots = roots.into_iter();
        let mut stack: Vec<Frame> = Vec::new();

        loop {
            let next = match stack.last_mut() {
                Some(frame) => frame.pending.next(),
                None => roots.next(),
            };

            if let Some(index) = next {
                // Each arena slot and each child group is consumed once.
                let Some(segment) = self.arena.get_mut(index).and_then(Option::take) else {
                    continue;
                };
                let child_indices = self
                    .children
                    .remove(&segment.unique_id)
                    .unwrap_or_default();
                stack.push(Frame {
                    segment,
                    built: Vec::with_capacity(child_indices.len()),
                    pending: child_indices.into_iter(),
                });
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            let node = SegmentTreeNode {
                segment: frame.segment,
                children: combine_siblings(frame.built),
            };
            match stack.last_mut() {
                Some(parent) => parent.built.push(node),
                None => forest.push(node),
            }
        }

        combine_siblings(forest)
    }
}

fn combine_siblings(nodes: Vec<SegmentTreeNode>) -> Vec<SegmentTreeNode> {
    let mut combined = Vec::with_capacity(nodes.len());
    let mut run: Option<MergeRun> = None;

    for node in nodes {
        if let Some(current) = run.as_mut() {
            if current.accepts(&node) {
                current.rest.push(node);
                continue;
            }
        }
        if let Some(finished) = run.take() {
            combined.push(finished.into_node());
        }
        if node.is_leaf() && node.segment.combinable {
            run = Some(MergeRun {
                first: node,
                rest: Vec::new(),
            });
        } else {
            combined.push(node);
        }
    }

    if let Some(finished) = run {
        combined.push(finished.into_node());
    }
    combined
}

struct MergeRun {
    first: SegmentTreeNode,
    rest: Vec<SegmentTreeNode>,
}

impl MergeRun {
    fn accepts(&self, node: &SegmentTreeNode) -> bool {
        node.is_leaf() && self.first.segment.is_combinable_with(&node.segment)
    }

    fn into_node(self) -> SegmentTreeNode {
        if self.rest.is_empty() {
            return self.first;
        }

        let first = &self.first.segment;
        let call_count = self.rest.len() + 1;
        let start = self
            .rest
            .iter()
            .map(|node| node.segment.relative_start_time)
            .fold(first.relative_start_time, Duration::min);
        let duration = self
            .rest
            .iter()
            .map(|node| node.segment.duration)
            .fold(first.duration, Duration::saturating_add);

        let mut parameters = first.parameters.clone();
        parameters.insert(CALL_COUNT_PARAMETER.to_string(), Value::from(call_count));

        SegmentTreeNode::new(first.create_similar(start, duration, parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn segment(id: u64, parent: Option<u64>, name: &str) -> Segment {
        let segment = Segment::new(id, name, Duration::ZERO, Duration::ZERO);
        match parent {
            Some(parent) => segment.with_parent(parent),
            None => segment,
        }
    }

    fn timed(id: u64, parent: u64, name: &str, start: u64, duration: u64) -> Segment {
        Segment::new(
            id,
            name,
            Duration::from_secs(start),
            Duration::from_secs(duration),
        )
        .with_parent(parent)
        .with_combinable(true)
    }

    fn ids(nodes: &[SegmentTreeNode]) -> Vec<u64> {
        nodes.iter().map(|node| node.segment.unique_id).collect()
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        assert!(build_segment_trees(Vec::new()).is_empty());
    }

    #[test]
    fn single_root_without_children() {
        let forest = build_segment_trees(vec![segment(1, None, "root")]);
        assert_eq!(ids(&forest), [1]);
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn nested_chain() {
        let forest = build_segment_trees(vec![
            segment(1, None, "a"),
            segment(2, Some(1), "b"),
            segment(3, Some(2), "c"),
        ]);

        assert_eq!(ids(&forest), [1]);
        assert_eq!(ids(&forest[0].children), [2]);
        assert_eq!(ids(&forest[0].children[0].children), [3]);
        assert!(forest[0].children[0].children[0].children.is_empty());
    }

    #[test]
    fn children_listed_before_parent_are_attached() {
        let forest = build_segment_trees(vec![
            segment(3, Some(2), "c"),
            segment(2, Some(1), "b"),
            segment(1, None, "a"),
        ]);

        assert_eq!(ids(&forest), [1]);
        assert_eq!(forest[0].node_count(), 3);
    }

    #[test]
    fn roots_and_siblings_keep_first_seen_order() {
        let forest = build_segment_trees(vec![
            segment(10, None, "second root"),
            segment(4, Some(10), "x"),
            segment(1, None, "first root"),
            segment(9, Some(10), "y"),
            segment(2, Some(10), "z"),
        ]);

        assert_eq!(ids(&forest), [10, 1]);
        assert_eq!(ids(&forest[0].children), [4, 9, 2]);
    }

    #[test]
    fn combines_adjacent_identical_siblings() {
        let forest = build_segment_trees(vec![
            segment(1, None, "foo"),
            timed(2, 1, "bar", 1, 1),
            timed(3, 1, "bar", 5, 2),
        ]);

        let children = &forest[0].children;
        assert_eq!(children.len(), 1);
        let merged = &children[0].segment;
        assert_eq!(merged.unique_id, 2);
        assert_eq!(merged.name, "bar");
        assert_eq!(merged.relative_start_time, Duration::from_secs(1));
        assert_eq!(merged.duration, Duration::from_secs(3));
        assert_eq!(merged.parameters[CALL_COUNT_PARAMETER], Value::from(2));
    }

    #[test]
    fn merged_start_is_earliest_even_when_out_of_order() {
        let forest = build_segment_trees(vec![
            segment(1, None, "foo"),
            timed(2, 1, "bar", 5, 2),
            timed(3, 1, "bar", 1, 1),
            timed(4, 1, "bar", 3, 4),
        ]);

        let merged = &forest[0].children[0].segment;
        assert_eq!(merged.unique_id, 2);
        assert_eq!(merged.relative_start_time, Duration::from_secs(1));
        assert_eq!(merged.duration, Duration::from_secs(7));
        assert_eq!(merged.call_count(), Some(3));
    }

    #[test]
    fn does_not_combine_non_adjacent_siblings() {
        let forest = build_segment_trees(vec![
            segment(1, None, "foo"),
            timed(2, 1, "bar", 1, 1),
            timed(3, 1, "zip", 3, 1),
            timed(4, 1, "bar", 5, 2),
        ]);

        let children = &forest[0].children;
        assert_eq!(ids(children), [2, 3, 4]);
        assert!(children
            .iter()
            .all(|child| !child.segment.parameters.contains_key(CALL_COUNT_PARAMETER)));
    }

    #[test]
    fn does_not_combine_non_combinable_siblings() {
        let forest = build_segment_trees(vec![
            segment(1, None, "foo"),
            timed(2, 1, "bar", 1, 1).with_combinable(false),
            timed(3, 1, "bar", 5, 2).with_combinable(false),
        ]);

        assert_eq!(ids(&forest[0].children), [2, 3]);
    }

    #[test]
    fn does_not_combine_when_only_one_side_is_combinable() {
        let forest = build_segment_trees(vec![
            segment(1, None, "foo"),
            timed(2, 1, "bar", 1, 1),
            timed(3, 1, "bar", 5, 2).with_combinable(false),
            timed(4, 1, "bar", 8, 2),
        ]);

        assert_eq!(ids(&forest[0].children), [2, 3, 4]);
    }

    #[test]
    fn does_not_combine_siblings_with_children() {
        let forest = build_segment_trees(vec![
            segment(1, None, "foo"),
            timed(2, 1, "bar", 1, 1),
            timed(3, 1, "bar", 5, 2),
            segment(4, Some(3), "inner"),
        ]);

        let children = &forest[0].children;
        assert_eq!(ids(children), [2, 3]);
        assert_eq!(ids(&children[1].children), [4]);
    }

    #[test]
    fn combines_at_root_and_nested_levels() {
        let forest = build_segment_trees(vec![
            Segment::new(1, "poll", Duration::ZERO, Duration::from_secs(1)).with_combinable(true),
            Segment::new(2, "poll", Duration::from_secs(1), Duration::from_secs(1))
                .with_combinable(true),
            segment(3, None, "work"),
            timed(4, 3, "query", 2, 1),
            timed(5, 3, "query", 3, 1),
        ]);

        assert_eq!(ids(&forest), [1, 3]);
        assert_eq!(forest[0].segment.call_count(), Some(2));
        assert_eq!(ids(&forest[1].children), [4]);
        assert_eq!(forest[1].children[0].segment.call_count(), Some(2));
    }

    #[test]
    fn existing_parameters_are_kept_on_merge() {
        let forest = build_segment_trees(vec![
            segment(1, None, "foo"),
            timed(2, 1, "bar", 1, 1).with_parameter("sql", "select 1"),
            timed(3, 1, "bar", 2, 1).with_parameter("sql", "select 2"),
        ]);

        let merged = &forest[0].children[0].segment;
        assert_eq!(merged.parameters["sql"], Value::from("select 1"));
        let keys: Vec<&String> = merged.parameters.keys().collect();
        assert_eq!(keys, ["sql", CALL_COUNT_PARAMETER]);
    }

    #[test]
    #[traced_test]
    fn unknown_parent_becomes_root() {
        let forest = build_segment_trees(vec![
            segment(1, None, "root"),
            segment(2, Some(42), "orphan"),
            segment(3, Some(2), "orphan child"),
        ]);

        assert_eq!(ids(&forest), [1, 2]);
        assert_eq!(ids(&forest[1].children), [3]);
        assert!(logs_contain("references unknown parent 42"));
    }

    #[test]
    #[traced_test]
    fn parent_cycles_are_dropped_without_looping() {
        let forest = build_segment_trees(vec![
            segment(1, None, "root"),
            segment(2, Some(3), "a"),
            segment(3, Some(2), "b"),
            segment(4, Some(4), "self"),
        ]);

        assert_eq!(ids(&forest), [1]);
        assert!(forest[0].children.is_empty());
        assert!(logs_contain("Dropped 3 segment(s)"));
    }

    #[test]
    fn duplicate_ids_do_not_loop() {
        let forest = build_segment_trees(vec![
            segment(1, None, "root"),
            segment(1, Some(1), "duplicate"),
            segment(2, Some(1), "child"),
        ]);

        assert_eq!(ids(&forest), [1]);
        let children = &forest[0].children;
        assert_eq!(ids(children), [1, 2]);
        assert!(children[0].children.is_empty());
    }

    #[test]
    fn deep_chain_is_built_without_exhausting_the_stack() {
        const DEPTH: u64 = 150_000;
        let chain = (0..DEPTH).map(|id| {
            let parent = id.checked_sub(1);
            segment(id, parent, "nested")
        });

        let forest = build_segment_trees(chain);

        assert_eq!(ids(&forest), [0]);
        assert_eq!(forest[0].node_count(), usize::try_from(DEPTH).unwrap());

        let mut depth = 1;
        let mut node = &forest[0];
        while let Some(child) = node.children.first() {
            assert_eq!(node.children.len(), 1);
            assert_eq!(child.segment.unique_id, node.segment.unique_id + 1);
            node = child;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
    }

    #[test]
    fn deep_chain_listed_leaf_first_merges_at_the_bottom() {
        let mut chain: Vec<Segment> = (1..50_000)
            .map(|id| segment(id, Some(id - 1), "nested"))
            .collect();
        chain.push(segment(0, None, "root"));
        chain.push(timed(50_001, 49_999, "query", 2, 1));
        chain.push(timed(50_000, 49_999, "query", 1, 1));
        chain.reverse();

        let forest = build_segment_trees(chain);

        let mut node = &forest[0];
        while node.children.len() == 1 && !node.children[0].is_leaf() {
            node = &node.children[0];
        }
        assert_eq!(node.segment.unique_id, 49_999);
        assert_eq!(ids(&node.children), [50_000]);
        assert_eq!(node.children[0].segment.call_count(), Some(2));
    }
}
