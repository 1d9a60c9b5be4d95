//! Ordering and flattening of a section's selected children.
//!
//! Invisible sections that do not keep their children together are spliced
//! into their parent before shuffling, so their children mix freely with
//! their siblings. Invisible sections that keep together are shuffled as
//! one entry and spliced afterwards.

use assay_core::assessment::{SectionNode, TestDefinition, TestNode};
use assay_core::random::{shuffle_unfixed, RandomSource};

use crate::tree::RuntimeNode;

/// Order already-assembled children and remove invisible sections.
pub fn order_children(
    children: Vec<RuntimeNode>,
    shuffle: bool,
    test: &TestDefinition,
    rng: &mut RandomSource,
) -> Vec<RuntimeNode> {
    let children = if shuffle {
        let loose = splice(children, test, |s| !s.visible && !s.keep_together);
        shuffle_unfixed(
            loose,
            |node| test.node(node.node()).is_some_and(TestNode::is_fixed),
            rng,
        )
    } else {
        children
    };
    flatten_invisible(children, test)
}

/// Replace every invisible section by its children, in place.
pub fn flatten_invisible(children: Vec<RuntimeNode>, test: &TestDefinition) -> Vec<RuntimeNode> {
    splice(children, test, |s| !s.visible)
}

fn splice(
    children: Vec<RuntimeNode>,
    test: &TestDefinition,
    predicate: impl Fn(&SectionNode) -> bool,
) -> Vec<RuntimeNode> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            RuntimeNode::Section(section)
                if test.section(section.node).is_some_and(&predicate) =>
            {
                out.extend(section.children)
            }
            other => out.push(other),
        }
    }
    out
}
