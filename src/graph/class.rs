use indexmap::{IndexMap, IndexSet};

use crate::{
    graph::node::{ENode, Operator},
    group::PermGroup,
    slot::SlotSet,
    slotmap::SlotMap,
};

/// Everything the engine records about one canonical class.
///
/// `nodes` maps each member shape to the renaming that places the shape's
/// labels into the class's own frame: parameter slots where the class
/// exposes the position, fresh *redundant* slots where it does not.
/// `users` holds the shapes of nodes in other classes (or this one, for
/// cycles) that take this class as an argument; it is what upward merging
/// walks.
#[derive(Debug, Clone)]
pub struct EClass<Op> {
    /// The parameter slots visible to callers.
    pub slots: SlotSet,
    /// Member shapes and their shape-to-class renamings.
    pub nodes: IndexMap<ENode<Op>, SlotMap>,
    /// The discovered symmetries of `slots`.
    pub group: PermGroup,
    /// Shapes that reference this class as an argument.
    pub users: IndexSet<ENode<Op>>,
}

impl<Op: Operator> EClass<Op> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Member shapes, without their renamings.
    pub fn iter(&self) -> impl Iterator<Item = &ENode<Op>> {
        self.nodes.keys()
    }
}
