use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};

use crate::{
    error::Result,
    graph::{class::EClass, Canonical, ClassCall, EGraph, ENode, Operator},
    group::PermGroup,
    parallel::ParallelMap,
    slotmap::SlotMap,
    tree::MixedTree,
};

/// What came back for one inserted node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddResponse {
    /// The node created a fresh class; the call instantiates it with the
    /// node's own slots.
    Added(ClassCall),
    /// The node was already represented.
    AlreadyThere(ClassCall),
}

impl AddResponse {
    pub fn call(&self) -> &ClassCall {
        match self {
            AddResponse::Added(c) | AddResponse::AlreadyThere(c) => c,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, AddResponse::Added(_))
    }
}

impl<Op: Operator> EGraph<Op> {
    /// Inserts a batch of nodes.
    ///
    /// Each node's arguments must reference classes already present. The
    /// batch is set-semantic: duplicates are idempotent and the response
    /// order matches the input order. Canonicalization of the individual
    /// nodes is pure against the pre-operation state and runs through
    /// `parallel`; cancellation is polled there, before any mutation, so a
    /// `Canceled` return leaves the engine untouched.
    pub fn try_add_many(
        &mut self,
        nodes: &[ENode<Op>],
        parallel: &ParallelMap,
    ) -> Result<Vec<AddResponse>> {
        let canon = {
            let graph = &*self;
            parallel
                .child("add")
                .apply(nodes, |n| graph.canonical_parts(n))?
                .into_iter()
                .collect::<Result<Vec<_>>>()?
        };

        let mut out = Vec::with_capacity(canon.len());
        for parts in canon {
            out.push(self.insert_canonical(parts));
        }
        debug!(
            "added {} nodes, {} new",
            out.len(),
            out.iter().filter(|r| r.is_new()).count()
        );

        #[cfg(debug_assertions)]
        self.check_invariants();
        Ok(out)
    }

    /// [`try_add_many`](Self::try_add_many) on a functional receiver: the
    /// engine itself is untouched and a new one is returned.
    pub fn with_added_many(
        &self,
        nodes: &[ENode<Op>],
        parallel: &ParallelMap,
    ) -> Result<(Self, Vec<AddResponse>)> {
        let mut next = self.clone();
        let out = next.try_add_many(nodes, parallel)?;
        Ok((next, out))
    }

    /// Inserts a single node.
    pub fn add(&mut self, node: ENode<Op>) -> Result<ClassCall> {
        let out = self.try_add_many(std::slice::from_ref(&node), &ParallelMap::sequential())?;
        Ok(out.into_iter().next().unwrap().call().clone())
    }

    /// Inserts a term bottom-up: subtrees first, then the node over the
    /// resulting calls. Atoms are calls into the existing graph.
    pub fn add_tree(&mut self, tree: &MixedTree<Op, ClassCall>) -> Result<ClassCall> {
        match tree {
            MixedTree::Atom(call) => {
                let canon = self
                    .canonicalize_call(call)
                    .ok_or(crate::error::Error::NotPresent(call.id))?;
                Ok(canon)
            }
            MixedTree::Node {
                op,
                defs,
                uses,
                children,
            } => {
                let mut args = Vec::with_capacity(children.len());
                for child in children {
                    args.push(self.add_tree(child)?);
                }
                let node = ENode {
                    op: op.clone(),
                    defs: defs.clone(),
                    uses: uses.clone(),
                    args: args.into_iter().collect(),
                };
                self.add(node)
            }
        }
    }

    fn insert_canonical(&mut self, parts: Canonical<Op>) -> AddResponse {
        if let Some(&id) = self.hashcons.get(&parts.shape) {
            let row = self.classes[&id].nodes[&parts.shape].clone();
            trace!("hit {:?} in {id}", parts.shape);
            return AddResponse::AlreadyThere(self.recover_call(id, &row, &parts.renaming));
        }

        // fresh class: expose the shape's non-binder slots as parameters
        let free = parts.shape.slots();
        let row = SlotMap::fresh_for(&free);
        let slots = row.value_set();
        let id = self.unionfind.add(&slots);

        // the node's self-symmetries become symmetries of the class where
        // they stay inside the parameter frame
        let call = ClassCall::new(
            id,
            row.inverse().unwrap().compose(&parts.renaming).unwrap(),
        );
        let back = call.args.inverse().unwrap();
        let perms = parts.syms.iter().filter_map(|phi| {
            let pi = call.args.compose_partial(phi).compose_partial(&back);
            (pi.key_set() == slots && pi.is_permutation()).then_some(pi)
        });
        let group = PermGroup::new(slots.clone(), perms);

        let mut nodes = IndexMap::new();
        nodes.insert(parts.shape.clone(), row);
        self.classes.insert(
            id,
            EClass {
                slots,
                nodes,
                group,
                users: IndexSet::new(),
            },
        );
        self.hashcons.insert(parts.shape.clone(), id);
        for arg in &parts.shape.args {
            if let Some(class) = self.classes.get_mut(&arg.id) {
                class.users.insert(parts.shape.clone());
            }
        }
        trace!("new class {id} for {:?}", parts.shape);
        AddResponse::Added(call)
    }
}
