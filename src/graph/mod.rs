/*!
The slotted e-graph engine.

An [`EGraph`] stores equivalence classes of terms whose nodes may bind and
use α-equivalent variables ([`Slot`](crate::Slot)s). Nodes are deduplicated by
hash-consing their canonical *shapes*: the node with its arguments resolved
through the union-find, the cheapest symmetry variant chosen, and its slots
relabeled in first-occurrence order. Classes are referenced through
[`ClassCall`]s that say which caller slot plays each class parameter, so two
terms that differ only in variable names land in the same class with
different calls.

The write API is batched: [`try_add_many`](EGraph::try_add_many) inserts a
set of nodes and [`union_many`](EGraph::union_many) merges a set of class
pairs, restoring every invariant before returning. Between batches the read
API is always consistent.
*/

mod add;
mod class;
mod meta;
mod node;
mod union;

#[cfg(test)]
mod tests;

pub use add::AddResponse;
pub use class::EClass;
pub use meta::{AddedNode, MetaGraph, Metadata};
pub use node::{ClassCall, ClassId, ENode, Operator, ShapeCall};

use std::fmt::{self, Debug, Formatter};

use indexmap::IndexMap;

use crate::{
    error::{Error, Result},
    group::PermGroup,
    slot::SlotSet,
    slotmap::SlotMap,
    unionfind::UnionFind,
    utils::HashMap,
};

/** A slotted e-graph.

Three tables make up the state:

- the **union-find** maps every class ever allocated to the call it has
  been merged into, with a renaming on each edge so that stale references
  keep translating correctly no matter how many merges and slot
  eliminations happened since they were handed out;
- the **class table** holds one record per canonical class: its parameter
  slots, its member shapes (each with a renaming into the class frame),
  the permutation group discovered on its parameters, and the shapes that
  use it as an argument;
- the **hash-cons** maps each canonical shape to the class that owns it,
  which is what makes insertion of an α-equivalent duplicate a lookup
  instead of an allocation.

A union batch can cascade: merging two classes re-canonicalizes their
users, which can collide in the hash-cons and force parent merges
(upward merging), reveal that a parameter is unused and shrink a class,
or uncover a permutation of a class's parameters. The worklist in
[`union_many`](EGraph::union_many) drains all of it before returning, so
between calls every read is consistent.

The engine owns all of its state; mutation requires exclusive access,
reads may run concurrently with reads. For a functional surface that
leaves the receiver untouched see
[`with_added_many`](EGraph::with_added_many) and
[`with_unioned_many`](EGraph::with_unioned_many).
**/
#[derive(Clone)]
pub struct EGraph<Op: Operator> {
    pub(crate) unionfind: UnionFind,
    pub(crate) classes: IndexMap<ClassId, EClass<Op>>,
    pub(crate) hashcons: HashMap<ENode<Op>, ClassId>,
}

impl<Op: Operator> Default for EGraph<Op> {
    fn default() -> Self {
        Self::new()
    }
}

/// The outcome of canonicalizing one node: its shape, the renaming from the
/// shape's labels back into the node's frame, and the self-symmetries the
/// variant enumeration turned up (as permutations of the node's own slots).
pub(crate) struct Canonical<Op> {
    pub shape: ENode<Op>,
    pub renaming: SlotMap,
    pub syms: Vec<SlotMap>,
}

impl<Op: Operator> EGraph<Op> {
    pub fn new() -> Self {
        EGraph {
            unionfind: UnionFind::new(),
            classes: IndexMap::new(),
            hashcons: HashMap::default(),
        }
    }

    /// A fresh engine of the same configuration.
    pub fn emptied(&self) -> Self {
        Self::new()
    }

    /// The number of canonical classes.
    pub fn number_of_classes(&self) -> usize {
        self.classes.len()
    }

    /// The number of e-nodes summed over all classes.
    pub fn total_number_of_nodes(&self) -> usize {
        self.classes.values().map(|c| c.len()).sum()
    }

    /// The size of the hash-cons table.
    pub fn total_size(&self) -> usize {
        self.hashcons.len()
    }

    /// Iterates over the canonical class identifiers.
    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.keys().copied()
    }

    /// The record of a canonical class.
    pub fn class(&self, id: ClassId) -> Result<&EClass<Op>> {
        if !self.unionfind.contains(id) {
            return Err(Error::NotPresent(id));
        }
        self.classes.get(&id).ok_or(Error::EmptyClassLookup(id))
    }

    /// The shapes that reference `id` as an argument.
    pub fn users(&self, id: ClassId) -> Result<impl Iterator<Item = &ENode<Op>>> {
        Ok(self.class(id)?.users.iter())
    }

    /// The canonical call of a class reference.
    pub fn canonicalize(&self, id: ClassId) -> Option<ClassCall> {
        self.unionfind.find(id)
    }

    /// The canonical call denoting the same instantiation as `call`.
    pub fn canonicalize_call(&self, call: &ClassCall) -> Option<ClassCall> {
        self.unionfind.find_call(call)
    }

    /// Canonicalizes a node without inserting it.
    pub fn canonical_shape(&self, node: &ENode<Op>) -> Result<ShapeCall<Op>> {
        let parts = self.canonical_parts(node)?;
        Ok(ShapeCall {
            shape: parts.shape,
            renaming: parts.renaming,
        })
    }

    /// Looks a node up, returning the call under which its class denotes it.
    pub fn lookup(&self, node: &ENode<Op>) -> Option<ClassCall> {
        let parts = self.canonical_parts(node).ok()?;
        let id = *self.hashcons.get(&parts.shape)?;
        let row = self.classes.get(&id)?.nodes.get(&parts.shape)?;
        Some(self.recover_call(id, row, &parts.renaming))
    }

    /// The e-nodes of a class, translated into the caller's frame. Slots a
    /// node mentions beyond the class's parameters come back as fresh slots.
    pub fn enodes(&self, call: &ClassCall) -> Result<Vec<ENode<Op>>> {
        let canon = self
            .unionfind
            .find_call(call)
            .ok_or(Error::NotPresent(call.id))?;
        let class = self
            .classes
            .get(&canon.id)
            .ok_or(Error::EmptyClassLookup(canon.id))?;
        Ok(class
            .nodes
            .iter()
            .map(|(shape, row)| shape.apply_slotmap(&row.compose_fresh(&canon.args)))
            .collect())
    }

    /// Expands a class into a term, following the first stored node of
    /// each class until `depth` runs out; references past the horizon stay
    /// atoms, so cyclic classes unroll finitely.
    pub fn tree_of(
        &self,
        call: &ClassCall,
        depth: usize,
    ) -> Result<crate::tree::MixedTree<Op, ClassCall>> {
        use crate::tree::MixedTree;

        let canon = self
            .canonicalize_call(call)
            .ok_or(Error::NotPresent(call.id))?;
        if depth == 0 {
            return Ok(MixedTree::Atom(canon));
        }
        let class = self
            .classes
            .get(&canon.id)
            .ok_or(Error::EmptyClassLookup(canon.id))?;
        let (shape, row) = class.nodes.get_index(0).unwrap();
        let node = shape.apply_slotmap(&row.compose_fresh(&canon.args));
        let mut children = Vec::with_capacity(node.args.len());
        for arg in &node.args {
            children.push(self.tree_of(arg, depth - 1)?);
        }
        Ok(MixedTree::Node {
            op: node.op.clone(),
            defs: node.defs.clone(),
            uses: node.uses.clone(),
            children,
        })
    }

    /// Structural equality after canonicalization.
    pub fn are_same(&self, a: &ClassCall, b: &ClassCall) -> bool {
        match (self.canonicalize_call(a), self.canonicalize_call(b)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// A printable view of every class: slots, member shapes with their
    /// renamings, symmetry generators and users.
    pub fn dump(&self) -> Dump<'_, Op> {
        Dump(self)
    }

    /// Canonicalizes `node`: arguments resolved through the union-find, the
    /// minimal variant under the per-argument symmetry groups selected, and
    /// slots relabeled in first-occurrence order. Also reports the node's
    /// self-symmetries (variants that produced the same shape).
    pub(crate) fn canonical_parts(&self, node: &ENode<Op>) -> Result<Canonical<Op>> {
        let mut base = node.clone();
        for a in base.args.iter_mut() {
            *a = self
                .unionfind
                .find_call(a)
                .ok_or(Error::NotPresent(a.id))?;
        }

        // one variant per combination of argument symmetries
        let mut variants = vec![base.clone()];
        for i in 0..base.args.len() {
            let perms = match self.classes.get(&base.args[i].id) {
                Some(class) if !class.group.is_trivial() => class.group.all_perms(),
                _ => continue,
            };
            let mut next = Vec::with_capacity(variants.len() * perms.len());
            for v in &variants {
                for p in &perms {
                    let mut v2 = v.clone();
                    let args = p.compose(&v2.args[i].args).unwrap();
                    v2.args[i] = ClassCall::new(v2.args[i].id, args);
                    next.push(v2);
                }
            }
            variants = next;
        }

        let shaped: Vec<(ENode<Op>, SlotMap)> =
            variants.iter().map(|v| v.shape_parts()).collect();
        let (shape, renaming) = shaped
            .iter()
            .min_by(|a, b| a.0.cmp(&b.0))
            .unwrap()
            .clone();

        let back = renaming.inverse().unwrap();
        let mut syms = Vec::new();
        for (sh, rho) in &shaped {
            if sh != &shape || rho == &renaming {
                continue;
            }
            let phi = back.compose(rho).unwrap();
            if !phi.is_identity() && !syms.contains(&phi) {
                syms.push(phi);
            }
        }

        Ok(Canonical {
            shape,
            renaming,
            syms,
        })
    }

    /// Builds the caller-facing call for a shape stored in class `id`:
    /// the stored class-to-shape renaming composed with the shape-to-caller
    /// renaming of the canonicalization that found it.
    pub(crate) fn recover_call(&self, id: ClassId, row: &SlotMap, renaming: &SlotMap) -> ClassCall {
        let slots = &self.classes[&id].slots;
        let to_shape = row
            .inverse()
            .unwrap()
            .filter_keys(|k| slots.contains(k));
        ClassCall::new(id, to_shape.compose(renaming).unwrap())
    }

    /// Asserts every quantified invariant of the data model. Quadratic;
    /// meant for tests and debug builds.
    pub fn check_invariants(&self) {
        for (shape, &id) in &self.hashcons {
            let class = self
                .classes
                .get(&id)
                .unwrap_or_else(|| panic!("hash-cons points at unlinked {id}"));
            let row = class
                .nodes
                .get(shape)
                .unwrap_or_else(|| panic!("hash-cons entry missing from {id}"));
            assert!(self.unionfind.is_root(id), "{id} is not a root");

            // the stored shape is canonical under the current graph
            let node = shape.apply_slotmap(row);
            let parts = self.canonical_parts(&node).unwrap();
            assert!(
                &parts.shape == shape,
                "stale shape in {id}: {shape:?} canonicalizes to {:?}",
                parts.shape
            );
        }

        for (&id, class) in &self.classes {
            assert!(self.unionfind.is_root(id), "{id} is not a root");
            assert!(!class.nodes.is_empty(), "{id} is empty but linked");
            assert_eq!(class.group.slots(), &class.slots);

            let mut seen = SlotSet::new();
            for (shape, row) in &class.nodes {
                assert_eq!(self.hashcons.get(shape), Some(&id));
                seen = seen.union(&row.value_set().intersection(&class.slots));
                for arg in &shape.args {
                    assert!(self.unionfind.is_root(arg.id));
                    let arg_class = &self.classes[&arg.id];
                    assert!(
                        arg_class.users.contains(shape),
                        "{shape:?} missing from users of {}",
                        arg.id
                    );
                }
            }
            assert_eq!(seen, class.slots, "slots of {id} drifted");

            for p in class.group.generators() {
                assert!(p.is_permutation() && p.key_set() == class.slots);
            }
            for user in &class.users {
                let owner = self.hashcons.get(user).copied();
                assert!(owner.is_some(), "user {user:?} of {id} is unowned");
                assert!(user.args.iter().any(|a| a.id == id));
            }
        }

        for id in self.classes.keys() {
            let found = self.unionfind.find(*id).unwrap();
            assert_eq!(found.id, *id);
            assert!(found.args.is_identity());
        }
    }
}

pub struct Dump<'a, Op: Operator>(&'a EGraph<Op>);

impl<Op: Operator> Debug for Dump<'_, Op> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "EGraph {{")?;
        for (id, class) in &self.0.classes {
            writeln!(f, "  {id} {}:", class.slots)?;
            for (shape, row) in &class.nodes {
                writeln!(f, "    {shape:?} via {row}")?;
            }
            if !class.group.is_trivial() {
                writeln!(f, "    perms: {:?}", class.group.generators())?;
            }
            if !class.users.is_empty() {
                writeln!(f, "    users: {:?}", class.users)?;
            }
        }
        write!(f, "}}")
    }
}

impl<Op: Operator> Debug for EGraph<Op> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EGraph")
            .field("classes", &self.classes.len())
            .field("nodes", &self.total_number_of_nodes())
            .finish()
    }
}

impl<Op: Operator> EGraph<Op> {
    /// The symmetry group of a class.
    pub fn group(&self, id: ClassId) -> Result<&PermGroup> {
        Ok(&self.class(id)?.group)
    }
}
