use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};

use crate::{
    error::{Error, Result},
    graph::{ClassCall, ClassId, EGraph, ENode, Operator},
    parallel::{CancelToken, ParallelMap},
    slot::SlotSet,
    slotmap::SlotMap,
};

/// The work still owed after a union is requested: equalities not yet
/// recorded and shapes whose canonical form may have drifted.
struct Worklist<Op> {
    pending: VecDeque<(ClassCall, ClassCall)>,
    dirty: IndexSet<ENode<Op>>,
    touched: IndexSet<ClassId>,
}

impl<Op: Operator> Worklist<Op> {
    fn new() -> Self {
        Worklist {
            pending: VecDeque::new(),
            dirty: IndexSet::new(),
            touched: IndexSet::new(),
        }
    }
}

impl<Op: Operator> EGraph<Op> {
    /// Merges a batch of class-call pairs and restores every invariant.
    ///
    /// The batch is set-semantic: duplicate and symmetric pairs are
    /// idempotent, and the input order does not affect the final state or
    /// the returned partition. The return value groups the classes that
    /// became one: each group holds the calls of formerly-distinct roots
    /// (two or more) that now canonicalize into the same class.
    ///
    /// Cancellation is polled only while canonicalizing the input pairs,
    /// before the first mutation; once the worklist starts the operation
    /// runs to completion. Use
    /// [`with_unioned_many`](Self::with_unioned_many) for a surface that
    /// can abort mid-worklist.
    pub fn union_many(
        &mut self,
        pairs: &[(ClassCall, ClassCall)],
        parallel: &ParallelMap,
    ) -> Result<Vec<Vec<ClassCall>>> {
        let canon = {
            let graph = &*self;
            parallel
                .child("union")
                .apply(pairs, |(l, r)| -> Result<(ClassCall, ClassCall)> {
                    let l = graph
                        .canonicalize_call(l)
                        .ok_or(Error::NotPresent(l.id))?;
                    let r = graph
                        .canonicalize_call(r)
                        .ok_or(Error::NotPresent(r.id))?;
                    Ok((l, r))
                })?
                .into_iter()
                .collect::<Result<Vec<_>>>()?
        };
        let groups = self.run_union(canon, None)?;

        #[cfg(debug_assertions)]
        self.check_invariants();
        Ok(groups)
    }

    /// [`union_many`](Self::union_many) on a functional receiver. The
    /// receiver is untouched; a cancellation observed at any point during
    /// the worklist aborts and discards the staged engine.
    pub fn with_unioned_many(
        &self,
        pairs: &[(ClassCall, ClassCall)],
        parallel: &ParallelMap,
    ) -> Result<(Self, Vec<Vec<ClassCall>>)> {
        let canon = parallel
            .child("union")
            .apply(pairs, |(l, r)| -> Result<(ClassCall, ClassCall)> {
                let l = self.canonicalize_call(l).ok_or(Error::NotPresent(l.id))?;
                let r = self.canonicalize_call(r).ok_or(Error::NotPresent(r.id))?;
                Ok((l, r))
            })?
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        let mut next = self.clone();
        let groups = next.run_union(canon, parallel.token())?;

        #[cfg(debug_assertions)]
        next.check_invariants();
        Ok((next, groups))
    }

    /// Merges one pair. Returns `true` when the two calls were not already
    /// the same.
    pub fn union(&mut self, l: &ClassCall, r: &ClassCall) -> Result<bool> {
        let groups = self.union_many(
            std::slice::from_ref(&(l.clone(), r.clone())),
            &ParallelMap::sequential(),
        )?;
        Ok(!groups.is_empty())
    }

    fn run_union(
        &mut self,
        pairs: Vec<(ClassCall, ClassCall)>,
        token: Option<&CancelToken>,
    ) -> Result<Vec<Vec<ClassCall>>> {
        let mut work = Worklist::new();
        // normalize so duplicated and flipped pairs collapse
        let mut seen = IndexSet::new();
        for (l, r) in pairs {
            let pair = if l <= r { (l, r) } else { (r, l) };
            if seen.insert(pair.clone()) {
                work.pending.push_back(pair);
            }
        }

        let mut steps = 0usize;
        loop {
            if let Some(token) = token {
                if token.is_canceled() {
                    return Err(Error::Canceled);
                }
            }
            steps += 1;
            if let Some((l, r)) = work.pending.pop_front() {
                self.unify(l, r, &mut work);
            } else if let Some(shape) = work.dirty.pop() {
                self.repair(shape, &mut work);
            } else {
                break;
            }
        }
        debug!(
            "union worklist settled after {steps} steps, {} classes",
            self.classes.len()
        );

        // unlink classes whose node set migrated entirely; the union-find
        // still resolves them
        self.classes.retain(|_, class| !class.nodes.is_empty());

        let mut by_root: IndexMap<ClassId, Vec<ClassCall>> = IndexMap::new();
        for id in &work.touched {
            if let Some(canon) = self.unionfind.find(*id) {
                // the old root's surviving frame; canonicalizing these calls
                // takes a consumer from the old world into the new one
                let frame = canon.args.value_set();
                by_root
                    .entry(canon.id)
                    .or_default()
                    .push(ClassCall::new(*id, SlotMap::identity(&frame)));
            }
        }
        Ok(by_root
            .into_values()
            .filter(|group| group.len() >= 2)
            .collect())
    }

    /// Records `l = r`. Either the equality collapses into a symmetry or a
    /// slot elimination of a single class, or two roots merge.
    fn unify(&mut self, l: ClassCall, r: ClassCall, work: &mut Worklist<Op>) {
        let Some(l) = self.unionfind.find_call_compress(&l) else {
            return;
        };
        let Some(r) = self.unionfind.find_call_compress(&r) else {
            return;
        };
        work.touched.insert(l.id);
        work.touched.insert(r.id);

        if l.id == r.id {
            if l.args == r.args {
                return;
            }
            // the same class reached under two renamings: where the frames
            // overlap this is a symmetry, elsewhere the parameter is unused
            let theta = l.args.compose_partial(&r.args.inverse().unwrap());
            let Some(class) = self.classes.get(&l.id) else {
                // an unlinked class has no content to constrain
                return;
            };
            let slots = class.slots.clone();
            if theta.key_set() == slots {
                trace!("symmetry {theta} on {}", l.id);
                if let Some(group) = self.classes[&l.id].group.try_add_set(&[theta]) {
                    self.classes.get_mut(&l.id).unwrap().group = group;
                    let users = self.classes[&l.id].users.clone();
                    work.dirty.extend(users);
                }
            } else {
                self.shrink(l.id, theta.key_set(), work);
                work.pending.push_back((l, r));
            }
            return;
        }

        // distinct roots: parameters one side exposes but the other cannot
        // see are dead, so shrink that side first and come back
        let shared = l.args.value_set().intersection(&r.args.value_set());
        if l.args.value_set() != shared {
            let keep: SlotSet = l
                .args
                .iter()
                .filter(|(_, v)| shared.contains(*v))
                .map(|(k, _)| k)
                .collect();
            self.shrink(l.id, keep, work);
            work.pending.push_back((l, r));
            return;
        }
        if r.args.value_set() != shared {
            let keep: SlotSet = r
                .args
                .iter()
                .filter(|(_, v)| shared.contains(*v))
                .map(|(k, _)| k)
                .collect();
            self.shrink(r.id, keep, work);
            work.pending.push_back((l, r));
            return;
        }

        let size = |graph: &Self, id: ClassId| graph.classes.get(&id).map_or(0, |c| c.nodes.len());
        let (sub, dom) = if size(self, l.id) <= size(self, r.id) {
            (l, r)
        } else {
            (r, l)
        };
        // translate dom's parameters into sub's frame: a call of sub under
        // `a` is a call of dom under `mapping` then `a`
        let mapping = dom
            .args
            .compose(&sub.args.inverse().unwrap())
            .unwrap();
        self.merge(sub.id, dom.id, mapping, work);
    }

    /// Moves every node of `sub` into `dom` and re-parents `sub`.
    fn merge(&mut self, sub: ClassId, dom: ClassId, mapping: SlotMap, work: &mut Worklist<Op>) {
        trace!("merge {sub} into {dom} via {mapping}");
        self.unionfind
            .update(sub, ClassCall::new(dom, mapping.clone()));
        let Some(subclass) = self.classes.swap_remove(&sub) else {
            // an unlinked subordinate only needed the re-parenting
            return;
        };
        let back = mapping.inverse().unwrap();

        for (shape, row) in subclass.nodes {
            // redundant slots of the row stay isolated under fresh names
            let row = row.compose_fresh(&back);
            debug_assert!(!self.classes[&dom].nodes.contains_key(&shape));
            self.hashcons.insert(shape.clone(), dom);
            self.classes
                .get_mut(&dom)
                .unwrap()
                .nodes
                .insert(shape.clone(), row);
            work.dirty.insert(shape);
        }

        let conjugated: Vec<SlotMap> = subclass
            .group
            .generators()
            .iter()
            .map(|p| mapping.compose(p).unwrap().compose(&back).unwrap())
            .collect();
        if let Some(dom_class) = self.classes.get_mut(&dom) {
            if let Some(group) = dom_class.group.try_add_set(&conjugated) {
                dom_class.group = group;
            }
            let users = dom_class.users.clone();
            work.dirty.extend(users);
        }
        work.dirty.extend(subclass.users);
    }

    /// Re-canonicalizes one stored shape against the current graph.
    fn repair(&mut self, shape: ENode<Op>, work: &mut Worklist<Op>) {
        let Some(&id) = self.hashcons.get(&shape) else {
            // already superseded by an earlier repair
            return;
        };
        let row = self.classes[&id].nodes.get(&shape).unwrap().clone();
        let node = shape.apply_slotmap(&row);
        let parts = self.canonical_parts(&node).unwrap();

        // newly visible symmetries first: a larger group can change which
        // variant is minimal, so rerun afterwards
        let slots = self.classes[&id].slots.clone();
        let candidates: Vec<SlotMap> = parts
            .syms
            .iter()
            .map(|phi| phi.filter_keys(|k| slots.contains(k)))
            .filter(|pi| pi.key_set() == slots && pi.is_permutation())
            .collect();
        if !candidates.is_empty() {
            if let Some(group) = self.classes[&id].group.try_add_set(&candidates) {
                trace!("{id} gained symmetries from {shape:?}");
                self.classes.get_mut(&id).unwrap().group = group;
                let users = self.classes[&id].users.clone();
                work.dirty.extend(users);
                work.dirty.insert(shape);
                return;
            }
        }

        // a node that no longer mentions a parameter slot eliminates it
        let covered = parts.renaming.value_set().intersection(&slots);
        if covered != slots {
            self.shrink(id, covered, work);
            work.dirty.insert(shape);
            return;
        }

        if parts.shape == shape {
            if rows_equivalent(&row, &free_row(&parts.shape, &parts.renaming), &slots) {
                return;
            }
            // same shape under a different instantiation of the same class:
            // feed the implied equality back as a union
            let Some(a1) = row_call(id, &row, &slots) else {
                let cov = row_coverage(&row, &slots);
                self.shrink(id, cov, work);
                work.dirty.insert(shape);
                return;
            };
            let a2 = row_call(id, &parts.renaming, &slots).unwrap();
            work.pending.push_back((a1, a2));
            return;
        }

        match self.hashcons.get(&parts.shape).copied() {
            None => {
                trace!("rehash {shape:?} -> {:?} in {id}", parts.shape);
                self.remove_shape(&shape, id);
                self.hashcons.insert(parts.shape.clone(), id);
                let row = free_row(&parts.shape, &parts.renaming);
                self.classes
                    .get_mut(&id)
                    .unwrap()
                    .nodes
                    .insert(parts.shape.clone(), row);
                for arg in &parts.shape.args {
                    if let Some(class) = self.classes.get_mut(&arg.id) {
                        class.users.insert(parts.shape.clone());
                    }
                }
            }
            Some(other) => {
                // upward merge: the canonical form already lives elsewhere
                let row2 = self.classes[&other].nodes.get(&parts.shape).unwrap().clone();
                let slots2 = self.classes[&other].slots.clone();
                let Some(a2) = row_call(other, &row2, &slots2) else {
                    let cov = row_coverage(&row2, &slots2);
                    self.shrink(other, cov, work);
                    work.dirty.insert(shape);
                    return;
                };
                let a1 = ClassCall::new(
                    id,
                    parts
                        .renaming
                        .inverse()
                        .unwrap()
                        .filter_keys(|k| slots.contains(k)),
                );
                trace!("congruence {id} = {other} via {:?}", parts.shape);
                self.remove_shape(&shape, id);
                if a1 != a2 {
                    work.pending.push_back((a1, a2));
                }
            }
        }
    }

    /// Restricts a class to `keep` (closed under its symmetry orbits),
    /// resets its union-find frame and queues its users.
    fn shrink(&mut self, id: ClassId, keep: SlotSet, work: &mut Worklist<Op>) {
        let class = &self.classes[&id];
        let keep: SlotSet = keep
            .iter()
            .filter(|s| class.group.orbit(*s).is_subset(&keep))
            .collect();
        if keep == class.slots {
            return;
        }
        debug_assert!(keep.is_subset(&class.slots));
        trace!("shrink {id}: {} -> {}", class.slots, keep);

        let group = class.group.restrict(&keep);
        let identity = SlotMap::identity(&keep);
        let class = self.classes.get_mut(&id).unwrap();
        class.slots = keep;
        class.group = group;
        for row in class.nodes.values_mut() {
            *row = row.compose_fresh(&identity);
        }
        let users = class.users.clone();
        self.unionfind.update(id, ClassCall::new(id, identity));
        work.dirty.extend(users);
        work.touched.insert(id);
    }

    /// Drops a stored shape: hash-cons entry, class row, and its
    /// registrations in the argument classes' user sets.
    fn remove_shape(&mut self, shape: &ENode<Op>, id: ClassId) {
        self.hashcons.remove(shape);
        if let Some(class) = self.classes.get_mut(&id) {
            class.nodes.swap_remove(shape);
        }
        for arg in &shape.args {
            if let Some(class) = self.classes.get_mut(&arg.id) {
                class.users.swap_remove(shape);
            }
        }
    }
}

/// The parameter slots a stored row actually reaches.
fn row_coverage(row: &SlotMap, slots: &SlotSet) -> SlotSet {
    row.value_set().intersection(slots)
}

/// Restricts a shape-to-frame renaming to the shape's free labels; binder
/// labels are local to the shape and never stored in a row.
fn free_row<Op: Operator>(shape: &ENode<Op>, renaming: &SlotMap) -> SlotMap {
    let defs: SlotSet = shape.defs.iter().copied().collect();
    renaming.filter_keys(|k| !defs.contains(k))
}

/// Two rows denote the same member when they agree on the parameter part
/// and are redundant on the same labels. Redundant images are fresh slots,
/// so they only ever match by being redundant on both sides.
fn rows_equivalent(a: &SlotMap, b: &SlotMap, slots: &SlotSet) -> bool {
    if a.key_set() != b.key_set() {
        return false;
    }
    a.iter().all(|(k, va)| {
        let vb = b.get(k).unwrap();
        match (slots.contains(va), slots.contains(vb)) {
            (true, true) => va == vb,
            (false, false) => true,
            _ => false,
        }
    })
}

/// The call `(id, slots -> shape labels)` a stored row induces, when the
/// row covers every parameter slot.
fn row_call(id: ClassId, row: &SlotMap, slots: &SlotSet) -> Option<ClassCall> {
    let back = row.inverse().unwrap().filter_keys(|k| slots.contains(k));
    (back.key_set() == *slots).then(|| ClassCall::new(id, back))
}
