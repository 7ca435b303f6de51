use std::fmt;

use crate::{
    graph::{ClassCall, ClassId},
    slot::SlotSet,
    slotmap::SlotMap,
};

/// A disjoint-set forest whose edges carry slot renamings.
///
/// Every entry maps a class to the call it has been merged into. A root maps
/// to itself under the identity over its *current* parameter slots, which is
/// also how a shrink invalidates stale frames: composing through the root's
/// identity restricts every chained renaming to the surviving slots.
///
/// The stored renaming of `uf[c] = (p, m)` translates `p`'s parameter slots
/// into the frame `c` was using when the merge happened, so canonicalizing a
/// call is one composition per hop. Entries are never removed: callers
/// holding a reference to a long-unlinked class still resolve.
///
/// Writes require exclusive access; shared lookups may run concurrently
/// with each other.
#[derive(Clone, Default)]
pub struct UnionFind {
    parents: Vec<ClassCall>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Allocates a fresh root with the given parameter slots.
    pub fn add(&mut self, slots: &SlotSet) -> ClassId {
        let id = ClassId::new(self.parents.len());
        self.parents
            .push(ClassCall::new(id, SlotMap::identity(slots)));
        id
    }

    /// Re-parents `id`. Used when a class merges into another and when a
    /// shrink resets a root onto a smaller frame.
    pub fn update(&mut self, id: ClassId, call: ClassCall) {
        self.parents[id.index()] = call;
    }

    pub fn contains(&self, id: ClassId) -> bool {
        id.index() < self.parents.len()
    }

    pub fn is_root(&self, id: ClassId) -> bool {
        self.parents
            .get(id.index())
            .is_some_and(|c| c.id == id)
    }

    /// The canonical call of `id`, or `None` if the union-find has never
    /// seen it. Does not compress; see [`find_compress`](Self::find_compress).
    pub fn find(&self, id: ClassId) -> Option<ClassCall> {
        let mut cur = self.parents.get(id.index())?.clone();
        loop {
            let up = &self.parents[cur.id.index()];
            if up.id == cur.id {
                // `up.args` is the identity over the root's current slots;
                // composing restricts `cur` to the frame that still exists
                let args = up.args.compose(&cur.args).unwrap();
                return Some(ClassCall::new(up.id, args));
            }
            let args = up.args.compose(&cur.args).unwrap();
            cur = ClassCall::new(up.id, args);
        }
    }

    /// [`find`](Self::find), then translate through the call's own renaming.
    pub fn find_call(&self, call: &ClassCall) -> Option<ClassCall> {
        let root = self.find(call.id)?;
        let args = root.args.compose(&call.args).unwrap();
        Some(ClassCall::new(root.id, args))
    }

    /// The canonical call of `id`, rewriting every entry along the walk to
    /// point directly at the root.
    pub fn find_compress(&mut self, id: ClassId) -> Option<ClassCall> {
        if id.index() >= self.parents.len() {
            return None;
        }
        let parent = self.parents[id.index()].clone();
        if parent.id == id {
            // a root resolves to itself under its current identity
            return Some(parent);
        }
        let root = self.find_compress(parent.id).unwrap();
        let args = root.args.compose(&parent.args).unwrap();
        let resolved = ClassCall::new(root.id, args);
        self.parents[id.index()] = resolved.clone();
        Some(resolved)
    }

    pub fn find_call_compress(&mut self, call: &ClassCall) -> Option<ClassCall> {
        let root = self.find_compress(call.id)?;
        let args = root.args.compose(&call.args).unwrap();
        Some(ClassCall::new(root.id, args))
    }
}

impl fmt::Debug for UnionFind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.parents
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (ClassId::new(i), c)),
            )
            .finish()
    }
}
