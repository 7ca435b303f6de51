use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

use smallvec::SmallVec;

use crate::{
    slot::{Slot, SlotSet},
    slotmap::SlotMap,
    utils::{fmt_iter, HashMap},
};

/// The operator alphabet is caller-supplied and opaque: the engine only ever
/// compares operators and orders them to pick canonical representatives.
/// `Send + Sync` lets batches canonicalize on a worker pool.
pub trait Operator: Debug + Clone + Eq + Ord + Hash + Send + Sync {}

impl<T: Debug + Clone + Eq + Ord + Hash + Send + Sync> Operator for T {}

/// A class identifier. Densely allocated; only meaningful together with the
/// engine that produced it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub(crate) fn new(val: usize) -> Self {
        ClassId(val as u32)
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Debug for ClassId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl Display for ClassId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A reference to a class together with the renaming that instantiates it.
///
/// `args` is a bijection from the class's parameter slots onto slots of the
/// caller. A class is never referenced bare: every use must say which caller
/// slot stands for each parameter.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassCall {
    pub id: ClassId,
    pub args: SlotMap,
}

impl ClassCall {
    pub fn new(id: ClassId, args: SlotMap) -> Self {
        debug_assert!(args.is_bijection());
        ClassCall { id, args }
    }

    /// Rewrites the caller-side slots of this call. Slots the renaming does
    /// not mention pass through.
    pub fn map_slots(&self, renaming: &SlotMap) -> Self {
        ClassCall {
            id: self.id,
            args: self.args.compose_retain(renaming),
        }
    }
}

impl Debug for ClassCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.id, self.args)
    }
}

impl Display for ClassCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A term node.
///
/// `defs` are the binders this node introduces, `uses` are free-variable
/// positions (repetition allowed), and `args` reference child classes, each
/// under its own renaming. The node's own slot set is everything visible
/// through `uses` and the argument renamings, minus the binders.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ENode<Op> {
    pub op: Op,
    pub defs: SmallVec<[Slot; 2]>,
    pub uses: SmallVec<[Slot; 4]>,
    pub args: SmallVec<[ClassCall; 4]>,
}

impl<Op: Operator> ENode<Op> {
    /// A node with no binders, uses, or arguments.
    pub fn leaf(op: Op) -> Self {
        ENode {
            op,
            defs: SmallVec::new(),
            uses: SmallVec::new(),
            args: SmallVec::new(),
        }
    }

    pub fn with_uses<I: IntoIterator<Item = Slot>>(mut self, uses: I) -> Self {
        self.uses = uses.into_iter().collect();
        self
    }

    pub fn with_defs<I: IntoIterator<Item = Slot>>(mut self, defs: I) -> Self {
        self.defs = defs.into_iter().collect();
        self
    }

    pub fn with_args<I: IntoIterator<Item = ClassCall>>(mut self, args: I) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.args.is_empty()
    }

    /// The free slots of this node: uses and argument images, minus binders.
    pub fn slots(&self) -> SlotSet {
        let defs: SlotSet = self.defs.iter().copied().collect();
        self.uses
            .iter()
            .copied()
            .chain(self.args.iter().flat_map(|a| a.args.values()))
            .filter(|s| !defs.contains(*s))
            .collect()
    }

    /// Every slot occurrence of the node in a fixed traversal order:
    /// binders, then uses, then each argument's renaming images (in the
    /// argument map's key order). Duplicates are kept; this sequence is what
    /// canonical labeling and variant comparison run over.
    pub fn slot_occurrences(&self) -> Vec<Slot> {
        self.defs
            .iter()
            .copied()
            .chain(self.uses.iter().copied())
            .chain(self.args.iter().flat_map(|a| a.args.values()))
            .collect()
    }

    /// Renames every slot of the node. Slots the map does not mention pass
    /// through; argument map keys (child parameter slots) are untouched.
    pub fn apply_slotmap(&self, m: &SlotMap) -> Self {
        ENode {
            op: self.op.clone(),
            defs: self.defs.iter().map(|s| m.apply(*s)).collect(),
            uses: self.uses.iter().map(|s| m.apply(*s)).collect(),
            args: self.args.iter().map(|a| a.map_slots(m)).collect(),
        }
    }

    pub fn map_args<F: FnMut(&ClassCall) -> ClassCall>(&self, mut f: F) -> Self {
        ENode {
            op: self.op.clone(),
            defs: self.defs.clone(),
            uses: self.uses.clone(),
            args: self.args.iter().map(|a| f(a)).collect(),
        }
    }

    /// Relabels the node's slots to their canonical names, `$0, $1, ...` in
    /// first-occurrence order. Returns the relabeled node together with the
    /// renaming from its labels back to this node's slots.
    pub fn shape_parts(&self) -> (ENode<Op>, SlotMap) {
        let mut forward: HashMap<Slot, Slot> = HashMap::default();
        let mut backward = SlotMap::new();
        for s in self.slot_occurrences() {
            let next = forward.len() as u32;
            forward.entry(s).or_insert_with(|| {
                let label = Slot::numeric(next);
                backward.insert(label, s);
                label
            });
        }
        let rho = SlotMap::from_pairs(forward.into_iter());
        (self.apply_slotmap(&rho), backward)
    }
}

impl<Op: Debug> Debug for ENode<Op> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.op)?;
        if !self.defs.is_empty() {
            fmt_iter(["[", " ", "]"], self.defs.iter(), |s, f| write!(f, "{s}"), f)?;
        }
        if !self.uses.is_empty() || !self.args.is_empty() {
            write!(f, "(")?;
            fmt_iter(["", " ", ""], self.uses.iter(), |s, f| write!(f, "{s}"), f)?;
            if !self.uses.is_empty() && !self.args.is_empty() {
                write!(f, "; ")?;
            }
            fmt_iter(["", " ", ""], self.args.iter(), |a, f| write!(f, "{a:?}"), f)?;
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A canonical node together with the renaming that places it back into the
/// frame it was canonicalized from. `shape` and the renaming together denote
/// exactly the tree the original node did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeCall<Op> {
    pub shape: ENode<Op>,
    pub renaming: SlotMap,
}
