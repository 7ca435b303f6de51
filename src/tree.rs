use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};

use smallvec::SmallVec;

use crate::{
    graph::{ClassCall, Operator},
    slot::Slot,
    utils::fmt_iter,
};

/// A term with optional pointers back into a graph.
///
/// Interior nodes mirror [`ENode`](crate::ENode) structure: an operator,
/// binder slots, use slots and child subtrees. Leaves are either further
/// subtrees or [`Atom`](MixedTree::Atom)s, which reference an existing
/// class under a renaming. Insertion walks the tree bottom-up; extraction
/// walks a class and stops at atoms once a depth runs out.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MixedTree<Op, A = ClassCall> {
    Node {
        op: Op,
        defs: SmallVec<[Slot; 2]>,
        uses: SmallVec<[Slot; 4]>,
        children: Vec<MixedTree<Op, A>>,
    },
    Atom(A),
}

/// A fully concrete term: a [`MixedTree`] that cannot contain atoms.
pub type Tree<Op> = MixedTree<Op, Infallible>;

impl<Op: Operator, A> MixedTree<Op, A> {
    pub fn leaf(op: Op) -> Self {
        MixedTree::Node {
            op,
            defs: SmallVec::new(),
            uses: SmallVec::new(),
            children: Vec::new(),
        }
    }

    pub fn node<D, U, C>(op: Op, defs: D, uses: U, children: C) -> Self
    where
        D: IntoIterator<Item = Slot>,
        U: IntoIterator<Item = Slot>,
        C: IntoIterator<Item = MixedTree<Op, A>>,
    {
        MixedTree::Node {
            op,
            defs: defs.into_iter().collect(),
            uses: uses.into_iter().collect(),
            children: children.into_iter().collect(),
        }
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, MixedTree::Atom(_))
    }

    /// The number of interior nodes.
    pub fn len(&self) -> usize {
        match self {
            MixedTree::Atom(_) => 0,
            MixedTree::Node { children, .. } => {
                1 + children.iter().map(|c| c.len()).sum::<usize>()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every atom, left to right.
    pub fn atoms(&self) -> Vec<&A> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a A>) {
        match self {
            MixedTree::Atom(a) => out.push(a),
            MixedTree::Node { children, .. } => {
                for c in children {
                    c.collect_atoms(out);
                }
            }
        }
    }

    /// Rewrites every atom, keeping the node structure.
    pub fn map_atoms<B, F: FnMut(&A) -> B>(&self, f: &mut F) -> MixedTree<Op, B> {
        match self {
            MixedTree::Atom(a) => MixedTree::Atom(f(a)),
            MixedTree::Node {
                op,
                defs,
                uses,
                children,
            } => MixedTree::Node {
                op: op.clone(),
                defs: defs.clone(),
                uses: uses.clone(),
                children: children.iter().map(|c| c.map_atoms(f)).collect(),
            },
        }
    }
}

impl<Op: Operator> Tree<Op> {
    /// Embeds a concrete tree into any atom type.
    pub fn to_mixed<A>(&self) -> MixedTree<Op, A> {
        self.map_atoms(&mut |a| match *a {})
    }
}

impl<Op: Debug, A: Debug> Debug for MixedTree<Op, A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MixedTree::Atom(a) => write!(f, "@{a:?}"),
            MixedTree::Node {
                op,
                defs,
                uses,
                children,
            } => {
                write!(f, "{op:?}")?;
                if !defs.is_empty() {
                    fmt_iter(["[", " ", "]"], defs.iter(), |s, f| write!(f, "{s}"), f)?;
                }
                if !uses.is_empty() || !children.is_empty() {
                    write!(f, "(")?;
                    fmt_iter(["", " ", ""], uses.iter(), |s, f| write!(f, "{s}"), f)?;
                    if !uses.is_empty() && !children.is_empty() {
                        write!(f, "; ")?;
                    }
                    fmt_iter(["", " ", ""], children.iter(), |c, f| write!(f, "{c:?}"), f)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}
