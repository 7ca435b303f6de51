/*!
Equality saturation on slotted e-graphs.

A slotted e-graph is a congruence-closure structure over terms whose nodes
may bind and refer to α-equivalent variables ("slots"). Nodes are
deduplicated modulo slot renaming, classes track the permutation symmetries
of their parameters, and unions propagate both congruences and slot
eliminations upward until the graph is closed again.

The crate is the engine only: pattern matching, rewrite scheduling and
extraction are built on top of the read/write API by external collaborators,
which also receive the engine's add/union stream through the
[`Metadata`] hooks.

```
use slotsat::{EGraph, ENode, Slot};

let mut graph: EGraph<&str> = EGraph::new();
let x = Slot::fresh();
let y = Slot::fresh();

// the two orderings are one shape under two renamings
let a = graph.add(ENode::leaf("pair").with_uses([x, y])).unwrap();
let b = graph.add(ENode::leaf("pair").with_uses([y, x])).unwrap();
assert_eq!(graph.number_of_classes(), 1);
assert!(!graph.are_same(&a, &b));

// uniting them teaches the class that its parameters commute
graph.union(&a, &b).unwrap();
let class = graph.canonicalize_call(&a).unwrap().id;
assert_eq!(graph.group(class).unwrap().count(), 2);
```
*/

mod error;
mod graph;
mod group;
mod parallel;
mod slot;
mod slotmap;
mod tree;
mod unionfind;
mod utils;

pub use error::{Error, Result};
pub use graph::{
    AddResponse, AddedNode, ClassCall, ClassId, EClass, EGraph, ENode, MetaGraph, Metadata,
    Operator, ShapeCall,
};
pub use group::PermGroup;
pub use parallel::{CancelToken, ParallelMap};
pub use slot::{Slot, SlotSet};
pub use slotmap::SlotMap;
pub use tree::{MixedTree, Tree};
pub use unionfind::UnionFind;

pub mod prelude {
    pub use crate::{
        AddResponse, CancelToken, ClassCall, ClassId, EGraph, ENode, MixedTree, Operator,
        ParallelMap, Slot, SlotMap, SlotSet, Tree,
    };
}
