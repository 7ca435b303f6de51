use std::fmt::{self, Debug, Formatter};

use indexmap::IndexMap;
use log::debug;
use symbol_table::GlobalSymbol;

use crate::{
    error::Result,
    graph::{AddResponse, ClassCall, EGraph, ENode, Operator},
    parallel::ParallelMap,
};

/// One newly created node: the node as the caller wrote it and the call of
/// the class that now represents it.
#[derive(Debug, Clone)]
pub struct AddedNode<Op> {
    pub node: ENode<Op>,
    pub call: ClassCall,
}

/// An external analysis fed by the engine's mutation stream.
///
/// The engine itself stores nothing per analysis; a metadata instance keeps
/// its own tables and re-queries the graph through the read API. Both
/// notifications carry batches with set semantics: the order of entries
/// must not affect the result, and replaying an entry must be harmless.
pub trait Metadata<Op: Operator> {
    /// Called after an add batch, with one entry per `Added` response.
    fn on_add_many(&mut self, added: &[AddedNode<Op>], graph: &EGraph<Op>, parallel: &ParallelMap);

    /// Called after a union batch with the partition of formerly-distinct
    /// roots; each group's calls canonicalize into the same class.
    fn on_union_many(&mut self, equivalences: &[Vec<ClassCall>], graph: &EGraph<Op>);

    /// A fresh instance for a fresh engine.
    fn emptied(&self) -> Box<dyn Metadata<Op>>;
}

/// The no-op analysis, for containers that only want the engine.
impl<Op: Operator> Metadata<Op> for () {
    fn on_add_many(
        &mut self,
        _added: &[AddedNode<Op>],
        _graph: &EGraph<Op>,
        _parallel: &ParallelMap,
    ) {
    }

    fn on_union_many(&mut self, _equivalences: &[Vec<ClassCall>], _graph: &EGraph<Op>) {}

    fn emptied(&self) -> Box<dyn Metadata<Op>> {
        Box::new(())
    }
}

/// An engine bundled with named metadata instances.
///
/// Threads every mutation through the engine first, then notifies each
/// metadata under a child scope of the caller's parallel map.
pub struct MetaGraph<Op: Operator> {
    graph: EGraph<Op>,
    metadata: IndexMap<GlobalSymbol, Box<dyn Metadata<Op>>>,
}

impl<Op: Operator> MetaGraph<Op> {
    pub fn new(graph: EGraph<Op>) -> Self {
        MetaGraph {
            graph,
            metadata: IndexMap::new(),
        }
    }

    pub fn graph(&self) -> &EGraph<Op> {
        &self.graph
    }

    pub fn register(&mut self, name: impl Into<GlobalSymbol>, meta: Box<dyn Metadata<Op>>) {
        self.metadata.insert(name.into(), meta);
    }

    pub fn metadata(&self, name: impl Into<GlobalSymbol>) -> Option<&dyn Metadata<Op>> {
        self.metadata.get(&name.into()).map(|m| m.as_ref())
    }

    pub fn metadata_names(&self) -> impl Iterator<Item = GlobalSymbol> + '_ {
        self.metadata.keys().copied()
    }

    /// [`EGraph::try_add_many`] plus notifications.
    pub fn try_add_many(
        &mut self,
        nodes: &[ENode<Op>],
        parallel: &ParallelMap,
    ) -> Result<Vec<AddResponse>> {
        let out = self.graph.try_add_many(nodes, parallel)?;
        let added: Vec<AddedNode<Op>> = nodes
            .iter()
            .zip(&out)
            .filter_map(|(node, response)| match response {
                AddResponse::Added(call) => Some(AddedNode {
                    node: node.clone(),
                    call: call.clone(),
                }),
                AddResponse::AlreadyThere(_) => None,
            })
            .collect();
        if !added.is_empty() {
            debug!("notifying {} metadata of {} adds", self.metadata.len(), added.len());
            for (name, meta) in self.metadata.iter_mut() {
                let scope = parallel.child(name.as_str());
                scope.run(|| meta.on_add_many(&added, &self.graph, &scope));
            }
        }
        Ok(out)
    }

    /// [`EGraph::union_many`] plus notifications.
    pub fn union_many(
        &mut self,
        pairs: &[(ClassCall, ClassCall)],
        parallel: &ParallelMap,
    ) -> Result<Vec<Vec<ClassCall>>> {
        let groups = self.graph.union_many(pairs, parallel)?;
        if !groups.is_empty() {
            debug!(
                "notifying {} metadata of {} merged groups",
                self.metadata.len(),
                groups.len()
            );
            for (name, meta) in self.metadata.iter_mut() {
                let scope = parallel.child(name.as_str());
                scope.run(|| meta.on_union_many(&groups, &self.graph));
            }
        }
        Ok(groups)
    }

    /// A fresh container: an emptied engine and an emptied instance of
    /// every registered metadata, under the same names.
    pub fn emptied(&self) -> Self {
        MetaGraph {
            graph: self.graph.emptied(),
            metadata: self
                .metadata
                .iter()
                .map(|(name, meta)| (*name, meta.emptied()))
                .collect(),
        }
    }
}

impl<Op: Operator> Debug for MetaGraph<Op> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaGraph")
            .field("graph", &self.graph)
            .field(
                "metadata",
                &self.metadata.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::ParallelMap;
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Counts distinct classes it has been told about.
    struct ClassCount {
        adds: Arc<AtomicUsize>,
        merges: Arc<AtomicUsize>,
    }

    impl Metadata<&'static str> for ClassCount {
        fn on_add_many(
            &mut self,
            added: &[AddedNode<&'static str>],
            graph: &EGraph<&'static str>,
            _parallel: &ParallelMap,
        ) {
            // every reported call must already be canonical-resolvable
            for a in added {
                assert!(graph.canonicalize_call(&a.call).is_some());
            }
            self.adds.fetch_add(added.len(), Ordering::Relaxed);
        }

        fn on_union_many(
            &mut self,
            equivalences: &[Vec<ClassCall>],
            graph: &EGraph<&'static str>,
        ) {
            for group in equivalences {
                assert!(group.len() >= 2);
                for pair in group.windows(2) {
                    assert!(graph.are_same(&pair[0], &pair[1]));
                }
            }
            self.merges.fetch_add(equivalences.len(), Ordering::Relaxed);
        }

        fn emptied(&self) -> Box<dyn Metadata<&'static str>> {
            Box::new(ClassCount {
                adds: Arc::new(AtomicUsize::new(0)),
                merges: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[test]
    fn notifications_fire_per_batch() {
        let adds = Arc::new(AtomicUsize::new(0));
        let merges = Arc::new(AtomicUsize::new(0));
        let mut meta = MetaGraph::new(EGraph::new());
        meta.register(
            "count",
            Box::new(ClassCount {
                adds: adds.clone(),
                merges: merges.clone(),
            }),
        );

        let par = ParallelMap::sequential();
        let out = meta
            .try_add_many(&[ENode::leaf("a"), ENode::leaf("b"), ENode::leaf("a")], &par)
            .unwrap();
        assert_eq!(adds.load(Ordering::Relaxed), 2);
        assert!(out[2].call() == out[0].call());

        let pair = (out[0].call().clone(), out[1].call().clone());
        meta.union_many(&[pair], &par).unwrap();
        assert_eq!(merges.load(Ordering::Relaxed), 1);

        // the fresh container keeps the registration but none of the state
        let fresh = meta.emptied();
        assert_eq!(fresh.metadata_names().count(), 1);
        assert_eq!(fresh.graph().number_of_classes(), 0);
    }
}
