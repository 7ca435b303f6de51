use pretty_assertions::assert_eq;

use crate::{
    error::Error,
    graph::{AddResponse, ClassCall, ClassId, EGraph, ENode},
    parallel::{CancelToken, ParallelMap},
    slot::Slot,
    tree::MixedTree,
};

type Graph = EGraph<&'static str>;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn seq() -> ParallelMap {
    ParallelMap::sequential()
}

#[test]
fn two_constants_one_union() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("zero")).unwrap();
    let b = g.add(ENode::leaf("one")).unwrap();
    assert_eq!(g.number_of_classes(), 2);
    assert!(!g.are_same(&a, &b));

    assert!(g.union(&a, &b).unwrap());
    assert_eq!(g.number_of_classes(), 1);
    assert!(g.are_same(&a, &b));

    let nodes = g.enodes(&g.canonicalize_call(&a).unwrap()).unwrap();
    assert_eq!(nodes.len(), 2);
}

#[test]
fn upward_merge() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    let b = g.add(ENode::leaf("b")).unwrap();
    let fa = g.add(ENode::leaf("f").with_args([a.clone()])).unwrap();
    let fb = g.add(ENode::leaf("f").with_args([b.clone()])).unwrap();
    assert!(!g.are_same(&fa, &fb));

    g.union(&a, &b).unwrap();

    // the argument classes merged, so the parents had to follow
    assert!(g.are_same(&fa, &fb));
    let nodes = g.enodes(&g.canonicalize_call(&fa).unwrap()).unwrap();
    assert_eq!(nodes.len(), 1);
}

#[test]
fn same_shape_different_slots() {
    init();
    let (x, y) = (Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("v").with_uses([x])).unwrap();
    let b = g.add(ENode::leaf("v").with_uses([y])).unwrap();

    // one shape, two instantiations
    assert_eq!(g.number_of_classes(), 1);
    assert!(!g.are_same(&a, &b));

    // uniting them proves the slot is unused
    g.union(&a, &b).unwrap();
    assert_eq!(g.canonicalize_call(&a).unwrap().args.len(), 0);
    assert!(g.are_same(&a, &b));
}

#[test]
fn symmetry_discovery_and_propagation() {
    init();
    let (x, y) = (Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("p").with_uses([x, y])).unwrap();
    let b = g.add(ENode::leaf("p").with_uses([y, x])).unwrap();
    assert_eq!(g.number_of_classes(), 1);
    assert_eq!(a.id, b.id);
    assert!(!g.are_same(&a, &b));

    g.union(&a, &b).unwrap();
    let canon = g.canonicalize_call(&a).unwrap();
    assert_eq!(canon.args.len(), 2);
    assert_eq!(g.group(canon.id).unwrap().count(), 2);

    // nodes built over the two orderings now canonicalize together
    let fa = g.add(ENode::leaf("f").with_args([a.clone()])).unwrap();
    let fb = g.add(ENode::leaf("f").with_args([b.clone()])).unwrap();
    assert_eq!(
        g.canonicalize_call(&fa).unwrap().id,
        g.canonicalize_call(&fb).unwrap().id
    );
}

#[test]
fn batch_insert_of_equivalent_nodes() {
    init();
    let mut g = Graph::new();
    let nodes: Vec<_> = (0..101)
        .map(|_| ENode::leaf("v").with_uses([Slot::fresh()]))
        .collect();
    let out = g.try_add_many(&nodes, &ParallelMap::workers()).unwrap();

    assert!(out[0].is_new());
    assert_eq!(out.iter().filter(|r| r.is_new()).count(), 1);
    assert_eq!(out.iter().filter(|r| !r.is_new()).count(), 100);
    assert_eq!(g.number_of_classes(), 1);
}

#[test]
fn slot_elimination_through_union_with_ground() {
    init();
    let x = Slot::fresh();
    let mut g = Graph::new();
    let var = g.add(ENode::leaf("var").with_uses([x])).unwrap();
    let sub = g
        .add(ENode::leaf("minus").with_args([var.clone(), var.clone()]))
        .unwrap();
    let zero = g.add(ENode::leaf("zero")).unwrap();
    assert_eq!(g.canonicalize_call(&sub).unwrap().args.len(), 1);

    g.union(&sub, &zero).unwrap();
    assert_eq!(g.canonicalize_call(&sub).unwrap().args.len(), 0);
    assert!(g.are_same(&sub, &zero));
}

#[test]
fn self_cycle() {
    init();
    let mut g = Graph::new();
    let n = g.add(ENode::leaf("n")).unwrap();
    let wrap = g.add(ENode::leaf("w").with_args([n.clone()])).unwrap();

    g.union(&n, &wrap).unwrap();
    assert!(g.are_same(&n, &wrap));
    assert_eq!(g.number_of_classes(), 1);

    let canon = g.canonicalize_call(&n).unwrap();
    let nodes = g.enodes(&canon).unwrap();
    assert_eq!(nodes.len(), 2);
    // the wrapper references its own class now
    let class = g.class(canon.id).unwrap();
    assert!(class.users.iter().all(|u| g.lookup(u).is_some()));
}

#[test]
fn orbit_induced_elimination() {
    init();
    let (x, y) = (Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("p").with_uses([x, y])).unwrap();
    let b = g.add(ENode::leaf("p").with_uses([y, x])).unwrap();
    g.union(&a, &b).unwrap();

    // killing x kills y too: they share an orbit
    let q = g.add(ENode::leaf("q").with_uses([x])).unwrap();
    g.union(&a, &q).unwrap();
    assert_eq!(g.canonicalize_call(&a).unwrap().args.len(), 0);
}

#[test]
fn alpha_equivalent_binders_coincide() {
    init();
    let (a, b) = (Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let l1 = g
        .add(ENode::leaf("lam").with_defs([a]).with_uses([a]))
        .unwrap();
    let l2 = g
        .add(ENode::leaf("lam").with_defs([b]).with_uses([b]))
        .unwrap();
    assert_eq!(l1, l2);
    assert_eq!(g.number_of_classes(), 1);
}

#[test]
fn add_then_lookup_round_trips() {
    init();
    let (x, y) = (Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let node = ENode::leaf("p").with_uses([x, y]);
    let call = g.add(node.clone()).unwrap();
    assert_eq!(g.lookup(&node), Some(call.clone()));

    // canonicalization is idempotent
    let once = g.canonicalize_call(&call).unwrap();
    let twice = g.canonicalize_call(&once).unwrap();
    assert_eq!(once, twice);

    let shaped = g.canonical_shape(&node).unwrap();
    let reshaped = g.canonical_shape(&shaped.shape).unwrap();
    assert_eq!(shaped.shape, reshaped.shape);
}

#[test]
fn reinsertion_leaves_the_graph_unchanged() {
    init();
    let x = Slot::fresh();
    let mut g = Graph::new();
    let node = ENode::leaf("v").with_uses([x]);
    let first = g.add(node.clone()).unwrap();
    let classes = g.number_of_classes();
    let size = g.total_size();

    let second = g.add(node).unwrap();
    assert!(g.are_same(&first, &second));
    assert_eq!(g.number_of_classes(), classes);
    assert_eq!(g.total_size(), size);
}

#[test]
fn union_is_idempotent_and_symmetric() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    let b = g.add(ENode::leaf("b")).unwrap();

    assert!(!g.union(&a, &a).unwrap());

    assert!(g.union(&a, &b).unwrap());
    let classes = g.number_of_classes();
    // replaying in either order is a no-op
    assert!(!g.union(&a, &b).unwrap());
    assert!(!g.union(&b, &a).unwrap());
    assert_eq!(g.number_of_classes(), classes);
}

#[test]
fn union_many_collapses_duplicate_pairs() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    let b = g.add(ENode::leaf("b")).unwrap();
    let c = g.add(ENode::leaf("c")).unwrap();

    let groups = g
        .union_many(
            &[
                (a.clone(), b.clone()),
                (b.clone(), a.clone()),
                (b.clone(), c.clone()),
                (a.clone(), b.clone()),
            ],
            &seq(),
        )
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
    assert_eq!(g.number_of_classes(), 1);
    for pair in groups[0].windows(2) {
        assert!(g.are_same(&pair[0], &pair[1]));
    }
}

#[test]
fn tree_insertion_is_bottom_up() {
    init();
    let x = Slot::fresh();
    let mut g = Graph::new();
    let tree: MixedTree<&'static str> = MixedTree::node(
        "add",
        [],
        [],
        [
            MixedTree::node("var", [], [x], []),
            MixedTree::node("var", [], [x], []),
        ],
    );
    let root = g.add_tree(&tree).unwrap();
    assert_eq!(root.args.len(), 1);
    assert_eq!(g.number_of_classes(), 2);

    // an atom splices an existing class into a bigger term
    let wrapped: MixedTree<&'static str> =
        MixedTree::node("neg", [], [], [MixedTree::Atom(root.clone())]);
    let neg = g.add_tree(&wrapped).unwrap();
    assert!(!g.are_same(&root, &neg));
    assert_eq!(g.number_of_classes(), 3);
}

#[test]
fn functional_surface_leaves_receiver_usable() {
    init();
    let g = Graph::new();
    let (g2, out) = g.with_added_many(&[ENode::leaf("a"), ENode::leaf("b")], &seq()).unwrap();
    assert_eq!(g.number_of_classes(), 0);
    assert_eq!(g2.number_of_classes(), 2);

    let pair = (out[0].call().clone(), out[1].call().clone());
    let (g3, groups) = g2.with_unioned_many(&[pair], &seq()).unwrap();
    assert_eq!(g2.number_of_classes(), 2);
    assert_eq!(g3.number_of_classes(), 1);
    assert_eq!(groups.len(), 1);
}

#[test]
fn canceled_add_leaves_engine_untouched() {
    init();
    let mut g = Graph::new();
    g.add(ENode::leaf("a")).unwrap();
    let before = g.number_of_classes();

    let token = CancelToken::new();
    token.cancel();
    let par = seq().cancelable(token);
    let out = g.try_add_many(&[ENode::leaf("b")], &par);
    assert_eq!(out, Err(Error::Canceled));
    assert_eq!(g.number_of_classes(), before);
}

#[test]
fn canceled_functional_union_discards_the_stage() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    let b = g.add(ENode::leaf("b")).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let par = seq().cancelable(token);
    let out = g.with_unioned_many(&[(a.clone(), b.clone())], &par);
    assert!(matches!(out, Err(Error::Canceled)));
    assert_eq!(g.number_of_classes(), 2);
    assert!(!g.are_same(&a, &b));
}

#[test]
fn error_paths() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    let b = g.add(ENode::leaf("b")).unwrap();
    g.union(&a, &b).unwrap();

    // one of the two ids lost and was unlinked, but still canonicalizes
    let loser = [a.id, b.id]
        .into_iter()
        .find(|id| g.canonicalize(*id).unwrap().id != *id)
        .unwrap();
    assert!(matches!(g.class(loser), Err(Error::EmptyClassLookup(_))));
    assert!(g.canonicalize(loser).is_some());

    let unknown = ClassId::new(999);
    assert!(matches!(g.class(unknown), Err(Error::NotPresent(_))));
    assert!(g.canonicalize(unknown).is_none());
    assert!(g.lookup(&ENode::leaf("nowhere")).is_none());
}

#[test]
fn users_track_references() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    let _f = g.add(ENode::leaf("f").with_args([a.clone()])).unwrap();
    let users: Vec<_> = g.users(a.id).unwrap().collect();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].op, "f");
}

#[test]
fn enodes_rename_into_the_callers_frame() {
    init();
    let x = Slot::fresh();
    let mut g = Graph::new();
    let v = g.add(ENode::leaf("v").with_uses([x])).unwrap();

    // read the class back under a different slot name
    let z = Slot::fresh();
    let param = v.args.keys().next().unwrap();
    let call = ClassCall::new(v.id, crate::slotmap::SlotMap::from_pairs([(param, z)]));
    let nodes = g.enodes(&call).unwrap();
    assert_eq!(nodes, vec![ENode::leaf("v").with_uses([z])]);
}

#[test]
fn responses_expose_their_calls() {
    init();
    let mut g = Graph::new();
    let out = g
        .try_add_many(&[ENode::leaf("a"), ENode::leaf("a")], &seq())
        .unwrap();
    assert!(matches!(out[0], AddResponse::Added(_)));
    assert!(matches!(out[1], AddResponse::AlreadyThere(_)));
    assert_eq!(out[0].call(), out[1].call());
}

#[test]
fn dump_is_printable() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    g.add(ENode::leaf("f").with_args([a])).unwrap();
    let dump = format!("{:?}", g.dump());
    assert!(dump.contains("EGraph"));
    assert!(dump.contains("users"));
}

#[test]
fn three_parameter_symmetries_compose() {
    init();
    let (x, y, z) = (Slot::fresh(), Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("p").with_uses([x, y, z])).unwrap();
    let rotated = g.add(ENode::leaf("p").with_uses([y, z, x])).unwrap();
    let swapped = g.add(ENode::leaf("p").with_uses([y, x, z])).unwrap();
    assert_eq!(g.number_of_classes(), 1);

    // a 3-cycle and a transposition generate the full symmetric group
    g.union(&a, &rotated).unwrap();
    g.union(&a, &swapped).unwrap();
    let canon = g.canonicalize_call(&a).unwrap();
    assert_eq!(g.group(canon.id).unwrap().count(), 6);

    // eliminating one slot takes its whole orbit with it
    let q = g.add(ENode::leaf("q").with_uses([x])).unwrap();
    g.union(&a, &q).unwrap();
    assert_eq!(g.canonicalize_call(&a).unwrap().args.len(), 0);
}

#[test]
fn binders_combine_with_arguments() {
    init();
    let (d, w) = (Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let bound = g.add(ENode::leaf("var").with_uses([d])).unwrap();
    let free = g.add(ENode::leaf("var").with_uses([w])).unwrap();
    let lam = g
        .add(
            ENode::leaf("lam")
                .with_defs([d])
                .with_args([bound.clone(), free.clone()]),
        )
        .unwrap();
    // only the unbound variable is a parameter
    assert_eq!(lam.args.len(), 1);
    assert_eq!(lam.args.values().next(), Some(w));

    // the same term under different binder and free names
    let (d2, w2) = (Slot::fresh(), Slot::fresh());
    let bound2 = g.add(ENode::leaf("var").with_uses([d2])).unwrap();
    let free2 = g.add(ENode::leaf("var").with_uses([w2])).unwrap();
    let lam2 = g
        .add(
            ENode::leaf("lam")
                .with_defs([d2])
                .with_args([bound2, free2]),
        )
        .unwrap();
    assert_eq!(
        g.canonicalize_call(&lam).unwrap().id,
        g.canonicalize_call(&lam2).unwrap().id
    );
    assert_eq!(lam2.args.values().next(), Some(w2));
}

#[test]
fn symmetry_merges_existing_parents() {
    init();
    let (x, y) = (Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("p").with_uses([x, y])).unwrap();
    let b = g.add(ENode::leaf("p").with_uses([y, x])).unwrap();
    let vx = g.add(ENode::leaf("v").with_uses([x])).unwrap();

    // pinning the second argument to x keeps the two parents apart
    let h1 = g
        .add(ENode::leaf("h").with_args([a.clone(), vx.clone()]))
        .unwrap();
    let h2 = g
        .add(ENode::leaf("h").with_args([b.clone(), vx.clone()]))
        .unwrap();
    assert_ne!(
        g.canonicalize_call(&h1).unwrap().id,
        g.canonicalize_call(&h2).unwrap().id
    );

    // the discovered swap symmetry makes the parents collide
    g.union(&a, &b).unwrap();
    assert_eq!(
        g.canonicalize_call(&h1).unwrap().id,
        g.canonicalize_call(&h2).unwrap().id
    );
}

#[test]
fn partially_overlapping_frames_shrink_both_sides() {
    init();
    let (x, y, z) = (Slot::fresh(), Slot::fresh(), Slot::fresh());
    let mut g = Graph::new();
    let p = g.add(ENode::leaf("p").with_uses([x, y])).unwrap();
    let q = g.add(ENode::leaf("q").with_uses([y, z])).unwrap();

    // only y is visible from both sides, so x and z die first
    g.union(&p, &q).unwrap();
    let canon = g.canonicalize_call(&p).unwrap();
    assert_eq!(canon.args.len(), 1);
    assert_eq!(canon.args.values().next(), Some(y));
    assert!(g.are_same(&p, &q));
}

#[test]
fn emptied_engines_are_independent() {
    init();
    let mut g = Graph::new();
    g.add(ENode::leaf("a")).unwrap();
    let mut fresh = g.emptied();
    assert_eq!(fresh.number_of_classes(), 0);
    fresh.add(ENode::leaf("b")).unwrap();
    assert_eq!(g.number_of_classes(), 1);
    assert!(g.lookup(&ENode::leaf("b")).is_none());
}

#[test]
fn union_survives_repeated_random_order_batches() {
    init();
    let mut g: EGraph<u32> = EGraph::new();
    let calls: Vec<_> = (0..8).map(|i| g.add(ENode::leaf(i)).unwrap()).collect();
    // two batches covering the same partition in different orders must
    // agree with a single batch over the union of the pairs
    let mut h = g.clone();
    g.union_many(
        &[
            (calls[0].clone(), calls[1].clone()),
            (calls[2].clone(), calls[3].clone()),
        ],
        &seq(),
    )
    .unwrap();
    g.union_many(
        &[
            (calls[3].clone(), calls[2].clone()),
            (calls[1].clone(), calls[0].clone()),
        ],
        &seq(),
    )
    .unwrap();

    h.union_many(
        &[
            (calls[2].clone(), calls[3].clone()),
            (calls[0].clone(), calls[1].clone()),
        ],
        &seq(),
    )
    .unwrap();

    assert_eq!(g.number_of_classes(), h.number_of_classes());
    assert_eq!(g.total_size(), h.total_size());
    for pair in [(0, 1), (2, 3)] {
        assert!(g.are_same(&calls[pair.0], &calls[pair.1]));
        assert!(h.are_same(&calls[pair.0], &calls[pair.1]));
    }
    assert!(!g.are_same(&calls[0], &calls[2]));
}

#[test]
fn nested_binders_normalize() {
    init();
    let mut g = Graph::new();
    let lam = |d: Slot, body: MixedTree<&'static str>| -> MixedTree<&'static str> {
        MixedTree::node("lam", [d], [], [body])
    };
    let pair = |p: Slot, q: Slot| -> MixedTree<&'static str> {
        MixedTree::node("pair", [], [p, q], [])
    };

    let (p, q) = (Slot::fresh(), Slot::fresh());
    let (r, s) = (Slot::fresh(), Slot::fresh());
    let t1 = lam(p, lam(q, pair(p, q)));
    let t2 = lam(r, lam(s, pair(r, s)));

    let c1 = g.add_tree(&t1).unwrap();
    let c2 = g.add_tree(&t2).unwrap();
    // closed terms: no parameters, and the binder names washed out
    assert!(c1.args.is_empty());
    assert_eq!(c1, c2);
    assert_eq!(g.number_of_classes(), 3);
}

/// A fixpoint loop over two hand-rolled ground rewrites, driven entirely
/// through the read/write API the way a searcher/applier collaborator
/// would be.
#[test]
fn mini_saturation_closes_ground_arithmetic() {
    init();
    let mut g = Graph::new();
    let a = g.add(ENode::leaf("a")).unwrap();
    let b = g.add(ENode::leaf("b")).unwrap();
    let c = g.add(ENode::leaf("c")).unwrap();
    let plus = |g: &mut Graph, l: &ClassCall, r: &ClassCall| {
        g.add(ENode::leaf("+").with_args([l.clone(), r.clone()])).unwrap()
    };
    let ab = plus(&mut g, &a, &b);
    let ab_c = plus(&mut g, &ab, &c);
    let bc = plus(&mut g, &b, &c);
    let a_bc = plus(&mut g, &a, &bc);
    assert!(!g.are_same(&ab_c, &a_bc));

    loop {
        let before = (g.number_of_classes(), g.total_size());

        let mut sums = Vec::new();
        for id in g.classes().collect::<Vec<_>>() {
            let call = g.canonicalize(id).unwrap();
            for node in g.enodes(&call).unwrap() {
                if node.op == "+" && node.args.len() == 2 {
                    sums.push((call.clone(), node));
                }
            }
        }

        let mut pairs = Vec::new();
        for (call, node) in &sums {
            // (+ x y) = (+ y x)
            let flipped = plus(&mut g, &node.args[1], &node.args[0]);
            pairs.push((call.clone(), flipped));
            // (+ (+ x y) z) = (+ x (+ y z))
            for inner in g.enodes(&node.args[0]).unwrap() {
                if inner.op == "+" && inner.args.len() == 2 {
                    let right = plus(&mut g, &inner.args[1], &node.args[1]);
                    let rebalanced = plus(&mut g, &inner.args[0], &right);
                    pairs.push((call.clone(), rebalanced));
                }
            }
        }
        g.union_many(&pairs, &seq()).unwrap();

        if (g.number_of_classes(), g.total_size()) == before {
            break;
        }
    }

    assert!(g.are_same(&ab_c, &a_bc));
    let ba = plus(&mut g, &b, &a);
    assert!(g.are_same(&ab, &ba));
    g.check_invariants();
}

#[test]
fn wide_union_batches_settle() {
    init();
    let mut g: EGraph<u32> = EGraph::new();
    let leaves: Vec<_> = (0..50).map(|i| g.add(ENode::leaf(i)).unwrap()).collect();
    let wrappers: Vec<_> = leaves
        .iter()
        .map(|l| g.add(ENode::leaf(1000).with_args([l.clone()])).unwrap())
        .collect();
    assert_eq!(g.number_of_classes(), 100);

    let pairs: Vec<_> = leaves
        .windows(2)
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect();
    let groups = g.union_many(&pairs, &ParallelMap::workers()).unwrap();

    // the leaves became one class and dragged their wrappers along
    assert_eq!(g.number_of_classes(), 2);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups.iter().map(|grp| grp.len()).sum::<usize>(), 100);
    for w in wrappers.windows(2) {
        assert!(g.are_same(&w[0], &w[1]));
    }
}

#[test]
fn shared_reads_run_concurrently() {
    init();
    let mut g = Graph::new();
    let x = Slot::fresh();
    let v = g.add(ENode::leaf("v").with_uses([x])).unwrap();
    let g = g;
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    assert!(g.canonicalize_call(&v).is_some());
                    assert_eq!(g.number_of_classes(), 1);
                    assert_eq!(g.enodes(&v).unwrap().len(), 1);
                }
            });
        }
    });
}

#[test]
fn tree_of_unrolls_cycles_to_depth() {
    init();
    let mut g = Graph::new();
    let n = g.add(ENode::leaf("n")).unwrap();
    let wrap = g.add(ENode::leaf("w").with_args([n.clone()])).unwrap();
    g.union(&n, &wrap).unwrap();

    let tree = g.tree_of(&g.canonicalize_call(&wrap).unwrap(), 3).unwrap();
    assert!(tree.len() <= 3);
    for atom in tree.atoms() {
        assert!(g.canonicalize_call(atom).is_some());
    }
    let shallow = g.tree_of(&wrap, 0).unwrap();
    assert!(shallow.is_atom());
}

#[test]
fn deep_chain_survives_repeated_unions() {
    init();
    let mut g = Graph::new();
    // f(f(f(a))) and g-chain over b, then a = b collapses everything level
    // by level
    let a = g.add(ENode::leaf("a")).unwrap();
    let b = g.add(ENode::leaf("b")).unwrap();
    let mut left = a.clone();
    let mut right = b.clone();
    for _ in 0..3 {
        left = g.add(ENode::leaf("f").with_args([left])).unwrap();
        right = g.add(ENode::leaf("f").with_args([right])).unwrap();
    }
    assert!(!g.are_same(&left, &right));

    g.union(&a, &b).unwrap();
    assert!(g.are_same(&left, &right));
    assert_eq!(g.number_of_classes(), 4);
    g.check_invariants();
}
