use std::fmt;

use crate::{
    slot::{Slot, SlotSet},
    slotmap::SlotMap,
    utils::HashMap,
};

/// A finitely generated group of permutations of a fixed slot set.
///
/// Only the base set and the generators are stored. Membership questions
/// build a Schreier–Sims stabilizer chain, which answers in time polynomial
/// in the base size; full enumeration ([`all_perms`](Self::all_perms)) is
/// reserved for the tiny groups that show up while canonicalizing a single
/// e-node.
///
/// Every element fixes the base set setwise, and the identity is always a
/// member.
#[derive(Clone, PartialEq, Eq)]
pub struct PermGroup {
    slots: SlotSet,
    generators: Vec<SlotMap>,
}

impl PermGroup {
    /// The trivial group on `slots`.
    pub fn identity_on(slots: SlotSet) -> Self {
        PermGroup {
            slots,
            generators: Vec::new(),
        }
    }

    /// A group generated by `generators`, each a permutation of `slots`.
    pub fn new<I: IntoIterator<Item = SlotMap>>(slots: SlotSet, generators: I) -> Self {
        let mut group = PermGroup::identity_on(slots);
        for g in generators {
            debug_assert!(g.is_permutation() && g.key_set() == group.slots);
            if !g.is_identity() && !group.generators.contains(&g) {
                group.generators.push(g);
            }
        }
        group
    }

    pub fn slots(&self) -> &SlotSet {
        &self.slots
    }

    pub fn identity(&self) -> SlotMap {
        SlotMap::identity(&self.slots)
    }

    pub fn generators(&self) -> &[SlotMap] {
        &self.generators
    }

    pub fn is_trivial(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn contains(&self, p: &SlotMap) -> bool {
        if !p.is_permutation() || p.key_set() != self.slots {
            return false;
        }
        if p.is_identity() {
            return true;
        }
        StabChain::from_generators(&self.slots, &self.generators).contains(p)
    }

    /// All slots reachable from `s` under the group.
    pub fn orbit(&self, s: Slot) -> SlotSet {
        let mut orbit = SlotSet::singleton(s);
        let mut queue = vec![s];
        while let Some(o) = queue.pop() {
            for g in &self.generators {
                let o2 = g.apply(o);
                if orbit.insert(o2) {
                    queue.push(o2);
                }
            }
        }
        orbit
    }

    /// Extends the group by every candidate it does not already contain.
    /// Returns `None` when every candidate was already a member.
    pub fn try_add_set(&self, candidates: &[SlotMap]) -> Option<PermGroup> {
        let mut chain = StabChain::from_generators(&self.slots, &self.generators);
        let mut generators = self.generators.clone();
        let mut grew = false;
        for c in candidates {
            debug_assert!(c.is_permutation() && c.key_set() == self.slots);
            if c.is_identity() || chain.contains(c) {
                continue;
            }
            chain.add(c.clone());
            generators.push(c.clone());
            grew = true;
        }
        grew.then(|| PermGroup {
            slots: self.slots.clone(),
            generators,
        })
    }

    /// Enumerates every element. Exponential in the worst case; only call
    /// this on the per-argument groups of a single e-node.
    pub fn all_perms(&self) -> Vec<SlotMap> {
        let mut elems = vec![self.identity()];
        let mut i = 0;
        while i < elems.len() {
            let e = elems[i].clone();
            for g in &self.generators {
                let next = e.compose(g).unwrap();
                if !elems.contains(&next) {
                    elems.push(next);
                }
            }
            i += 1;
        }
        elems
    }

    /// The group order, read off the stabilizer chain.
    pub fn count(&self) -> usize {
        StabChain::from_generators(&self.slots, &self.generators)
            .levels
            .iter()
            .map(|l| l.transversal.len())
            .product()
    }

    /// The action of the group on `keep`. Only meaningful when `keep` is a
    /// union of orbits, which is what the shrink step guarantees.
    pub fn restrict(&self, keep: &SlotSet) -> PermGroup {
        debug_assert!(keep.iter().all(|s| self.orbit(s).is_subset(keep)));
        let generators = self
            .generators
            .iter()
            .map(|g| g.filter_keys(|k| keep.contains(k)))
            .collect::<Vec<_>>();
        PermGroup::new(keep.clone(), generators)
    }
}

impl fmt::Debug for PermGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermGroup")
            .field("slots", &self.slots)
            .field("generators", &self.generators)
            .finish()
    }
}

/// A stabilizer chain: one level per base point, each holding the orbit of
/// its point (as a transversal of coset representatives) under the
/// generators that fix every earlier point.
struct StabChain {
    omega: SlotSet,
    levels: Vec<Level>,
}

struct Level {
    point: Slot,
    gens: Vec<SlotMap>,
    // orbit element -> permutation taking `point` to it
    transversal: HashMap<Slot, SlotMap>,
}

impl StabChain {
    fn from_generators(omega: &SlotSet, gens: &[SlotMap]) -> Self {
        let mut chain = StabChain {
            omega: omega.clone(),
            levels: Vec::new(),
        };
        for g in gens {
            chain.add(g.clone());
        }
        chain
    }

    fn contains(&self, p: &SlotMap) -> bool {
        self.sift(p.clone(), 0).is_none()
    }

    /// Reduces `p` level by level, dividing out a coset representative at
    /// each one. `None` means `p` reduced to the identity (membership);
    /// otherwise the residue and the level it got stuck at come back.
    fn sift(&self, mut p: SlotMap, from: usize) -> Option<(SlotMap, usize)> {
        for (i, lvl) in self.levels.iter().enumerate().skip(from) {
            if p.is_identity() {
                return None;
            }
            let img = p.apply(lvl.point);
            if img == lvl.point {
                continue;
            }
            let Some(t) = lvl.transversal.get(&img) else {
                return Some((p, i));
            };
            p = p.compose(&t.inverse().unwrap()).unwrap();
        }
        if p.is_identity() {
            None
        } else {
            Some((p, self.levels.len()))
        }
    }

    fn add(&mut self, p: SlotMap) {
        self.add_at(p, 0)
    }

    fn add_at(&mut self, p: SlotMap, from: usize) {
        let Some((residue, at)) = self.sift(p, from) else {
            return;
        };
        if at == self.levels.len() {
            // the residue fixes every existing base point; open a new level
            // on some point it moves
            let point = residue
                .iter()
                .find(|(k, v)| k != v)
                .map(|(k, _)| k)
                .unwrap();
            let mut transversal = HashMap::default();
            transversal.insert(point, SlotMap::identity(&self.omega));
            self.levels.push(Level {
                point,
                gens: Vec::new(),
                transversal,
            });
        }
        self.levels[at].gens.push(residue);
        self.close(at);
    }

    /// Recomputes the orbit closure of level `at` and sifts every Schreier
    /// generator into the deeper levels.
    fn close(&mut self, at: usize) {
        let mut queue: Vec<Slot> = self.levels[at].transversal.keys().copied().collect();
        let mut schreier = Vec::new();
        while let Some(o) = queue.pop() {
            let gens = self.levels[at].gens.clone();
            for g in &gens {
                let o2 = g.apply(o);
                let walk = self.levels[at].transversal[&o].compose(g).unwrap();
                match self.levels[at].transversal.get(&o2) {
                    Some(t2) => {
                        // non-tree edge: the loop it closes fixes the point
                        schreier.push(walk.compose(&t2.inverse().unwrap()).unwrap());
                    }
                    None => {
                        self.levels[at].transversal.insert(o2, walk);
                        queue.push(o2);
                    }
                }
            }
        }
        for s in schreier {
            self.add_at(s, at + 1);
        }
    }
}
