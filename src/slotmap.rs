use std::fmt;

use smallvec::SmallVec;

use crate::{
    error::{Error, Result},
    slot::{Slot, SlotSet},
    utils::{fmt_iter, HashMap},
};

/// A total, finite function from slots to slots.
///
/// Stored as two parallel arrays with the keys unique and ascending, so
/// lookups are binary searches and the bulk operations are linear merges.
/// Throughout the engine these maps are *renamings*: the map attached to a
/// class reference translates the class's parameter slots into the slots
/// of whoever is holding the reference.
///
/// Composition reads left to right: `a.compose(&b)` applies `a` first.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotMap {
    keys: SmallVec<[Slot; 4]>,
    vals: SmallVec<[Slot; 4]>,
}

impl SlotMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from key/value pairs. Later pairs overwrite earlier ones.
    pub fn from_pairs<I: IntoIterator<Item = (Slot, Slot)>>(pairs: I) -> Self {
        let mut m = SlotMap::new();
        for (k, v) in pairs {
            m.insert(k, v);
        }
        m
    }

    /// The identity map on `set`.
    pub fn identity(set: &SlotSet) -> Self {
        let keys: SmallVec<[Slot; 4]> = set.iter().collect();
        SlotMap { vals: keys.clone(), keys }
    }

    /// A bijection from `set` onto freshly generated slots.
    pub fn fresh_for(set: &SlotSet) -> Self {
        let keys: SmallVec<[Slot; 4]> = set.iter().collect();
        let vals: SmallVec<[Slot; 4]> = keys.iter().map(|_| Slot::fresh()).collect();
        SlotMap { keys, vals }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn insert(&mut self, k: Slot, v: Slot) {
        match self.keys.binary_search(&k) {
            Ok(i) => self.vals[i] = v,
            Err(i) => {
                self.keys.insert(i, k);
                self.vals.insert(i, v);
            }
        }
    }

    pub fn get(&self, k: Slot) -> Option<Slot> {
        self.keys.binary_search(&k).ok().map(|i| self.vals[i])
    }

    pub fn contains_key(&self, k: Slot) -> bool {
        self.keys.binary_search(&k).is_ok()
    }

    /// The image of `k`, or `k` itself when the map does not mention it.
    /// This is the convention used when renaming over whole terms: slots a
    /// renaming does not speak about pass through untouched.
    pub fn apply(&self, k: Slot) -> Slot {
        self.get(k).unwrap_or(k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, Slot)> + '_ {
        self.keys.iter().copied().zip(self.vals.iter().copied())
    }

    pub fn keys(&self) -> impl Iterator<Item = Slot> + '_ {
        self.keys.iter().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = Slot> + '_ {
        self.vals.iter().copied()
    }

    pub fn key_set(&self) -> SlotSet {
        self.keys().collect()
    }

    pub fn value_set(&self) -> SlotSet {
        self.values().collect()
    }

    pub fn is_bijection(&self) -> bool {
        self.value_set().len() == self.len()
    }

    /// A bijection whose value set equals its key set.
    pub fn is_permutation(&self) -> bool {
        self.is_bijection() && self.value_set() == self.key_set()
    }

    pub fn is_identity(&self) -> bool {
        self.iter().all(|(k, v)| k == v)
    }

    /// Swaps keys and values. Fails unless the map is one-to-one.
    pub fn inverse(&self) -> Result<SlotMap> {
        if !self.is_bijection() {
            return Err(Error::NotBijection);
        }
        Ok(SlotMap::from_pairs(self.iter().map(|(k, v)| (v, k))))
    }

    /// Set-theoretic union of the entries; on a key collision `other` wins.
    pub fn concat(&self, other: &SlotMap) -> SlotMap {
        let mut keys = SmallVec::with_capacity(self.len() + other.len());
        let mut vals = SmallVec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.keys.len() && j < other.keys.len() {
            match self.keys[i].cmp(&other.keys[j]) {
                std::cmp::Ordering::Less => {
                    keys.push(self.keys[i]);
                    vals.push(self.vals[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    keys.push(other.keys[j]);
                    vals.push(other.vals[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    keys.push(other.keys[j]);
                    vals.push(other.vals[j]);
                    i += 1;
                    j += 1;
                }
            }
        }
        keys.extend_from_slice(&self.keys[i..]);
        vals.extend_from_slice(&self.vals[i..]);
        keys.extend_from_slice(&other.keys[j..]);
        vals.extend_from_slice(&other.vals[j..]);
        SlotMap { keys, vals }
    }

    /// `other ∘ self`: maps every `k → v` of `self` to `k → other(v)`.
    /// Every intermediate value must be a key of `other`.
    pub fn compose(&self, other: &SlotMap) -> Result<SlotMap> {
        let mut out = self.clone();
        for v in out.vals.iter_mut() {
            *v = other.get(*v).ok_or(Error::IntermediateNotCovered(*v))?;
        }
        Ok(out)
    }

    /// Like [`compose`](Self::compose) but drops entries whose intermediate
    /// value `other` does not cover.
    pub fn compose_partial(&self, other: &SlotMap) -> SlotMap {
        SlotMap::from_pairs(
            self.iter()
                .filter_map(|(k, v)| other.get(v).map(|w| (k, w))),
        )
    }

    /// Like [`compose`](Self::compose) but keeps `k → v` unchanged when
    /// `other` does not cover `v`.
    pub fn compose_retain(&self, other: &SlotMap) -> SlotMap {
        SlotMap::from_pairs(self.iter().map(|(k, v)| (k, other.apply(v))))
    }

    /// Like [`compose_retain`](Self::compose_retain) but substitutes a fresh
    /// slot for every uncovered intermediate value, one fresh slot per
    /// distinct value. Uncovered slots stay distinguishable from everything
    /// else while remaining equal to themselves across the result.
    pub fn compose_fresh(&self, other: &SlotMap) -> SlotMap {
        let mut isolated: HashMap<Slot, Slot> = HashMap::default();
        SlotMap::from_pairs(self.iter().map(|(k, v)| match other.get(v) {
            Some(w) => (k, w),
            None => (k, *isolated.entry(v).or_insert_with(Slot::fresh)),
        }))
    }

    pub fn filter_keys<P: Fn(Slot) -> bool>(&self, p: P) -> SlotMap {
        SlotMap::from_pairs(self.iter().filter(|&(k, _)| p(k)))
    }

    /// Rewrites both keys and values through `renaming`.
    pub fn rename(&self, renaming: &SlotMap) -> SlotMap {
        SlotMap::from_pairs(
            self.iter()
                .map(|(k, v)| (renaming.apply(k), renaming.apply(v))),
        )
    }
}

impl FromIterator<(Slot, Slot)> for SlotMap {
    fn from_iter<I: IntoIterator<Item = (Slot, Slot)>>(iter: I) -> Self {
        SlotMap::from_pairs(iter)
    }
}

impl fmt::Debug for SlotMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_iter(
            ["{", ", ", "}"],
            self.iter(),
            |(k, v), f| write!(f, "{k}->{v}"),
            f,
        )
    }
}

impl fmt::Display for SlotMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn s(n: u32) -> Slot {
        Slot::numeric(n)
    }

    fn m(pairs: &[(u32, u32)]) -> SlotMap {
        SlotMap::from_pairs(pairs.iter().map(|&(k, v)| (s(k), s(v))))
    }

    #[test]
    fn later_pairs_win() {
        assert_eq!(m(&[(0, 1), (0, 2)]), m(&[(0, 2)]));
    }

    #[test]
    fn apply_defaults_to_self() {
        let p = m(&[(0, 1)]);
        assert_eq!(p.apply(s(0)), s(1));
        assert_eq!(p.apply(s(9)), s(9));
    }

    #[test]
    fn inverse_round_trips() {
        let p = m(&[(0, 5), (1, 3), (2, 4)]);
        assert_eq!(p.inverse().unwrap().inverse().unwrap(), p);
        assert_eq!(m(&[(0, 1), (2, 1)]).inverse(), Err(Error::NotBijection));
    }

    #[test]
    fn identity_laws() {
        let p = m(&[(0, 5), (1, 3)]);
        assert_eq!(p.compose(&SlotMap::identity(&p.value_set())).unwrap(), p);
        assert_eq!(SlotMap::identity(&p.key_set()).compose(&p).unwrap(), p);
    }

    #[test]
    fn compose_requires_cover() {
        let a = m(&[(0, 1), (2, 3)]);
        let b = m(&[(1, 7)]);
        assert_eq!(a.compose(&b), Err(Error::IntermediateNotCovered(s(3))));
        assert_eq!(a.compose_partial(&b), m(&[(0, 7)]));
        assert_eq!(a.compose_retain(&b), m(&[(0, 7), (2, 3)]));
    }

    #[test]
    fn compose_fresh_isolates_consistently() {
        let a = m(&[(0, 9), (1, 9), (2, 3)]);
        let b = m(&[(3, 4)]);
        let out = a.compose_fresh(&b);
        assert_eq!(out.get(s(2)), Some(s(4)));
        let f0 = out.get(s(0)).unwrap();
        let f1 = out.get(s(1)).unwrap();
        assert_eq!(f0, f1);
        assert!(f0.is_fresh());
    }

    #[test]
    fn concat_other_wins() {
        assert_eq!(
            m(&[(0, 1), (2, 3)]).concat(&m(&[(2, 9), (4, 5)])),
            m(&[(0, 1), (2, 9), (4, 5)])
        );
    }

    #[test_case(&[(0, 1), (1, 0)], true; "swap")]
    #[test_case(&[(0, 1), (1, 2)], false; "shifted off the set")]
    #[test_case(&[(0, 0)], true; "identity")]
    fn permutation_check(pairs: &[(u32, u32)], expect: bool) {
        assert_eq!(m(pairs).is_permutation(), expect);
    }

    #[test]
    fn compose_is_associative_when_covered() {
        let a = m(&[(0, 1), (2, 3)]);
        let b = m(&[(1, 4), (3, 5)]);
        let c = m(&[(4, 6), (5, 7)]);
        assert_eq!(
            a.compose(&b).unwrap().compose(&c).unwrap(),
            a.compose(&b.compose(&c).unwrap()).unwrap()
        );
    }

    #[test]
    fn filter_keys_restricts() {
        let p = m(&[(0, 5), (1, 6), (2, 7)]);
        let even = p.filter_keys(|k| k == s(0) || k == s(2));
        assert_eq!(even, m(&[(0, 5), (2, 7)]));
    }

    #[test]
    fn concat_with_empty_is_identity() {
        let p = m(&[(0, 5), (1, 6)]);
        assert_eq!(p.concat(&SlotMap::new()), p);
        assert_eq!(SlotMap::new().concat(&p), p);
    }

    #[test]
    fn display_lists_entries_in_key_order() {
        let p = m(&[(2, 0), (1, 3)]);
        assert_eq!(format!("{p}"), "{$1->$3, $2->$0}");
    }

    #[test]
    fn fresh_for_is_a_fresh_bijection() {
        let set = [s(0), s(1)].into_iter().collect();
        let p = SlotMap::fresh_for(&set);
        assert!(p.is_bijection());
        assert_eq!(p.key_set(), set);
        assert!(p.values().all(|v| v.is_fresh()));
    }

    #[test]
    fn ordering_is_keys_then_values() {
        assert!(m(&[(0, 1)]) < m(&[(1, 0)]));
        assert!(m(&[(0, 1)]) < m(&[(0, 2)]));
    }

    #[test]
    fn rename_rewrites_both_sides() {
        let p = m(&[(0, 1)]);
        let r = m(&[(0, 10), (1, 11)]);
        assert_eq!(p.rename(&r), m(&[(10, 11)]));
    }
}
