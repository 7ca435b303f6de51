use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use smallvec::SmallVec;

use crate::utils::fmt_iter;

/// Fresh slots are allocated above this bound so they never collide with
/// numbered slots handed out by [`Slot::numeric`].
const FRESH_BASE: u32 = 1 << 31;

static FRESH_COUNTER: AtomicU32 = AtomicU32::new(FRESH_BASE);

/// An opaque variable name.
///
/// A slot is only an identity: the engine compares and renames slots but
/// never interprets them. Nodes mention slots in three roles: as binders
/// they introduce (`defs`), as free-variable positions (`uses`), and inside
/// the renamings attached to child-class references.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u32);

impl Slot {
    /// A named slot. Shapes use the low numbers for their canonical labels;
    /// callers are free to use them for hand-built terms.
    pub fn numeric(n: u32) -> Self {
        assert!(n < FRESH_BASE, "numeric slot out of range");
        Slot(n)
    }

    /// A slot no one has seen before.
    pub fn fresh() -> Self {
        let n = FRESH_COUNTER.fetch_add(1, Ordering::Relaxed);
        assert!(n >= FRESH_BASE, "fresh slot counter wrapped");
        Slot(n)
    }

    pub fn is_fresh(&self) -> bool {
        self.0 >= FRESH_BASE
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fresh() {
            write!(f, "$f{}", self.0 - FRESH_BASE)
        } else {
            write!(f, "${}", self.0)
        }
    }
}

/// A sorted set of slots.
///
/// Stored as an ascending, duplicate-free sequence; the bulk operations are
/// linear merges.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotSet(SmallVec<[Slot; 4]>);

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(s: Slot) -> Self {
        SlotSet(SmallVec::from_slice(&[s]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, s: Slot) -> bool {
        self.0.binary_search(&s).is_ok()
    }

    pub fn insert(&mut self, s: Slot) -> bool {
        match self.0.binary_search(&s) {
            Ok(_) => false,
            Err(i) => {
                self.0.insert(i, s);
                true
            }
        }
    }

    pub fn remove(&mut self, s: Slot) -> bool {
        match self.0.binary_search(&s) {
            Ok(i) => {
                self.0.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Slot> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Slot] {
        &self.0
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = SmallVec::with_capacity(self.0.len() + other.0.len());
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            match self.0[i].cmp(&other.0[j]) {
                std::cmp::Ordering::Less => {
                    out.push(self.0[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(other.0[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(self.0[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.0[i..]);
        out.extend_from_slice(&other.0[j..]);
        SlotSet(out)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        SlotSet(self.0.iter().copied().filter(|s| other.contains(*s)).collect())
    }

    pub fn difference(&self, other: &Self) -> Self {
        SlotSet(self.0.iter().copied().filter(|s| !other.contains(*s)).collect())
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.iter().all(|s| other.contains(*s))
    }
}

impl FromIterator<Slot> for SlotSet {
    fn from_iter<I: IntoIterator<Item = Slot>>(iter: I) -> Self {
        let mut v: SmallVec<[Slot; 4]> = iter.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        SlotSet(v)
    }
}

impl IntoIterator for SlotSet {
    type Item = Slot;
    type IntoIter = smallvec::IntoIter<[Slot; 4]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SlotSet {
    type Item = &'a Slot;
    type IntoIter = std::slice::Iter<'a, Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for SlotSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_iter(["{", ", ", "}"], self.iter(), |s, f| write!(f, "{s}"), f)
    }
}

impl fmt::Display for SlotSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
