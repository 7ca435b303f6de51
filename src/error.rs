use crate::{graph::ClassId, slot::Slot};

/// Everything that can go wrong inside the engine.
///
/// All failures are local: no operation that returns an `Error` loses or
/// corrupts graph state. `NotPresent` and `EmptyClassLookup` are ordinary
/// conditions a caller handles; `NotBijection` and `IntermediateNotCovered`
/// indicate a caller handed a renaming to a site that requires more of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("class {0} is unknown to the union-find")]
    NotPresent(ClassId),

    #[error("slot map is not a bijection")]
    NotBijection,

    #[error("intermediate slot {0} is not covered by the right-hand map")]
    IntermediateNotCovered(Slot),

    #[error("class {0} has been merged away; canonicalize the reference first")]
    EmptyClassLookup(ClassId),

    #[error("operation canceled")]
    Canceled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
