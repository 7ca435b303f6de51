use std::fmt;

pub(crate) type BuildHasher = fxhash::FxBuildHasher;
pub(crate) type HashMap<K, V, B = BuildHasher> = std::collections::HashMap<K, V, B>;
pub(crate) type Instant = quanta::Instant;

pub(crate) fn fmt_iter<E, F>(
    symbols: [&str; 3],
    mut it: impl Iterator<Item = E>,
    fmt_e: F,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result
where
    F: Fn(&E, &mut fmt::Formatter<'_>) -> fmt::Result,
{
    let start = symbols[0];
    let delimiter = symbols[1];
    let end = symbols[2];
    write!(f, "{start}")?;
    if let Some(first) = it.next() {
        fmt_e(&first, f)?;
    }
    for e in it {
        write!(f, "{delimiter}")?;
        fmt_e(&e, f)?;
    }
    write!(f, "{end}")?;
    Ok(())
}
