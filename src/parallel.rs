use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::trace;
use rayon::prelude::*;
use symbol_table::GlobalSymbol;

use crate::{
    error::{Error, Result},
    utils::Instant,
};

/// A cooperative cancellation flag.
///
/// Cloning shares the flag. The engine polls it at fixed checkpoints:
/// before each batch and before each per-item computation of the pure
/// phase. Cancellation never corrupts an engine; see the individual write
/// operations for what exactly is staged.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Trips the flag after `after` from a detached timer thread.
    pub fn cancel_after(&self, after: Duration) {
        let token = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(after);
            token.cancel();
        });
    }
}

#[derive(Clone)]
enum Strategy {
    Sequential,
    /// rayon's global pool.
    Workers,
    /// A dedicated pool with a fixed thread count.
    Fixed(Arc<rayon::ThreadPool>),
}

/// An order-preserving map strategy the caller hands to each engine
/// operation.
///
/// The engine only ever uses it for work that is pure against the
/// pre-operation state, so a sequential strategy is always correct; the
/// parallel ones just go faster. Scopes carry a name
/// ([`child`](Self::child)) purely for the timing reports logged at trace
/// level.
#[derive(Clone)]
pub struct ParallelMap {
    name: GlobalSymbol,
    strategy: Strategy,
    token: Option<CancelToken>,
}

impl ParallelMap {
    /// Runs everything on the calling thread.
    pub fn sequential() -> Self {
        ParallelMap {
            name: "root".into(),
            strategy: Strategy::Sequential,
            token: None,
        }
    }

    /// Fans out on the global worker pool.
    pub fn workers() -> Self {
        ParallelMap {
            name: "root".into(),
            strategy: Strategy::Workers,
            token: None,
        }
    }

    /// Fans out on a dedicated pool of `threads` threads.
    pub fn fixed(threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("building a fixed-size thread pool");
        ParallelMap {
            name: "root".into(),
            strategy: Strategy::Fixed(Arc::new(pool)),
            token: None,
        }
    }

    /// A scope with the same strategy and token under a nested name.
    pub fn child(&self, name: &str) -> Self {
        let mut out = self.clone();
        out.name = format!("{}/{name}", self.name).into();
        out
    }

    /// The same strategy, checking `token` before each element.
    pub fn cancelable(&self, token: CancelToken) -> Self {
        let mut out = self.clone();
        out.token = Some(token);
        out
    }

    pub fn token(&self) -> Option<&CancelToken> {
        self.token.as_ref()
    }

    /// Maps `f` over `items`, preserving order. Fails with
    /// [`Error::Canceled`] as soon as the token trips.
    pub fn apply<T, U, F>(&self, items: &[T], f: F) -> Result<Vec<U>>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        let start = Instant::now();
        let out = match &self.strategy {
            Strategy::Sequential => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.poll()?;
                    out.push(f(item));
                }
                out
            }
            Strategy::Workers => self.apply_par(items, &f)?,
            Strategy::Fixed(pool) => pool.install(|| self.apply_par(items, &f))?,
        };
        trace!(
            "{}: mapped {} items in {:?}",
            self.name,
            items.len(),
            start.elapsed()
        );
        Ok(out)
    }

    /// Runs one closure under this scope, for the timing report.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        trace!("{}: ran in {:?}", self.name, start.elapsed());
        out
    }

    fn apply_par<T, U, F>(&self, items: &[T], f: &F) -> Result<Vec<U>>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        let token = self.token.clone();
        items
            .par_iter()
            .map(|item| {
                if token.as_ref().is_some_and(CancelToken::is_canceled) {
                    None
                } else {
                    Some(f(item))
                }
            })
            .collect::<Option<Vec<U>>>()
            .ok_or(Error::Canceled)
    }

    fn poll(&self) -> Result<()> {
        if self.token.as_ref().is_some_and(CancelToken::is_canceled) {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

impl Default for ParallelMap {
    fn default() -> Self {
        Self::sequential()
    }
}

impl fmt::Debug for ParallelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.strategy {
            Strategy::Sequential => "sequential",
            Strategy::Workers => "workers",
            Strategy::Fixed(_) => "fixed",
        };
        f.debug_struct("ParallelMap")
            .field("name", &self.name.as_str())
            .field("strategy", &strategy)
            .field("cancelable", &self.token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn apply_preserves_order() {
        let items: Vec<u32> = (0..100).collect();
        let seq = ParallelMap::sequential().apply(&items, |x| x * 2).unwrap();
        let par = ParallelMap::workers().apply(&items, |x| x * 2).unwrap();
        assert_eq!(seq, par);
        assert_eq!(seq[7], 14);
    }

    #[test]
    fn fixed_pool_works() {
        let items: Vec<u32> = (0..32).collect();
        let out = ParallelMap::fixed(2).apply(&items, |x| x + 1).unwrap();
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn tripped_token_cancels() {
        let token = CancelToken::new();
        token.cancel();
        let par = ParallelMap::sequential().cancelable(token);
        let out = par.apply(&[1, 2, 3], |x| *x);
        assert_eq!(out, Err(Error::Canceled));
    }

    #[test]
    fn untripped_token_passes() {
        let token = CancelToken::new();
        let par = ParallelMap::workers().cancelable(token.clone());
        let out = par.apply(&[1, 2, 3], |x| *x).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert!(!token.is_canceled());
    }

    #[test]
    fn cancel_after_trips_eventually() {
        let token = CancelToken::new();
        token.cancel_after(Duration::from_millis(10));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !token.is_canceled() {
            assert!(std::time::Instant::now() < deadline, "timer never fired");
            std::thread::yield_now();
        }
    }

    #[test]
    fn child_scopes_nest_names() {
        let par = ParallelMap::sequential().child("outer").child("inner");
        let dbg = format!("{par:?}");
        assert!(dbg.contains("root/outer/inner"));
    }
}
