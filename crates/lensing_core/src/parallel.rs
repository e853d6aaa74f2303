//! Order-preserving fan-out over independent work items.
//!
//! Every refinement level traces cells that do not depend on each other, so the
//! work is mapped with rayon when enabled. Output order always matches input order.

use rayon::prelude::*;

/// Maps `f` over `items`, in parallel when `parallel` is set.
pub(crate) fn map_ordered<T, R, F>(items: &[T], parallel: bool, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if parallel {
        items.par_iter().map(&f).collect()
    } else {
        items.iter().map(&f).collect()
    }
}

/// Like [`map_ordered`], but the closure is fallible. The first error in input
/// order wins in both modes.
pub(crate) fn try_map_ordered<T, R, E, F>(items: &[T], parallel: bool, f: F) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(&T) -> Result<R, E> + Sync,
{
    // All items finish before the scan; rayon's own `collect` into `Result` may
    // stop at whichever error it meets first.
    map_ordered(items, parallel, f).into_iter().collect()
}
