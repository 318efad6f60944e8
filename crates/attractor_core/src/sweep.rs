//! Independent evaluation of one computation over many parameter sets.

use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Runs `run` once per parameter set and returns the outcomes in input order.
///
/// Every call is independent: an `Err` for one parameter set is returned in
/// its slot and does not stop the others.
pub fn sweep<P, T, E, F>(parameters: &[P], run: F) -> Vec<Result<T, E>>
where
    P: Sync,
    T: Send,
    E: Send,
    F: Fn(&P) -> Result<T, E> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let results: Vec<Result<T, E>> = parameters.par_iter().map(|p| run(p)).collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<T, E>> = parameters.iter().map(|p| run(p)).collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    debug!(total = results.len(), failed, "parameter sweep finished");
    results
}
