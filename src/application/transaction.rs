//! Transaction scope helper

use tracing::warn;

use crate::application::ApplicationResult;
use crate::infrastructure::traits::NodeStore;

/// Run `f` inside one store transaction.
///
/// Commits on `Ok`; on `Err`, or when the commit itself fails, the
/// transaction is rolled back and that error is returned. A failing rollback
/// is logged, not reported.
pub fn in_transaction<T>(
    store: &dyn NodeStore,
    f: impl FnOnce() -> ApplicationResult<T>,
) -> ApplicationResult<T> {
    store.begin()?;
    match f() {
        Ok(value) => match store.commit() {
            Ok(()) => Ok(value),
            Err(e) => {
                warn!(error = %e, "commit failed, rolling back");
                rollback(store);
                Err(e.into())
            }
        },
        Err(e) => {
            warn!(error = %e, "rolling back");
            rollback(store);
            Err(e)
        }
    }
}

fn rollback(store: &dyn NodeStore) {
    if let Err(e) = store.rollback() {
        warn!(error = %e, "rollback failed");
    }
}
