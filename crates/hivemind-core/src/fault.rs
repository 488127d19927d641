//! Scoping for panics that belong to one unit of work.
//!
//! A panic raised inside [`contain`] is caught by the task that owns the
//! unit (as a `JoinError`) and recorded against it. Process-wide panic
//! handling checks [`is_contained`] and leaves such panics alone.

use std::future::Future;

tokio::task_local! {
    static CONTAINED: ();
}

/// Run `fut` as an owned unit of work whose panics its owner records.
///
/// The marker only covers `fut` itself; tasks spawned from inside it must
/// be wrapped again.
pub async fn contain<F: Future>(fut: F) -> F::Output {
    CONTAINED.scope((), fut).await
}

/// Whether the caller is running inside [`contain`].
pub fn is_contained() -> bool {
    CONTAINED.try_with(|_| ()).is_ok()
}
