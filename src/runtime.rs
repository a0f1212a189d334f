//! # Sync/Async Bridge
//!
//! The CLI entry point and the workflow runner are synchronous; ticket
//! acquisition and the task scheduler are async. [`run_async`] is the
//! run-to-completion helper between the two worlds, and it fails loudly
//! when called from inside a live runtime instead of deadlocking.

use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum AsyncBridgeError {
    #[error(
        "async operation attempted from within a running event loop; \
         use the async API directly instead"
    )]
    AlreadyInRuntime,

    #[error("failed to build async runtime: {0}")]
    RuntimeBuild(#[from] std::io::Error),
}

/// Drive a future to completion on a fresh multi-thread runtime.
pub fn run_async<F: Future>(future: F) -> Result<F::Output, AsyncBridgeError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(AsyncBridgeError::AlreadyInRuntime);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
