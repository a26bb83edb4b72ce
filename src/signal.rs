//! Cooperative cancellation and Ctrl+C handling.
//!
//! [`CancelToken`] wraps an `AtomicBool` shared between the job controller,
//! the walker thread and every hashing worker. Workers read it before each
//! unit of work (directory entry, bucket, file, read chunk); nothing is ever
//! interrupted mid system call.
//!
//! # Usage
//!
//! ```
//! use dupe_engine::signal::CancelToken;
//!
//! let token = CancelToken::new();
//! let worker_view = token.clone();
//!
//! token.cancel();
//! assert!(worker_view.is_cancelled());
//! ```
//!
//! The CLI additionally calls [`install_handler`] so that Ctrl+C cancels the
//! running job instead of killing the process.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation flag for one job.
///
/// Clones share the same flag. `CancelToken` is `Send` and `Sync`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

/// Install a Ctrl+C handler that runs `on_interrupt`.
///
/// The callback should only request cancellation; the job unwinds on its own
/// and the caller observes the `Cancelled` state.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if a handler is already registered
/// for this process.
pub fn install_handler<F>(on_interrupt: F) -> Result<(), SignalError>
where
    F: Fn() + Send + 'static,
{
    ctrlc::set_handler(move || {
        // stderr is line-buffered, so flush explicitly
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Cancelling scan...");
        let _ = std::io::stderr().flush();

        log::info!("Shutdown signal received");
        on_interrupt();
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_new() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());

        // idempotent
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clone_shares_flag() {
        let token = CancelToken::new();
        let cloned = token.clone();

        token.cancel();
        assert!(cloned.is_cancelled());
    }

    #[test]
    fn test_fresh_tokens_are_independent() {
        let first = CancelToken::new();
        let second = CancelToken::new();

        first.cancel();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_exit_code_interrupted() {
        assert_eq!(EXIT_CODE_INTERRUPTED, 130);
    }

    #[test]
    fn test_cancel_token_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CancelToken>();
    }
}
