//! Cooperative cancellation and Ctrl+C handling.
//!
//! A single [`CancelToken`] is shared by every pipeline stage. Ctrl+C (and
//! SIGTERM/SIGHUP) fire it; the stages observe it at their next checkpoint:
//!
//! - the walker stops opening directories
//! - the grouper discards its partial groups instead of flushing
//! - link operations already running finish, queued ones are skipped
//! - the reference store is still saved with whatever completed
//!
//! # Usage
//!
//! ```rust,no_run
//! use nmdedupe::signal::install_handler;
//!
//! let cancel = install_handler().expect("Failed to install signal handler");
//! // hand `cancel.clone()` to the walker, grouper and executor
//! if cancel.is_cancelled() {
//!     return;
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption: 128 + SIGINT.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Broadcast cancellation flag.
///
/// Clones share the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fire the token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the token so a new run can start.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Install a Ctrl+C handler that fires the returned token.
///
/// The process-wide handler can only be registered once. Later calls (for
/// example several `run_app` invocations in one test binary) get the same
/// token back, reset to the not-cancelled state.
///
/// # Errors
///
/// Returns [`SignalError`] if the handler cannot be registered and no token
/// was registered earlier by this process.
pub fn install_handler() -> Result<CancelToken, SignalError> {
    if let Some(token) = GLOBAL_TOKEN.get() {
        token.reset();
        return Ok(token.clone());
    }

    let token = CancelToken::new();
    let handler_token = token.clone();

    let installed = ctrlc::set_handler(move || {
        handler_token.cancel();
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing in-flight links...");
        let _ = std::io::stderr().flush();
        log::info!("Cancellation signal received");
    });

    match installed {
        Ok(()) => {
            let _ = GLOBAL_TOKEN.set(token.clone());
            Ok(token)
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C handler already registered, using an unhooked token");
            Ok(GLOBAL_TOKEN.get_or_init(CancelToken::new).clone())
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}
