//! Cooperative cancellation shared between the operator, the pool and the
//! per-job work functions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Marker error returned by work functions that stopped because their token
/// was cancelled. The pool treats any error whose chain contains it as a
/// cancellation rather than a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Returns true when `err` (or anything it wraps) is [`Cancelled`].
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<Cancelled>())
}

/// Cancellation flag. Cloning shares the flag; [`CancelToken::child`] derives a
/// token that observes this one but can also be cancelled on its own without
/// affecting the parent.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::SeqCst))
    }

    /// `Err(Cancelled)` once the token is cancelled; meant for `?` at
    /// suspension points.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Exit status of a run stopped by the operator (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Route Ctrl-C into `token`. The first interrupt cancels the token so the
/// pool can unwind; a second one while unwinding exits immediately with
/// [`INTERRUPTED_EXIT_CODE`]. Partial downloads in flight at that point are
/// cleared by the next run's destination preparation.
pub fn install_interrupt_handler(token: CancelToken) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        token.cancel();
    })?;
    Ok(())
}
