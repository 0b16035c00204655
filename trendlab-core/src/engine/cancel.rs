//! Cooperative cancellation: checked at bar boundaries, never mid-bar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply cloneable flag a caller can set from another thread to stop a
/// running backtest or optimizer sweep. Checked at bar boundaries; a
/// cancelled run returns whatever it has already computed, flagged
/// incomplete, rather than erroring.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
