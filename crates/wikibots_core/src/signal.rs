use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop request. The binary raises it from its Ctrl-C handler; bots
/// and the worker pool poll it between pages.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the signal was already raised.
    pub fn raise(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
