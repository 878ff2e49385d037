use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::warn;

/// Run-wide cancellation signal shared by all workers and in-flight backend invocations.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancels on Ctrl-C. Can only be installed once per process.
    pub fn cancel_on_ctrlc(&self) -> Result<(), ctrlc::Error> {
        let cancellation = self.clone();
        ctrlc::set_handler(move || {
            if !cancellation.is_cancelled() {
                warn!("interrupted, stopping running builds...");
            }
            cancellation.cancel();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = Cancellation::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }
}
