use crate::query::QueryCode;

/// Per-operation accumulator of reply outcomes.
///
/// Successes and retryable failures leave the tracker healthy; the first
/// non-retryable failure latches [`QueryTracker::failed`] for the rest of the
/// tracker's life.
#[derive(Debug, Clone, Default)]
pub struct QueryTracker {
    failed: bool,
    retryable_failures: u32,
    first_fatal: Option<QueryCode>,
}

impl QueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reply.
    ///
    /// With `retryable == true` a failure only bumps the retry counter; the
    /// caller is expected to re-arm the item in its worklist.
    pub fn accumulate(&mut self, code: &QueryCode, retryable: bool) {
        if code.is_success() {
            return;
        }
        if retryable {
            self.retryable_failures += 1;
            return;
        }
        if !self.failed {
            self.failed = true;
            self.first_fatal = Some(code.clone());
        }
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Retryable failures seen so far.
    pub fn retryable_failures(&self) -> u32 {
        self.retryable_failures
    }

    /// Code of the reply that latched the failure.
    pub fn first_fatal(&self) -> Option<&QueryCode> {
        self.first_fatal.as_ref()
    }
}
