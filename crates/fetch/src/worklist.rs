/// Dispatch bookkeeping over a fixed index space `0..n`.
///
/// Every index below `cursor` has been dispatched. Dispatching advances the
/// cursor past the contiguous dispatched prefix; a failure clears the slot and
/// rewinds the cursor to it, so the next scan picks the index up again.
#[derive(Debug, Clone)]
pub struct Worklist {
    dispatched: Vec<bool>,
    cursor: usize,
}

impl Worklist {
    pub fn new(n: usize) -> Self {
        Self {
            dispatched: vec![false; n],
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.dispatched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty()
    }

    /// Low-water mark of the scan.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Up to `max` indices not yet dispatched, in ascending order.
    ///
    /// The indices are not marked; call [`Worklist::mark_dispatched`] for
    /// each one actually sent.
    pub fn next_batch(&self, max: usize) -> Vec<usize> {
        if max == 0 {
            return Vec::new();
        }
        self.dispatched[self.cursor..]
            .iter()
            .enumerate()
            .filter(|(_, sent)| !**sent)
            .map(|(offset, _)| self.cursor + offset)
            .take(max)
            .collect()
    }

    pub fn mark_dispatched(&mut self, index: usize) {
        if let Some(slot) = self.dispatched.get_mut(index) {
            *slot = true;
        }
        while self.cursor < self.dispatched.len() && self.dispatched[self.cursor] {
            self.cursor += 1;
        }
    }

    /// Re-arm `index` for the next dispatch pass.
    pub fn mark_failed(&mut self, index: usize) {
        if let Some(slot) = self.dispatched.get_mut(index) {
            *slot = false;
            self.cursor = self.cursor.min(index);
        }
    }

    pub fn is_dispatched(&self, index: usize) -> bool {
        self.dispatched.get(index).copied().unwrap_or(false)
    }

    /// No index is left to dispatch.
    pub fn done(&self) -> bool {
        self.cursor >= self.dispatched.len()
    }
}
