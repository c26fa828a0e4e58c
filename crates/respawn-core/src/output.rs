//! Incremental output delivery.

/// Output waiting to be delivered, plus how much of the log has been folded in.
///
/// The engine only exposes a container's cumulative log. `delivered_offset`
/// records how many log bytes have already been moved into the buffer so each
/// byte is handed out once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputBuffer {
    pending: Option<Vec<u8>>,
    delivered_offset: usize,
}

impl OutputBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: None,
            delivered_offset: 0,
        }
    }

    /// Folds the unseen suffix of a cumulative log into the pending output.
    pub fn absorb_logs(&mut self, logs: &[u8]) {
        if let Some(unsent) = logs.get(self.delivered_offset..) {
            if !unsent.is_empty() {
                self.pending
                    .get_or_insert_with(Vec::new)
                    .extend_from_slice(unsent);
            }
        }
        self.delivered_offset = logs.len();
    }

    /// Appends output produced outside the container log.
    ///
    /// Appending empty output still marks the buffer as having a result.
    pub fn append(&mut self, data: &[u8]) {
        self.pending
            .get_or_insert_with(Vec::new)
            .extend_from_slice(data);
    }

    /// Returns and clears the pending output.
    pub fn take(&mut self) -> Option<Vec<u8>> {
        self.pending.take()
    }

    /// Replaces the pending output.
    pub fn replace_pending(&mut self, pending: Option<Vec<u8>>) {
        self.pending = pending;
    }

    /// Byte length of the log already folded in.
    #[must_use]
    pub const fn delivered_offset(&self) -> usize {
        self.delivered_offset
    }

    /// Sets the byte length of the log already folded in.
    pub fn set_delivered_offset(&mut self, offset: usize) {
        self.delivered_offset = offset;
    }
}
