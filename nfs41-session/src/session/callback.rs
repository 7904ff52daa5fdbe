//! Back channel state carried by a session

use std::sync::atomic::{AtomicU32, Ordering};

/// Callback channel bookkeeping owned by a session
///
/// The callback protocol itself lives outside this crate; the session only
/// owns the sequence counter it resets on renewal.
#[derive(Debug, Default)]
pub struct CallbackSession {
    seq_num: AtomicU32,
}

impl CallbackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current callback sequence number
    pub fn sequence(&self) -> u32 {
        self.seq_num.load(Ordering::SeqCst)
    }

    /// Record the sequence number of the latest callback
    pub fn set_sequence(&self, seq_num: u32) {
        self.seq_num.store(seq_num, Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.seq_num.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_sequence_starts_at_zero_and_resets() {
        let callback = CallbackSession::new();
        assert_eq!(callback.sequence(), 0);

        callback.set_sequence(9);
        assert_eq!(callback.sequence(), 9);

        callback.reset();
        assert_eq!(callback.sequence(), 0);
    }
}
