use std::time::Duration;
use tokio::time::Instant;

/// A value whose changes take effect only after a quiet period.
///
/// The displayed value follows every [`set`](Self::set) immediately, while
/// the committed value (the one allowed to trigger work) catches up once no
/// new value has arrived for the quiet period. Time is passed in rather than
/// read, so the owner decides when to [`poll`](Self::poll).
#[derive(Debug, Clone)]
pub struct Debounced<T> {
    committed: T,
    pending: Option<(T, Instant)>,
    quiet: Duration,
}

impl<T: Clone + PartialEq> Debounced<T> {
    pub fn new(value: T, quiet: Duration) -> Self {
        Self {
            committed: value,
            pending: None,
            quiet,
        }
    }

    /// The latest value, committed or not.
    pub fn value(&self) -> &T {
        self.pending
            .as_ref()
            .map(|(value, _)| value)
            .unwrap_or(&self.committed)
    }

    pub fn committed(&self) -> &T {
        &self.committed
    }

    /// When the pending value will commit, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    /// Replace the pending value and restart the quiet period.
    pub fn set(&mut self, value: T, now: Instant) {
        if value == self.committed {
            self.pending = None;
        } else {
            self.pending = Some((value, now + self.quiet));
        }
    }

    /// Commit a value immediately, discarding anything pending. Returns
    /// whether the committed value changed.
    pub fn commit_now(&mut self, value: T) -> bool {
        self.pending = None;
        let changed = value != self.committed;
        self.committed = value;
        changed
    }

    /// Commit the pending value if its quiet period is over. Returns the
    /// newly committed value.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.pending.take() {
            Some((value, deadline)) if deadline <= now => {
                self.committed = value;
                Some(self.committed.clone())
            }
            pending => {
                self.pending = pending;
                None
            }
        }
    }
}
