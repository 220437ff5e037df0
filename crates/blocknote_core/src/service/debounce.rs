//! Clock-driven debounce with a distinct-until-changed filter.
//!
//! # Invariants
//! - A value is emitted only after `quiet_ms` passed since the latest `push`.
//! - An emitted value is never `same` as the previously emitted one.
//! - The debouncer never reads time itself; callers pass `now`.

/// Equality used by the distinct filter.
pub type SameFn<T> = fn(&T, &T) -> bool;

#[derive(Debug)]
pub struct Debouncer<T> {
    quiet_ms: i64,
    same: SameFn<T>,
    pending: Option<(T, i64)>,
    last_emitted: Option<T>,
}

impl<T: Clone> Debouncer<T> {
    pub fn new(quiet_ms: u64, same: SameFn<T>) -> Self {
        Self {
            quiet_ms: i64::try_from(quiet_ms).unwrap_or(i64::MAX),
            same,
            pending: None,
            last_emitted: None,
        }
    }

    /// Replaces the pending value and restarts the quiet period.
    pub fn push(&mut self, value: T, now_ms: i64) {
        self.pending = Some((value, now_ms.saturating_add(self.quiet_ms)));
    }

    /// Returns the pending value once its quiet period is over.
    ///
    /// A due value equal to the last emitted one is dropped and `None` is
    /// returned.
    pub fn poll(&mut self, now_ms: i64) -> Option<T> {
        let due = matches!(&self.pending, Some((_, deadline)) if now_ms >= *deadline);
        if !due {
            return None;
        }
        let (value, _) = self.pending.take()?;
        if let Some(last) = &self.last_emitted {
            if (self.same)(last, &value) {
                return None;
            }
        }
        self.last_emitted = Some(value.clone());
        Some(value)
    }

    /// Drops any pending value and marks `value` as already emitted.
    ///
    /// Used after changes recorded outside the debounce path.
    pub fn settle(&mut self, value: T) {
        self.pending = None;
        self.last_emitted = Some(value);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Deadline of the pending value, if any.
    pub fn deadline(&self) -> Option<i64> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }
}
