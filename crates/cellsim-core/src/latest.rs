//! Single-slot hand-off of values produced outside the tick.

use std::sync::{Mutex, PoisonError};

/// Holds the most recent value published by another thread.
///
/// Writers call [`publish`](Self::publish), overwriting any value the
/// tick has not consumed yet. The tick calls [`take`](Self::take) once
/// per update, so simulation state is only ever written by the tick
/// itself.
#[derive(Debug, Default)]
pub struct LatestValue<T> {
    slot: Mutex<Option<T>>,
}

impl<T> LatestValue<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replace the pending value.
    pub fn publish(&self, value: T) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Consume the pending value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Whether a value is waiting to be consumed.
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn take_consumes_once() {
        let v = LatestValue::new();
        v.publish(3.0);
        assert!(v.is_pending());
        assert_eq!(v.take(), Some(3.0));
        assert_eq!(v.take(), None);
    }

    #[test]
    fn later_publish_wins() {
        let v = LatestValue::new();
        v.publish(1);
        v.publish(2);
        assert_eq!(v.take(), Some(2));
    }

    #[test]
    fn cross_thread_publish() {
        let v = Arc::new(LatestValue::new());
        let writer = Arc::clone(&v);
        std::thread::spawn(move || writer.publish(42u32))
            .join()
            .unwrap();
        assert_eq!(v.take(), Some(42));
    }
}
