//! A bounded FIFO that drops its oldest entry on overflow instead of
//! blocking the producer — `std::sync::mpsc`'s `SyncSender` can't do this
//! (only the consumer side can remove an item), so this wraps a
//! `Mutex<VecDeque<T>>` the same way `CanBus`'s own deferred-frame queue
//! does.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct BoundedDropOldest<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    signal: Condvar,
}

impl<T> BoundedDropOldest<T> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), inner: Mutex::new(VecDeque::new()), signal: Condvar::new() }
    }

    /// Push `item`, dropping the oldest queued item first if already at
    /// capacity.
    pub fn push(&self, item: T) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let dropped = guard.len() >= self.capacity;
        if dropped {
            guard.pop_front();
        }
        guard.push_back(item);
        self.signal.notify_one();
        dropped
    }

    /// Wait up to `timeout` for an item, returning `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let guard = self.inner.lock().unwrap();
        let (mut guard, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |q| q.is_empty())
            .unwrap();
        guard.pop_front()
    }

    pub fn wake_all(&self) {
        self.signal.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_when_full() {
        let q = BoundedDropOldest::new(2);
        assert!(!q.push(1));
        assert!(!q.push(2));
        assert!(q.push(3));
        assert_eq!(q.pop_timeout(Duration::from_millis(1)), Some(2));
        assert_eq!(q.pop_timeout(Duration::from_millis(1)), Some(3));
        assert_eq!(q.pop_timeout(Duration::from_millis(1)), None);
    }
}
