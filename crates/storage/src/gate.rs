//! Single-writer gate
//!
//! A writable transaction holds the gate from `begin` until commit or
//! discard. The holder is not tied to a thread, so a transaction can be
//! moved across threads while it is open.

use parking_lot::{Condvar, Mutex};

/// Blocking binary semaphore admitting one writer at a time
#[derive(Debug, Default)]
pub struct WriterGate {
    busy: Mutex<bool>,
    released: Condvar,
}

impl WriterGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate is free, then take it
    pub fn acquire(&self) {
        let mut busy = self.busy.lock();
        while *busy {
            self.released.wait(&mut busy);
        }
        *busy = true;
    }

    /// Take the gate if it is free
    pub fn try_acquire(&self) -> bool {
        let mut busy = self.busy.lock();
        if *busy {
            false
        } else {
            *busy = true;
            true
        }
    }

    /// Give the gate back and wake one waiter
    pub fn release(&self) {
        let mut busy = self.busy.lock();
        *busy = false;
        self.released.notify_one();
    }

    /// True while a writer holds the gate
    pub fn is_held(&self) -> bool {
        *self.busy.lock()
    }
}
