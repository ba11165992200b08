//! Single-slot viewport mailbox
//!
//! Input handling posts the latest viewport; the redraw thread takes it.
//! Posting while a viewport is still pending replaces it, so a slow redraw
//! only ever sees the most recent state.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tilecache_render::Viewport;

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Viewport>,
    closed: bool,
    coalesced: u64,
}

/// Latest-value mailbox between an input thread and a redraw thread
#[derive(Debug, Default)]
pub struct ViewportMailbox {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl ViewportMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Post a viewport, replacing any pending one
    ///
    /// Returns `false` if the mailbox has been closed.
    pub fn post(&self, viewport: Viewport) -> bool {
        let mut slot = self.lock();
        if slot.closed {
            return false;
        }

        if slot.pending.replace(viewport).is_some() {
            slot.coalesced += 1;
            tracing::trace!(coalesced = slot.coalesced, "replaced pending viewport");
        }
        drop(slot);

        self.ready.notify_one();
        true
    }

    /// Block until a viewport is available
    ///
    /// A viewport posted before `close` is still delivered. Returns `None`
    /// once the mailbox is closed and empty.
    pub fn take(&self) -> Option<Viewport> {
        let mut slot = self.lock();
        loop {
            if let Some(viewport) = slot.pending.take() {
                return Some(viewport);
            }
            if slot.closed {
                return None;
            }
            slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the pending viewport without blocking
    pub fn try_take(&self) -> Option<Viewport> {
        self.lock().pending.take()
    }

    /// Close the mailbox and wake any waiting taker
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of posts that replaced a viewport before it was taken
    pub fn coalesced(&self) -> u64 {
        self.lock().coalesced
    }
}
