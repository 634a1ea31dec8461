//! Single-slot "latest frame" store.
//!
//! The slot owns the staging surface. Writers (the compositor callback) and
//! readers (polling and one-shot exports) both go through the slot's lock, so
//! a GPU copy into the surface and a CPU map of it can never interleave, and
//! the shared device context is only driven by one thread at a time.
//!
//! Only the most recent write is retained: publishing over an unread frame
//! silently replaces it.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{CaptureError, CaptureResult};
use crate::types::ReadPolicy;

struct SlotState<T> {
    surface: T,
    ready: bool,
    closed: bool,
    /// Sequence of the frame currently in `surface` (0 = none yet)
    sequence: u64,
    /// Sequence of the last frame a reader exported
    read_sequence: u64,
    published: u64,
    overwritten: u64,
    reads: u64,
}

/// Counters maintained by the slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounters {
    pub published: u64,
    pub overwritten: u64,
    pub reads: u64,
}

/// Mutually exclusive holder of the staging surface plus its ready flag
pub struct FrameSlot<T> {
    state: Mutex<SlotState<T>>,
    arrived: Condvar,
    /// Lock-free mirror of `ready` for the polling fast path
    ready_hint: AtomicBool,
}

impl<T> FrameSlot<T> {
    pub fn new(surface: T) -> Self {
        Self {
            state: Mutex::new(SlotState {
                surface,
                ready: false,
                closed: false,
                sequence: 0,
                read_sequence: 0,
                published: 0,
                overwritten: 0,
                reads: 0,
            }),
            arrived: Condvar::new(),
            ready_hint: AtomicBool::new(false),
        }
    }

    /// Write a new frame into the surface and mark it ready.
    ///
    /// `write` runs under the lock. If it fails, the ready flag and sequence
    /// are left as they were. Returns the new frame's sequence.
    pub fn publish<F>(&self, write: F) -> CaptureResult<u64>
    where
        F: FnOnce(&mut T) -> CaptureResult<()>,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CaptureError::SessionClosed);
        }

        write(&mut state.surface)?;

        if state.ready && state.read_sequence != state.sequence {
            state.overwritten += 1;
        }
        state.sequence += 1;
        state.published += 1;
        state.ready = true;
        self.ready_hint.store(true, Ordering::Release);
        let sequence = state.sequence;
        drop(state);

        self.arrived.notify_all();
        Ok(sequence)
    }

    /// Export the current frame.
    ///
    /// Fails fast with [`CaptureError::NoFrameYet`] when nothing is ready.
    /// `read` runs under the lock; on success the frame counts as read and,
    /// under [`ReadPolicy::Consume`], the ready flag is cleared.
    pub fn read<R, F>(&self, policy: ReadPolicy, read: F) -> CaptureResult<(R, u64)>
    where
        F: FnOnce(&mut T) -> CaptureResult<R>,
    {
        if !self.ready_hint.load(Ordering::Acquire) {
            return Err(CaptureError::NoFrameYet);
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(CaptureError::SessionClosed);
        }
        if !state.ready {
            return Err(CaptureError::NoFrameYet);
        }

        let value = read(&mut state.surface)?;

        state.read_sequence = state.sequence;
        state.reads += 1;
        if policy == ReadPolicy::Consume {
            state.ready = false;
            self.ready_hint.store(false, Ordering::Release);
        }
        Ok((value, state.sequence))
    }

    /// Block until a frame newer than `after` is ready, or `timeout` elapses.
    ///
    /// Pass `0` to accept any ready frame. Returns the ready frame's sequence.
    pub fn wait_for_frame(&self, after: u64, timeout: Duration) -> CaptureResult<u64> {
        let mut state = self.state.lock();
        let result = self.arrived.wait_while_for(
            &mut state,
            |s| !s.closed && !(s.ready && s.sequence > after),
            timeout,
        );

        if state.closed {
            return Err(CaptureError::SessionClosed);
        }
        if result.timed_out() && !(state.ready && state.sequence > after) {
            return Err(CaptureError::CaptureTimeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(state.sequence)
    }

    /// Refuse further publishes and reads, waking any waiter
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.ready = false;
        self.ready_hint.store(false, Ordering::Release);
        drop(state);
        self.arrived.notify_all();
    }

    pub fn is_ready(&self) -> bool {
        self.ready_hint.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Sequence of the frame currently held (0 before the first publish)
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    pub fn counters(&self) -> SlotCounters {
        let state = self.state.lock();
        SlotCounters {
            published: state.published,
            overwritten: state.overwritten,
            reads: state.reads,
        }
    }
}
