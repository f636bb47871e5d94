//! Double-buffered frame handoff between the filler thread and the audio loop
//!
//! The filler encodes into the slot the audio loop is not reading, then
//! publishes it by bumping a generation counter that carries the slot index
//! in its low bit, so a reader always sees a matching index and generation.
//! The audio loop only ever uses `try_lock` and `try_send`, so it never
//! blocks on the filler. There is a single filler per exchange.

use crate::error::Result;
use crate::frame::{EncodedFrame, FrameEncoder};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

#[derive(Debug)]
pub struct FrameExchange {
    slots: [Mutex<EncodedFrame>; 2],
    // generation << 1 | ready slot
    state: AtomicU64,
    fill_tx: Sender<()>,
    fill_rx: Receiver<()>,
}

impl Default for FrameExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExchange {
    pub fn new() -> Self {
        // one outstanding request is enough, repeated requests coalesce
        let (fill_tx, fill_rx) = bounded(1);
        Self {
            slots: [
                Mutex::new(EncodedFrame::default()),
                Mutex::new(EncodedFrame::default()),
            ],
            state: AtomicU64::new(1),
            fill_tx,
            fill_rx,
        }
    }

    /// Slot most recently published
    pub fn ready_index(&self) -> usize {
        self.ready().1
    }

    /// Number of frames published so far
    pub fn generation(&self) -> u64 {
        self.ready().0
    }

    /// Generation and ready slot from a single load
    pub fn ready(&self) -> (u64, usize) {
        let state = self.state.load(Ordering::Acquire);
        (state >> 1, (state & 1) as usize)
    }

    /// Ask the filler for another frame. Never blocks.
    pub fn request_fill(&self) {
        // a full channel means a request is already pending
        let _ = self.fill_tx.try_send(());
    }

    /// Block up to `timeout` for a fill request
    pub fn wait_for_fill_request(&self, timeout: Duration) -> bool {
        self.fill_rx.recv_timeout(timeout).is_ok()
    }

    fn lock_slot(&self, index: usize) -> MutexGuard<'_, EncodedFrame> {
        // a poisoned slot still holds a complete frame
        self.slots[index]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_slot(&self, index: usize) {
        let slot = index as u64 & 1;
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                Some((((state >> 1) + 1) << 1) | slot)
            });
    }

    /// Encode `payload` into the free slot and publish it.
    /// Returns the slot that was written.
    pub fn set_pending_payload(&self, encoder: &mut FrameEncoder, payload: &[u8]) -> Result<usize> {
        let index = 1 - self.ready_index();
        {
            let mut slot = self.lock_slot(index);
            encoder.encode_into(payload, &mut slot)?;
        }
        self.publish_slot(index);
        Ok(index)
    }

    /// Publish an already encoded frame
    pub fn publish(&self, frame: &EncodedFrame) -> usize {
        let index = 1 - self.ready_index();
        *self.lock_slot(index) = *frame;
        self.publish_slot(index);
        index
    }

    /// Copy slot `index` into `dst` without blocking.
    /// Returns false if the filler currently holds the slot.
    pub fn try_read(&self, index: usize, dst: &mut EncodedFrame) -> bool {
        match self.slots[index].try_lock() {
            Ok(slot) => {
                *dst = *slot;
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                *dst = *poisoned.into_inner();
                true
            }
            Err(TryLockError::WouldBlock) => false,
        }
    }
}
