//! Single-shot cancellable timers
//!
//! A timer is a spawned task that sleeps and then posts a message back to the
//! scheduler task. Every arm/cancel bumps a generation counter; the message
//! carries the generation it was armed with so late deliveries from a
//! cancelled timer are recognised and dropped.

use std::time::Duration;
use tokio::sync::mpsc::WeakSender;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerSlot {
    /// Arm the timer, replacing any outstanding one. Returns the generation
    /// the delivered message will carry.
    pub fn arm<M, F>(&mut self, delay: Duration, tx: &WeakSender<M>, make: F) -> u64
    where
        M: Send + 'static,
        F: FnOnce(u64) -> M + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let tx = tx.clone();

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The scheduler may already be gone
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(make(generation)).await;
            }
        }));

        generation
    }

    /// Cancel the outstanding timer. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Accept a delivered message. Stale generations are rejected; an
    /// accepted delivery disarms the slot.
    pub fn take_fired(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            self.generation = self.generation.wrapping_add(1);
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
