//! Single writer, single reader handoff of body frames.
//!
//! The capture worker fills a private back buffer and swaps it with the shared
//! front buffer under a mutex, so body count and bodies always change together.
//! Both sides only ever `try_lock`. A reader that loses the race keeps its
//! previous copy, and a writer that loses it keeps the frame in its back buffer
//! and publishes a newer one next cycle, so neither side waits on the other.

use crate::body::FrameSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

pub struct FrameExchange {
    front: Mutex<FrameSnapshot>,
    generation: AtomicU64,
    capacity: usize,
}

impl FrameExchange {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            front: Mutex::new(FrameSnapshot::with_capacity(capacity)),
            generation: AtomicU64::new(0),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// A back buffer sized to match the front buffer.
    pub fn back_buffer(&self) -> FrameSnapshot {
        FrameSnapshot::with_capacity(self.capacity)
    }

    /// Makes `back` visible to the reader and hands the previous front buffer back.
    ///
    /// Returns false and leaves `back` untouched while the reader is copying.
    pub fn publish(&self, back: &mut FrameSnapshot) -> bool {
        let mut front = match self.front.try_lock() {
            Ok(front) => front,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        let generation = front.generation() + 1;
        back.set_generation(generation);
        std::mem::swap(&mut *front, back);
        self.generation.store(generation, Ordering::Release);
        true
    }

    pub fn reader(self: &Arc<Self>) -> FrameReader {
        FrameReader {
            local: FrameSnapshot::with_capacity(self.capacity),
            exchange: Arc::clone(self),
        }
    }
}

/// Render side view of the latest published frame.
pub struct FrameReader {
    exchange: Arc<FrameExchange>,
    local: FrameSnapshot,
}

impl FrameReader {
    /// Pulls the newest published frame if there is one and the writer is not
    /// swapping right now. Returns true when the local snapshot changed.
    pub fn refresh(&mut self) -> bool {
        if self.exchange.generation() == self.local.generation() {
            return false;
        }
        let front = match self.exchange.front.try_lock() {
            Ok(front) => front,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        self.local.copy_from(&front);
        true
    }

    /// The last frame pulled by `refresh`, `None` before the first publish.
    pub fn latest(&self) -> Option<&FrameSnapshot> {
        if self.is_tracking() {
            Some(&self.local)
        } else {
            None
        }
    }

    /// True once at least one tracking result has reached this reader.
    pub fn is_tracking(&self) -> bool {
        self.local.generation() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fill(frame: &mut FrameSnapshot, count: usize, value: u32) {
        for body in frame.pool_mut().iter_mut().take(count) {
            body.id = value;
        }
        frame.set_body_count(count);
    }

    #[test]
    fn nothing_before_first_publish() {
        let exchange = FrameExchange::new(4);
        let mut reader = exchange.reader();
        assert!(!reader.refresh());
        assert!(reader.latest().is_none());
        assert!(!reader.is_tracking());
    }

    #[test]
    fn reader_sees_published_frame_once() {
        let exchange = FrameExchange::new(4);
        let mut reader = exchange.reader();
        let mut back = exchange.back_buffer();

        fill(&mut back, 2, 11);
        assert!(exchange.publish(&mut back));
        assert_eq!(back.generation(), 0);

        assert!(reader.refresh());
        let frame = reader.latest().unwrap();
        assert_eq!(frame.generation(), 1);
        assert_eq!(frame.body_count(), 2);
        assert!(frame.bodies().iter().all(|body| body.id == 11));

        assert!(!reader.refresh());
        assert_eq!(reader.latest().unwrap().generation(), 1);
    }

    #[test]
    fn writer_does_not_wait_for_a_busy_reader() {
        let exchange = FrameExchange::new(4);
        let mut back = exchange.back_buffer();
        fill(&mut back, 2, 5);

        let guard = exchange.front.lock().unwrap();
        assert!(!exchange.publish(&mut back));
        drop(guard);
        assert_eq!(exchange.generation(), 0);
        assert_eq!(back.body_count(), 2);
        assert_eq!(back.generation(), 0);

        assert!(exchange.publish(&mut back));
        let mut reader = exchange.reader();
        assert!(reader.refresh());
        let frame = reader.latest().unwrap();
        assert_eq!(frame.generation(), 1);
        assert!(frame.bodies().iter().all(|body| body.id == 5));
    }

    #[test]
    fn reader_skips_to_newest_frame() {
        let exchange = FrameExchange::new(4);
        let mut reader = exchange.reader();
        let mut back = exchange.back_buffer();
        for value in 1..=3 {
            fill(&mut back, value as usize, value);
            assert!(exchange.publish(&mut back));
        }
        assert!(reader.refresh());
        let frame = reader.latest().unwrap();
        assert_eq!(frame.generation(), 3);
        assert_eq!(frame.body_count(), 3);
        assert!(frame.bodies().iter().all(|body| body.id == 3));
    }

    #[test]
    fn reads_are_never_torn() {
        let exchange = FrameExchange::new(20);
        let writer_exchange = Arc::clone(&exchange);
        let writer = thread::spawn(move || {
            let mut back = writer_exchange.back_buffer();
            let mut cycle = 0u32;
            while writer_exchange.generation() < 2000 {
                cycle += 1;
                let count = (cycle % 20 + 1) as usize;
                fill(&mut back, count, cycle);
                writer_exchange.publish(&mut back);
            }
        });

        let mut reader = exchange.reader();
        let mut last_generation = 0;
        let mut last_cycle = 0;
        while last_generation < 2000 {
            if reader.refresh() {
                let frame = reader.latest().unwrap();
                assert!(frame.generation() > last_generation);
                last_generation = frame.generation();
                let cycle = frame.bodies()[0].id;
                assert!(cycle > last_cycle);
                last_cycle = cycle;
                assert_eq!(frame.body_count(), (cycle % 20 + 1) as usize);
                assert!(frame.bodies().iter().all(|body| body.id == cycle));
            }
        }
        writer.join().unwrap();
        assert_eq!(exchange.generation(), 2000);
    }
}
