//! Single-producer/single-consumer float queue of fixed capacity (spec §4.3).
//!
//! Built directly on `ringbuf`'s lock-free heap ring, the same crate and
//! split pattern `nethercore-zx`'s audio thread uses for its cpal-facing
//! buffer (`audio_thread/output.rs`). Producer releases writes to the
//! consumer before the head index advances and vice versa — `ringbuf`'s
//! SPSC implementation already gives us that acquire/release discipline, so
//! this module only adds the capacity/free-space bookkeeping spec §4.3
//! names.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Build a connected producer/consumer pair over a fixed-capacity float
/// ring. Capacity is `max_fifo_size + 1`, matching spec §3's "fixed
/// capacity `MAX_FIFO_SIZE + 1` floats" (one slot is never filled, so a
/// full ring is distinguishable from an empty one).
pub fn channel(max_fifo_size: usize) -> (FifoProducer, FifoConsumer) {
    let rb = HeapRb::<f32>::new(max_fifo_size + 1);
    let (producer, consumer) = rb.split();
    (
        FifoProducer { inner: producer },
        FifoConsumer { inner: consumer },
    )
}

/// The FIFO's producer half. Used only by the Audio Generator thread
/// (spec §5: "sole producer for input FIFO").
pub struct FifoProducer {
    inner: HeapProd<f32>,
}

impl FifoProducer {
    /// Push as many of `samples` as fit; returns the number actually
    /// written. Never blocks, never allocates (spec §7: "no error path
    /// allocates").
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }

    /// `capacity - fill` (spec §4.3 `freeSpace()`).
    pub fn free_space(&self) -> usize {
        self.inner.vacant_len()
    }
}

/// The FIFO's consumer half.
pub struct FifoConsumer {
    inner: HeapCons<f32>,
}

impl FifoConsumer {
    /// Pop as many of `out` as are available; returns the number actually
    /// read. The caller must zero-fill the remainder itself (spec §4.6).
    pub fn pop_slice(&mut self, out: &mut [f32]) -> usize {
        self.inner.pop_slice(out)
    }

    /// `available()` (spec §4.3): current fill count.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }
}
