//! Ring Transport - Wait-free single-producer/single-consumer ring buffer.
//!
//! A fixed array of `N` slots addressed by two monotonically increasing
//! counters. The producer is the only writer of `head`, the consumer the
//! only writer of `tail`; occupancy is `head - tail`, there is no per-slot
//! flag.
//!
//! ```text
//!            tail                head
//!             |                   |
//!  [ free ][ rec ][ rec ][ rec ][ free ][ free ]
//!             <-- consumer side   producer side -->
//! ```
//!
//! `RingTransport::new()` hands out exactly one [`Producer`] and one
//! [`Consumer`], so the single-producer/single-consumer discipline is
//! enforced by ownership rather than by convention.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pads a counter to its own cache line so producer and consumer
/// do not false-share.
#[repr(align(64))]
#[derive(Debug, Default)]
pub(crate) struct CachePadded<T>(pub(crate) T);

/// Returned by [`Producer::try_publish`] when the ring holds `N` records.
///
/// Carries the rejected record back; the caller picks the policy
/// (spin, drop, escalate).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ring transport is full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}

impl<T> Full<T> {
    /// Recover the record that could not be published.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Shared storage of the ring. Only reachable through its two endpoints.
pub struct RingTransport<T, const N: usize> {
    /// Write position (producer-owned)
    head: CachePadded<AtomicU64>,
    /// Read position (consumer-owned)
    tail: CachePadded<AtomicU64>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: a slot is accessed by at most one endpoint at a time; ownership of
// a slot moves between threads only through the release/acquire pair on
// `head` and `tail`.
unsafe impl<T: Send, const N: usize> Send for RingTransport<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for RingTransport<T, N> {}

impl<T, const N: usize> RingTransport<T, N> {
    const MASK: u64 = N as u64 - 1;

    const CAPACITY_IS_POW2: () = assert!(
        N.is_power_of_two(),
        "RingTransport capacity must be a non-zero power of two"
    );

    /// Allocate a ring of `N` slots and split it into its two endpoints.
    ///
    /// This is the only allocation the ring ever performs.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Producer<T, N>, Consumer<T, N>) {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_IS_POW2;

        let slots = (0..N)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(Self {
            head: CachePadded(AtomicU64::new(0)),
            tail: CachePadded(AtomicU64::new(0)),
            slots,
        });

        (
            Producer {
                shared: Arc::clone(&shared),
                tail_cache: 0,
            },
            Consumer {
                shared,
                head_cache: 0,
            },
        )
    }

    /// Compile-time capacity.
    #[inline]
    pub const fn capacity() -> usize {
        N
    }

    #[inline]
    fn slot(&self, position: u64) -> *mut MaybeUninit<T> {
        self.slots[(position & Self::MASK) as usize].get()
    }

    /// Snapshot of `head - tail`.
    ///
    /// `tail` is loaded before `head` so the difference never underflows;
    /// it can still overshoot while both sides move, hence the clamp.
    #[inline]
    fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        (head.wrapping_sub(tail) as usize).min(N)
    }
}

impl<T, const N: usize> Drop for RingTransport<T, N> {
    fn drop(&mut self) {
        // Both endpoints are gone, so nothing else can touch the counters.
        let head = *self.head.0.get_mut();
        let mut tail = *self.tail.0.get_mut();
        while tail != head {
            let index = (tail & Self::MASK) as usize;
            // SAFETY: every slot in [tail, head) holds a published record
            // that was never consumed.
            unsafe { self.slots[index].get_mut().assume_init_drop() };
            tail = tail.wrapping_add(1);
        }
    }
}

/// Publishing endpoint. Owned by exactly one thread at a time.
pub struct Producer<T, const N: usize> {
    shared: Arc<RingTransport<T, N>>,
    /// Last observed consumer position; refreshed only when the ring
    /// looks full.
    tail_cache: u64,
}

impl<T, const N: usize> Producer<T, N> {
    /// Publish `record` if there is room. Never blocks, never allocates.
    ///
    /// On a full ring the record is handed back inside [`Full`] and the
    /// ring is left unchanged.
    #[inline]
    pub fn try_publish(&mut self, record: T) -> Result<(), Full<T>> {
        let head = self.shared.head.0.load(Ordering::Relaxed);

        if head.wrapping_sub(self.tail_cache) == N as u64 {
            // Pairs with the consumer's release store: once we see the
            // advanced tail, the record that lived in that slot has been
            // moved out.
            self.tail_cache = self.shared.tail.0.load(Ordering::Acquire);
            if head.wrapping_sub(self.tail_cache) == N as u64 {
                return Err(Full(record));
            }
        }

        // SAFETY: the slot at `head` lies outside [tail, head), so the
        // consumer will not read it until `head` is advanced below.
        unsafe { (*self.shared.slot(head)).write(record) };

        self.shared.head.0.store(head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Number of unconsumed records (snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> fmt::Debug for Producer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}

/// Consuming endpoint. Owned by exactly one thread at a time.
pub struct Consumer<T, const N: usize> {
    shared: Arc<RingTransport<T, N>>,
    /// Last observed producer position; refreshed only when the ring
    /// looks empty.
    head_cache: u64,
}

impl<T, const N: usize> Consumer<T, N> {
    /// Remove and return the oldest record, or `None` if the ring is empty.
    #[inline]
    pub fn try_consume(&mut self) -> Option<T> {
        let tail = self.shared.tail.0.load(Ordering::Relaxed);

        if tail == self.head_cache {
            // Pairs with the producer's release store: seeing the new head
            // guarantees the slot behind it is fully written.
            self.head_cache = self.shared.head.0.load(Ordering::Acquire);
            if tail == self.head_cache {
                return None;
            }
        }

        // SAFETY: `tail < head`, so the slot holds a published record that
        // only this endpoint may take.
        let record = unsafe { (*self.shared.slot(tail)).assume_init_read() };

        self.shared.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(record)
    }

    /// Number of unconsumed records (snapshot).
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Iterator for Consumer<T, N> {
    type Item = T;

    /// Drains what is currently visible; `None` means "nothing yet",
    /// not end of stream.
    #[inline]
    fn next(&mut self) -> Option<T> {
        self.try_consume()
    }
}

impl<T, const N: usize> fmt::Debug for Consumer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &N)
            .field("len", &self.len())
            .finish()
    }
}
