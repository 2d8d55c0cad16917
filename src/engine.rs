//! Engine - Consumer-side event loop with CPU pinning and warm-up.
//!
//! Wraps the matching engine with a ring transport of [`OrderEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::command::{OrderEvent, Trade};
use crate::matching::MatchingEngine;
use crate::ring::Consumer;

/// The engine that drains order events from a ring transport.
///
/// Owns its [`MatchingEngine`] exclusively, so the book needs no locks.
#[derive(Debug)]
pub struct Engine {
    /// The underlying matching engine
    pub matcher: MatchingEngine,
}

impl Engine {
    /// Create a new engine with room for `capacity` resting orders.
    pub fn new(capacity: usize) -> Self {
        Self {
            matcher: MatchingEngine::new(capacity),
        }
    }

    /// Run the engine event loop.
    ///
    /// Busy-polls `input` while `run` is set, handing every trade to
    /// `on_trade`. Events still queued when `run` clears are processed
    /// before returning.
    ///
    /// # Returns
    /// Number of events processed
    pub fn run<const N: usize>(
        &mut self,
        input: &mut Consumer<OrderEvent, N>,
        run: &AtomicBool,
        mut on_trade: impl FnMut(Trade),
    ) -> u64 {
        info!("engine event loop started");
        let mut processed = 0u64;

        while run.load(Ordering::Acquire) {
            match input.try_consume() {
                Some(event) => {
                    processed += 1;
                    self.process(event).into_iter().for_each(&mut on_trade);
                }
                None => std::hint::spin_loop(),
            }
        }

        // Drain what the producer published before shutdown
        for event in input.by_ref() {
            processed += 1;
            self.process(event).into_iter().for_each(&mut on_trade);
        }

        info!(
            processed,
            resting = self.order_count(),
            "engine event loop stopped"
        );
        processed
    }

    /// Process a single event and return its trades.
    ///
    /// This is the main entry point for synchronous usage (testing, benchmarks).
    #[inline]
    pub fn process(&mut self, event: OrderEvent) -> Vec<Trade> {
        match event {
            OrderEvent::Submit(order) => self.matcher.submit_order(order),
            OrderEvent::Cancel(order_id) => {
                self.matcher.cancel_order(order_id);
                Vec::new()
            }
        }
    }

    /// Pin the current thread to the last available CPU core.
    ///
    /// The last core is typically isolated from OS interrupts.
    pub fn pin_to_core(&self) -> bool {
        let last_core = core_affinity::get_core_ids().and_then(|ids| ids.last().copied());
        match last_core {
            Some(core) if core_affinity::set_for_current(core) => {
                debug!(core = core.id, "engine thread pinned");
                true
            }
            _ => {
                warn!("could not pin engine thread");
                false
            }
        }
    }

    /// Warm up the matching path before live traffic.
    pub fn warm_up(&mut self) {
        self.matcher.warm_up();
    }

    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.matcher.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.matcher.best_ask()
    }

    #[inline]
    pub fn spread(&self) -> Option<u64> {
        self.matcher.spread()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.matcher.order_count()
    }

    /// Compute state hash for determinism testing.
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.matcher.state_hash()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(100_000)
    }
}
