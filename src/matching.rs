//! Matching Engine - Price-time priority crossing.
//!
//! Implements the cross/rest algorithm:
//! 1. CROSSING: Match the incoming order against the best opposite orders
//! 2. RESTING: Place any remaining quantity in the book
//!
//! The engine is single-threaded by contract. Only the thread that owns it
//! may call [`MatchingEngine::submit_order`] or
//! [`MatchingEngine::cancel_order`].

use tracing::{debug, trace};

use crate::command::{Order, Side, Trade};
use crate::order_book::OrderBook;

/// The matching engine core
#[derive(Debug, Default)]
pub struct MatchingEngine {
    /// The limit order book
    pub book: OrderBook,
}

impl MatchingEngine {
    /// Create a new matching engine with room for `capacity` resting orders
    pub fn new(capacity: usize) -> Self {
        Self {
            book: OrderBook::with_capacity(capacity),
        }
    }

    /// Submit an order.
    ///
    /// # Algorithm
    /// 1. Reject zero quantity and ids that already rest in the book
    /// 2. Cross against the opposite side while prices overlap
    /// 3. Rest whatever quantity is left
    ///
    /// # Returns
    /// Trades in the order they were matched (empty on rejection)
    pub fn submit_order(&mut self, order: Order) -> Vec<Trade> {
        let mut trades = Vec::new();

        if order.qty == 0 {
            debug!(order_id = order.id, "rejected zero quantity order");
            return trades;
        }

        if self.book.contains_order(order.id) {
            debug!(order_id = order.id, "rejected duplicate order id");
            return trades;
        }

        // Phase 1: CROSSING
        let remaining_qty = self.cross_order(&order, &mut trades);

        // Phase 2: RESTING
        if remaining_qty > 0 {
            let rested = self.book.insert(Order {
                qty: remaining_qty,
                ..order
            });
            debug_assert!(rested, "id was checked before crossing");
            trace!(
                order_id = order.id,
                price = order.price,
                qty = remaining_qty,
                "order resting"
            );
        }

        trades
    }

    /// Cross an incoming order against the opposite side.
    ///
    /// # Returns
    /// Remaining quantity after matching
    fn cross_order(&mut self, taker: &Order, trades: &mut Vec<Trade>) -> u32 {
        let maker_side = taker.side.opposite();
        let mut remaining_qty = taker.qty;

        while remaining_qty > 0 {
            let maker = match self.book.best_mut(maker_side) {
                Some(maker) => maker,
                None => break, // No orders on opposite side
            };

            if !prices_cross(taker.price, maker.price, taker.side) {
                break;
            }

            let trade_qty = remaining_qty.min(maker.qty);
            let (bid_order_id, ask_order_id) = match taker.side {
                Side::Bid => (taker.id, maker.id),
                Side::Ask => (maker.id, taker.id),
            };

            trades.push(Trade {
                bid_order_id,
                ask_order_id,
                aggressor_id: taker.id,
                aggressor_side: taker.side,
                // The resting order arrived first, so its level sets the price
                price: maker.price,
                qty: trade_qty,
            });

            remaining_qty -= trade_qty;
            maker.qty -= trade_qty;

            if maker.qty == 0 {
                self.book.pop_best(maker_side);
            }
        }

        remaining_qty
    }

    /// Cancel a resting order.
    ///
    /// # Returns
    /// The removed order, or `None` if nothing rests under `order_id`
    pub fn cancel_order(&mut self, order_id: u64) -> Option<Order> {
        let removed = self.book.remove(order_id);
        if removed.is_none() {
            trace!(order_id, "cancel for unknown order ignored");
        }
        removed
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Get the best bid price
    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.book.best_bid()
    }

    /// Get the best ask price
    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.book.best_ask()
    }

    /// Get the spread
    #[inline]
    pub fn spread(&self) -> Option<u64> {
        self.book.spread()
    }

    /// Get total order count
    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Look up a resting order
    #[inline]
    pub fn resting(&self, order_id: u64) -> Option<&Order> {
        self.book.get(order_id)
    }

    /// Run the submit path over a throwaway book so the first real orders
    /// hit warm caches and already-faulted pages. No-op on a non-empty book.
    pub fn warm_up(&mut self) {
        const WARM_ORDERS: u64 = 1024;

        if !self.book.is_empty() {
            return;
        }
        for id in 0..WARM_ORDERS {
            self.submit_order(Order::buy(id, 1 + id % 8, 1));
            self.submit_order(Order::sell(WARM_ORDERS + id, 1_000 + id % 8, 1));
        }
        self.book.clear();
    }

    /// Compute a hash of the current book (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();

        for order in self.book.bids() {
            order.hash(&mut hasher);
        }
        "|".hash(&mut hasher);
        for order in self.book.asks() {
            order.hash(&mut hasher);
        }

        hasher.finish()
    }
}

/// Inclusive crossing rule: a buy crosses a sell iff buy price >= sell price.
#[inline]
fn prices_cross(taker_price: u64, maker_price: u64, taker_side: Side) -> bool {
    match taker_side {
        Side::Bid => taker_price >= maker_price,
        Side::Ask => maker_price >= taker_price,
    }
}
