//! Order Book - Two sorted sequences of resting orders.
//!
//! Each side is a `Vec<Order>` arranged so the best order sits at the
//! **end**:
//!
//! ```text
//! bids: [ 99 (t2) | 99 (t1) | 100 (t4) | 101 (t5) | 101 (t3) ]  <- best
//! asks: [ 105 (t6) | 103 (t8) | 103 (t7) | 102 (t9) ]           <- best
//! ```
//!
//! Bids ascend by price, asks descend, and within one price the earliest
//! order is nearest the end. Best-price access is O(1), insertion is a
//! binary search plus a shift, and a full fill at the best price is a
//! `pop`.

use rustc_hash::FxHashMap;

use crate::command::{Order, Side};

/// The limit order book for one instrument.
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Ascending by price; best bid last
    bids: Vec<Order>,
    /// Descending by price; best ask last
    asks: Vec<Order>,
    /// Order id -> side, for the duplicate guard and cancel lookup
    index: FxHashMap<u64, Side>,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new order book with room for `orders` resting orders per side
    pub fn with_capacity(orders: usize) -> Self {
        Self {
            bids: Vec::with_capacity(orders),
            asks: Vec::with_capacity(orders),
            index: FxHashMap::with_capacity_and_hasher(orders * 2, Default::default()),
        }
    }

    #[inline]
    fn side(&self, side: Side) -> &Vec<Order> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    #[inline]
    fn side_mut(&mut self, side: Side) -> &mut Vec<Order> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Index at which a new order at `price` belongs: before every order
    /// at the same price, so older orders stay closer to the matching end.
    #[inline]
    fn insertion_point(orders: &[Order], side: Side, price: u64) -> usize {
        match side {
            Side::Bid => orders.partition_point(|o| o.price < price),
            Side::Ask => orders.partition_point(|o| o.price > price),
        }
    }

    /// Range of positions holding orders at exactly `price`.
    #[inline]
    fn level_range(orders: &[Order], side: Side, price: u64) -> std::ops::Range<usize> {
        let start = Self::insertion_point(orders, side, price);
        let len = orders[start..].partition_point(|o| o.price == price);
        start..start + len
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Best (highest) bid price
    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.bids.last().map(|o| o.price)
    }

    /// Best (lowest) ask price
    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.asks.last().map(|o| o.price)
    }

    /// Highest-priority resting order on `side`
    #[inline]
    pub fn best(&self, side: Side) -> Option<&Order> {
        self.side(side).last()
    }

    #[inline]
    pub(crate) fn best_mut(&mut self, side: Side) -> Option<&mut Order> {
        self.side_mut(side).last_mut()
    }

    /// Remove the highest-priority order on `side` (after a full fill).
    pub(crate) fn pop_best(&mut self, side: Side) -> Option<Order> {
        let order = self.side_mut(side).pop()?;
        self.index.remove(&order.id);
        Some(order)
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Rest an order in the book.
    ///
    /// # Returns
    /// `true` if the order was added, `false` if its id already rests
    pub fn insert(&mut self, order: Order) -> bool {
        if self.index.contains_key(&order.id) {
            return false;
        }
        self.index.insert(order.id, order.side);

        let orders = self.side_mut(order.side);
        let at = Self::insertion_point(orders, order.side, order.price);
        orders.insert(at, order);
        true
    }

    /// Remove a resting order by id.
    ///
    /// # Returns
    /// The removed order, or `None` if no such order rests
    pub fn remove(&mut self, order_id: u64) -> Option<Order> {
        let side = self.index.remove(&order_id)?;
        let orders = self.side_mut(side);
        let at = orders.iter().rposition(|o| o.id == order_id)?;
        Some(orders.remove(at))
    }

    /// Look up a resting order by id.
    pub fn get(&self, order_id: u64) -> Option<&Order> {
        let side = *self.index.get(&order_id)?;
        self.side(side).iter().rev().find(|o| o.id == order_id)
    }

    /// Check if an order rests on either side.
    #[inline]
    pub fn contains_order(&self, order_id: u64) -> bool {
        self.index.contains_key(&order_id)
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Resting bids, best first
    pub fn bids(&self) -> impl Iterator<Item = &Order> + '_ {
        self.bids.iter().rev()
    }

    /// Resting asks, best first
    pub fn asks(&self) -> impl Iterator<Item = &Order> + '_ {
        self.asks.iter().rev()
    }

    /// Get the total number of orders in the book
    #[inline]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Check if the book is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of distinct bid prices
    pub fn bid_levels(&self) -> usize {
        count_levels(&self.bids)
    }

    /// Number of distinct ask prices
    pub fn ask_levels(&self) -> usize {
        count_levels(&self.asks)
    }

    /// Clear all orders from the book
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.index.clear();
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Total quantity and order count resting at a price level
    pub fn depth_at(&self, side: Side, price: u64) -> (u64, u32) {
        let orders = self.side(side);
        let range = Self::level_range(orders, side, price);
        let qty = orders[range.clone()].iter().map(|o| o.qty as u64).sum();
        (qty, range.len() as u32)
    }

    /// Aggregated `(price, total_qty)` for the best `depth` levels, best first
    pub fn levels(&self, side: Side, depth: usize) -> Vec<(u64, u64)> {
        let mut out: Vec<(u64, u64)> = Vec::with_capacity(depth);
        for order in self.side(side).iter().rev() {
            if let Some((price, qty)) = out.last_mut() {
                if *price == order.price {
                    *qty += order.qty as u64;
                    continue;
                }
            }
            if out.len() == depth {
                break;
            }
            out.push((order.price, order.qty as u64));
        }
        out
    }
}

fn count_levels(orders: &[Order]) -> usize {
    orders
        .windows(2)
        .filter(|pair| pair[0].price != pair[1].price)
        .count()
        + usize::from(!orders.is_empty())
}
