//! Order, trade, and order-event records.
//!
//! Orders are inputs to the matching engine; trades are its only output.

use serde::{Deserialize, Serialize};

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    #[serde(alias = "buy")]
    Bid = 0,
    /// Sell side (asks)
    #[serde(alias = "sell")]
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    #[inline]
    pub const fn is_buy(self) -> bool {
        matches!(self, Side::Bid)
    }
}

/// A limit order.
///
/// Prices are integral tick units so comparisons are exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Order {
    /// Unique for the lifetime of the book
    pub id: u64,
    /// Price level in ticks
    pub price: u64,
    pub side: Side,
    /// Remaining quantity
    pub qty: u32,
}

impl Order {
    #[inline]
    pub const fn new(id: u64, price: u64, side: Side, qty: u32) -> Self {
        Self { id, price, side, qty }
    }

    #[inline]
    pub const fn buy(id: u64, price: u64, qty: u32) -> Self {
        Self::new(id, price, Side::Bid, qty)
    }

    #[inline]
    pub const fn sell(id: u64, price: u64, qty: u32) -> Self {
        Self::new(id, price, Side::Ask, qty)
    }
}

/// One execution produced by a submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Trade {
    /// Order on the bid side of the trade
    pub bid_order_id: u64,
    /// Order on the ask side of the trade
    pub ask_order_id: u64,
    /// The incoming order that initiated the match
    pub aggressor_id: u64,
    pub aggressor_side: Side,
    /// Execution price, always the resting order's: a buy resting at 101
    /// hit by a sell limited at 100 trades at 101.
    pub price: u64,
    /// Executed quantity
    pub qty: u32,
}

/// Discrete input to the matching engine, as carried by a ring transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderEvent {
    /// Submit a new order
    Submit(Order),
    /// Cancel a resting order by id
    Cancel(u64),
}
