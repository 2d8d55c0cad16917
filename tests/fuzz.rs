//! Fuzz Test - Compares the matching engine against a reference implementation.
//!
//! Uses a naive but obviously correct reference book (price-keyed FIFO
//! queues) to verify the sorted-vec engine produces identical trades
//! and identical resting state.

use quick_lob::{Engine, Order, OrderEvent, Side, Trade};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Simple reference implementation for verification
#[derive(Default)]
struct ReferenceBook {
    bids: BTreeMap<u64, VecDeque<(u64, u32)>>, // price -> [(order_id, qty)], oldest first
    asks: BTreeMap<u64, VecDeque<(u64, u32)>>,
    orders: HashMap<u64, (Side, u64)>, // order_id -> (side, price)
}

impl ReferenceBook {
    fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    fn submit(&mut self, order: Order) -> Vec<Trade> {
        let mut trades = Vec::new();
        if order.qty == 0 || self.orders.contains_key(&order.id) {
            return trades;
        }

        let mut qty = order.qty;
        while qty > 0 {
            let best = match order.side {
                Side::Bid => self.best_ask().filter(|&p| p <= order.price),
                Side::Ask => self.best_bid().filter(|&p| p >= order.price),
            };
            let Some(level_price) = best else { break };

            let levels = match order.side {
                Side::Bid => &mut self.asks,
                Side::Ask => &mut self.bids,
            };
            let queue = levels.get_mut(&level_price).unwrap();
            let (maker_id, maker_qty) = queue.front_mut().unwrap();

            let trade_qty = qty.min(*maker_qty);
            let (bid_order_id, ask_order_id) = match order.side {
                Side::Bid => (order.id, *maker_id),
                Side::Ask => (*maker_id, order.id),
            };
            trades.push(Trade {
                bid_order_id,
                ask_order_id,
                aggressor_id: order.id,
                aggressor_side: order.side,
                price: level_price,
                qty: trade_qty,
            });

            qty -= trade_qty;
            *maker_qty -= trade_qty;
            if *maker_qty == 0 {
                let (filled_id, _) = queue.pop_front().unwrap();
                self.orders.remove(&filled_id);
                if queue.is_empty() {
                    levels.remove(&level_price);
                }
            }
        }

        if qty > 0 {
            let levels = match order.side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            levels.entry(order.price).or_default().push_back((order.id, qty));
            self.orders.insert(order.id, (order.side, order.price));
        }

        trades
    }

    fn cancel(&mut self, order_id: u64) -> bool {
        let Some((side, price)) = self.orders.remove(&order_id) else {
            return false;
        };
        let levels = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        if let Some(queue) = levels.get_mut(&price) {
            queue.retain(|(id, _)| *id != order_id);
            if queue.is_empty() {
                levels.remove(&price);
            }
        }
        true
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Resting orders in priority order, best first
    fn bids(&self) -> Vec<(u64, u64, u32)> {
        self.bids
            .iter()
            .rev()
            .flat_map(|(&p, q)| q.iter().map(move |&(id, qty)| (id, p, qty)))
            .collect()
    }

    fn asks(&self) -> Vec<(u64, u64, u32)> {
        self.asks
            .iter()
            .flat_map(|(&p, q)| q.iter().map(move |&(id, qty)| (id, p, qty)))
            .collect()
    }
}

fn engine_side(orders: impl Iterator<Item = Order>) -> Vec<(u64, u64, u32)> {
    orders.map(|o| (o.id, o.price, o.qty)).collect()
}

fn generate_order(rng: &mut ChaCha8Rng, order_id: u64) -> Order {
    let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
    Order::new(order_id, rng.gen_range(9980..10020), side, rng.gen_range(1..200))
}

#[test]
fn test_fuzz_trades_and_book_match_reference() {
    const SEED: u64 = 0xFEEDFACE;
    const OPS: usize = 20_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new(100_000);
    let mut reference = ReferenceBook::default();

    let mut next_order_id = 1u64;
    let mut submitted: Vec<u64> = Vec::new();

    for i in 0..OPS {
        let roll = rng.gen_range(0..100);
        if submitted.is_empty() || roll < 65 {
            let order = generate_order(&mut rng, next_order_id);
            next_order_id += 1;

            let trades = engine.process(OrderEvent::Submit(order));
            let expected = reference.submit(order);
            assert_eq!(trades, expected, "trade mismatch at op {} for {:?}", i, order);

            submitted.push(order.id);
        } else if roll < 70 {
            // Reuse an id that may still be resting
            let id = submitted[rng.gen_range(0..submitted.len())];
            let order = Order { id, ..generate_order(&mut rng, id) };

            let trades = engine.process(OrderEvent::Submit(order));
            let expected = reference.submit(order);
            assert_eq!(trades, expected, "duplicate handling mismatch at op {}", i);
        } else {
            let idx = rng.gen_range(0..submitted.len());
            let order_id = submitted.swap_remove(idx);

            let removed = engine.matcher.cancel_order(order_id).is_some();
            assert_eq!(removed, reference.cancel(order_id), "cancel mismatch at op {}", i);
        }

        assert_eq!(engine.best_bid(), reference.best_bid(), "best bid mismatch at op {}", i);
        assert_eq!(engine.best_ask(), reference.best_ask(), "best ask mismatch at op {}", i);
        assert_eq!(engine.order_count(), reference.order_count(), "count mismatch at op {}", i);
    }

    let book = &engine.matcher.book;
    assert_eq!(engine_side(book.bids().copied()), reference.bids());
    assert_eq!(engine_side(book.asks().copied()), reference.asks());

    println!("Fuzz test passed!");
    println!("  Operations: {}", OPS);
    println!("  Final order count: {}", engine.order_count());
}

#[test]
fn test_fuzz_book_never_crossed() {
    const SEED: u64 = 0xBADC0DE;
    const OPS: usize = 10_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new(100_000);

    for i in 0..OPS as u64 {
        engine.process(OrderEvent::Submit(generate_order(&mut rng, i)));

        if let (Some(bid), Some(ask)) = (engine.best_bid(), engine.best_ask()) {
            assert!(bid < ask, "crossed book after op {}: bid={} ask={}", i, bid, ask);
        }
    }
}

#[test]
fn test_fuzz_quantity_conservation() {
    const SEED: u64 = 0x12345678;
    const OPS: usize = 5_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::new(100_000);

    let mut submitted_qty = 0u64;
    let mut traded_qty = 0u64;

    for i in 0..OPS as u64 {
        let order = generate_order(&mut rng, i);
        submitted_qty += order.qty as u64;

        for trade in engine.process(OrderEvent::Submit(order)) {
            assert_eq!(trade.aggressor_id, order.id);
            traded_qty += trade.qty as u64;
        }
    }

    // Each trade consumes its quantity from both the aggressor and a maker
    let resting_qty: u64 = engine
        .matcher
        .book
        .bids()
        .chain(engine.matcher.book.asks())
        .map(|o| o.qty as u64)
        .sum();
    assert_eq!(submitted_qty, resting_qty + 2 * traded_qty);

    println!("Quantity conservation passed!");
    println!("  Total traded: {}", traded_qty);
}
