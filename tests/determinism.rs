//! Determinism Test - Golden Master verification.
//!
//! Verifies that the engine produces identical trades and identical
//! resting state across runs when given the same input sequence.

use quick_lob::{Engine, Order, OrderEvent, Side, Trade};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Generate a deterministic sequence of order events
fn generate_events(seed: u64, count: usize) -> Vec<OrderEvent> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut events = Vec::with_capacity(count);
    let mut active_orders: Vec<u64> = Vec::new();
    let mut next_order_id = 1u64;

    for _ in 0..count {
        // 70% submit, 30% cancel
        if active_orders.is_empty() || rng.gen_bool(0.7) {
            let order_id = next_order_id;
            next_order_id += 1;

            let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
            events.push(OrderEvent::Submit(Order::new(
                order_id,
                rng.gen_range(9500..10500) * 100, // 950.00 to 1050.00
                side,
                rng.gen_range(1..500),
            )));

            active_orders.push(order_id);
        } else {
            // Cancel random order; it may already have been filled
            let idx = rng.gen_range(0..active_orders.len());
            events.push(OrderEvent::Cancel(active_orders.swap_remove(idx)));
        }
    }

    events
}

/// Compute a hash of all trades
fn hash_trades(trades: &[Trade]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for trade in trades {
        trade.hash(&mut hasher);
    }
    hasher.finish()
}

/// Run the engine with an event sequence and return (trade hash, state hash)
fn run_engine(events: &[OrderEvent]) -> (u64, u64) {
    let mut engine = Engine::new(100_000);
    let mut all_trades = Vec::new();

    for event in events {
        all_trades.extend(engine.process(*event));
    }

    (hash_trades(&all_trades), engine.state_hash())
}

#[test]
fn test_determinism_small() {
    const SEED: u64 = 0xDEADBEEF;
    const COUNT: usize = 1000;
    const RUNS: usize = 10;

    let events = generate_events(SEED, COUNT);

    let (first_trade_hash, first_state_hash) = run_engine(&events);

    for run in 1..RUNS {
        let (trade_hash, state_hash) = run_engine(&events);

        assert_eq!(trade_hash, first_trade_hash, "Trade hash mismatch on run {}", run);
        assert_eq!(state_hash, first_state_hash, "State hash mismatch on run {}", run);
    }

    println!("Determinism test passed!");
    println!("  Events: {}", COUNT);
    println!("  Runs: {}", RUNS);
    println!("  Trade hash: {:#018x}", first_trade_hash);
    println!("  State hash: {:#018x}", first_state_hash);
}

#[test]
fn test_determinism_large() {
    const SEED: u64 = 0xCAFEBABE;
    const COUNT: usize = 100_000;
    const RUNS: usize = 3;

    let events = generate_events(SEED, COUNT);

    let (first_trade_hash, first_state_hash) = run_engine(&events);

    for run in 1..RUNS {
        let (trade_hash, state_hash) = run_engine(&events);

        assert_eq!(trade_hash, first_trade_hash, "Trade hash mismatch on run {}", run);
        assert_eq!(state_hash, first_state_hash, "State hash mismatch on run {}", run);
    }

    println!("Large determinism test passed!");
    println!("  Events: {}", COUNT);
    println!("  Trade hash: {:#018x}", first_trade_hash);
    println!("  State hash: {:#018x}", first_state_hash);
}

#[test]
fn test_warm_up_does_not_change_results() {
    let events = generate_events(0xA11CE, 5_000);

    let (cold_trades, cold_state) = run_engine(&events);

    let mut engine = Engine::new(100_000);
    engine.warm_up();
    let mut trades = Vec::new();
    for event in &events {
        trades.extend(engine.process(*event));
    }

    assert_eq!(hash_trades(&trades), cold_trades);
    assert_eq!(engine.state_hash(), cold_state);
}

#[test]
fn test_different_seeds_produce_different_results() {
    let events1 = generate_events(1, 1000);
    let events2 = generate_events(2, 1000);

    let (hash1, state1) = run_engine(&events1);
    let (hash2, state2) = run_engine(&events2);

    assert!(
        hash1 != hash2 || state1 != state2,
        "Different seeds should produce different results"
    );
}
