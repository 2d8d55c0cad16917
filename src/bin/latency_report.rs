use hdrhistogram::Histogram;
use quick_lob::{Engine, Order, OrderEvent, RingTransport, Side};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const ITERATIONS: u64 = 1_000_000;

fn print_report(title: &str, histogram: &Histogram<u64>, total: Duration) {
    println!("\n=== {} (ns) ===", title);
    println!("Total Ops:  {}", histogram.len());
    println!("Throughput: {:.2} ops/sec", histogram.len() as f64 / total.as_secs_f64());
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }
}

/// Latency of a single `submit_order` on a book hovering around 100 levels.
fn submit_latency() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = Engine::new(100_000);
    engine.warm_up();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;
    let mut total = Duration::ZERO;

    for order_id in 1..=ITERATIONS {
        let side = if order_id % 2 == 0 { Side::Bid } else { Side::Ask };
        let event = OrderEvent::Submit(Order::new(order_id, 10000 + (order_id % 100), side, 10));

        // Critical measurement section
        let start = Instant::now();
        std::hint::black_box(engine.process(event));
        let elapsed = start.elapsed();

        // Outliers past the histogram bound are dropped
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total += elapsed;
    }

    print_report("submit_order Latency", &histogram, total);
    Ok(())
}

/// Round trip of one record through two rings and an echo thread.
fn ring_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let (mut ping_tx, mut ping_rx) = RingTransport::<u64, 1024>::new();
    let (mut pong_tx, mut pong_rx) = RingTransport::<u64, 1024>::new();
    let run = Arc::new(AtomicBool::new(true));

    let echo_run = run.clone();
    let echo = thread::spawn(move || {
        while echo_run.load(Ordering::Acquire) {
            match ping_rx.try_consume() {
                Some(v) => {
                    while pong_tx.try_publish(v).is_err() {
                        std::hint::spin_loop();
                    }
                }
                None => std::hint::spin_loop(),
            }
        }
    });

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 1_000_000, 3)?;
    let mut total = Duration::ZERO;

    for i in 0..ITERATIONS {
        let start = Instant::now();
        while ping_tx.try_publish(i).is_err() {
            std::hint::spin_loop();
        }
        loop {
            if let Some(v) = pong_rx.try_consume() {
                std::hint::black_box(v);
                break;
            }
            std::hint::spin_loop();
        }
        let elapsed = start.elapsed();

        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total += elapsed;
    }

    run.store(false, Ordering::Release);
    if echo.join().is_err() {
        return Err("echo thread panicked".into());
    }

    print_report("Ring Round Trip Latency", &histogram, total);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Preparing Latency Benchmark...");
    println!("Running {} iterations per scenario...", ITERATIONS);

    submit_latency()?;
    ring_round_trip()?;
    Ok(())
}
