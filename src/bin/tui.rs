use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use quick_lob::{
    Config, Engine, FeedHandler, Order, OrderEvent, RingTransport, Side, Symbol, TcpConnector,
    Tick,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use std::io::{self, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Fixed-point scale: 1 price unit = $0.01
const PRICE_SCALE: f64 = 100.0;
const DEPTH: usize = 15;

#[derive(Parser)]
#[command(name = "tui-demo")]
#[command(about = "Live view of a loopback tick feed driving the order book")]
struct Cli {
    /// Pin the engine thread to the last CPU core
    #[arg(long)]
    pin_core: bool,
}

/// A snapshot of the top levels to share with the UI
#[derive(Default, Clone)]
struct BookSnapshot {
    bids: Vec<(u64, u64)>, // (Price, Qty)
    asks: Vec<(u64, u64)>,
    last_tick: Option<Tick>,
}

#[derive(Default)]
struct SharedStats {
    ops_count: AtomicU64,
    trades: AtomicU64,
    avg_latency_ns: AtomicU64,
    resting: AtomicU64,
    book_snapshot: RwLock<BookSnapshot>,
}

// Helper to generate the ASCII Bar string
fn render_level_bars(levels: &[(u64, u64)]) -> String {
    let max_qty = levels.iter().map(|(_, q)| *q).max().unwrap_or(1) as f32;

    levels
        .iter()
        .map(|(price, qty)| {
            let bar_len = ((*qty as f32 / max_qty) * 20.0) as usize;
            format!("{:>10.2} {:<20} {:<6}\n", *price as f64 / PRICE_SCALE, "█".repeat(bar_len), qty)
        })
        .collect()
}

/// Quote server on loopback: a random walk around $3,000, one frame per
/// 100 us, until `run` clears.
fn spawn_quote_server(run: Arc<AtomicBool>) -> io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    thread::Builder::new().name("quote-server".into()).spawn(move || {
        let Ok((mut socket, _)) = listener.accept() else { return };
        let symbol = Symbol::new("ETHUSD");
        let mut rng = 12345u64; // Simple LCG for speed
        let mut mid = 3000.0f64;

        for sequence in 0.. {
            if !run.load(Ordering::Relaxed) {
                break;
            }
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
            let r = rng >> 32;

            // Brownian drift, half-spread between $0.05 and $0.50
            mid = (mid + ((r % 11) as f64 - 5.0) * 0.01).max(10.0);
            let half_spread = (5 + r % 45) as f64 / PRICE_SCALE;

            let timestamp_ns = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos() as u64);
            let tick = Tick {
                sequence,
                symbol,
                bid: mid - half_spread,
                ask: mid + half_spread,
                timestamp_ns,
            };
            if socket.write_all(&tick.encode()).is_err() {
                break;
            }
            thread::sleep(Duration::from_micros(100));
        }
    })?;

    Ok(port)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let run = Arc::new(AtomicBool::new(true));
    let port = spawn_quote_server(run.clone())?;

    // Feed: loopback server -> tick ring
    let mut config = Config::for_endpoint("127.0.0.1", port);
    config.engine.pin_core = cli.pin_core;
    let (tick_tx, mut tick_rx) = RingTransport::<Tick, 4096>::new();
    let mut feed = FeedHandler::new(&config, TcpConnector::new(), tick_tx).with_gap_detection(true);
    let feed_handle = feed.handle();
    feed.initialize()?;

    let feed_run = run.clone();
    let feed_thread = thread::Builder::new()
        .name("market-feed".into())
        .spawn(move || feed.receive_loop(&feed_run))?;

    // Strategy + engine: every tick becomes a passive quote on each side
    // and, every few ticks, an aggressive order that crosses
    let stats = Arc::new(SharedStats::default());
    let stats_clone = stats.clone();
    let engine_run = run.clone();
    let engine_thread = thread::Builder::new().name("engine".into()).spawn(move || {
        let mut engine = Engine::new(config.engine.order_capacity);
        if config.engine.pin_core {
            engine.pin_to_core();
        }
        engine.warm_up();
        let mut order_id = 0u64;
        let mut batch_ops = 0u64;
        let mut batch_start = Instant::now();
        let mut last_tick = None;

        while engine_run.load(Ordering::Acquire) {
            let Some(tick) = tick_rx.try_consume() else {
                std::hint::spin_loop();
                continue;
            };
            last_tick = Some(tick);

            let bid = (tick.bid * PRICE_SCALE).round() as u64;
            let ask = (tick.ask * PRICE_SCALE).round() as u64;
            let qty = 1 + (tick.sequence % 100) as u32;

            let mut orders = vec![
                Order::buy(order_id + 1, bid, qty),
                Order::sell(order_id + 2, ask, qty),
            ];
            if tick.sequence % 4 == 0 {
                let aggressor = if tick.sequence % 8 == 0 {
                    Order::buy(order_id + 3, ask, qty * 2)
                } else {
                    Order::sell(order_id + 3, bid, qty * 2)
                };
                orders.push(aggressor);
            }
            order_id += 3;

            for order in orders {
                let trades = engine.process(OrderEvent::Submit(order));
                stats_clone.trades.fetch_add(trades.len() as u64, Ordering::Relaxed);
                batch_ops += 1;
            }

            // Reset if the demo book grows too deep
            if engine.order_count() > config.engine.order_capacity * 9 / 10 {
                engine = Engine::new(config.engine.order_capacity);
            }

            if batch_ops >= 1000 {
                let ns_per_op = batch_start.elapsed().as_nanos() as u64 / batch_ops;
                stats_clone.ops_count.fetch_add(batch_ops, Ordering::Relaxed);
                stats_clone.avg_latency_ns.store(ns_per_op, Ordering::Relaxed);
                stats_clone.resting.store(engine.order_count() as u64, Ordering::Relaxed);

                if let Ok(mut snapshot) = stats_clone.book_snapshot.write() {
                    snapshot.bids = engine.matcher.book.levels(Side::Bid, DEPTH);
                    snapshot.asks = engine.matcher.book.levels(Side::Ask, DEPTH);
                    snapshot.last_tick = last_tick;
                }
                batch_ops = 0;
                batch_start = Instant::now();
            }
        }
    })?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut last_ops = 0;
    let mut last_time = Instant::now();
    let mut throughput = 0.0;

    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }
        // Feed gave up
        if !run.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        if now.duration_since(last_time).as_secs_f64() >= 1.0 {
            let current_ops = stats.ops_count.load(Ordering::Relaxed);
            throughput = (current_ops - last_ops) as f64;
            last_ops = current_ops;
            last_time = now;
        }

        let snapshot = stats
            .book_snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        let feed_stats = feed_handle.stats();

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .margin(1)
                .constraints([
                    Constraint::Length(3),  // Header
                    Constraint::Min(10),    // Book
                    Constraint::Length(10), // Stats
                ])
                .split(f.size());

            // 1. Header
            let quote = match snapshot.last_tick {
                Some(t) => format!(
                    "{} | seq {} | {:.2} / {:.2} | {} | Press 'q' to quit",
                    t.symbol,
                    t.sequence,
                    t.bid,
                    t.ask,
                    t.timestamp().format("%H:%M:%S%.3f")
                ),
                None => "waiting for ticks | Press 'q' to quit".to_string(),
            };
            let header = Block::default().borders(Borders::ALL).title("QUICK-LOB Loopback Feed Demo");
            let title = Paragraph::new(quote)
                .block(header)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Cyan));
            f.render_widget(title, chunks[0]);

            // 2. Book
            let book_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(chunks[1]);

            let bids_widget = Paragraph::new(render_level_bars(&snapshot.bids)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("BIDS")
                    .style(Style::default().fg(Color::Green)),
            );
            let asks_widget = Paragraph::new(render_level_bars(&snapshot.asks)).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("ASKS")
                    .style(Style::default().fg(Color::Red)),
            );
            f.render_widget(bids_widget, book_chunks[0]);
            f.render_widget(asks_widget, book_chunks[1]);

            // 3. Stats
            let ops_fmt = if throughput > 1_000_000.0 {
                format!("{:.2} M", throughput / 1_000_000.0)
            } else {
                format!("{:.0} k", throughput / 1_000.0)
            };
            let stats_text = format!(
                "Throughput: {} ops/sec\nLatency (Avg Batch): {} ns\nResting Orders: {}\nTrades: {}\n\
                 Ticks: {}  Transport Full: {}  Gaps: {}\nDisconnects: {}  Reconnect Attempts: {}",
                ops_fmt,
                stats.avg_latency_ns.load(Ordering::Relaxed),
                stats.resting.load(Ordering::Relaxed),
                stats.trades.load(Ordering::Relaxed),
                feed_stats.ticks_received,
                feed_stats.transport_full,
                feed_stats.sequence_gaps,
                feed_stats.disconnects,
                feed_stats.reconnect_attempts,
            );
            let stats_block = Paragraph::new(stats_text)
                .block(Block::default().borders(Borders::ALL).title("Telemetry"))
                .style(Style::default().fg(Color::Yellow));
            f.render_widget(stats_block, chunks[2]);
        })?;
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    // Shutdown order: flag first, then wake the feed's blocked recv
    run.store(false, Ordering::Release);
    feed_handle.stop();
    let _ = feed_thread.join();
    let _ = engine_thread.join();
    Ok(())
}
