//! Replay - Feed a CSV order log through the matching engine.
//!
//! Input rows: `action,order_id,side,price,qty`
//!
//! ```text
//! action,order_id,side,price,qty
//! submit,1,buy,100.25,10
//! submit,2,sell,100.20,4
//! cancel,1,,,
//! ```
//!
//! Trades are written to stdout as CSV; a book summary is logged at the end.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use quick_lob::{logging, Config, Engine, Order, OrderEvent, Side};

#[derive(Parser)]
#[command(name = "replay")]
#[command(about = "Replay a CSV order log through the matching engine")]
struct Cli {
    /// CSV file with `action,order_id,side,price,qty` rows
    input: PathBuf,

    /// Decimal price multiplier, e.g. 100 for cents
    #[arg(long, default_value_t = 100)]
    price_mult: u64,

    /// Optional TOML config; its `[engine]` table sizes the book
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only print the summary
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    #[serde(alias = "add", alias = "new")]
    Submit,
    #[serde(alias = "done")]
    Cancel,
}

#[derive(Debug, Deserialize)]
struct ReplayRow {
    action: Action,
    order_id: u64,
    side: Option<Side>,
    price: Option<Decimal>,
    qty: Option<u32>,
}

impl ReplayRow {
    /// Convert a raw row into an engine event.
    /// `None` when a submit is missing its side, price or quantity.
    fn to_event(&self, price_mult: u64) -> Option<OrderEvent> {
        match self.action {
            Action::Cancel => Some(OrderEvent::Cancel(self.order_id)),
            Action::Submit => {
                let price = (self.price? * Decimal::from(price_mult)).round().to_u64()?;
                Some(OrderEvent::Submit(Order::new(
                    self.order_id,
                    price,
                    self.side?,
                    self.qty?,
                )))
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let cli = Cli::parse();

    let capacity = match &cli.config {
        Some(path) => Config::load(path)?.engine.order_capacity,
        None => 100_000,
    };

    let mut engine = Engine::new(capacity);
    engine.warm_up();

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&cli.input)?;
    let mut writer = csv::Writer::from_writer(std::io::stdout());

    let mut events = 0u64;
    let mut skipped = 0u64;
    let mut trades = 0u64;
    let mut volume = 0u64;
    let start = Instant::now();

    for (line, row) in reader.deserialize::<ReplayRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping unreadable row");
                skipped += 1;
                continue;
            }
        };
        let Some(event) = row.to_event(cli.price_mult) else {
            warn!(line = line + 2, order_id = row.order_id, "skipping incomplete submit");
            skipped += 1;
            continue;
        };

        events += 1;
        for trade in engine.process(event) {
            trades += 1;
            volume += trade.qty as u64;
            if !cli.quiet {
                writer.serialize(trade)?;
            }
        }
    }
    writer.flush()?;

    let elapsed = start.elapsed();
    info!(
        events,
        skipped,
        trades,
        volume,
        elapsed_ms = elapsed.as_millis() as u64,
        "replay finished"
    );

    let book = &engine.matcher.book;
    info!(
        resting = book.order_count(),
        bid_levels = book.bid_levels(),
        ask_levels = book.ask_levels(),
        best_bid = ?book.best_bid(),
        best_ask = ?book.best_ask(),
        state_hash = engine.state_hash(),
        "final book"
    );
    Ok(())
}
