//! # Quick-LOB
//!
//! A low-latency market data pipeline: a TCP tick feed, a wait-free
//! single-producer/single-consumer ring, and a price-time priority
//! limit order book.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One thread owns each book and each ring endpoint (no locks)
//! - **Wait-Free Handoff**: Publish and consume are a load, a copy and a store
//! - **Bounded Failure**: The feed retries a fixed number of times, then stops
//! - **Fixed-Size Frames**: 40-byte ticks, decoded without copies of the stream
//!
//! ## Architecture
//!
//! ```text
//! [Market Server] --TCP--> [FeedHandler] --> [RingTransport<Tick>] --> [Strategy]
//!                                                                          |
//!                                               [RingTransport<OrderEvent>]
//!                                                                          v
//!                                                          [Engine Thread (Pinned)]
//!                                                                          |
//!                                                                       [Trades]
//! ```

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod logging;
pub mod matching;
pub mod net;
pub mod order_book;
pub mod ring;
pub mod tick;

// Re-exports for convenience
pub use command::{Order, OrderEvent, Side, Trade};
pub use config::Config;
pub use engine::Engine;
pub use error::{ConfigError, ConnectError};
pub use feed::{FeedHandle, FeedHandler, FeedStatsSnapshot, ReconnectPolicy};
pub use matching::MatchingEngine;
pub use net::{Connector, FeedConnection, TcpConnector};
pub use order_book::OrderBook;
pub use ring::{Consumer, Full, Producer, RingTransport};
pub use tick::{Symbol, Tick};
