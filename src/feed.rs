//! Feed Ingestion - Network bytes to ticks to the ring transport.
//!
//! [`FeedHandler`] owns the connection and the producer end of a tick
//! ring. [`FeedHandler::receive_loop`] runs on a dedicated thread:
//!
//! ```text
//! recv(40 bytes) --> Tick::decode --> Producer::try_publish --> consumer
//!      |                                  | full: count, yield, retry
//!      | error / peer closed
//!      v
//! reconnect (base * 2^k backoff, bounded) --> exhausted: clear run flag
//! ```
//!
//! Frames shorter than [`Tick::WIRE_SIZE`] are discarded, never stitched.
//! No partial-frame state survives a reconnection.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::{Config, ReconnectConfig};
use crate::error::ConnectError;
use crate::net::{Connector, FeedConnection};
use crate::ring::{CachePadded, Producer};
use crate::tick::Tick;

/// Longest uninterrupted sleep during backoff; the run flag is checked
/// between slices.
const BACKOFF_SLICE: Duration = Duration::from_millis(10);

// ============================================================================
// Reconnection Policy
// ============================================================================

/// Bounded exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Connection attempts before giving up
    pub max_attempts: u32,
    /// Delay unit; failed attempt `k` waits `base_delay * 2^k`
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Worst-case time spent sleeping before the loop gives up.
    /// No sleep follows the last attempt.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Live counters, written by the feed thread and read from anywhere.
#[derive(Debug, Default)]
pub struct FeedStats {
    ticks_received: CachePadded<AtomicU64>,
    transport_full: CachePadded<AtomicU64>,
    malformed_frames: AtomicU64,
    disconnects: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnects_exhausted: AtomicU64,
    panics: AtomicU64,
    sequence_gaps: AtomicU64,
    sequence_regressions: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl FeedStats {
    pub fn snapshot(&self) -> FeedStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        FeedStatsSnapshot {
            ticks_received: load(&self.ticks_received.0),
            transport_full: load(&self.transport_full.0),
            malformed_frames: load(&self.malformed_frames),
            disconnects: load(&self.disconnects),
            reconnect_attempts: load(&self.reconnect_attempts),
            reconnects_exhausted: load(&self.reconnects_exhausted),
            panics: load(&self.panics),
            sequence_gaps: load(&self.sequence_gaps),
            sequence_regressions: load(&self.sequence_regressions),
        }
    }
}

/// Point-in-time copy of [`FeedStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedStatsSnapshot {
    /// Full frames decoded
    pub ticks_received: u64,
    /// Ticks that found the transport full on first try
    pub transport_full: u64,
    /// Short frames discarded
    pub malformed_frames: u64,
    /// Receive errors and peer closes
    pub disconnects: u64,
    pub reconnect_attempts: u64,
    /// Times the retry ceiling was hit
    pub reconnects_exhausted: u64,
    /// Panics caught in the receive loop
    pub panics: u64,
    pub sequence_gaps: u64,
    pub sequence_regressions: u64,
}

// ============================================================================
// Sequence Instrumentation
// ============================================================================

/// Outcome of observing one sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceCheck {
    InOrder,
    /// Number of sequence numbers skipped
    Gap(u64),
    /// Repeated or went backwards
    Regression,
}

/// Tracks producer sequence numbers. Diagnostic only, never drops ticks.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceTracker {
    last: Option<u64>,
}

impl SequenceTracker {
    pub fn observe(&mut self, sequence: u64) -> SequenceCheck {
        let check = match self.last {
            None => SequenceCheck::InOrder,
            Some(last) if sequence == last.wrapping_add(1) => SequenceCheck::InOrder,
            Some(last) if sequence > last => SequenceCheck::Gap(sequence - last - 1),
            Some(_) => SequenceCheck::Regression,
        };
        if check != SequenceCheck::Regression {
            self.last = Some(sequence);
        }
        check
    }

    /// Forget history (after a reconnection).
    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ============================================================================
// Shared State and Handle
// ============================================================================

/// State visible to both the feed thread and its handles.
#[derive(Debug)]
struct FeedShared<T> {
    /// Current connection; the feed thread holds a clone of the `Arc` for `recv`
    active: Mutex<Option<Arc<T>>>,
    initialized: AtomicBool,
    stats: FeedStats,
}

impl<T: FeedConnection> FeedShared<T> {
    fn active(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install(&self, conn: T) {
        *self.active() = Some(Arc::new(conn));
        self.initialized.store(true, Ordering::Release);
    }

    fn current(&self) -> Option<Arc<T>> {
        self.active().clone()
    }

    /// Drop the connection, shutting the socket so a blocked `recv` returns.
    fn release(&self) {
        let conn = self.active().take();
        self.initialized.store(false, Ordering::Release);
        if let Some(conn) = conn {
            if let Err(e) = conn.shutdown() {
                debug!(error = %e, "shutdown on released connection failed");
            }
        }
    }
}

/// Cloneable, thread-safe view of a running feed.
#[derive(Debug)]
pub struct FeedHandle<T> {
    shared: Arc<FeedShared<T>>,
}

impl<T> Clone for FeedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: FeedConnection> FeedHandle<T> {
    /// Release the connection and mark the feed uninitialized.
    ///
    /// Wakes a feed thread blocked in `recv`. Clear the run flag first,
    /// otherwise the loop treats the closed socket as a disconnect and
    /// reconnects. Safe to call any number of times.
    pub fn stop(&self) {
        info!("stopping market feed");
        self.shared.release();

        let stats = self.shared.stats.snapshot();
        info!(
            ticks_received = stats.ticks_received,
            transport_full = stats.transport_full,
            "market feed stopped"
        );
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    #[inline]
    pub fn stats(&self) -> FeedStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

// ============================================================================
// Feed Handler
// ============================================================================

/// Why the receive loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopExit {
    /// Run flag cleared
    Stopped,
    /// Retry ceiling reached
    Exhausted,
}

/// Receives ticks from the market feed and publishes them into a ring.
pub struct FeedHandler<C: Connector, const N: usize> {
    ip: String,
    port: u16,
    policy: ReconnectPolicy,
    connector: C,
    producer: Producer<Tick, N>,
    shared: Arc<FeedShared<C::Conn>>,
    sequence: Option<SequenceTracker>,
}

impl<C: Connector, const N: usize> FeedHandler<C, N> {
    /// Build a handler for the endpoint and reconnect policy in `config`.
    /// Does not connect; see [`FeedHandler::initialize`].
    pub fn new(config: &Config, connector: C, producer: Producer<Tick, N>) -> Self {
        debug!("market feed constructed");
        Self {
            ip: config.market_ip().to_owned(),
            port: config.market_port(),
            policy: ReconnectPolicy::from(&config.reconnect),
            connector,
            producer,
            shared: Arc::new(FeedShared {
                active: Mutex::new(None),
                initialized: AtomicBool::new(false),
                stats: FeedStats::default(),
            }),
            sequence: config.feed.detect_gaps.then(SequenceTracker::default),
        }
    }

    /// Override the reconnect policy from the configuration.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable sequence-gap instrumentation.
    pub fn with_gap_detection(mut self, enabled: bool) -> Self {
        self.sequence = enabled.then(SequenceTracker::default);
        self
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// A handle for stopping and observing the feed from other threads.
    pub fn handle(&self) -> FeedHandle<C::Conn> {
        FeedHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    #[inline]
    pub fn stats(&self) -> FeedStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Connect to the market server. A no-op if already connected.
    pub fn initialize(&mut self) -> Result<(), ConnectError> {
        if self.is_initialized() {
            warn!("market feed already initialized");
            return Ok(());
        }

        info!(ip = %self.ip, port = self.port, "initializing market feed");

        match self.connector.connect(&self.ip, self.port) {
            Ok(conn) => {
                self.install(conn);
                info!("market feed connected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "could not connect to market server, it may not be online yet");
                Err(e)
            }
        }
    }

    /// Release the connection and mark the feed uninitialized. Idempotent.
    pub fn stop(&mut self) {
        self.handle().stop();
    }

    fn install(&mut self, conn: C::Conn) {
        self.shared.install(conn);
        if let Some(tracker) = self.sequence.as_mut() {
            tracker.reset();
        }
    }

    /// Run until `run` is cleared or reconnection is exhausted.
    ///
    /// Never unwinds: exhaustion and panics both end the loop, bump a
    /// counter and clear `run` so other threads can see the outage.
    pub fn receive_loop(&mut self, run: &AtomicBool) {
        info!("market feed receive loop started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_loop(run)));

        match outcome {
            // A reconnect may have landed after a concurrent `stop`
            Ok(LoopExit::Stopped) => self.shared.release(),
            Ok(LoopExit::Exhausted) => {
                error!(
                    attempts = self.policy.max_attempts,
                    "failed to reconnect to market server, receive loop exiting"
                );
                bump(&self.shared.stats.reconnects_exhausted);
                run.store(false, Ordering::Release);
            }
            Err(payload) => {
                error!(
                    panic = panic_message(payload.as_ref()),
                    "market feed receive loop crashed"
                );
                bump(&self.shared.stats.panics);
                self.shared.release();
                run.store(false, Ordering::Release);
            }
        }

        let stats = self.stats();
        info!(
            ticks_received = stats.ticks_received,
            transport_full = stats.transport_full,
            malformed_frames = stats.malformed_frames,
            "market feed receive loop exiting"
        );
    }

    fn run_loop(&mut self, run: &AtomicBool) -> LoopExit {
        let mut buf = [0u8; Tick::WIRE_SIZE];
        // Re-read from the shared slot only after a disconnect or reconnect
        let mut conn = self.shared.current();

        while run.load(Ordering::Acquire) {
            let Some(active) = conn.as_deref() else {
                warn!("no market feed connection, attempting reconnection");
                if self.reconnect(run) {
                    conn = self.shared.current();
                    continue;
                }
                return if run.load(Ordering::Acquire) {
                    LoopExit::Exhausted
                } else {
                    LoopExit::Stopped
                };
            };

            match active.recv(&mut buf) {
                Ok(0) => {
                    warn!("market server closed the connection, will reconnect");
                    self.disconnect();
                    conn = None;
                }
                Ok(n) if n < Tick::WIRE_SIZE => {
                    bump(&self.shared.stats.malformed_frames);
                    warn!(bytes = n, "incomplete market data frame, discarding");
                }
                Ok(_) => {
                    if let Some(tick) = Tick::decode(&buf) {
                        self.on_tick(tick, run);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "failed to receive market data, will reconnect");
                    self.disconnect();
                    conn = None;
                }
            }
        }

        LoopExit::Stopped
    }

    fn disconnect(&mut self) {
        bump(&self.shared.stats.disconnects);
        self.shared.release();
    }

    /// Try to reconnect up to the retry ceiling.
    ///
    /// # Returns
    /// `true` once connected, `false` if exhausted or `run` was cleared
    fn reconnect(&mut self, run: &AtomicBool) -> bool {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            if !run.load(Ordering::Acquire) {
                return false;
            }

            info!(attempt, max_attempts, "attempting to reconnect market feed");
            bump(&self.shared.stats.reconnect_attempts);

            match self.connector.connect(&self.ip, self.port) {
                Ok(conn) => {
                    self.install(conn);
                    // `stop` may have run while connect was in flight
                    if !run.load(Ordering::Acquire) {
                        debug!(attempt, "run flag cleared during reconnection, releasing");
                        self.shared.release();
                        return false;
                    }
                    info!(attempt, "market feed reconnected");
                    return true;
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "reconnection attempt failed"
                    );
                    if !sleep_while_running(delay, run) {
                        return false;
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "final reconnection attempt failed");
                }
            }
        }

        false
    }

    /// Account for and publish one decoded tick.
    #[inline]
    fn on_tick(&mut self, tick: Tick, run: &AtomicBool) {
        let stats = &self.shared.stats;
        bump(&stats.ticks_received.0);

        if let Some(tracker) = self.sequence.as_mut() {
            match tracker.observe(tick.sequence) {
                SequenceCheck::InOrder => {}
                SequenceCheck::Gap(missing) => {
                    bump(&stats.sequence_gaps);
                    warn!(sequence = tick.sequence, missing, "sequence gap");
                }
                SequenceCheck::Regression => {
                    bump(&stats.sequence_regressions);
                    warn!(sequence = tick.sequence, "sequence went backwards");
                }
            }
        }

        debug!(
            sequence = tick.sequence,
            symbol = %tick.symbol,
            bid = tick.bid,
            ask = tick.ask,
            timestamp_ns = tick.timestamp_ns,
            "tick"
        );

        if self.producer.try_publish(tick).is_ok() {
            return;
        }

        // Backpressure: count once, then spin with a yield until the
        // consumer makes room or shutdown is requested
        bump(&stats.transport_full.0);
        while run.load(Ordering::Acquire) {
            if self.producer.try_publish(tick).is_ok() {
                return;
            }
            thread::yield_now();
        }
        debug!(sequence = tick.sequence, "shutdown while transport full, tick dropped");
    }
}

impl<C: Connector, const N: usize> Drop for FeedHandler<C, N> {
    fn drop(&mut self) {
        self.shared.release();
        debug!("market feed destroyed");
    }
}

/// Sleep for `total`, waking every [`BACKOFF_SLICE`] to check `run`.
///
/// # Returns
/// `false` if `run` was cleared before the time elapsed
fn sleep_while_running(total: Duration, run: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !run.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(BACKOFF_SLICE));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
