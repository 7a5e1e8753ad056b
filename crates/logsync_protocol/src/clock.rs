//! Hybrid logical clock.
//!
//! A node keeps the last timestamp it produced or observed. New timestamps
//! follow the wall clock when it moves forward and bump the counter when it
//! stalls or steps backwards, so a node never produces the same timestamp
//! twice and never produces one smaller than the last.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::NodeId;
use crate::timestamp::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `millis`.
    #[must_use]
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Sets the current reading.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Moves the reading forward (or backward, for negative deltas).
    pub fn advance(&self, delta_ms: i64) {
        let current = self.millis.load(Ordering::SeqCst);
        self.set(current.saturating_add_signed(delta_ms));
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// Configuration for timestamp generation.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    /// How far generated timestamps may run ahead of the wall clock.
    pub max_drift: Duration,
}

impl ClockConfig {
    /// Creates the default configuration (five minutes of drift).
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_drift: Duration::from_secs(5 * 60),
        }
    }

    /// Sets the maximum drift.
    #[must_use]
    pub fn with_max_drift(mut self, max_drift: Duration) -> Self {
        self.max_drift = max_drift;
        self
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces strictly increasing timestamps for one node.
pub struct TimestampGenerator<C: Clock> {
    node: NodeId,
    last: Timestamp,
    clock: C,
    config: ClockConfig,
}

impl<C: Clock> TimestampGenerator<C> {
    /// Creates a generator with no history.
    pub fn new(node: NodeId, clock: C, config: ClockConfig) -> Self {
        Self {
            node,
            last: Timestamp::MIN,
            clock,
            config,
        }
    }

    /// Creates a generator resuming from a previously persisted timestamp.
    pub fn resume(last: Timestamp, clock: C, config: ClockConfig) -> Self {
        Self {
            node: last.node(),
            last,
            clock,
            config,
        }
    }

    /// The node this generator stamps for.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The last timestamp produced or observed.
    pub fn last(&self) -> Timestamp {
        self.last
    }

    /// Produces the next local timestamp.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::ClockDrift`] if the result would run ahead of the
    ///   wall clock by more than the configured maximum
    /// - [`ProtocolError::CounterOverflow`] if the per-millisecond counter is
    ///   exhausted
    /// - [`ProtocolError::TimeOutOfRange`] past [`Timestamp::MAX_MILLIS`]
    pub fn generate(&mut self) -> ProtocolResult<Timestamp> {
        let now = self.clock.now_millis();
        let millis = now.max(self.last.millis());
        let counter = if millis == self.last.millis() {
            u32::from(self.last.counter()) + 1
        } else {
            0
        };
        let next = self.checked(now, millis, counter)?;
        self.last = next;
        Ok(next)
    }

    /// Merges a timestamp received from another node.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::DuplicateNode`] if `remote` carries this node's id,
    /// plus the same errors as [`TimestampGenerator::generate`].
    pub fn receive(&mut self, remote: Timestamp) -> ProtocolResult<Timestamp> {
        if remote.node() == self.node {
            return Err(ProtocolError::DuplicateNode(self.node.to_string()));
        }
        let now = self.clock.now_millis();
        let local = self.last;
        let millis = now.max(local.millis()).max(remote.millis());
        let local_counter = u32::from(local.counter());
        let remote_counter = u32::from(remote.counter());
        let counter = match (millis == local.millis(), millis == remote.millis()) {
            (true, true) => local_counter.max(remote_counter) + 1,
            (true, false) => local_counter + 1,
            (false, true) => remote_counter + 1,
            (false, false) => 0,
        };
        let next = self.checked(now, millis, counter)?;
        self.last = next;
        Ok(next)
    }

    fn checked(&self, now: u64, millis: u64, counter: u32) -> ProtocolResult<Timestamp> {
        let drift_ms = millis.saturating_sub(now);
        let max_drift_ms = u64::try_from(self.config.max_drift.as_millis()).unwrap_or(u64::MAX);
        if drift_ms > max_drift_ms {
            return Err(ProtocolError::ClockDrift {
                drift_ms,
                max_drift_ms,
            });
        }
        let counter = u16::try_from(counter).map_err(|_| ProtocolError::CounterOverflow)?;
        Timestamp::new(millis, counter, self.node)
    }
}

impl<C: Clock> std::fmt::Debug for TimestampGenerator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampGenerator")
            .field("node", &self.node)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
