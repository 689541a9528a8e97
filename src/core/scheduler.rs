/// Cycle scheduling primitives
///
/// Interval parsing and clamping, the periodic timer, and the in-flight /
/// deferred bookkeeping that keeps at most one read outstanding.
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::error::PlcError;

/// Shortest accepted cycle time; shorter requests are raised to this.
pub const MIN_CYCLE_TIME_MS: u64 = 1000;

/// Outcome of a cycle-time change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSchedule {
    /// Periodic polling is off; cycles only run on explicit triggers.
    Disabled,
    /// Poll every `n` milliseconds.
    Every(u64),
}

impl CycleSchedule {
    /// Resolve a requested interval in milliseconds.
    ///
    /// Negative values are rejected, zero disables polling, and positive
    /// values below [`MIN_CYCLE_TIME_MS`] are clamped with a warning.
    pub fn resolve(requested: i64, raw: &str) -> Result<Self, PlcError> {
        if requested < 0 {
            return Err(PlcError::InvalidInterval(raw.to_string()));
        }
        let millis = requested.unsigned_abs();
        if millis == 0 {
            return Ok(Self::Disabled);
        }
        if millis < MIN_CYCLE_TIME_MS {
            log::warn!(
                "Cycle time {millis}ms is too short, using the minimum of {MIN_CYCLE_TIME_MS}ms"
            );
            return Ok(Self::Every(MIN_CYCLE_TIME_MS));
        }
        Ok(Self::Every(millis))
    }

    /// Parse and resolve a textual interval request.
    pub fn parse(raw: &str) -> Result<Self, PlcError> {
        let requested =
            parse_interval(raw).ok_or_else(|| PlcError::InvalidInterval(raw.to_string()))?;
        Self::resolve(requested, raw)
    }
}

/// Parse the leading integer of `raw`.
///
/// Leading whitespace and a sign are accepted, parsing stops at the first
/// non-digit, so `"1500ms"` and `"2000.7"` both yield a value. Returns `None`
/// when no digit follows.
pub fn parse_interval(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Periodic cycle timer plus the cycle time currently in effect.
pub struct CycleTimer {
    cycle_time_ms: u64,
    interval: Option<Interval>,
}

impl CycleTimer {
    pub fn new(cycle_time_ms: u64) -> Self {
        Self {
            cycle_time_ms,
            interval: None,
        }
    }

    /// Cycle time used both for polling and as the connection timeout.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_millis(self.cycle_time_ms)
    }

    /// Operation timeout for the next connection.
    ///
    /// Follows the cycle time but never drops below the minimum, so a
    /// disabled or too-short cycle cannot make every read time out.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_time_ms.max(MIN_CYCLE_TIME_MS))
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    pub fn clear(&mut self) {
        self.interval = None;
    }

    /// Clear the timer, then arm it again according to `schedule`.
    ///
    /// A disabled schedule leaves the timer off and the cycle time untouched.
    pub fn apply(&mut self, schedule: CycleSchedule) {
        self.clear();
        if let CycleSchedule::Every(millis) = schedule {
            self.cycle_time_ms = millis;
            let period = Duration::from_millis(millis);
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.interval = Some(interval);
        }
    }

    /// Resolve the configured cycle time and (re)arm the timer with it.
    pub fn restart(&mut self) -> Result<CycleSchedule, PlcError> {
        let raw = self.cycle_time_ms.to_string();
        let requested = i64::try_from(self.cycle_time_ms).unwrap_or(i64::MAX);
        let schedule = CycleSchedule::resolve(requested, &raw)?;
        self.apply(schedule);
        Ok(schedule)
    }

    /// Wait for the next tick. Never resolves while the timer is off.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// In-flight flag plus the number of triggers that arrived meanwhile.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleState {
    in_flight: bool,
    deferred: u32,
}

impl CycleState {
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn deferred(&self) -> u32 {
        self.deferred
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Register a cycle request. Returns `true` when a read should start now.
    ///
    /// A request arriving while a read is outstanding is recorded as
    /// deferred instead.
    pub fn request(&mut self, connected: bool) -> bool {
        if self.in_flight {
            self.deferred = self.deferred.saturating_add(1);
            return false;
        }
        if !connected {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Record a successful read. Returns `true` when exactly one follow-up
    /// read should start for the triggers deferred meanwhile.
    pub fn complete(&mut self, connected: bool) -> bool {
        self.in_flight = false;
        if self.deferred > 0 && connected {
            self.deferred = 0;
            self.in_flight = true;
            return true;
        }
        false
    }

    /// Record a failed read. Deferred triggers are kept for a later cycle.
    pub fn fail(&mut self) {
        self.in_flight = false;
    }
}
