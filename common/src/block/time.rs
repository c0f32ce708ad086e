//! Block time and other time-related types.
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::BlockTime;

/// Maximum time adjustment between network and local time (70 minutes).
pub const MAX_TIME_ADJUSTMENT: TimeOffset = 70 * 60;

/// Maximum a block timestamp can exceed the network-adjusted time before
/// it is considered invalid (2 hours).
pub const MAX_FUTURE_BLOCK_TIME: BlockTime = 60 * 60 * 2;

/// Minimum number of samples before we adjust local time.
pub const MIN_TIME_SAMPLES: usize = 5;

/// Maximum number of samples stored.
pub const MAX_TIME_SAMPLES: usize = 200;

/// A time offset, in seconds.
pub type TimeOffset = i64;

/// Clock that tells the time.
pub trait Clock: Clone {
    /// Return the network time as seconds since Epoch.
    /// This is the same representation as used in block header timestamps.
    fn block_time(&self) -> BlockTime;
    /// Tell the time in local time.
    fn local_time(&self) -> LocalTime;
    /// Create a clock from a block time.
    fn from_block_time(t: BlockTime) -> Self;
}

/// Local time.
///
/// This clock is monotonic.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Ord, PartialOrd, Default)]
pub struct LocalTime {
    /// Milliseconds since Epoch.
    millis: u128,
}

impl std::fmt::Display for LocalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_secs())
    }
}

impl LocalTime {
    /// Construct a local time from the current system time.
    pub fn now() -> Self {
        static LAST: atomic::AtomicU64 = atomic::AtomicU64::new(0);

        let now = Self::from(SystemTime::now()).as_secs();
        let last = LAST.fetch_max(now, atomic::Ordering::SeqCst);

        // Never go back in time, even if the system clock does.
        Self::from_secs(now.max(last))
    }

    /// Construct a local time from whole seconds since Epoch.
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            millis: secs as u128 * 1000,
        }
    }

    /// Return the local time in whole seconds since Epoch.
    pub fn as_secs(&self) -> u64 {
        (self.millis / 1000) as u64
    }

    /// Elapse time.
    pub fn elapse(&mut self, duration: Duration) {
        self.millis += duration.as_millis()
    }
}

impl From<SystemTime> for LocalTime {
    fn from(system: SystemTime) -> Self {
        let millis = system
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Self { millis }
    }
}

impl std::ops::Add<Duration> for LocalTime {
    type Output = LocalTime;

    fn add(self, other: Duration) -> LocalTime {
        LocalTime {
            millis: self.millis + other.as_millis(),
        }
    }
}

impl Clock for LocalTime {
    fn block_time(&self) -> BlockTime {
        self.as_secs() as BlockTime
    }

    fn local_time(&self) -> LocalTime {
        *self
    }

    fn from_block_time(t: BlockTime) -> Self {
        LocalTime::from_secs(t as u64)
    }
}

/// Network-adjusted time tracker.
///
/// The network-adjusted time is the local time plus the median time offset reported by
/// connected peers. One sample is kept per source, and the adjustment is never more than
/// [`MAX_TIME_ADJUSTMENT`] away from local time.
#[derive(Debug, Clone)]
pub struct AdjustedTime<K> {
    /// Sample sources. Prevents us from getting two samples from the same source.
    sources: HashSet<K>,
    /// Time offset samples, including an initial zero sample for ourselves.
    samples: Vec<TimeOffset>,
    /// Current time offset.
    offset: TimeOffset,
    /// Last known local time.
    local_time: LocalTime,
}

impl<K: Hash + Eq> Default for AdjustedTime<K> {
    fn default() -> Self {
        Self::new(LocalTime::default())
    }
}

impl<K: Hash + Eq> AdjustedTime<K> {
    /// Create a new network-adjusted time tracker.
    pub fn new(local_time: LocalTime) -> Self {
        let mut samples = Vec::with_capacity(MAX_TIME_SAMPLES);
        samples.push(0);

        Self {
            sources: HashSet::with_capacity(MAX_TIME_SAMPLES),
            samples,
            offset: 0,
            local_time,
        }
    }

    /// Add a time sample to influence the network-adjusted time.
    pub fn record_offset(&mut self, source: K, sample: TimeOffset) {
        if self.sources.len() == MAX_TIME_SAMPLES || !self.sources.insert(source) {
            return;
        }
        self.samples.push(sample);

        let count = self.samples.len();
        if count < MIN_TIME_SAMPLES || count % 2 == 0 {
            return;
        }
        let mut offsets = self.samples.clone();
        offsets.sort_unstable();

        let median = offsets[count / 2];
        self.offset = if median.abs() <= MAX_TIME_ADJUSTMENT {
            median
        } else {
            0
        };
        log::debug!("Time offset adjusted to {} seconds", self.offset);
    }

    /// Get the median network time offset.
    pub fn offset(&self) -> TimeOffset {
        self.offset
    }

    /// Get the network-adjusted time given a local block time.
    pub fn from(&self, time: BlockTime) -> BlockTime {
        if self.offset >= 0 {
            time.saturating_add(self.offset as BlockTime)
        } else {
            time.saturating_sub(self.offset.unsigned_abs() as BlockTime)
        }
    }

    /// Get the current network-adjusted time.
    pub fn get(&self) -> BlockTime {
        self.from(self.local_time.block_time())
    }

    /// Set the local time to the given value.
    pub fn set_local_time(&mut self, time: LocalTime) {
        self.local_time = time;
    }
}

impl<K: Hash + Eq + Clone> Clock for AdjustedTime<K> {
    fn block_time(&self) -> BlockTime {
        self.get()
    }

    fn local_time(&self) -> LocalTime {
        self.local_time
    }

    fn from_block_time(t: BlockTime) -> Self {
        AdjustedTime::new(LocalTime::from_block_time(t))
    }
}
