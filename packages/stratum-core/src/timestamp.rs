//! Hybrid Logical Clock (HLC) for transaction ordering and lock fencing.
//!
//! Provides monotonically increasing timestamps that combine physical wall-clock
//! time with a logical counter, ensuring total ordering of transaction-log entries
//! and distributed-lock fencing tokens even when two events land in the same
//! millisecond or originate from different nodes.
//!
//! # Wire format
//!
//! Timestamps serialize to the string format `"millis:counter:nodeId"`, which is
//! also the format used as the transaction-log record's sort key.

use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A hybrid logical timestamp combining physical time, logical counter, and node identity.
///
/// Ordering is millis first, then counter, then node_id (lexicographic byte order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Physical wall-clock milliseconds since Unix epoch.
    pub millis: u64,
    /// Logical counter for events within the same millisecond.
    pub counter: u32,
    /// Unique identifier of the node that generated this timestamp.
    pub node_id: String,
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis
            .cmp(&other.millis)
            .then_with(|| self.counter.cmp(&other.counter))
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.millis, self.counter, self.node_id)
    }
}

/// Abstraction over the system clock for dependency injection.
///
/// Allows deterministic testing by replacing the real clock with a virtual one.
pub trait ClockSource: Send + Sync {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now(&self) -> u64;
}

/// Default clock source that reads the real system time.
#[derive(Debug, Clone)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_millis() as u64
    }
}

/// Hybrid Logical Clock implementation.
///
/// Generates monotonically increasing [`Timestamp`]s by combining wall-clock time
/// with a logical counter. Used wherever the system needs a total order that
/// survives multiple events per millisecond: transaction-log entry ids and
/// lock fencing tokens.
pub struct HLC {
    last_millis: u64,
    last_counter: u32,
    node_id: String,
    clock_source: Box<dyn ClockSource>,
}

impl HLC {
    /// Creates a new HLC with the given node ID and clock source.
    pub fn new(node_id: String, clock_source: Box<dyn ClockSource>) -> Self {
        Self {
            last_millis: 0,
            last_counter: 0,
            node_id,
            clock_source,
        }
    }

    /// Returns the node ID of this HLC instance.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Generates a new unique, monotonically increasing timestamp.
    pub fn now(&mut self) -> Timestamp {
        let system_time = self.clock_source.now();

        if system_time > self.last_millis {
            self.last_millis = system_time;
            self.last_counter = 0;
        } else {
            self.last_counter += 1;
        }

        Timestamp {
            millis: self.last_millis,
            counter: self.last_counter,
            node_id: self.node_id.clone(),
        }
    }

    /// Serializes a timestamp to the wire format `"millis:counter:nodeId"`.
    pub fn to_string(ts: &Timestamp) -> String {
        ts.to_string()
    }

    /// Parses a timestamp from the wire format `"millis:counter:nodeId"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not contain exactly 3 colon-separated
    /// parts, or if millis/counter cannot be parsed as integers.
    pub fn parse(s: &str) -> Result<Timestamp, String> {
        let parts: Vec<&str> = s.splitn(3, ':').collect();
        if parts.len() != 3 {
            return Err(format!("invalid timestamp format: {s}"));
        }

        let millis = parts[0]
            .parse::<u64>()
            .map_err(|e| format!("invalid millis in timestamp: {e}"))?;
        let counter = parts[1]
            .parse::<u32>()
            .map_err(|e| format!("invalid counter in timestamp: {e}"))?;
        let node_id = parts[2].to_string();

        if node_id.is_empty() {
            return Err(format!("invalid timestamp format: {s}"));
        }

        Ok(Timestamp {
            millis,
            counter,
            node_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use super::*;

    struct FixedClock {
        time: Arc<AtomicU64>,
    }

    impl FixedClock {
        fn new(initial: u64) -> (Self, Arc<AtomicU64>) {
            let time = Arc::new(AtomicU64::new(initial));
            (Self { time: time.clone() }, time)
        }
    }

    impl ClockSource for FixedClock {
        fn now(&self) -> u64 {
            self.time.load(AtomicOrdering::Relaxed)
        }
    }

    #[test]
    fn timestamp_ordering_millis_first() {
        let a = Timestamp { millis: 100, counter: 5, node_id: "z".to_string() };
        let b = Timestamp { millis: 200, counter: 0, node_id: "a".to_string() };
        assert!(a < b);
    }

    #[test]
    fn timestamp_ordering_counter_second() {
        let a = Timestamp { millis: 100, counter: 1, node_id: "z".to_string() };
        let b = Timestamp { millis: 100, counter: 2, node_id: "a".to_string() };
        assert!(a < b);
    }

    #[test]
    fn timestamp_ordering_node_id_third() {
        let a = Timestamp { millis: 100, counter: 1, node_id: "a".to_string() };
        let b = Timestamp { millis: 100, counter: 1, node_id: "b".to_string() };
        assert!(a < b);
    }

    #[test]
    fn now_increments_counter_when_clock_unchanged() {
        let (clock, _) = FixedClock::new(1_000_000);
        let mut hlc = HLC::new("test-node".to_string(), Box::new(clock));

        let ts1 = hlc.now();
        let ts2 = hlc.now();
        let ts3 = hlc.now();

        assert_eq!(ts1.millis, 1_000_000);
        assert_eq!(ts2.millis, 1_000_000);
        assert_eq!(ts3.millis, 1_000_000);
        assert_eq!(ts1.counter, 0);
        assert_eq!(ts2.counter, 1);
        assert_eq!(ts3.counter, 2);
    }

    #[test]
    fn now_resets_counter_when_clock_advances() {
        let (clock, time) = FixedClock::new(1_000_000);
        let mut hlc = HLC::new("test-node".to_string(), Box::new(clock));

        let ts1 = hlc.now();
        assert_eq!(ts1.counter, 0);

        time.store(1_000_001, AtomicOrdering::Relaxed);
        let ts2 = hlc.now();
        assert_eq!(ts2.millis, 1_000_001);
        assert_eq!(ts2.counter, 0);
    }

    #[test]
    fn to_string_parse_roundtrip() {
        let original = Timestamp {
            millis: 9_999_999_999_999,
            counter: 1000,
            node_id: "test-node-123".to_string(),
        };
        let serialized = HLC::to_string(&original);
        let parsed = HLC::parse(&serialized).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn parse_invalid_formats() {
        assert!(HLC::parse("invalid").is_err());
        assert!(HLC::parse("123:456").is_err());
        assert!(HLC::parse("").is_err());
    }

    #[test]
    fn timestamp_serde_roundtrip() {
        let ts = Timestamp {
            millis: 1_700_000_000_000,
            counter: 42,
            node_id: "node-abc".to_string(),
        };
        let json = serde_json::to_string(&ts).expect("serialize");
        let decoded: Timestamp = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(ts, decoded);
    }

    #[test]
    fn total_ordering_across_concurrent_nodes() {
        let (c1, _) = FixedClock::new(1_000_000);
        let (c2, _) = FixedClock::new(1_000_000);

        let mut hlc1 = HLC::new("node-A".to_string(), Box::new(c1));
        let mut hlc2 = HLC::new("node-B".to_string(), Box::new(c2));

        let ts1 = hlc1.now();
        let ts2 = hlc2.now();

        assert_eq!(ts1.millis, ts2.millis);
        assert_eq!(ts1.counter, ts2.counter);

        let mut sorted = vec![ts1.clone(), ts2.clone()];
        sorted.sort();
        assert_eq!(sorted[0].node_id, "node-A");
        assert_eq!(sorted[1].node_id, "node-B");
    }
}
