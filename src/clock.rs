use chrono::Utc;

/// Wall clock used to stamp computed defaults and error points
///
/// Values are milliseconds since Unix epoch, the precision the
/// time-series backend expects for point timestamps.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Clock backed by system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock frozen at a single moment
#[cfg(any(feature = "test_util", test))]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

#[cfg(any(feature = "test_util", test))]
impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}
