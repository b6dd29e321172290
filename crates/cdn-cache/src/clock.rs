use std::fmt::Debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for expiry and GC decisions.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Milliseconds since the Unix epoch, negative for instants before it.
pub(crate) fn to_unix_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

pub(crate) fn from_unix_millis(millis: i64) -> SystemTime {
    if millis >= 0 {
        UNIX_EPOCH
            .checked_add(Duration::from_millis(millis as u64))
            .map_or_else(far_future, |t| t.min(far_future()))
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_millis(millis.unsigned_abs()))
            .unwrap_or(UNIX_EPOCH)
    }
}

/// 9999-12-31T23:59:59Z, representable on every platform.
pub(crate) fn far_future() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(253_402_300_799)
}

/// `time + d`, saturating at [`far_future`] instead of panicking.
pub(crate) fn saturating_add(time: SystemTime, d: Duration) -> SystemTime {
    time.checked_add(d)
        .map_or_else(far_future, |t| t.min(far_future()))
}
