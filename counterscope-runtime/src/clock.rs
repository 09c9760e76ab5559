//! Wall-clock timestamps with nanosecond resolution.
//!
//! Rows store absolute realtime timestamps (seconds since the Unix epoch plus
//! a nanosecond fraction) so traces from separate runs line up with other
//! system logs.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point in realtime, `secs.nanos` since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    secs: u64,
    nanos: u32,
}

impl Timestamp {
    /// Build a timestamp, carrying excess nanoseconds into seconds.
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self {
            secs: secs + u64::from(nanos / NANOS_PER_SEC),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    /// Read the realtime clock.
    ///
    /// A clock set before 1970 reads as the epoch rather than failing.
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from(since)
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from(*self).saturating_sub(Duration::from(earlier))
    }
}

impl From<Duration> for Timestamp {
    fn from(d: Duration) -> Self {
        Self {
            secs: d.as_secs(),
            nanos: d.subsec_nanos(),
        }
    }
}

impl From<Timestamp> for Duration {
    fn from(ts: Timestamp) -> Self {
        Duration::new(ts.secs, ts.nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp '{0}' (expected <seconds>.<nanoseconds>)")]
pub struct ParseTimestampError(String);

impl FromStr for Timestamp {
    type Err = ParseTimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimestampError(s.to_owned());
        let (secs, frac) = s.split_once('.').ok_or_else(err)?;
        if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let secs: u64 = secs.parse().map_err(|_| err())?;
        // Right-pad so "5.5" means half a second, not five nanoseconds.
        let padded = format!("{frac:0<9}");
        let nanos: u32 = padded.parse().map_err(|_| err())?;
        Ok(Self { secs, nanos })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_nanoseconds() {
        assert_eq!(Timestamp::new(12, 5).to_string(), "12.000000005");
        assert_eq!(Timestamp::new(0, 0).to_string(), "0.000000000");
        assert_eq!(
            Timestamp::new(1_700_000_000, 123_456_789).to_string(),
            "1700000000.123456789"
        );
    }

    #[test]
    fn new_normalizes_overflowing_nanos() {
        let ts = Timestamp::new(1, 2_500_000_000);
        assert_eq!(ts.secs(), 3);
        assert_eq!(ts.nanos(), 500_000_000);
    }

    #[test]
    fn parse_accepts_display_output() {
        let ts = Timestamp::new(1_700_000_000, 42);
        let parsed: Timestamp = ts.to_string().parse().unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn parse_short_fraction_is_right_padded() {
        let ts: Timestamp = "5.5".parse().unwrap();
        assert_eq!(ts, Timestamp::new(5, 500_000_000));
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "12", "12.", ".5", "a.5", "1.0000000001", "1.-5"] {
            assert!(bad.parse::<Timestamp>().is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn saturating_since_never_negative() {
        let a = Timestamp::new(10, 0);
        let b = Timestamp::new(10, 250);
        assert_eq!(b.saturating_since(a), Duration::from_nanos(250));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn now_is_after_2020() {
        assert!(Timestamp::now().secs() > 1_577_836_800);
    }
}
