//! Timeout Module
//!
//! Translates caller timeouts into memcached `exptime` values.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Longest relative exptime memcached accepts; larger values are unix times.
pub const MAX_RELATIVE_EXPTIME: i64 = 60 * 60 * 24 * 30;

/// Smallest value memcached reads as a unix time; that instant is long past,
/// so the entry is expired on arrival.
pub const EXPIRED: u32 = MAX_RELATIVE_EXPTIME as u32 + 1;

// == Timeout ==
/// How long an entry should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// The backend's configured default
    #[default]
    Default,
    /// Never expire
    Never,
    /// Relative seconds; 0 means never, negative means already expired
    Seconds(i64),
    /// Absolute expiration time
    At(DateTime<Utc>),
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::Seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
    }
}

impl From<DateTime<Utc>> for Timeout {
    fn from(at: DateTime<Utc>) -> Self {
        Timeout::At(at)
    }
}

impl Timeout {
    /// Resolves to an exptime relative to `now`.
    ///
    /// `default_timeout` is the configured default in seconds, None = never.
    pub fn to_exptime(self, default_timeout: Option<u64>, now: DateTime<Utc>) -> u32 {
        match self {
            Timeout::Never => 0,
            Timeout::Default => match default_timeout {
                Some(secs) => Timeout::from(Duration::from_secs(secs)).to_exptime(None, now),
                None => 0,
            },
            Timeout::Seconds(0) => 0,
            Timeout::Seconds(secs) if secs < 0 => EXPIRED,
            Timeout::Seconds(secs) if secs <= MAX_RELATIVE_EXPTIME => secs as u32,
            Timeout::Seconds(secs) => absolute(now.timestamp().saturating_add(secs)),
            Timeout::At(at) if at <= now => EXPIRED,
            Timeout::At(at) => absolute(at.timestamp()),
        }
    }
}

fn absolute(unix: i64) -> u32 {
    u32::try_from(unix).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_never_and_zero_are_infinite() {
        assert_eq!(Timeout::Never.to_exptime(Some(300), now()), 0);
        assert_eq!(Timeout::Seconds(0).to_exptime(Some(300), now()), 0);
    }

    #[test]
    fn test_default_uses_configured_value() {
        assert_eq!(Timeout::Default.to_exptime(Some(300), now()), 300);
        assert_eq!(Timeout::Default.to_exptime(None, now()), 0);
    }

    #[test]
    fn test_negative_is_expired() {
        assert_eq!(Timeout::Seconds(-5).to_exptime(None, now()), EXPIRED);
    }

    #[test]
    fn test_relative_up_to_thirty_days() {
        assert_eq!(Timeout::Seconds(60).to_exptime(None, now()), 60);
        assert_eq!(
            Timeout::Seconds(MAX_RELATIVE_EXPTIME).to_exptime(None, now()),
            MAX_RELATIVE_EXPTIME as u32
        );
    }

    #[test]
    fn test_long_timeout_becomes_absolute() {
        let secs = MAX_RELATIVE_EXPTIME + 1;
        assert_eq!(
            Timeout::Seconds(secs).to_exptime(None, now()),
            (1_700_000_000 + secs) as u32
        );
    }

    #[test]
    fn test_absolute_time() {
        let at = Utc.timestamp_opt(1_700_000_600, 0).unwrap();
        assert_eq!(Timeout::At(at).to_exptime(None, now()), 1_700_000_600);

        let past = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        assert_eq!(Timeout::At(past).to_exptime(None, now()), EXPIRED);
        assert_eq!(Timeout::At(now()).to_exptime(None, now()), EXPIRED);
    }

    #[test]
    fn test_from_duration() {
        assert_eq!(Timeout::from(Duration::from_secs(90)), Timeout::Seconds(90));
    }
}
