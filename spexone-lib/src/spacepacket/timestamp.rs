use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Secondary header time stamp.
///
/// `seconds` counts TAI seconds since 1970-01-01, so it runs ahead of UTC by the number
/// of leap seconds. `subseconds` is in units of 2^-16 seconds.
#[derive(
    Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Timestamp {
    pub seconds: u32,
    pub subseconds: u16,
}

impl Timestamp {
    /// Size of an encoded ``Timestamp``
    pub const LEN: usize = 6;

    /// Decode from bytes. Returns `None` if there are fewer than [Timestamp::LEN] bytes.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf = buf.get(..Self::LEN)?;
        Some(Timestamp {
            seconds: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            subseconds: u16::from_be_bytes([buf[4], buf[5]]),
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let [a, b, c, d] = self.seconds.to_be_bytes();
        let [e, f] = self.subseconds.to_be_bytes();
        [a, b, c, d, e, f]
    }

    /// Fractional part in seconds.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        f64::from(self.subseconds) / 65536.0
    }

    /// Convert to UTC by removing `leap_seconds` from the TAI seconds.
    #[must_use]
    pub fn to_utc(&self, leap_seconds: i64) -> DateTime<Utc> {
        let nanos = (i64::from(self.subseconds) * 1_000_000_000) >> 16;
        DateTime::UNIX_EPOCH
            + TimeDelta::seconds(i64::from(self.seconds) - leap_seconds)
            + TimeDelta::nanoseconds(nanos)
    }
}

/// Calendar form of the TAI time, without leap second correction, e.g.,
/// `2023-03-01T00:00:27.250000 TAI`.
impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} TAI", self.to_utc(0).format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}
