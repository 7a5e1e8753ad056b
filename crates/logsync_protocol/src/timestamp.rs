//! Sortable hybrid logical timestamps.
//!
//! ## Text Form
//!
//! ```text
//! 2024-03-01T12:30:45.123Z-002A-8f3b2c1d00e4a7b9
//! └──────── millis ──────┘ └ctr┘ └──── node ─────┘
//! ```
//!
//! Every field is fixed width, so comparing two encodings byte by byte
//! orders them by `(millis, counter, node)`, the same order as [`Ord`] on
//! [`Timestamp`].

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::NodeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_DAY: u64 = 24 * 60 * MILLIS_PER_MINUTE;

/// A totally ordered event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    millis: u64,
    counter: u16,
    node: NodeId,
}

impl Timestamp {
    /// Length of the text form in bytes.
    pub const ENCODED_LEN: usize = 46;

    /// Last representable instant.
    ///
    /// The Merkle digest keys timestamps by minute in 16 base-3 digits, so
    /// the minute index must stay below `3^16`.
    pub const MAX_MILLIS: u64 = 43_046_721 * MILLIS_PER_MINUTE - 1;

    /// The epoch with counter 0 and the zero node; sorts before everything.
    pub const MIN: Timestamp = Timestamp {
        millis: 0,
        counter: 0,
        node: NodeId::ZERO,
    };

    /// Creates a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TimeOutOfRange`] if `millis` exceeds
    /// [`Timestamp::MAX_MILLIS`].
    pub fn new(millis: u64, counter: u16, node: NodeId) -> ProtocolResult<Self> {
        if millis > Self::MAX_MILLIS {
            return Err(ProtocolError::TimeOutOfRange { millis });
        }
        Ok(Self {
            millis,
            counter,
            node,
        })
    }

    /// The smallest timestamp within the given millisecond.
    ///
    /// Uses counter 0 and the reserved zero node, so it sorts before every
    /// timestamp a real node can produce for that millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TimeOutOfRange`] if `millis` exceeds
    /// [`Timestamp::MAX_MILLIS`].
    pub fn lower_bound(millis: u64) -> ProtocolResult<Self> {
        Self::new(millis, 0, NodeId::ZERO)
    }

    /// Lower bound of a digest bucket, clamped into range.
    pub(crate) fn minute_floor(minute: u64) -> Self {
        Self {
            millis: minute.saturating_mul(MILLIS_PER_MINUTE).min(Self::MAX_MILLIS),
            counter: 0,
            node: NodeId::ZERO,
        }
    }

    /// Wall-clock component in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn millis(&self) -> u64 {
        self.millis
    }

    /// Per-millisecond counter.
    #[must_use]
    pub const fn counter(&self) -> u16 {
        self.counter
    }

    /// Originating node.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Minute index since the epoch, the digest's bucket key.
    #[must_use]
    pub const fn minute(&self) -> u64 {
        self.millis / MILLIS_PER_MINUTE
    }

    /// Encodes to the fixed-width text form.
    #[must_use]
    pub fn encode(&self) -> String {
        let days = self.millis / MILLIS_PER_DAY;
        let in_day = self.millis % MILLIS_PER_DAY;
        let (year, month, day) = civil_from_days(days);
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z-{:04X}-{}",
            year,
            month,
            day,
            in_day / 3_600_000,
            in_day / MILLIS_PER_MINUTE % 60,
            in_day / MILLIS_PER_SECOND % 60,
            in_day % MILLIS_PER_SECOND,
            self.counter,
            self.node
        )
    }

    /// Decodes the text form produced by [`Timestamp::encode`].
    ///
    /// Decoding is strict: the input must be exactly the canonical encoding
    /// of the value it describes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedTimestamp`] on wrong length, wrong
    /// separators, invalid characters, impossible calendar dates, instants
    /// before the epoch or past [`Timestamp::MAX_MILLIS`].
    pub fn decode(input: &str) -> ProtocolResult<Self> {
        let bad = |reason: &str| ProtocolError::malformed_timestamp(input, reason);
        let bytes = input.as_bytes();

        if bytes.len() != Self::ENCODED_LEN {
            return Err(bad("wrong length"));
        }
        if !input.is_ascii() {
            return Err(bad("non-ASCII characters"));
        }
        for (pos, expected) in [
            (4, b'-'),
            (7, b'-'),
            (10, b'T'),
            (13, b':'),
            (16, b':'),
            (19, b'.'),
            (23, b'Z'),
            (24, b'-'),
            (29, b'-'),
        ] {
            if bytes[pos] != expected {
                return Err(bad("misplaced separator"));
            }
        }

        let year = parse_decimal(&bytes[0..4]).ok_or_else(|| bad("invalid year"))?;
        let month = parse_decimal(&bytes[5..7]).ok_or_else(|| bad("invalid month"))?;
        let day = parse_decimal(&bytes[8..10]).ok_or_else(|| bad("invalid day"))?;
        let hour = parse_decimal(&bytes[11..13]).ok_or_else(|| bad("invalid hour"))?;
        let minute = parse_decimal(&bytes[14..16]).ok_or_else(|| bad("invalid minute"))?;
        let second = parse_decimal(&bytes[17..19]).ok_or_else(|| bad("invalid second"))?;
        let milli = parse_decimal(&bytes[20..23]).ok_or_else(|| bad("invalid millisecond"))?;

        if year < 1970 {
            return Err(bad("before the Unix epoch"));
        }
        if !(1..=12).contains(&month) || !(1..=days_in_month(year, month)).contains(&day) {
            return Err(bad("no such calendar date"));
        }
        if hour > 23 || minute > 59 || second > 59 {
            return Err(bad("invalid time of day"));
        }

        let counter_text = &input[25..29];
        if !counter_text
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
        {
            return Err(bad("counter must be 4 uppercase hex digits"));
        }
        let counter = u16::from_str_radix(counter_text, 16).map_err(|_| bad("invalid counter"))?;
        let node = NodeId::parse(&input[30..]).map_err(|_| bad("invalid node id"))?;

        let millis = days_from_civil(year, month, day) * MILLIS_PER_DAY
            + hour * 3_600_000
            + minute * MILLIS_PER_MINUTE
            + second * MILLIS_PER_SECOND
            + milli;

        Self::new(millis, counter, node).map_err(|_| bad("outside the supported range"))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Timestamp {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(serde::de::Error::custom)
    }
}

fn parse_decimal(digits: &[u8]) -> Option<u64> {
    digits.iter().try_fold(0u64, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u64::from(b - b'0'))
    })
}

fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u64, month: u64) -> u64 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date on or after the epoch.
fn days_from_civil(year: u64, month: u64, day: u64) -> u64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: u64, counter: u16, node: u64) -> Timestamp {
        Timestamp::new(millis, counter, NodeId::new(node)).unwrap()
    }

    #[test]
    fn encode_epoch() {
        assert_eq!(
            ts(0, 0, 0).encode(),
            "1970-01-01T00:00:00.000Z-0000-0000000000000000"
        );
    }

    #[test]
    fn encode_known_instant() {
        // 2024-02-29T13:14:15.016Z
        let t = ts(1_709_212_455_016, 0x2a, 0x8f3b_2c1d_00e4_a7b9);
        assert_eq!(t.encode(), "2024-02-29T13:14:15.016Z-002A-8f3b2c1d00e4a7b9");
        assert_eq!(t.encode().len(), Timestamp::ENCODED_LEN);
    }

    #[test]
    fn decode_roundtrip() {
        for millis in [0, 1, 59_999, 951_782_400_000, 1_709_212_455_016, Timestamp::MAX_MILLIS] {
            let t = ts(millis, 0xbeef, 0x0123_4567_89ab_cdef);
            assert_eq!(Timestamp::decode(&t.encode()).unwrap(), t);
        }
    }

    #[test]
    fn string_order_matches_value_order() {
        let mut values = vec![
            ts(1_000, 0, 2),
            ts(999, 0xffff, 9),
            ts(1_000, 1, 1),
            ts(1_000, 0, 1),
            ts(1_709_212_455_016, 0xa, 3),
            ts(1_709_212_455_016, 0x9, 3),
        ];
        let mut encoded: Vec<String> = values.iter().map(Timestamp::encode).collect();
        values.sort();
        encoded.sort();
        let sorted_encoded: Vec<String> = values.iter().map(Timestamp::encode).collect();
        assert_eq!(encoded, sorted_encoded);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(Timestamp::decode("").is_err());
        assert!(Timestamp::decode("1970-01-01T00:00:00.000Z-0000-000000000000000").is_err());
    }

    #[test]
    fn decode_rejects_invalid_characters() {
        // lowercase counter
        assert!(Timestamp::decode("1970-01-01T00:00:00.000Z-00af-0000000000000000").is_err());
        // uppercase node
        assert!(Timestamp::decode("1970-01-01T00:00:00.000Z-0000-00000000000000AF").is_err());
        // letter in date
        assert!(Timestamp::decode("197a-01-01T00:00:00.000Z-0000-0000000000000000").is_err());
        // wrong separator
        assert!(Timestamp::decode("1970-01-01 00:00:00.000Z-0000-0000000000000000").is_err());
        // multi-byte character with the right byte length
        assert!(Timestamp::decode("1970-01-01T00:00:00.000Z-00é-0000000000000000").is_err());
    }

    #[test]
    fn decode_rejects_impossible_dates() {
        assert!(Timestamp::decode("2023-02-29T00:00:00.000Z-0000-0000000000000000").is_err());
        assert!(Timestamp::decode("2023-13-01T00:00:00.000Z-0000-0000000000000000").is_err());
        assert!(Timestamp::decode("2023-01-01T24:00:00.000Z-0000-0000000000000000").is_err());
        assert!(Timestamp::decode("1969-12-31T23:59:59.999Z-0000-0000000000000000").is_err());
        assert!(Timestamp::decode("2024-02-29T00:00:00.000Z-0000-0000000000000000").is_ok());
    }

    #[test]
    fn decode_rejects_out_of_range() {
        assert!(Timestamp::decode("2099-01-01T00:00:00.000Z-0000-0000000000000000").is_err());
        assert!(Timestamp::new(Timestamp::MAX_MILLIS + 1, 0, NodeId::ZERO).is_err());
    }

    #[test]
    fn lower_bound_sorts_first() {
        let bound = Timestamp::lower_bound(5_000).unwrap();
        assert!(bound < ts(5_000, 0, 1));
        assert!(bound > ts(4_999, 0xffff, u64::MAX));
    }

    #[test]
    fn civil_roundtrip() {
        for days in [0, 59, 60, 365, 10_957, 11_016, 19_782, 29_896] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days);
        }
    }
}
