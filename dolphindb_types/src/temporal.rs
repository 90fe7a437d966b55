//! Integer encodings of the server's temporal types.
//!
//! Every temporal type is stored as a count of some unit, either since the Unix epoch (types
//! that carry a date) or since midnight (time-of-day types). Truncation always floors toward
//! negative infinity, so `1969-12-31T23:59:59.5` is day `-1`, not day `0`.
//!
//! `MONTH` is the odd one out: it counts months since year zero, `year * 12 + month - 1`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::DataType;

const SECONDS_PER_DAY: i64 = 86_400;
const MILLIS_PER_SECOND: i64 = 1_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Encode `value` as the integer the server stores for `data_type`.
///
/// Returns `None` when `data_type` is not temporal or when the encoded value does not fit the
/// type's storage (32-bit types also reserve `i32::MIN` as their null).
pub fn encode(data_type: DataType, value: &NaiveDateTime) -> Option<i64> {
    let utc = value.and_utc();
    let seconds = utc.timestamp();
    let seconds_of_day = i64::from(value.num_seconds_from_midnight());
    // leap seconds are reported as nanosecond >= 1e9
    let nanos = i64::from(value.nanosecond().min(999_999_999));

    let encoded = match data_type {
        DataType::Date => seconds.div_euclid(SECONDS_PER_DAY),
        DataType::Month => i64::from(value.year()) * 12 + i64::from(value.month0()),
        DataType::Time => seconds_of_day * MILLIS_PER_SECOND + nanos / 1_000_000,
        DataType::Minute => seconds_of_day / 60,
        DataType::Second => seconds_of_day,
        DataType::Datetime => seconds,
        DataType::DateHour => seconds.div_euclid(3_600),
        DataType::DateMinute => seconds.div_euclid(60),
        DataType::Timestamp => utc.timestamp_millis(),
        DataType::NanoTime => seconds_of_day * NANOS_PER_SECOND + nanos,
        DataType::NanoTimestamp => utc.timestamp_nanos_opt()?,
        _ => return None,
    };

    if is_wide(data_type) {
        (encoded != i64::MIN).then_some(encoded)
    } else {
        let narrow = i32::try_from(encoded).ok()?;
        (narrow != i32::MIN).then_some(encoded)
    }
}

/// Inverse of [`encode`]. Time-of-day types decode onto `1970-01-01`.
pub fn decode(data_type: DataType, encoded: i64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let on_epoch = |seconds: i64, nanos: i64| -> Option<NaiveDateTime> {
        if !(0..SECONDS_PER_DAY).contains(&seconds) {
            return None;
        }
        let time = NaiveTime::from_num_seconds_from_midnight_opt(
            u32::try_from(seconds).ok()?,
            u32::try_from(nanos).ok()?,
        )?;
        Some(epoch.and_time(time))
    };

    match data_type {
        DataType::Date => {
            DateTime::from_timestamp(encoded.checked_mul(SECONDS_PER_DAY)?, 0).map(|d| d.naive_utc())
        }
        DataType::Month => {
            let year = i32::try_from(encoded.div_euclid(12)).ok()?;
            let month = u32::try_from(encoded.rem_euclid(12)).ok()? + 1;
            NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_time(NaiveTime::MIN))
        }
        DataType::Time => on_epoch(
            encoded.div_euclid(MILLIS_PER_SECOND),
            encoded.rem_euclid(MILLIS_PER_SECOND) * 1_000_000,
        ),
        DataType::Minute => on_epoch(encoded.checked_mul(60)?, 0),
        DataType::Second => on_epoch(encoded, 0),
        DataType::Datetime => DateTime::from_timestamp(encoded, 0).map(|d| d.naive_utc()),
        DataType::DateHour => {
            DateTime::from_timestamp(encoded.checked_mul(3_600)?, 0).map(|d| d.naive_utc())
        }
        DataType::DateMinute => {
            DateTime::from_timestamp(encoded.checked_mul(60)?, 0).map(|d| d.naive_utc())
        }
        DataType::Timestamp => DateTime::from_timestamp_millis(encoded).map(|d| d.naive_utc()),
        DataType::NanoTime => on_epoch(
            encoded.div_euclid(NANOS_PER_SECOND),
            encoded.rem_euclid(NANOS_PER_SECOND),
        ),
        DataType::NanoTimestamp => Some(DateTime::from_timestamp_nanos(encoded).naive_utc()),
        _ => None,
    }
}

/// Re-encode a value of temporal type `from` as temporal type `to`.
///
/// A time-of-day value carries no date, so it cannot become a date-bearing type.
pub fn cast(from: DataType, to: DataType, encoded: i64) -> Option<i64> {
    if from == to {
        return from.is_temporal().then_some(encoded);
    }
    if is_time_of_day(from) && !is_time_of_day(to) {
        return None;
    }
    encode(to, &decode(from, encoded)?)
}

/// Whether the type counts from midnight rather than from the epoch.
pub fn is_time_of_day(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::Time | DataType::Minute | DataType::Second | DataType::NanoTime
    )
}

fn is_wide(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp | DataType::NanoTime | DataType::NanoTimestamp
    )
}
