use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;

use super::RepositoryError;

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .map(|raw| {
            NaiveDate::from_str(&raw).map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|raw| parse_decimal(column, raw)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_u8(column: &str, value: i64) -> Result<u8, RepositoryError> {
    u8::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected u8): {value}"))
    })
}

pub(crate) fn parse_label<T>(column: &str, value: String) -> Result<T, RepositoryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|error| {
        RepositoryError::Decode(format!("invalid value in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{encode_timestamp, parse_decimal, parse_timestamp, parse_u32};

    #[test]
    fn timestamps_encode_with_fixed_width() {
        let early = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("ts");
        let later = early + chrono::Duration::milliseconds(500);

        assert_eq!(encode_timestamp(&early), "2026-03-10T12:00:00.000000000Z");
        assert!(encode_timestamp(&early) < encode_timestamp(&later));
        assert_eq!(parse_timestamp("created_at", encode_timestamp(&later)).expect("parse"), later);
    }

    #[test]
    fn decode_errors_name_the_column() {
        let error = parse_decimal("price_estimate", "forty".to_owned()).expect_err("bad decimal");
        assert!(error.to_string().contains("price_estimate"));
        assert!(parse_u32("quantity", -1).is_err());
        assert_eq!(parse_decimal("price", "49.99".to_owned()).expect("ok"), Decimal::new(4999, 2));
    }
}
