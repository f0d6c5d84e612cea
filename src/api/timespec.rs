//! Graphite time specs
//!
//! Accepts what Graphite sends as `from` / `until`:
//!
//! ```text
//! now            current time
//! -2h, now-2h    relative to now (also `+`)
//! -10min, -3days long unit names
//! 1700000000     unix seconds
//! ```
//!
//! Units: `s`, `min`, `h`, `d`, `w`, `mon` (30 days), `y` (365 days).

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{alpha1, char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, value},
    sequence::{preceded, tuple},
    IResult,
};

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Parse `spec` into unix milliseconds, resolving relative specs against `now_ms`
pub fn parse_time(spec: &str, now_ms: i64) -> Result<i64, String> {
    let spec = spec.trim();
    match all_consuming(alt((absolute, relative)))(spec) {
        Ok((_, Time::Absolute(secs))) => secs
            .checked_mul(SECOND_MS)
            .ok_or_else(|| format!("time '{}' out of range", spec)),
        Ok((_, Time::Relative(offset))) => now_ms
            .checked_add(offset)
            .ok_or_else(|| format!("time '{}' out of range", spec)),
        Err(_) => Err(format!("cannot parse time '{}'", spec)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Time {
    /// Unix seconds
    Absolute(i64),
    /// Offset from now in ms
    Relative(i64),
}

fn absolute(input: &str) -> IResult<&str, Time> {
    map(map_res(digit1, str::parse::<i64>), Time::Absolute)(input)
}

fn relative(input: &str) -> IResult<&str, Time> {
    let (input, now) = opt(tag_no_case("now"))(input)?;
    let (input, offset) = opt(preceded(multispace0, offset))(input)?;

    match (now, offset) {
        (None, None) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
        (_, offset) => Ok((input, Time::Relative(offset.unwrap_or(0)))),
    }
}

fn offset(input: &str) -> IResult<&str, i64> {
    let (input, (sign, count, unit)) = tuple((
        alt((value(-1i64, char('-')), value(1i64, char('+')))),
        map_res(digit1, str::parse::<i64>),
        map_res(alpha1, unit_millis),
    ))(input)?;
    Ok((input, sign * count.saturating_mul(unit)))
}

fn unit_millis(unit: &str) -> Result<i64, ()> {
    let unit = unit.to_ascii_lowercase();
    let millis = if unit.starts_with("mon") {
        30 * DAY_MS
    } else if unit.starts_with("mi") {
        MINUTE_MS
    } else if unit.starts_with('s') {
        SECOND_MS
    } else if unit.starts_with('h') {
        HOUR_MS
    } else if unit.starts_with('d') {
        DAY_MS
    } else if unit.starts_with('w') {
        7 * DAY_MS
    } else if unit.starts_with('y') {
        365 * DAY_MS
    } else {
        return Err(());
    };
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_now_and_relative() {
        assert_eq!(parse_time("now", NOW), Ok(NOW));
        assert_eq!(parse_time("-2h", NOW), Ok(NOW - 2 * HOUR_MS));
        assert_eq!(parse_time("now-1d", NOW), Ok(NOW - DAY_MS));
        assert_eq!(parse_time("now+30s", NOW), Ok(NOW + 30 * SECOND_MS));
        assert_eq!(parse_time("-10min", NOW), Ok(NOW - 10 * MINUTE_MS));
        assert_eq!(parse_time("-3days", NOW), Ok(NOW - 3 * DAY_MS));
        assert_eq!(parse_time("-1mon", NOW), Ok(NOW - 30 * DAY_MS));
        assert_eq!(parse_time("-1w", NOW), Ok(NOW - 7 * DAY_MS));
    }

    #[test]
    fn test_unix_seconds() {
        assert_eq!(parse_time("1700000000", NOW), Ok(1_700_000_000_000));
    }

    #[test]
    fn test_garbage_rejected() {
        for spec in ["", "yesterday", "-2", "now-2parsecs", "12abc"] {
            assert!(parse_time(spec, NOW).is_err(), "accepted {:?}", spec);
        }
    }
}
