// src/duration.rs

//! Duration strings used in the config file (`"250ms"`, `"10s"`, `"1m"`).
//!
//! Values are kept as signed milliseconds so that a negative timeout survives
//! parsing and can be rejected by command validation with a precise error,
//! instead of disappearing into a TOML type error.

use std::time::Duration;

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`,
/// optionally prefixed with `-`.
///
/// `"0"` and `"none"` both parse to `0`, which callers treat as "no limit".
pub fn parse_duration_ms(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }
    if s.eq_ignore_ascii_case("none") || s == "0" {
        return Ok(0);
    }

    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest.trim_start()),
        None => (1i64, s),
    };

    // Find the boundary between digits and suffix.
    let idx = rest
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = rest.split_at(idx);
    let value: i64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    let factor: i64 = match unit.as_str() {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60 * 1_000,
        "h" => 60 * 60 * 1_000,
        _ => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };

    value
        .checked_mul(factor)
        .map(|ms| sign * ms)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

/// Parse a duration that must not be negative.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let ms = parse_duration_ms(s)?;
    u64::try_from(ms)
        .map(Duration::from_millis)
        .map_err(|_| format!("duration '{s}' must not be negative"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_duration_ms("250ms"), Ok(250));
        assert_eq!(parse_duration_ms("3s"), Ok(3_000));
        assert_eq!(parse_duration_ms("2m"), Ok(120_000));
        assert_eq!(parse_duration_ms("1h"), Ok(3_600_000));
    }

    #[test]
    fn zero_and_none_mean_unlimited() {
        assert_eq!(parse_duration_ms("0"), Ok(0));
        assert_eq!(parse_duration_ms("none"), Ok(0));
        assert_eq!(parse_duration_ms("0s"), Ok(0));
    }

    #[test]
    fn keeps_negative_values() {
        assert_eq!(parse_duration_ms("-5s"), Ok(-5_000));
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("10").is_err());
        assert!(parse_duration_ms("10d").is_err());
        assert!(parse_duration_ms("s").is_err());
    }
}
