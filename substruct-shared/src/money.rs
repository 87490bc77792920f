//! Integer-cent money helpers. Every amount in the workspace is stored in cents.

pub type Cents = i64;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Rounds a fractional cent value half away from zero.
pub fn round_cents(value: f64) -> Cents {
    value.round() as Cents
}

/// `percent` percent of `amount`, rounded to the cent.
pub fn percent_of(amount: Cents, percent: f64) -> Cents {
    round_cents(amount as f64 * percent / 100.0)
}

/// Formats cents as a plain decimal string ("21.75", "-0.50").
pub fn format_cents(amount: Cents) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parses a decimal amount such as PayPal's `mc_gross` into cents.
pub fn parse_cents(raw: &str) -> Result<Cents, MoneyError> {
    let trimmed = raw.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| MoneyError::InvalidAmount(raw.to_string()))?;

    if !value.is_finite() {
        return Err(MoneyError::InvalidAmount(raw.to_string()));
    }

    Ok(round_cents(value * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of_rounds_half_away_from_zero() {
        assert_eq!(percent_of(1999, 10.0), 200);
        assert_eq!(percent_of(1005, 50.0), 503);
        assert_eq!(percent_of(0, 25.0), 0);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(2175), "21.75");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-50), "-0.50");
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("21.75"), Ok(2175));
        assert_eq!(parse_cents(" 2.1 "), Ok(210));
        assert_eq!(parse_cents("19.999"), Ok(2000));
        assert!(parse_cents("abc").is_err());
        assert!(parse_cents("inf").is_err());
    }
}
