use thiserror::Error;

/// Money is represented as integer cents to avoid floating-point precision issues.
/// 1 unit = 100 cents, so 500.00 = 50000 cents.
pub type Cents = i64;

/// Format cents as a plain decimal string.
/// Example: 50000 -> "500.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a user-supplied amount into cents.
///
/// Amounts are never negative here: withdrawals, earnings and prices are all
/// stated as positive quantities, so a leading `-` is rejected rather than
/// carried through. At most two decimal places are accepted.
///
/// Example: "500" -> 50000, "12.5" -> 1250, ".75" -> 75
pub fn parse_cents(input: &str) -> Result<Cents, ParseAmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseAmountError::Empty);
    }
    if input.starts_with('-') {
        return Err(ParseAmountError::Negative);
    }

    let (units_str, decimal_str) = match input.split_once('.') {
        Some((units, decimals)) => (units, decimals),
        None => (input, ""),
    };

    if decimal_str.contains('.') {
        return Err(ParseAmountError::InvalidFormat(input.to_string()));
    }
    if decimal_str.len() > 2 {
        return Err(ParseAmountError::TooPrecise(input.to_string()));
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !decimal_str.chars().all(|c| c.is_ascii_digit())
        || (units_str.is_empty() && decimal_str.is_empty())
    {
        return Err(ParseAmountError::InvalidFormat(input.to_string()));
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseAmountError::InvalidFormat(input.to_string()))?
    };

    // "5" after the point means fifty cents
    let decimal_cents: i64 = match decimal_str.len() {
        0 => 0,
        1 => decimal_str.parse::<i64>().unwrap_or(0) * 10,
        _ => decimal_str.parse().unwrap_or(0),
    };

    units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal_cents))
        .ok_or_else(|| ParseAmountError::InvalidFormat(input.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must not be negative")]
    Negative,

    #[error("amount '{0}' has more than two decimal places")]
    TooPrecise(String),

    #[error("invalid amount format: '{0}' (expected e.g. '500' or '500.00')")]
    InvalidFormat(String),
}
