/// Currency utility functions.
///
/// All monetary values in the database are stored in cents (minor units)
/// to avoid floating-point precision issues.

/// Convert a decimal amount to cents (multiply by 100)
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Convert cents back to a decimal amount (divide by 100)
pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Price of a post: hourly rate times booked hours.
pub fn job_total_cents(hourly_rate_cents: i64, total_hours: i32) -> i64 {
    hourly_rate_cents * total_hours as i64
}

/// Platform fee on a job total. `percent` is a whole-number percentage;
/// integer division truncates toward zero, so the platform never rounds
/// the fee up against the client.
pub fn platform_fee_cents(total_cents: i64, percent: i32) -> i64 {
    total_cents * percent as i64 / 100
}

/// Validate and parse an amount string to cents
pub fn parse_amount_to_cents(amount_str: &str) -> Result<i64, String> {
    amount_str
        .parse::<f64>()
        .map_err(|_| "Invalid amount format".to_string())
        .and_then(|amount| {
            if amount < 0.0 {
                Err("Amount cannot be negative".to_string())
            } else {
                Ok(to_cents(amount))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cents() {
        assert_eq!(to_cents(100.0), 10000);
        assert_eq!(to_cents(0.50), 50);
        assert_eq!(to_cents(123.45), 12345);
    }

    #[test]
    fn test_from_cents() {
        assert_eq!(from_cents(10000), 100.0);
        assert_eq!(from_cents(50), 0.50);
        assert_eq!(from_cents(12345), 123.45);
    }

    #[test]
    fn test_job_total() {
        // rate 100, 10 hours -> 1000
        assert_eq!(job_total_cents(100, 10), 1000);
        assert_eq!(job_total_cents(2500, 8), 20000);
    }

    #[test]
    fn test_platform_fee() {
        // 10% of 1000 -> 100
        assert_eq!(platform_fee_cents(1000, 10), 100);
        // truncation, never rounded up
        assert_eq!(platform_fee_cents(999, 10), 99);
        assert_eq!(platform_fee_cents(1000, 0), 0);
    }

    #[test]
    fn test_parse_amount_to_cents() {
        assert_eq!(parse_amount_to_cents("100.00"), Ok(10000));
        assert_eq!(parse_amount_to_cents("0.50"), Ok(50));
        assert_eq!(
            parse_amount_to_cents("-100"),
            Err("Amount cannot be negative".to_string())
        );
        assert_eq!(
            parse_amount_to_cents("abc"),
            Err("Invalid amount format".to_string())
        );
    }
}
