//! Relative duration strings for client expiration policies.

use chrono::Duration;

/// Parse a relative duration of the form "N unit", e.g. "5 seconds" or "1 day".
///
/// Units: seconds, minutes, hours, days, weeks (singular or plural).
/// The amount must be a positive integer.
pub fn parse_relative_duration(input: &str) -> Result<Duration, anyhow::Error> {
    let mut parts = input.split_whitespace();

    let amount: i64 = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty duration string"))?
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid duration amount in '{}'", input))?;

    if amount <= 0 {
        return Err(anyhow::anyhow!("Duration amount must be positive: '{}'", input));
    }

    let unit = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Missing duration unit in '{}'", input))?;

    if parts.next().is_some() {
        return Err(anyhow::anyhow!("Trailing content in duration '{}'", input));
    }

    match unit {
        "second" | "seconds" => Ok(Duration::seconds(amount)),
        "minute" | "minutes" => Ok(Duration::minutes(amount)),
        "hour" | "hours" => Ok(Duration::hours(amount)),
        "day" | "days" => Ok(Duration::days(amount)),
        "week" | "weeks" => Ok(Duration::weeks(amount)),
        other => Err(anyhow::anyhow!("Unknown duration unit '{}'", other)),
    }
}
