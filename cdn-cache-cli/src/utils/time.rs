use std::time::Duration;

use crate::error::AppError;

/// Parse a duration with an optional unit (s, m, h); bare numbers are seconds
pub fn parse_time(time_str: &str) -> Result<Duration, AppError> {
    let time_str = time_str.trim();
    if time_str.is_empty() {
        return Err(AppError::ParseError("Invalid format: empty string".to_string()));
    }

    let split_index = time_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(time_str.len());

    let value = time_str[..split_index]
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid number: '{time_str}'")))?;

    let seconds = match time_str[split_index..].trim().to_lowercase().as_str() {
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        unit => return Err(AppError::ParseError(format!("Invalid unit: '{unit}'"))),
    };

    Duration::try_from_secs_f64(seconds)
        .map_err(|e| AppError::ParseError(format!("Invalid duration '{time_str}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_units() {
        assert_eq!(parse_time("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_time("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_time("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_time(" 1.5h ").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_time("2 M").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time("").is_err());
        assert!(parse_time("abc").is_err());
        assert!(parse_time("10d").is_err());
        assert!(parse_time("1.2.3s").is_err());
    }
}
