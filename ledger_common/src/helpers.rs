use std::{str::FromStr, time::Duration};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a number from an optional string value. Missing or unparseable values yield `None` so that callers can log
/// and fall back to their own default.
pub fn parse_number<T: FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().parse::<T>().ok())
}

/// Parse a duration given as a whole number of seconds.
pub fn parse_secs(value: Option<&str>) -> Option<Duration> {
    parse_number::<u64>(value).map(Duration::from_secs)
}

/// Parse a duration given as a whole number of milliseconds.
pub fn parse_millis(value: Option<&str>) -> Option<Duration> {
    parse_number::<u64>(value).map(Duration::from_millis)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boolean_flags() {
        assert!(parse_boolean_flag(Some("Yes".into()), false));
        assert!(!parse_boolean_flag(Some(" off ".into()), true));
        assert!(parse_boolean_flag(Some("maybe".into()), true));
        assert!(!parse_boolean_flag(None, false));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_secs(Some("30")), Some(Duration::from_secs(30)));
        assert_eq!(parse_millis(Some(" 250")), Some(Duration::from_millis(250)));
        assert_eq!(parse_secs(Some("-1")), None);
        assert_eq!(parse_secs(None), None);
        assert_eq!(parse_number::<usize>(Some("eight")), None);
    }
}
