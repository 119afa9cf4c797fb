use chrono::{DateTime, NaiveDateTime};

use crate::model::Ms;

const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";
const SECOND_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a `YYYY-MM-DDThh:mm` (or `...:ss`) date-time into Unix milliseconds.
/// Inputs carry no zone; they are read as UTC.
pub fn parse_instant(s: &str) -> Result<Ms, TimeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(TimeError::Empty);
    }
    let naive = NaiveDateTime::parse_from_str(s, MINUTE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, SECOND_FORMAT))
        .map_err(|e| TimeError::Malformed(format!("{s}: {e}")))?;
    Ok(naive.and_utc().timestamp_millis())
}

/// Render Unix milliseconds as `YYYY-MM-DDThh:mm:ss`.
pub fn format_instant(ms: Ms) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.naive_utc().format(SECOND_FORMAT).to_string(),
        None => ms.to_string(),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TimeError {
    Empty,
    Malformed(String),
}

impl std::fmt::Display for TimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeError::Empty => write!(f, "empty date-time"),
            TimeError::Malformed(s) => {
                write!(f, "expected YYYY-MM-DDThh:mm, got {s}")
            }
        }
    }
}

impl std::error::Error for TimeError {}
