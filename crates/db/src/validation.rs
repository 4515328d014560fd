//! Input validation for user-supplied card, column and label fields.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Invalid priority: {0}. Valid values: 1 (High), 2 (Medium), 3 (Low)")]
    InvalidPriority(i64),

    #[error("Invalid color: '{0}'. Expected a hex color such as #3b82f6")]
    InvalidColor(String),

    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid WIP limit: {0}. Must be at least 1")]
    InvalidWipLimit(i64),
}

/// Valid priority codes (High, Medium, Low).
pub const VALID_PRIORITY_CODES: &[i64] = &[1, 2, 3];

/// Trim a card title, rejecting blank input.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyTitle)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trim a board, column, label, checklist or template name, rejecting blank input.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyName)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Validate a priority code
///
/// # Examples
/// ```
/// use db::validation::validate_priority_code;
///
/// assert!(validate_priority_code(2).is_ok());
/// assert!(validate_priority_code(0).is_err());
/// ```
pub fn validate_priority_code(code: i64) -> Result<(), ValidationError> {
    if VALID_PRIORITY_CODES.contains(&code) {
        Ok(())
    } else {
        Err(ValidationError::InvalidPriority(code))
    }
}

/// Accept `#rgb` or `#rrggbb` hex colours.
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let valid = color
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidColor(color.to_string()))
    }
}

pub fn validate_wip_limit(limit: Option<i64>) -> Result<(), ValidationError> {
    match limit {
        Some(n) if n < 1 => Err(ValidationError::InvalidWipLimit(n)),
        _ => Ok(()),
    }
}

/// Parse a `YYYY-MM-DD` date. Blank input means "no date".
///
/// # Examples
/// ```
/// use db::validation::parse_date;
///
/// assert!(parse_date("2025-03-01").unwrap().is_some());
/// assert!(parse_date("  ").unwrap().is_none());
/// assert!(parse_date("03/01/2025").is_err());
/// ```
pub fn parse_date(input: &str) -> Result<Option<NaiveDate>, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ValidationError::InvalidDate(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Write plan ").unwrap(), "Write plan");
        assert_eq!(validate_title(""), Err(ValidationError::EmptyTitle));
        assert_eq!(validate_title(" \t\n"), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_validate_priority_code() {
        for code in VALID_PRIORITY_CODES {
            assert!(validate_priority_code(*code).is_ok());
        }
        assert_eq!(
            validate_priority_code(4),
            Err(ValidationError::InvalidPriority(4))
        );
        assert!(validate_priority_code(-1).is_err());
    }

    #[test]
    fn test_validate_color() {
        assert!(validate_color("#6b7280").is_ok());
        assert!(validate_color("#FFF").is_ok());
        assert!(validate_color("6b7280").is_err());
        assert!(validate_color("#6b72").is_err());
        assert!(validate_color("#zzzzzz").is_err());
    }

    #[test]
    fn test_validate_wip_limit() {
        assert!(validate_wip_limit(None).is_ok());
        assert!(validate_wip_limit(Some(3)).is_ok());
        assert_eq!(
            validate_wip_limit(Some(0)),
            Err(ValidationError::InvalidWipLimit(0))
        );
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2025-02-28").unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28)
        );
        assert_eq!(parse_date("").unwrap(), None);
        assert_eq!(
            parse_date("2025-02-30"),
            Err(ValidationError::InvalidDate("2025-02-30".to_string()))
        );
    }
}
