//! # Query Validation
//!
//! Checks applied to a query before any stage runs.

pub const MIN_QUERY_CHARS: usize = 10;
pub const MAX_QUERY_CHARS: usize = 5000;

/// Substrings refused outright, matched case-insensitively
const BLOCKED_KEYWORDS: [&str; 3] = ["script", "eval", "exec"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query cannot be empty or only whitespace")]
    Empty,
    #[error("query is {len} characters, minimum is {}", MIN_QUERY_CHARS)]
    TooShort { len: usize },
    #[error("query is {len} characters, maximum is {}", MAX_QUERY_CHARS)]
    TooLong { len: usize },
    #[error("query contains potentially unsafe content (`{0}`)")]
    Unsafe(&'static str),
}

/// Trim and check a raw query, returning the cleaned text
pub fn validate_query(raw: &str) -> Result<String, QueryError> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(QueryError::Empty);
    }

    let len = query.chars().count();
    if len < MIN_QUERY_CHARS {
        return Err(QueryError::TooShort { len });
    }
    if len > MAX_QUERY_CHARS {
        return Err(QueryError::TooLong { len });
    }

    let lower = query.to_lowercase();
    if let Some(keyword) = BLOCKED_KEYWORDS.iter().find(|k| lower.contains(*k)) {
        return Err(QueryError::Unsafe(keyword));
    }

    Ok(query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_query_is_trimmed() {
        let query = validate_query("   Design a URL shortener  \n").unwrap();
        assert_eq!(query, "Design a URL shortener");
    }

    #[test]
    fn test_length_bounds() {
        assert_eq!(validate_query("   "), Err(QueryError::Empty));
        assert_eq!(
            validate_query("too short"),
            Err(QueryError::TooShort { len: 9 })
        );
        assert!(validate_query("exactly10!").is_ok());

        let long = "a".repeat(MAX_QUERY_CHARS + 1);
        assert_eq!(
            validate_query(&long),
            Err(QueryError::TooLong {
                len: MAX_QUERY_CHARS + 1
            })
        );
        assert!(validate_query(&"a".repeat(MAX_QUERY_CHARS)).is_ok());
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 10 characters, 20 bytes
        assert!(validate_query("éééééééééé").is_ok());
    }

    #[test]
    fn test_blocked_keywords() {
        assert_eq!(
            validate_query("Design a <SCRIPT> runner"),
            Err(QueryError::Unsafe("script"))
        );
        assert_eq!(
            validate_query("Build an eval harness for models"),
            Err(QueryError::Unsafe("eval"))
        );
        assert!(validate_query("Design an execution engine").is_err());
    }
}
