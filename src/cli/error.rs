// Error handling utilities for consistent error messages and exit codes

use std::process;

/// Exit with a user error (exit code 1)
/// User errors are for invalid input, missing resources, etc.
pub fn user_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

/// Exit with an internal error (exit code >1)
/// Internal errors are for unexpected system failures, database corruption, etc.
pub fn internal_error(message: &str) -> ! {
    eprintln!("Internal error: {}", message);
    process::exit(2);
}

/// Whether an error originated in the database layer rather than user input
pub fn is_internal(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<rusqlite::Error>().is_some())
}

/// Validate that a string is not empty
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} cannot be empty", field_name))
    } else {
        Ok(())
    }
}

/// Validate an entity ID (letters, numbers, underscores, hyphens)
pub fn validate_entity_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("Entity ID cannot be empty".to_string());
    }

    if id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(format!("Invalid entity ID: '{}'. IDs can only contain letters, numbers, underscores, and hyphens.", id))
    }
}

/// Validate a deal value (non-negative whole number)
pub fn validate_value(value_str: &str) -> Result<i64, String> {
    let cleaned: String = value_str.chars().filter(|c| *c != ',' && *c != '_').collect();
    cleaned.parse::<i64>()
        .map_err(|_| format!("Invalid value: '{}'. Value must be a whole number.", value_str))
        .and_then(|v| {
            if v >= 0 {
                Ok(v)
            } else {
                Err(format!("Invalid value: {}. Value must be non-negative.", v))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_empty() {
        assert!(validate_non_empty("test", "field").is_ok());
        assert!(validate_non_empty("", "field").is_err());
        assert!(validate_non_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_entity_id() {
        assert!(validate_entity_id("a").is_ok());
        assert!(validate_entity_id("deal-42").is_ok());
        assert!(validate_entity_id("3f9a_b").is_ok());
        assert!(validate_entity_id("").is_err());
        assert!(validate_entity_id("a b").is_err());
        assert!(validate_entity_id("a/b").is_err());
    }

    #[test]
    fn test_validate_value() {
        assert_eq!(validate_value("5000000"), Ok(5_000_000));
        assert_eq!(validate_value("5,000,000"), Ok(5_000_000));
        assert_eq!(validate_value("0"), Ok(0));
        assert!(validate_value("-1").is_err());
        assert!(validate_value("lots").is_err());
    }

    #[test]
    fn test_is_internal() {
        let db_err: anyhow::Error = rusqlite::Error::InvalidQuery.into();
        assert!(is_internal(&db_err.context("Failed to list entities")));
        assert!(!is_internal(&anyhow::anyhow!("No entity with id 'x'")));
    }
}
