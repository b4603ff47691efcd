//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted judge display name, in characters.
const MAX_JUDGE_NAME_LEN: usize = 64;

/// Validates that a judge display name is non-blank and reasonably short.
///
/// # Examples
///
/// ```ignore
/// validate_judge_name("north corner") // Ok
/// validate_judge_name("   ")          // Err - blank
/// ```
pub fn validate_judge_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("judge_name_blank");
        err.message = Some("Judge name must not be blank".into());
        return Err(err);
    }

    if name.chars().count() > MAX_JUDGE_NAME_LEN {
        let mut err = ValidationError::new("judge_name_length");
        err.message = Some(
            format!(
                "Judge name must be at most {MAX_JUDGE_NAME_LEN} characters (got {})",
                name.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_judge_name_valid() {
        assert!(validate_judge_name("north corner").is_ok());
        assert!(validate_judge_name("A").is_ok());
    }

    #[test]
    fn test_validate_judge_name_blank() {
        assert!(validate_judge_name("").is_err());
        assert!(validate_judge_name("   ").is_err());
        assert!(validate_judge_name("\t\n").is_err());
    }

    #[test]
    fn test_validate_judge_name_too_long() {
        assert!(validate_judge_name(&"x".repeat(64)).is_ok());
        assert!(validate_judge_name(&"x".repeat(65)).is_err());
    }
}
