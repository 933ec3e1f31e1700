use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use uuid::Uuid;

use crate::error::AppError;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

pub const MAX_MODEL_ID_LEN: usize = 200;
pub const MAX_REASON_LEN: usize = 1000;
pub const MAX_BATCH_VOTES: usize = 50;

/// Trims and lowercases an address, rejecting anything not shaped `local@domain.tld`.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();

    if !EMAIL.is_match(&email) {
        return Err(AppError::Validation("A valid email address is required".to_string()));
    }

    Ok(email)
}

/// Key used for the one-proposal-per-model rule.
pub fn normalize_model_id(model_id: &str) -> String {
    model_id.trim().to_lowercase()
}

/// Single-use verification token.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Trims ids and drops blanks and repeats, keeping first occurrence order.
pub fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();

    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert_eq!(normalize_email("a@b.com").unwrap(), "a@b.com");
        assert_eq!(normalize_email("  Someone@Example.ORG ").unwrap(), "someone@example.org");
        assert_eq!(normalize_email("first.last@sub.domain.io").unwrap(), "first.last@sub.domain.io");
    }

    #[test]
    fn test_invalid_emails() {
        for email in ["", "plain", "a@b", "@b.com", "a@.", "a b@c.com", "a@b@c.com"] {
            assert!(
                matches!(normalize_email(email), Err(AppError::Validation(_))),
                "accepted {email:?}"
            );
        }
    }

    #[test]
    fn test_normalize_model_id() {
        assert_eq!(normalize_model_id("  Org/Model-X "), "org/model-x");
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = new_token();
        let b = new_token();

        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_dedup_ids() {
        let ids = vec![
            "b".to_string(),
            " a ".to_string(),
            "".to_string(),
            "b".to_string(),
            "a".to_string(),
        ];

        assert_eq!(dedup_ids(&ids), vec!["b", "a"]);
    }
}
