//! Aggregate mutation operations.
//!
//! Each mutation validates its input first, then runs its body through the
//! protected executor under the lock keys of the resources it touches. Input
//! that fails validation never contends for a key.

pub mod comment;
pub mod post;
pub mod reaction;
pub mod review;

pub use comment::CommentService;
pub use post::PostService;
pub use reaction::{ReactionOutcome, ReactionService};
pub use review::ReviewService;

use crate::error::{ContentError, Result};

/// Trim `text` and check it is non-blank and at most `max_len` characters.
///
/// # Errors
///
/// Returns [`ContentError::InvalidContent`] otherwise.
pub fn validate_text(field: &'static str, text: &str, max_len: usize) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ContentError::InvalidContent(format!("{field} must not be blank")));
    }

    let len = trimmed.chars().count();
    if len > max_len {
        return Err(ContentError::InvalidContent(format!(
            "{field} is {len} characters, limit is {max_len}"
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_text() {
        assert_eq!(validate_text("content", "  tasty  ", 10).ok(), Some("tasty".to_string()));
        assert!(matches!(
            validate_text("content", "   ", 10),
            Err(ContentError::InvalidContent(_))
        ));
        assert!(validate_text("content", "ééééé", 5).is_ok());
        assert!(validate_text("content", "ééééé", 4).is_err());
    }
}
