//! Refund request validation.

use serde::{Deserialize, Serialize};

use crate::types::RefundReason;

/// Maximum length of the free-text reason accompanying [`RefundReason::Other`].
pub const MAX_REASON_OTHER_LEN: usize = 200;

/// Maximum length of the optional customer comment.
pub const MAX_COMMENT_LEN: usize = 500;

/// Errors that can occur when validating a refund request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefundRequestError {
    #[error("a description is required when the refund reason is 'other'")]
    MissingReasonOther,
    #[error("refund reason description must be at most {MAX_REASON_OTHER_LEN} characters")]
    ReasonOtherTooLong,
    #[error("refund comment must be at most {MAX_COMMENT_LEN} characters")]
    CommentTooLong,
}

/// A validated customer refund request.
///
/// Text fields are trimmed; blank strings become `None`. The free-text
/// reason is only kept for [`RefundReason::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    reason: RefundReason,
    reason_other: Option<String>,
    comment: Option<String>,
}

impl RefundRequest {
    /// Validate and normalize a refund request.
    ///
    /// # Errors
    ///
    /// Returns an error if `reason` is `Other` without a description, or if
    /// either text field exceeds its length limit.
    pub fn new(
        reason: RefundReason,
        reason_other: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Self, RefundRequestError> {
        let reason_other = match reason {
            RefundReason::Other => {
                let text = non_blank(reason_other).ok_or(RefundRequestError::MissingReasonOther)?;
                if text.chars().count() > MAX_REASON_OTHER_LEN {
                    return Err(RefundRequestError::ReasonOtherTooLong);
                }
                Some(text)
            }
            _ => None,
        };

        let comment = non_blank(comment);
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN)
        {
            return Err(RefundRequestError::CommentTooLong);
        }

        Ok(Self {
            reason,
            reason_other,
            comment,
        })
    }

    #[must_use]
    pub const fn reason(&self) -> RefundReason {
        self.reason
    }

    #[must_use]
    pub fn reason_other(&self) -> Option<&str> {
        self.reason_other.as_deref()
    }

    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_reason_needs_no_description() {
        let request = RefundRequest::new(RefundReason::Defective, None, None).unwrap();
        assert_eq!(request.reason(), RefundReason::Defective);
        assert_eq!(request.reason_other(), None);
        assert_eq!(request.comment(), None);
    }

    #[test]
    fn test_description_dropped_for_non_other_reason() {
        let request =
            RefundRequest::new(RefundReason::WrongItem, Some("sent blue not red"), None).unwrap();
        assert_eq!(request.reason_other(), None);
    }

    #[test]
    fn test_other_requires_description() {
        assert_eq!(
            RefundRequest::new(RefundReason::Other, None, None),
            Err(RefundRequestError::MissingReasonOther)
        );
        assert_eq!(
            RefundRequest::new(RefundReason::Other, Some("   "), None),
            Err(RefundRequestError::MissingReasonOther)
        );
    }

    #[test]
    fn test_other_description_is_trimmed() {
        let request =
            RefundRequest::new(RefundReason::Other, Some("  gift duplicate \n"), None).unwrap();
        assert_eq!(request.reason_other(), Some("gift duplicate"));
    }

    #[test]
    fn test_description_length_limit() {
        let at_limit = "a".repeat(MAX_REASON_OTHER_LEN);
        assert!(RefundRequest::new(RefundReason::Other, Some(&at_limit), None).is_ok());

        let over = "a".repeat(MAX_REASON_OTHER_LEN + 1);
        assert_eq!(
            RefundRequest::new(RefundReason::Other, Some(&over), None),
            Err(RefundRequestError::ReasonOtherTooLong)
        );
    }

    #[test]
    fn test_comment_length_limit() {
        let at_limit = "c".repeat(MAX_COMMENT_LEN);
        let request =
            RefundRequest::new(RefundReason::ChangedMind, None, Some(&at_limit)).unwrap();
        assert_eq!(request.comment().map(str::len), Some(MAX_COMMENT_LEN));

        let over = "c".repeat(MAX_COMMENT_LEN + 1);
        assert_eq!(
            RefundRequest::new(RefundReason::ChangedMind, None, Some(&over)),
            Err(RefundRequestError::CommentTooLong)
        );
    }

    #[test]
    fn test_blank_comment_is_none() {
        let request = RefundRequest::new(RefundReason::QualityIssue, None, Some("  ")).unwrap();
        assert_eq!(request.comment(), None);
    }
}
