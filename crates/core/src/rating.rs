//! Rating validation.
//!
//! The persistence layer enforces idempotency via the unique
//! `(trial, slot, question)` constraint; the checks here cover
//! everything that can be decided from study metadata alone.

use crate::error::CoreError;
use crate::study::{Question, RatingCommentMode};

/// Check a submitted rating against its question.
///
/// The scale value must belong to the question; a comment is required
/// iff the question's comment mode is `required` and rejected iff it
/// is `none`.
pub fn validate_rating(
    question: &Question,
    scale_value: usize,
    comment: Option<&str>,
) -> Result<(), CoreError> {
    if scale_value >= question.scale_count() {
        return Err(CoreError::NotAllowed(format!(
            "scale value {} does not belong to question {}",
            scale_value,
            question.number + 1
        )));
    }
    let has_comment = comment.map(|c| !c.trim().is_empty()).unwrap_or(false);
    match question.rating_comment {
        RatingCommentMode::Required if !has_comment => Err(CoreError::NotAllowed(format!(
            "question {} requires a comment",
            question.number + 1
        ))),
        RatingCommentMode::None if has_comment => Err(CoreError::NotAllowed(format!(
            "question {} does not accept comments",
            question.number + 1
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study::ScaleValue;
    use assert_matches::assert_matches;

    fn question(mode: RatingCommentMode) -> Question {
        Question {
            number: 0,
            prompt: "q".into(),
            legend: None,
            randomize_scale: false,
            rating_comment: mode,
            scale_values: (0..5)
                .map(|number| ScaleValue {
                    number,
                    label: format!("{}", number + 1),
                })
                .collect(),
        }
    }

    #[test]
    fn accepts_valid_scale_value() {
        assert!(validate_rating(&question(RatingCommentMode::None), 4, None).is_ok());
    }

    #[test]
    fn rejects_out_of_scale_value() {
        assert_matches!(
            validate_rating(&question(RatingCommentMode::None), 5, None),
            Err(CoreError::NotAllowed(_))
        );
    }

    #[test]
    fn comment_modes() {
        let required = question(RatingCommentMode::Required);
        assert!(validate_rating(&required, 0, Some("sounds odd")).is_ok());
        assert_matches!(
            validate_rating(&required, 0, None),
            Err(CoreError::NotAllowed(_))
        );
        assert_matches!(
            validate_rating(&required, 0, Some("  ")),
            Err(CoreError::NotAllowed(_))
        );

        let none = question(RatingCommentMode::None);
        assert_matches!(
            validate_rating(&none, 0, Some("hi")),
            Err(CoreError::NotAllowed(_))
        );

        let optional = question(RatingCommentMode::Optional);
        assert!(validate_rating(&optional, 0, None).is_ok());
        assert!(validate_rating(&optional, 0, Some("hi")).is_ok());
    }
}
