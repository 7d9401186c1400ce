use crate::models::{Category, ClassificationResult, Outcome};

/// Applies a human correction to an automatic result. Evidence is
/// provenance and stays exactly as classified; only the outcome changes,
/// and the result is marked as manually reviewed so a later automatic run
/// cannot silently overwrite it.
pub fn apply_override(
    result: ClassificationResult,
    new_category: Category,
) -> ClassificationResult {
    ClassificationResult {
        outcome: Outcome::Classified(new_category),
        manually_reviewed: true,
        ..result
    }
}
