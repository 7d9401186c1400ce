use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the applications spreadsheet that names a company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    pub row_index: usize, // position in the loaded sheet, 0-based
}

impl CompanyRecord {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Company identity: trimmed, lowercased, internal whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A single retrieved email message considered for classification.
/// Immutable once fetched; `message_id` is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCandidate {
    pub sender_name: String,
    pub sender_addr: String,
    pub subject: String,
    pub body: String,
    pub received: DateTime<Utc>,
    pub message_id: String,
}

/// The five outcome categories. Priority resolves multi-category matches
/// and cross-message precedence; see `priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Submitted,
    Interview,
    Rejected,
    Related,
    Other,
}

impl Category {
    /// Fixed precedence: an interview invitation outranks a rejection
    /// (it is the actionable event even when the same mail also declines
    /// an earlier role), a rejection outranks a submission acknowledgment,
    /// and so on down to Other.
    pub fn priority(self) -> u8 {
        match self {
            Category::Interview => 4,
            Category::Rejected => 3,
            Category::Submitted => 2,
            Category::Related => 1,
            Category::Other => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Submitted => "Submitted",
            Category::Interview => "Interview",
            Category::Rejected => "Rejected",
            Category::Related => "Related",
            Category::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s.trim() {
            "Submitted" => Some(Category::Submitted),
            "Interview" => Some(Category::Interview),
            "Rejected" => Some(Category::Rejected),
            "Related" => Some(Category::Related),
            "Other" => Some(Category::Other),
            _ => None,
        }
    }
}

/// What a run concluded for one company. `NoResponse` means no message
/// matched at all, distinct from `Classified(Other)`, which means a
/// message exists but fit no known pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    NoResponse,
    Classified(Category),
}

impl Outcome {
    pub fn status_text(self) -> String {
        match self {
            Outcome::NoResponse => "No response".to_string(),
            Outcome::Classified(cat) => cat.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub company: CompanyRecord,
    pub outcome: Outcome,
    /// The message that justifies the outcome; None for NoResponse.
    /// Provenance; never rewritten, not even by a manual override.
    pub evidence: Option<MessageCandidate>,
    pub checked_at: DateTime<Utc>,
    pub manually_reviewed: bool,
}
