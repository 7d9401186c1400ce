use std::collections::HashSet;

use scraper::Html;

use crate::models::{Category, MessageCandidate};

/// Bilingual keyword rules, highest-priority category first. A candidate's
/// category is the first entry with any keyword appearing as a substring of
/// its normalized text, so a message matching several categories resolves
/// to the highest-priority one. All keywords are lowercase; the candidate
/// text is case-folded before matching.
const RULES: &[(Category, &[&str])] = &[
    (
        Category::Interview,
        &[
            // English
            "interview",
            "phone screen",
            "schedule a call",
            "next round",
            "invite you to meet",
            // German
            "vorstellungsgespräch",
            "zum gespräch einladen",
            "persönliches kennenlernen",
            "termin vereinbaren",
        ],
    ),
    (
        Category::Rejected,
        &[
            "unfortunately",
            "we regret",
            "not moving forward",
            "other candidates",
            "decided not to proceed",
            "position has been filled",
            "absage",
            "leider",
            "nicht weiter berücksichtigen",
            "anderen bewerber entschieden",
        ],
    ),
    (
        Category::Submitted,
        &[
            "thank you for applying",
            "application received",
            "received your application",
            "application has been submitted",
            "successfully submitted",
            "bewerbung erhalten",
            "bewerbungseingang",
            "eingang ihrer bewerbung",
            "vielen dank für ihre bewerbung",
        ],
    ),
    (
        Category::Related,
        &[
            "your application",
            "job opportunity",
            "talent acquisition",
            "hiring team",
            "recruiting",
            "ihre bewerbung",
            "stellenangebot",
            "personalabteilung",
            "karriere",
        ],
    ),
];

/// Subject plus HTML-stripped body, whitespace collapsed, case-folded.
pub fn candidate_text(candidate: &MessageCandidate) -> String {
    let body_text = strip_html(&candidate.body);
    let combined = format!("{} {}", candidate.subject, body_text);
    combined
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn strip_html(body: &str) -> String {
    // Plain-text bodies pass through parse_document unharmed, so no
    // content-type sniffing is needed here.
    let document = Html::parse_document(body);
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Assigns exactly one category. Total: text matching no keyword in any
/// list is Other, never an error.
pub fn classify_candidate(candidate: &MessageCandidate) -> Category {
    let text = candidate_text(candidate);
    for (category, keywords) in RULES {
        if keywords.iter().any(|k| text.contains(k)) {
            return *category;
        }
    }
    Category::Other
}

/// Effective category for one company's retrieved set: dedup by message id
/// (first occurrence kept), then max by (priority, received date). A newer
/// low-priority message never undoes an older interview or rejection.
/// Returns None for an empty set: "no result", not Other.
pub fn classify_company(
    candidates: &[MessageCandidate],
) -> Option<(Category, MessageCandidate)> {
    let mut seen: HashSet<&str> = HashSet::new();
    candidates
        .iter()
        .filter(|c| seen.insert(c.message_id.as_str()))
        .map(|c| (classify_candidate(c), c))
        .max_by_key(|(category, c)| (category.priority(), c.received))
        .map(|(category, c)| (category, c.clone()))
}
