use std::fmt;

use anyhow::{bail, Result};

use crate::models::CompanyRecord;

/// A provider-agnostic search expression. The mail adapter renders these
/// into actual IMAP queries; building them needs no network access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchExpression {
    /// Primary: sender address contains the derived domain token.
    SenderContains(String),
    /// Fallback: subject or body mentions the company display name.
    /// Only evaluated when the primary expression yields zero candidates.
    TextContains(String),
}

impl fmt::Display for SearchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchExpression::SenderContains(domain) => {
                write!(f, "sender contains \"{}\"", domain)
            }
            SearchExpression::TextContains(name) => {
                write!(f, "subject or body contains \"{}\"", name)
            }
        }
    }
}

/// Corporate suffixes stripped before deriving a search domain.
const CORPORATE_SUFFIXES: &[&str] = &[
    " inc",
    " llc",
    " corp",
    " corporation",
    " ltd",
    " limited",
    " group",
    " gmbh",
    " ag",
    " se",
    " kg",
];

/// Lowercase, suffix-stripped, non-alphanumeric characters removed.
/// An approximation of the company's mail domain, not its real one:
/// "Acme Corp" becomes "acme", which still misses recruiting mail sent
/// from e.g. acme-careers.example; the fallback expression covers that.
pub fn derived_domain(name: &str) -> String {
    let mut token = name.trim().to_lowercase();
    for suffix in CORPORATE_SUFFIXES {
        if let Some(stripped) = token.strip_suffix(suffix) {
            token = stripped.to_string();
        }
    }
    token.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Ordered search strategy for one company: primary sender-domain match,
/// then a display-name text match as fallback. Companies named after
/// generic words ("Jobs", "Team") will over-match in the fallback; that
/// recall/precision tradeoff is deliberate and left loose so short-named
/// companies still match at all.
pub fn build_queries(company: &CompanyRecord, window_days: u32) -> Result<Vec<SearchExpression>> {
    if window_days == 0 {
        bail!("recency window must be at least one day");
    }
    let display = company.name.trim();
    if display.is_empty() {
        bail!("company name is empty at row {}", company.row_index + 1);
    }

    Ok(vec![
        SearchExpression::SenderContains(derived_domain(display)),
        SearchExpression::TextContains(display.to_string()),
    ])
}
