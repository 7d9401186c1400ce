use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::Utc;

use crate::classify;
use crate::models::{ClassificationResult, CompanyRecord, MessageCandidate, Outcome};
use crate::query::{self, SearchExpression};

/// The retrieval seam. The IMAP adapter implements this for real runs;
/// tests script it without a network.
pub trait MessageSource {
    fn search(
        &mut self,
        expr: &SearchExpression,
        window_days: u32,
    ) -> Result<Vec<MessageCandidate>>;
}

/// Run configuration, validated up front and passed in explicitly.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub sheet_path: PathBuf,
    pub company_column: String,
    pub window_days: u32,
}

impl CheckConfig {
    pub fn new(sheet_path: PathBuf, company_column: String, window_days: u32) -> Result<Self> {
        if window_days == 0 {
            bail!("--days must be at least 1");
        }
        if company_column.trim().is_empty() {
            bail!("company column name must not be empty");
        }
        Ok(Self {
            sheet_path,
            company_column,
            window_days,
        })
    }
}

/// One company's outcome plus the messages that were considered, kept so
/// the report surface can list them; only `result` feeds the merger.
#[derive(Debug, Clone)]
pub struct CompanyCheck {
    pub result: ClassificationResult,
    pub candidates: Vec<MessageCandidate>,
}

#[derive(Debug, Default)]
pub struct RunStats {
    pub companies_checked: usize,
    pub companies_matched: usize,
    pub messages_seen: usize,
    /// Set when retrieval failed mid-run. Companies after the failure were
    /// not checked; results computed before it are still returned (and
    /// should still be merged).
    pub aborted: Option<String>,
}

/// Sequential pipeline: each company is fully processed before the next.
/// The fallback expression is evaluated only when the primary one returns
/// zero candidates. A retrieval failure aborts the remaining list.
pub fn run_check(
    source: &mut dyn MessageSource,
    companies: &[CompanyRecord],
    window_days: u32,
) -> Result<(Vec<CompanyCheck>, RunStats)> {
    let mut checks = Vec::new();
    let mut stats = RunStats::default();

    'companies: for company in companies {
        let queries = query::build_queries(company, window_days)?;
        stats.companies_checked += 1;

        let mut candidates = Vec::new();
        for expr in &queries {
            match source.search(expr, window_days) {
                Ok(found) => {
                    stats.messages_seen += found.len();
                    candidates = found;
                }
                Err(e) => {
                    stats.aborted = Some(format!("{:#}", e));
                    break 'companies;
                }
            }
            if !candidates.is_empty() {
                break;
            }
        }

        let checked_at = Utc::now();
        let result = match classify::classify_company(&candidates) {
            Some((category, evidence)) => {
                stats.companies_matched += 1;
                ClassificationResult {
                    company: company.clone(),
                    outcome: Outcome::Classified(category),
                    evidence: Some(evidence),
                    checked_at,
                    manually_reviewed: false,
                }
            }
            None => ClassificationResult {
                company: company.clone(),
                outcome: Outcome::NoResponse,
                evidence: None,
                checked_at,
                manually_reviewed: false,
            },
        };
        checks.push(CompanyCheck { result, candidates });
    }

    Ok((checks, stats))
}
