use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;

use crate::models::{normalize_name, ClassificationResult, CompanyRecord};

pub const DEFAULT_COMPANY_COLUMN: &str = "Company_Name";
pub const STATUS_COLUMN: &str = "Status";
pub const LAST_CHECKED_COLUMN: &str = "Last_Checked";

/// Status text written for companies with zero matching messages.
/// Deliberately not a `Category`: distinguishable from Other.
pub const NO_RESPONSE_STATUS: &str = "No response";

/// In-band marker persisting the manually-reviewed flag across runs.
/// The sheet is the system of record and owns no side files, so the flag
/// lives in the one status cell this tool already owns.
const REVIEWED_MARKER: &str = " (reviewed)";

/// The applications spreadsheet, held as strings so every cell outside the
/// two owned columns survives a load/merge/save round trip unchanged.
#[derive(Debug, Clone)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub company: String,
    pub existing: String,
    pub incoming: String,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub updated: usize,
    pub conflicts: Vec<Conflict>,
    /// Companies classified this run that have no spreadsheet row. The row
    /// set is authoritative; these results are dropped.
    pub dropped: Vec<String>,
}

impl Sheet {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open spreadsheet: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse spreadsheet: {}", path.display()))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let mut row: Vec<String> = record?.iter().map(str::to_string).collect();
            // Ragged rows are padded so column updates index safely.
            while row.len() < headers.len() {
                row.push(String::new());
            }
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to write spreadsheet: {}", path.display()))?;
        self.to_writer(file)
    }

    pub fn to_writer(&self, writer: impl Write) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Finds or appends a column, padding every row. Existing columns are
    /// never reordered or removed.
    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Extracts the company directory: one record per row with a non-blank
    /// name in the given column. Blank rows are skipped, not errors.
    pub fn companies(&self, column: &str) -> Result<Vec<CompanyRecord>> {
        let idx = self.column_index(column).ok_or_else(|| {
            anyhow!(
                "Column '{}' not found in spreadsheet (available: {})",
                column,
                self.headers.join(", ")
            )
        })?;

        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(row_index, row)| {
                let name = row[idx].trim();
                if name.is_empty() {
                    None
                } else {
                    Some(CompanyRecord {
                        name: name.to_string(),
                        row_index,
                    })
                }
            })
            .collect())
    }

    /// Merges classification results into the sheet. Only the Status and
    /// Last_Checked cells of matching rows change; everything else is
    /// preserved. Merging the same results twice yields the same rows.
    pub fn merge(
        &mut self,
        company_column: &str,
        results: &[ClassificationResult],
        today: NaiveDate,
    ) -> Result<MergeReport> {
        let name_idx = self
            .column_index(company_column)
            .ok_or_else(|| anyhow!("Column '{}' not found in spreadsheet", company_column))?;
        let status_idx = self.ensure_column(STATUS_COLUMN);
        let checked_idx = self.ensure_column(LAST_CHECKED_COLUMN);
        let date_text = today.format("%Y-%m-%d").to_string();

        let mut report = MergeReport::default();

        for result in results {
            let wanted = result.company.normalized_name();
            let matching: Vec<usize> = self
                .rows
                .iter()
                .enumerate()
                .filter(|(_, row)| normalize_name(&row[name_idx]) == wanted)
                .map(|(i, _)| i)
                .collect();

            if matching.is_empty() {
                report.dropped.push(result.company.name.clone());
                continue;
            }

            let incoming = result.outcome.status_text();

            // Duplicate rows for one company all receive the same update;
            // deduplicating the sheet is its owner's job.
            for row_index in matching {
                let existing = self.rows[row_index][status_idx].clone();

                if let Some(reviewed_value) = existing.strip_suffix(REVIEWED_MARKER) {
                    if result.manually_reviewed {
                        // A fresh human decision replaces the old one.
                        self.rows[row_index][status_idx] =
                            format!("{}{}", incoming, REVIEWED_MARKER);
                        self.rows[row_index][checked_idx] = date_text.clone();
                        report.updated += 1;
                    } else if reviewed_value == incoming {
                        // Automatic run agrees with the reviewed value;
                        // keep the marker, just refresh the check date.
                        self.rows[row_index][checked_idx] = date_text.clone();
                        report.updated += 1;
                    } else {
                        report.conflicts.push(Conflict {
                            company: result.company.name.clone(),
                            existing: reviewed_value.to_string(),
                            incoming: incoming.clone(),
                        });
                    }
                    continue;
                }

                self.rows[row_index][status_idx] = if result.manually_reviewed {
                    format!("{}{}", incoming, REVIEWED_MARKER)
                } else {
                    incoming.clone()
                };
                self.rows[row_index][checked_idx] = date_text.clone();
                report.updated += 1;
            }
        }

        Ok(report)
    }

    #[cfg(test)]
    fn cell(&self, row: usize, column: &str) -> &str {
        let idx = self.column_index(column).expect("column exists");
        &self.rows[row][idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Outcome};
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = "\
Company_Name,Role,Notes
Acme Corp,Backend Engineer,referred by Sam
Globex,Platform Engineer,
Initech,SRE,follow up in June
";

    fn sheet() -> Sheet {
        Sheet::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    fn result(name: &str, outcome: Outcome, reviewed: bool) -> ClassificationResult {
        ClassificationResult {
            company: CompanyRecord {
                name: name.to_string(),
                row_index: 0,
            },
            outcome,
            evidence: None,
            checked_at: Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap(),
            manually_reviewed: reviewed,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()
    }

    fn to_csv(sheet: &Sheet) -> String {
        let mut out = Vec::new();
        sheet.to_writer(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn companies_come_from_the_configured_column() {
        let companies = sheet().companies("Company_Name").unwrap();
        let names: Vec<&str> = companies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Corp", "Globex", "Initech"]);
        assert_eq!(companies[1].row_index, 1);
    }

    #[test]
    fn missing_company_column_is_an_error() {
        assert!(sheet().companies("Firma").is_err());
    }

    #[test]
    fn blank_company_cells_are_skipped() {
        let csv = "Company_Name,Role\nAcme,Dev\n  ,Dev\nGlobex,Ops\n";
        let sheet = Sheet::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(sheet.companies("Company_Name").unwrap().len(), 2);
    }

    #[test]
    fn merge_writes_only_the_two_owned_columns() {
        let mut s = sheet();
        let report = s
            .merge(
                "Company_Name",
                &[result(
                    "Acme Corp",
                    Outcome::Classified(Category::Interview),
                    false,
                )],
                today(),
            )
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(s.cell(0, STATUS_COLUMN), "Interview");
        assert_eq!(s.cell(0, LAST_CHECKED_COLUMN), "2026-08-29");
        // unrelated cells untouched, other rows blank in owned columns
        assert_eq!(s.cell(0, "Notes"), "referred by Sam");
        assert_eq!(s.cell(1, STATUS_COLUMN), "");
    }

    #[test]
    fn unrelated_columns_survive_a_round_trip_byte_for_byte() {
        let mut s = sheet();
        s.merge(
            "Company_Name",
            &[result("Globex", Outcome::NoResponse, false)],
            today(),
        )
        .unwrap();
        let out = to_csv(&s);
        for line in SAMPLE.lines().skip(1) {
            let prefix = line.trim_end_matches(',');
            assert!(
                out.lines().any(|l| l.starts_with(prefix)),
                "row lost or altered: {}",
                line
            );
        }
        assert!(out.lines().next().unwrap().starts_with("Company_Name,Role,Notes"));
    }

    #[test]
    fn merge_is_idempotent() {
        let results = vec![
            result("Acme Corp", Outcome::Classified(Category::Rejected), false),
            result("Globex", Outcome::NoResponse, false),
        ];
        let mut once = sheet();
        once.merge("Company_Name", &results, today()).unwrap();
        let mut twice = once.clone();
        twice.merge("Company_Name", &results, today()).unwrap();
        assert_eq!(to_csv(&once), to_csv(&twice));
    }

    #[test]
    fn no_response_writes_an_explicit_marker() {
        let mut s = sheet();
        s.merge(
            "Company_Name",
            &[result("Globex", Outcome::NoResponse, false)],
            today(),
        )
        .unwrap();
        assert_eq!(s.cell(1, STATUS_COLUMN), NO_RESPONSE_STATUS);
        assert_ne!(s.cell(1, STATUS_COLUMN), Category::Other.as_str());
    }

    #[test]
    fn unknown_company_is_dropped_with_a_warning_entry() {
        let mut s = sheet();
        let report = s
            .merge(
                "Company_Name",
                &[result(
                    "Umbrella",
                    Outcome::Classified(Category::Submitted),
                    false,
                )],
                today(),
            )
            .unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.dropped, vec!["Umbrella".to_string()]);
    }

    #[test]
    fn duplicate_rows_all_receive_the_update() {
        let csv = "Company_Name,Role\nAcme,Dev\nacme  ,Ops\n";
        let mut s = Sheet::from_reader(csv.as_bytes()).unwrap();
        let report = s
            .merge(
                "Company_Name",
                &[result("Acme", Outcome::Classified(Category::Submitted), false)],
                today(),
            )
            .unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(s.cell(0, STATUS_COLUMN), "Submitted");
        assert_eq!(s.cell(1, STATUS_COLUMN), "Submitted");
    }

    #[test]
    fn manual_override_is_persisted_with_the_reviewed_marker() {
        let mut s = sheet();
        s.merge(
            "Company_Name",
            &[result(
                "Initech",
                Outcome::Classified(Category::Interview),
                true,
            )],
            today(),
        )
        .unwrap();
        assert_eq!(s.cell(2, STATUS_COLUMN), "Interview (reviewed)");
    }

    #[test]
    fn automatic_run_never_overwrites_a_disagreeing_reviewed_status() {
        let mut s = sheet();
        // A previous run recorded a human decision for Initech.
        s.merge(
            "Company_Name",
            &[result(
                "Initech",
                Outcome::Classified(Category::Interview),
                true,
            )],
            today(),
        )
        .unwrap();

        // A fresh automatic run disagrees.
        let report = s
            .merge(
                "Company_Name",
                &[result(
                    "Initech",
                    Outcome::Classified(Category::Submitted),
                    false,
                )],
                NaiveDate::from_ymd_opt(2026, 9, 15).unwrap(),
            )
            .unwrap();

        assert_eq!(s.cell(2, STATUS_COLUMN), "Interview (reviewed)");
        assert_eq!(s.cell(2, LAST_CHECKED_COLUMN), "2026-08-29");
        assert_eq!(
            report.conflicts,
            vec![Conflict {
                company: "Initech".to_string(),
                existing: "Interview".to_string(),
                incoming: "Submitted".to_string(),
            }]
        );
    }

    #[test]
    fn agreeing_automatic_run_keeps_the_reviewed_marker() {
        let mut s = sheet();
        s.merge(
            "Company_Name",
            &[result(
                "Initech",
                Outcome::Classified(Category::Interview),
                true,
            )],
            today(),
        )
        .unwrap();

        let later = NaiveDate::from_ymd_opt(2026, 9, 15).unwrap();
        let report = s
            .merge(
                "Company_Name",
                &[result(
                    "Initech",
                    Outcome::Classified(Category::Interview),
                    false,
                )],
                later,
            )
            .unwrap();

        assert!(report.conflicts.is_empty());
        assert_eq!(s.cell(2, STATUS_COLUMN), "Interview (reviewed)");
        assert_eq!(s.cell(2, LAST_CHECKED_COLUMN), "2026-09-15");
    }

    #[test]
    fn existing_status_columns_are_reused_not_duplicated() {
        let csv = "Company_Name,Status,Last_Checked\nAcme,Other,2026-01-01\n";
        let mut s = Sheet::from_reader(csv.as_bytes()).unwrap();
        s.merge(
            "Company_Name",
            &[result("Acme", Outcome::Classified(Category::Rejected), false)],
            today(),
        )
        .unwrap();
        assert_eq!(s.headers.len(), 3);
        assert_eq!(s.cell(0, STATUS_COLUMN), "Rejected");
    }
}
