mod classify;
mod mail;
mod models;
mod pipeline;
mod query;
mod review;
mod sheet;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

use mail::{EmailConfig, MailClient};
use models::Category;
use pipeline::{CheckConfig, CompanyCheck};
use sheet::Sheet;

#[derive(Parser)]
#[command(name = "followup")]
#[command(about = "Track job-application outcomes by matching your inbox against your applications spreadsheet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the inbox and merge outcomes into the spreadsheet
    Check {
        /// Applications spreadsheet (CSV)
        #[arg(short, long)]
        file: PathBuf,

        /// Column holding the company names
        #[arg(long, default_value = sheet::DEFAULT_COMPANY_COLUMN)]
        column: String,

        /// Number of days to look back
        #[arg(short, long, default_value = "30")]
        days: u32,

        /// Gmail address
        #[arg(short, long)]
        username: String,

        /// Path to app password file
        #[arg(short, long, default_value = "~/.gmail.app_password.txt")]
        password_file: String,

        /// Show results without writing the spreadsheet
        #[arg(long)]
        dry_run: bool,

        /// Confirm or correct each classification before merging
        #[arg(long)]
        review: bool,
    },

    /// Print the search expressions a check would issue, without connecting
    Plan {
        /// Applications spreadsheet (CSV)
        #[arg(short, long)]
        file: PathBuf,

        /// Column holding the company names
        #[arg(long, default_value = sheet::DEFAULT_COMPANY_COLUMN)]
        column: String,

        /// Number of days to look back
        #[arg(short, long, default_value = "30")]
        days: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            file,
            column,
            days,
            username,
            password_file,
            dry_run,
            review,
        } => run_check_command(file, column, days, username, password_file, dry_run, review),

        Commands::Plan { file, column, days } => {
            let config = CheckConfig::new(file, column, days)?;
            let sheet = Sheet::load(&config.sheet_path)?;
            let companies = sheet.companies(&config.company_column)?;
            for company in &companies {
                let queries = query::build_queries(company, config.window_days)?;
                println!("{}:", company.name);
                for (i, expr) in queries.iter().enumerate() {
                    let role = if i == 0 { "primary" } else { "fallback" };
                    println!("  {}: {}", role, expr);
                }
            }
            println!(
                "\n{} companies, searching the last {} days.",
                companies.len(),
                config.window_days
            );
            Ok(())
        }
    }
}

fn run_check_command(
    file: PathBuf,
    column: String,
    days: u32,
    username: String,
    password_file: String,
    dry_run: bool,
    review: bool,
) -> Result<()> {
    let config = CheckConfig::new(file, column, days)?;

    let mut sheet = Sheet::load(&config.sheet_path)?;
    let companies = sheet.companies(&config.company_column)?;
    if companies.is_empty() {
        println!("No companies found in the spreadsheet.");
        return Ok(());
    }
    println!("Loaded {} companies to check.", companies.len());

    let password_path = expand_home(&password_file);
    println!("Connecting to Gmail as {}...", username);
    let email_config = EmailConfig::from_gmail_password_file(&username, &password_path)?;
    let mut client = MailClient::connect(&email_config)?;

    println!(
        "Searching for application outcomes from the last {} days...\n",
        config.window_days
    );
    let (mut checks, stats) = pipeline::run_check(&mut client, &companies, config.window_days)?;
    let malformed = client.malformed_skipped();
    if let Err(e) = client.logout() {
        eprintln!("Warning: IMAP logout failed: {:#}", e);
    }

    print_check_report(&checks);

    if malformed > 0 {
        eprintln!(
            "Warning: skipped {} message(s) missing a usable date or sender.",
            malformed
        );
    }
    if let Some(reason) = &stats.aborted {
        eprintln!(
            "Warning: retrieval failed after {} of {} companies: {}",
            stats.companies_checked,
            companies.len(),
            reason
        );
        eprintln!("Results collected so far will still be merged.");
    }

    if review {
        apply_review(&mut checks)?;
    }

    let results: Vec<_> = checks.into_iter().map(|c| c.result).collect();
    let today = Utc::now().date_naive();
    let report = sheet.merge(&config.company_column, &results, today)?;

    println!("\nMerge:");
    println!("  Rows updated: {}", report.updated);
    for conflict in &report.conflicts {
        println!(
            "  Conflict: {} is manually set to {} (new automatic result {} was not applied)",
            conflict.company, conflict.existing, conflict.incoming
        );
    }
    for name in &report.dropped {
        eprintln!("  Warning: no spreadsheet row for '{}', result dropped", name);
    }

    if dry_run {
        println!("\n(Dry run - spreadsheet not written)");
    } else {
        sheet.save(&config.sheet_path)?;
        println!("\nSpreadsheet updated: {}", config.sheet_path.display());
    }

    Ok(())
}

fn print_check_report(checks: &[CompanyCheck]) {
    let mut unmatched: Vec<&str> = Vec::new();

    for check in checks {
        if check.candidates.is_empty() {
            unmatched.push(&check.result.company.name);
            continue;
        }
        println!(
            "{}: {} message(s) -> {}",
            check.result.company.name,
            check.candidates.len(),
            check.result.outcome.status_text()
        );
        for candidate in &check.candidates {
            let sender = if candidate.sender_name.is_empty() {
                &candidate.sender_addr
            } else {
                &candidate.sender_name
            };
            println!(
                "  {} | {} | {}",
                sender,
                candidate.subject,
                candidate.received.format("%Y-%m-%d")
            );
        }
    }

    if !unmatched.is_empty() {
        println!("\nCompanies with no matching messages:");
        for name in unmatched {
            println!("  - {}", name);
        }
    }
}

/// Interactive review loop. All console interaction lives here; the
/// override itself is the pure entry point in `review`.
fn apply_review(checks: &mut [CompanyCheck]) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    println!("\nReview (press Enter to accept, or type Submitted/Interview/Rejected/Related/Other):");
    for check in checks.iter_mut() {
        print!(
            "  {} [{}]: ",
            check.result.company.name,
            check.result.outcome.status_text()
        );
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let input = line?;
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        match Category::parse(input) {
            Some(category) => {
                check.result = review::apply_override(check.result.clone(), category);
                println!("    -> recorded as {} (reviewed)", category.as_str());
            }
            None => {
                println!("    -> '{}' is not a category, keeping automatic result", input);
            }
        }
    }
    Ok(())
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(format!("{}/{}", home, rest))
    } else {
        PathBuf::from(path)
    }
}
