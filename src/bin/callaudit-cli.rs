//! CallAudit CLI - Local automation tool
//!
//! Provides command-line access to:
//! - Report generation from record files or the live store
//! - CSV export of any tabular JSON
//! - Session snapshot inspection
//!
//! Usage:
//!   callaudit-cli report rows --records <path> --scores <path> [--csv]
//!   callaudit-cli report summary --records <path>
//!   callaudit-cli report mca --records <path> --history <path> --date <YYYY-MM-DD>
//!   callaudit-cli csv <path>
//!   callaudit-cli fetch <type> [--ri <id>]
//!   callaudit-cli session show <path>

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;

use callaudit::exports::{records_to_csv, report_rows_to_csv, values_to_csv};
use callaudit::record::{Record, RecordType};
use callaudit::reports::{
    build_cmr_summary, build_report_rows, build_summary_dates, default_priority_table,
    select_for_window,
};
use callaudit::store::{HttpRecordStore, RecordQuery, RecordStore, StoreConfig};
use callaudit::SessionState;

#[derive(Debug)]
enum Command {
    Report(ReportCommand),
    Csv { input: PathBuf },
    Fetch { record_type: RecordType, ri_id: Option<String> },
    Session { path: PathBuf },
    Help,
    Version,
}

#[derive(Debug)]
enum ReportCommand {
    Rows {
        records: PathBuf,
        scores: Option<PathBuf>,
        csv: bool,
    },
    Summary {
        records: PathBuf,
    },
    Mca {
        records: PathBuf,
        history: Option<PathBuf>,
        date: NaiveDate,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    match parse_args(&args) {
        Ok(cmd) => match run_command(cmd) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_help();
            ExitCode::FAILURE
        }
    }
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn parse_args(args: &[String]) -> Result<Command> {
    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => Ok(Command::Help),
        "version" | "--version" | "-V" => Ok(Command::Version),

        "report" => {
            let sub = args
                .get(2)
                .ok_or_else(|| anyhow!("Missing report subcommand. Use: rows, summary, mca"))?;
            let records = flag_value(args, "--records")
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("Missing --records <path>"))?;
            match sub.as_str() {
                "rows" => Ok(Command::Report(ReportCommand::Rows {
                    records,
                    scores: flag_value(args, "--scores").map(PathBuf::from),
                    csv: args.iter().any(|a| a == "--csv"),
                })),
                "summary" => Ok(Command::Report(ReportCommand::Summary { records })),
                "mca" => {
                    let date = flag_value(args, "--date")
                        .ok_or_else(|| anyhow!("Missing --date <YYYY-MM-DD>"))?
                        .parse()
                        .context("Invalid --date")?;
                    Ok(Command::Report(ReportCommand::Mca {
                        records,
                        history: flag_value(args, "--history").map(PathBuf::from),
                        date,
                    }))
                }
                other => Err(anyhow!("Unknown report subcommand: {}", other)),
            }
        }

        "csv" => {
            let input = args
                .get(2)
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("Missing input path"))?;
            Ok(Command::Csv { input })
        }

        "fetch" => {
            let record_type = args
                .get(2)
                .ok_or_else(|| anyhow!("Missing record type. Use: monitoring, mca, score"))?
                .parse::<RecordType>()
                .map_err(|_| anyhow!("Unknown record type: {}", args[2]))?;
            Ok(Command::Fetch {
                record_type,
                ri_id: flag_value(args, "--ri"),
            })
        }

        "session" => {
            match args.get(2).map(String::as_str) {
                Some("show") => {
                    let path = args
                        .get(3)
                        .map(PathBuf::from)
                        .ok_or_else(|| anyhow!("Missing session snapshot path"))?;
                    Ok(Command::Session { path })
                }
                _ => Err(anyhow!("Missing session subcommand. Use: show <path>")),
            }
        }

        other => Err(anyhow!("Unknown command: {}", other)),
    }
}

fn run_command(cmd: Command) -> Result<()> {
    match cmd {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            println!("callaudit-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Report(report) => run_report(report),
        Command::Csv { input } => run_csv(input),
        Command::Fetch { record_type, ri_id } => run_fetch(record_type, ri_id),
        Command::Session { path } => run_session_show(path),
    }
}

fn print_help() {
    println!(
        r#"CallAudit CLI - Local automation tool

USAGE:
    callaudit-cli <COMMAND> [OPTIONS]

COMMANDS:
    report rows         Build CMR report rows from record files
        --records       Path to a JSON array of monitoring records (required)
        --scores        Path to a JSON array of score source records
        --csv           Emit CSV instead of the summary

    report summary      Per-category deviation dates for a record window
        --records       Path to a JSON array of monitoring records (required)

    report mca          Pick the primary MCA record for a window
        --records       Path to a JSON array of candidate records (required)
        --history       Path to a JSON array of prior escalations
        --date          Window date, YYYY-MM-DD (required)

    csv <PATH>          Convert a JSON array of objects to CSV on stdout

    fetch <TYPE>        Fetch records from the configured store as CSV
        --ri            Filter by RI identifier
        (reads CALLAUDIT_BASE_URL, CALLAUDIT_EMAIL, CALLAUDIT_API_TOKEN)

    session show <PATH> Inspect a saved session snapshot

    help                Show this help message
    version             Show version information

EXAMPLES:
    callaudit-cli report rows --records march.json --scores scores.json --csv
    callaudit-cli report mca --records window.json --date 2026-04-15
    callaudit-cli csv report.json > report.csv
"#
    );
}

fn load_records(path: &PathBuf) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records from {}", path.display()))
}

fn run_report(cmd: ReportCommand) -> Result<()> {
    match cmd {
        ReportCommand::Rows {
            records,
            scores,
            csv,
        } => {
            let records = load_records(&records)?;
            let scores = scores.as_ref().map(load_records).transpose()?.unwrap_or_default();
            let rows = build_report_rows(&records, &scores);

            if csv {
                println!("{}", report_rows_to_csv(&rows));
                return Ok(());
            }

            let summary = build_cmr_summary(&rows);
            println!("Call Monitoring Report");
            println!("{}", "-".repeat(30));
            println!("Calls:     {}", summary.total_calls);
            println!("Accuracy:  {:.2}", summary.total_accuracy);
            println!("MCA dates: {}", summary.mca_dates.len());
            println!();
            println!("{:<10} {:<12} {:<8} {:<10} DEVIATIONS", "RECORD", "DATE", "RI", "SCORE");
            for row in &rows {
                let score = if row.final_score.is_nan() {
                    "-".to_string()
                } else {
                    format!("{:.1}", row.final_score)
                };
                let diffs = row
                    .obsv_diffs
                    .iter()
                    .map(usize::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                println!(
                    "{:<10} {:<12} {:<8} {:<10} {}",
                    row.record.record_number, row.record.record_date, row.record.ri_id, score, diffs
                );
            }
            Ok(())
        }
        ReportCommand::Summary { records } => {
            let records = load_records(&records)?;
            let summary = build_summary_dates(&records);

            println!("{:<24} DATES", "CATEGORY");
            println!("{}", "-".repeat(60));
            for (category, dates) in summary {
                let joined = dates
                    .iter()
                    .map(NaiveDate::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{:<24} {}", category.to_string(), joined);
            }
            Ok(())
        }
        ReportCommand::Mca {
            records,
            history,
            date,
        } => {
            let candidates = load_records(&records)?;
            let history = history.as_ref().map(load_records).transpose()?.unwrap_or_default();
            let table = default_priority_table();

            match select_for_window(&candidates, &history, date, &table) {
                Some(selection) => {
                    let category = selection
                        .primary
                        .text_field("mca_category")
                        .unwrap_or("(none)");
                    println!("Primary: {}", selection.primary.record_number);
                    println!("RI:       {}", selection.primary.ri_id);
                    println!("Category: {}", category);
                    println!("Prior escalations (12 months): {}", selection.prior_escalations.len());
                    for prior in &selection.prior_escalations {
                        println!(
                            "  {} {} {}",
                            prior.record_number,
                            prior.record_date,
                            prior.text_field("mca_category").unwrap_or("")
                        );
                    }
                    Ok(())
                }
                None => Err(anyhow!("No candidate records in {}", date)),
            }
        }
    }
}

fn run_csv(input: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let values: Vec<serde_json::Value> =
        serde_json::from_str(&content).context("Input must be a JSON array of objects")?;
    println!("{}", values_to_csv(&values));
    Ok(())
}

fn run_fetch(record_type: RecordType, ri_id: Option<String>) -> Result<()> {
    let config = StoreConfig::from_env()
        .map_err(|_| anyhow!("Store not configured. Set CALLAUDIT_BASE_URL, CALLAUDIT_EMAIL, CALLAUDIT_API_TOKEN."))?;
    let store = HttpRecordStore::new(&config);

    let mut query = RecordQuery::default();
    query.ri_id = ri_id;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let records = runtime
        .block_on(store.fetch_records(record_type, &query))
        .context("Fetch failed")?;

    if records.is_empty() {
        eprintln!("No records found.");
        return Ok(());
    }
    println!("{}", records_to_csv(record_type, &records));
    Ok(())
}

fn run_session_show(path: PathBuf) -> Result<()> {
    let session = SessionState::load(&path)
        .with_context(|| format!("Failed to load session from {}", path.display()))?;

    println!("Session: {}", session.email());
    match session.active_record() {
        Some(record) => println!("Active record: {}", record),
        None => println!("Active record: (none)"),
    }
    println!(
        "Open edit: {}",
        if session.has_open_edit() { "yes" } else { "no" }
    );
    Ok(())
}
