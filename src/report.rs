use crate::analyzer::{AggregateOp, AggregateTable, LoanAnalysis};
use crate::models::CurrentLoanState;
use anyhow::{Context, Result};
use csv::Writer;
use std::fs;
use std::path::Path;

pub const DEFAULTERS_FILE: &str = "defaulters_list.csv";
pub const NON_DEFAULTERS_FILE: &str = "non_defaulters_loan_rank_credit_score.csv";
pub const STATUS_SUMMARY_FILE: &str = "credit_score_by_status.csv";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const TABLES_DIR: &str = "tables";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CREDIT_RANGE_TABLE_PREFIX: &str = "default_count_by_credit_range_";

/// Write every report for `analysis` into `output_dir`, replacing the files a
/// previous run left behind.
pub fn write_reports(analysis: &LoanAnalysis, output_dir: &str) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir))?;
    clean_output_directory(output_dir)?;

    generate_defaulters_csv(&analysis.cohorts.defaulted, output_dir)?;
    generate_non_defaulters_csv(&analysis.cohorts.not_defaulted, output_dir)?;
    generate_table_csvs(analysis, output_dir)?;
    generate_status_summary_csv(analysis, output_dir)?;
    generate_summary_report(analysis, output_dir)?;
    Ok(())
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn generate_defaulters_csv(defaulted: &[CurrentLoanState], output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join(DEFAULTERS_FILE);
    let mut writer = Writer::from_path(csv_path)?;

    writer.write_record([
        "user_id",
        "created_at",
        "loan_rank",
        "credit_score",
        "amount_disbursed",
        "loan_status",
        "loan_tenure",
    ])?;

    for state in defaulted {
        writer.write_record([
            state.user_id.to_string(),
            state.created_at.format(TIMESTAMP_FORMAT).to_string(),
            optional(state.loan_rank),
            optional(state.credit_score),
            optional(state.amount_disbursed),
            optional(state.loan_status.as_deref()),
            optional(state.loan_tenure),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn generate_non_defaulters_csv(not_defaulted: &[CurrentLoanState], output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join(NON_DEFAULTERS_FILE);
    let mut writer = Writer::from_path(csv_path)?;

    writer.write_record(["user_id", "loan_rank", "credit_score"])?;
    for state in not_defaulted {
        writer.write_record([
            state.user_id.to_string(),
            optional(state.loan_rank),
            optional(state.credit_score),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn format_statistic(table: &AggregateTable, value: f64) -> String {
    match table.op {
        AggregateOp::Count => format!("{}", value as u64),
        AggregateOp::Mean => value.to_string(),
    }
}

fn generate_table_csvs(analysis: &LoanAnalysis, output_dir: &str) -> Result<()> {
    let tables_dir = Path::new(output_dir).join(TABLES_DIR);
    fs::create_dir_all(&tables_dir)?;

    for named in &analysis.tables {
        let csv_path = tables_dir.join(format!("{}.csv", named.name));
        let mut writer = Writer::from_path(csv_path)?;

        writer.write_record([named.table.group_column.to_string(), named.table.value_column()])?;
        for (key, value) in named.table.rows() {
            writer.write_record([key.to_string(), format_statistic(&named.table, *value)])?;
        }

        writer.flush()?;
    }

    Ok(())
}

fn generate_status_summary_csv(analysis: &LoanAnalysis, output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join(STATUS_SUMMARY_FILE);
    let mut writer = Writer::from_path(csv_path)?;

    writer.write_record(["loan_status", "count", "mean", "min", "q1", "median", "q3", "max"])?;
    for summary in &analysis.credit_score_by_status {
        writer.write_record([
            summary.key.to_string(),
            summary.count.to_string(),
            summary.mean.to_string(),
            summary.min.to_string(),
            summary.q1.to_string(),
            summary.median.to_string(),
            summary.q3.to_string(),
            summary.max.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn generate_summary_report(analysis: &LoanAnalysis, output_dir: &str) -> Result<()> {
    let mut content = String::new();
    content.push_str("Loan Cohort Analysis\n");
    content.push_str("====================\n\n");

    content.push_str(&format!(
        "Loan events: {}\n\
        Borrowers: {}\n\
        Defaulted: {}\n\
        Not defaulted: {}\n",
        analysis.total_events,
        analysis.current_states.len(),
        analysis.cohorts.defaulted.len(),
        analysis.cohorts.not_defaulted.len(),
    ));
    match analysis.cohorts.default_rate() {
        Some(rate) => content.push_str(&format!("Default rate: {:.2}%\n\n", rate * 100.0)),
        None => content.push_str("Default rate: n/a\n\n"),
    }

    for named in &analysis.tables {
        content.push_str(&format!("{}\n", named.name));
        if named.table.is_empty() {
            content.push_str("   (no rows)\n");
        }
        for (key, value) in named.table.rows() {
            content.push_str(&format!("   {}: {}\n", key, format_statistic(&named.table, *value)));
        }
        content.push('\n');
    }

    fs::write(Path::new(output_dir).join(SUMMARY_FILE), content)?;
    Ok(())
}

/// Remove the files a previous run generated. Anything else in the directory
/// is left alone.
pub fn clean_output_directory(output_dir: &str) -> Result<()> {
    let output_path = Path::new(output_dir);

    if !output_path.exists() {
        return Ok(());
    }

    let items_to_clean = [
        DEFAULTERS_FILE,
        NON_DEFAULTERS_FILE,
        STATUS_SUMMARY_FILE,
        SUMMARY_FILE,
        TABLES_DIR,
    ];

    for item in &items_to_clean {
        let item_path = output_path.join(item);

        if item_path.is_file() {
            fs::remove_file(&item_path)?;
            log::debug!("removed file {}", item_path.display());
        } else if item_path.is_dir() {
            fs::remove_dir_all(&item_path)?;
            log::debug!("removed directory {}", item_path.display());
        }
    }

    Ok(())
}

pub fn print_summary(analysis: &LoanAnalysis) {
    println!("\n📊 SUMMARY");
    println!("==========\n");

    println!("   Loan events:    {}", analysis.total_events);
    println!("   Borrowers:      {}", analysis.current_states.len());
    println!("   ❌ Defaulted:    {}", analysis.cohorts.defaulted.len());
    println!("   ✅ Not defaulted: {}", analysis.cohorts.not_defaulted.len());
    if let Some(rate) = analysis.cohorts.default_rate() {
        println!("   📉 Default rate: {:.2}%", rate * 100.0);
    }

    if let Some(table) = analysis.table("avg_credit_score_by_rank_non_defaulters") {
        println!("\n📈 Average credit score by loan rank (non-defaulters):");
        for (rank, mean) in table.rows() {
            println!("   Rank {}: {:.2}", rank, mean);
        }
    }

    for named in &analysis.tables {
        let Some(scheme) = named.name.strip_prefix(CREDIT_RANGE_TABLE_PREFIX) else {
            continue;
        };
        println!("\n🎯 Defaulters by credit score range ({}):", scheme);
        if named.table.is_empty() {
            println!("   no defaulter falls inside this scale");
        }
        for (range, count) in named.table.rows() {
            println!("   {}: {}", range, format_statistic(&named.table, *count));
        }
    }
}
