use anyhow::{Context, Result};
use clap::{Arg, Command};
use loan_cohort_analyzer::models::{Config, DataSourceMode};
use loan_cohort_analyzer::source::LoanDataFetcher;
use loan_cohort_analyzer::{load, report, LoanAnalyzer, RawTable};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("loan-cohort-analyzer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Splits borrowers into default cohorts by their latest loan")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!(
            "⚠️  Please edit {} and point it at your loan export, then run the program again.",
            config_file
        );
        return Ok(());
    };

    let output_dir = config.output_directory.as_deref().unwrap_or("output");

    let table = read_input(&config).await?;

    let events = load(&table).context("Loan export failed validation")?;
    println!("   ✅ Loaded {} loan events", events.len());

    let analyzer = LoanAnalyzer::from_config(&config)
        .with_context(|| format!("Invalid credit score scheme in {}", config_file))?;
    let analysis = analyzer.analyze(&events);

    report::write_reports(&analysis, output_dir)?;
    report::print_summary(&analysis);

    println!("\n✅ Analysis complete!");
    println!("📂 Results: {}", output_dir);
    Ok(())
}

async fn read_input(config: &Config) -> Result<RawTable> {
    let fetcher = LoanDataFetcher::new();

    match config.data_source_mode {
        DataSourceMode::Local => {
            let path = config
                .input_path
                .as_deref()
                .context("input_path must be set when data_source_mode = \"local\"")?;
            println!("📂 Reading loan export from: {}", path);
            fetcher.read_file(path)
        }
        DataSourceMode::Internet => {
            let url = config
                .input_url
                .as_deref()
                .context("input_url must be set when data_source_mode = \"internet\"")?;
            fetcher.fetch_url(url).await
        }
    }
}
