use anyhow::{Context, Result};
use cashlens_categorize::{Categorizer, InMemoryRuleSource, RuleSource};
use cashlens_core::{Settings, TransactionCandidate, UserId};
use cashlens_import::{detect_bank, FileValidator, StatementParser};
use cashlens_storage::SqliteRuleStore;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Parse and categorize Indian bank statements.
#[derive(Debug, Parser)]
#[command(name = "cashlens", author, version, about, long_about = None)]
struct Cli {
    /// Settings file (TOML). CASHLENS_* environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a statement and categorize every transaction
    Parse {
        file: PathBuf,

        /// Rules file with `[[rules]]` tables; defaults to the configured database
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Identity whose personal rules apply
        #[arg(short, long)]
        user: Option<UserId>,

        /// Emit one JSON object per transaction
        #[arg(long)]
        json: bool,
    },
    /// Print the bank a statement was exported from
    Detect { file: PathBuf },
    /// Run upload checks against a file
    Check {
        file: PathBuf,

        /// Declared MIME type; guessed from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct CategorizedTransaction<'a> {
    #[serde(flatten)]
    transaction: &'a TransactionCandidate,
    category: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command {
        Command::Parse {
            file,
            rules,
            user,
            json,
        } => parse(&settings, &file, rules.as_deref(), user.unwrap_or_default(), json).await,
        Command::Detect { file } => detect(&settings, &file).await,
        Command::Check { file, content_type } => check(&settings, &file, content_type.as_deref()),
    }
}

fn read_file(path: &Path) -> Result<(Vec<u8>, String)> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    Ok((data, name))
}

async fn rule_source(settings: &Settings, rules: Option<&Path>) -> Result<Arc<dyn RuleSource>> {
    match rules {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read rules file {}", path.display()))?;
            let source = InMemoryRuleSource::from_toml(&content)
                .with_context(|| format!("Invalid rules file {}", path.display()))?;
            tracing::info!(rules = source.len(), "loaded rules file");
            Ok(Arc::new(source))
        }
        None => {
            let store = SqliteRuleStore::connect(&settings.storage.database_url)
                .await
                .context("Failed to open rule database")?;
            Ok(Arc::new(store))
        }
    }
}

async fn parse(
    settings: &Settings,
    path: &Path,
    rules: Option<&Path>,
    user: UserId,
    json: bool,
) -> Result<()> {
    let (data, name) = read_file(path)?;
    let parser = StatementParser::new(&settings.pdf)?;
    let report = parser
        .parse_file_with_report(&data, &name)
        .await
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let categorizer = Categorizer::new(rule_source(settings, rules).await?, &settings.rules);

    let mut categorized = 0;
    for txn in &report.transactions {
        let category = categorizer.categorize_transaction(txn, user).await?;
        if category.is_some() {
            categorized += 1;
        }
        if json {
            let line = CategorizedTransaction {
                transaction: txn,
                category,
            };
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("{}", format_row(txn, category.as_deref()));
        }
    }

    for warning in &report.skipped {
        eprintln!("row {}: {}", warning.row, warning.error);
    }
    eprintln!(
        "{}: {} transactions, {} categorized, {} skipped",
        report.bank,
        report.transactions.len(),
        categorized,
        report.skipped.len()
    );
    Ok(())
}

fn format_row(txn: &TransactionCandidate, category: Option<&str>) -> String {
    format!(
        "{}  {:>12.2}  {:<6}  {:<20}  {}",
        txn.date,
        txn.amount,
        txn.direction,
        category.unwrap_or("-"),
        txn.description
    )
}

async fn detect(settings: &Settings, path: &Path) -> Result<()> {
    let (data, name) = read_file(path)?;
    let parser = StatementParser::new(&settings.pdf)?;
    let grid = parser.read_grid(&data, &name).await?;
    match detect_bank(&grid.headers) {
        Some(bank) => println!("{bank}"),
        None => anyhow::bail!("unrecognized statement format: {}", grid.headers.join(", ")),
    }
    Ok(())
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("csv") => "text/csv",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn check(settings: &Settings, path: &Path, content_type: Option<&str>) -> Result<()> {
    let (data, name) = read_file(path)?;
    let max = usize::try_from(settings.upload.max_size_bytes).unwrap_or(usize::MAX);
    let content_type = content_type.unwrap_or_else(|| content_type_for(&name));

    let report = FileValidator::new(max).validate(&data, &name, content_type);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_valid() {
        anyhow::bail!("{} failed {} check(s)", name, report.errors.len());
    }
    Ok(())
}
