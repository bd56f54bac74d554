use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use std::io::{self, Write};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use weightrs::config::AppConfig;
use weightrs::database::Database;
use weightrs::error::WeightRsError;
use weightrs::export::{self, default_export_filename, ExportFormat};
use weightrs::import::{csv::read_csv_file, DuplicatePolicy, ImportEngine, ImportReport};
use weightrs::logging::{init_logging, LogFormat, LogLevel};
use weightrs::models::{
    parse_date, validate_weight, Measurement, MeasurementInput, HEIGHT_KEY, TARGET_WEIGHT_KEY,
};
use weightrs::stats::{bmi, filter_by_period, StatsCalculator};
use weightrs::validation::{MeasurementValidator, Severity, ValidationReport};

/// WeightRS - personal weight tracking CLI
///
/// Records daily body weight and body-fat measurements, screens new entries
/// against recent history and summarizes trends.
#[derive(Parser)]
#[command(name = "weightrs")]
#[command(version)]
#[command(about = "Personal weight tracking CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the config file)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format (pretty, json, compact)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a measurement (replaces an existing one on the same date)
    Add {
        /// Body weight in kg
        weight: f64,

        /// Body-fat percentage
        #[arg(short = 'f', long)]
        body_fat: Option<f64>,

        /// Measurement date (default: today)
        #[arg(short, long)]
        date: Option<String>,

        /// Save even if validation reports errors
        #[arg(long)]
        force: bool,
    },

    /// List measurements
    Show {
        /// Number of most recent records to show
        #[arg(short, long, conflicts_with_all = ["period", "all"])]
        limit: Option<usize>,

        /// Calendar days back from the latest record
        #[arg(short, long, conflicts_with = "all")]
        period: Option<u32>,

        /// Show the full history
        #[arg(short, long)]
        all: bool,
    },

    /// Summary statistics over the most recent records
    Stats {
        /// Number of most recent records to summarize
        #[arg(short, long)]
        window: Option<usize>,
    },

    /// Moving-average table
    Trend {
        /// Calendar days back from the latest record
        #[arg(short, long)]
        period: Option<u32>,

        /// Moving average period in records
        #[arg(long)]
        ma: Option<usize>,
    },

    /// Run the validation checks without saving
    Check {
        /// Body weight in kg
        weight: f64,

        /// Body-fat percentage
        #[arg(short = 'f', long)]
        body_fat: Option<f64>,

        /// Measurement date (default: today)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Change the values of a stored measurement
    Edit {
        /// Measurement id
        id: i64,

        /// New weight in kg
        #[arg(short, long)]
        weight: Option<f64>,

        /// New body-fat percentage
        #[arg(short = 'f', long, conflicts_with = "clear_body_fat")]
        body_fat: Option<f64>,

        /// Remove the body-fat value
        #[arg(long)]
        clear_body_fat: bool,

        /// Save even if validation reports errors
        #[arg(long)]
        force: bool,
    },

    /// Delete a measurement
    Delete {
        /// Measurement id
        id: i64,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Import measurements from a CSV file
    Import {
        /// CSV file with at least date and weight columns
        file: PathBuf,

        /// What to do with dates that are already stored
        #[arg(long, value_enum)]
        on_duplicate: Option<DuplicatePolicy>,

        /// Validate and report without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Export the full history
    Export {
        /// Output file (default: weight_data_YYYYMMDD.<ext>)
        file: Option<PathBuf>,

        /// Export format (guessed from the file extension if omitted)
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,
    },

    /// Show progress toward the target weight
    Goal {
        /// Set a new target weight in kg
        #[arg(long)]
        set: Option<f64>,
    },

    /// Manage stored settings (target_weight, height)
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Database and configuration information
    Info,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// List all settings
    List,
    /// Print one setting
    Get { key: String },
    /// Store a setting
    Set { key: String, value: f64 },
}

struct App {
    config: AppConfig,
    config_path: PathBuf,
    db: Database,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<WeightRsError>() {
            Some(err) => eprintln!("{} {}", "Error:".red().bold(), err.user_message()),
            None => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let config = if cli.config.is_some() {
        AppConfig::load_from_file(&config_path)
            .map_err(|e| WeightRsError::Configuration(format!("{:#}", e)))?
    } else {
        AppConfig::load_or_default_from(&config_path)
    };

    let mut log_config = config.logging.clone();
    log_config.level = LogLevel::from_verbosity(log_config.level, cli.verbose);
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    init_logging(&log_config)?;

    let db_path = cli.db.clone().unwrap_or_else(|| config.database.path.clone());
    let db = Database::open(&db_path).map_err(WeightRsError::from)?;

    let ctx = App {
        config,
        config_path,
        db,
    };

    match cli.command {
        Commands::Add {
            weight,
            body_fat,
            date,
            force,
        } => cmd_add(&ctx, weight, body_fat, date.as_deref(), force),
        Commands::Show { limit, period, all } => cmd_show(&ctx, limit, period, all),
        Commands::Stats { window } => cmd_stats(&ctx, window),
        Commands::Trend { period, ma } => cmd_trend(&ctx, period, ma),
        Commands::Check {
            weight,
            body_fat,
            date,
        } => cmd_check(&ctx, weight, body_fat, date.as_deref()),
        Commands::Edit {
            id,
            weight,
            body_fat,
            clear_body_fat,
            force,
        } => cmd_edit(&ctx, id, weight, body_fat, clear_body_fat, force),
        Commands::Delete { id, yes } => cmd_delete(&ctx, id, yes),
        Commands::Import {
            file,
            on_duplicate,
            dry_run,
            no_progress,
        } => cmd_import(&ctx, file, on_duplicate, dry_run, no_progress),
        Commands::Export { file, format } => cmd_export(&ctx, file, format),
        Commands::Goal { set } => cmd_goal(&ctx, set),
        Commands::Settings { action } => cmd_settings(&ctx, action),
        Commands::Info => cmd_info(&ctx),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Build a candidate from CLI arguments, rejecting out-of-range values
fn candidate(weight: f64, body_fat: Option<f64>, date: Option<&str>) -> Result<MeasurementInput> {
    let date = match date {
        Some(value) => parse_date(value).map_err(WeightRsError::from)?,
        None => today(),
    };
    let input = MeasurementInput::new(date, weight, body_fat);
    input.validate(today()).map_err(WeightRsError::from)?;
    Ok(input)
}

fn screen(ctx: &App, input: &MeasurementInput) -> Result<ValidationReport> {
    let validator = MeasurementValidator::with_config(&ctx.db, ctx.config.validation.clone());
    Ok(validator.validate(input).map_err(WeightRsError::from)?)
}

fn cmd_add(
    ctx: &App,
    weight: f64,
    body_fat: Option<f64>,
    date: Option<&str>,
    force: bool,
) -> Result<()> {
    let input = candidate(weight, body_fat, date)?;
    let report = screen(ctx, &input)?;
    print_report(&report);

    if report.has_errors() && !force && !confirm("Save this measurement anyway?")? {
        println!("{}", "Measurement not saved".yellow());
        return Ok(());
    }

    let existed = ctx.db.get_by_date(input.date)?.is_some();
    let stored = ctx.db.upsert(input.date, input.weight, input.body_fat)?;

    let verb = if existed { "Updated" } else { "Saved" };
    println!(
        "{} {} {:.1} kg{} (id {})",
        format!("✓ {}", verb).green().bold(),
        stored.date,
        stored.weight,
        stored
            .body_fat
            .map(|bf| format!(", {:.1}% body fat", bf))
            .unwrap_or_default(),
        stored.id
    );

    let target = ctx.db.target_weight()?;
    println!(
        "  {:+.1} kg to target ({:.1} kg)",
        stored.weight - target,
        target
    );
    Ok(())
}

fn cmd_check(ctx: &App, weight: f64, body_fat: Option<f64>, date: Option<&str>) -> Result<()> {
    let input = candidate(weight, body_fat, date)?;
    let report = screen(ctx, &input)?;

    if report.is_empty() {
        println!("{}", "✓ No findings".green());
    } else {
        print_report(&report);
    }

    let summary = report.summary();
    println!(
        "{} findings: {} error, {} warning, {} info",
        summary.total, summary.error, summary.warning, summary.info
    );
    Ok(())
}

fn cmd_edit(
    ctx: &App,
    id: i64,
    weight: Option<f64>,
    body_fat: Option<f64>,
    clear_body_fat: bool,
    force: bool,
) -> Result<()> {
    let Some(current) = ctx.db.get_by_id(id)? else {
        println!("{}", format!("No measurement with id {}", id).yellow());
        return Ok(());
    };

    let body_fat = if clear_body_fat {
        None
    } else {
        body_fat.or(current.body_fat)
    };
    let input = MeasurementInput::new(current.date, weight.unwrap_or(current.weight), body_fat);
    input.validate(today()).map_err(WeightRsError::from)?;

    let report = screen(ctx, &input)?;
    print_report(&report);
    if report.has_errors() && !force && !confirm("Save this change anyway?")? {
        println!("{}", "Measurement not changed".yellow());
        return Ok(());
    }

    if ctx.db.update(id, input.weight, input.body_fat)? {
        println!("{} measurement {}", "✓ Updated".green().bold(), id);
    } else {
        println!("{}", format!("No measurement with id {}", id).yellow());
    }
    Ok(())
}

fn cmd_delete(ctx: &App, id: i64, yes: bool) -> Result<()> {
    let Some(current) = ctx.db.get_by_id(id)? else {
        println!("{}", format!("No measurement with id {}", id).yellow());
        return Ok(());
    };

    let prompt = format!("Delete {} ({:.1} kg)?", current.date, current.weight);
    if !yes && !confirm(&prompt)? {
        println!("Nothing deleted");
        return Ok(());
    }

    if ctx.db.delete(id)? {
        println!("{} measurement {}", "✓ Deleted".green().bold(), id);
    }
    Ok(())
}

#[derive(Tabled)]
struct MeasurementRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Date")]
    date: NaiveDate,
    #[tabled(rename = "Weight (kg)")]
    weight: String,
    #[tabled(rename = "Body fat (%)")]
    body_fat: String,
    #[tabled(rename = "BMI")]
    bmi: String,
}

fn cmd_show(ctx: &App, limit: Option<usize>, period: Option<u32>, all: bool) -> Result<()> {
    let history = match limit {
        Some(limit) => ctx.db.get_recent(Some(limit))?,
        None => {
            let period = if all {
                None
            } else {
                period.or(ctx.config.display.default_period_days)
            };
            let history = ctx.db.get_recent(None)?;
            filter_by_period(&history, period).into_iter().cloned().collect()
        }
    };

    if history.is_empty() {
        println!("{}", "No measurements yet".yellow());
        return Ok(());
    }

    let height = ctx.db.height()?;
    let rows: Vec<MeasurementRow> = history
        .iter()
        .map(|m| MeasurementRow {
            id: m.id,
            date: m.date,
            weight: format!("{:.1}", m.weight),
            body_fat: format_optional(m.body_fat),
            bmi: format_optional(bmi(m.weight, height)),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{} records", history.len());
    Ok(())
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl MetricRow {
    fn new(metric: &str, value: impl Into<String>) -> Self {
        Self {
            metric: metric.to_string(),
            value: value.into(),
        }
    }
}

fn cmd_stats(ctx: &App, window: Option<usize>) -> Result<()> {
    let window = window.unwrap_or(ctx.config.display.stats_window);
    let Some(summary) = ctx.db.compute_stats(window)? else {
        println!("{}", "No measurements yet".yellow());
        return Ok(());
    };

    let mut rows = vec![
        MetricRow::new("Records", summary.count.to_string()),
        MetricRow::new(
            "Period",
            format!("{} to {}", summary.first_date, summary.last_date),
        ),
        MetricRow::new("Average weight", format!("{:.1} kg", summary.weight_avg)),
        MetricRow::new("Max weight", format!("{:.1} kg", summary.weight_max)),
        MetricRow::new("Min weight", format!("{:.1} kg", summary.weight_min)),
        MetricRow::new("Latest weight", format!("{:.1} kg", summary.weight_latest)),
        MetricRow::new("Change", format!("{:+.1} kg", summary.weight_change)),
        MetricRow::new("Trend", summary.trend.to_string()),
    ];

    if let Some(bf) = &summary.body_fat {
        rows.push(MetricRow::new("Average body fat", format!("{:.1} %", bf.avg)));
        rows.push(MetricRow::new(
            "Body fat range",
            format!("{:.1} - {:.1} %", bf.min, bf.max),
        ));
        rows.push(MetricRow::new("Latest body fat", format!("{:.1} %", bf.latest)));
    }

    if let Some(value) = bmi(summary.weight_latest, ctx.db.height()?) {
        rows.push(MetricRow::new("BMI", format!("{:.1}", value)));
    }

    let recent = ctx.db.get_recent(Some(window))?;
    if let Some(recommended) = StatsCalculator::recommended_values(&recent) {
        rows.push(MetricRow::new(
            "Suggested next entry",
            format!(
                "{:.1} kg{}",
                recommended.weight,
                recommended
                    .body_fat
                    .map(|bf| format!(", {:.1} %", bf))
                    .unwrap_or_default()
            ),
        ));
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", format!("Statistics (last {} records)", window).cyan().bold());
    println!("{table}");
    Ok(())
}

#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Date")]
    date: NaiveDate,
    #[tabled(rename = "Weight (kg)")]
    weight: String,
    #[tabled(rename = "Moving avg")]
    weight_ma: String,
    #[tabled(rename = "Body fat (%)")]
    body_fat: String,
    #[tabled(rename = "Body fat avg")]
    body_fat_ma: String,
}

fn cmd_trend(ctx: &App, period: Option<u32>, ma: Option<usize>) -> Result<()> {
    let period = period.or(ctx.config.display.default_period_days);
    let ma_period = ma.unwrap_or(ctx.config.display.moving_average_period);

    let history = ctx.db.get_recent(None)?;
    let window: Vec<Measurement> = filter_by_period(&history, period)
        .into_iter()
        .cloned()
        .collect();
    if window.is_empty() {
        println!("{}", "No measurements yet".yellow());
        return Ok(());
    }

    let rows: Vec<TrendRow> = StatsCalculator::moving_average(&window, ma_period)
        .into_iter()
        .map(|p| TrendRow {
            date: p.date,
            weight: format!("{:.1}", p.weight),
            weight_ma: format!("{:.2}", p.weight_ma),
            body_fat: format_optional(p.body_fat),
            body_fat_ma: p.body_fat_ma.map(|v| format!("{:.2}", v)).unwrap_or_default(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!(
        "{}",
        format!("{}-record moving average", ma_period).cyan().bold()
    );
    println!("{table}");

    if let Some(summary) = StatsCalculator::summarize(&window) {
        println!(
            "Trend: {} ({:+.1} kg over {} records)",
            summary.trend, summary.weight_change, summary.count
        );
    }
    Ok(())
}

fn cmd_import(
    ctx: &App,
    file: PathBuf,
    on_duplicate: Option<DuplicatePolicy>,
    dry_run: bool,
    no_progress: bool,
) -> Result<()> {
    let rows = read_csv_file(&file).map_err(WeightRsError::from)?;
    println!(
        "{} {} rows from {}",
        "Read".cyan().bold(),
        rows.len(),
        file.display()
    );

    let engine = ImportEngine::new(&ctx.db)
        .with_progress(ctx.config.import.show_progress && !no_progress && !dry_run);

    if dry_run {
        let preview = engine.preview(&rows)?;
        println!("  valid:      {}", preview.valid.len());
        println!("  invalid:    {}", preview.errors.len());
        println!("  duplicates: {}", preview.duplicate_rows);
        for error in &preview.errors {
            println!("  {} line {}: {}", "✗".red(), error.line, error.reason);
        }
        println!("{}", "Dry run, nothing written".yellow());
        return Ok(());
    }

    let policy = on_duplicate.unwrap_or(ctx.config.import.duplicate_policy);
    let report = engine.import_batch(&rows, policy)?;
    print_import_report(&report);
    Ok(())
}

fn print_import_report(report: &ImportReport) {
    let rows = vec![
        MetricRow::new("Inserted", report.inserted.to_string()),
        MetricRow::new("Updated", report.updated.to_string()),
        MetricRow::new("Skipped", report.skipped.to_string()),
        MetricRow::new("Failed", report.failed.to_string()),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for error in &report.errors {
        println!("  {} line {}: {}", "✗".red(), error.line, error.reason);
    }

    if report.failed == 0 {
        println!("{}", "✓ Import completed".green().bold());
    } else {
        println!(
            "{}",
            format!("Import completed with {} failed rows", report.failed).yellow()
        );
    }
}

fn cmd_export(ctx: &App, file: Option<PathBuf>, format: Option<ExportFormat>) -> Result<()> {
    let format = format
        .or_else(|| file.as_deref().and_then(ExportFormat::from_path))
        .unwrap_or_default();
    let file = file.unwrap_or_else(|| PathBuf::from(default_export_filename(today(), format)));

    let history = ctx.db.get_recent(None)?;
    let written = export::export_to_path(&history, &file, format)
        .map_err(WeightRsError::from)
        .with_context(|| format!("Failed to export to {}", file.display()))?;

    println!(
        "{} {} records to {}",
        "✓ Exported".green().bold(),
        written,
        file.display()
    );
    Ok(())
}

fn cmd_goal(ctx: &App, set: Option<f64>) -> Result<()> {
    if let Some(target) = set {
        validate_weight(target).map_err(WeightRsError::from)?;
        ctx.db.set_setting(TARGET_WEIGHT_KEY, target)?;
        println!("{} target weight {:.1} kg", "✓ Set".green().bold(), target);
    }

    let target = ctx.db.target_weight()?;
    let history = ctx.db.get_recent(None)?;
    let Some(progress) =
        StatsCalculator::goal_progress(&history, target, ctx.config.display.goal_period_days)
    else {
        println!("Target weight: {:.1} kg (no measurements yet)", target);
        return Ok(());
    };

    let rows = vec![
        MetricRow::new("Target", format!("{:.1} kg", progress.target_weight)),
        MetricRow::new("Current", format!("{:.1} kg", progress.current_weight)),
        MetricRow::new(
            &format!("Start ({} days ago)", ctx.config.display.goal_period_days),
            format!("{:.1} kg", progress.start_weight),
        ),
        MetricRow::new("Remaining", format!("{:+.1} kg", progress.remaining)),
        MetricRow::new("Progress", format!("{:.0} %", progress.progress * 100.0)),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if progress.achieved {
        println!("{}", "✓ Target reached".green().bold());
    }
    Ok(())
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: f64,
    #[tabled(rename = "Updated")]
    updated_at: String,
}

fn cmd_settings(ctx: &App, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::List => {
            let rows: Vec<SettingRow> = ctx
                .db
                .list_settings()?
                .into_iter()
                .map(|s| SettingRow {
                    key: s.key,
                    value: s.value,
                    updated_at: s.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        SettingsAction::Get { key } => match ctx.db.get_setting(&key)? {
            Some(value) => println!("{} = {}", key, value),
            None => println!("{}", format!("{} is not set", key).yellow()),
        },
        SettingsAction::Set { key, value } => {
            match key.as_str() {
                TARGET_WEIGHT_KEY => validate_weight(value).map_err(WeightRsError::from)?,
                HEIGHT_KEY if !(50.0..=250.0).contains(&value) => {
                    anyhow::bail!("height must be between 50cm and 250cm, got {}cm", value)
                }
                _ => {}
            }
            ctx.db.set_setting(&key, value)?;
            println!("{} {} = {}", "✓ Set".green().bold(), key, value);
        }
    }
    Ok(())
}

fn cmd_info(ctx: &App) -> Result<()> {
    let stats = ctx.db.get_stats()?;
    let range = match (stats.first_date, stats.last_date) {
        (Some(first), Some(last)) => format!("{} to {}", first, last),
        _ => "-".to_string(),
    };

    let rows = vec![
        MetricRow::new("Database", stats.path.display().to_string()),
        MetricRow::new("Config", ctx.config_path.display().to_string()),
        MetricRow::new("Measurements", stats.measurement_count.to_string()),
        MetricRow::new("Settings", stats.settings_count.to_string()),
        MetricRow::new("Date range", range),
        MetricRow::new("Version", env!("CARGO_PKG_VERSION")),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn print_report(report: &ValidationReport) {
    for (category, finding) in report.findings() {
        let label = match finding.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warning => "WARN ".yellow().bold(),
            Severity::Info => "INFO ".blue(),
        };
        println!("{} [{}] {}", label, category.label(), finding.message);
        if let Some(suggestion) = &finding.suggestion {
            println!("        {}", suggestion.dimmed());
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_default()
}
