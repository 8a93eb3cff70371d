use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use cyclecast::config::{AppConfig, CONFIG_KEYS};
use cyclecast::dates::{format_date, parse_user_date, today};
use cyclecast::export::{self, ExportFormat};
use cyclecast::import::csv::CsvImporter;
use cyclecast::logging::init_logging;
use cyclecast::{
    CycleEngine, CycleError, CycleEvent, CycleOutlook, CycleStatsSummary, PeriodLogStore,
    PhaseResult, SqliteStore,
};

/// cyclecast - Cycle statistics and phase prediction
///
/// Logs period start and end dates, derives average cycle and period lengths,
/// predicts the next start, and classifies any date into a cycle phase.
#[derive(Parser)]
#[command(name = "cyclecast")]
#[command(version)]
#[command(about = "Cycle statistics and phase prediction", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured database path
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    /// User scope (defaults to settings.default_user)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log the start of a period
    LogStart {
        /// Start date (YYYY-MM-DD, default: today)
        date: Option<String>,

        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Log the end of a period
    LogEnd {
        /// End date (YYYY-MM-DD, default: today)
        date: Option<String>,

        /// Start date of the period being closed (default: latest open period)
        #[arg(short, long)]
        start: Option<String>,
    },

    /// Show logged periods
    History {
        /// Number of most recent periods to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show cycle statistics and the next predicted start
    Stats {
        /// Show the last cached statistics instead of recomputing
        #[arg(long)]
        cached: bool,
    },

    /// Show the cycle phase for a date
    Phase {
        /// Target date (YYYY-MM-DD, default: today)
        date: Option<String>,
    },

    /// Show phases for a run of consecutive days
    Forecast {
        /// First day (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        from: Option<String>,

        /// Number of days
        #[arg(short, long, default_value = "28")]
        days: u32,
    },

    /// Show days until the next predicted start
    Outlook {
        /// Reference date (YYYY-MM-DD, default: today)
        date: Option<String>,
    },

    /// Import period history from a CSV file
    Import {
        /// CSV file with start_date[,end_date][,notes] columns
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Export history, statistics or a forecast
    Export {
        /// What to export
        #[arg(value_enum)]
        what: ExportKind,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (csv, json; default: from file extension)
        #[arg(short = 'f', long)]
        format: Option<String>,

        /// Forecast length in days
        #[arg(long, default_value = "28")]
        days: u32,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    History,
    Stats,
    Forecast,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Days")]
    days: String,
    #[tabled(rename = "Notes")]
    notes: String,
}

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Day")]
    day: u32,
    #[tabled(rename = "Phase")]
    phase: String,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<CycleError>() {
            Some(cycle_error) => {
                tracing::debug!(
                    severity = ?cycle_error.severity(),
                    error = %cycle_error,
                    "Command failed"
                );
                eprintln!("{}", cycle_error.user_message().red());
            }
            None => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load_or_default(cli.config.as_deref());
    init_logging(&config.logging.clone().with_verbosity(cli.verbose))?;

    if let Commands::Config { list, set, get } = &cli.command {
        return manage_config(&mut config, cli.config.clone(), *list, set.as_deref(), get.as_deref());
    }

    let user_id = cli
        .user
        .clone()
        .unwrap_or_else(|| config.settings.default_user.clone());
    let db_path = cli
        .database
        .clone()
        .unwrap_or_else(|| config.settings.database_path.clone());

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let engine = CycleEngine::new(store);

    match cli.command {
        Commands::LogStart { date, notes } => {
            let start = parse_optional_date(date.as_deref())?.unwrap_or_else(today);
            let event = engine.log_start(&user_id, start, notes)?;
            if cli.json {
                print_json(&event)?;
            } else {
                println!("{} {}", "✓ Period start logged:".green().bold(), event.start_date);
            }
        }

        Commands::LogEnd { date, start } => {
            let end = parse_optional_date(date.as_deref())?.unwrap_or_else(today);
            let start = match parse_optional_date(start.as_deref())? {
                Some(start) => start,
                None => engine.latest_open_start(&user_id)?.ok_or_else(|| {
                    CycleError::NoData {
                        user_id: user_id.clone(),
                    }
                })?,
            };
            engine.log_end(&user_id, start, end)?;
            if cli.json {
                print_json(&serde_json::json!({
                    "start_date": format_date(start),
                    "end_date": format_date(end),
                }))?;
            } else {
                println!(
                    "{} {} → {}",
                    "✓ Period end logged:".green().bold(),
                    format_date(start),
                    format_date(end)
                );
            }
        }

        Commands::History { limit } => {
            let mut events = engine.history(&user_id)?;
            if let Some(limit) = limit {
                events.truncate(limit);
            }
            if cli.json {
                print_json(&events)?;
            } else {
                print_history(&events);
            }
        }

        Commands::Stats { cached } => {
            if cached {
                match engine.store().load_stats_cache(&user_id)? {
                    Some(cached) if cli.json => print_json(&cached)?,
                    Some(cached) => {
                        println!(
                            "{}",
                            format!("Cached at {}", cached.updated_at.format("%Y-%m-%d %H:%M UTC"))
                                .dimmed()
                        );
                        print_stats(&cached.summary);
                    }
                    None => println!("{}", "No cached statistics yet.".yellow()),
                }
            } else {
                let stats = engine.get_stats(&user_id);
                if cli.json {
                    print_json(&stats)?;
                } else {
                    print_stats(&stats);
                }
            }
        }

        Commands::Phase { date } => {
            let target = parse_optional_date(date.as_deref())?;
            let result = engine.get_phase(&user_id, target)?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_phase(&result);
            }
        }

        Commands::Forecast { from, days } => {
            let start = parse_optional_date(from.as_deref())?;
            let forecast = engine.forecast(&user_id, start, days)?;
            if cli.json {
                print_json(&forecast)?;
            } else {
                print_forecast(&forecast);
            }
        }

        Commands::Outlook { date } => {
            let reference = parse_optional_date(date.as_deref())?;
            let outlook = engine.outlook(&user_id, reference)?;
            if cli.json {
                print_json(&outlook)?;
            } else {
                print_outlook(&outlook);
            }
        }

        Commands::Import { file } => {
            let report = CsvImporter::new().import_file(&file, &user_id, engine.store())?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!(
                    "{} {} inserted, {} already logged, {} rejected",
                    "✓ Import completed:".green().bold(),
                    report.inserted,
                    report.duplicates,
                    report.rejected.len()
                );
                for row in &report.rejected {
                    println!("  {} line {}: {}", "✗".red(), row.line, row.reason);
                }
            }
        }

        Commands::Export {
            what,
            output,
            format,
            days,
        } => {
            let format = match format {
                Some(format) => format.parse::<ExportFormat>().map_err(CycleError::from)?,
                None => ExportFormat::from_path(&output).unwrap_or(ExportFormat::Csv),
            };

            match what {
                ExportKind::History => {
                    export::export_history(&engine.history(&user_id)?, format, &output)
                        .map_err(CycleError::from)?
                }
                ExportKind::Stats => {
                    export::export_stats(&engine.get_stats(&user_id), format, &output)
                        .map_err(CycleError::from)?
                }
                ExportKind::Forecast => {
                    export::export_forecast(&engine.forecast(&user_id, None, days)?, format, &output)
                        .map_err(CycleError::from)?
                }
            }
            println!("{} {}", "✓ Exported to".green().bold(), output.display());
        }

        Commands::Config { .. } => unreachable!("handled before opening the database"),
    }

    Ok(())
}

fn manage_config(
    config: &mut AppConfig,
    path: Option<PathBuf>,
    list: bool,
    set: Option<&str>,
    get: Option<&str>,
) -> Result<()> {
    let path = path.unwrap_or_else(AppConfig::default_config_path);

    if let Some(key_value) = set {
        let (key, value) = key_value
            .split_once('=')
            .with_context(|| format!("Expected key=value, got '{}'", key_value))?;
        config.set(key.trim(), value.trim())?;
        config.save_to_file(&path)?;
        println!("{} {} = {}", "✓ Set".green().bold(), key.trim(), value.trim());
    } else if let Some(key) = get {
        println!("{}", config.get(key)?);
    } else if list {
        println!("{} {}", "Config file:".bold(), path.display());
        for key in CONFIG_KEYS {
            println!("  {} = {}", key.cyan(), config.get(key)?);
        }
    } else {
        println!("Use --list, --get <key> or --set <key=value>");
    }

    Ok(())
}

fn parse_optional_date(raw: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    Ok(raw.map(parse_user_date).transpose()?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_history(events: &[CycleEvent]) {
    if events.is_empty() {
        println!("{}", "No periods logged yet.".yellow());
        return;
    }

    let rows: Vec<HistoryRow> = events
        .iter()
        .map(|event| HistoryRow {
            start: event.start_date.clone(),
            end: event.end_date.clone().unwrap_or_else(|| "-".to_string()),
            days: match (event.parsed_start(), event.parsed_end()) {
                (Some(start), Some(end)) => ((end - start).num_days() + 1).to_string(),
                _ => String::new(),
            },
            notes: event.notes.clone().unwrap_or_default(),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_stats(stats: &CycleStatsSummary) {
    println!("{}", "Cycle statistics".cyan().bold());
    println!(
        "  Average cycle length: {} days ({} samples)",
        stats.rounded_cycle_length(),
        stats.cycle_samples
    );
    println!(
        "  Average period length: {} days ({} samples)",
        stats.rounded_event_duration(),
        stats.duration_samples
    );
    println!(
        "  Last period start: {}",
        stats.last_start.map(format_date).unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  Predicted next start: {}",
        stats
            .predicted_next_start
            .map(|d| format_date(d).bold().to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Confidence: {}", stats.confidence);
}

fn print_phase(result: &PhaseResult) {
    println!(
        "{} {} {}",
        result.phase.marker(),
        result.phase.name().magenta().bold(),
        format!(
            "(day {} of {}, {})",
            result.day_in_cycle,
            result.cycle_length,
            format_date(result.target_date)
        )
        .dimmed()
    );
    println!("  {}", result.phase.description());
    println!("  Confidence: {}", result.stats.confidence);
}

fn print_forecast(forecast: &[PhaseResult]) {
    let rows: Vec<ForecastRow> = forecast
        .iter()
        .map(|day| ForecastRow {
            date: format_date(day.target_date),
            day: day.day_in_cycle,
            phase: format!("{} {}", day.phase.marker(), day.phase.name()),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_outlook(outlook: &CycleOutlook) {
    let next = format_date(outlook.predicted_next_start);
    match outlook.days_until_next {
        0 => println!("Next period predicted {} ({})", "today".bold(), next),
        days if days > 0 => println!("Next period predicted in {} days ({})", days.to_string().bold(), next),
        days => println!("Next period {} days overdue (predicted {})", (-days).to_string().bold(), next),
    }
    if outlook.in_pms_window {
        println!("{}", "🌙 Within the PMS window".magenta());
    }
}
