//! Tasman CLI binary.
//!
//! Builds the point-in-time universe, the aggregate index and the monthly
//! volatility panel from CSV feeds.

mod config;
mod logging;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use config::{Overrides, PipelineConfig};
use indicatif::{ProgressBar, ProgressStyle};
use logging::{LogFormat, init_logging};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tasman::data::feed::{load_panel, read_records_from_path};
use tasman::data::{Frequency, MembershipRecord, SecurityPanel};
use tasman::output::{
    ExportFormat, Exporter, IndexSummary, RunSummary, UniverseSummary, VolatilitySummary,
    ambiguous_rows, write_entity_list,
};
use tasman::risk::{
    AggregateReturnBuilder, AggregateReturnPoint, AggregateSeries, EntityVolatilityBuilder,
    VolatilityForecaster, VolatilityTable,
};
use tasman::universe::SectorBreakdown;
use tasman::{GicsSector, UniverseRun, UniverseSelector};
use tracing::info;

#[derive(Parser)]
#[command(name = "tasman")]
#[command(about = "Tasman: point-in-time universe and index volatility", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log format (pretty, json or compact)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    /// Output format (csv, json or pretty-json)
    #[arg(long, global = true, default_value = "csv")]
    format: String,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OverrideArgs {
    /// Maximum entities admitted per month
    #[arg(long, global = true)]
    target_size: Option<usize>,

    /// Exclusive end of the forecast evaluation window
    #[arg(long, global = true)]
    test_end: Option<NaiveDate>,

    /// Forecast horizon in trading days
    #[arg(long, global = true)]
    horizon: Option<usize>,

    /// Run forecast steps one at a time
    #[arg(long, global = true)]
    sequential: bool,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            target_size: args.target_size,
            test_end: args.test_end,
            horizon: args.horizon,
            sequential: args.sequential,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the monthly membership table from a monthly feed
    Universe {
        /// Monthly security feed (CSV)
        #[arg(long)]
        feed: PathBuf,

        /// Membership table output
        #[arg(long)]
        out: PathBuf,

        /// Print the sector breakdown of the last holding month
        #[arg(long)]
        sectors: bool,
    },

    /// Build the value-weighted aggregate return series
    Index {
        /// Security feed (CSV), usually daily
        #[arg(long)]
        feed: PathBuf,

        /// Feed frequency (daily or monthly)
        #[arg(long, default_value = "daily")]
        frequency: String,

        /// Membership table (CSV)
        #[arg(long)]
        membership: PathBuf,

        /// Aggregate series output
        #[arg(long)]
        out: PathBuf,
    },

    /// Walk-forward GARCH(1,1) volatility forecast of an aggregate series
    Volatility {
        /// Aggregate return series (CSV)
        #[arg(long)]
        index: PathBuf,

        /// First day of the evaluation window
        #[arg(long)]
        train_end: NaiveDate,

        /// Volatility table output
        #[arg(long)]
        out: PathBuf,
    },

    /// Per-entity monthly volatility for held entities
    EntityVol {
        /// Daily security feed (CSV)
        #[arg(long)]
        feed: PathBuf,

        /// Membership table (CSV)
        #[arg(long)]
        membership: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },

    /// Run every stage
    Run {
        /// Monthly security feed (CSV)
        #[arg(long)]
        monthly: PathBuf,

        /// Daily security feed (CSV)
        #[arg(long)]
        daily: PathBuf,

        /// First day of the evaluation window
        #[arg(long)]
        train_end: NaiveDate,

        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let overrides = Overrides::from(cli.overrides);
    let config = PipelineConfig::resolve(cli.config.as_deref(), &overrides)?;
    let format: ExportFormat = cli.format.parse()?;

    match cli.command {
        Commands::Universe { feed, out, sectors } => {
            let panel = load_panel(&feed, Frequency::Monthly)?;
            let universe = build_universe(&panel, &config)?;
            let records = universe.records();
            records.export_to_file(&out, format)?;

            if sectors {
                print_sector_breakdown(&universe);
            }
            print_summary(&RunSummary {
                universe: Some(universe_summary(&universe)),
                ..Default::default()
            });
        }
        Commands::Index {
            feed,
            frequency,
            membership,
            out,
        } => {
            let frequency = parse_frequency(&frequency)?;
            let panel = load_panel(&feed, frequency)?;
            let records: Vec<MembershipRecord> = read_records_from_path(&membership)?;
            let series = AggregateReturnBuilder::new().aggregate(&panel, &records);
            series.export_to_file(&out, format)?;
            let ambiguous = out.with_extension(format!("ambiguous.{}", format.extension()));
            write_ambiguous(&series, &ambiguous, format)?;

            print_summary(&RunSummary {
                index: Some(IndexSummary::from_series(&series)),
                ..Default::default()
            });
        }
        Commands::Volatility {
            index,
            train_end,
            out,
        } => {
            let points: Vec<AggregateReturnPoint> = read_records_from_path(&index)?;
            let table = forecast(&points, train_end, &config)?;
            table.export_to_file(&out, format)?;

            print_summary(&RunSummary {
                volatility: Some(VolatilitySummary::from_table(&table)),
                ..Default::default()
            });
        }
        Commands::EntityVol {
            feed,
            membership,
            out,
        } => {
            let panel = load_panel(&feed, Frequency::Daily)?;
            let records: Vec<MembershipRecord> = read_records_from_path(&membership)?;
            fs::create_dir_all(&out)?;
            entity_volatility(&panel, &records, &config, &out, format)?;
        }
        Commands::Run {
            monthly,
            daily,
            train_end,
            out_dir,
        } => {
            fs::create_dir_all(&out_dir)?;
            let output = |name: &str| out_dir.join(format!("{name}.{}", format.extension()));

            let monthly = load_panel(&monthly, Frequency::Monthly)?;
            let universe = build_universe(&monthly, &config)?;
            let records = universe.records();
            records.export_to_file(&output("membership"), format)?;
            write_entity_list(&out_dir.join("entities.txt"), &records)?;

            let daily = load_panel(&daily, Frequency::Daily)?;
            let series = AggregateReturnBuilder::new().aggregate(&daily, &records);
            series.export_to_file(&output("index"), format)?;
            write_ambiguous(&series, &output("ambiguous"), format)?;

            let table = forecast(&series.points, train_end, &config)?;
            table.export_to_file(&output("volatility"), format)?;

            entity_volatility(&daily, &records, &config, &out_dir, format)?;

            info!(out_dir = %out_dir.display(), "Pipeline finished");
            print_summary(&RunSummary {
                universe: Some(universe_summary(&universe)),
                index: Some(IndexSummary::from_series(&series)),
                volatility: Some(VolatilitySummary::from_table(&table)),
            });
        }
    }

    Ok(())
}

fn progress_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("█▓░"))
}

fn build_universe(
    panel: &SecurityPanel,
    config: &PipelineConfig,
) -> Result<UniverseRun, Box<dyn std::error::Error>> {
    let selector = UniverseSelector::new(config.universe.clone())?;

    let pb = ProgressBar::new(panel.dates().count() as u64);
    pb.set_style(progress_style()?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Selecting universe...");

    let universe = selector.select_all_with(panel, |month| {
        pb.set_message(format!("Formation {month}"));
        pb.inc(1);
    });

    pb.finish_with_message(format!(
        "Selected {} months ({} rows, {} failed)",
        universe.memberships.len(),
        universe.record_count(),
        universe.failures.len()
    ));
    Ok(universe)
}

fn forecast(
    points: &[AggregateReturnPoint],
    train_end: NaiveDate,
    config: &PipelineConfig,
) -> Result<VolatilityTable, Box<dyn std::error::Error>> {
    let forecaster = VolatilityForecaster::new(config.forecast.clone())?;

    let pb = ProgressBar::new(0);
    pb.set_style(progress_style()?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Fitting walk-forward steps...");

    let result = forecaster.forecast_with(points, train_end, |step, total| {
        pb.set_length(total as u64);
        pb.set_message(format!("Month {}", step.month));
        pb.inc(1);
    });

    match result {
        Ok(table) => {
            pb.finish_with_message(format!(
                "Forecast {} months ({} failed)",
                table.len(),
                table.failed_months().len()
            ));
            Ok(table)
        }
        Err(e) => {
            pb.finish_with_message("Failed!");
            Err(e.into())
        }
    }
}

fn entity_volatility(
    daily: &SecurityPanel,
    records: &[MembershipRecord],
    config: &PipelineConfig,
    dir: &Path,
    format: ExportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let builder = EntityVolatilityBuilder::new(config.entity_volatility.clone());
    let monthly = builder.monthly(daily, records);
    let previous = builder.previous_month(daily, records);

    monthly.export_to_file(
        &dir.join(format!("entity_volatility.{}", format.extension())),
        format,
    )?;
    previous.export_to_file(
        &dir.join(format!("entity_volatility_previous.{}", format.extension())),
        format,
    )?;

    println!(
        "Entity volatility: {} monthly records, {} previous-month records",
        monthly.records.len(),
        previous.records.len()
    );
    Ok(())
}

fn write_ambiguous(
    series: &AggregateSeries,
    path: &Path,
    format: ExportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if series.ambiguous.is_empty() {
        return Ok(());
    }
    ambiguous_rows(&series.ambiguous).export_to_file(path, format)?;
    println!(
        "Excluded {} ambiguous (entity, date) pairs, see {}",
        series.ambiguous.len(),
        path.display()
    );
    Ok(())
}

fn universe_summary(universe: &UniverseRun) -> UniverseSummary {
    let failed = universe
        .failures
        .iter()
        .map(|f| f.formation_month)
        .collect();
    UniverseSummary::from_records(&universe.records(), failed)
}

fn print_summary(summary: &RunSummary) {
    print!("{}", summary.to_ascii_table());
}

fn print_sector_breakdown(universe: &UniverseRun) {
    let Some((records, first)) = universe
        .memberships
        .values()
        .rev()
        .find_map(|records| Some((records, records.first()?)))
    else {
        println!("No holding months.");
        return;
    };
    let breakdown = SectorBreakdown::from_records(records);
    let weights = breakdown.cap_weights();

    println!("\nSector Breakdown ({})", first.holding_month);
    println!("================================\n");
    for sector in GicsSector::ALL {
        let weight = weights.get(&sector).copied().unwrap_or(0.0);
        println!(
            "  {:30} {:4} {:>7.2}%",
            sector.name(),
            breakdown.count(sector),
            weight * 100.0
        );
    }
    if breakdown.unclassified > 0 {
        println!("  {:30} {:4}", "Unclassified", breakdown.unclassified);
    }
}

fn parse_frequency(name: &str) -> Result<Frequency, Box<dyn std::error::Error>> {
    match name.to_lowercase().as_str() {
        "daily" | "d" => Ok(Frequency::Daily),
        "monthly" | "m" => Ok(Frequency::Monthly),
        _ => Err(format!("Unknown frequency: {name}").into()),
    }
}
