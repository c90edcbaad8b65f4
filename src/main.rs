use std::path::PathBuf;
use std::sync::Arc;

use boxbox::analysis::{
    compare_laps, compare_sectors, format_lap_time, race_pace, rolling_pace, sector_bests,
    stint_pace_table, top_fastest_laps,
};
use boxbox::cache::{FileSessionCache, SessionStore};
use boxbox::config::AppConfig;
use boxbox::errors::BoxboxError;
use boxbox::loader::SessionLoader;
use boxbox::predictor::{DegradationPredictor, stint_records};
use boxbox::provider::openf1::OpenF1Provider;
use boxbox::session::{Session, SessionKey, SessionKind};
use boxbox::ui::{DashboardApp, Startup};
use clap::{Parser, Subcommand, ValueEnum};
use egui::Vec2;
use log::{info, warn};

type Loader = SessionLoader<OpenF1Provider, FileSessionCache>;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Cache directory, overrides the config file
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Base URL of the timing API, overrides the config file
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Skip car telemetry when fetching sessions
    #[arg(long, global = true)]
    laps_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the dashboard, optionally loading a session straight away
    Dashboard {
        #[arg(short, long)]
        year: Option<i32>,
        #[arg(short, long)]
        event: Option<String>,
        #[arg(short, long)]
        session: Option<SessionKind>,
    },
    /// Open a cached session file in the dashboard
    Open {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// List the events of a season
    Events {
        #[arg(short, long)]
        year: i32,
    },
    /// Print an analysis of one session
    Report {
        #[arg(short, long)]
        year: i32,
        #[arg(short, long)]
        event: String,
        #[arg(short, long, default_value = "Race")]
        session: SessionKind,
        #[arg(short, long)]
        driver: Option<String>,
        /// Second driver for the compare view
        #[arg(long)]
        versus: Option<String>,
        #[arg(value_enum)]
        view: ReportView,
    },
    /// Inspect or empty the session cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    List,
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReportView {
    Fastest,
    Pace,
    Sectors,
    Stints,
    Pits,
    Compare,
    Degradation,
}

fn load_config(args: &Args) -> Result<AppConfig, BoxboxError> {
    let mut config = AppConfig::from_local_file().unwrap_or_else(|e| {
        warn!("Could not read config file, using defaults: {}", e);
        AppConfig::default()
    });
    if let Some(cache_dir) = &args.cache_dir {
        config.cache_dir = Some(cache_dir.clone());
    }
    if let Some(api_url) = &args.api_url {
        config.api_base_url = api_url.clone();
    }
    if args.laps_only {
        config.load_options.telemetry = false;
        config.load_options.positions = false;
    }
    config.validate()?;
    Ok(config)
}

fn open_cache(config: &AppConfig) -> Result<FileSessionCache, BoxboxError> {
    match &config.cache_dir {
        Some(dir) => FileSessionCache::new(dir.clone()),
        None => FileSessionCache::new_default(),
    }
}

fn build_loader(config: &AppConfig) -> Result<Loader, BoxboxError> {
    let provider = OpenF1Provider::new(&config.api_base_url, config.request_timeout())?;
    Ok(SessionLoader::new(provider, open_cache(config)?, config.load_options))
}

fn dashboard(config: AppConfig, startup: Startup) -> Result<(), BoxboxError> {
    let loader = Arc::new(build_loader(&config)?);
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = native_options
        .viewport
        .with_inner_size(Vec2::new(1280., 860.))
        .with_min_inner_size(Vec2::new(800., 600.));

    eframe::run_native(
        "Boxbox",
        native_options,
        Box::new(|cc| Ok(Box::new(DashboardApp::new(cc, loader, config, startup)))),
    )
    .map_err(|e| BoxboxError::DashboardError {
        reason: e.to_string(),
    })
}

fn events(config: &AppConfig, year: i32) -> Result<(), BoxboxError> {
    let loader = build_loader(config)?;
    for event in loader.list_events(year)? {
        println!(
            "{:>2}  {:<32} {}, {}",
            event.round, event.name, event.location, event.country
        );
    }
    Ok(())
}

fn cache(config: &AppConfig, action: &CacheAction) -> Result<(), BoxboxError> {
    let store = open_cache(config)?;
    match action {
        CacheAction::List => {
            let keys = store.list()?;
            if keys.is_empty() {
                println!("No cached sessions in {}", store.root().display());
            }
            for key in keys {
                println!("{}  ->  {}", key, store.path_for(&key).display());
            }
        }
        CacheAction::Clear => {
            let removed = store.clear()?;
            println!("Removed {} cached sessions", removed);
        }
    }
    Ok(())
}

fn report(
    config: &AppConfig,
    key: SessionKey,
    driver: Option<&str>,
    versus: Option<&str>,
    view: ReportView,
) -> Result<(), BoxboxError> {
    let loader = build_loader(config)?;
    let session = loader.load(&key)?;
    info!("Loaded {} with {} laps", session.key, session.laps.len());
    println!("{}", session.key);

    match view {
        ReportView::Fastest => {
            for (i, lap) in top_fastest_laps(&session, 20).iter().enumerate() {
                println!(
                    "{:>2}. {:<4} lap {:>3}  {}",
                    i + 1,
                    lap.driver,
                    lap.lap_number,
                    format_lap_time(Some(lap.lap_time_s))
                );
            }
        }
        ReportView::Pace => match driver {
            Some(driver) => {
                for point in rolling_pace(&session, driver, config.rolling_window)? {
                    println!(
                        "lap {:>3}  {}",
                        point.lap_number,
                        format_lap_time(Some(point.average_s))
                    );
                }
            }
            None => {
                for pace in race_pace(&session) {
                    println!(
                        "{:<4} median {}  mean {}  std {:.3}  ({} laps)",
                        pace.driver,
                        format_lap_time(Some(pace.median_s)),
                        format_lap_time(Some(pace.mean_s)),
                        pace.std_dev_s,
                        pace.lap_count
                    );
                }
            }
        },
        ReportView::Sectors => match driver {
            Some(reference) => {
                for delta in compare_sectors(&session, reference)? {
                    let [s1, s2, s3] = delta.deltas_s.map(|d| {
                        d.map(|d| format!("{:+.3}", d))
                            .unwrap_or_else(|| "--".to_string())
                    });
                    println!("{:<4} {:>8} {:>8} {:>8}", delta.driver, s1, s2, s3);
                }
            }
            None => {
                for bests in sector_bests(&session) {
                    println!(
                        "{:<4} theoretical {}  best {}",
                        bests.driver,
                        format_lap_time(bests.theoretical_best_s),
                        format_lap_time(bests.best_lap_s)
                    );
                }
            }
        },
        ReportView::Stints => {
            for stint in stint_pace_table(&session)
                .into_iter()
                .filter(|s| driver.is_none_or(|d| s.driver == d))
            {
                println!(
                    "{:<4} stint {} {:<12} laps {:>3}-{:<3} median {}",
                    stint.driver,
                    stint.stint,
                    stint.compound.to_string(),
                    stint.start_lap,
                    stint.end_lap,
                    format_lap_time(Some(stint.median_s))
                );
            }
        }
        ReportView::Pits => {
            for stop in boxbox::analysis::all_pit_stops(&session)
                .into_iter()
                .filter(|s| driver.is_none_or(|d| s.driver == d))
            {
                println!(
                    "{:<4} lap {:>3}  {} -> {}  delta {}",
                    stop.driver,
                    stop.in_lap,
                    stop.compound_before,
                    stop.compound_after,
                    stop.delta_s
                        .map(|d| format!("{:.3}s", d))
                        .unwrap_or_else(|| "--".to_string())
                );
            }
        }
        ReportView::Compare => {
            let (Some(a), Some(b)) = (driver, versus) else {
                return Err(BoxboxError::InvalidUserInput {
                    field: "driver".to_string(),
                    reason: "compare needs --driver and --versus".to_string(),
                });
            };
            let comparison = compare_laps(&session, a, b)?;
            for lap in comparison.laps {
                println!(
                    "lap {:>3}  {} {}  {} {}  delta {:+.3}  gap {:+.3}",
                    lap.lap_number,
                    a,
                    format_lap_time(Some(lap.time_a_s)),
                    b,
                    format_lap_time(Some(lap.time_b_s)),
                    lap.delta_s,
                    lap.gap_s
                );
            }
        }
        ReportView::Degradation => degradation(&session)?,
    }
    Ok(())
}

fn degradation(session: &Session) -> Result<(), BoxboxError> {
    let records = stint_records(session);
    let predictor = DegradationPredictor::train(&records)?;
    let temp = records
        .first()
        .map(|r| r.ambient_temp_c)
        .unwrap_or_default();
    for compound in predictor.compounds() {
        let slope = predictor.predict(compound, &session.key.event, temp)?;
        println!("{:<12} {:+.3} s/lap at {:.1} °C", compound.to_string(), slope, temp);
    }
    Ok(())
}

fn run(args: &Args) -> Result<(), BoxboxError> {
    let config = load_config(args)?;
    match &args.command {
        Commands::Dashboard {
            year,
            event,
            session,
        } => {
            let startup = match (year, event) {
                (Some(year), Some(event)) => Startup::Session(SessionKey::new(
                    *year,
                    event.clone(),
                    session.unwrap_or(SessionKind::Race),
                )),
                _ => Startup::Nothing,
            };
            dashboard(config, startup)
        }
        Commands::Open { input } => {
            if !input.exists() {
                return Err(BoxboxError::InvalidSessionFile {
                    path: input.display().to_string(),
                });
            }
            dashboard(config, Startup::File(input.clone()))
        }
        Commands::Events { year } => events(&config, *year),
        Commands::Report {
            year,
            event,
            session,
            driver,
            versus,
            view,
        } => report(
            &config,
            SessionKey::new(*year, event.clone(), *session),
            driver.as_deref(),
            versus.as_deref(),
            *view,
        ),
        Commands::Cache { action } => cache(&config, action),
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let args = Args::parse();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
