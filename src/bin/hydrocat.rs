use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use hydrocat::app::{App, StationScope};
use hydrocat::client::HttpSourceClient;
use hydrocat::config::{ConfigLoader, ResolvedConfig};
use hydrocat::error::CatalogError;
use hydrocat::lines::write_tracks;
use hydrocat::output::JsonOutput;
use hydrocat::registry::SourceRegistry;
use hydrocat::store::Store;
use hydrocat::sync::SyncOptions;

#[derive(Parser)]
#[command(name = "hydrocat")]
#[command(about = "Mirror gauging-station time series and query the station catalog")]
#[command(version, author)]
struct Cli {
    /// Configuration file (defaults to $HYDROCAT_CONFIG, then ./hydrocat.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Root directory of the mirror and catalogs
    #[arg(long, global = true)]
    storage_path: Option<Utf8PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Synchronize sources and rebuild their catalogs")]
    Update(UpdateArgs),
    #[command(about = "Rebuild catalogs from the raw files on disk")]
    Build(SourceFilter),
    #[command(about = "List configured sources")]
    Sources,
    #[command(about = "Show one source")]
    Source { id: String },
    #[command(about = "Print the station catalog of a source")]
    Stations { source: String },
    #[command(about = "Show one station of a source")]
    Station(StationArgs),
    #[command(about = "Find a station in any source")]
    Find { station: String },
    #[command(about = "List the stations nearest to a station")]
    Nearby(NearbyArgs),
    #[command(about = "Convert a directory of track files into GeoJSON line strings")]
    Lines(LinesArgs),
}

#[derive(Args)]
struct SourceFilter {
    #[arg(long)]
    source: Option<String>,
}

#[derive(Args)]
struct UpdateArgs {
    #[arg(long)]
    source: Option<String>,

    /// Download every listed station, even when a local copy exists
    #[arg(long)]
    force: bool,

    /// Delete local stations no longer listed upstream
    #[arg(long)]
    clean: bool,
}

#[derive(Args)]
struct StationArgs {
    source: String,
    station: String,

    #[arg(long, value_enum, default_value_t = StationScope::Feature)]
    scope: StationScope,
}

#[derive(Args)]
struct NearbyArgs {
    station: String,

    #[arg(long)]
    limit: Option<usize>,

    /// Keep stations strictly closer than this many degrees
    #[arg(long)]
    radius: Option<f64>,
}

#[derive(Args)]
struct LinesArgs {
    /// Directory holding tab-separated `.txt` track files
    dir: Utf8PathBuf,

    #[arg(short, long)]
    output: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    if error.is_not_found() {
        return 2;
    }
    match error {
        CatalogError::Http { .. } | CatalogError::HttpStatus { .. } | CatalogError::Inventory(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    // Needs no configured sources.
    if let Commands::Lines(args) = &cli.command {
        write_tracks(&args.dir, &args.output)?;
        return Ok(());
    }

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = open_store(cli.storage_path, &resolved)?;
    let client = HttpSourceClient::new(resolved.settings.request_timeout())?;
    let app = App::new(
        SourceRegistry::from_config(&resolved),
        store,
        client,
        resolved.settings.clone(),
    );

    match cli.command {
        Commands::Update(args) => {
            let defaults = SyncOptions::from_settings(&resolved.settings);
            let options = SyncOptions {
                force_update: args.force || defaults.force_update,
                clean_deprecated: args.clean || defaults.clean_deprecated,
            };
            let result = app.update(args.source.as_deref(), options, &JsonOutput)?;
            JsonOutput::print_update(&result).into_diagnostic()
        }
        Commands::Build(args) => {
            let result = app.build(args.source.as_deref(), &JsonOutput)?;
            JsonOutput::print_build(&result).into_diagnostic()
        }
        Commands::Sources => JsonOutput::print_sources(&app.list_sources()).into_diagnostic(),
        Commands::Source { id } => JsonOutput::print_source(&app.get_source(&id)?).into_diagnostic(),
        Commands::Stations { source } => {
            JsonOutput::print_catalog(&app.list_stations(&source)?).into_diagnostic()
        }
        Commands::Station(args) => {
            let view = app.get_station(&args.source, &args.station, args.scope)?;
            JsonOutput::print_station(&view).into_diagnostic()
        }
        Commands::Find { station } => {
            JsonOutput::print_feature(&app.get_station_across_sources(&station)?).into_diagnostic()
        }
        Commands::Nearby(args) => {
            let result = app.get_nearby(&args.station, args.limit, args.radius)?;
            JsonOutput::print_catalog(&result).into_diagnostic()
        }
        Commands::Lines(_) => Ok(()),
    }
}

fn init_logging(verbose: bool, log_file: Option<&Utf8PathBuf>) -> miette::Result<()> {
    let filter = if verbose {
        EnvFilter::new("hydrocat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hydrocat=info"))
    };
    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path.as_std_path())
                .map_err(|err| CatalogError::Filesystem(format!("open log file {path}: {err}")))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer)
        .init();
    Ok(())
}

fn open_store(cli_root: Option<Utf8PathBuf>, config: &ResolvedConfig) -> Result<Store, CatalogError> {
    match cli_root.or_else(|| config.storage_path.clone()) {
        Some(root) => Ok(Store::new_with_root(root)),
        None => Store::new(),
    }
}
