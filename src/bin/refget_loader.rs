use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;

use refget_loader::app::{App, LoadOptions};
use refget_loader::config::ConfigLoader;
use refget_loader::error::RefgetError;
use refget_loader::logging;
use refget_loader::output::JsonOutput;
use refget_loader::scanner::EnaSearchHttpClient;

#[derive(Parser)]
#[command(name = "refget-loader")]
#[command(about = "Load ENA assembly flatfiles into a refget object store")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Scan the configured windows, build jobs and dispatch them")]
    Load(LoadArgs),
    #[command(about = "Build the upload manifest for one processed unit")]
    Manifest(ManifestArgs),
    #[command(about = "Upload the contents of a manifest")]
    Upload(UploadArgs),
    #[command(about = "List unit status files under a processing directory")]
    Status(StatusArgs),
}

#[derive(Args)]
struct LoadArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ManifestArgs {
    processing_dir: Utf8PathBuf,
    file_id: String,
    config_file: Utf8PathBuf,
}

#[derive(Args)]
struct UploadArgs {
    #[arg(value_name = "TYPE")]
    destination_type: String,
    manifest: Utf8PathBuf,
}

#[derive(Args)]
struct StatusArgs {
    processing_dir: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RefgetError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RefgetError) -> u8 {
    match error {
        RefgetError::MissingConfig
        | RefgetError::ConfigRead(_)
        | RefgetError::ConfigParse(_)
        | RefgetError::InvalidWindow(_)
        | RefgetError::InvalidManifest(_)
        | RefgetError::MalformedRecord(_)
        | RefgetError::UnsupportedDestination(_) => 2,
        RefgetError::Transport(_)
        | RefgetError::TransportStatus { .. }
        | RefgetError::Subprocess(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(logging::stderr_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::new();

    match cli.command {
        Commands::Load(args) => {
            let config = ConfigLoader::resolve(args.config.as_deref())?;
            let client = EnaSearchHttpClient::new(config.source.search_url.as_str())?;
            let options = LoadOptions {
                dry_run: args.dry_run,
            };
            let result = app.load(&config, client, options)?;
            JsonOutput::print_load(&result).into_diagnostic()
        }
        Commands::Manifest(args) => {
            let result = app.manifest(&args.processing_dir, &args.file_id, &args.config_file)?;
            JsonOutput::print_manifest(&result).into_diagnostic()
        }
        Commands::Upload(args) => {
            let result = app.upload(&args.destination_type, &args.manifest)?;
            JsonOutput::print_upload(&result).into_diagnostic()
        }
        Commands::Status(args) => {
            let result = app.status(&args.processing_dir)?;
            JsonOutput::print_status(&result).into_diagnostic()
        }
    }
}
