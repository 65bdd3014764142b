use clap::{ArgAction, Parser};
use collectfast::error::{ErrorKind, Result};
use collectfast::{CollectOptions, Command, Report, target};
use collectfast_config::Settings;
use collectfast_engine::DefaultStrategyFactory;
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "collectfast", version)]
#[command(about = "Publish static files, skipping the ones the target already has", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "COLLECTFAST_CONFIG")]
    config: Option<PathBuf>,
    /// Copy everything the default way, without the copy-or-skip engine
    #[arg(long)]
    disable_collectfast: bool,
    /// Decide what would be copied without writing to the target
    #[arg(long)]
    dry_run: bool,
    /// More logging; repeat for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(report) => {
            if let Report::Engine(summary) = &report {
                for failure in &summary.failures {
                    eprintln!("failed: {}: {:?}", failure.path.display(), failure.error);
                }
                if summary.aborted {
                    eprintln!("stopped early after a failure");
                }
            }
            println!("{report}");
            if report.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        },
        Err(e) => {
            tracing::error!(error = ?e, "Nothing was published");
            ExitCode::from(2)
        },
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let default = ["collectfast", "collectfast_config", "collectfast_engine", "collectfast_storage"]
        .map(|krate| format!("{krate}={level}"))
        .join(",");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: &Cli) -> Result<Report> {
    let settings = Settings::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let cwd = std::env::current_dir().or_raise(|| ErrorKind::Config)?;
    let target = target::build(&settings.target, &cwd).await?;
    let sources = target::sources(&settings.sources, &cwd)?;
    if sources.is_empty() {
        tracing::warn!("No source directories configured");
    }
    let options = CollectOptions {
        disable_collectfast: cli.disable_collectfast,
        dry_run: cli.dry_run,
    };
    Command::new(settings, target, Arc::new(DefaultStrategyFactory)).collect(&sources, options).await
}
