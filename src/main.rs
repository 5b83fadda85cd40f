use anyhow::{Context, Result};
use clap::Parser;
use gophish_mailbox_checker::cli::{self, Checker, Cli, Commands};
use gophish_mailbox_checker::config::{Config, LoggingConfig};
use gophish_mailbox_checker::error::CheckerError;
use std::fs::OpenOptions;
use std::path::Path;
use std::process;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        eprintln!("\nFor help, run: gophish-mailbox-checker --help");
        process::exit(1);
    }
}

/// RUST_LOG wins; otherwise the configured level, or debug with --verbose
fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let crate_level = if verbose { "debug" } else { level };
        EnvFilter::new(format!(
            "gophish_mailbox_checker={},warn",
            crate_level.to_lowercase()
        ))
    })
}

/// Log to stderr and, when configured, to a file
fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) -> Result<()> {
    let level = logging.map(|l| l.level.as_str()).unwrap_or("info");
    let json = logging.map(|l| l.format == "json").unwrap_or(false);

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    layers.push(if json {
        stderr.json().boxed()
    } else {
        stderr.boxed()
    });

    if let Some(logging) = logging {
        std::fs::create_dir_all(&logging.directory).with_context(|| {
            format!("Failed to create log directory {:?}", logging.directory)
        })?;
        let path = logging.file_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {:?}", path))?;

        let file_layer = fmt::layer().with_writer(Mutex::new(file)).with_ansi(false);
        layers.push(if json {
            file_layer.json().boxed()
        } else {
            file_layer.boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(level, verbose))
        .init();
    Ok(())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { output, force } => init_config(&output, force, cli.verbose).await,
        command => {
            let config = Config::load(&cli.config).await?;
            init_logging(Some(&config.logging), cli.verbose)?;
            if cli.config.exists() {
                tracing::info!("Loaded configuration from {:?}", cli.config);
            } else {
                tracing::warn!(
                    "Config file {:?} not found, using defaults and environment overrides",
                    cli.config
                );
            }
            tracing::info!("Gophish mailbox checker starting...");
            execute(command, config).await
        }
    }
}

async fn init_config(output: &Path, force: bool, verbose: bool) -> Result<()> {
    init_logging(None, verbose)?;
    tracing::info!("Generating example configuration file");

    if output.exists() && !force {
        return Err(CheckerError::Config(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        ))
        .into());
    }

    Config::create_example(output).await?;

    println!("Created example configuration file at: {:?}", output);
    println!("\nPlease edit this file to customize your settings.");
    println!("Key settings to review:");
    println!("  - graph.tenant_id / graph.client_id: Azure app registration");
    println!("  - graph.secret_file: File holding the client secret");
    println!("  - mailbox.address: Mailbox receiving the phishing reports");
    println!("  - mailbox.folder: Folder the reports are moved into");
    Ok(())
}

async fn execute(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run { once } => cli::run(config, once).await?,

        Commands::Reset => {
            let checker = Checker::connect(config).await?;
            match checker.reset().await? {
                Some(report) => println!("Reset {} messages", report.reset),
                None => println!(
                    "Mail folder '{}' was not found",
                    checker.config().mailbox.folder
                ),
            }
        }

        Commands::Auth => {
            cli::check_auth(&config).await?;
            println!("Successfully authenticated against {}", config.graph.token_url());
        }

        Commands::InitConfig { output, force } => init_config(&output, force, false).await?,
    }
    Ok(())
}
