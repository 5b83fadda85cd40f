//! Command-line interface and cycle orchestration

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::classifier::MessageClassifier;
use crate::client::{GraphClient, GraphMailbox, MailboxClient};
use crate::config::Config;
use crate::error::{CheckerError, Result};
use crate::mailbox::MailboxProvisioner;
use crate::report::{HttpReportSender, ReportSender};
use crate::runner::{default_worker_count, BatchRunner, RunReport};

#[derive(Parser, Debug)]
#[command(name = "gophish-mailbox-checker")]
#[command(version)]
#[command(
    about = "Reports Gophish phishing simulations found in a Microsoft 365 mailbox",
    long_about = None
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the reports folder, once or on an interval
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Reset flagged messages in the reports folder to unread and unflagged
    Reset,

    /// Acquire an access token to verify the app registration
    Auth,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Shared HTTP client for the identity, mail and callback endpoints
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .map_err(|e| CheckerError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Acquire a token without touching the mailbox
pub async fn check_auth(config: &Config) -> Result<()> {
    config.require_identity()?;
    let auth = Authenticator::new(http_client()?, &config.graph);
    let token = auth.acquire_token().await?;
    info!(
        "Token acquired from {} (expires in {:?} seconds)",
        auth.token_url(),
        token.expires_in
    );
    Ok(())
}

/// Everything one cycle needs, wired from the configuration
pub struct Checker {
    config: Config,
    provisioner: MailboxProvisioner,
    runner: BatchRunner,
}

impl Checker {
    /// Authenticate against the configured tenant and wire the Graph-backed clients
    pub async fn connect(config: Config) -> Result<Self> {
        config.require_identity()?;

        let http = http_client()?;
        let graph = Arc::new(GraphClient::connect(http.clone(), &config.graph).await?);
        let mailbox: Arc<dyn MailboxClient> =
            Arc::new(GraphMailbox::new(graph, config.mailbox.address.clone()));
        let reporter: Arc<dyn ReportSender> = Arc::new(HttpReportSender::new(http));

        Ok(Self::from_parts(config, mailbox, reporter, default_worker_count()))
    }

    pub fn from_parts(
        config: Config,
        mailbox: Arc<dyn MailboxClient>,
        reporter: Arc<dyn ReportSender>,
        workers: usize,
    ) -> Self {
        let classifier = Arc::new(MessageClassifier::new(
            Arc::clone(&mailbox),
            reporter,
            config.mailbox.marker_header.clone(),
            config.mailbox.category.name.clone(),
        ));

        Self {
            provisioner: MailboxProvisioner::new(Arc::clone(&mailbox)),
            runner: BatchRunner::new(mailbox, classifier, workers),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ensure category and folder, then process the folder.
    ///
    /// Returns `None` when the folder could not be located.
    pub async fn run_cycle(&self) -> Result<Option<RunReport>> {
        let mailbox = &self.config.mailbox;
        self.provisioner
            .ensure_category(&mailbox.category.name, &mailbox.category.color)
            .await?;

        let Some(folder_id) = self.provisioner.ensure_folder(&mailbox.folder).await? else {
            warn!("Mail folder '{}' was not found", mailbox.folder);
            return Ok(None);
        };

        let report = self.runner.run(&folder_id).await?;
        info!("{}", report.summary());
        Ok(Some(report))
    }

    /// Reset the flagged messages of the reports folder
    pub async fn reset(&self) -> Result<Option<RunReport>> {
        let folder = &self.config.mailbox.folder;
        let Some(folder_id) = self.provisioner.ensure_folder(folder).await? else {
            warn!("Mail folder '{}' was not found", folder);
            return Ok(None);
        };

        let report = self.runner.reset(&folder_id).await?;
        info!("{}", report.summary());
        Ok(Some(report))
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// A failed cycle is logged and the loop keeps going. Shutdown is only
    /// observed while sleeping between cycles.
    pub async fn run_loop<F>(&self, interval: Duration, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            match self.run_cycle().await {
                Err(e) if e.is_transient() => {
                    warn!("Cycle failed, retrying next cycle: {}", e);
                }
                Err(e) => error!("Cycle failed: {}", e),
                Ok(_) => {}
            }

            info!("Next check in {} seconds", interval.as_secs());
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// Entry point for the `run` subcommand
pub async fn run(config: Config, once: bool) -> Result<()> {
    let run_once = once || config.run.run_once;
    let interval = config.run.interval();
    let checker = Checker::connect(config).await?;

    if run_once {
        checker.run_cycle().await?;
        return Ok(());
    }

    checker
        .run_loop(interval, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
