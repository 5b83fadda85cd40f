//! Gophish Mailbox Checker
//!
//! Watches a Microsoft 365 mailbox folder where users drop reported phishing
//! emails, and tells Gophish which simulations were reported.
//!
//! # Overview
//!
//! Each cycle:
//! - **Provisioning**: makes sure the report category and folder exist
//! - **Fetching**: lists up to 200 unread, unflagged messages of the folder
//! - **Classification**: looks for the Gophish marker header inside attached
//!   messages, calls the campaign's report endpoint and marks the message
//!   read, categorized and complete
//! - **Triage**: anything without a marker is flagged for a human
//!
//! # Example Usage
//!
//! ```no_run
//! use gophish_mailbox_checker::{cli::Checker, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let checker = Checker::connect(config).await?;
//!     if let Some(report) = checker.run_cycle().await? {
//!         println!("{}", report.summary());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - Client-credential token acquisition
//! - [`client`] - Graph API client with pagination and token refresh
//! - [`mailbox`] - Category and folder provisioning
//! - [`classifier`] - Per-message decision procedure
//! - [`report`] - Report URL derivation and callback
//! - [`runner`] - Concurrent batch runs and the reset utility
//! - [`cli`] - Command-line interface and cycle orchestration
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Graph resource shapes

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod models;
pub mod report;
pub mod runner;

// Re-export commonly used types for convenience
pub use error::{CheckerError, Result};

// Core data models
pub use models::{
    Attachment, AttachmentDetail, Category, FlagStatus, MailFolder, Message, MessageUpdate,
};

// Clients
pub use client::{ApiResponse, GraphClient, GraphMailbox, MailboxClient, MessageFilter, Method};
pub use report::{HttpReportSender, ReportSender};

// Processing
pub use classifier::{MessageClassifier, MessageState, Outcome};
pub use mailbox::MailboxProvisioner;
pub use runner::{BatchRunner, RunReport};

// Config types
pub use config::{Config, GraphConfig, LoggingConfig, MailboxConfig, RunConfig};

// CLI types (for binary usage)
pub use cli::{Checker, Cli, Commands};
