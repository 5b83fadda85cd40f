//! Batch processing of the reports folder

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::classifier::{MessageClassifier, Outcome};
use crate::client::{MailboxClient, MessageFilter};
use crate::error::Result;
use crate::models::{Message, MessageUpdate};

/// Twice the available parallelism, at least 2
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessageFailure {
    pub message_id: String,
    pub error: String,
}

/// Aggregated result of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub fetched: usize,
    pub reported: usize,
    pub rejected: usize,
    pub flagged: usize,
    pub unchanged: usize,
    pub reset: usize,
    pub failures: Vec<MessageFailure>,
}

impl RunReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            completed_at: now,
            fetched: 0,
            reported: 0,
            rejected: 0,
            flagged: 0,
            unchanged: 0,
            reset: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Reported => self.reported += 1,
            Outcome::ReportRejected => self.rejected += 1,
            Outcome::Flagged => self.flagged += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }

    fn fail(&mut self, message_id: &str, error: impl ToString) {
        self.failures.push(MessageFailure {
            message_id: message_id.to_string(),
            error: error.to_string(),
        });
    }

    fn finish(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// One-line summary for the cycle log
    pub fn summary(&self) -> String {
        format!(
            "run {}: {} fetched, {} reported, {} rejected, {} flagged, {} unchanged, {} reset, {} failed",
            self.run_id,
            self.fetched,
            self.reported,
            self.rejected,
            self.flagged,
            self.unchanged,
            self.reset,
            self.failures.len()
        )
    }
}

/// Fans classification out over the messages of one folder
pub struct BatchRunner {
    mailbox: Arc<dyn MailboxClient>,
    classifier: Arc<MessageClassifier>,
    workers: usize,
}

impl BatchRunner {
    pub fn new(
        mailbox: Arc<dyn MailboxClient>,
        classifier: Arc<MessageClassifier>,
        workers: usize,
    ) -> Self {
        Self {
            mailbox,
            classifier,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Classify the pending messages of a folder.
    ///
    /// Only the listing itself can fail the run; per-message failures are
    /// logged and collected in the report.
    pub async fn run(&self, folder_id: &str) -> Result<RunReport> {
        let mut report = RunReport::new();

        let messages = self
            .mailbox
            .list_messages(folder_id, MessageFilter::Pending)
            .await?;
        report.fetched = messages.len();
        info!(
            "Processing {} messages with {} workers",
            messages.len(),
            self.workers
        );

        let results: Vec<(String, Result<Outcome>)> = stream::iter(messages)
            .map(|message| {
                let classifier = Arc::clone(&self.classifier);
                async move {
                    let outcome = classifier.classify(&message).await;
                    (message.id, outcome)
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for (message_id, result) in results {
            match result {
                Ok(outcome) => {
                    debug!("Message {}: {:?}", message_id, outcome);
                    report.record(outcome);
                }
                Err(e) => {
                    error!("Failed to process message {}: {}", message_id, e);
                    report.fail(&message_id, e);
                }
            }
        }

        Ok(report.finish())
    }

    /// Return flagged messages of a folder to unread, uncategorized, not flagged
    pub async fn reset(&self, folder_id: &str) -> Result<RunReport> {
        let mut report = RunReport::new();

        let messages: Vec<Message> = self
            .mailbox
            .list_messages(folder_id, MessageFilter::Flagged)
            .await?
            .into_iter()
            .filter(|m| m.flag_status().is_handled())
            .collect();
        report.fetched = messages.len();
        info!("Resetting {} messages", messages.len());

        let update = MessageUpdate::reset();
        let results: Vec<(String, Result<()>)> = stream::iter(messages)
            .map(|message| {
                let mailbox = Arc::clone(&self.mailbox);
                let update = &update;
                async move {
                    let result = mailbox.update_message(&message.id, update).await;
                    (message.id, result)
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for (message_id, result) in results {
            match result {
                Ok(()) => report.reset += 1,
                Err(e) => {
                    error!("Failed to reset message {}: {}", message_id, e);
                    report.fail(&message_id, e);
                }
            }
        }

        Ok(report.finish())
    }
}
