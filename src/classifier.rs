//! Per-message classification and state mutation

use crate::client::MailboxClient;
use crate::error::Result;
use crate::models::{FlagStatus, Message, MessageUpdate};
use crate::report::{is_reported_status, report_url, ReportSender};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a fetched message sits in the reporting workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Unread, has attachments, not flagged yet
    Reportable,
    /// Unread without attachments and not flagged yet
    NeedsFlagging,
    /// Read, flagged or complete
    AlreadyProcessed,
}

impl MessageState {
    pub fn of(message: &Message) -> Self {
        let status = message.flag_status();
        if message.is_read || status.is_handled() {
            MessageState::AlreadyProcessed
        } else if message.has_attachments {
            MessageState::Reportable
        } else {
            MessageState::NeedsFlagging
        }
    }
}

/// Result of classifying one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Callback succeeded; message marked read, categorized and complete
    Reported,
    /// Marker found but the callback failed; message left untouched
    ReportRejected,
    /// No marker found; message flagged for manual triage
    Flagged,
    /// Nothing to do
    Unchanged,
}

/// Classifies messages and applies the resulting mutation
pub struct MessageClassifier {
    mailbox: Arc<dyn MailboxClient>,
    reporter: Arc<dyn ReportSender>,
    marker_header: String,
    category: String,
}

impl MessageClassifier {
    pub fn new(
        mailbox: Arc<dyn MailboxClient>,
        reporter: Arc<dyn ReportSender>,
        marker_header: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            mailbox,
            reporter,
            marker_header: marker_header.into(),
            category: category.into(),
        }
    }

    /// Classify a message and apply at most one PATCH to it.
    ///
    /// API failures while inspecting or updating the message are returned;
    /// a failed report callback is not an error and yields
    /// [`Outcome::ReportRejected`].
    pub async fn classify(&self, message: &Message) -> Result<Outcome> {
        match MessageState::of(message) {
            MessageState::Reportable => self.inspect_attachments(message).await,
            MessageState::NeedsFlagging => {
                debug!("Message {} has no attachments", message.id);
                self.flag(message).await
            }
            MessageState::AlreadyProcessed => {
                debug!(
                    "Message {} already processed (read: {}, flag: {:?})",
                    message.id,
                    message.is_read,
                    message.flag_status()
                );
                Ok(Outcome::Unchanged)
            }
        }
    }

    async fn inspect_attachments(&self, message: &Message) -> Result<Outcome> {
        let attachments = self.mailbox.list_attachments(&message.id).await?;
        let mut marker_seen = false;
        let mut item_seen = false;

        for attachment in &attachments {
            let detail = self
                .mailbox
                .get_attachment(&message.id, &attachment.id)
                .await?;

            let Some(item) = detail.item else {
                debug!(
                    "Attachment {} of message {} is not an item attachment",
                    attachment.id, message.id
                );
                continue;
            };
            item_seen = true;

            let values: Vec<&str> = item.header_values(&self.marker_header).collect();
            if values.is_empty() {
                continue;
            }
            marker_seen = true;

            let marker = values.join(", ");
            if self.send_report(&message.id, &marker).await {
                self.mailbox
                    .update_message(&message.id, &MessageUpdate::reported(&self.category))
                    .await?;
                info!("Message {} reported and marked complete", message.id);
                return Ok(Outcome::Reported);
            }
        }

        if marker_seen {
            return Ok(Outcome::ReportRejected);
        }
        if !item_seen {
            debug!("Message {} has no item attachments", message.id);
            return Ok(Outcome::Unchanged);
        }

        debug!(
            "No '{}' header found in the attachments of message {}",
            self.marker_header, message.id
        );
        self.flag(message).await
    }

    /// Issue the callback for a marker value; `true` when the report was recorded
    async fn send_report(&self, message_id: &str, marker: &str) -> bool {
        let url = match report_url(marker) {
            Ok(url) => url,
            Err(e) => {
                warn!("Message {}: {}", message_id, e);
                return false;
            }
        };

        match self.reporter.send_report(&url).await {
            Ok(status) if is_reported_status(status) => {
                debug!("Report callback for message {} returned {}", message_id, status);
                true
            }
            Ok(status) => {
                warn!(
                    "Report callback {} for message {} returned HTTP {}",
                    url, message_id, status
                );
                false
            }
            Err(e) => {
                warn!(
                    "Report callback {} for message {} failed: {}",
                    url, message_id, e
                );
                false
            }
        }
    }

    async fn flag(&self, message: &Message) -> Result<Outcome> {
        if message.flag_status() != FlagStatus::NotFlagged {
            return Ok(Outcome::Unchanged);
        }

        self.mailbox
            .update_message(&message.id, &MessageUpdate::flagged())
            .await?;
        info!("Message {} flagged for manual review", message.id);
        Ok(Outcome::Flagged)
    }
}
