//! Report callback: URL derivation and the GET that records a report

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{CheckerError, Result};

const RID_QUERY: &str = "?rid=";
const REPORT_RID_QUERY: &str = "/report?rid=";

/// "20x": any three-digit status starting with 20 counts as reported
static REPORTED_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^20[0-9]$").unwrap());

/// Derive the report endpoint from a tracking link.
///
/// The link must carry a `?rid=` query parameter. Links that already point at
/// the report endpoint are returned unchanged; otherwise the `rid` query is
/// moved behind a `/report` path segment.
pub fn report_url(marker: &str) -> Result<String> {
    let marker = marker.trim();

    if !marker.contains(RID_QUERY) {
        return Err(CheckerError::InvalidReportLink(format!(
            "'{}' has no {} query parameter",
            marker, RID_QUERY
        )));
    }

    if marker.contains(REPORT_RID_QUERY) {
        return Ok(marker.to_string());
    }

    Ok(marker.replace(RID_QUERY, REPORT_RID_QUERY))
}

/// Whether a callback status means the report was recorded
pub fn is_reported_status(status: u16) -> bool {
    REPORTED_STATUS.is_match(&status.to_string())
}

/// Sends the report callback
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportSender: Send + Sync {
    /// GET the report URL and return the HTTP status code
    async fn send_report(&self, url: &str) -> Result<u16>;
}

/// [`ReportSender`] issuing a plain, unauthenticated GET
pub struct HttpReportSender {
    http: reqwest::Client,
}

impl HttpReportSender {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReportSender for HttpReportSender {
    async fn send_report(&self, url: &str) -> Result<u16> {
        debug!("Sending report callback to {}", url);
        let response = self.http.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}
