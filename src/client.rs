//! Graph API client with transparent re-authentication and pagination

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::auth::Authenticator;
use crate::config::GraphConfig;
use crate::error::{CheckerError, Result};
use crate::models::{Attachment, AttachmentDetail, Category, MailFolder, Message, MessageUpdate};

/// Error code the Graph API uses for expired or invalid bearer tokens
pub const TOKEN_EXPIRED_CODE: &str = "InvalidAuthenticationToken";

/// Pagination link field on collection responses
pub const NEXT_LINK_FIELD: &str = "@odata.nextLink";

/// Most messages handled in one batch
pub const MESSAGE_BATCH_SIZE: usize = 200;

const ERROR_BODY_MAX_LEN: usize = 200;

/// HTTP methods supported by [`GraphClient::call`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Put => reqwest::Method::PUT,
        }
    }
}

/// Successful outcome of a Graph call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// All pages of a `value` collection, in order
    Collection(Vec<Value>),
    /// Any other JSON body
    Object(Value),
    /// No body (e.g. 204 No Content)
    Empty,
}

impl ApiResponse {
    pub fn into_collection<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        match self {
            ApiResponse::Collection(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(CheckerError::from))
                .collect(),
            ApiResponse::Empty => Ok(Vec::new()),
            ApiResponse::Object(_) => Err(CheckerError::InvalidResponse(
                "Expected a collection, got a single object".to_string(),
            )),
        }
    }

    pub fn into_object<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            ApiResponse::Object(value) => Ok(serde_json::from_value(value)?),
            ApiResponse::Collection(_) => Err(CheckerError::InvalidResponse(
                "Expected a single object, got a collection".to_string(),
            )),
            ApiResponse::Empty => Err(CheckerError::InvalidResponse(
                "Expected a single object, got an empty response".to_string(),
            )),
        }
    }
}

struct BearerToken {
    value: String,
    generation: u64,
}

/// Generic Graph API caller shared by all workers of a batch.
///
/// Token refresh is single-flight: callers remember the token generation they
/// used, and only the first caller to report that generation as expired
/// actually re-authenticates.
pub struct GraphClient {
    http: reqwest::Client,
    endpoint: String,
    auth: Authenticator,
    token: RwLock<BearerToken>,
    refresh_lock: Mutex<()>,
}

impl GraphClient {
    /// Authenticate and build a client for the configured endpoint
    pub async fn connect(http: reqwest::Client, config: &GraphConfig) -> Result<Self> {
        let auth = Authenticator::new(http.clone(), config);
        let token = auth.acquire_token().await?;
        info!("Authenticated with client {} against {}", config.client_id, auth.token_url());

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth,
            token: RwLock::new(BearerToken {
                value: token.access_token,
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Number of refreshes performed since connecting
    pub async fn token_generation(&self) -> u64 {
        self.token.read().await.generation
    }

    fn url_for(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else if location.starts_with('/') {
            format!("{}{}", self.endpoint, location)
        } else {
            format!("{}/{}", self.endpoint, location)
        }
    }

    async fn current_token(&self) -> (String, u64) {
        let token = self.token.read().await;
        (token.value.clone(), token.generation)
    }

    async fn refresh_token(&self, seen_generation: u64) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        if self.token.read().await.generation != seen_generation {
            debug!("Access token was already refreshed by another task");
            return Ok(());
        }

        let fresh = self.auth.acquire_token().await?;
        let mut token = self.token.write().await;
        token.value = fresh.access_token;
        token.generation += 1;
        info!("Acquired a new access token");
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        bearer: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut request = self
            .http
            .request(method.into(), url)
            .bearer_auth(bearer)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!("API call {} {} failed: {}", method.as_str(), url, e);
            CheckerError::Network(e.to_string())
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!("Reading response of {} {} failed: {}", method.as_str(), url, e);
            CheckerError::Network(e.to_string())
        })?;

        if text.trim().is_empty() {
            if status.is_success() {
                return Ok(Value::Null);
            }
            return Err(CheckerError::Http {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value) if status.is_success() || value.get("error").is_some() => Ok(value),
            Ok(_) => Err(CheckerError::Http {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_MAX_LEN).collect(),
            }),
            Err(e) if status.is_success() => Err(CheckerError::InvalidResponse(format!(
                "{} {} returned undecodable JSON: {}",
                method.as_str(),
                url,
                e
            ))),
            Err(_) => Err(CheckerError::Http {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_MAX_LEN).collect(),
            }),
        }
    }

    /// Call a Graph location with one of the supported methods.
    ///
    /// An expired token is refreshed once and the call retried once. Collection
    /// responses are followed through every `@odata.nextLink` page.
    pub async fn call(
        &self,
        location: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.url_for(location);

        let (bearer, generation) = self.current_token().await;
        let mut json = self.send(method, &url, &bearer, body).await?;

        if is_token_expired(&json) {
            warn!("Access token has expired. Attempting to acquire a new one.");
            self.refresh_token(generation).await?;

            let (bearer, _) = self.current_token().await;
            json = self.send(method, &url, &bearer, body).await?;

            if is_token_expired(&json) {
                return Err(CheckerError::Auth(
                    "Access token rejected again after refresh".to_string(),
                ));
            }
        }

        if let Some(error) = api_error(&json) {
            return Err(error);
        }

        self.collect_pages(json).await
    }

    async fn collect_pages(&self, mut json: Value) -> Result<ApiResponse> {
        if !json.get("value").map_or(false, Value::is_array) {
            return Ok(if json.is_null() {
                ApiResponse::Empty
            } else {
                ApiResponse::Object(json)
            });
        }

        let mut items = match json.get_mut("value").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let mut next_link = next_link_of(&json);

        while let Some(link) = next_link {
            debug!("Following pagination link {}", link);
            let (bearer, _) = self.current_token().await;
            let mut page = self.send(Method::Get, &link, &bearer, None).await?;

            if let Some(error) = api_error(&page) {
                return Err(error);
            }

            match page.get_mut("value").map(Value::take) {
                Some(Value::Array(mut more)) => items.append(&mut more),
                _ => {
                    return Err(CheckerError::InvalidResponse(format!(
                        "Pagination page {} has no value collection",
                        link
                    )))
                }
            }
            next_link = next_link_of(&page);
        }

        Ok(ApiResponse::Collection(items))
    }
}

fn next_link_of(json: &Value) -> Option<String> {
    json.get(NEXT_LINK_FIELD)
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
        .map(str::to_string)
}

fn is_token_expired(json: &Value) -> bool {
    json.pointer("/error/code").and_then(Value::as_str) == Some(TOKEN_EXPIRED_CODE)
}

fn api_error(json: &Value) -> Option<CheckerError> {
    let error = json.get("error")?;
    let (code, message) = match error {
        Value::String(code) => (code.clone(), String::new()),
        _ => (
            error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
    };
    Some(CheckerError::Api { code, message })
}

/// Server-side message selection for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFilter {
    /// Unread and not flagged: candidates for classification
    Pending,
    /// Unread and flagged: candidates for the reset utility
    Flagged,
}

impl MessageFilter {
    pub fn odata(&self) -> &'static str {
        match self {
            MessageFilter::Pending => "isRead eq false and flag/flagStatus ne 'flagged'",
            MessageFilter::Flagged => "isRead eq false and flag/flagStatus eq 'flagged'",
        }
    }
}

/// Mailbox operations needed by provisioning, classification and batch runs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// List all master categories of the mailbox
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Create a master category
    async fn create_category(&self, name: &str, color: &str) -> Result<()>;

    /// List all top-level mail folders
    async fn list_folders(&self) -> Result<Vec<MailFolder>>;

    /// Create a top-level mail folder
    async fn create_folder(&self, name: &str) -> Result<()>;

    /// List up to [`MESSAGE_BATCH_SIZE`] messages of a folder matching `filter`
    async fn list_messages(&self, folder_id: &str, filter: MessageFilter) -> Result<Vec<Message>>;

    /// List the attachments of a message
    async fn list_attachments(&self, message_id: &str) -> Result<Vec<Attachment>>;

    /// Fetch an attachment with its embedded item expanded
    async fn get_attachment(&self, message_id: &str, attachment_id: &str)
        -> Result<AttachmentDetail>;

    /// Apply a partial update to a message
    async fn update_message(&self, message_id: &str, update: &MessageUpdate) -> Result<()>;
}

/// [`MailboxClient`] backed by the Graph API for one user mailbox
pub struct GraphMailbox {
    client: Arc<GraphClient>,
    mailbox: String,
}

impl GraphMailbox {
    pub fn new(client: Arc<GraphClient>, mailbox: impl Into<String>) -> Self {
        Self {
            client,
            mailbox: mailbox.into(),
        }
    }

    fn location(&self, suffix: &str) -> String {
        format!("/users/{}{}", self.mailbox, suffix)
    }
}

#[async_trait]
impl MailboxClient for GraphMailbox {
    async fn list_categories(&self) -> Result<Vec<Category>> {
        debug!("Retrieving master categories of {}", self.mailbox);
        self.client
            .call(&self.location("/outlook/masterCategories"), Method::Get, None)
            .await?
            .into_collection()
    }

    async fn create_category(&self, name: &str, color: &str) -> Result<()> {
        let body = json!({ "displayName": name, "color": color });
        self.client
            .call(
                &self.location("/outlook/masterCategories"),
                Method::Post,
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn list_folders(&self) -> Result<Vec<MailFolder>> {
        debug!("Retrieving mail folders of {}", self.mailbox);
        self.client
            .call(&self.location("/mailFolders"), Method::Get, None)
            .await?
            .into_collection()
    }

    async fn create_folder(&self, name: &str) -> Result<()> {
        let body = json!({ "displayName": name });
        self.client
            .call(&self.location("/mailFolders"), Method::Post, Some(&body))
            .await?;
        Ok(())
    }

    async fn list_messages(&self, folder_id: &str, filter: MessageFilter) -> Result<Vec<Message>> {
        let location = self.location(&format!(
            "/mailFolders/{}/messages?$top={}&$filter={}",
            folder_id,
            MESSAGE_BATCH_SIZE,
            filter.odata()
        ));
        let mut messages: Vec<Message> = self
            .client
            .call(&location, Method::Get, None)
            .await?
            .into_collection()?;
        messages.truncate(MESSAGE_BATCH_SIZE);
        Ok(messages)
    }

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<Attachment>> {
        self.client
            .call(
                &self.location(&format!("/messages/{}/attachments", message_id)),
                Method::Get,
                None,
            )
            .await?
            .into_collection()
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentDetail> {
        let location = self.location(&format!(
            "/messages/{}/attachments/{}/?$expand=microsoft.graph.itemattachment/item",
            message_id, attachment_id
        ));
        self.client
            .call(&location, Method::Get, None)
            .await?
            .into_object()
    }

    async fn update_message(&self, message_id: &str, update: &MessageUpdate) -> Result<()> {
        let body = serde_json::to_value(update)?;
        self.client
            .call(
                &self.location(&format!("/messages/{}", message_id)),
                Method::Patch,
                Some(&body),
            )
            .await?;
        Ok(())
    }
}
