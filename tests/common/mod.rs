//! Common test utilities and fixtures

#![allow(dead_code)]

use gophish_mailbox_checker::client::{MailboxClient, MessageFilter};
use gophish_mailbox_checker::config::Config;
use gophish_mailbox_checker::error::Result;
use gophish_mailbox_checker::models::{
    Attachment, AttachmentDetail, Category, EmbeddedMessage, Flag, FlagStatus, InternetHeader,
    MailFolder, Message, MessageUpdate,
};
use gophish_mailbox_checker::report::ReportSender;
use mockall::mock;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "tenant-1";
pub const MAILBOX: &str = "phish@example.com";
pub const MARKER: &str = "X-Gophish-Link";

/// Create a test message with default values
pub fn create_test_message(id: &str, has_attachments: bool, status: FlagStatus) -> Message {
    Message {
        id: id.to_string(),
        is_read: false,
        has_attachments,
        flag: Flag {
            flag_status: status,
        },
        subject: Some(format!("FW: suspicious email {}", id)),
    }
}

pub fn create_item_attachment(id: &str) -> Attachment {
    Attachment {
        id: id.to_string(),
        name: Some("Suspicious email".to_string()),
        odata_type: Some("#microsoft.graph.itemAttachment".to_string()),
    }
}

/// Item attachment carrying the marker header
pub fn create_marked_detail(id: &str, link: &str) -> AttachmentDetail {
    AttachmentDetail {
        id: id.to_string(),
        item: Some(EmbeddedMessage {
            internet_message_headers: vec![
                InternetHeader {
                    name: "From".to_string(),
                    value: "IT Support <it@example.net>".to_string(),
                },
                InternetHeader {
                    name: MARKER.to_string(),
                    value: link.to_string(),
                },
            ],
        }),
    }
}

pub fn create_folder(id: &str, name: &str) -> MailFolder {
    MailFolder {
        id: id.to_string(),
        display_name: name.to_string(),
    }
}

pub fn create_category(name: &str) -> Category {
    Category {
        id: Some(format!("cat-{}", name.len())),
        display_name: name.to_string(),
        color: "preset0".to_string(),
    }
}

/// Graph JSON for a message listing entry
pub fn mock_message_json(id: &str, has_attachments: bool) -> Value {
    json!({
        "id": id,
        "subject": format!("FW: suspicious email {}", id),
        "isRead": false,
        "hasAttachments": has_attachments,
        "flag": { "flagStatus": "notFlagged" }
    })
}

/// Graph JSON for an expanded item attachment
pub fn mock_item_attachment_json(id: &str, headers: &[(&str, &str)]) -> Value {
    let headers: Vec<Value> = headers
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    json!({
        "@odata.type": "#microsoft.graph.itemAttachment",
        "id": id,
        "name": "Suspicious email",
        "item": {
            "@odata.type": "#microsoft.graph.message",
            "internetMessageHeaders": headers
        }
    })
}

/// Graph collection body
pub fn collection(values: Vec<Value>) -> Value {
    json!({ "value": values })
}

/// Mock identity and Graph endpoints served by one wiremock server
pub struct GraphFixture {
    pub server: MockServer,
    pub config: Config,
    _secret: NamedTempFile,
}

impl GraphFixture {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let secret = NamedTempFile::new().unwrap();
        std::fs::write(secret.path(), "client-secret\r\n").unwrap();

        let mut config = Config::default();
        config.graph.authority = server.uri();
        config.graph.tenant_id = TENANT.to_string();
        config.graph.client_id = "client-1".to_string();
        config.graph.endpoint = format!("{}/v1.0", server.uri());
        config.graph.secret_file = secret.path().to_path_buf();
        config.mailbox.address = MAILBOX.to_string();

        Mock::given(method("POST"))
            .and(path(format!("/{}/oauth2/v2.0/token", TENANT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "access-token"
            })))
            .mount(&server)
            .await;

        Self {
            server,
            config,
            _secret: secret,
        }
    }

    /// Graph path under the configured mailbox
    pub fn user_path(&self, suffix: &str) -> String {
        format!("/v1.0/users/{}{}", MAILBOX, suffix)
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }
}

mock! {
    pub MailboxClient {}

    #[async_trait::async_trait]
    impl MailboxClient for MailboxClient {
        async fn list_categories(&self) -> Result<Vec<Category>>;
        async fn create_category(&self, name: &str, color: &str) -> Result<()>;
        async fn list_folders(&self) -> Result<Vec<MailFolder>>;
        async fn create_folder(&self, name: &str) -> Result<()>;
        async fn list_messages(&self, folder_id: &str, filter: MessageFilter) -> Result<Vec<Message>>;
        async fn list_attachments(&self, message_id: &str) -> Result<Vec<Attachment>>;
        async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<AttachmentDetail>;
        async fn update_message(&self, message_id: &str, update: &MessageUpdate) -> Result<()>;
    }
}

mock! {
    pub ReportSender {}

    #[async_trait::async_trait]
    impl ReportSender for ReportSender {
        async fn send_report(&self, url: &str) -> Result<u16>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_message() {
        let msg = create_test_message("msg1", true, FlagStatus::NotFlagged);
        assert_eq!(msg.id, "msg1");
        assert!(!msg.is_read);
        assert!(msg.has_attachments);
    }

    #[test]
    fn test_mock_item_attachment_json_deserializes() {
        let json = mock_item_attachment_json("att-1", &[(MARKER, "https://x/t?rid=1")]);
        let detail: AttachmentDetail = serde_json::from_value(json).unwrap();
        let item = detail.item.unwrap();
        assert_eq!(item.header_values(MARKER).collect::<Vec<_>>(), vec!["https://x/t?rid=1"]);
    }
}
