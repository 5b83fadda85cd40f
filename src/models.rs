use serde::{Deserialize, Deserializer, Serialize};

/// Graph sends `null` for empty collections on some resources
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Flag state of a mailbox message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum FlagStatus {
    #[default]
    NotFlagged,
    Flagged,
    Complete,
}

impl FlagStatus {
    /// Flagged or complete messages have already been looked at
    pub fn is_handled(self) -> bool {
        matches!(self, FlagStatus::Flagged | FlagStatus::Complete)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    #[serde(default)]
    pub flag_status: FlagStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub flag: Flag,
    #[serde(default)]
    pub subject: Option<String>,
}

impl Message {
    pub fn flag_status(&self) -> FlagStatus {
        self.flag.flag_status
    }
}

/// Attachment entry as returned by the attachment listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "@odata.type", default)]
    pub odata_type: Option<String>,
}

/// Attachment with the embedded item expanded.
///
/// Only message (item) attachments carry `item`; file attachments leave it empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDetail {
    pub id: String,
    #[serde(default)]
    pub item: Option<EmbeddedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub internet_message_headers: Vec<InternetHeader>,
}

impl EmbeddedMessage {
    /// All values of headers named `name`, compared ASCII case-insensitively
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.internet_message_headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternetHeader {
    pub name: String,
    pub value: String,
}

/// Mailbox-level master category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MailFolder {
    pub id: String,
    pub display_name: String,
}

/// Partial update body for PATCH requests on a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<Flag>,
}

impl MessageUpdate {
    /// Read, categorized and completed after a successful report callback
    pub fn reported(category: &str) -> Self {
        Self {
            is_read: Some(true),
            categories: Some(vec![category.to_string()]),
            flag: Some(Flag {
                flag_status: FlagStatus::Complete,
            }),
        }
    }

    /// Flagged for manual triage
    pub fn flagged() -> Self {
        Self {
            flag: Some(Flag {
                flag_status: FlagStatus::Flagged,
            }),
            ..Default::default()
        }
    }

    /// Back to unread, uncategorized and not flagged
    pub fn reset() -> Self {
        Self {
            is_read: Some(false),
            categories: Some(Vec::new()),
            flag: Some(Flag {
                flag_status: FlagStatus::NotFlagged,
            }),
        }
    }

    pub fn flag_status(&self) -> Option<FlagStatus> {
        self.flag.as_ref().map(|f| f.flag_status)
    }
}
