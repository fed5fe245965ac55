// Wire-level DTOs for the three backend services.
// Field names match what the services emit (camelCase JSON), so these
// types stay serde-derived and conversion into the domain model happens
// in one place.

use serde::{Deserialize, Serialize};

use crate::models::{Attachment, AttachmentKind, Chat, DeliveryStatus, Message, UserProfile};

/// Identity claim presented to the auth service. One variant per
/// supported method; `type` on the wire selects the variant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IdentityClaim {
    Phone {
        phone: String,
        name: String,
    },
    Google {
        google_id: String,
        email: String,
        name: String,
        avatar: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
    },
    Telegram {
        telegram_id: String,
        username: String,
        first_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        photo_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
    },
}

impl IdentityClaim {
    /// Check the fields the auth service requires for this method.
    /// Returns the name of the first missing field.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self {
            IdentityClaim::Phone { phone, name } => {
                if phone.trim().is_empty() {
                    Some("phone")
                } else if name.trim().is_empty() {
                    Some("name")
                } else {
                    None
                }
            }
            IdentityClaim::Google { google_id, email, .. } => {
                if google_id.trim().is_empty() {
                    Some("google_id")
                } else if email.trim().is_empty() {
                    Some("email")
                } else {
                    None
                }
            }
            IdentityClaim::Telegram { telegram_id, username, .. } => {
                if telegram_id.trim().is_empty() {
                    Some("telegram_id")
                } else if username.trim().is_empty() {
                    Some("username")
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
}

/// One chat as the directory service reports it in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub unread: u32,
    #[serde(default)]
    pub is_typing: bool,
}

impl ChatSnapshot {
    pub fn into_chat(self) -> Chat {
        Chat {
            id: self.id,
            name: self.name,
            avatar: self.avatar,
            last_message: self.last_message,
            timestamp: self.timestamp,
            unread: self.unread,
            is_online: self.is_online,
            is_typing: self.is_typing,
            is_blocked: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSnapshot>,
}

/// Result of a create-by-contact call: the chat id (new or pre-existing)
/// plus the counterpart's profile card.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedChat {
    pub chat_id: String,
    pub contact: ContactCard,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactCard {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One message as the message service reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSnapshot {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub is_sent: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentSnapshot>,
    /// Correlation key echoed back for messages this client originated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl MessageSnapshot {
    pub fn into_message(self, chat_id: &str) -> Message {
        let delivery_status = match self.status.as_deref() {
            Some("read") => DeliveryStatus::Read,
            Some("delivered") => DeliveryStatus::Delivered,
            _ => DeliveryStatus::Sent,
        };
        let attachment = self.attachment.map(|a| Attachment {
            kind: match a.kind.as_str() {
                "image" => AttachmentKind::Image,
                "video" => AttachmentKind::Video,
                _ => AttachmentKind::File,
            },
            url: a.url,
            name: a.name,
        });
        Message {
            id: self.id,
            chat_id: chat_id.to_string(),
            text: self.text,
            timestamp: self.timestamp,
            is_sent: self.is_sent,
            delivery_status,
            attachment,
            client_ref: self.client_ref,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    pub message: MessageSnapshot,
}

/// Payload for appending a message, correlation key included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub chat_id: String,
    pub text: String,
    pub client_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
}

impl OutgoingMessage {
    pub fn new(chat_id: &str, text: &str, client_ref: &str, attachment: Option<&Attachment>) -> Self {
        OutgoingMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            client_ref: client_ref.to_string(),
            attachment_type: attachment.map(|a| {
                match a.kind {
                    AttachmentKind::Image => "image",
                    AttachmentKind::File => "file",
                    AttachmentKind::Video => "video",
                }
                .to_string()
            }),
            attachment_url: attachment.map(|a| a.url.clone()),
            attachment_name: attachment.and_then(|a| a.name.clone()),
        }
    }
}

/// Error body the services return alongside non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
