use serde::{Deserialize, Serialize};

/// The authenticated user's profile as the auth service returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub phone: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: String,
}

/// One conversation with exactly one counterpart.
///
/// `timestamp` is the server's last-activity label (e.g. "12:34" or
/// "yesterday"), not a machine timestamp. `is_blocked` is local-only:
/// blocking never removes a chat from the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub last_message: String,
    pub timestamp: String,
    pub unread: u32,
    pub is_online: bool,
    pub is_typing: bool,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    File,
    Video,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,   // Optimistic entry, not yet confirmed by the server
    Sent,      // Accepted by the server
    Delivered, // Delivered to the counterpart's device
    Read,      // Read by the counterpart
    Failed,    // Send failed; kept in the timeline for retry
}

/// A single message within a chat.
///
/// `client_ref` is the correlation key: set on locally-originated messages
/// (equal to the temporary id the optimistic entry was created with),
/// carried on the send request and echoed back by the server so a poll
/// landing mid-send can reconcile instead of duplicating.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub text: String,
    pub timestamp: String,
    pub is_sent: bool,
    pub delivery_status: DeliveryStatus,
    pub attachment: Option<Attachment>,
    pub client_ref: Option<String>,
}

impl Message {
    /// True while the message only exists locally (pending or failed send).
    pub fn is_unconfirmed(&self) -> bool {
        matches!(
            self.delivery_status,
            DeliveryStatus::Pending | DeliveryStatus::Failed
        )
    }
}
