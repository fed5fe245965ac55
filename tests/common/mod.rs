// Common test utilities: a scriptable in-memory backend standing in for
// the auth, directory and message services, plus snapshot builders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use nuntius::api::error::{AuthError, DirectoryError, MessageError};
use nuntius::api::types::{
    AuthResponse, ChatSnapshot, ContactCard, CreatedChat, IdentityClaim, MessageSnapshot,
    OutgoingMessage,
};
use nuntius::api::ChatBackend;
use nuntius::models::UserProfile;

/// Build a directory snapshot entry.
pub fn chat_snapshot(id: &str, name: &str, last_message: &str) -> ChatSnapshot {
    ChatSnapshot {
        id: id.to_string(),
        name: name.to_string(),
        avatar: String::new(),
        is_online: false,
        last_message: last_message.to_string(),
        timestamp: "12:00".to_string(),
        unread: 0,
        is_typing: false,
    }
}

/// Build a message snapshot as the message service would report it.
pub fn message_snapshot(id: &str, text: &str, is_sent: bool) -> MessageSnapshot {
    MessageSnapshot {
        id: id.to_string(),
        text: text.to_string(),
        timestamp: "12:00".to_string(),
        is_sent,
        status: Some("sent".to_string()),
        attachment: None,
        client_ref: None,
    }
}

/// Scriptable backend. Every call optionally sleeps a configured latency
/// (virtual time under paused-clock tests), making in-flight windows
/// controllable, and call counters make coalescing observable.
#[derive(Default)]
pub struct MockBackend {
    chats: Mutex<Vec<ChatSnapshot>>,
    messages: Mutex<HashMap<String, Vec<MessageSnapshot>>>,
    contacts: Mutex<HashMap<String, CreatedChat>>,
    pub blocked: Mutex<Vec<String>>,
    pub fetch_chats_calls: AtomicU32,
    pub fetch_messages_calls: AtomicU32,
    pub send_calls: AtomicU32,
    fail_sends: AtomicBool,
    reject_auth: AtomicBool,
    create_conflict: Mutex<Option<String>>,
    latency: Mutex<Duration>,
    next_id: AtomicU32,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend {
            next_id: AtomicU32::new(1),
            ..Default::default()
        }
    }

    pub fn set_chats(&self, chats: Vec<ChatSnapshot>) {
        *self.chats.lock().unwrap() = chats;
    }

    pub fn set_messages(&self, chat_id: &str, messages: Vec<MessageSnapshot>) {
        self.messages
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), messages);
    }

    pub fn add_contact(&self, phone: &str, chat_id: &str, name: &str) {
        self.contacts.lock().unwrap().insert(
            phone.to_string(),
            CreatedChat {
                chat_id: chat_id.to_string(),
                contact: ContactCard {
                    id: 77,
                    name: name.to_string(),
                    avatar: None,
                },
            },
        );
    }

    /// Make create_chat report the conflict error variant instead of the
    /// original's silent 200-with-existing-id behavior.
    pub fn set_create_conflict(&self, chat_id: &str) {
        *self.create_conflict.lock().unwrap() = Some(chat_id.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_auth(&self, reject: bool) {
        self.reject_auth.store(reject, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn authenticate(&self, claim: &IdentityClaim) -> Result<AuthResponse, AuthError> {
        self.simulate_latency().await;
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(AuthError::Rejected("account disabled".to_string()));
        }
        let (phone, name) = match claim {
            IdentityClaim::Phone { phone, name } => (phone.clone(), name.clone()),
            IdentityClaim::Google { email, name, .. } => (email.clone(), name.clone()),
            IdentityClaim::Telegram { username, first_name, .. } => {
                (username.clone(), first_name.clone())
            }
        };
        Ok(AuthResponse {
            user: UserProfile {
                id: 1,
                phone,
                name,
                bio: String::new(),
                avatar: String::new(),
            },
            token: "1".to_string(),
        })
    }

    async fn fetch_chats(&self, _token: &str) -> Result<Vec<ChatSnapshot>, DirectoryError> {
        self.fetch_chats_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn create_chat(
        &self,
        _token: &str,
        contact_phone: &str,
    ) -> Result<CreatedChat, DirectoryError> {
        self.simulate_latency().await;
        if let Some(existing) = self.create_conflict.lock().unwrap().clone() {
            return Err(DirectoryError::AlreadyExists(existing));
        }
        self.contacts
            .lock()
            .unwrap()
            .get(contact_phone)
            .cloned()
            .ok_or(DirectoryError::ContactNotFound)
    }

    async fn block_chat(&self, _token: &str, chat_id: &str) -> Result<(), DirectoryError> {
        self.simulate_latency().await;
        self.blocked.lock().unwrap().push(chat_id.to_string());
        Ok(())
    }

    async fn fetch_messages(
        &self,
        _token: &str,
        chat_id: &str,
    ) -> Result<Vec<MessageSnapshot>, MessageError> {
        self.fetch_messages_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        _token: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<MessageSnapshot, MessageError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MessageError::NetworkFailure("connection reset".to_string()));
        }

        let id = format!("m{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let confirmed = MessageSnapshot {
            id,
            text: outgoing.text.clone(),
            timestamp: "12:05".to_string(),
            is_sent: true,
            status: Some("sent".to_string()),
            attachment: None,
            client_ref: Some(outgoing.client_ref.clone()),
        };

        // The store keeps what it accepted, so later polls echo it back.
        self.messages
            .lock()
            .unwrap()
            .entry(outgoing.chat_id.clone())
            .or_default()
            .push(confirmed.clone());

        Ok(confirmed)
    }
}

/// A ready-to-use session for engine tests.
pub fn test_session() -> nuntius::session::Session {
    nuntius::session::Session {
        user: UserProfile {
            id: 1,
            phone: "+79991234567".to_string(),
            name: "Tester".to_string(),
            bio: String::new(),
            avatar: String::new(),
        },
        token: "1".to_string(),
    }
}
