// Backend API module for Nuntius.
// This file is the entry point for everything that talks to the three
// remote services (auth, chat directory, message store). The engine only
// ever sees the ChatBackend trait; the HTTP implementation lives in
// http.rs and tests substitute their own.

use async_trait::async_trait;

pub mod error;
pub mod http;
pub mod types;

pub use error::{AuthError, DirectoryError, MessageError};
pub use http::{BackendConfig, HttpBackend};
pub use types::{
    AuthResponse, ChatSnapshot, CreatedChat, IdentityClaim, MessageSnapshot, OutgoingMessage,
};

/// Abstract contract over the backend services.
///
/// Every call is request/response; the credential (an opaque token) is
/// passed explicitly and carried out-of-band by implementations, never in
/// a request body.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Exchange an identity claim for a user profile and credential.
    async fn authenticate(&self, claim: &IdentityClaim) -> Result<AuthResponse, AuthError>;

    /// Pull the full current chat list for the credential's user.
    async fn fetch_chats(&self, token: &str) -> Result<Vec<ChatSnapshot>, DirectoryError>;

    /// Create (or find) the one-to-one chat with the user matching
    /// `contact_phone`.
    async fn create_chat(
        &self,
        token: &str,
        contact_phone: &str,
    ) -> Result<CreatedChat, DirectoryError>;

    /// Block the counterpart of `chat_id`.
    async fn block_chat(&self, token: &str, chat_id: &str) -> Result<(), DirectoryError>;

    /// Pull the full message list for one chat.
    async fn fetch_messages(
        &self,
        token: &str,
        chat_id: &str,
    ) -> Result<Vec<MessageSnapshot>, MessageError>;

    /// Append a message; the returned snapshot carries the permanent id
    /// and echoes the correlation key.
    async fn send_message(
        &self,
        token: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<MessageSnapshot, MessageError>;
}
