// HTTP implementation of the ChatBackend trait using reqwest.
// The services are three independent JSON endpoints; the credential rides
// in the X-User-Id header on every request.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;

use super::error::{AuthError, DirectoryError, MessageError};
use super::types::{
    AuthResponse, ChatListResponse, ChatSnapshot, CreatedChat, ErrorBody, IdentityClaim,
    MessageListResponse, MessageSnapshot, OutgoingMessage, SendMessageResponse,
};
use super::ChatBackend;

/// Header carrying the opaque session credential.
const CREDENTIAL_HEADER: &str = "X-User-Id";

/// Bounded duration after which any call counts as failed.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoint configuration for the three backend services.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub auth_url: String,
    pub chats_url: String,
    pub messages_url: String,
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// Read endpoint URLs from the environment, falling back to the
    /// hosted defaults.
    pub fn from_env() -> Self {
        BackendConfig {
            auth_url: std::env::var("NUNTIUS_AUTH_URL")
                .unwrap_or_else(|_| "https://api.nuntius.example/auth".to_string()),
            chats_url: std::env::var("NUNTIUS_CHATS_URL")
                .unwrap_or_else(|_| "https://api.nuntius.example/chats".to_string()),
            messages_url: std::env::var("NUNTIUS_MESSAGES_URL")
                .unwrap_or_else(|_| "https://api.nuntius.example/messages".to_string()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// reqwest-backed client for the auth, directory and message services.
pub struct HttpBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(HttpBackend { config, client })
    }

    /// Extract the service error message from a non-2xx response body,
    /// falling back to the HTTP status line.
    async fn error_text(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {}", status),
        }
    }
}

fn directory_transport_error(e: reqwest::Error) -> DirectoryError {
    if e.is_timeout() {
        DirectoryError::Timeout
    } else {
        DirectoryError::NetworkFailure(e.to_string())
    }
}

fn message_transport_error(e: reqwest::Error) -> MessageError {
    if e.is_timeout() {
        MessageError::Timeout
    } else {
        MessageError::NetworkFailure(e.to_string())
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn authenticate(&self, claim: &IdentityClaim) -> Result<AuthResponse, AuthError> {
        debug!("Authenticating against {}", self.config.auth_url);
        let response = self
            .client
            .post(&self.config.auth_url)
            .json(claim)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let text = Self::error_text(response).await;
            return Err(AuthError::Rejected(text));
        }

        response
            .json::<AuthResponse>()
            .await
            .map_err(|e| AuthError::Rejected(format!("Malformed auth response: {}", e)))
    }

    async fn fetch_chats(&self, token: &str) -> Result<Vec<ChatSnapshot>, DirectoryError> {
        let response = self
            .client
            .get(&self.config.chats_url)
            .header(CREDENTIAL_HEADER, token)
            .send()
            .await
            .map_err(directory_transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(DirectoryError::Unauthorized),
            status if !status.is_success() => {
                Err(DirectoryError::NetworkFailure(Self::error_text(response).await))
            }
            _ => {
                let body: ChatListResponse = response
                    .json()
                    .await
                    .map_err(|e| DirectoryError::NetworkFailure(e.to_string()))?;
                debug!("Directory snapshot: {} chats", body.chats.len());
                Ok(body.chats)
            }
        }
    }

    async fn create_chat(
        &self,
        token: &str,
        contact_phone: &str,
    ) -> Result<CreatedChat, DirectoryError> {
        let response = self
            .client
            .post(&self.config.chats_url)
            .header(CREDENTIAL_HEADER, token)
            .json(&serde_json::json!({ "action": "create", "phone": contact_phone }))
            .send()
            .await
            .map_err(directory_transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(DirectoryError::ContactNotFound),
            StatusCode::UNAUTHORIZED => Err(DirectoryError::Unauthorized),
            status if !status.is_success() => {
                let text = Self::error_text(response).await;
                warn!("Create chat failed: {}", text);
                Err(DirectoryError::NetworkFailure(text))
            }
            _ => response
                .json::<CreatedChat>()
                .await
                .map_err(|e| DirectoryError::NetworkFailure(e.to_string())),
        }
    }

    async fn block_chat(&self, token: &str, chat_id: &str) -> Result<(), DirectoryError> {
        let response = self
            .client
            .post(&self.config.chats_url)
            .header(CREDENTIAL_HEADER, token)
            .json(&serde_json::json!({ "action": "block", "chatId": chat_id }))
            .send()
            .await
            .map_err(directory_transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(DirectoryError::Unauthorized),
            status if !status.is_success() => {
                Err(DirectoryError::NetworkFailure(Self::error_text(response).await))
            }
            _ => Ok(()),
        }
    }

    async fn fetch_messages(
        &self,
        token: &str,
        chat_id: &str,
    ) -> Result<Vec<MessageSnapshot>, MessageError> {
        let response = self
            .client
            .get(&self.config.messages_url)
            .query(&[("chatId", chat_id)])
            .header(CREDENTIAL_HEADER, token)
            .send()
            .await
            .map_err(message_transport_error)?;

        if !response.status().is_success() {
            return Err(MessageError::NetworkFailure(Self::error_text(response).await));
        }

        let body: MessageListResponse = response
            .json()
            .await
            .map_err(|e| MessageError::NetworkFailure(e.to_string()))?;
        debug!("Timeline snapshot for {}: {} messages", chat_id, body.messages.len());
        Ok(body.messages)
    }

    async fn send_message(
        &self,
        token: &str,
        outgoing: &OutgoingMessage,
    ) -> Result<MessageSnapshot, MessageError> {
        let response = self
            .client
            .post(&self.config.messages_url)
            .header(CREDENTIAL_HEADER, token)
            .json(outgoing)
            .send()
            .await
            .map_err(message_transport_error)?;

        if !response.status().is_success() {
            return Err(MessageError::SendFailed(Self::error_text(response).await));
        }

        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| MessageError::SendFailed(format!("Malformed send response: {}", e)))?;
        Ok(body.message)
    }
}
