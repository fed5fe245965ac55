// Synchronization engine for Nuntius.
// This module is the entry point for all state reconciliation between the
// local caches and the poll-only backend: seeding at login, periodic
// refresh, optimistic local mutations, and reconciliation when
// authoritative data arrives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Local;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex as TokioMutex};
use uuid::Uuid;

pub mod directory;
pub mod scheduler;
pub mod selection;
pub mod timeline;

pub use scheduler::DEFAULT_POLL_INTERVAL;

use crate::api::{ChatBackend, DirectoryError, MessageError, OutgoingMessage};
use crate::models::{Attachment, Chat, DeliveryStatus, Message, UserProfile};
use crate::session::Session;
use directory::ChatDirectory;
use scheduler::{InflightGuard, PollScheduler};
use selection::{ActiveSelection, SelectionChange};
use timeline::TimelineStore;

/// Notifications for the UI layer. The payloads are deliberately thin:
/// consumers re-read snapshots through `chats()` / `timeline()`, they
/// never receive mutable state.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The chat directory changed (poll merge, create, or local preview
    /// update).
    ChatsUpdated,
    /// The timeline for the given chat changed.
    TimelineUpdated(String),
    /// A user-initiated send failed; the optimistic entry is kept with
    /// status Failed so the user can retry.
    MessageFailed { chat_id: String, message_id: String },
    /// A block was confirmed by the directory service.
    ChatBlocked(String),
}

struct EngineInner {
    token: String,
    user: TokioMutex<UserProfile>,
    backend: Arc<dyn ChatBackend>,
    directory: TokioMutex<ChatDirectory>,
    timelines: TokioMutex<TimelineStore>,
    selection: ActiveSelection,
    directory_inflight: InflightGuard,
    // One guard per chat: polls for the same timeline coalesce, polls for
    // different timelines proceed independently.
    timeline_inflight: StdMutex<HashMap<String, InflightGuard>>,
    events_tx: mpsc::Sender<SyncEvent>,
}

/// The synchronization engine. Owns the session, both caches, the active
/// selection and the poll loop; the UI talks to it exclusively through
/// intents (select, send, create, block) and read-only snapshots.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    scheduler: PollScheduler,
}

impl SyncEngine {
    /// Build an engine for an authenticated session. Returns the engine
    /// plus the receiver for UI notifications, mirroring how a client and
    /// its message channel are created together.
    pub fn new(
        session: Session,
        backend: Arc<dyn ChatBackend>,
    ) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (events_tx, events_rx) = mpsc::channel(100);

        let inner = Arc::new(EngineInner {
            token: session.token,
            user: TokioMutex::new(session.user),
            backend,
            directory: TokioMutex::new(ChatDirectory::new()),
            timelines: TokioMutex::new(TimelineStore::new()),
            selection: ActiveSelection::new(),
            directory_inflight: InflightGuard::new(),
            timeline_inflight: StdMutex::new(HashMap::new()),
            events_tx,
        });

        (
            SyncEngine {
                inner,
                scheduler: PollScheduler::new(),
            },
            events_rx,
        )
    }

    /// Start the background poll loop. The first tick runs immediately
    /// and seeds the directory cache.
    pub async fn start(&self, interval: std::time::Duration) {
        let inner = self.inner.clone();
        self.scheduler
            .start(interval, move || {
                let inner = inner.clone();
                async move {
                    // Directory and active-chat refresh share the cadence;
                    // run them concurrently within the tick.
                    futures::future::join(inner.poll_directory(), inner.poll_active_timeline())
                        .await;
                }
            })
            .await;
    }

    /// Stop all background activity. No poll task or pending refresh
    /// outlives this call; late results are discarded by generation.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        self.inner.selection.abort_refresh().await;
        info!("Sync engine shut down");
    }

    // ---- snapshots -------------------------------------------------------

    pub async fn chats(&self) -> Vec<Chat> {
        self.inner.directory.lock().await.chats()
    }

    pub async fn timeline(&self, chat_id: &str) -> Vec<Message> {
        self.inner.timelines.lock().await.messages(chat_id)
    }

    pub async fn active_chat(&self) -> Option<String> {
        self.inner.selection.current().await
    }

    pub async fn user(&self) -> UserProfile {
        self.inner.user.lock().await.clone()
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    // ---- intents ---------------------------------------------------------

    /// Open a chat (or close with None). Reselecting the open chat is a
    /// no-op; otherwise the in-flight refresh for the departed chat is
    /// cancelled and the new chat is refreshed immediately instead of
    /// waiting for the next tick.
    pub async fn select_chat(&self, chat_id: Option<&str>) {
        let generation = match self.inner.selection.change_to(chat_id).await {
            SelectionChange::Unchanged => return,
            SelectionChange::Changed { generation } => generation,
        };

        let Some(chat_id) = chat_id else {
            return;
        };

        {
            let mut dir = self.inner.directory.lock().await;
            dir.clear_unread(chat_id);
        }
        self.inner.emit(SyncEvent::ChatsUpdated);

        let inner = self.inner.clone();
        let chat_id = chat_id.to_string();
        let handle = tokio::spawn(async move {
            inner.refresh_timeline(&chat_id, generation).await;
        });
        self.inner.selection.track_refresh(handle).await;
    }

    /// Send a message to a chat. The optimistic entry is appended before
    /// the network call is issued, so callers observe the send instantly;
    /// the returned message is the server-confirmed form.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        attachment: Option<Attachment>,
    ) -> Result<Message, MessageError> {
        if let Some(chat) = self.inner.directory.lock().await.get(chat_id) {
            if chat.is_blocked {
                return Err(MessageError::SendFailed("chat is blocked".to_string()));
            }
        }

        let temp_id = Uuid::new_v4().to_string();
        let label = now_label();
        let optimistic = Message {
            id: temp_id.clone(),
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            timestamp: label.clone(),
            is_sent: true,
            delivery_status: DeliveryStatus::Pending,
            attachment: attachment.clone(),
            client_ref: Some(temp_id.clone()),
        };

        {
            let mut timelines = self.inner.timelines.lock().await;
            timelines.timeline_mut(chat_id).push_optimistic(optimistic);
        }
        {
            let mut dir = self.inner.directory.lock().await;
            dir.note_local_send(chat_id, text, &label);
        }
        self.inner.emit(SyncEvent::TimelineUpdated(chat_id.to_string()));
        self.inner.emit(SyncEvent::ChatsUpdated);

        let outgoing = OutgoingMessage::new(chat_id, text, &temp_id, attachment.as_ref());
        match self.inner.backend.send_message(&self.inner.token, &outgoing).await {
            Ok(snapshot) => {
                let confirmed = snapshot.into_message(chat_id);
                let result = confirmed.clone();
                {
                    let mut timelines = self.inner.timelines.lock().await;
                    timelines.timeline_mut(chat_id).confirm(&temp_id, confirmed);
                }
                self.inner.emit(SyncEvent::TimelineUpdated(chat_id.to_string()));
                Ok(result)
            }
            Err(e) => {
                error!("Send to {} failed: {}", chat_id, e);
                {
                    let mut timelines = self.inner.timelines.lock().await;
                    timelines.timeline_mut(chat_id).mark_failed(&temp_id);
                }
                self.inner.emit(SyncEvent::MessageFailed {
                    chat_id: chat_id.to_string(),
                    message_id: temp_id,
                });
                self.inner.emit(SyncEvent::TimelineUpdated(chat_id.to_string()));
                Err(e)
            }
        }
    }

    /// Create (or find) the chat with the user behind `contact_phone`. On
    /// success the entry is inserted into the directory immediately; if a
    /// chat with that counterpart already exists the existing entry is
    /// returned unchanged.
    pub async fn create_chat(&self, contact_phone: &str) -> Result<Chat, DirectoryError> {
        match self.inner.backend.create_chat(&self.inner.token, contact_phone).await {
            Ok(created) => {
                let chat = Chat {
                    id: created.chat_id,
                    name: created.contact.name,
                    avatar: created.contact.avatar.unwrap_or_default(),
                    last_message: String::new(),
                    timestamp: String::new(),
                    unread: 0,
                    is_online: false,
                    is_typing: false,
                    is_blocked: false,
                };
                let entry = {
                    let mut dir = self.inner.directory.lock().await;
                    dir.upsert(chat)
                };
                self.inner.emit(SyncEvent::ChatsUpdated);
                Ok(entry)
            }
            Err(DirectoryError::AlreadyExists(chat_id)) => {
                // Idempotent by design: resolve to the existing entry,
                // refreshing the directory if this client has not seen the
                // chat yet. The refresh fetches directly rather than going
                // through poll_directory, whose in-flight guard would
                // coalesce it away while a background poll is running.
                if let Some(existing) = self.inner.directory.lock().await.get(&chat_id).cloned() {
                    return Ok(existing);
                }
                self.inner.fetch_and_merge_directory().await?;
                self.inner
                    .directory
                    .lock()
                    .await
                    .get(&chat_id)
                    .cloned()
                    .ok_or(DirectoryError::AlreadyExists(chat_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Block the counterpart of a chat. The entry stays in the directory
    /// (history is kept) but is marked non-messageable; if the chat was
    /// open, the selection is cleared.
    pub async fn block_chat(&self, chat_id: &str) -> Result<(), DirectoryError> {
        self.inner.backend.block_chat(&self.inner.token, chat_id).await?;

        {
            let mut dir = self.inner.directory.lock().await;
            dir.mark_blocked(chat_id);
        }
        if self.inner.selection.clear_if(chat_id).await {
            debug!("Cleared selection: active chat {} was blocked", chat_id);
        }
        self.inner.emit(SyncEvent::ChatBlocked(chat_id.to_string()));
        self.inner.emit(SyncEvent::ChatsUpdated);
        Ok(())
    }

    /// Apply a profile edit. Mutates the identity fields only; the
    /// credential is immutable while the session is active.
    pub async fn update_profile(&self, user: UserProfile) -> anyhow::Result<()> {
        {
            let mut current = self.inner.user.lock().await;
            *current = user.clone();
        }
        crate::session::save_session(&Session {
            user,
            token: self.inner.token.clone(),
        })
    }

    /// Force a directory refresh outside the cadence (e.g. pull-to-
    /// refresh). Shares the in-flight guard with the poll loop.
    pub async fn refresh_now(&self) {
        self.inner.poll_directory().await;
    }
}

impl EngineInner {
    /// One directory poll. Failures are logged and swallowed: a transient
    /// poll error must never disrupt the UI.
    async fn poll_directory(&self) {
        let Some(_token) = self.directory_inflight.try_begin() else {
            debug!("Directory refresh already in flight; tick coalesced");
            return;
        };

        if let Err(e) = self.fetch_and_merge_directory().await {
            warn!("Directory poll failed (will retry next tick): {}", e);
        }
    }

    /// Fetch a directory snapshot and merge it, unconditionally. Callers
    /// that must observe the result (create-chat recovery) use this
    /// directly; the poll loop wraps it in the in-flight guard.
    async fn fetch_and_merge_directory(&self) -> Result<(), DirectoryError> {
        let snapshot = self.backend.fetch_chats(&self.token).await?;
        {
            let mut dir = self.directory.lock().await;
            dir.merge_snapshot(snapshot);
        }
        self.emit(SyncEvent::ChatsUpdated);
        Ok(())
    }

    /// Refresh the currently selected chat's timeline, if any.
    async fn poll_active_timeline(&self) {
        let Some(chat_id) = self.selection.current().await else {
            return;
        };
        let generation = self.selection.generation();
        self.refresh_timeline(&chat_id, generation).await;
    }

    /// Fetch and merge one timeline snapshot, tagged with the selection
    /// generation it was started under. A result arriving after the
    /// selection moved is discarded without touching any cache.
    async fn refresh_timeline(&self, chat_id: &str, generation: u64) {
        let guard = {
            let mut guards = self.timeline_inflight.lock().unwrap();
            guards.entry(chat_id.to_string()).or_default().clone()
        };
        let Some(_token) = guard.try_begin() else {
            debug!("Timeline refresh for {} already in flight; tick coalesced", chat_id);
            return;
        };

        match self.backend.fetch_messages(&self.token, chat_id).await {
            Ok(snapshot) => {
                if !self.selection.is_current(generation) {
                    debug!("Discarding stale timeline result for {}", chat_id);
                    return;
                }
                {
                    let mut timelines = self.timelines.lock().await;
                    timelines.timeline_mut(chat_id).merge_snapshot(chat_id, snapshot);
                }
                self.emit(SyncEvent::TimelineUpdated(chat_id.to_string()));
            }
            Err(e) => warn!("Timeline poll for {} failed (will retry next tick): {}", chat_id, e),
        }
    }

    /// Hand an event to the UI without ever blocking engine progress on a
    /// slow consumer.
    fn emit(&self, event: SyncEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!("Dropping sync event, receiver not keeping up: {}", e);
        }
    }
}

fn now_label() -> String {
    Local::now().format("%H:%M").to_string()
}
