// Active Selection State: which chat is open, and the machinery that
// keeps late refresh results for a previously-open chat from touching
// the caches.
//
// Every selection change bumps a generation counter and aborts the
// in-flight refresh task for the departed chat. A refresh captures the
// generation it was started under and re-checks it before applying its
// result, so even a result that raced past the abort is discarded.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct ActiveSelection {
    current: Mutex<Option<String>>,
    generation: AtomicU64,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Outcome of a selection change request.
pub enum SelectionChange {
    /// Reselecting the already-open chat: nothing to do.
    Unchanged,
    /// Selection moved; carries the generation the caller must tag any
    /// follow-up refresh with.
    Changed { generation: u64 },
}

impl ActiveSelection {
    pub fn new() -> Self {
        ActiveSelection {
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
            refresh_handle: Mutex::new(None),
        }
    }

    pub async fn current(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// True if `generation` still matches, i.e. the selection has not
    /// moved since the tagged operation began.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Move the selection. Aborts the outstanding refresh for the chat
    /// being left and invalidates its generation.
    pub async fn change_to(&self, chat_id: Option<&str>) -> SelectionChange {
        let mut current = self.current.lock().await;
        if current.as_deref() == chat_id {
            return SelectionChange::Unchanged;
        }

        debug!("Selection moving from {:?} to {:?}", current.as_deref(), chat_id);
        *current = chat_id.map(|s| s.to_string());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(handle) = self.refresh_handle.lock().await.take() {
            handle.abort();
        }

        SelectionChange::Changed { generation }
    }

    /// Drop the selection if it points at `chat_id` (used after a block).
    pub async fn clear_if(&self, chat_id: &str) -> bool {
        let mut current = self.current.lock().await;
        if current.as_deref() == Some(chat_id) {
            *current = None;
            self.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = self.refresh_handle.lock().await.take() {
                handle.abort();
            }
            true
        } else {
            false
        }
    }

    /// Remember the refresh task for the currently selected chat so the
    /// next selection change can cancel it.
    pub async fn track_refresh(&self, handle: JoinHandle<()>) {
        let mut slot = self.refresh_handle.lock().await;
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Abort whatever refresh is outstanding; used at engine teardown.
    pub async fn abort_refresh(&self) {
        if let Some(handle) = self.refresh_handle.lock().await.take() {
            handle.abort();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for ActiveSelection {
    fn default() -> Self {
        ActiveSelection::new()
    }
}
