// Chat Directory Cache: the ordered set of chats known locally.
//
// Snapshots from the directory poll are authoritative for the fields they
// carry, but a chat missing from a snapshot is never removed: transient
// backend omissions must not make list entries flicker in and out. The
// only state transition that hides a chat from messaging is an explicit
// block, and even that keeps the entry.

use std::collections::HashMap;

use log::{debug, info};

use crate::api::ChatSnapshot;
use crate::models::Chat;

#[derive(Default)]
pub struct ChatDirectory {
    chats: Vec<Chat>,
    // chat id -> position in `chats`
    index: HashMap<String, usize>,
}

impl ChatDirectory {
    pub fn new() -> Self {
        ChatDirectory::default()
    }

    /// Read-only copy of the current chat list for the UI.
    pub fn chats(&self) -> Vec<Chat> {
        self.chats.clone()
    }

    pub fn get(&self, chat_id: &str) -> Option<&Chat> {
        self.index.get(chat_id).map(|&i| &self.chats[i])
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.index.contains_key(chat_id)
    }

    /// Merge an authoritative directory snapshot.
    ///
    /// Known ids are updated in place (preserving list position and the
    /// local `is_blocked` flag); unknown ids are appended in snapshot
    /// order; locally-known ids absent from the snapshot are kept as-is.
    /// Applying the same snapshot twice is a no-op the second time.
    pub fn merge_snapshot(&mut self, snapshot: Vec<ChatSnapshot>) {
        for incoming in snapshot {
            match self.index.get(&incoming.id) {
                Some(&i) => {
                    let existing = &mut self.chats[i];
                    existing.name = incoming.name;
                    existing.avatar = incoming.avatar;
                    existing.last_message = incoming.last_message;
                    existing.timestamp = incoming.timestamp;
                    existing.unread = incoming.unread;
                    existing.is_online = incoming.is_online;
                    existing.is_typing = incoming.is_typing;
                }
                None => {
                    debug!("Directory snapshot introduced new chat {}", incoming.id);
                    self.insert(incoming.into_chat());
                }
            }
        }
    }

    /// Insert or refresh a chat created locally (e.g. the result of a
    /// successful create-by-contact call). Returns a copy of the entry.
    pub fn upsert(&mut self, chat: Chat) -> Chat {
        match self.index.get(&chat.id) {
            Some(&i) => {
                // Keep the existing entry; refresh only display fields so a
                // re-create of an existing chat stays a no-op for history.
                let existing = &mut self.chats[i];
                if !chat.name.is_empty() {
                    existing.name = chat.name;
                }
                if !chat.avatar.is_empty() {
                    existing.avatar = chat.avatar;
                }
                existing.clone()
            }
            None => {
                let copy = chat.clone();
                self.insert(chat);
                copy
            }
        }
    }

    /// Reflect a local send in the chat's preview fields immediately,
    /// without waiting for the next poll.
    pub fn note_local_send(&mut self, chat_id: &str, text: &str, timestamp_label: &str) {
        if let Some(&i) = self.index.get(chat_id) {
            let chat = &mut self.chats[i];
            chat.last_message = text.to_string();
            chat.timestamp = timestamp_label.to_string();
            chat.is_typing = false;
        }
    }

    /// Mark a chat non-messageable after a confirmed block. The entry
    /// stays in the directory.
    pub fn mark_blocked(&mut self, chat_id: &str) {
        if let Some(&i) = self.index.get(chat_id) {
            info!("Chat {} marked blocked locally", chat_id);
            self.chats[i].is_blocked = true;
        }
    }

    /// Zero the unread counter when the user opens a chat; fetching the
    /// timeline marks messages read server-side, so this just anticipates
    /// the next authoritative snapshot.
    pub fn clear_unread(&mut self, chat_id: &str) {
        if let Some(&i) = self.index.get(chat_id) {
            self.chats[i].unread = 0;
        }
    }

    fn insert(&mut self, chat: Chat) {
        self.index.insert(chat.id.clone(), self.chats.len());
        self.chats.push(chat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, last_message: &str, unread: u32) -> ChatSnapshot {
        ChatSnapshot {
            id: id.to_string(),
            name: format!("Contact {}", id),
            avatar: String::new(),
            is_online: false,
            last_message: last_message.to_string(),
            timestamp: "12:00".to_string(),
            unread,
            is_typing: false,
        }
    }

    #[test]
    fn merge_inserts_unknown_and_updates_known() {
        let mut dir = ChatDirectory::new();
        dir.merge_snapshot(vec![snapshot("c1", "hi", 1)]);
        assert_eq!(dir.chats().len(), 1);

        dir.merge_snapshot(vec![snapshot("c1", "hello again", 3), snapshot("c2", "new", 0)]);
        let chats = dir.chats();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].last_message, "hello again");
        assert_eq!(chats[0].unread, 3);
        assert_eq!(chats[1].id, "c2");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut dir = ChatDirectory::new();
        let snap = vec![snapshot("c1", "hi", 2), snapshot("c2", "yo", 0)];
        dir.merge_snapshot(snap.clone());
        let once = dir.chats();
        dir.merge_snapshot(snap);
        assert_eq!(dir.chats(), once);
    }

    #[test]
    fn absent_chats_are_not_removed() {
        let mut dir = ChatDirectory::new();
        dir.merge_snapshot(vec![snapshot("c1", "hi", 0), snapshot("c2", "yo", 0)]);
        // Next snapshot omits c1 entirely; it must survive untouched.
        dir.merge_snapshot(vec![snapshot("c2", "still here", 0)]);
        assert!(dir.contains("c1"));
        assert_eq!(dir.get("c1").unwrap().last_message, "hi");
    }

    #[test]
    fn merge_preserves_local_block_flag() {
        let mut dir = ChatDirectory::new();
        dir.merge_snapshot(vec![snapshot("c1", "hi", 0)]);
        dir.mark_blocked("c1");
        dir.merge_snapshot(vec![snapshot("c1", "later", 0)]);
        assert!(dir.get("c1").unwrap().is_blocked);
        assert_eq!(dir.get("c1").unwrap().last_message, "later");
    }

    #[test]
    fn local_send_updates_preview() {
        let mut dir = ChatDirectory::new();
        dir.merge_snapshot(vec![snapshot("c1", "hi", 0)]);
        dir.note_local_send("c1", "outgoing text", "13:37");
        let chat = dir.get("c1").unwrap();
        assert_eq!(chat.last_message, "outgoing text");
        assert_eq!(chat.timestamp, "13:37");
        assert!(!chat.is_typing);
    }

    #[test]
    fn upsert_existing_is_a_no_op_for_identity() {
        let mut dir = ChatDirectory::new();
        dir.merge_snapshot(vec![snapshot("c1", "hi", 2)]);
        let existing = dir
            .upsert(Chat {
                id: "c1".to_string(),
                name: "Contact c1".to_string(),
                avatar: String::new(),
                last_message: String::new(),
                timestamp: String::new(),
                unread: 0,
                is_online: false,
                is_typing: false,
                is_blocked: false,
            });
        assert_eq!(existing.last_message, "hi");
        assert_eq!(existing.unread, 2);
        assert_eq!(dir.chats().len(), 1);
    }
}
