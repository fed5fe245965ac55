// Message Timeline Cache: per chat, the ordered, deduplicated message
// sequence the UI renders.
//
// Two sources write here. Server snapshots are authoritative for
// confirmed messages and their order. Local sends insert an optimistic
// entry immediately (status Pending) and reconcile it later: either the
// send call returns the confirmed message, or a poll lands first carrying
// the echoed correlation key. Either way the optimistic entry is replaced
// in place, same position, never a second bubble.
//
// Rendered order: confirmed messages in server order, with unconfirmed
// (pending/failed) local entries trailing after the last confirmed
// message. Newly confirmed messages from a snapshot are inserted before
// that trailing suffix so a pending send stays visually latest.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::api::MessageSnapshot;
use crate::models::{DeliveryStatus, Message};

#[derive(Default)]
pub struct Timeline {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl Timeline {
    pub fn new() -> Self {
        Timeline::default()
    }

    /// Read-only copy for the UI.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a locally-originated message before its network call is
    /// issued. The caller guarantees `delivery_status` is Pending and
    /// `client_ref` equals the temporary id.
    pub fn push_optimistic(&mut self, message: Message) {
        debug_assert_eq!(message.delivery_status, DeliveryStatus::Pending);
        self.ids.insert(message.id.clone());
        self.messages.push(message);
    }

    /// Merge an authoritative snapshot for this chat.
    ///
    /// For each server message, in server order:
    /// - id already known: update the existing entry in place and move the
    ///   insertion cursor past it;
    /// - correlation key matches a local unconfirmed entry: replace that
    ///   entry in place, adopting the permanent id;
    /// - otherwise: insert at the cursor, after the last message the
    ///   snapshot has placed so far.
    ///
    /// The cursor tracks server order through the known entries, so a
    /// snapshot carrying history older than an already-confirmed send
    /// inserts that history before it rather than after the confirmed
    /// prefix. Unconfirmed entries with no server counterpart are left
    /// untouched and keep trailing. The merge is synchronous and
    /// in-memory, so it is all-or-nothing with respect to concurrent
    /// readers.
    pub fn merge_snapshot(&mut self, chat_id: &str, snapshot: Vec<MessageSnapshot>) {
        let mut cursor = 0;

        for incoming in snapshot {
            let message = incoming.into_message(chat_id);

            if self.ids.contains(&message.id) {
                if let Some(pos) = self.messages.iter().position(|m| m.id == message.id) {
                    let existing = &mut self.messages[pos];
                    existing.text = message.text;
                    existing.timestamp = message.timestamp;
                    existing.delivery_status = message.delivery_status;
                    existing.attachment = message.attachment;
                    cursor = pos + 1;
                }
                continue;
            }

            if let Some(pos) = self.find_by_correlation(message.client_ref.as_deref()) {
                debug!(
                    "Reconciling optimistic message {} -> {} in chat {}",
                    self.messages[pos].id, message.id, chat_id
                );
                self.replace_at(pos, message);
                cursor = pos + 1;
                continue;
            }

            self.ids.insert(message.id.clone());
            self.messages.insert(cursor, message);
            cursor += 1;
        }
    }

    /// Reconcile an optimistic entry with the confirmed message the send
    /// call returned. Position is preserved; the permanent id replaces
    /// the temporary one.
    pub fn confirm(&mut self, client_ref: &str, mut confirmed: Message) {
        if confirmed.client_ref.is_none() {
            confirmed.client_ref = Some(client_ref.to_string());
        }

        if self.ids.contains(&confirmed.id) {
            // A poll already reconciled this send; authoritative fields
            // only need a refresh.
            if let Some(existing) = self.messages.iter_mut().find(|m| m.id == confirmed.id) {
                existing.delivery_status = confirmed.delivery_status;
                existing.timestamp = confirmed.timestamp;
            }
            return;
        }

        match self.find_by_correlation(Some(client_ref)) {
            Some(pos) => self.replace_at(pos, confirmed),
            None => {
                // The optimistic entry is gone (should not happen), but a
                // confirmed message must never be dropped.
                warn!("No optimistic entry for correlation {}; appending", client_ref);
                self.ids.insert(confirmed.id.clone());
                self.messages.push(confirmed);
            }
        }
    }

    /// Mark an optimistic entry failed after its send errored. The entry
    /// is kept, preserving the user's input for retry.
    pub fn mark_failed(&mut self, client_ref: &str) -> bool {
        match self.find_by_correlation(Some(client_ref)) {
            Some(pos) => {
                self.messages[pos].delivery_status = DeliveryStatus::Failed;
                true
            }
            None => false,
        }
    }

    /// Locate the unconfirmed entry whose correlation key matches.
    fn find_by_correlation(&self, client_ref: Option<&str>) -> Option<usize> {
        let needle = client_ref?;
        self.messages
            .iter()
            .position(|m| m.is_unconfirmed() && m.client_ref.as_deref() == Some(needle))
    }

    fn replace_at(&mut self, pos: usize, message: Message) {
        let old = std::mem::replace(&mut self.messages[pos], message);
        self.ids.remove(&old.id);
        self.ids.insert(self.messages[pos].id.clone());
    }
}

/// All timelines, keyed by chat id. Owned by the engine behind a single
/// lock; merges never hold the lock across an await point.
#[derive(Default)]
pub struct TimelineStore {
    timelines: HashMap<String, Timeline>,
}

impl TimelineStore {
    pub fn new() -> Self {
        TimelineStore::default()
    }

    pub fn timeline_mut(&mut self, chat_id: &str) -> &mut Timeline {
        self.timelines.entry(chat_id.to_string()).or_default()
    }

    pub fn messages(&self, chat_id: &str) -> Vec<Message> {
        self.timelines
            .get(chat_id)
            .map(|t| t.messages())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryStatus;

    fn server_msg(id: &str, text: &str, is_sent: bool) -> MessageSnapshot {
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

    fn optimistic(temp_id: &str, text: &str) -> Message {
        Message {
            id: temp_id.to_string(),
            chat_id: "c1".to_string(),
            text: text.to_string(),
            timestamp: "12:01".to_string(),
            is_sent: true,
            delivery_status: DeliveryStatus::Pending,
            attachment: None,
            client_ref: Some(temp_id.to_string()),
        }
    }

    #[test]
    fn snapshot_merge_preserves_server_order() {
        let mut tl = Timeline::new();
        tl.merge_snapshot(
            "c1",
            vec![server_msg("m1", "a", false), server_msg("m2", "b", true)],
        );
        let msgs = tl.messages();
        assert_eq!(msgs.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["m1", "m2"]);
    }

    #[test]
    fn snapshot_merge_is_idempotent() {
        let mut tl = Timeline::new();
        let snap = vec![server_msg("m1", "a", false), server_msg("m2", "b", true)];
        tl.merge_snapshot("c1", snap.clone());
        let once = tl.messages();
        tl.merge_snapshot("c1", snap);
        assert_eq!(tl.messages(), once);
    }

    #[test]
    fn pending_messages_trail_confirmed_ones() {
        let mut tl = Timeline::new();
        tl.merge_snapshot("c1", vec![server_msg("m1", "a", false)]);
        tl.push_optimistic(optimistic("tmp-1", "outgoing"));

        // New confirmed counterpart message arrives; it must slot in
        // before the still-pending local send.
        tl.merge_snapshot(
            "c1",
            vec![server_msg("m1", "a", false), server_msg("m2", "reply", false)],
        );

        let ids: Vec<_> = tl.messages().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, ["m1", "m2", "tmp-1"]);
        assert_eq!(tl.messages()[2].delivery_status, DeliveryStatus::Pending);
    }

    #[test]
    fn send_confirmation_replaces_in_place() {
        let mut tl = Timeline::new();
        tl.push_optimistic(optimistic("tmp-1", "Hello"));
        assert_eq!(tl.len(), 1);

        let confirmed = server_msg("m42", "Hello", true).into_message("c1");
        tl.confirm("tmp-1", confirmed);

        let msgs = tl.messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, "m42");
        assert_eq!(msgs[0].delivery_status, DeliveryStatus::Sent);
        assert!(msgs[0].is_sent);
    }

    #[test]
    fn poll_reconciles_optimistic_by_correlation() {
        let mut tl = Timeline::new();
        tl.merge_snapshot("c1", vec![server_msg("m1", "a", false)]);
        tl.push_optimistic(optimistic("tmp-1", "Hello"));

        // Poll lands before the send call returns; the snapshot already
        // contains the message with the echoed correlation key.
        let mut echoed = server_msg("m42", "Hello", true);
        echoed.client_ref = Some("tmp-1".to_string());
        tl.merge_snapshot("c1", vec![server_msg("m1", "a", false), echoed]);

        let msgs = tl.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].id, "m42");
        assert_eq!(msgs[1].delivery_status, DeliveryStatus::Sent);

        // The late send confirmation must not duplicate it either.
        let mut confirmed = server_msg("m42", "Hello", true).into_message("c1");
        confirmed.delivery_status = DeliveryStatus::Delivered;
        tl.confirm("tmp-1", confirmed);
        assert_eq!(tl.len(), 2);
        assert_eq!(tl.messages()[1].delivery_status, DeliveryStatus::Delivered);
    }

    #[test]
    fn failed_send_is_kept_and_not_falsely_confirmed() {
        let mut tl = Timeline::new();
        tl.push_optimistic(optimistic("tmp-1", "Hello"));
        assert!(tl.mark_failed("tmp-1"));
        assert_eq!(tl.messages()[0].delivery_status, DeliveryStatus::Failed);

        // A refresh without a matching server message leaves it failed.
        tl.merge_snapshot("c1", vec![server_msg("m1", "unrelated", false)]);
        let msgs = tl.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].id, "tmp-1");
        assert_eq!(msgs[1].delivery_status, DeliveryStatus::Failed);

        // But if the server did record it (echoed correlation), the
        // failed entry reconciles like a pending one.
        let mut echoed = server_msg("m7", "Hello", true);
        echoed.client_ref = Some("tmp-1".to_string());
        tl.merge_snapshot("c1", vec![server_msg("m1", "unrelated", false), echoed]);
        let msgs = tl.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].id, "m7");
        assert_eq!(msgs[1].delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn history_arriving_after_a_confirmed_send_slots_in_before_it() {
        // Open chat, send immediately, confirmation returns before the
        // first (slow) refresh has delivered any history.
        let mut tl = Timeline::new();
        tl.push_optimistic(optimistic("tmp-1", "Hello"));
        tl.confirm("tmp-1", server_msg("m42", "Hello", true).into_message("c1"));
        assert_eq!(tl.messages()[0].id, "m42");

        // The refresh lands with older history ahead of the send; server
        // order must win among confirmed messages.
        let snap = vec![server_msg("h1", "earlier", false), server_msg("m42", "Hello", true)];
        tl.merge_snapshot("c1", snap.clone());
        let ids: Vec<_> = tl.messages().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, ["h1", "m42"]);

        // And the order is stable across repeated merges.
        tl.merge_snapshot("c1", snap);
        let ids: Vec<_> = tl.messages().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, ["h1", "m42"]);
    }

    #[test]
    fn status_updates_apply_in_place() {
        let mut tl = Timeline::new();
        tl.merge_snapshot("c1", vec![server_msg("m1", "a", true)]);
        assert_eq!(tl.messages()[0].delivery_status, DeliveryStatus::Sent);

        let mut read = server_msg("m1", "a", true);
        read.status = Some("read".to_string());
        tl.merge_snapshot("c1", vec![read]);
        assert_eq!(tl.len(), 1);
        assert_eq!(tl.messages()[0].delivery_status, DeliveryStatus::Read);
    }
}
