//! Persistent SQLite store for conversation logs and profile histories.

use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::bot::message::StoredMessage;

/// One observed state of a counterparty's profile. Appended to the history
/// only when it differs from the latest prior snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub display_name: String,
    pub avatar_url: String,
    pub captured_at: String,
}

/// Append-only store of per-conversation messages and profile change-logs.
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory store");
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema();
        store
    }

    /// Open the store at the given path, creating it if needed.
    pub fn load_or_new(path: &Path) -> Self {
        let conn = Connection::open(path).expect("Failed to open conversation store");
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema();

        let count: i64 = store
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap_or(0);
        info!("Loaded conversation store from {:?} ({} messages)", path, count);

        store
    }

    fn init_schema(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                conversation_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profile_history (
                conversation_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                avatar_url TEXT NOT NULL,
                captured_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_profile_conversation
                ON profile_history(conversation_id);
        "#,
        )
        .expect("Failed to initialize store schema");
    }

    /// Append a message to a conversation's log. Write failures are logged
    /// and swallowed: the reply already on the wire takes priority.
    pub fn append_message(&self, conversation_id: &str, msg: &StoredMessage) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (conversation_id, message_id, sender, text, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![conversation_id, msg.message_id, msg.sender, msg.text, msg.timestamp],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to store message in {}: {e}", conversation_id);
            0
        });
    }

    /// The `limit` most recent messages of a conversation, oldest first.
    pub fn recent_messages(&self, conversation_id: &str, limit: usize) -> Vec<StoredMessage> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT message_id, sender, text, timestamp FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                warn!("Failed to query messages for {}: {e}", conversation_id);
                return Vec::new();
            }
        };

        let rows = stmt.query_map(params![conversation_id, limit as i64], |row| {
            Ok(StoredMessage {
                message_id: row.get(0)?,
                sender: row.get(1)?,
                text: row.get(2)?,
                timestamp: row.get(3)?,
            })
        });

        let mut result: Vec<StoredMessage> = match rows {
            Ok(rows) => rows.flatten().collect(),
            Err(e) => {
                warn!("Failed to read messages for {}: {e}", conversation_id);
                return Vec::new();
            }
        };

        result.reverse();
        result
    }

    /// Append a profile snapshot if it differs from the latest one on
    /// record. Returns whether a new snapshot was written.
    pub fn record_profile(&self, conversation_id: &str, snapshot: &ProfileSnapshot) -> bool {
        if let Some(last) = self.latest_profile(conversation_id)
            && last.display_name == snapshot.display_name
            && last.avatar_url == snapshot.avatar_url
        {
            return false;
        }

        let conn = self.conn.lock().unwrap();
        let written = conn
            .execute(
                "INSERT INTO profile_history (conversation_id, display_name, avatar_url, captured_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation_id,
                    snapshot.display_name,
                    snapshot.avatar_url,
                    snapshot.captured_at
                ],
            )
            .unwrap_or_else(|e| {
                warn!("Failed to store profile snapshot for {}: {e}", conversation_id);
                0
            });
        written > 0
    }

    /// The most recent profile snapshot for a conversation.
    pub fn latest_profile(&self, conversation_id: &str) -> Option<ProfileSnapshot> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT display_name, avatar_url, captured_at FROM profile_history
             WHERE conversation_id = ?1 ORDER BY rowid DESC LIMIT 1",
            params![conversation_id],
            |row| {
                Ok(ProfileSnapshot {
                    display_name: row.get(0)?,
                    avatar_url: row.get(1)?,
                    captured_at: row.get(2)?,
                })
            },
        )
        .ok()
    }

    /// Cached display name for a conversation, derived from the profile
    /// history rather than a live fetch.
    pub fn display_name(&self, conversation_id: &str) -> Option<String> {
        self.latest_profile(conversation_id).map(|p| p.display_name)
    }

    #[cfg(test)]
    fn profile_count(&self, conversation_id: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM profile_history WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get::<_, i64>(0),
        )
        .unwrap_or(0) as usize
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_msg(id: &str, sender: &str, timestamp: &str, text: &str) -> StoredMessage {
        StoredMessage {
            message_id: id.to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: timestamp.to_string(),
        }
    }

    fn snapshot(name: &str, avatar: &str, at: &str) -> ProfileSnapshot {
        ProfileSnapshot {
            display_name: name.to_string(),
            avatar_url: avatar.to_string(),
            captured_at: at.to_string(),
        }
    }

    #[test]
    fn test_recent_messages_ordering_and_limit() {
        let store = ConversationStore::new();
        store.append_message("c1", &make_msg("m1", "c1", "2026-01-01T10:00:00Z", "one"));
        store.append_message("c1", &make_msg("m2", "bot", "2026-01-01T10:01:00Z", "two"));
        store.append_message("c1", &make_msg("m3", "c1", "2026-01-01T10:02:00Z", "three"));

        let recent = store.recent_messages("c1", 2);
        assert_eq!(recent.len(), 2);
        // Chronological order: the two newest, oldest of them first.
        assert_eq!(recent[0].text, "two");
        assert_eq!(recent[1].text, "three");
    }

    #[test]
    fn test_recent_messages_isolated_per_conversation() {
        let store = ConversationStore::new();
        store.append_message("c1", &make_msg("m1", "c1", "2026-01-01T10:00:00Z", "one"));
        store.append_message("c2", &make_msg("m2", "c2", "2026-01-01T10:01:00Z", "other"));

        let recent = store.recent_messages("c1", 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "one");
        assert!(store.recent_messages("c3", 10).is_empty());
    }

    #[test]
    fn test_profile_history_is_a_change_log() {
        let store = ConversationStore::new();
        let first = snapshot("Alice", "http://a/1.jpg", "2026-01-01T10:00:00Z");

        assert!(store.record_profile("c1", &first));
        // Same name and avatar, later capture time: not appended.
        assert!(!store.record_profile("c1", &snapshot("Alice", "http://a/1.jpg", "2026-01-02T10:00:00Z")));
        assert_eq!(store.profile_count("c1"), 1);

        // Avatar changed: appended.
        assert!(store.record_profile("c1", &snapshot("Alice", "http://a/2.jpg", "2026-01-03T10:00:00Z")));
        assert_eq!(store.profile_count("c1"), 2);
        assert_eq!(store.latest_profile("c1").unwrap().avatar_url, "http://a/2.jpg");
    }

    #[test]
    fn test_display_name_from_latest_snapshot() {
        let store = ConversationStore::new();
        assert_eq!(store.display_name("c1"), None);

        store.record_profile("c1", &snapshot("Alice", "http://a/1.jpg", "2026-01-01T10:00:00Z"));
        store.record_profile("c1", &snapshot("Alicia", "http://a/1.jpg", "2026-01-02T10:00:00Z"));
        assert_eq!(store.display_name("c1").as_deref(), Some("Alicia"));
    }

    #[test]
    fn test_load_or_new_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.db");

        {
            let store = ConversationStore::load_or_new(&path);
            store.append_message("c1", &make_msg("m1", "c1", "2026-01-01T10:00:00Z", "hello"));
        }

        let store = ConversationStore::load_or_new(&path);
        let recent = store.recent_messages("c1", 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "hello");
    }
}
