//! The room's chat timeline.

use std::collections::VecDeque;

use chrono::Utc;
use uuid::Uuid;
use watchparty_protocol::{ChatMessage, SYSTEM_SENDER_NAME, UserId};

use crate::RoomError;

/// An append-only, bounded chat log.
///
/// User lines and system notes share one append path, so `seq` gives a
/// single total order over everything the room has said.
#[derive(Debug)]
pub struct ChatLog {
    entries: VecDeque<ChatMessage>,
    next_seq: u64,
    retention: usize,
    max_chars: usize,
}

impl ChatLog {
    pub fn new(retention: usize, max_chars: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(retention.min(64)),
            next_seq: 1,
            retention,
            max_chars,
        }
    }

    /// Appends a user's line.
    ///
    /// # Errors
    /// [`RoomError::InvalidMessage`] if the trimmed text is empty or longer
    /// than the configured limit.
    pub fn post(
        &mut self,
        sender_id: &UserId,
        sender_name: &str,
        text: &str,
    ) -> Result<ChatMessage, RoomError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::InvalidMessage("message must not be empty".into()));
        }
        if text.chars().count() > self.max_chars {
            return Err(RoomError::InvalidMessage(format!(
                "message longer than {} characters",
                self.max_chars
            )));
        }
        Ok(self.append(sender_id.clone(), sender_name.to_string(), text.to_string(), false))
    }

    /// Appends a server-authored note.
    pub fn system(&mut self, text: impl Into<String>) -> ChatMessage {
        self.append(UserId::system(), SYSTEM_SENDER_NAME.to_string(), text.into(), true)
    }

    /// The last `n` lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ChatMessage> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(
        &mut self,
        sender_id: UserId,
        sender_name: String,
        text: String,
        is_system: bool,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender_id,
            sender_name,
            text,
            seq: self.next_seq,
            sent_at: Utc::now(),
            is_system,
        };
        self.next_seq += 1;

        if self.retention == 0 {
            return message;
        }
        while self.entries.len() >= self.retention {
            self.entries.pop_front();
        }
        self.entries.push_back(message.clone());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> ChatLog {
        ChatLog::new(500, 2000)
    }

    #[test]
    fn test_post_assigns_increasing_seq() {
        let mut chat = log();
        let a = chat.post(&UserId::new("u1"), "Alice", "hi").unwrap();
        let b = chat.system("Bob joined the watch party");
        let c = chat.post(&UserId::new("u2"), "Bob", "hey").unwrap();
        assert_eq!((a.seq, b.seq, c.seq), (1, 2, 3));
        assert!(b.is_system);
        assert_eq!(b.sender_id.as_str(), "system");
    }

    #[test]
    fn test_post_trims_text() {
        let mut chat = log();
        let msg = chat.post(&UserId::new("u1"), "Alice", "  hello  ").unwrap();
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_post_rejects_blank_text() {
        let mut chat = log();
        assert!(matches!(
            chat.post(&UserId::new("u1"), "Alice", "   "),
            Err(RoomError::InvalidMessage(_))
        ));
        assert!(chat.is_empty());
    }

    #[test]
    fn test_post_rejects_overlong_text() {
        let mut chat = ChatLog::new(10, 5);
        assert!(chat.post(&UserId::new("u1"), "Alice", "abcde").is_ok());
        assert!(chat.post(&UserId::new("u1"), "Alice", "abcdef").is_err());
    }

    #[test]
    fn test_retention_evicts_oldest_first() {
        let mut chat = ChatLog::new(3, 2000);
        for i in 0..5 {
            chat.system(format!("note {i}"));
        }
        assert_eq!(chat.len(), 3);
        let seqs: Vec<u64> = chat.recent(10).iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut chat = log();
        for i in 0..10 {
            chat.system(format!("note {i}"));
        }
        let tail = chat.recent(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "note 8");
        assert_eq!(tail[1].text, "note 9");
    }
}
