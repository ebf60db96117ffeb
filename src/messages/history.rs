use super::storage::{Storage, HISTORY_KEY};
use super::types::{Role, Turn};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// The full, never-trimmed list of turns shown to the user
#[derive(Clone)]
pub struct ConversationHistory {
    turns: Arc<RwLock<Vec<Turn>>>,
    storage: Arc<dyn Storage>,
}

impl ConversationHistory {
    /// Load the history persisted in `storage`, starting empty if there is none
    /// or if it cannot be read
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let turns = match storage.get(HISTORY_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<Turn>>(&json) {
                Ok(turns) => turns,
                Err(e) => {
                    warn!("Discarding unreadable conversation history: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Error reading conversation history: {}", e);
                Vec::new()
            }
        };

        debug!("Loaded {} history turns", turns.len());

        Self {
            turns: Arc::new(RwLock::new(turns)),
            storage,
        }
    }

    /// Append a turn, assigning the next sequence number
    pub fn append(&self, role: Role, content: impl Into<String>, is_audio: bool) -> Turn {
        let mut turns = self.turns.write();
        let turn = Self::next_turn(&turns, role, content.into(), is_audio);
        turns.push(turn.clone());
        self.persist(&turns);
        turn
    }

    /// Append a user turn and the assistant's reply as one write
    pub fn append_exchange(
        &self,
        user_content: impl Into<String>,
        is_audio: bool,
        reply: impl Into<String>,
    ) -> (Turn, Turn) {
        let mut turns = self.turns.write();
        let user = Self::next_turn(&turns, Role::User, user_content.into(), is_audio);
        turns.push(user.clone());
        let assistant = Self::next_turn(&turns, Role::Assistant, reply.into(), false);
        turns.push(assistant.clone());
        self.persist(&turns);
        (user, assistant)
    }

    pub fn get_all(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    /// Most recent assistant turn, e.g. for replaying it through speech
    pub fn last_assistant(&self) -> Option<Turn> {
        self.turns
            .read()
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .cloned()
    }

    /// Empty the history and drop its durable key
    pub fn clear(&self) {
        self.turns.write().clear();
        if let Err(e) = self.storage.remove(HISTORY_KEY) {
            warn!("Error clearing conversation history: {}", e);
        }
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    fn next_turn(turns: &[Turn], role: Role, content: String, is_audio: bool) -> Turn {
        let sequence = turns.last().map_or(0, |t| t.sequence + 1);
        let turn = Turn::new(role, content, sequence);
        if is_audio {
            turn.audio_sourced()
        } else {
            turn
        }
    }

    fn persist(&self, turns: &[Turn]) {
        let result = serde_json::to_string(turns)
            .map_err(crate::ParleyError::from)
            .and_then(|json| self.storage.set(HISTORY_KEY, &json));
        if let Err(e) = result {
            warn!("Error saving conversation history: {}", e);
        }
    }
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("turns", &self.turns.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::storage::MemoryStorage;

    fn history() -> (ConversationHistory, MemoryStorage) {
        let storage = MemoryStorage::new();
        (ConversationHistory::load(Arc::new(storage.clone())), storage)
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let (history, _) = history();
        let a = history.append(Role::User, "a", false);
        let (b, c) = history.append_exchange("b", true, "c");

        assert_eq!(a.sequence, 0);
        assert_eq!(b.sequence, 1);
        assert_eq!(c.sequence, 2);
        assert!(b.is_audio);
        assert!(!c.is_audio);
        assert_eq!(c.role, Role::Assistant);
    }

    #[test]
    fn test_history_is_never_trimmed() {
        let (history, _) = history();
        for i in 0..50 {
            history.append_exchange(format!("q{}", i), false, format!("a{}", i));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.get_all()[0].content, "q0");
    }

    #[test]
    fn test_history_survives_reload() {
        let (history, storage) = history();
        history.append_exchange("hello", false, "hi there");

        let reloaded = ConversationHistory::load(Arc::new(storage));
        let turns = reloaded.get_all();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "hi there");

        let next = reloaded.append(Role::User, "again", false);
        assert_eq!(next.sequence, 2);
    }

    #[test]
    fn test_last_assistant() {
        let (history, _) = history();
        assert!(history.last_assistant().is_none());
        history.append_exchange("q1", false, "a1");
        history.append_exchange("q2", false, "a2");
        history.append(Role::User, "q3", false);
        assert_eq!(history.last_assistant().unwrap().content, "a2");
    }

    #[test]
    fn test_clear_removes_key() {
        let (history, storage) = history();
        history.append_exchange("q", false, "a");
        assert!(storage.get(HISTORY_KEY).unwrap().is_some());

        history.clear();
        history.clear();
        assert!(history.is_empty());
        assert_eq!(storage.get(HISTORY_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_history_loads_empty() {
        let storage = MemoryStorage::new();
        storage.set(HISTORY_KEY, "{not json").unwrap();
        let history = ConversationHistory::load(Arc::new(storage));
        assert!(history.is_empty());
    }
}
