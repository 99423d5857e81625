//! Conversation persistence boundary

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::conversation::{Conversation, ConversationId};
use crate::error::Result;

/// Storage for conversation records
pub trait ConversationRepository: Send + Sync {
    /// Insert or replace a conversation
    fn save(&self, conversation: &Conversation) -> Result<()>;

    fn load(&self, id: &ConversationId) -> Result<Option<Conversation>>;

    fn load_all(&self) -> Result<Vec<Conversation>>;

    /// Remove a conversation. Deleting an unknown id is not an error.
    fn delete(&self, id: &ConversationId) -> Result<()>;
}

/// Repository kept in process memory
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<BTreeMap<ConversationId, Conversation>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ConversationRepository for MemoryRepository {
    fn save(&self, conversation: &Conversation) -> Result<()> {
        self.records
            .lock()
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    fn load(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn load_all(&self) -> Result<Vec<Conversation>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn delete(&self, id: &ConversationId) -> Result<()> {
        self.records.lock().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::DEFAULT_TOKEN_LIMIT;

    #[test]
    fn test_save_load_delete() {
        let repo = MemoryRepository::new();
        let conv = Conversation::new(DEFAULT_TOKEN_LIMIT);
        repo.save(&conv).unwrap();
        assert_eq!(repo.load(&conv.id).unwrap(), Some(conv.clone()));
        assert_eq!(repo.load_all().unwrap().len(), 1);

        repo.delete(&conv.id).unwrap();
        assert!(repo.load(&conv.id).unwrap().is_none());
        assert!(repo.is_empty());
        repo.delete(&conv.id).unwrap();
    }
}
