//! At most one outstanding send per conversation

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::conversation::ConversationId;
use crate::error::{Error, Result};

/// Registry of conversations with a send in progress.
///
/// Cloning is cheap; clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<ConversationId>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` busy until the returned guard drops
    pub fn begin(&self, id: &ConversationId) -> Result<InFlightGuard> {
        let mut active = self.active.lock();
        if !active.insert(id.clone()) {
            return Err(Error::SendInFlight(id.to_string()));
        }
        Ok(InFlightGuard {
            active: Arc::clone(&self.active),
            id: id.clone(),
        })
    }

    pub fn is_active(&self, id: &ConversationId) -> bool {
        self.active.lock().contains(id)
    }
}

/// Clears the busy mark on drop, including on error and cancellation paths
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<ConversationId>>>,
    id: ConversationId,
}

impl InFlightGuard {
    pub fn id(&self) -> &ConversationId {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.id);
    }
}
