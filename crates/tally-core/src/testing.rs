//! Scripted assistant client for tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tally_ai::{AssistantClient, Reply};
use tokio::sync::Notify;

/// Replies and thread ids are taken from queues; when a queue is empty the
/// client answers `"ok"` and numbers threads `th_1`, `th_2`, ...
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<tally_ai::Result<String>>>,
    threads: Mutex<VecDeque<tally_ai::Result<String>>>,
    next_thread: AtomicU32,
    /// `(thread_id, text)` for every message sent
    pub sent: Mutex<Vec<(String, String)>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail_reply(self, error: tally_ai::Error) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn fail_thread(self, error: tally_ai::Error) -> Self {
        self.threads.lock().push_back(Err(error));
        self
    }

    /// Make every send wait until the returned handle is notified
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock() = Some(Arc::clone(&notify));
        notify
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn thread_count(&self) -> u32 {
        self.next_thread.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssistantClient for MockClient {
    async fn create_thread(&self) -> tally_ai::Result<String> {
        let scripted = self.threads.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let n = self.next_thread.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("th_{}", n))
            }
        }
    }

    async fn send_message(
        &self,
        thread_id: &str,
        text: &str,
        _timeout: Duration,
    ) -> tally_ai::Result<Reply> {
        let hold = self.hold.lock().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        self.sent
            .lock()
            .push((thread_id.to_string(), text.to_string()));
        let scripted = self.replies.lock().pop_front();
        scripted
            .unwrap_or_else(|| Ok("ok".to_string()))
            .map(Reply::now)
    }
}
