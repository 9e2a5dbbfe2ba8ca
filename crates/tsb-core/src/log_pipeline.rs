//! Best-effort traffic log and audit writes.
//!
//! Traffic rows go through a bounded channel drained by one worker. Audit
//! records are written by individually spawned, tracked tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    domain::{AuditRecord, LogRow},
    messaging::types::IncomingUpdate,
    store::Store,
};

/// Build a traffic log row from an inbound update.
///
/// `date_ts` is when Telegram saw the message; `date` is when we handled it.
pub fn log_row(update: &IncomingUpdate, now: DateTime<Utc>) -> LogRow {
    let sender = update.sender();
    let chat = update.chat();
    let (update_id, message_id, text, callback_data, sent_at) = match update {
        IncomingUpdate::Text(m) => (
            m.update_id,
            Some(m.message_id.0),
            Some(m.text.clone()).filter(|t| !t.is_empty()),
            None,
            m.date,
        ),
        IncomingUpdate::Callback(q) => (
            q.update_id,
            q.message.map(|r| r.message_id.0),
            q.message_text.clone(),
            Some(q.data.clone()),
            None,
        ),
    };
    let date_ts = sent_at.unwrap_or(now).timestamp();

    LogRow {
        update_id: Some(update_id),
        chat_id: chat.map(|c| c.chat_id.0),
        chat_type: chat.map(|c| c.kind.as_str().to_string()),
        chat_title: chat.and_then(|c| c.title.clone()),
        message_id,
        from_id: sender.user_id.0,
        from_is_bot: sender.is_bot,
        username: sender.username.clone(),
        first_name: sender.first_name.clone(),
        last_name: sender.last_name.clone(),
        language_code: sender.language_code.clone(),
        text,
        callback_data,
        date_ts,
        date: now,
    }
}

/// Producer side of the traffic log. Cheap to clone.
#[derive(Clone)]
pub struct LogQueue {
    sender: mpsc::Sender<LogRow>,
}

impl LogQueue {
    /// Queue a row without waiting.
    ///
    /// Returns `false` when the row was dropped because the queue is full or
    /// the worker is gone.
    pub fn enqueue(&self, row: LogRow) -> bool {
        match self.sender.try_send(row) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("traffic log queue full, row dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("traffic log worker stopped, row dropped");
                false
            }
        }
    }
}

/// Consumer side of the traffic log.
pub struct LogWorker {
    rx: mpsc::Receiver<LogRow>,
    store: Arc<dyn Store>,
    backoff: Duration,
}

pub fn log_channel(
    store: Arc<dyn Store>,
    capacity: usize,
    backoff: Duration,
) -> (LogQueue, LogWorker) {
    let (sender, rx) = mpsc::channel(capacity.max(1));
    (
        LogQueue { sender },
        LogWorker { rx, store, backoff },
    )
}

impl LogWorker {
    /// Persist rows one at a time until cancelled or every producer is gone.
    ///
    /// A failed write is logged and followed by a pause; the row is not
    /// retried. On cancellation, rows already queued are written first.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("traffic log worker started");
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.drain().await;
                    break;
                }

                row = self.rx.recv() => {
                    let Some(row) = row else { break };
                    if let Err(e) = self.store.insert_log(&row).await {
                        error!(error = %e, "failed to persist traffic log row");
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }
        info!("traffic log worker stopped");
    }

    async fn drain(&mut self) {
        self.rx.close();
        let mut written = 0usize;
        while let Ok(row) = self.rx.try_recv() {
            match self.store.insert_log(&row).await {
                Ok(()) => written += 1,
                Err(e) => error!(error = %e, "failed to persist traffic log row"),
            }
        }
        debug!(written, "traffic log queue drained");
    }
}

/// Fire-and-forget audit writer.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn Store>,
    tracker: TaskTracker,
}

impl AuditSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            tracker: TaskTracker::new(),
        }
    }

    /// Write the record in the background. Failures are logged only.
    pub fn record(&self, record: AuditRecord) {
        let store = self.store.clone();
        self.tracker.spawn(async move {
            if let Err(e) = store.insert_audit(&record).await {
                warn!(
                    action = %record.action,
                    audit_target = %record.target,
                    error = %e,
                    "failed to persist audit record"
                );
            }
        });
    }

    /// Wait for every audit write issued so far.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, MessageId, UserId};
    use crate::messaging::types::{ChatInfo, ChatKind, Sender, TextMessage};
    use crate::store::memory::MemoryStore;

    fn row(n: i64) -> LogRow {
        let update = IncomingUpdate::Text(TextMessage {
            update_id: n,
            chat: ChatInfo {
                chat_id: ChatId(n),
                kind: ChatKind::Private,
                title: None,
            },
            message_id: MessageId(1),
            sender: Sender {
                user_id: UserId(n),
                ..Sender::default()
            },
            text: format!("msg {n}"),
            ..TextMessage::default()
        });
        log_row(&update, Utc::now())
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let store = Arc::new(MemoryStore::new());
        let (queue, _worker) = log_channel(store, 3, Duration::from_millis(1));

        assert!(queue.enqueue(row(1)));
        assert!(queue.enqueue(row(2)));
        assert!(queue.enqueue(row(3)));
        assert!(!queue.enqueue(row(4)));
    }

    #[tokio::test]
    async fn enqueue_after_worker_gone_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let (queue, worker) = log_channel(store, 3, Duration::from_millis(1));
        drop(worker);
        assert!(!queue.enqueue(row(1)));
    }

    #[tokio::test]
    async fn worker_survives_store_errors_and_drains_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let (queue, worker) = log_channel(store.clone(), 10, Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        store.set_failing(true);
        assert!(queue.enqueue(row(1)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set_failing(false);

        assert!(queue.enqueue(row(2)));
        assert!(queue.enqueue(row(3)));
        cancel.cancel();
        handle.await.unwrap();

        let ids: Vec<_> = store
            .logs()
            .await
            .iter()
            .filter_map(|r| r.update_id)
            .collect();
        assert!(!ids.contains(&1));
        assert!(ids.contains(&2) && ids.contains(&3));
    }

    #[tokio::test]
    async fn audit_failures_are_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let sink = AuditSink::new(store.clone());

        store.set_failing(true);
        sink.record(AuditRecord::new("ADD_USER", "root", "alice", serde_json::json!({})));
        sink.flush().await;
        store.set_failing(false);

        sink.record(AuditRecord::new("DELETE_USER", "root", "bob", serde_json::json!({})));
        sink.flush().await;

        let audits = store.audits().await;
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, "DELETE_USER");
    }

    #[test]
    fn callback_rows_carry_the_action() {
        let update = IncomingUpdate::Callback(crate::messaging::types::CallbackQuery {
            update_id: 9,
            data: "admin|access".into(),
            sender: Sender {
                user_id: UserId(4),
                username: Some("root".into()),
                ..Sender::default()
            },
            ..Default::default()
        });
        let r = log_row(&update, Utc::now());
        assert_eq!(r.callback_data.as_deref(), Some("admin|access"));
        assert_eq!(r.from_id, 4);
        assert_eq!(r.chat_id, None);
    }
}
