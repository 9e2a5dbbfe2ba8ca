use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tsb_core::{engine::Engine, log_pipeline::LogWorker};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub chat_locks: Arc<ChatLocks>,
}

/// Serializes update handling per chat so a user's taps are processed in
/// the order they arrive.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Only the map holds locks nobody is using or waiting on.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Long-poll until Ctrl-C, then stop the log worker and wait for pending
/// audit writes.
pub async fn run_polling(bot: Bot, engine: Arc<Engine>, log_worker: LogWorker) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed; continuing"),
    }

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(log_worker.run(cancel.clone()));

    let state = Arc::new(AppState {
        engine: engine.clone(),
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("dispatcher stopped; draining logs");
    cancel.cancel();
    if let Err(e) = worker.await {
        warn!(error = %e, "log worker ended abnormally");
    }
    engine.flush_audit().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_chat_is_serialized() {
        let locks = ChatLocks::default();
        let guard = locks.lock_chat(1).await;
        let blocked = tokio::time::timeout(Duration::from_millis(20), locks.lock_chat(1)).await;
        assert!(blocked.is_err());

        // Other chats are independent.
        let other = tokio::time::timeout(Duration::from_millis(20), locks.lock_chat(2)).await;
        assert!(other.is_ok());

        drop(guard);
        assert!(tokio::time::timeout(Duration::from_millis(20), locks.lock_chat(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn released_chats_are_pruned() {
        let locks = ChatLocks::default();
        let held = locks.lock_chat(1).await;
        drop(locks.lock_chat(2).await);
        drop(locks.lock_chat(3).await);

        // Chats 2 and 3 go on the next acquisition; chat 1 is still held.
        let four = locks.lock_chat(4).await;
        assert_eq!(locks.tracked().await, 2);

        drop(held);
        drop(four);
        drop(locks.lock_chat(5).await);
        assert_eq!(locks.tracked().await, 1);
    }
}
