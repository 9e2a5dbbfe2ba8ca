use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InlineKeyboard, MessagingCapabilities, ReplyKeyboard},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls to the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(35),
            per_chat_min_interval: Duration::from_millis(300),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now,
        }
    }

    /// Reserve the next slot; returns how long the caller must wait for it.
    fn reserve_at(&mut self, now: Instant) -> Duration {
        let start = self.next.max(now);
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Limiters whose next slot has passed behave like fresh ones, so they are
/// dropped instead of kept for every chat ever seen.
fn reserve_chat(
    map: &mut HashMap<i64, IntervalLimiter>,
    chat: ChatId,
    interval: Duration,
    now: Instant,
) -> Duration {
    map.retain(|_, lim| lim.next > now);
    map.entry(chat.0)
        .or_insert_with(|| IntervalLimiter::new(interval, now))
        .reserve_at(now)
}

/// `MessagingPort` decorator spacing out calls globally and per chat.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, IntervalLimiter>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval, Instant::now())),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn throttle(&self, chat_id: Option<ChatId>) {
        let now = Instant::now();
        let mut wait = self.global.lock().await.reserve_at(now);
        if let Some(chat) = chat_id {
            let mut map = self.per_chat.lock().await;
            wait = wait.max(reserve_chat(&mut map, chat, self.cfg.per_chat_min_interval, now));
        }
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.throttle(Some(chat_id)).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.throttle(Some(chat_id)).await;
        self.inner.send_inline_keyboard(chat_id, html, keyboard).await
    }

    async fn send_reply_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: ReplyKeyboard,
    ) -> Result<MessageRef> {
        self.throttle(Some(chat_id)).await;
        self.inner.send_reply_keyboard(chat_id, html, keyboard).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.throttle(Some(msg.chat_id)).await;
        self.inner.edit_html(msg, html).await
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.throttle(Some(msg.chat_id)).await;
        self.inner.edit_inline_keyboard(msg, html, keyboard).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.throttle(Some(chat_id)).await;
        self.inner.send_chat_action(chat_id, action).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        // No chat id on the answer call.
        self.throttle(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_spaces_reservations() {
        let t0 = Instant::now();
        let mut lim = IntervalLimiter::new(Duration::from_millis(100), t0);

        assert_eq!(lim.reserve_at(t0), Duration::ZERO);
        assert_eq!(lim.reserve_at(t0), Duration::from_millis(100));
        assert_eq!(lim.reserve_at(t0), Duration::from_millis(200));

        // After a quiet period the next call goes straight through.
        let later = t0 + Duration::from_secs(5);
        assert_eq!(lim.reserve_at(later), Duration::ZERO);
    }

    #[test]
    fn idle_chat_limiters_are_pruned() {
        let t0 = Instant::now();
        let gap = Duration::from_millis(300);
        let mut map = HashMap::new();

        assert_eq!(reserve_chat(&mut map, ChatId(1), gap, t0), Duration::ZERO);
        assert_eq!(reserve_chat(&mut map, ChatId(2), gap, t0), Duration::ZERO);
        assert_eq!(reserve_chat(&mut map, ChatId(1), gap, t0), gap);
        assert_eq!(map.len(), 2);

        let later = t0 + Duration::from_secs(5);
        assert_eq!(reserve_chat(&mut map, ChatId(3), gap, later), Duration::ZERO);
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![3]);
    }
}
