//! Interaction engine: turns inbound updates into store mutations and
//! outbound messages.
//!
//! The engine is transport-agnostic. Adapters convert their updates into
//! `IncomingUpdate` and call [`Engine::handle`]; every failure is mapped to a
//! user-facing notice here, so adapters never see handler errors.

mod admin;
mod callback;
mod identity;
mod reply;
mod reports;
mod settings;
mod text;
mod views;


use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    cache::Caches,
    config::Config,
    directory::{Actor, Directory},
    domain::{AuditRecord, ChatId, Language, UserId, UserSettings},
    log_pipeline::{log_row, AuditSink, LogQueue},
    messaging::{port::MessagingPort, types::IncomingUpdate, types::Sender},
    pending::PendingStore,
    report::ReportGenerator,
    store::Store,
    Error, Result,
};

/// Most messages fetched for one report.
pub const REPORT_FETCH_LIMIT: usize = 500;
/// Rows shown in the recent-activity listing.
pub const AUDIT_LISTING_LIMIT: usize = 15;
/// Hits shown for a user search.
pub const SEARCH_LIMIT: usize = 10;

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub page_size: usize,
    pub report_timeout: Duration,
    pub default_language: Language,
    pub safe_limit: usize,
    pub label_max_chars: usize,
    pub bootstrap_owners: Vec<String>,
}

impl EngineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            page_size: cfg.page_size,
            report_timeout: cfg.report_timeout,
            default_language: cfg.default_language,
            safe_limit: cfg.telegram_safe_limit,
            label_max_chars: cfg.button_label_max_length,
            bootstrap_owners: cfg.bootstrap_owners.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 5,
            report_timeout: Duration::from_secs(60),
            default_language: Language::Fa,
            safe_limit: 4000,
            label_max_chars: 30,
            bootstrap_owners: Vec::new(),
        }
    }
}

/// Everything the engine is wired with.
pub struct EngineDeps {
    pub messenger: Arc<dyn MessagingPort>,
    pub store: Arc<dyn Store>,
    pub caches: Arc<Caches>,
    pub reporter: Arc<dyn ReportGenerator>,
    pub logs: LogQueue,
    pub audit: AuditSink,
    pub settings: EngineSettings,
}

pub struct Engine {
    messenger: Arc<dyn MessagingPort>,
    store: Arc<dyn Store>,
    directory: Directory,
    pending: PendingStore,
    reporter: Arc<dyn ReportGenerator>,
    logs: LogQueue,
    audit: AuditSink,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(deps: EngineDeps) -> Self {
        let directory = Directory::new(
            deps.store.clone(),
            deps.caches,
            deps.settings.bootstrap_owners.clone(),
        );
        Self {
            messenger: deps.messenger,
            pending: PendingStore::new(deps.store.clone()),
            store: deps.store,
            directory,
            reporter: deps.reporter,
            logs: deps.logs,
            audit: deps.audit,
            settings: deps.settings,
        }
    }

    /// Handle one inbound update. Never fails: errors become notices.
    pub async fn handle(&self, update: IncomingUpdate) {
        self.logs.enqueue(log_row(&update, Utc::now()));

        if !update.is_private() {
            if let IncomingUpdate::Callback(q) = &update {
                if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, None).await {
                    debug!(error = %e, "group callback answer failed");
                }
            }
            return;
        }

        let sender = update.sender().user_id;
        let chat = update
            .chat()
            .map(|c| c.chat_id)
            .unwrap_or(ChatId(sender.0));

        let res = match &update {
            IncomingUpdate::Text(msg) => self.on_text(msg).await,
            IncomingUpdate::Callback(q) => self.on_callback(q).await,
        };
        if let Err(e) = res {
            self.report_failure(chat, sender, &e).await;
        }
    }

    /// Wait for outstanding audit writes.
    pub async fn flush_audit(&self) {
        self.audit.flush().await;
    }

    async fn report_failure(&self, chat: ChatId, user: UserId, err: &Error) {
        warn!(user_id = user.0, error = %err, "update handling failed");
        if let Err(e) = self.messenger.send_html(chat, err.user_notice()).await {
            debug!(error = %e, "failure notice not delivered");
        }
    }

    async fn actor(&self, sender: &Sender) -> Result<Actor> {
        self.directory
            .resolve_actor(sender.user_id, sender.username.as_deref())
            .await
    }

    fn record_audit(
        &self,
        actor: &Actor,
        action: &str,
        target: impl Into<String>,
        details: serde_json::Value,
    ) {
        self.audit
            .record(AuditRecord::new(action, actor.audit_name(), target, details));
    }

    /// Console-wide default, falling back to the configured one.
    async fn default_language(&self) -> Result<Language> {
        let bot = self.store.bot_settings().await?;
        Ok(bot
            .default_language
            .unwrap_or(self.settings.default_language))
    }

    /// Stored settings, or defaults carrying the console's language.
    async fn user_settings(&self, user: UserId) -> Result<UserSettings> {
        match self.store.user_settings(user.0).await? {
            Some(s) => Ok(s),
            None => Ok(UserSettings {
                language: self.default_language().await?,
                ..UserSettings::default()
            }),
        }
    }
}
