use std::{sync::Arc, time::Duration};

use teloxide::Bot;
use tracing::info;

use tsb_core::{
    cache::Caches,
    config::{Config, StoreBackend},
    engine::{Engine, EngineDeps, EngineSettings},
    log_pipeline::{log_channel, AuditSink},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    store::{memory::MemoryStore, Store},
};
use tsb_openai::OpenAiReporter;
use tsb_supabase::SupabaseStore;
use tsb_telegram::TelegramMessenger;

const STORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<(), tsb_core::Error> {
    tsb_core::logging::init("tsb")?;

    let cfg = Config::load()?;

    let store: Arc<dyn Store> = match &cfg.store {
        StoreBackend::Supabase { url, api_key } => {
            info!(url = %url, "using supabase store");
            Arc::new(SupabaseStore::new(url, api_key, STORE_REQUEST_TIMEOUT)?)
        }
        StoreBackend::Memory => {
            info!("using in-memory store; nothing is persisted");
            Arc::new(MemoryStore::new())
        }
    };

    let reporter = Arc::new(OpenAiReporter::new(
        cfg.openai_api_key.clone(),
        cfg.openai_model.clone(),
        cfg.report_timeout,
    )?);
    if cfg.openai_api_key.is_none() {
        info!("OPENAI_API_KEY not set; reports will return a notice");
    }

    let bot = Bot::new(cfg.telegram_bot_token.clone());

    // Throttle outbound calls; 429 RetryAfter is still retried in the adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let (logs, log_worker) =
        log_channel(store.clone(), cfg.log_queue_capacity, cfg.log_worker_backoff);

    let engine = Arc::new(Engine::new(EngineDeps {
        messenger,
        store: store.clone(),
        caches: Arc::new(Caches::new(cfg.user_cache_ttl, cfg.groups_cache_ttl)),
        reporter,
        logs,
        audit: AuditSink::new(store),
        settings: EngineSettings::from_config(&cfg),
    }));

    tsb_telegram::router::run_polling(bot, engine, log_worker)
        .await
        .map_err(|e| tsb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
