use std::{env, fs, path::Path, time::Duration};

use crate::{domain::Language, errors::Error, Result};

/// Where users, grants, pending modes and logs live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// Supabase PostgREST.
    Supabase { url: String, api_key: String },
    /// In-process store; nothing survives a restart.
    Memory,
}

/// Typed configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub store: StoreBackend,
    /// Handles treated as owners even without a registry row.
    pub bootstrap_owners: Vec<String>,

    // Reports
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub report_timeout: Duration,
    pub default_language: Language,

    // Engine
    pub page_size: usize,
    pub user_cache_ttl: Duration,
    pub groups_cache_ttl: Duration,
    pub log_queue_capacity: usize,
    pub log_worker_backoff: Duration,

    // Telegram limits
    pub telegram_safe_limit: usize,
    pub button_label_max_length: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_str = |key: &str| get(key).and_then(non_empty);
        let env_u64 = |key: &str| env_str(key).and_then(|s| s.trim().parse::<u64>().ok());
        let env_usize = |key: &str| env_str(key).and_then(|s| s.trim().parse::<usize>().ok());

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let backend = env_str("STORE_BACKEND")
            .unwrap_or_else(|| "supabase".to_string())
            .trim()
            .to_lowercase();
        let store = match backend.as_str() {
            "memory" => StoreBackend::Memory,
            "supabase" => {
                let url = env_str("SUPABASE_URL").ok_or_else(|| {
                    Error::Config("SUPABASE_URL is required for the supabase store".to_string())
                })?;
                let api_key = env_str("SUPABASE_API_KEY").ok_or_else(|| {
                    Error::Config("SUPABASE_API_KEY is required for the supabase store".to_string())
                })?;
                StoreBackend::Supabase {
                    url: url.trim().trim_end_matches('/').to_string(),
                    api_key: api_key.trim().to_string(),
                }
            }
            other => {
                return Err(Error::Config(format!(
                    "STORE_BACKEND must be `supabase` or `memory`, got `{other}`"
                )))
            }
        };

        let bootstrap_owners = parse_csv_lower(env_str("BOOTSTRAP_OWNERS"));

        let openai_api_key = env_str("OPENAI_API_KEY");
        let openai_model = env_str("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let report_timeout =
            Duration::from_millis(env_u64("REPORT_TIMEOUT_MS").unwrap_or(60_000).max(1));
        let default_language = env_str("DEFAULT_LANGUAGE")
            .and_then(|s| Language::parse(&s))
            .unwrap_or_default();

        let page_size = env_usize("PAGE_SIZE").unwrap_or(5).clamp(1, 50);
        let user_cache_ttl = Duration::from_secs(env_u64("USER_CACHE_TTL_SECS").unwrap_or(120));
        let groups_cache_ttl =
            Duration::from_secs(env_u64("GROUPS_CACHE_TTL_SECS").unwrap_or(300));
        let log_queue_capacity = env_usize("LOG_QUEUE_CAPACITY").unwrap_or(1000).max(1);
        let log_worker_backoff =
            Duration::from_millis(env_u64("LOG_WORKER_BACKOFF_MS").unwrap_or(1000));

        let telegram_safe_limit = env_usize("TELEGRAM_SAFE_LIMIT").unwrap_or(4000).clamp(100, 4096);
        let button_label_max_length = env_usize("BUTTON_LABEL_MAX_LENGTH").unwrap_or(30).max(4);

        Ok(Self {
            telegram_bot_token,
            store,
            bootstrap_owners,
            openai_api_key,
            openai_model,
            report_timeout,
            default_language,
            page_size,
            user_cache_ttl,
            groups_cache_ttl,
            log_queue_capacity,
            log_worker_backoff,
            telegram_safe_limit,
            button_label_max_length,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().trim_start_matches('@').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn token_is_required() {
        let err = load(&[("STORE_BACKEND", "memory")]).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn supabase_needs_url_and_key() {
        let err = load(&[("TELEGRAM_BOT_TOKEN", "t")]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));

        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("SUPABASE_URL", "https://x.supabase.co/"),
            ("SUPABASE_API_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::Supabase {
                url: "https://x.supabase.co".into(),
                api_key: "k".into()
            }
        );
    }

    #[test]
    fn defaults() {
        let cfg = load(&[("TELEGRAM_BOT_TOKEN", "t"), ("STORE_BACKEND", "memory")]).unwrap();
        assert_eq!(cfg.page_size, 5);
        assert_eq!(cfg.user_cache_ttl, Duration::from_secs(120));
        assert_eq!(cfg.groups_cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.log_queue_capacity, 1000);
        assert_eq!(cfg.report_timeout, Duration::from_secs(60));
        assert_eq!(cfg.openai_model, "gpt-4o-mini");
        assert_eq!(cfg.default_language, Language::Fa);
        assert!(cfg.openai_api_key.is_none());
        assert!(cfg.bootstrap_owners.is_empty());
    }

    #[test]
    fn bootstrap_owners_are_normalized() {
        let cfg = load(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("STORE_BACKEND", "memory"),
            ("BOOTSTRAP_OWNERS", " @Root, ops_lead ,,"),
            ("OPENAI_API_KEY", "  "),
        ])
        .unwrap();
        assert_eq!(cfg.bootstrap_owners, vec!["root", "ops_lead"]);
        assert!(cfg.openai_api_key.is_none());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(load(&[("TELEGRAM_BOT_TOKEN", "t"), ("STORE_BACKEND", "sqlite")]).is_err());
    }
}
