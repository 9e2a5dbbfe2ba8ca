//! Single-slot pending conversation per user, persisted in the store.

use std::sync::Arc;

use crate::{domain::UserId, permissions::Role, store::Store, Result};

const DELIM: char = '|';

/// What the next free-text message from a user answers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingMode {
    SearchQuery,
    WelcomeMessage,
    AddUser(Role),
    GroupNumber,
    /// Stored by something this build does not understand. Left alone.
    Unrecognized(String),
}

impl PendingMode {
    pub fn encode(&self) -> String {
        match self {
            PendingMode::SearchQuery => "await_search_query".to_string(),
            PendingMode::WelcomeMessage => "await_welcome_message".to_string(),
            PendingMode::AddUser(role) => format!("await_adduser{DELIM}{}", role.as_str()),
            PendingMode::GroupNumber => "await_group_number".to_string(),
            PendingMode::Unrecognized(raw) => raw.clone(),
        }
    }

    pub fn decode(raw: &str) -> Self {
        let (verb, param) = match raw.split_once(DELIM) {
            Some((v, p)) => (v, Some(p)),
            None => (raw, None),
        };
        match (verb, param) {
            ("await_search_query", None) => PendingMode::SearchQuery,
            ("await_welcome_message", None) => PendingMode::WelcomeMessage,
            ("await_group_number", None) => PendingMode::GroupNumber,
            ("await_adduser", Some(role)) => match Role::parse(role) {
                Some(role) => PendingMode::AddUser(role),
                None => PendingMode::Unrecognized(raw.to_string()),
            },
            _ => PendingMode::Unrecognized(raw.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct PendingStore {
    store: Arc<dyn Store>,
}

impl PendingStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn set(&self, user: UserId, mode: &PendingMode) -> Result<()> {
        self.store.set_pending(user.0, &mode.encode()).await?;
        Ok(())
    }

    pub async fn get(&self, user: UserId) -> Result<Option<PendingMode>> {
        let raw = self.store.get_pending(user.0).await?;
        Ok(raw
            .filter(|r| !r.trim().is_empty())
            .map(|r| PendingMode::decode(&r)))
    }

    /// Idempotent.
    pub async fn clear(&self, user: UserId) -> Result<()> {
        self.store.clear_pending(user.0).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn known_modes_survive_encoding() {
        for mode in [
            PendingMode::SearchQuery,
            PendingMode::WelcomeMessage,
            PendingMode::GroupNumber,
            PendingMode::AddUser(Role::Admin),
            PendingMode::AddUser(Role::Blocked),
        ] {
            assert_eq!(PendingMode::decode(&mode.encode()), mode);
        }
        assert_eq!(
            PendingMode::AddUser(Role::User).encode(),
            "await_adduser|user"
        );
    }

    #[test]
    fn unknown_modes_are_kept_verbatim() {
        for raw in [
            "await_something_else",
            "await_adduser|wizard",
            "await_adduser",
            "await_search_query|extra",
        ] {
            assert_eq!(
                PendingMode::decode(raw),
                PendingMode::Unrecognized(raw.to_string())
            );
        }
    }

    #[tokio::test]
    async fn one_slot_per_user() {
        let store = Arc::new(MemoryStore::new());
        let pending = PendingStore::new(store.clone());
        let u = UserId(5);

        pending.set(u, &PendingMode::SearchQuery).await.unwrap();
        pending
            .set(u, &PendingMode::AddUser(Role::User))
            .await
            .unwrap();
        assert_eq!(
            pending.get(u).await.unwrap(),
            Some(PendingMode::AddUser(Role::User))
        );

        pending.clear(u).await.unwrap();
        pending.clear(u).await.unwrap();
        assert_eq!(pending.get(u).await.unwrap(), None);
        assert_eq!(pending.get(UserId(6)).await.unwrap(), None);
    }
}
