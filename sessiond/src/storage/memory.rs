use std::collections::HashMap;
use std::convert::Infallible;

use async_trait::async_trait;
use parking_lot::RwLock;
use sessiond_rpc::Session;

use crate::storage::{unix_millis, Bag, Storage};

#[derive(Default)]
/// An in-process session store.
///
/// Expired sessions become invisible to reads immediately and are physically
/// removed by the daemon's periodic [`purge_expired`](Storage::purge_expired)
/// sweep.
pub struct MemoryStorage {
    sessions: RwLock<HashMap<String, Session>>,
}

// An expiry of zero means the session never expires.
fn is_expired(session: &Session, now_ms: u64) -> bool {
    session.expire_at_ms != 0 && session.expire_at_ms <= now_ms
}

#[async_trait]
impl Storage for MemoryStorage {
    type Error = Infallible;

    async fn start(&self, session: Session) -> Result<Session, Self::Error> {
        let mut guard = self.sessions.write();
        guard.insert(session.access_token.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, access_token: &str) -> Result<Option<Session>, Self::Error> {
        let guard = self.sessions.read();
        Ok(guard
            .get(access_token)
            .filter(|session| !is_expired(session, unix_millis()))
            .cloned())
    }

    async fn exists(&self, access_token: &str) -> Result<bool, Self::Error> {
        let guard = self.sessions.read();
        Ok(guard
            .get(access_token)
            .map_or(false, |session| !is_expired(session, unix_millis())))
    }

    async fn set_value(
        &self,
        access_token: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<Bag>, Self::Error> {
        let now = unix_millis();
        let mut guard = self.sessions.write();
        match guard.get_mut(access_token) {
            Some(session) if !is_expired(session, now) => {
                session.bag.insert(key.to_string(), value.to_string());
                Ok(Some(session.bag.clone()))
            },
            _ => Ok(None),
        }
    }

    async fn delete(&self, access_token: &str) -> Result<u64, Self::Error> {
        let mut guard = self.sessions.write();
        Ok(guard.remove(access_token).map_or(0, |_| 1))
    }

    async fn purge_expired(&self) -> Result<u64, Self::Error> {
        let now = unix_millis();
        let mut guard = self.sessions.write();
        let before = guard.len();
        guard.retain(|_, session| !is_expired(session, now));
        Ok((before - guard.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str, expire_at_ms: u64) -> Session {
        Session {
            access_token: token.to_string(),
            subject_id: "subject-1".to_string(),
            subject_client: "test".to_string(),
            bag: HashMap::new(),
            expire_at_ms,
        }
    }

    #[tokio::test]
    async fn test_start_then_get() {
        let storage = MemoryStorage::default();

        storage
            .start(session("token-1", unix_millis() + 60_000))
            .await
            .unwrap();

        let fetched = storage.get("token-1").await.unwrap().unwrap();
        assert_eq!(fetched.access_token, "token-1");
        assert_eq!(fetched.subject_id, "subject-1");

        assert!(storage.exists("token-1").await.unwrap());
        assert!(!storage.exists("token-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_value_updates_the_bag() {
        let storage = MemoryStorage::default();
        storage
            .start(session("token-1", unix_millis() + 60_000))
            .await
            .unwrap();

        let bag = storage
            .set_value("token-1", "theme", "dark")
            .await
            .unwrap()
            .expect("session exists");
        assert_eq!(bag.get("theme").map(String::as_str), Some("dark"));

        let fetched = storage.get("token-1").await.unwrap().unwrap();
        assert_eq!(fetched.bag.get("theme").map(String::as_str), Some("dark"));

        let missing = storage.set_value("token-2", "theme", "dark").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_how_many_went() {
        let storage = MemoryStorage::default();
        storage
            .start(session("token-1", unix_millis() + 60_000))
            .await
            .unwrap();

        assert_eq!(storage.delete("token-1").await.unwrap(), 1);
        assert_eq!(storage.delete("token-1").await.unwrap(), 0);
        assert!(storage.get("token-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_invisible_and_purged() {
        let storage = MemoryStorage::default();
        storage.start(session("stale", 1)).await.unwrap();
        storage
            .start(session("live", unix_millis() + 60_000))
            .await
            .unwrap();

        assert!(storage.get("stale").await.unwrap().is_none());
        assert!(!storage.exists("stale").await.unwrap());
        assert!(storage.set_value("stale", "k", "v").await.unwrap().is_none());

        assert_eq!(storage.purge_expired().await.unwrap(), 1);
        assert!(storage.get("live").await.unwrap().is_some());
    }
}
