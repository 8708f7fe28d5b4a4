use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sessiond_rpc::Session;

mod memory;

pub use memory::MemoryStorage;

/// The free-form key/value data attached to a session.
pub type Bag = HashMap<String, String>;

/// The capability a session store has to provide.
///
/// The daemon only ever talks to its store through this trait, so in-process
/// and out-of-process engines are interchangeable; the routing layer above
/// it never sees which one is in play.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    /// Persists a freshly built session under its access token.
    async fn start(&self, session: Session) -> Result<Session, Self::Error>;

    /// Fetches the session behind the token, `None` when absent or expired.
    async fn get(&self, access_token: &str) -> Result<Option<Session>, Self::Error>;

    /// Whether a live session exists behind the token.
    async fn exists(&self, access_token: &str) -> Result<bool, Self::Error>;

    /// Sets one bag entry, returning the updated bag, or `None` when no
    /// live session exists behind the token.
    async fn set_value(
        &self,
        access_token: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<Bag>, Self::Error>;

    /// Removes the session, returning how many sessions were removed.
    async fn delete(&self, access_token: &str) -> Result<u64, Self::Error>;

    /// Drops sessions whose expiry has passed, returning how many went.
    async fn purge_expired(&self) -> Result<u64, Self::Error>;
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
