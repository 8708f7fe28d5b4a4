use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sessiond_rpc::SessionManagerClient;
use tonic::transport::{Channel, Endpoint, Error};

pub const CONNECT_TIMEOUT_LIMIT: Duration = Duration::from_secs(5);

#[derive(Clone, Default, Debug)]
/// A collection of RPC client connections which can be reused and multiplexed.
///
/// Clients are attached once while the cluster connects and shared by every
/// request routed to the same peer afterwards; tonic channels multiplex
/// concurrent calls and reconnect on their own, so the map is never redialed.
pub struct ClientNetwork {
    clients: Arc<RwLock<HashMap<String, SessionManagerClient<Channel>>>>,
}

impl ClientNetwork {
    /// Returns the attached client for the given address, if any.
    pub fn get(&self, addr: &str) -> Option<SessionManagerClient<Channel>> {
        self.clients.read().get(addr).cloned()
    }

    /// Connects to a given address and adds it to the clients.
    ///
    /// No per-request timeout is set on the channel; the caller's deadline
    /// travels with each forwarded request instead.
    pub(crate) async fn connect<F>(
        &self,
        addr: &str,
        configure: &F,
    ) -> Result<SessionManagerClient<Channel>, Error>
    where
        F: Fn(Endpoint) -> Endpoint,
    {
        let uri = format!("http://{addr}");
        let endpoint = configure(
            Endpoint::from_str(&uri)?.connect_timeout(CONNECT_TIMEOUT_LIMIT),
        );
        let channel = endpoint.connect().await?;
        let client = SessionManagerClient::new(channel);

        {
            let mut guard = self.clients.write();
            guard.insert(addr.to_string(), client.clone());
        }

        Ok(client)
    }
}
