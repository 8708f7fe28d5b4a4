use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sessiond_cluster::Cluster;
use sessiond_rpc::SessionManagerServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::error::DaemonError;
use crate::service::SessionService;
use crate::storage::{MemoryStorage, Storage};

/// How long a freshly started session lives.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60 * 24);
/// How often expired sessions are swept from storage.
pub const DEFAULT_SESSION_TTC: Duration = if cfg!(test) {
    Duration::from_millis(500)
} else {
    Duration::from_secs(60)
};

/// Constructor arguments for [`Daemon::start`].
///
/// The RPC listener is injected rather than bound internally so tests can
/// hand over `127.0.0.1:0` listeners and learn their addresses before the
/// seed lists are assembled.
pub struct DaemonOpts<S = MemoryStorage> {
    pub rpc_listener: TcpListener,
    /// The address the rest of the deployment dials to reach this daemon.
    pub cluster_listen: String,
    /// The deployment's peer addresses, identical (up to set equality) on
    /// every node.
    pub cluster_seeds: Vec<String>,
    pub session_ttl: Duration,
    pub session_ttc: Duration,
    pub storage: S,
}

impl DaemonOpts<MemoryStorage> {
    /// Creates options with defaults, advertising the listener's own bound
    /// address to the cluster.
    pub fn new(rpc_listener: TcpListener, cluster_seeds: Vec<String>) -> io::Result<Self> {
        let cluster_listen = rpc_listener.local_addr()?.to_string();
        Ok(Self {
            rpc_listener,
            cluster_listen,
            cluster_seeds,
            session_ttl: DEFAULT_SESSION_TTL,
            session_ttc: DEFAULT_SESSION_TTC,
            storage: MemoryStorage::default(),
        })
    }
}

impl<S> DaemonOpts<S> {
    /// Swaps the storage engine backing the daemon.
    pub fn with_storage<S2>(self, storage: S2) -> DaemonOpts<S2> {
        DaemonOpts {
            rpc_listener: self.rpc_listener,
            cluster_listen: self.cluster_listen,
            cluster_seeds: self.cluster_seeds,
            session_ttl: self.session_ttl,
            session_ttc: self.session_ttc,
            storage,
        }
    }
}

/// A running sessiond instance.
pub struct Daemon {
    addr: SocketAddr,
    cluster: Arc<Cluster>,
    server_handle: JoinHandle<()>,
    cleanup_handle: JoinHandle<()>,
}

impl Daemon {
    /// Builds the cluster ring, starts serving the session-manager RPC on
    /// the given listener and spawns the expiry sweep.
    ///
    /// The cluster is constructed but not yet connected; call
    /// [`Daemon::connect`] once every peer of the deployment is serving.
    /// Until then, requests owned by a sibling are answered with an
    /// unavailable status.
    pub async fn start<S>(opts: DaemonOpts<S>) -> Result<Self, DaemonError>
    where
        S: Storage,
    {
        let addr = opts.rpc_listener.local_addr()?;
        let cluster = Arc::new(Cluster::new(sessiond_cluster::Opts {
            listen: opts.cluster_listen,
            seeds: opts.cluster_seeds,
        })?);
        let storage = Arc::new(opts.storage);

        let service =
            SessionService::new(cluster.clone(), storage.clone(), opts.session_ttl);
        let server = Server::builder()
            .add_service(SessionManagerServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(opts.rpc_listener));

        let server_handle = tokio::spawn(async move {
            if let Err(error) = server.await {
                error!(error = ?error, "RPC server stopped unexpectedly.");
            }
        });
        let cleanup_handle = tokio::spawn(run_cleanup(storage, opts.session_ttc));

        info!(
            addr = %addr,
            ring_len = cluster.len(),
            "sessiond daemon is running."
        );

        Ok(Self {
            addr,
            cluster,
            server_handle,
            cleanup_handle,
        })
    }

    /// Dials every sibling node and attaches the peer clients.
    pub async fn connect(&self) -> Result<(), DaemonError> {
        self.cluster.connect().await?;
        Ok(())
    }

    /// The address the RPC server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The cluster the daemon routes with.
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Waits until the RPC server exits.
    ///
    /// This typically pends forever; the server only stops when something
    /// external tears it down.
    pub async fn wait(self) {
        let _ = self.server_handle.await;
        self.cleanup_handle.abort();
    }

    /// Stops the server and background maintenance. Peer connections are
    /// dropped with the cluster; in-flight forwarded calls may observe
    /// cancellation.
    pub fn shutdown(self) {
        self.server_handle.abort();
        self.cleanup_handle.abort();
        info!(addr = %self.addr, "sessiond daemon stopped.");
    }
}

async fn run_cleanup<S>(storage: Arc<S>, period: Duration)
where
    S: Storage,
{
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match storage.purge_expired().await {
            Ok(0) => {},
            Ok(count) => debug!(count = count, "Purged expired sessions."),
            Err(error) => warn!(error = ?error, "Failed to purge expired sessions."),
        }
    }
}
