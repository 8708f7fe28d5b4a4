use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use sessiond_rpc::SessionManagerClient;
use tonic::transport::{Channel, Endpoint};

use crate::error::ClusterError;
use crate::network::ClientNetwork;
use crate::node::Node;

#[derive(Clone, Debug, Default)]
/// Construction options for a [`Cluster`].
pub struct Opts {
    /// The local node's advertised address. Required.
    pub listen: String,
    /// The configured peer addresses. The listen address is unioned in
    /// whether or not it appears here. Must be set-equal across every peer
    /// of a deployment; a mismatched seed list is not detectable and
    /// silently produces divergent routing.
    pub seeds: Vec<String>,
}

/// The static peer ring plus the RPC clients attached to it.
///
/// The ring is built once by [`Cluster::new`] and immutable afterwards, so
/// routing reads take no locks. The only transition is the one-shot
/// [`Cluster::connect`], which dials every sibling and publishes a client
/// per remote node.
#[derive(Debug)]
pub struct Cluster {
    listen: String,
    nodes: Vec<Node>,
    network: ClientNetwork,
    connected: AtomicBool,
}

impl Cluster {
    /// Builds the ring from the listen address and seed list.
    ///
    /// The ring is the deduplicated union of `{listen} ∪ seeds`, sorted
    /// ascending by byte order. Two processes given the same input set
    /// produce the identical ring, which is what lets peers agree on token
    /// ownership without coordination. Pure; performs no I/O.
    pub fn new(opts: Opts) -> Result<Self, ClusterError> {
        if opts.listen.is_empty() {
            return Err(ClusterError::EmptyListen);
        }

        let mut addrs: Vec<String> = Vec::with_capacity(opts.seeds.len() + 1);
        addrs.push(opts.listen.clone());
        addrs.extend(opts.seeds.into_iter().filter(|addr| !addr.is_empty()));
        addrs.sort();
        addrs.dedup();

        if addrs.is_empty() {
            return Err(ClusterError::EmptyMembership);
        }
        if !addrs.iter().any(|addr| *addr == opts.listen) {
            return Err(ClusterError::NoSelfNode(opts.listen));
        }

        let nodes = addrs
            .into_iter()
            .map(|addr| {
                let is_self = addr == opts.listen;
                Node::new(addr, is_self)
            })
            .collect();

        Ok(Self {
            listen: opts.listen,
            nodes,
            network: ClientNetwork::default(),
            connected: AtomicBool::new(false),
        })
    }

    /// The local node's advertised address.
    pub fn listen(&self) -> &str {
        &self.listen
    }

    /// The number of nodes in the ring.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The ring in its stored (sorted) order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the node at index `k mod len`, using a non-negative modulus.
    ///
    /// `None` only for an empty ring, which [`Cluster::new`] never produces.
    pub fn get(&self, k: i32) -> Option<&Node> {
        if self.nodes.is_empty() {
            return None;
        }
        let idx = k.rem_euclid(self.nodes.len() as i32) as usize;
        self.nodes.get(idx)
    }

    /// Maps an access token to the sibling node that owns it.
    ///
    /// Returns `None` when the local node owns the token, in which case the
    /// caller handles the request itself.
    ///
    /// The token key is `crc32fast::hash` over the token bytes. Every peer
    /// of a deployment must compute the same key for the same token, so the
    /// hash is frozen: changing it is a rolling-incompatible upgrade.
    pub fn get_other(&self, access_token: &str) -> Option<&Node> {
        if self.nodes.is_empty() {
            return None;
        }
        let key = crc32fast::hash(access_token.as_bytes());
        let node = &self.nodes[key as usize % self.nodes.len()];
        if node.is_self {
            return None;
        }
        Some(node)
    }

    /// Returns the attached RPC client for the given node.
    ///
    /// `None` for the self node, and for remote nodes until
    /// [`Cluster::connect`] has completed; callers treat a missing client
    /// as "not yet routable".
    pub fn client(&self, node: &Node) -> Option<SessionManagerClient<Channel>> {
        if node.is_self {
            return None;
        }
        self.network.get(&node.addr)
    }

    /// Dials every sibling node and attaches an RPC client to each.
    pub async fn connect(&self) -> Result<(), ClusterError> {
        self.connect_with(|endpoint| endpoint).await
    }

    /// Like [`Cluster::connect`], with caller-supplied endpoint settings
    /// (TLS, timeouts, etc.) applied to every dial.
    ///
    /// Dials run concurrently; the first failure aborts and is returned,
    /// with already-established clients left attached. The caller is
    /// expected to tear the daemon down on error. A second call is
    /// rejected.
    pub async fn connect_with<F>(&self, configure: F) -> Result<(), ClusterError>
    where
        F: Fn(Endpoint) -> Endpoint,
    {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(ClusterError::AlreadyConnected);
        }

        let mut dials = self
            .nodes
            .iter()
            .filter(|node| !node.is_self)
            .map(|node| {
                let network = self.network.clone();
                let configure = &configure;
                async move {
                    network.connect(&node.addr, configure).await.map_err(|source| {
                        ClusterError::Dial {
                            addr: node.addr.clone(),
                            source,
                        }
                    })?;
                    Ok::<_, ClusterError>(node.addr.as_str())
                }
            })
            .collect::<FuturesUnordered<_>>();

        while let Some(dialed) = dials.next().await {
            let addr = dialed?;
            debug!(addr = %addr, "Connected to cluster peer.");
        }

        info!(
            listen = %self.listen,
            peers = self.nodes.len() - 1,
            "Cluster connected."
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_opts() -> Opts {
        Opts {
            listen: "172.17.0.1".to_string(),
            seeds: vec![
                "172.17.0.2".to_string(),
                "172.17.0.3".to_string(),
                "127.0.0.1".to_string(),
                "10.0.0.1".to_string(),
                "8.8.8.8".to_string(),
            ],
        }
    }

    #[test]
    fn test_ring_is_deterministic() {
        let clusters: Vec<Cluster> = (0..100)
            .map(|_| Cluster::new(sample_opts()).expect("Build cluster."))
            .collect();

        for pair in clusters.windows(2) {
            assert_eq!(pair[0].len(), 6);
            for (left, right) in pair[0].nodes().iter().zip(pair[1].nodes()) {
                assert_eq!(left.addr, right.addr);
            }
        }
    }

    #[test]
    fn test_sorted_placement() {
        let cluster = Cluster::new(sample_opts()).expect("Build cluster.");

        let expected = [
            "10.0.0.1",
            "127.0.0.1",
            "172.17.0.1",
            "172.17.0.2",
            "172.17.0.3",
            "8.8.8.8",
        ];
        for (k, addr) in expected.iter().enumerate() {
            let node = cluster.get(k as i32).expect("Node under key.");
            assert_eq!(node.addr, *addr);
        }

        // The key space wraps with a non-negative modulus.
        assert_eq!(cluster.get(6).unwrap().addr, "10.0.0.1");
        assert_eq!(cluster.get(-1).unwrap().addr, "8.8.8.8");
    }

    #[test]
    fn test_listen_is_unioned_and_deduplicated() {
        let mut opts = sample_opts();
        opts.seeds.push(opts.listen.clone());
        opts.seeds.push("172.17.0.2".to_string());

        let cluster = Cluster::new(opts).expect("Build cluster.");
        assert_eq!(cluster.len(), 6);

        let self_nodes: Vec<_> = cluster.nodes().iter().filter(|n| n.is_self).collect();
        assert_eq!(self_nodes.len(), 1);
        assert_eq!(self_nodes[0].addr, cluster.listen());
    }

    #[test]
    fn test_rings_agree_regardless_of_listen() {
        let mut other = sample_opts();
        other.listen = "8.8.8.8".to_string();
        other.seeds.push("172.17.0.1".to_string());

        let left = Cluster::new(sample_opts()).expect("Build cluster.");
        let right = Cluster::new(other).expect("Build cluster.");

        assert_eq!(left.len(), right.len());
        for k in 0..left.len() {
            assert_eq!(
                left.get(k as i32).unwrap().addr,
                right.get(k as i32).unwrap().addr,
            );
        }
    }

    #[test]
    fn test_get_other_never_returns_self() {
        let cluster = Cluster::new(sample_opts()).expect("Build cluster.");

        for k in 0..100 {
            if let Some(node) = cluster.get_other(&format!("access-token-{k}")) {
                assert!(!node.is_self);
                assert_ne!(node.addr, cluster.listen());
            }
        }
    }

    #[test]
    fn test_token_owner_is_agreed_across_peers() {
        let left = Cluster::new(sample_opts()).expect("Build cluster.");
        let mut other = sample_opts();
        other.listen = "10.0.0.1".to_string();
        other.seeds.push("172.17.0.1".to_string());
        let right = Cluster::new(other).expect("Build cluster.");

        for k in 0..100 {
            let token = format!("access-token-{k}");
            let owner_left = left
                .get_other(&token)
                .map(|node| node.addr.clone())
                .unwrap_or_else(|| left.listen().to_string());
            let owner_right = right
                .get_other(&token)
                .map(|node| node.addr.clone())
                .unwrap_or_else(|| right.listen().to_string());
            assert_eq!(owner_left, owner_right);
        }
    }

    #[test]
    fn test_single_node_handles_everything_locally() {
        let cluster = Cluster::new(Opts {
            listen: "127.0.0.1:8080".to_string(),
            seeds: vec!["127.0.0.1:8080".to_string()],
        })
        .expect("Build cluster.");

        assert_eq!(cluster.len(), 1);
        for k in 0..100 {
            assert!(cluster.get_other(&format!("access-token-{k}")).is_none());
        }
    }

    #[test]
    fn test_empty_listen_is_rejected() {
        let err = Cluster::new(Opts {
            listen: String::new(),
            seeds: vec!["10.0.0.1".to_string()],
        })
        .unwrap_err();
        assert!(matches!(err, ClusterError::EmptyListen));
    }

    #[test]
    fn test_clients_absent_before_connect() {
        let cluster = Cluster::new(sample_opts()).expect("Build cluster.");

        for node in cluster.nodes() {
            assert!(cluster.client(node).is_none());
        }
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        // A single-node ring has no siblings to dial, so the first connect
        // completes without any network at all.
        let cluster = Cluster::new(Opts {
            listen: "127.0.0.1:8080".to_string(),
            seeds: Vec::new(),
        })
        .expect("Build cluster.");

        cluster.connect().await.expect("First connect.");
        let err = cluster.connect().await.unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyConnected));
    }
}
