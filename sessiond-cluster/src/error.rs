use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster listen address is empty")]
    /// The daemon was configured without a listen address.
    EmptyListen,

    #[error("cluster membership is empty")]
    /// The address union resolved to nothing. Unreachable as long as the
    /// listen address is always injected into the membership.
    EmptyMembership,

    #[error("no ring node matches the listen address {0}")]
    /// The ring was built without a self entry. Unreachable for the same
    /// reason as [`ClusterError::EmptyMembership`].
    NoSelfNode(String),

    #[error("cluster is already connected")]
    /// [`Cluster::connect`](crate::Cluster::connect) is one-shot; a second
    /// call is rejected.
    AlreadyConnected,

    #[error("failed to dial cluster peer {addr}: {source}")]
    /// A transport-level failure while dialing a peer. Fatal to daemon
    /// start; any channels opened before the failure stay attached and are
    /// dropped with the cluster.
    Dial {
        addr: String,
        #[source]
        source: tonic::transport::Error,
    },
}
