use std::io;

use sessiond_cluster::ClusterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("{0}")]
    /// The cluster could not be built or connected. Fatal to daemon start.
    Cluster(#[from] ClusterError),

    #[error("{0}")]
    /// An IO error has occurred.
    Io(#[from] io::Error),
}
