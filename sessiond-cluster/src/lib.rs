//! # Sessiond Cluster
//!
//! The static membership and request-routing core used within sessiond.
//!
//! A deployment is a fixed peer group: every daemon is started with the same
//! seed list, and each builds the identical ordered ring of nodes from it.
//! Because the ring is a pure function of the address set, peers agree on
//! which node owns which access token without ever talking to each other.
//!
//! ## Getting Started
//!
//! ```rust
//! use sessiond_cluster::{Cluster, Opts};
//!
//! fn main() -> Result<(), sessiond_cluster::ClusterError> {
//!     let cluster = Cluster::new(Opts {
//!         listen: "10.0.0.1:8080".to_string(),
//!         seeds: vec![
//!             "10.0.0.1:8080".to_string(),
//!             "10.0.0.2:8080".to_string(),
//!             "10.0.0.3:8080".to_string(),
//!         ],
//!     })?;
//!
//!     // Routing decisions are available immediately; RPC clients are
//!     // attached later by `cluster.connect()` once every peer is serving.
//!     match cluster.get_other("some-access-token") {
//!         Some(node) => println!("forward to {}", node.addr),
//!         None => println!("handle locally"),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! Membership never changes at runtime. A peer that dies stays in the ring
//! and its tokens surface as transient RPC errors until it is restarted;
//! rerouting them anywhere else would silently split ownership.

#[macro_use]
extern crate tracing;

mod cluster;
mod error;
mod network;
mod node;

pub use cluster::{Cluster, Opts};
pub use error::ClusterError;
pub use network::ClientNetwork;
pub use node::Node;
