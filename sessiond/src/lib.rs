//! # Sessiond
//!
//! A session-management daemon with a static peer group.
//!
//! Sessions are keyed by opaque access tokens. Every daemon of a deployment
//! is started with the same seed list and derives the same ordered ring from
//! it, so all peers agree on which node owns which token. A client may talk
//! to any peer: token-keyed calls are either handled against local storage
//! or forwarded in a single hop to the owning sibling, and the response
//! passes back unchanged.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use sessiond::{Daemon, DaemonOpts};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("0.0.0.0:8080").await?;
//!
//!     let mut opts = DaemonOpts::new(
//!         listener,
//!         vec![
//!             "10.0.0.1:8080".to_string(),
//!             "10.0.0.2:8080".to_string(),
//!             "10.0.0.3:8080".to_string(),
//!         ],
//!     )?;
//!     // The address the rest of the deployment dials to reach this node.
//!     opts.cluster_listen = "10.0.0.1:8080".to_string();
//!
//!     let daemon = Daemon::start(opts).await?;
//!
//!     // Attach peer clients once every node of the deployment is serving.
//!     daemon.connect().await?;
//!     daemon.wait().await;
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate tracing;

mod daemon;
mod error;
mod service;
mod storage;
mod token;

pub use daemon::{Daemon, DaemonOpts, DEFAULT_SESSION_TTC, DEFAULT_SESSION_TTL};
pub use error::DaemonError;
pub use service::SessionService;
pub use storage::{Bag, MemoryStorage, Storage};
