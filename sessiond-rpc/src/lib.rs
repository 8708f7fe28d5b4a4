//! Wire schema for the sessiond session-manager service.
//!
//! The message types and the tonic client/server bindings live in
//! [`sessiond_api`], generated from `proto/sessiond.proto`. The generated
//! output is committed so downstream builds do not need `protoc`; regenerate
//! with `tonic-build` after editing the proto.
//!
//! Forwarded requests between peers use these exact types in both legs, so
//! an entry node and the owning node always speak the same schema.

mod sessiond_api;

pub use sessiond_api::session_manager_client::SessionManagerClient;
pub use sessiond_api::session_manager_server::{SessionManager, SessionManagerServer};
pub use sessiond_api::{
    DeleteRequest,
    DeleteResponse,
    ExistsRequest,
    ExistsResponse,
    GetRequest,
    GetResponse,
    Session,
    SetValueRequest,
    SetValueResponse,
    StartRequest,
    StartResponse,
};
