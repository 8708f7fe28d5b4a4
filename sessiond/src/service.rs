use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sessiond_cluster::{Cluster, Node};
use sessiond_rpc::{
    DeleteRequest,
    DeleteResponse,
    ExistsRequest,
    ExistsResponse,
    GetRequest,
    GetResponse,
    Session,
    SessionManager,
    SessionManagerClient,
    SetValueRequest,
    SetValueResponse,
    StartRequest,
    StartResponse,
};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

use crate::storage::{unix_millis, Storage};
use crate::token;

/// How many candidate tokens `start` draws before giving up.
const START_TOKEN_ATTEMPTS: usize = 128;

/// The session-manager RPC service, routing included.
///
/// Every token-keyed operation is first resolved against the cluster ring:
/// a token owned by the local node is served from storage, anything else is
/// forwarded in one hop to the owning peer, and the reply (success or error
/// status alike) is returned unchanged. The owner resolves the same token to
/// itself, so a forwarded request is never forwarded again.
pub struct SessionService<S> {
    cluster: Arc<Cluster>,
    storage: Arc<S>,
    session_ttl: Duration,
}

impl<S> SessionService<S>
where
    S: Storage,
{
    pub fn new(cluster: Arc<Cluster>, storage: Arc<S>, session_ttl: Duration) -> Self {
        Self {
            cluster,
            storage,
            session_ttl,
        }
    }

    fn remote_client(&self, node: &Node) -> Result<SessionManagerClient<Channel>, Status> {
        match self.cluster.client(node) {
            Some(client) => {
                debug!(addr = %node.addr, "Forwarding request to the owning peer.");
                Ok(client)
            },
            None => Err(Status::unavailable(format!(
                "cluster peer {} is not connected",
                node.addr,
            ))),
        }
    }

    fn draw_local_token(&self) -> Result<String, Status> {
        // A fresh session must be owned by the accepting node: every sibling
        // routes later calls for the token straight back here.
        for _ in 0..START_TOKEN_ATTEMPTS {
            let token = token::random_access_token();
            if self.cluster.get_other(&token).is_none() {
                return Ok(token);
            }
        }
        Err(Status::internal("failed to draw a locally owned access token"))
    }
}

/// Reissues an inbound request for the forwarded leg, metadata included, so
/// the owning peer observes the caller's original request and deadline.
fn forwarded<T>(request: Request<T>) -> Request<T> {
    let metadata = request.metadata().clone();
    let mut forward = Request::new(request.into_inner());
    *forward.metadata_mut() = metadata;
    forward
}

fn require_token(token: &str) -> Result<(), Status> {
    if token.is_empty() {
        return Err(Status::invalid_argument("access token is missing"));
    }
    Ok(())
}

fn storage_error<E: Display>(error: E) -> Status {
    Status::internal(error.to_string())
}

#[async_trait]
impl<S> SessionManager for SessionService<S>
where
    S: Storage,
{
    async fn start(
        &self,
        request: Request<StartRequest>,
    ) -> Result<Response<StartResponse>, Status> {
        let inner = request.into_inner();
        if inner.subject_id.is_empty() {
            return Err(Status::invalid_argument("subject id is missing"));
        }

        let session = Session {
            access_token: self.draw_local_token()?,
            subject_id: inner.subject_id,
            subject_client: inner.subject_client,
            bag: inner.bag,
            expire_at_ms: unix_millis() + self.session_ttl.as_millis() as u64,
        };
        let session = self.storage.start(session).await.map_err(storage_error)?;

        debug!(subject_id = %session.subject_id, "Session started.");
        Ok(Response::new(StartResponse {
            session: Some(session),
        }))
    }

    async fn get(
        &self,
        request: Request<GetRequest>,
    ) -> Result<Response<GetResponse>, Status> {
        require_token(&request.get_ref().access_token)?;

        if let Some(node) = self.cluster.get_other(&request.get_ref().access_token) {
            let mut client = self.remote_client(node)?;
            return client.get(forwarded(request)).await;
        }

        let inner = request.into_inner();
        let session = self
            .storage
            .get(&inner.access_token)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| Status::not_found("session does not exist"))?;

        Ok(Response::new(GetResponse {
            session: Some(session),
        }))
    }

    async fn exists(
        &self,
        request: Request<ExistsRequest>,
    ) -> Result<Response<ExistsResponse>, Status> {
        require_token(&request.get_ref().access_token)?;

        if let Some(node) = self.cluster.get_other(&request.get_ref().access_token) {
            let mut client = self.remote_client(node)?;
            return client.exists(forwarded(request)).await;
        }

        let inner = request.into_inner();
        let exists = self
            .storage
            .exists(&inner.access_token)
            .await
            .map_err(storage_error)?;

        Ok(Response::new(ExistsResponse { exists }))
    }

    async fn set_value(
        &self,
        request: Request<SetValueRequest>,
    ) -> Result<Response<SetValueResponse>, Status> {
        require_token(&request.get_ref().access_token)?;

        if let Some(node) = self.cluster.get_other(&request.get_ref().access_token) {
            let mut client = self.remote_client(node)?;
            return client.set_value(forwarded(request)).await;
        }

        let inner = request.into_inner();
        if inner.key.is_empty() {
            return Err(Status::invalid_argument("bag key is missing"));
        }

        let bag = self
            .storage
            .set_value(&inner.access_token, &inner.key, &inner.value)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| Status::not_found("session does not exist"))?;

        Ok(Response::new(SetValueResponse { bag }))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        require_token(&request.get_ref().access_token)?;

        if let Some(node) = self.cluster.get_other(&request.get_ref().access_token) {
            let mut client = self.remote_client(node)?;
            return client.delete(forwarded(request)).await;
        }

        let inner = request.into_inner();
        let count = self
            .storage
            .delete(&inner.access_token)
            .await
            .map_err(storage_error)?;

        Ok(Response::new(DeleteResponse {
            count: count as i64,
        }))
    }
}
