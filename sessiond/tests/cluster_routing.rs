use std::collections::HashMap;

use anyhow::Result;
use sessiond::{Daemon, DaemonOpts};
use sessiond_cluster::{Cluster, Opts};
use sessiond_rpc::{
    DeleteRequest,
    ExistsRequest,
    GetRequest,
    SessionManagerClient,
    SetValueRequest,
    StartRequest,
};
use tokio::net::TcpListener;
use tonic::transport::Channel;
use tonic::Code;

struct TestPeer {
    addr: String,
    daemon: Daemon,
}

impl TestPeer {
    async fn client(&self) -> Result<SessionManagerClient<Channel>> {
        Ok(SessionManagerClient::connect(format!("http://{}", self.addr)).await?)
    }
}

/// Binds `count` listeners first so every daemon knows the full seed list,
/// then starts the daemons. Each peer gets its own private storage, so a
/// cross-peer read can only succeed by being forwarded to the owner.
async fn spawn_peers(count: usize) -> Result<(Vec<TestPeer>, Vec<String>)> {
    let _ = tracing_subscriber::fmt::try_init();

    let mut listeners = Vec::with_capacity(count);
    let mut seeds = Vec::with_capacity(count);
    for _ in 0..count {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        seeds.push(listener.local_addr()?.to_string());
        listeners.push(listener);
    }

    let mut peers = Vec::with_capacity(count);
    for listener in listeners {
        let addr = listener.local_addr()?.to_string();
        let opts = DaemonOpts::new(listener, seeds.clone())?;
        let daemon = Daemon::start(opts).await?;
        peers.push(TestPeer { addr, daemon });
    }

    Ok((peers, seeds))
}

async fn connect_all(peers: &[TestPeer]) -> Result<()> {
    for peer in peers {
        peer.daemon.connect().await?;
    }
    Ok(())
}

fn shutdown_all(peers: Vec<TestPeer>) {
    for peer in peers {
        peer.daemon.shutdown();
    }
}

async fn start_session(peer: &TestPeer) -> Result<String> {
    let mut client = peer.client().await?;
    let response = client
        .start(StartRequest {
            subject_id: format!("subject-{}", peer.addr),
            subject_client: "routing-tests".to_string(),
            bag: HashMap::new(),
        })
        .await?
        .into_inner();

    Ok(response.session.expect("session is set").access_token)
}

/// Finds a token that `listen`'s ring maps to a sibling node. The test-side
/// ring agrees with the daemons' rings because it is built from the same
/// address set.
fn remote_owned_token(listen: &str, seeds: &[String]) -> String {
    let cluster = Cluster::new(Opts {
        listen: listen.to_string(),
        seeds: seeds.to_vec(),
    })
    .expect("build probe ring");

    (0..)
        .map(|i| format!("probe-token-{i}"))
        .find(|token| cluster.get_other(token).is_some())
        .expect("a sibling-owned token exists")
}

#[tokio::test]
async fn test_get_is_transparent_across_three_peers() -> Result<()> {
    let (peers, _) = spawn_peers(3).await?;
    connect_all(&peers).await?;

    let mut tokens = Vec::new();
    for peer in &peers {
        tokens.push(start_session(peer).await?);
    }

    for peer in &peers {
        let mut client = peer.client().await?;
        for token in &tokens {
            let response = client
                .get(GetRequest {
                    access_token: token.clone(),
                })
                .await?
                .into_inner();

            let session = response.session.expect("session is set");
            assert_eq!(session.access_token, *token);
            assert_eq!(session.subject_client, "routing-tests");
        }
    }

    shutdown_all(peers);
    Ok(())
}

#[tokio::test]
async fn test_write_then_read_across_peers() -> Result<()> {
    let (peers, _) = spawn_peers(3).await?;
    connect_all(&peers).await?;

    let mut tokens = Vec::new();
    for peer in &peers {
        tokens.push(start_session(peer).await?);
    }

    // Every peer writes every session, whichever node owns it.
    for peer in &peers {
        let mut client = peer.client().await?;
        for token in &tokens {
            let response = client
                .set_value(SetValueRequest {
                    access_token: token.clone(),
                    key: token.clone(),
                    value: token.clone(),
                })
                .await?
                .into_inner();
            assert_eq!(response.bag.get(token), Some(token));
        }
    }

    // And every peer observes the write.
    for peer in &peers {
        let mut client = peer.client().await?;
        for token in &tokens {
            let session = client
                .get(GetRequest {
                    access_token: token.clone(),
                })
                .await?
                .into_inner()
                .session
                .expect("session is set");
            assert_eq!(session.bag.get(token), Some(token));
        }
    }

    shutdown_all(peers);
    Ok(())
}

#[tokio::test]
async fn test_cross_peer_delete() -> Result<()> {
    let (peers, _) = spawn_peers(3).await?;
    connect_all(&peers).await?;

    // The session started on the second peer is owned by it; the first peer
    // deletes it remotely.
    let token = start_session(&peers[1]).await?;

    let mut first = peers[0].client().await?;
    let deleted = first
        .delete(DeleteRequest {
            access_token: token.clone(),
        })
        .await?
        .into_inner();
    assert_eq!(deleted.count, 1);

    for peer in &peers {
        let mut client = peer.client().await?;

        let exists = client
            .exists(ExistsRequest {
                access_token: token.clone(),
            })
            .await?
            .into_inner();
        assert!(!exists.exists);

        let status = client
            .get(GetRequest {
                access_token: token.clone(),
            })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    shutdown_all(peers);
    Ok(())
}

#[tokio::test]
async fn test_remote_owner_is_unavailable_before_connect() -> Result<()> {
    let (peers, seeds) = spawn_peers(3).await?;

    let token = remote_owned_token(&peers[0].addr, &seeds);

    let mut client = peers[0].client().await?;
    let status = client
        .get(GetRequest {
            access_token: token,
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);

    shutdown_all(peers);
    Ok(())
}

#[tokio::test]
async fn test_not_found_passes_through_from_the_owner() -> Result<()> {
    let (peers, seeds) = spawn_peers(3).await?;
    connect_all(&peers).await?;

    // The probe token resolves to a sibling, so the status below is
    // produced by the owning peer and surfaced unchanged.
    let token = remote_owned_token(&peers[0].addr, &seeds);

    let mut client = peers[0].client().await?;
    let status = client
        .get(GetRequest {
            access_token: token,
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    shutdown_all(peers);
    Ok(())
}

#[tokio::test]
async fn test_single_peer_handles_everything_locally() -> Result<()> {
    let (peers, _) = spawn_peers(1).await?;
    connect_all(&peers).await?;

    let token = start_session(&peers[0]).await?;
    let mut client = peers[0].client().await?;

    let exists = client
        .exists(ExistsRequest {
            access_token: token.clone(),
        })
        .await?
        .into_inner();
    assert!(exists.exists);

    let bag = client
        .set_value(SetValueRequest {
            access_token: token.clone(),
            key: "theme".to_string(),
            value: "dark".to_string(),
        })
        .await?
        .into_inner()
        .bag;
    assert_eq!(bag.get("theme").map(String::as_str), Some("dark"));

    let deleted = client
        .delete(DeleteRequest {
            access_token: token.clone(),
        })
        .await?
        .into_inner();
    assert_eq!(deleted.count, 1);

    let exists = client
        .exists(ExistsRequest {
            access_token: token,
        })
        .await?
        .into_inner();
    assert!(!exists.exists);

    shutdown_all(peers);
    Ok(())
}

#[tokio::test]
async fn test_start_requires_a_subject() -> Result<()> {
    let (peers, _) = spawn_peers(1).await?;
    connect_all(&peers).await?;

    let mut client = peers[0].client().await?;
    let status = client
        .start(StartRequest {
            subject_id: String::new(),
            subject_client: "routing-tests".to_string(),
            bag: HashMap::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    shutdown_all(peers);
    Ok(())
}
