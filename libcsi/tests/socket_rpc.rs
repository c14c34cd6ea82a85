use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use libcsi::transport::{CsiClient, CsiServer};
use libcsi::{
    CsiError, CsiMessage, DATA_KEY, FILENAME_KEY, FakeMounter, IdentityServer, InMemoryStore,
    NodePublishVolumeRequest, NodeServer, NodeStageVolumeRequest, NodeUnpublishVolumeRequest,
    PluginInfo, VolumeId, VolumeLifecycle,
};
use tracing::Span;

type TestServer = CsiServer<IdentityServer, NodeServer<FakeMounter>>;

fn start_server(dir: &Path, node_id: &str) -> (Arc<TestServer>, Arc<NodeServer<FakeMounter>>) {
    let identity = Arc::new(IdentityServer::new("test-driver.csi.io", "v1.0.0"));
    let lifecycle =
        VolumeLifecycle::new(InMemoryStore::new().into(), FakeMounter::new(), Span::none());
    let node = Arc::new(NodeServer::new(node_id, lifecycle));

    let server = Arc::new(CsiServer::bind(dir.join("csi.sock"), identity, Arc::clone(&node)).unwrap());
    let serving = Arc::clone(&server);
    tokio::spawn(async move { serving.serve().await });
    (server, node)
}

async fn request(client: &CsiClient, msg: CsiMessage) -> CsiMessage {
    tokio::time::timeout(Duration::from_secs(10), client.request(&msg))
        .await
        .expect("request timed out")
        .expect("transport failure")
}

#[tokio::test]
async fn identity_and_node_info_over_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, _node) = start_server(tmp.path(), "node-01");
    let client = CsiClient::connect(server.socket_path()).await.unwrap();

    let info = request(&client, CsiMessage::GetPluginInfo).await;
    assert!(matches!(
        info,
        CsiMessage::PluginInfoResponse(PluginInfo { ref name, ref vendor_version })
            if name == "test-driver.csi.io" && vendor_version == "v1.0.0"
    ));

    let probe = request(&client, CsiMessage::Probe).await;
    assert!(matches!(probe, CsiMessage::ProbeResult(true)));

    let node_info = request(&client, CsiMessage::GetNodeInfo).await;
    assert!(matches!(node_info, CsiMessage::NodeInfoResponse(ref i) if i.node_id == "node-01"));
}

#[tokio::test]
async fn publish_unpublish_over_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, node) = start_server(tmp.path(), "node-01");
    let client = CsiClient::connect(server.socket_path()).await.unwrap();
    let target_path = tmp.path().join("pod/mount").display().to_string();

    let publish = CsiMessage::PublishVolume(NodePublishVolumeRequest {
        volume_id: VolumeId::from("v1"),
        target_path: target_path.clone(),
        volume_context: HashMap::from([
            (FILENAME_KEY.to_owned(), "f".to_owned()),
            (DATA_KEY.to_owned(), "x".to_owned()),
        ]),
    });

    assert!(matches!(request(&client, publish.clone()).await, CsiMessage::Ok));
    assert!(matches!(request(&client, publish).await, CsiMessage::Ok));
    assert_eq!(node.lifecycle().mounter().mount_points().len(), 1);

    let unpublish = CsiMessage::UnpublishVolume(NodeUnpublishVolumeRequest {
        volume_id: VolumeId::from("v1"),
        target_path,
    });
    assert!(matches!(request(&client, unpublish.clone()).await, CsiMessage::Ok));
    assert!(matches!(request(&client, unpublish).await, CsiMessage::Ok));
    assert!(node.lifecycle().mounter().mount_points().is_empty());
}

#[tokio::test]
async fn errors_are_returned_in_envelope() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, _node) = start_server(tmp.path(), "");
    let client = CsiClient::connect(server.socket_path()).await.unwrap();

    let stage = request(&client, CsiMessage::StageVolume(NodeStageVolumeRequest::default())).await;
    assert!(matches!(stage, CsiMessage::Error(CsiError::Unimplemented(_))));

    let bad_publish = request(
        &client,
        CsiMessage::PublishVolume(NodePublishVolumeRequest {
            volume_id: VolumeId::from("v1"),
            target_path: tmp.path().join("t").display().to_string(),
            volume_context: HashMap::new(),
        }),
    )
    .await;
    assert!(matches!(bad_publish, CsiMessage::Error(CsiError::InvalidArgument(_))));

    let misdirected = request(&client, CsiMessage::Ok).await;
    assert!(matches!(misdirected, CsiMessage::Error(CsiError::InvalidArgument(_))));
}

#[tokio::test]
async fn concurrent_publishes_for_distinct_volumes() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, node) = start_server(tmp.path(), "node-01");
    let client = CsiClient::connect(server.socket_path()).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        let target_path = tmp.path().join(format!("pods/{i}/mount")).display().to_string();
        tasks.push(tokio::spawn(async move {
            let msg = CsiMessage::PublishVolume(NodePublishVolumeRequest {
                volume_id: VolumeId(format!("vol-{i}")),
                target_path,
                volume_context: HashMap::from([
                    (FILENAME_KEY.to_owned(), "f".to_owned()),
                    (DATA_KEY.to_owned(), i.to_string()),
                ]),
            });
            request(&client, msg).await
        }));
    }
    for task in tasks {
        assert!(matches!(task.await.unwrap(), CsiMessage::Ok));
    }

    assert_eq!(node.lifecycle().mounter().mount_points().len(), 16);
}

#[tokio::test]
async fn shutdown_removes_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let identity = Arc::new(IdentityServer::new("test-driver.csi.io", "v1.0.0"));
    let lifecycle =
        VolumeLifecycle::new(InMemoryStore::new().into(), FakeMounter::new(), Span::none());
    let node = Arc::new(NodeServer::new("node-01", lifecycle));
    let socket = tmp.path().join("csi.sock");

    // A leftover socket file from a previous run must not prevent binding.
    std::fs::write(&socket, "").unwrap();
    let server = CsiServer::bind(&socket, identity, node).unwrap();
    assert!(socket.exists());

    server.shutdown().await.unwrap();
    assert!(!socket.exists());
    assert!(CsiClient::connect(&socket).await.is_err());
}
