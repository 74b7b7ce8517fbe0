//! Peer notification over HTTP against mock cluster members

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8sd_features::controller::{
    trigger_queue, ConfigService, LeaderGate, LeadershipSource, NotifySettings, PeerNotifier,
    NOTIFY_PATH,
};
use k8sd_features::crd::ClusterConfiguration;
use k8sd_features::store::MemoryStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Holder(&'static str);

#[async_trait]
impl LeadershipSource for Holder {
    async fn holder_identity(&self) -> k8sd_features::Result<Option<String>> {
        Ok(Some(self.0.to_string()))
    }
}

async fn peer(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

async fn wait_for_requests(server: &MockServer, expected: usize) -> bool {
    for _ in 0..100 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_broadcast_reaches_every_peer() {
    let first = peer(200).await;
    let second = peer(200).await;

    let notifier =
        PeerNotifier::new(vec![first.uri(), second.uri()], NotifySettings::default()).unwrap();

    assert_eq!(notifier.broadcast().await, 0);
    assert_eq!(first.received_requests().await.unwrap().len(), 1);
    assert_eq!(second.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failing_peer_does_not_stop_others() {
    let healthy = peer(200).await;
    let broken = peer(500).await;

    let notifier =
        PeerNotifier::new(vec![broken.uri(), healthy.uri()], NotifySettings::default()).unwrap();

    assert_eq!(notifier.broadcast().await, 1);
    assert_eq!(healthy.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unresponsive_peer_times_out() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(NOTIFY_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&slow)
        .await;

    let settings = NotifySettings {
        timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let notifier = PeerNotifier::new(vec![slow.uri()], settings).unwrap();

    assert_eq!(notifier.broadcast().await, 1);
}

#[tokio::test]
async fn test_update_on_follower_notifies_peers() {
    let member = peer(200).await;
    let (handle, _receiver) = trigger_queue();
    let service = ConfigService::new(
        Arc::new(MemoryStore::new(ClusterConfiguration::default())),
        LeaderGate::new(Arc::new(Holder("node-b_1")), "node-a"),
        handle,
        Arc::new(PeerNotifier::new(vec![member.uri()], NotifySettings::default()).unwrap()),
    );

    let mut patch = ClusterConfiguration::default();
    patch.metrics_server.enabled = Some(false);
    let committed = service.update(&patch).await.unwrap();

    assert_eq!(committed.metrics_server.enabled, Some(false));
    assert!(wait_for_requests(&member, 1).await);
}
