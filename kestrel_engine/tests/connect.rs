mod utils;

use kestrel_engine::prelude::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use utils::{identity, Behaviour, Harness, MockConnector, NET};

#[tokio::test]
async fn falls_back_in_priority_order() {
    let mut h = Harness::new(1000);
    h.connector.set("a", 1, Behaviour::Refuse);
    h.connector.set("b", 2, Behaviour::Refuse);
    h.connector.set("c", 3, Behaviour::Accept);

    let identity = identity(vec![
        Endpoint::new("c", 3).with_priority(3),
        Endpoint::new("a", 1).with_priority(1),
        Endpoint::new("b", 2).with_priority(2),
    ]);

    let session = h.orchestrator.connect(identity).await.unwrap();
    assert_eq!(session.endpoint().address, "c");
    assert_eq!(h.connector.attempts(), ["a:1", "b:2", "c:3"]);

    let status = h.status_lines();
    assert_eq!(status.len(), 3);
    assert!(status[0].starts_with("Could not connect to a:1"));
    assert!(status[1].starts_with("Could not connect to b:2"));
    assert_eq!(status[2], "Connected to c:3");

    let _server = h.next_server().await;
}

#[tokio::test]
async fn timeout_then_tls_endpoint() {
    let mut h = Harness::new(200);
    h.connector.set("h1", 6667, Behaviour::Hang);
    h.connector.set("h2", 6697, Behaviour::Accept);

    let identity = identity(vec![
        Endpoint::new("h1", 6667).with_priority(1),
        Endpoint::new("h2", 6697).with_tls(true).with_priority(2),
    ]);

    let session = h.orchestrator.connect(identity).await.unwrap();
    assert_eq!(session.endpoint(), &Endpoint::new("h2", 6697).with_tls(true).with_priority(2));
    assert_eq!(h.orchestrator.lifecycle(NET), SessionLifecycle::Connected);

    assert_eq!(
        h.status_lines(),
        [
            "Could not connect to h1:6667: Connection attempt timed out",
            "Connected to h2:6697 (tls)",
        ]
    );

    let established = h.wait_for("connection.established").await;
    assert_eq!(established.get_str("network"), Some("h2"));
    assert_eq!(established.get("networkId"), Some(&1.into()));

    // Registration doesn't add history
    let mut server = h.next_server().await;
    server.welcome("alice").await;
    server.send("PING :sync").await;
    assert_eq!(server.expect_line().await, "PONG :sync");
    assert_eq!(h.status_lines().len(), 2);
}

#[tokio::test]
async fn every_endpoint_failing() {
    let h = Harness::new(100);
    h.connector.set("h1", 6667, Behaviour::Hang);
    h.connector.set("h2", 6667, Behaviour::Refuse);

    let result = h
        .orchestrator
        .connect(identity(vec![Endpoint::new("h1", 6667), Endpoint::new("h2", 6667)]))
        .await;

    match result {
        Err(ConnectError::AllEndpointsFailed { network, last }) => {
            assert_eq!(network, NET);
            assert!(matches!(last, TransportError::Io(_)));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(h.status_lines().len(), 2);
    assert_eq!(h.orchestrator.lifecycle(NET), SessionLifecycle::Disconnected);
}

#[tokio::test]
async fn no_endpoints() {
    let h = Harness::new(100);

    assert!(matches!(
        h.orchestrator.connect(identity(Vec::new())).await,
        Err(ConnectError::NoEndpoints(NET))
    ));
    assert!(h.status_lines().is_empty());

    // The failed attempt mustn't leave the network locked
    h.connector.set("h1", 6667, Behaviour::Accept);
    h.orchestrator
        .connect(identity(vec![Endpoint::new("h1", 6667)]))
        .await
        .unwrap();
}

#[tokio::test]
async fn one_attempt_at_a_time() {
    let gate = Arc::new(Notify::new());
    let mut h = Harness::with_connector(MockConnector::gated(Arc::clone(&gate)), 1000);
    h.connector.set("h1", 6667, Behaviour::Accept);
    let network = identity(vec![Endpoint::new("h1", 6667)]);

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn({
        let network = network.clone();
        async move { orchestrator.connect(network).await }
    });

    timeout(Duration::from_secs(5), h.connector.entered.notified())
        .await
        .unwrap();
    assert_eq!(h.orchestrator.lifecycle(NET), SessionLifecycle::Connecting);
    assert!(matches!(
        h.orchestrator.connect(network.clone()).await,
        Err(ConnectError::AlreadyConnecting(NET))
    ));
    assert!(matches!(
        h.orchestrator.disconnect(NET),
        Err(DisconnectError::StillConnecting(NET))
    ));

    gate.notify_one();
    let session = first.await.unwrap().unwrap();
    assert!(session.is_connected());

    assert!(matches!(
        h.orchestrator.connect(network).await,
        Err(ConnectError::AlreadyConnected(NET))
    ));
    assert_eq!(h.connector.attempts().len(), 1);

    let _server = h.next_server().await;
}

#[tokio::test]
async fn abandoned_attempt_frees_network() {
    let gate = Arc::new(Notify::new());
    let h = Harness::with_connector(MockConnector::gated(Arc::clone(&gate)), 1000);
    h.connector.set("h1", 6667, Behaviour::Accept);
    let network = identity(vec![Endpoint::new("h1", 6667)]);

    let orchestrator = h.orchestrator.clone();
    let attempt = tokio::spawn({
        let network = network.clone();
        async move { orchestrator.connect(network).await }
    });

    timeout(Duration::from_secs(5), h.connector.entered.notified())
        .await
        .unwrap();
    attempt.abort();
    assert!(attempt.await.unwrap_err().is_cancelled());

    assert_eq!(h.orchestrator.lifecycle(NET), SessionLifecycle::Disconnected);

    gate.notify_one();
    h.orchestrator.connect(network).await.unwrap();
}

#[tokio::test]
async fn disconnect_sends_quit() {
    let mut h = Harness::new(1000);
    h.connector.set("h1", 6667, Behaviour::Accept);
    let session = h
        .orchestrator
        .connect(identity(vec![Endpoint::new("h1", 6667)]))
        .await
        .unwrap();
    let mut server = h.next_server().await;
    server.welcome("alice").await;

    h.orchestrator.disconnect_with_reason(NET, Some("bye")).unwrap();
    assert!(session.is_torn_down());
    assert_eq!(server.drain().await, ["QUIT :bye"]);

    let lost = h.wait_for("connection.lost").await;
    assert_eq!(lost.get_str("network"), Some("h1"));
    assert!(!session.is_connected());
    assert_eq!(h.status_lines().last().map(String::as_str), Some("Disconnected from h1:6667"));

    assert!(matches!(
        h.orchestrator.disconnect(NET),
        Err(DisconnectError::NotConnected(NET))
    ));
    assert!(h.orchestrator.session(NET).is_none());
}

#[tokio::test]
async fn server_closing_releases_session() {
    let mut h = Harness::new(1000);
    h.connector.set("h1", 6667, Behaviour::Accept);
    let network = identity(vec![Endpoint::new("h1", 6667)]);
    h.orchestrator.connect(network.clone()).await.unwrap();

    let server = h.next_server().await;
    drop(server);

    h.wait_for("connection.lost").await;
    // The read loop releases the registry just after publishing
    timeout(Duration::from_secs(5), async {
        while h.orchestrator.lifecycle(NET) != SessionLifecycle::Disconnected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    h.orchestrator.connect(network).await.unwrap();
    assert_eq!(h.connector.attempts().len(), 2);
}

#[tokio::test]
async fn auto_connect_staggers_and_filters() {
    let mut h = Harness::new(1000);
    h.connector.set("one", 6667, Behaviour::Accept);
    h.connector.set("two", 6667, Behaviour::Accept);
    h.connector.set("three", 6667, Behaviour::Accept);

    let make = |id: i64, address: &str, auto_connect: bool| NetworkIdentity {
        id: NetworkId::new(id),
        auto_connect,
        ..identity(vec![Endpoint::new(address, 6667)])
    };

    let handles = h.orchestrator.auto_connect(
        vec![make(1, "one", true), make(2, "two", false), make(3, "three", true)],
        tokio_util::sync::CancellationToken::new(),
    );
    assert_eq!(handles.len(), 2);
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.connector.attempts(), ["one:6667", "three:6667"]);
    assert_eq!(h.orchestrator.sessions().len(), 2);
    assert_eq!(h.orchestrator.lifecycle(NetworkId::new(2)), SessionLifecycle::Disconnected);

    let _first = h.next_server().await;
    let _second = h.next_server().await;
}

#[tokio::test]
async fn auto_connect_cancellation() {
    let h = Harness::new(1000);
    h.connector.set("one", 6667, Behaviour::Accept);
    h.connector.set("two", 6667, Behaviour::Accept);

    let make = |id: i64, address: &str| NetworkIdentity {
        id: NetworkId::new(id),
        auto_connect: true,
        ..identity(vec![Endpoint::new(address, 6667)])
    };

    let cancel = tokio_util::sync::CancellationToken::new();
    let mut handles = h
        .orchestrator
        .auto_connect(vec![make(1, "one"), make(2, "two")], cancel.clone());

    // The first network starts straight away; the second is still waiting
    // out its stagger delay when we cancel
    let first = handles.remove(0);
    first.await.unwrap();
    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.connector.attempts(), ["one:6667"]);
}
