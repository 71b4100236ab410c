//! Broker module tests

use std::sync::Arc;

use bytes::Bytes;
use pretty_assertions::assert_eq;

use super::*;

fn broker() -> Broker {
    Broker::new(BrokerConfig::default())
}

fn client(id: &str) -> ClientId {
    ClientId::from(id)
}

#[test]
fn test_connect_records_session() {
    let broker = broker();
    let conn = broker.connect(client("c1"));

    assert!(broker.registry().has_session(conn.session()));
    assert_eq!(conn.client(), &client("c1"));
    assert_eq!(broker.connection_count(), 1);
}

#[test]
fn test_disconnect_releases_everything() {
    let broker = broker();
    let c1 = client("c1");
    let conn = broker.connect(c1.clone());
    broker.subscribe(&c1, ["a", "b"]).unwrap();

    broker.disconnect(conn.session(), &c1);

    let registry = broker.registry();
    assert!(registry.get_sessions().is_empty());
    assert!(registry.topic_names().is_empty());
    assert_eq!(broker.connection_count(), 0);
}

#[test]
fn test_subscribe_requires_connection() {
    let broker = broker();
    let ghost = client("ghost");

    assert_eq!(
        broker.subscribe(&ghost, ["a"]),
        Err(BrokerError::UnknownClient(ghost.clone()))
    );
    assert_eq!(
        broker.unsubscribe(&ghost, ["a"]),
        Err(BrokerError::UnknownClient(ghost.clone()))
    );
    assert!(!broker.registry().has_topic("a"));
}

#[test]
fn test_error_display() {
    let err = BrokerError::UnknownClient(client("c9"));
    assert_eq!(err.to_string(), "Unknown client: c9");
}

#[tokio::test]
async fn test_publish_fans_out_to_subscribers() {
    let broker = broker();
    let mut a = broker.connect(client("a"));
    let mut b = broker.connect(client("b"));
    let mut c = broker.connect(client("c"));
    broker.subscribe(a.client(), ["news"]).unwrap();
    broker.subscribe(b.client(), ["news", "sport"]).unwrap();
    broker.subscribe(c.client(), ["sport"]).unwrap();

    let outcome = broker.publish("news", Bytes::from_static(b"hello"));
    assert_eq!(
        outcome,
        PublishOutcome {
            delivered: 2,
            dropped: 0
        }
    );

    for conn in [&mut a, &mut b] {
        let delivery = conn.recv().await.unwrap();
        assert_eq!(delivery.topic.as_ref(), "news");
        assert_eq!(delivery.payload, Bytes::from_static(b"hello"));
    }
    assert!(c.try_recv().is_none());
}

#[test]
fn test_publish_without_subscribers() {
    let broker = broker();
    let outcome = broker.publish("void", Bytes::from_static(b"x"));
    assert_eq!(outcome, PublishOutcome::default());
}

#[test]
fn test_publish_after_unsubscribe() {
    let broker = broker();
    let mut conn = broker.connect(client("c1"));
    broker.subscribe(conn.client(), ["a"]).unwrap();
    broker.unsubscribe(conn.client(), ["a"]).unwrap();

    let outcome = broker.publish("a", Bytes::from_static(b"x"));
    assert_eq!(outcome.delivered, 0);
    assert!(conn.try_recv().is_none());
}

#[test]
fn test_full_channel_drops() {
    let broker = Broker::new(BrokerConfig {
        outbound_channel_capacity: 1,
    });
    let mut conn = broker.connect(client("c1"));
    broker.subscribe(conn.client(), ["a"]).unwrap();

    assert_eq!(broker.publish("a", Bytes::from_static(b"1")).delivered, 1);
    assert_eq!(broker.publish("a", Bytes::from_static(b"2")).dropped, 1);

    assert_eq!(conn.try_recv().unwrap().payload, Bytes::from_static(b"1"));
    assert!(conn.try_recv().is_none());
}

#[test]
fn test_unbounded_channel() {
    let broker = Broker::new(BrokerConfig {
        outbound_channel_capacity: 0,
    });
    let mut conn = broker.connect(client("c1"));
    broker.subscribe(conn.client(), ["a"]).unwrap();

    for _ in 0..5000 {
        broker.publish("a", Bytes::from_static(b"x"));
    }

    let mut received = 0;
    while conn.try_recv().is_some() {
        received += 1;
    }
    assert_eq!(received, 5000);
}

#[test]
fn test_closed_receiver_counts_as_dropped() {
    let broker = broker();
    let conn = broker.connect(client("c1"));
    broker.subscribe(conn.client(), ["a"]).unwrap();
    drop(conn);

    let outcome = broker.publish("a", Bytes::from_static(b"x"));
    assert_eq!(outcome.dropped, 1);
}

#[test]
fn test_subscriber_without_connection_is_dropped() {
    let registry = Arc::new(Registry::new());
    let broker = Broker::with_registry(registry.clone(), BrokerConfig::default());
    registry.subscribe(["a"], &client("offline"));

    let outcome = broker.publish("a", Bytes::from_static(b"x"));
    assert_eq!(outcome.dropped, 1);
}

#[tokio::test]
async fn test_takeover_keeps_subscriptions() {
    let broker = broker();
    let c1 = client("c1");
    let mut old = broker.connect(c1.clone());
    broker.subscribe(&c1, ["a"]).unwrap();

    let mut new = broker.connect(c1.clone());
    assert_ne!(old.session(), new.session());
    assert!(!broker.registry().has_session(old.session()));
    assert!(broker.registry().has_session(new.session()));

    // The old channel is closed once its sender is replaced
    assert!(old.recv().await.is_none());

    // A late disconnect from the old connection must not touch the new one
    broker.disconnect(old.session(), &c1);
    assert_eq!(broker.connection_count(), 1);
    assert!(broker.registry().has_topic("a"));

    broker.publish("a", Bytes::from_static(b"still here"));
    assert_eq!(new.recv().await.unwrap().payload, Bytes::from_static(b"still here"));
}

#[test]
fn test_shutdown_resets_registry() {
    let broker = broker();
    let conn = broker.connect(client("c1"));
    broker.subscribe(conn.client(), ["a"]).unwrap();

    broker.shutdown();

    assert_eq!(broker.connection_count(), 0);
    assert_eq!(broker.registry().stats(), crate::registry::RegistryStats::default());
}

#[test]
fn test_metrics_are_updated() {
    let metrics = Arc::new(Metrics::new());
    let mut broker = broker();
    broker.set_metrics(metrics.clone());

    let conn = broker.connect(client("c1"));
    broker.subscribe(conn.client(), ["a"]).unwrap();
    broker.publish("a", Bytes::from_static(b"x"));
    broker.publish("b", Bytes::from_static(b"x"));
    broker.disconnect(conn.session(), conn.client());

    assert_eq!(metrics.connections_total.get(), 1);
    assert_eq!(metrics.connections_current.get(), 0);
    assert_eq!(metrics.subscribe_total.get(), 1);
    assert_eq!(metrics.publish_total.get(), 2);
    assert_eq!(metrics.deliveries_total.get(), 1);
}
