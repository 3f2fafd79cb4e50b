use super::*;

#[tokio::test]
async fn broadcast_reaches_every_subscriber_verbatim() {
    let relay = ChatRelay::new(16);
    let mut a = relay.subscribe();
    let mut b = relay.subscribe();
    let mut c = relay.subscribe();

    let delivered = relay.broadcast("hello from a".to_string());
    assert_eq!(delivered, 3);

    for sub in [&mut a, &mut b, &mut c] {
        assert_eq!(sub.receiver.recv().await.expect("message"), "hello from a");
    }
}

#[tokio::test]
async fn broadcast_without_listeners_is_dropped() {
    let relay = ChatRelay::new(4);
    assert_eq!(relay.broadcast("nobody here".to_string()), 0);
}

#[tokio::test]
async fn per_connection_order_is_preserved() {
    let relay = ChatRelay::new(16);
    let mut sub = relay.subscribe();
    for i in 0..5 {
        relay.broadcast(format!("line {i}"));
    }
    for i in 0..5 {
        assert_eq!(sub.receiver.recv().await.expect("message"), format!("line {i}"));
    }
}

#[test]
fn dropping_subscription_unregisters_connection() {
    let relay = ChatRelay::new(4);
    let first = relay.subscribe();
    let second = relay.subscribe();
    assert_eq!(relay.connection_count(), 2);
    drop(first);
    assert_eq!(relay.connection_count(), 1);
    drop(second);
    assert_eq!(relay.connection_count(), 0);
}
