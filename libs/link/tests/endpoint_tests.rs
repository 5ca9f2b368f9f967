mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use tandem_link::{BincodeCodec, DrainOrder, Endpoint, EndpointBuilder, Error, Role, State};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

#[tokio::test]
async fn acceptor_receives_message_from_initiator() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("x.sock");

    let a = endpoint(Role::Acceptor, &path, config());
    let mut inbox = collect(&a);
    let b = endpoint(Role::Initiator, &path, config());

    connected_pair(&a, &b, &path).await;

    assert!(b.send_or_enqueue(msg(1, "hello")));
    assert_eq!(recv(&mut inbox).await, msg(1, "hello"));
}

#[tokio::test]
async fn traffic_flows_both_ways() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duplex.sock");

    let a = endpoint(Role::Acceptor, &path, config());
    let b = endpoint(Role::Initiator, &path, config());
    let mut a_inbox = collect(&a);
    let mut b_inbox = collect(&b);
    connected_pair(&a, &b, &path).await;

    assert!(a.send_or_enqueue(msg(10, "ping")));
    assert_eq!(recv(&mut b_inbox).await, msg(10, "ping"));

    assert!(b.send_or_enqueue(msg(11, "pong")));
    assert_eq!(recv(&mut a_inbox).await, msg(11, "pong"));
}

#[tokio::test]
async fn messages_buffered_while_disconnected_arrive_newest_first() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifo.sock");

    let b = endpoint(Role::Initiator, &path, config());
    assert!(b.start().await.is_err(), "nobody is accepting yet");
    assert!(b.is_started());

    assert!(b.send_or_enqueue(msg(1, "m1")));
    assert!(b.send_or_enqueue(msg(2, "m2")));
    assert_eq!(b.pending(), 2);

    let a = endpoint(Role::Acceptor, &path, config());
    let mut inbox = collect(&a);
    a.start().await.unwrap();

    assert_eq!(recv(&mut inbox).await, msg(2, "m2"));
    assert_eq!(recv(&mut inbox).await, msg(1, "m1"));
    assert_eq!(b.pending(), 0);
}

#[tokio::test]
async fn fifo_drain_order_is_opt_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fifo.sock");

    let b = endpoint(
        Role::Initiator,
        &path,
        config().drain_order(DrainOrder::Fifo),
    );
    let _ = b.start().await;
    for n in 1..=3 {
        assert!(b.send_or_enqueue(msg(n, "queued")));
    }

    let a = endpoint(Role::Acceptor, &path, config());
    let mut inbox = collect(&a);
    a.start().await.unwrap();

    for n in 1..=3 {
        assert_eq!(recv(&mut inbox).await.id, n);
    }
}

#[tokio::test]
async fn send_before_start_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let b = endpoint(Role::Initiator, &dir.path().join("idle.sock"), config());

    assert!(!b.send_or_enqueue(msg(1, "too early")));
    assert_eq!(b.pending(), 0);
    assert_eq!(b.state(), State::Disconnected);
}

#[tokio::test]
async fn initiator_reports_missing_acceptor_on_first_start() {
    let dir = tempfile::tempdir().unwrap();
    let b = endpoint(Role::Initiator, &dir.path().join("absent.sock"), config());

    let err = b.start().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)), "unexpected error: {err}");

    // Later calls are no-ops, not new failures.
    b.start().await.unwrap();
    b.dispose();
}

#[tokio::test]
async fn acceptor_start_times_out_then_keeps_listening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.sock");

    let a = endpoint(
        Role::Acceptor,
        &path,
        config().connect_timeout(Duration::from_millis(100)),
    );
    let err = a.start().await.unwrap_err();
    assert!(matches!(err, Error::ConnectTimeout(_)));
    assert_ne!(a.state(), State::Connected);

    let b = endpoint(Role::Initiator, &path, config());
    let mut b_inbox = collect(&b);
    let _ = b.start().await;
    wait_for_state(&b, |s| *s == State::Connected).await;
    wait_for_state(&a, |s| *s == State::Connected).await;

    assert!(a.send_or_enqueue(msg(5, "finally")));
    assert_eq!(recv(&mut b_inbox).await, msg(5, "finally"));
}

#[tokio::test]
async fn peer_restart_is_recovered_without_caller_help() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.sock");

    let a1 = endpoint(Role::Acceptor, &path, config());
    let mut a1_inbox = collect(&a1);
    let b = endpoint(Role::Initiator, &path, config());
    connected_pair(&a1, &b, &path).await;

    assert!(b.send_or_enqueue(msg(1, "before")));
    assert_eq!(recv(&mut a1_inbox).await, msg(1, "before"));

    a1.dispose();
    wait_for_state(&b, |s| *s != State::Connected).await;

    assert!(b.send_or_enqueue(msg(2, "during")));
    assert!(b.send_or_enqueue(msg(3, "during")));

    let a2 = endpoint(Role::Acceptor, &path, config());
    let mut a2_inbox = collect(&a2);
    a2.start().await.unwrap();

    let mut ids = vec![recv(&mut a2_inbox).await.id, recv(&mut a2_inbox).await.id];
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3]);
    wait_for_state(&b, |s| *s == State::Connected).await;
}

#[tokio::test]
async fn acceptor_waits_for_next_peer_after_eof() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eof.sock");

    let a = endpoint(Role::Acceptor, &path, config());
    let mut inbox = collect(&a);
    let accepting = start_in_background(&a);
    wait_for_socket(&path).await;

    let first = UnixStream::connect(&path).await.unwrap();
    accepting.await.unwrap().unwrap();
    assert!(a.is_connected());
    drop(first);

    wait_for_state(&a, |s| *s != State::Connected).await;
    wait_for_socket(&path).await;

    let mut second = UnixStream::connect(&path).await.unwrap();
    second
        .write_all(b"{\"id\":9,\"data\":\"second peer\"}\n")
        .await
        .unwrap();
    assert_eq!(recv(&mut inbox).await, msg(9, "second peer"));
}

#[tokio::test]
async fn only_one_peer_is_served_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("single.sock");

    let a = endpoint(Role::Acceptor, &path, config());
    let b = endpoint(Role::Initiator, &path, config());
    connected_pair(&a, &b, &path).await;

    assert!(UnixStream::connect(&path).await.is_err());
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.sock");

    let a = endpoint(Role::Acceptor, &path, config());
    let mut inbox = collect(&a);
    let accepting = start_in_background(&a);
    wait_for_socket(&path).await;

    let mut raw = UnixStream::connect(&path).await.unwrap();
    accepting.await.unwrap().unwrap();
    raw.write_all(b"definitely not json\n\n{\"id\":3}\n{\"id\":4,\"data\":\"ok\"}\n")
        .await
        .unwrap();

    assert_eq!(recv(&mut inbox).await, msg(4, "ok"));
    assert!(a.is_connected());
}

#[tokio::test]
async fn failing_subscribers_do_not_stop_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faults.sock");

    let a = endpoint(Role::Acceptor, &path, config());
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = order.clone();
    a.subscribe(move |m: &TestMessage| {
        log.lock().unwrap().push(format!("first:{}", m.id));
        panic!("first subscriber always fails");
    });
    let log = order.clone();
    a.try_subscribe(move |m: &TestMessage| {
        log.lock().unwrap().push(format!("second:{}", m.id));
        Err::<(), _>("rejected")
    });
    let mut inbox = collect(&a);
    assert_eq!(a.subscriber_count(), 3);

    let b = endpoint(Role::Initiator, &path, config());
    connected_pair(&a, &b, &path).await;

    assert!(b.send_or_enqueue(msg(1, "one")));
    assert_eq!(recv(&mut inbox).await.id, 1);
    assert!(b.send_or_enqueue(msg(2, "two")));
    assert_eq!(recv(&mut inbox).await.id, 2);

    assert_eq!(
        *order.lock().unwrap(),
        vec!["first:1", "second:1", "first:2", "second:2"]
    );
    assert!(a.is_connected());
}

#[tokio::test]
async fn manual_check_dispatches_only_when_pumped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manual.sock");

    let a = endpoint(Role::Acceptor, &path, config().manual_check(true));
    let mut inbox = collect(&a);
    let b = endpoint(Role::Initiator, &path, config());
    connected_pair(&a, &b, &path).await;

    assert!(b.send_or_enqueue(msg(1, "waiting")));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(inbox.try_recv().is_err(), "nothing may be dispatched without a pump");

    assert!(a.force_check().await.unwrap());
    assert_eq!(inbox.try_recv().unwrap(), msg(1, "waiting"));

    assert!(!a.force_check().await.unwrap());
}

#[tokio::test]
async fn force_check_is_rejected_in_automatic_mode() {
    let dir = tempfile::tempdir().unwrap();
    let b = endpoint(Role::Initiator, &dir.path().join("auto.sock"), config());
    assert!(matches!(b.force_check().await, Err(Error::ManualCheckDisabled)));
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let b = endpoint(Role::Initiator, &dir.path().join("gone.sock"), config());
    let _ = b.start().await;
    assert!(b.send_or_enqueue(msg(1, "dropped")));

    let disposers: Vec<_> = (0..4)
        .map(|_| {
            let b = b.clone();
            tokio::spawn(async move { b.dispose() })
        })
        .collect();
    for disposer in disposers {
        disposer.await.unwrap();
    }
    b.dispose();
    b.dispose();

    assert_eq!(b.state(), State::Disposed);
    assert_eq!(b.pending(), 0);
    assert!(!b.send_or_enqueue(msg(2, "late")));
    b.start().await.unwrap();
    assert_eq!(b.state(), State::Disposed);
}

#[tokio::test]
async fn manual_endpoint_disposal_is_a_no_op_for_force_check() {
    let dir = tempfile::tempdir().unwrap();
    let a = endpoint(
        Role::Acceptor,
        &dir.path().join("manual-gone.sock"),
        config()
            .manual_check(true)
            .connect_timeout(Duration::from_millis(50)),
    );
    let _ = a.start().await;
    a.dispose();
    assert!(!a.force_check().await.unwrap());
}

#[tokio::test]
async fn bincode_codec_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bincode.sock");
    let name = path.to_str().unwrap();

    let a: Endpoint<TestMessage, BincodeCodec> = EndpointBuilder::new(Role::Acceptor, name)
        .config(config())
        .codec(BincodeCodec)
        .build();
    let b: Endpoint<TestMessage, BincodeCodec> = EndpointBuilder::new(Role::Initiator, name)
        .config(config())
        .codec(BincodeCodec)
        .build();
    let mut inbox = collect(&a);
    connected_pair(&a, &b, &path).await;

    assert!(b.send_or_enqueue(msg(77, "line\nbreaks survive")));
    assert_eq!(recv(&mut inbox).await, msg(77, "line\nbreaks survive"));
}
