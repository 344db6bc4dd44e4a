//! End-to-end channel flows: two or three channels wired through in-memory
//! publishers, with messages shuttled by hand in place of the transport
//! fabric.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use causeway_channel::{
    ChannelConfig, ChannelEvent, ChannelId, DeliveryOrigin, MemoryPublisher, Message,
    MessageChannel, MessageId, ParticipantId, RepairConfig,
};

fn channel(name: &str) -> MessageChannel {
    MessageChannel::new(
        ChannelId::from("flow-room"),
        ParticipantId::from(name),
        ChannelConfig::default(),
    )
    .unwrap()
}

/// Send a payload with a succeeding publisher; returns the wire message.
async fn send(from: &mut MessageChannel, payload: &[u8]) -> Message {
    let publisher = MemoryPublisher::new();
    let log = publisher.log();
    from.send_message(Bytes::copy_from_slice(payload), Some(Box::new(publisher)));
    from.process_tasks().await;
    let log = log.lock().await;
    log.last().cloned().expect("message reached the publisher")
}

/// Send a sync heartbeat; returns the wire message.
async fn heartbeat(from: &mut MessageChannel) -> Message {
    let publisher = MemoryPublisher::new();
    let log = publisher.log();
    from.send_sync_message(Some(Box::new(publisher))).await.unwrap();
    let log = log.lock().await;
    log.last().cloned().expect("sync reached the publisher")
}

async fn deliver(to: &mut MessageChannel, message: Message) {
    to.receive_message(message);
    to.process_tasks().await;
}

#[tokio::test]
async fn successful_send_commits_log_buffer_and_filter() {
    let mut alice = channel("alice");
    let sent = send(&mut alice, b"P1").await;

    assert_eq!(alice.local_history().len(), 1);
    assert_eq!(alice.outgoing_buffer().len(), 1);
    assert!(alice.filter_contains(&sent.message_id));
    assert_eq!(sent.lamport_timestamp, Some(1));
}

#[tokio::test]
async fn missing_dependency_buffers_then_recovers() {
    let mut alice = channel("alice");
    let mut bob = channel("bob");

    // Alice publishes the dependency with a store retrieval hint, then a
    // message referencing it.
    let hint = Bytes::from_static(b"store-cursor-42");
    let publisher = MemoryPublisher::new().with_retrieval_hint(hint.clone());
    let log = publisher.log();
    alice.send_message(Bytes::from_static(b"D"), Some(Box::new(publisher)));
    alice.process_tasks().await;
    let dependency = log.lock().await.last().cloned().unwrap();

    let dependent = send(&mut alice, b"M1").await;
    assert_eq!(dependent.causal_history.len(), 1);

    // Bob sees only the dependent message.
    deliver(&mut bob, dependent).await;
    assert_eq!(bob.incoming_buffer().len(), 1);
    assert!(bob.local_history().is_empty());

    // The sweep reports the gap, hint included, for store retrieval.
    let missing = bob.sweep_incoming_buffer();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].message_id, dependency.message_id);
    assert_eq!(missing[0].retrieval_hint, Some(hint));

    // The dependency arrives; the next sweep delivers and the gap closes.
    deliver(&mut bob, dependency).await;
    assert!(bob.sweep_incoming_buffer().is_empty());
    assert!(bob.incoming_buffer().is_empty());
    assert_eq!(bob.local_history().len(), 2);
}

#[tokio::test]
async fn ephemeral_messages_bypass_all_protocol_state() {
    let mut alice = channel("alice");
    let mut bob = channel("bob");

    let publisher = MemoryPublisher::new();
    let log = publisher.log();
    alice.send_ephemeral_message(Bytes::from_static(b"P2"), Some(Box::new(publisher)));
    alice.process_tasks().await;

    assert!(alice.local_history().is_empty());
    assert!(alice.outgoing_buffer().is_empty());
    assert!(!alice.filter_contains(&MessageId::compute(b"P2")));

    let wire = log.lock().await.last().cloned().unwrap();
    deliver(&mut bob, wire).await;
    assert!(bob.local_history().is_empty());
    assert!(bob.incoming_buffer().is_empty());
    assert_eq!(bob.lamport_timestamp(), 0);
}

#[tokio::test]
async fn receive_emits_received_then_delivered() {
    let mut alice = channel("alice");
    let mut bob = channel("bob");
    let mut events = bob.subscribe();

    let wire = send(&mut alice, b"hello").await;
    let id = wire.message_id;
    deliver(&mut bob, wire).await;

    match events.try_recv().unwrap() {
        ChannelEvent::MessageReceived { message } => assert_eq!(message.message_id, id),
        other => panic!("expected MessageReceived, got {other:?}"),
    }
    match events.try_recv().unwrap() {
        ChannelEvent::MessageDelivered { message_id, origin } => {
            assert_eq!(message_id, id);
            assert_eq!(origin, DeliveryOrigin::Received);
        }
        other => panic!("expected MessageDelivered, got {other:?}"),
    }
}

#[tokio::test]
async fn heartbeats_alone_converge_acknowledgement_state() {
    let mut alice = channel("alice");
    let mut bob = channel("bob");

    for payload in [b"m1".as_slice(), b"m2", b"m3"] {
        let wire = send(&mut alice, payload).await;
        deliver(&mut bob, wire).await;
    }
    assert_eq!(alice.outgoing_buffer().len(), 3);

    // First heartbeat: the causal window fully acks the newest two, the
    // filter gives the oldest its first sighting.
    let sync = heartbeat(&mut bob).await;
    deliver(&mut alice, sync).await;
    assert_eq!(alice.outgoing_buffer().len(), 1);

    // Second sighting crosses the acknowledgement threshold.
    let sync = heartbeat(&mut bob).await;
    deliver(&mut alice, sync).await;
    assert!(alice.outgoing_buffer().is_empty());
}

#[tokio::test]
async fn conversation_converges_to_identical_histories() {
    let mut alice = channel("alice");
    let mut bob = channel("bob");

    let a1 = send(&mut alice, b"a1").await;
    deliver(&mut bob, a1).await;

    let b1 = send(&mut bob, b"b1").await;
    deliver(&mut alice, b1).await;

    let a2 = send(&mut alice, b"a2").await;
    deliver(&mut bob, a2).await;

    let sync = heartbeat(&mut bob).await;
    deliver(&mut alice, sync).await;

    assert!(alice.outgoing_buffer().is_empty());
    assert!(bob.outgoing_buffer().is_empty());

    let order = |c: &MessageChannel| -> Vec<(u64, MessageId)> {
        c.local_history()
            .iter()
            .map(|r| (r.timestamp, r.entry.message_id))
            .collect()
    };
    assert_eq!(order(&alice), order(&bob));
    assert_eq!(alice.local_history().len(), 3);
}

#[tokio::test]
async fn unacknowledged_partition_drives_caller_retry() {
    let mut alice = channel("alice");

    alice.send_message(
        Bytes::from_static(b"went-nowhere"),
        Some(Box::new(MemoryPublisher::new().failing())),
    );
    alice.process_tasks().await;

    let sweep = alice.sweep_outgoing_buffer();
    assert_eq!(sweep.unacknowledged.len(), 1);
    assert!(sweep.possibly_acknowledged.is_empty());

    // Republish is entirely caller-driven: the channel did not retry.
    assert!(alice.local_history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn repair_request_response_roundtrip() {
    let repair_config = ChannelConfig {
        repair: Some(RepairConfig::default()),
        ..Default::default()
    };
    let mut alice = channel("alice");
    let mut bob = MessageChannel::new(
        ChannelId::from("flow-room"),
        ParticipantId::from("bob"),
        repair_config.clone(),
    )
    .unwrap();
    let mut carol = MessageChannel::new(
        ChannelId::from("flow-room"),
        ParticipantId::from("carol"),
        repair_config,
    )
    .unwrap();

    // Alice's dependency reaches carol but not bob.
    let dependency = send(&mut alice, b"D").await;
    let dependent = send(&mut alice, b"M1").await;
    deliver(&mut carol, dependency.clone()).await;
    deliver(&mut bob, dependent).await;

    // Bob notices the gap and, after the stagger window, asks the group.
    bob.sweep_incoming_buffer();
    tokio::time::advance(Duration::from_secs(121)).await;
    let requests = bob.repair_requests_due(3);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message_id, dependency.message_id);

    // Carol holds the message and queues a response; the store lookup
    // resolves the full message when the response comes due.
    carol.process_repair_requests(&requests);
    tokio::time::advance(Duration::from_secs(121)).await;
    let store: HashMap<MessageId, Message> =
        [(dependency.message_id, dependency)].into_iter().collect();
    let responses = carol.repair_responses_due(|id| store.get(id).cloned());
    assert_eq!(responses.len(), 1);

    // The repaired message reaches bob; the sweep delivers the dependent.
    for message in responses {
        deliver(&mut bob, message).await;
    }
    assert!(bob.sweep_incoming_buffer().is_empty());
    assert_eq!(bob.local_history().len(), 2);
}
