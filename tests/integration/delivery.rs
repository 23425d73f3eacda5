use crate::*;

use bytes::Bytes;
use skylink_core::wire::MAX_PAYLOAD;
use skylink_demo::DeliveryVerifier;

/// A sends "Hello world!" to B; B's consumer sees it once, attributed to A.
#[tokio::test(flavor = "multi_thread")]
async fn test_point_to_point_happy_path() {
    let registry = spawn_registry().await;
    let (a, a_uid) = start_ready(&registry).await;
    let (b, b_uid) = start_ready(&registry).await;

    let verifier = DeliveryVerifier::new(a_uid, &b"Hello world!"[..]);
    let _handler = {
        let verifier = verifier.clone();
        b.on_client_stream(move |stream| {
            let verifier = verifier.clone();
            stream
                .subscribe(move |envelope| {
                    verifier.observe(&envelope);
                })
                .expect("fresh inbound stream accepts a consumer");
        })
    };

    a.open_stream(b_uid)
        .send(&b"Hello world!"[..])
        .await
        .unwrap();

    let verdict = verifier
        .wait(DELIVERY_TIMEOUT)
        .await
        .expect("delivery should complete within 3000 ms");
    assert!(verdict.sender_ok, "sender should be A");
    assert!(verdict.payload_ok, "payload should be intact");

    stop_all(&[&a, &b], registry).await;
}

/// B never attaches a consumer: the wait expires instead of hanging.
#[tokio::test]
async fn test_delivery_times_out_without_consumer() {
    let registry = spawn_registry().await;
    let (a, a_uid) = start_ready(&registry).await;
    let (b, b_uid) = start_ready(&registry).await;

    let verifier = DeliveryVerifier::new(a_uid, &b"Hello world!"[..]);
    a.open_stream(b_uid)
        .send(&b"Hello world!"[..])
        .await
        .unwrap();

    let started = std::time::Instant::now();
    assert_eq!(verifier.wait(Duration::from_millis(300)).await, None);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!verifier.is_done());

    stop_all(&[&a, &b], registry).await;
}

/// Payloads come back byte for byte, including empty and maximum-size ones.
#[tokio::test]
async fn test_payload_round_trip() {
    let registry = spawn_registry().await;
    let (a, _) = start_ready(&registry).await;
    let (b, b_uid) = start_ready(&registry).await;
    let (_h, mut streams) = inbound(&b);

    let payloads: Vec<Bytes> = vec![
        Bytes::from_static(b"first"),
        Bytes::new(),
        Bytes::from((0..=255u8).collect::<Vec<_>>()),
        Bytes::from(vec![0xA5; MAX_PAYLOAD]),
    ];

    let out = a.open_stream(b_uid);
    for p in &payloads {
        out.send(p.clone()).await.unwrap();
    }

    let stream = recv_within(&mut streams).await.expect("inbound stream");
    let (_sub, mut rx) = collect(&stream);
    for expected in &payloads {
        let got = recv_within(&mut rx).await.expect("payload should arrive");
        assert_eq!(&got.payload, expected);
    }

    stop_all(&[&a, &b], registry).await;
}

/// The inbound handler sees the opener's identity.
#[tokio::test]
async fn test_sender_attribution() {
    let registry = spawn_registry().await;
    let (a, a_uid) = start_ready(&registry).await;
    let (c, c_uid) = start_ready(&registry).await;
    let (b, b_uid) = start_ready(&registry).await;
    let (_h, mut streams) = inbound(&b);

    a.open_stream(b_uid).send(&b"from a"[..]).await.unwrap();
    let first = recv_within(&mut streams).await.expect("stream from A");
    assert_eq!(first.peer(), a_uid);

    c.open_stream(b_uid).send(&b"from c"[..]).await.unwrap();
    let second = recv_within(&mut streams).await.expect("stream from C");
    assert_eq!(second.peer(), c_uid);

    let (_sub, mut rx) = collect(&second);
    let env = recv_within(&mut rx).await.unwrap();
    assert_eq!(env.sender, c_uid);
    assert_eq!(&env.payload[..], b"from c");

    stop_all(&[&a, &b, &c], registry).await;
}

/// Many sends on one endpoint arrive in order.
#[tokio::test]
async fn test_fifo_order() {
    const COUNT: u32 = 500;

    let registry = spawn_registry().await;
    let (a, _) = start_ready(&registry).await;
    let (b, b_uid) = start_ready(&registry).await;
    let (_h, mut streams) = inbound(&b);

    let out = a.open_stream(b_uid);
    for i in 0..COUNT {
        out.send(i.to_le_bytes().to_vec()).await.unwrap();
    }

    let stream = recv_within(&mut streams).await.expect("inbound stream");
    let (_sub, mut rx) = collect(&stream);
    for i in 0..COUNT {
        let env = recv_within(&mut rx).await.expect("frame should arrive");
        assert_eq!(&env.payload[..], &i.to_le_bytes(), "frame {i} out of order");
    }
    assert_eq!(stream.received_count(), COUNT as u64);

    stop_all(&[&a, &b], registry).await;
}

/// The inbound endpoint can answer on the same channel.
#[tokio::test]
async fn test_bidirectional_reply() {
    let registry = spawn_registry().await;
    let (a, _) = start_ready(&registry).await;
    let (b, b_uid) = start_ready(&registry).await;
    let (_h, mut streams) = inbound(&b);

    let out = a.open_stream(b_uid);
    let (_replies, mut replies) = collect(&out);
    out.send(&b"ping"[..]).await.unwrap();

    let at_b = recv_within(&mut streams).await.expect("inbound stream");
    let (_sub, mut rx) = collect(&at_b);
    assert_eq!(&recv_within(&mut rx).await.unwrap().payload[..], b"ping");
    at_b.send(&b"pong"[..]).await.unwrap();

    let reply = recv_within(&mut replies).await.expect("reply should arrive");
    assert_eq!(reply.sender, b_uid);
    assert_eq!(&reply.payload[..], b"pong");
    assert_eq!(a.stream_count(), 1);

    stop_all(&[&a, &b], registry).await;
}

/// Sending to an identity that is not online is reported on the endpoint.
#[tokio::test]
async fn test_undeliverable_destination() {
    let registry = spawn_registry().await;
    let (a, _) = start_ready(&registry).await;

    let out = a.open_stream(Uid::random());
    out.send(&b"anyone?"[..]).await.unwrap();

    let deadline = tokio::time::Instant::now() + DELIVERY_TIMEOUT;
    while out.undeliverable_count() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(out.undeliverable_count(), 1);
    assert_eq!(registry.stats().snapshot().undeliverable, 1);

    stop_all(&[&a], registry).await;
}

/// A stream nobody consumes holds at most its buffer depth; the rest is
/// dropped and counted.
#[tokio::test]
async fn test_unconsumed_stream_buffer_is_capped() {
    let registry = spawn_registry().await;
    let (a, _) = start_ready(&registry).await;
    let b = ClientHandle::start(client_config(&registry).with_inbound_buffer(4));
    let b_uid = b.wait_registered(READY_TIMEOUT).await.unwrap();
    let (_h, mut streams) = inbound(&b);

    let out = a.open_stream(b_uid);
    for i in 0..20u8 {
        out.send(vec![i]).await.unwrap();
    }

    let at_b = recv_within(&mut streams).await.expect("inbound stream");
    let settled = tokio::time::timeout(DELIVERY_TIMEOUT, async {
        while at_b.received_count() + at_b.dropped_count() < 20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "all frames should reach B");
    assert_eq!(at_b.received_count(), 4);
    assert_eq!(at_b.dropped_count(), 16);

    // The buffered envelopes are the first four, in order.
    let (_sub, mut rx) = collect(&at_b);
    for i in 0..4u8 {
        assert_eq!(&recv_within(&mut rx).await.unwrap().payload[..], &[i]);
    }

    stop_all(&[&a, &b], registry).await;
}
