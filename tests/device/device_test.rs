// Device Tests
// Request multiplexing, timeouts, aborts and the online AND rule

use crate::support::rig;
use bytes::Bytes;
use homegate::Transport;
use homegate::device::packet;
use homegate::transport::{MemoryTransport, TransportConfig, TransportError};
use homegate::{Device, DeviceConfig, DeviceError, RequestError};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let (transport, _peer) = MemoryTransport::pair(TransportConfig::new());
    let config = DeviceConfig::new("bad").with_keepalive_window_ms(0);

    assert!(matches!(
        Device::new(config, transport),
        Err(DeviceError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_single_device_transport_takes_one_device() {
    let r = rig(5_000);
    let second = Device::new(DeviceConfig::new("second"), r.transport.clone());

    assert!(matches!(
        second,
        Err(DeviceError::Transport(TransportError::DeviceAlreadyBound))
    ));
}

#[tokio::test]
async fn test_identified_transport_rejects_duplicate_identifier() {
    let (transport, _peer) =
        MemoryTransport::pair(TransportConfig::new().with_identifier_length(Some(1)));
    let _a = Device::new(DeviceConfig::new("a").with_identifier(&[0x01]), transport.clone())
        .unwrap();

    let dup = Device::new(DeviceConfig::new("b").with_identifier(&[0x01]), transport.clone());
    let long = Device::new(DeviceConfig::new("c").with_identifier(&[0x02, 0x03]), transport);

    assert!(matches!(
        dup,
        Err(DeviceError::Transport(TransportError::DuplicateIdentifier(_)))
    ));
    assert!(matches!(
        long,
        Err(DeviceError::Transport(
            TransportError::IdentifierLengthMismatch { .. }
        ))
    ));
}

// ============================================================================
// REQUESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_request_refused_while_offline() {
    let mut r = rig(5_000);

    let result = r.device.request(&[0x10], &[0x01], Duration::from_secs(1)).await;

    assert_eq!(result, Err(RequestError::NotOnline));
    assert_eq!(result.unwrap_err().to_string(), "device is not online");
    assert_eq!(r.peer.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn test_request_frame_layout_and_response() {
    let mut r = rig(5_000);
    r.bring_online();

    let device = r.device.clone();
    let task = tokio::spawn(async move {
        device
            .request(&[0x10], &[0xAA, 0xBB], Duration::from_secs(1))
            .await
    });

    let request = r.next_request().await;
    assert_ne!(request.request_id, packet::EVENT_ID);
    assert_ne!(request.request_id, packet::KEEPALIVE_ID);
    assert_eq!(request.version, 1);
    assert_eq!(&request.body[..], &[0x10, packet::INDEX_PAD, 0xAA, 0xBB]);

    r.peer
        .inject(packet::encode_response(request.request_id, &[0x55]));

    assert_eq!(task.await.unwrap(), Ok(Bytes::from_static(&[0x55])));
    assert_eq!(r.device.pending_count(), 0);
    assert_eq!(r.device.stats().responses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_get_unique_ids() {
    let mut r = rig(60_000);
    r.bring_online();

    let mut tasks = Vec::new();
    for i in 0..50u8 {
        let device = r.device.clone();
        tasks.push(tokio::spawn(async move {
            device.request(&[0x10], &[i], Duration::ZERO).await
        }));
    }

    let mut ids = HashSet::new();
    let mut requests = Vec::new();
    for _ in 0..50 {
        let request = r.next_request().await;
        assert!(ids.insert(request.request_id), "id reused while pending");
        assert!(!packet::RESERVED_IDS.contains(&request.request_id));
        requests.push(request);
    }

    // Answer in reverse order; each caller must still get its own echo
    for request in requests.iter().rev() {
        let payload = request.payload_for(&[0x10]).unwrap();
        r.peer
            .inject(packet::encode_response(request.request_id, &payload));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Ok(Bytes::from(vec![i as u8])));
    }
}

#[tokio::test(start_paused = true)]
async fn test_request_ids_exhausted() {
    let r = rig(600_000);
    r.bring_online();

    for _ in 0..254 {
        let device = r.device.clone();
        tokio::spawn(async move { device.request(&[0x01], &[], Duration::ZERO).await });
    }
    while r.device.pending_count() < 254 {
        tokio::task::yield_now().await;
    }

    let result = r.device.request(&[0x01], &[], Duration::ZERO).await;
    assert_eq!(result, Err(RequestError::NoFreeRequestId));
}

#[tokio::test(start_paused = true)]
async fn test_request_times_out_after_its_timeout() {
    let r = rig(5_000);
    r.bring_online();

    let started = Instant::now();
    let result = r.device.request(&[0x10], &[], Duration::from_millis(2_000)).await;
    let elapsed = started.elapsed();

    assert_eq!(result, Err(RequestError::TimedOut));
    assert!(elapsed >= Duration::from_millis(2_000));
    assert!(elapsed < Duration::from_millis(2_050));
    assert_eq!(r.device.pending_count(), 0);
    assert_eq!(r.device.stats().timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_response_before_timeout_stops_timer() {
    let mut r = rig(10_000);
    r.bring_online();

    let device = r.device.clone();
    let task = tokio::spawn(async move {
        device
            .request(&[0x10], &[], Duration::from_millis(2_000))
            .await
    });
    let request = r.next_request().await;

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    r.peer.inject(packet::encode_response(request.request_id, &[0x01]));
    assert_eq!(task.await.unwrap(), Ok(Bytes::from_static(&[0x01])));

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    assert_eq!(r.device.stats().timeouts, 0);
    assert_eq!(r.device.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_waits_past_default() {
    let mut r = rig(60_000);
    r.bring_online();

    let device = r.device.clone();
    let task = tokio::spawn(async move { device.request(&[0x10], &[], Duration::ZERO).await });
    let request = r.next_request().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    r.ack();
    assert!(!task.is_finished());

    r.peer.inject(packet::encode_response(request.request_id, &[0x02]));
    assert_eq!(task.await.unwrap(), Ok(Bytes::from_static(&[0x02])));
}

#[tokio::test(start_paused = true)]
async fn test_unschedulable_timeout_waits_forever() {
    let mut r = rig(60_000);
    r.bring_online();

    let device = r.device.clone();
    let task = tokio::spawn(async move { device.request(&[0x10], &[], Duration::MAX).await });
    let request = r.next_request().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!task.is_finished());
    assert_eq!(r.device.pending_count(), 1);

    r.peer.inject(packet::encode_response(request.request_id, &[0x03]));
    assert_eq!(task.await.unwrap(), Ok(Bytes::from_static(&[0x03])));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_frees_its_id() {
    let r = rig(5_000);
    r.bring_online();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        r.device.request(&[0x10], &[], Duration::ZERO),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(r.device.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_response_is_dropped() {
    let r = rig(5_000);
    r.bring_online();

    r.peer.inject(packet::encode_response(0x42, &[0x01]));

    assert_eq!(r.device.stats().unmatched_responses, 1);
    assert!(r.device.is_online());
}

// ============================================================================
// DISCONNECTION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_expiry_aborts_every_pending_request() {
    let mut r = rig(5_000);
    r.bring_online();

    let first = {
        let device = r.device.clone();
        tokio::spawn(async move { device.request(&[0x10], &[], Duration::ZERO).await })
    };
    let second = {
        let device = r.device.clone();
        tokio::spawn(async move { device.request(&[0x11], &[], Duration::ZERO).await })
    };
    r.next_request().await;
    r.next_request().await;
    assert_eq!(r.device.pending_count(), 2);

    tokio::time::sleep(Duration::from_millis(5_001)).await;

    let first = first.await.unwrap();
    assert_eq!(first, Err(RequestError::Aborted));
    assert_eq!(
        first.unwrap_err().to_string(),
        "request aborted due to disconnection"
    );
    assert_eq!(second.await.unwrap(), Err(RequestError::Aborted));
    assert_eq!(r.device.pending_count(), 0);
    assert_eq!(r.device.stats().aborts, 2);
    assert!(!r.device.is_online());
}

#[tokio::test(start_paused = true)]
async fn test_transport_drop_aborts_pending_request() {
    let mut r = rig(5_000);
    r.bring_online();

    let device = r.device.clone();
    let task = tokio::spawn(async move { device.request(&[0x10], &[], Duration::ZERO).await });
    r.next_request().await;

    r.peer.set_reachable(false);

    assert_eq!(task.await.unwrap(), Err(RequestError::Aborted));
}

// ============================================================================
// ONLINE = TRANSPORT AND APPLICATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_online_requires_both_signals() {
    let r = rig(5_000);
    let online = r.device.online();

    r.transport.connect();
    assert!(r.device.transport_connected());
    assert!(!r.device.is_online());

    r.ack();
    assert!(r.device.is_online());
    assert!(*online.borrow());

    r.peer.set_reachable(false);
    assert!(!r.device.is_online());
    assert!(r.device.app_online());
    assert!(!*online.borrow());

    r.peer.set_reachable(true);
    assert!(r.device.is_online());

    tokio::time::sleep(Duration::from_millis(5_001)).await;
    assert!(r.device.transport_connected());
    assert!(!r.device.app_online());
    assert!(!r.device.is_online());

    r.ack();
    assert!(r.device.is_online());
}

#[tokio::test(start_paused = true)]
async fn test_any_inbound_frame_keeps_device_online() {
    let r = rig(5_000);
    r.bring_online();

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        r.peer.inject(packet::encode_event(&[0x7F], &[]));
    }

    assert!(r.device.is_online());
    assert!(r.device.last_seen().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_window_example_timeline() {
    let r = rig(5_000);
    r.bring_online();

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert!(r.device.is_online());
    let device = r.device.clone();
    let task = tokio::spawn(async move {
        device
            .request(&[0x10], &[], Duration::from_millis(2_000))
            .await
    });

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(!r.device.is_online());
    assert_eq!(task.await.unwrap(), Err(RequestError::Aborted));
}

// ============================================================================
// IDENTIFIED LINKS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_devices_share_identified_link() {
    let (transport, mut peer) =
        MemoryTransport::pair(TransportConfig::new().with_identifier_length(Some(1)));
    let a = Device::new(DeviceConfig::new("a").with_identifier(&[0x0A]), transport.clone())
        .unwrap();
    let b = Device::new(DeviceConfig::new("b").with_identifier(&[0x0B]), transport.clone())
        .unwrap();
    transport.connect();
    peer.inject(vec![0x0A, packet::KEEPALIVE_ID]);

    assert!(a.is_online());
    assert!(!b.is_online());

    let device = a.clone();
    let task = tokio::spawn(async move { device.request(&[0x20], &[], Duration::ZERO).await });

    let request = loop {
        let frame = peer.recv().await.unwrap();
        assert!(frame[0] == 0x0A || frame[0] == 0x0B);
        let body = frame.slice(1..);
        if !packet::is_keepalive(&body) {
            assert_eq!(frame[0], 0x0A);
            break packet::RequestFrame::parse(&body).unwrap();
        }
    };

    let mut reply = vec![0x0A];
    reply.extend_from_slice(&packet::encode_response(request.request_id, &[0x99]));
    peer.inject(reply);

    assert_eq!(task.await.unwrap(), Ok(Bytes::from_static(&[0x99])));
}
