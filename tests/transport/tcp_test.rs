// TCP Transport Tests
// Real loopback sockets: framing on the wire, peer loss, idle timeout, reconnection

use crate::support::{binding, RecordingSink};
use bytes::Bytes;
use homegate::transport::{
    TcpTransport, TcpTransportConfig, Transport, TransportConfig, TransportError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn transport(port: u16, keepalive_ms: u64) -> Arc<TcpTransport> {
    let config = TcpTransportConfig::new("127.0.0.1", port).with_base_config(
        TransportConfig::new()
            .with_name("tcp-test")
            .with_keepalive_interval_ms(keepalive_ms),
    );
    Arc::new(TcpTransport::new(config).unwrap())
}

async fn wait_state(state: &mut watch::Receiver<bool>, connected: bool) {
    timeout(WAIT, state.wait_for(|c| *c == connected))
        .await
        .expect("connection state did not change in time")
        .unwrap();
}

/// Connect and accept the transport's socket
async fn establish(
    transport: &TcpTransport,
    listener: &TcpListener,
    state: &mut watch::Receiver<bool>,
) -> TcpStream {
    transport.connect();
    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    wait_state(state, true).await;
    socket
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_new_rejects_invalid_config() {
    let result = TcpTransport::new(TcpTransportConfig::new("127.0.0.1", 0));

    assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
}

#[test]
fn test_idle_timeout_is_twice_keepalive() {
    let base = |ms| TransportConfig::new().with_keepalive_interval_ms(ms);
    let config = TcpTransportConfig::new("127.0.0.1", 9).with_base_config(base(1_500));
    assert_eq!(config.idle_timeout(), Duration::from_secs(3));

    let config = TcpTransportConfig::new("127.0.0.1", 9).with_base_config(base(u64::MAX));
    assert_eq!(config.idle_timeout(), Duration::from_millis(u64::MAX) * 2);
}

#[tokio::test]
async fn test_write_before_connect_fails() {
    let (_listener, port) = listener().await;
    let transport = transport(port, 1_000);

    assert_eq!(
        transport.write_to_network(None, &[0x01]).await,
        Err(TransportError::NotConnected)
    );
}

#[tokio::test]
async fn test_connect_notifies_bound_device() {
    let (listener, port) = listener().await;
    let transport = transport(port, 1_000);
    let sink = RecordingSink::new();
    transport.add_device(binding(&sink, None)).unwrap();
    let mut state = transport.connection_state();

    let _socket = establish(&transport, &listener, &mut state).await;

    assert!(transport.is_connected());
    assert_eq!(sink.connectivity(), vec![true]);
    assert_eq!(transport.stats().connects, 1);
}

#[tokio::test]
async fn test_disconnect_closes_socket() {
    let (listener, port) = listener().await;
    let transport = transport(port, 1_000);
    let mut state = transport.connection_state();
    let mut socket = establish(&transport, &listener, &mut state).await;

    transport.disconnect();
    wait_state(&mut state, false).await;

    let mut buf = [0u8; 1];
    let read = timeout(WAIT, socket.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

// ============================================================================
// FRAMING ON THE WIRE
// ============================================================================

#[tokio::test]
async fn test_outbound_frames_carry_length_preamble() {
    let (listener, port) = listener().await;
    let transport = transport(port, 1_000);
    let mut state = transport.connection_state();
    let mut socket = establish(&transport, &listener, &mut state).await;

    transport.write_to_network(None, &[0xAA, 0xBB]).await.unwrap();
    transport.write_to_network(None, &[]).await.unwrap();

    let mut buf = [0u8; 4];
    timeout(WAIT, socket.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(buf, [0x02, 0xAA, 0xBB, 0x00]);
}

#[tokio::test]
async fn test_inbound_frames_reassembled_across_reads() {
    let (listener, port) = listener().await;
    let transport = transport(port, 1_000);
    let sink = RecordingSink::new();
    transport.add_device(binding(&sink, None)).unwrap();
    let mut state = transport.connection_state();
    let mut socket = establish(&transport, &listener, &mut state).await;

    socket.write_all(&[0x01, 0x10, 0x03, 0x20]).await.unwrap();
    socket.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    socket.write_all(&[0x21, 0x22]).await.unwrap();

    let frames = sink.wait_for_frames(2).await;
    assert_eq!(
        frames,
        vec![
            Bytes::from_static(&[0x10]),
            Bytes::from_static(&[0x20, 0x21, 0x22]),
        ]
    );
}

#[tokio::test]
async fn test_anomalous_length_is_counted_not_rejected() {
    let (listener, port) = listener().await;
    let transport = transport(port, 1_000);
    let sink = RecordingSink::new();
    transport.add_device(binding(&sink, None)).unwrap();
    let mut state = transport.connection_state();
    let mut socket = establish(&transport, &listener, &mut state).await;

    let mut frame = vec![0x09];
    frame.extend_from_slice(&[0x55; 9]);
    socket.write_all(&frame).await.unwrap();

    let frames = sink.wait_for_frames(1).await;
    assert_eq!(frames, vec![Bytes::from(vec![0x55; 9])]);
    assert_eq!(transport.stats().anomalous_lengths, 1);
}

// ============================================================================
// FAILURE AND RECOVERY
// ============================================================================

#[tokio::test]
async fn test_peer_close_then_reconnect_on_tick() {
    let (listener, port) = listener().await;
    let transport = transport(port, 200);
    let sink = RecordingSink::new();
    transport.add_device(binding(&sink, None)).unwrap();
    let mut state = transport.connection_state();
    let socket = establish(&transport, &listener, &mut state).await;

    drop(socket);
    wait_state(&mut state, false).await;

    let (_socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    wait_state(&mut state, true).await;
    assert_eq!(sink.connectivity(), vec![true, false, true]);
}

#[tokio::test]
async fn test_incomplete_body_hits_idle_timeout() {
    let (listener, port) = listener().await;
    // Idle timeout is twice the keepalive interval
    let transport = transport(port, 150);
    let mut state = transport.connection_state();
    let mut socket = establish(&transport, &listener, &mut state).await;

    socket.write_all(&[0x05, 0x01]).await.unwrap();

    wait_state(&mut state, false).await;
    assert_eq!(transport.stats().disconnects, 1);
}

#[tokio::test]
async fn test_forced_reconnect_opens_new_socket() {
    let (listener, port) = listener().await;
    let transport = transport(port, 1_000);
    let mut state = transport.connection_state();
    let _first = establish(&transport, &listener, &mut state).await;

    transport.reconnect();

    let (_second, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    wait_state(&mut state, true).await;
    assert_eq!(transport.stats().connects, 2);
}

#[tokio::test]
async fn test_unreachable_peer_stays_disconnected() {
    let (listener, port) = listener().await;
    drop(listener);
    let transport = transport(port, 100);

    transport.connect();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!transport.is_connected());
    assert_eq!(
        transport.write_to_network(None, &[0x01]).await,
        Err(TransportError::NotConnected)
    );
}
