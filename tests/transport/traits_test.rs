// Transport Config and Error Tests

use homegate::transport::{
    ConnectionState, TcpTransportConfig, TransportConfig, TransportError, UdpTransportConfig,
};
use std::time::Duration;

// ============================================================================
// BASE CONFIG
// ============================================================================

#[test]
fn test_base_config_defaults() {
    let config = TransportConfig::default();

    assert_eq!(config.keepalive_interval_ms, 5_000);
    assert_eq!(config.tick_period(), Duration::from_millis(2_500));
    assert!(!config.is_identified());
    assert!(config.validate().is_ok());
}

#[test]
fn test_base_config_validation() {
    assert!(TransportConfig::new()
        .with_keepalive_interval_ms(0)
        .validate()
        .is_err());
    assert!(TransportConfig::new()
        .with_identifier_length(Some(0))
        .validate()
        .is_err());
}

// ============================================================================
// TCP / UDP CONFIG
// ============================================================================

#[test]
fn test_tcp_config_idle_timeout_is_twice_keepalive() {
    let config = TcpTransportConfig::new("10.0.0.5", 4000)
        .with_base_config(TransportConfig::new().with_keepalive_interval_ms(1_500));

    assert_eq!(config.idle_timeout(), Duration::from_secs(3));
    assert_eq!(config.peer_address(), "10.0.0.5:4000");
    assert_eq!(config.preamble_width, 1);
    assert_eq!(config.anomalous_length_threshold, 5);
}

#[test]
fn test_tcp_config_validation() {
    assert!(TcpTransportConfig::new("", 4000).validate().is_err());
    assert!(TcpTransportConfig::new("host", 0).validate().is_err());
    assert!(TcpTransportConfig::new("host", 1)
        .with_preamble(9, Default::default())
        .validate()
        .is_err());
}

#[test]
fn test_udp_config_copies() {
    let plain = UdpTransportConfig::new("10.0.0.5", 4000);
    let sequenced = plain.clone().with_sequence_mode(true).with_redundancy(3);

    assert_eq!(plain.copies(), 1);
    assert_eq!(sequenced.copies(), 3);
    assert!(sequenced.clone().with_redundancy(0).validate().is_err());
}

// ============================================================================
// STATE AND ERRORS
// ============================================================================

#[test]
fn test_connection_state_from_bool() {
    assert_eq!(ConnectionState::from(true), ConnectionState::Connected);
    assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    assert_eq!(ConnectionState::Connected.to_string(), "connected");
}

#[test]
fn test_error_classification() {
    assert_eq!(TransportError::NotConnected.to_string(), "socket is not connected");
    assert!(TransportError::NotConnected.is_transient());
    assert!(TransportError::DuplicateIdentifier("01".into()).is_construction_error());
    assert!(!TransportError::Timeout.is_construction_error());
}
