use std::time::SystemTime;
use tandem_core::*;

#[test]
fn test_container_id_validation() {
    // Valid IDs
    assert!(ContainerId::new("test").is_ok());
    assert!(ContainerId::new("testCT2").is_ok());
    assert!(ContainerId::new("test_456").is_ok());
    assert!(ContainerId::new("a").is_ok());
    assert!(ContainerId::new("ABC-123_xyz").is_ok());

    // Invalid IDs - empty
    assert!(ContainerId::new("").is_err());

    // Invalid IDs - too long
    assert!(ContainerId::new("a".repeat(65)).is_err());

    // Invalid IDs - bad characters
    assert!(ContainerId::new("test@123").is_err());
    assert!(ContainerId::new("test space").is_err());
    assert!(ContainerId::new("test/path").is_err());
    assert!(ContainerId::new("test:colon").is_err());
    assert!(ContainerId::new("test.dot").is_err());
}

#[test]
fn test_invalid_id_is_config_error() {
    let err = ContainerId::new("bad id").unwrap_err();
    assert!(matches!(err, Error::ConfigInvalid { .. }));
}

#[test]
fn test_container_id_serialization() {
    let id = ContainerId::new("test-123").unwrap();

    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"test-123\"");

    let deserialized: ContainerId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, deserialized);

    // Validation also runs on deserialization
    assert!(serde_json::from_str::<ContainerId>("\"no/slashes\"").is_err());
}

#[test]
fn test_generated_ids_do_not_collide() {
    let ids: std::collections::HashSet<_> = (0..256).map(|_| ContainerId::generate()).collect();
    assert_eq!(ids.len(), 256);
}

#[test]
fn test_process_id_nix_conversion() {
    let pid = ProcessId::from_raw(4242);
    let nix_pid: nix::unistd::Pid = pid.into();
    assert_eq!(ProcessId::from(nix_pid), pid);
    assert_eq!(pid.to_string(), "4242");
}

#[test]
fn test_event_roundtrip_keeps_signal() {
    let event = ContainerEvent::Exited {
        id: ContainerId::new("ct").unwrap(),
        exit_code: -15,
        signal: Some(15),
        timestamp: SystemTime::now(),
    };

    let json = serde_json::to_string(&event).unwrap();
    let back: ContainerEvent = serde_json::from_str(&json).unwrap();

    match back {
        ContainerEvent::Exited {
            exit_code, signal, ..
        } => {
            assert_eq!(exit_code, -15);
            assert_eq!(signal, Some(15));
        }
        other => panic!("unexpected event: {other}"),
    }
}
