//! Tests for the contentful-bridge-core library module.

use super::*;

#[test]
fn test_timestamp_naive_iso_drops_zone_suffix() {
    let ts = Timestamp::from_rfc3339("2024-01-01T00:00:00.000Z").unwrap();
    assert_eq!(ts.to_naive_iso(), "2024-01-01T00:00:00.000");
}

#[test]
fn test_timestamp_converts_offsets_to_utc() {
    let ts = Timestamp::from_rfc3339("2024-03-10T12:30:15.250+02:00").unwrap();
    assert_eq!(ts.to_naive_iso(), "2024-03-10T10:30:15.250");
    assert_eq!(ts.to_rfc3339(), "2024-03-10T10:30:15.250Z");
}

#[test]
fn test_timestamp_pads_missing_fraction() {
    let ts = Timestamp::from_rfc3339("2024-01-01T08:00:00Z").unwrap();
    assert_eq!(ts.to_naive_iso(), "2024-01-01T08:00:00.000");
}

#[test]
fn test_timestamp_rejects_garbage() {
    let result = Timestamp::from_rfc3339("yesterday");
    assert!(matches!(result, Err(ParseError::InvalidFormat { .. })));
}

#[test]
fn test_validation_error_field() {
    let required = ValidationError::Required {
        field: "sys.space.sys.id".to_string(),
    };
    assert_eq!(required.field(), Some("sys.space.sys.id"));

    let malformed = ValidationError::MalformedPayload {
        message: "not json".to_string(),
    };
    assert_eq!(malformed.field(), None);
}
