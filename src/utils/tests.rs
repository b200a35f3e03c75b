use super::error::{EngineError, TransportError};
use super::logging;

#[test]
fn test_logging_init_accepts_levels() {
    logging::init("info");
    logging::init("debug");
    logging::init("WARNING");
    logging::init("nonsense");
}

#[test]
fn test_transport_error_wraps_engine_error() {
    let err: TransportError = EngineError::UnknownVariant("vip".to_string()).into();
    assert_eq!(err.to_string(), "unknown view variant 'vip'");
}

#[test]
fn test_invalid_parameter_names_the_parameter() {
    let err = TransportError::InvalidParameter {
        name: "project",
        reason: "must not be empty".to_string(),
    };
    assert_eq!(err.to_string(), "invalid parameter 'project': must not be empty");
}
