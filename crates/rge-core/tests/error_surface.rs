use rge_core::errors::{ErrorInfo, RgeError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("coupling", "g1")
        .with_context("scale", 0.5)
}

#[test]
fn configuration_error_surface() {
    let err = RgeError::Configuration(sample_info("initial-scale", "outside range"));
    assert_eq!(err.info().code, "initial-scale");
    assert_eq!(err.info().context.get("scale").map(String::as_str), Some("0.5"));
    assert!(err.is_fatal());

    let short = RgeError::configuration("initial-scale", "outside range");
    assert!(matches!(short, RgeError::Configuration(ref info) if info.message == "outside range"));
}

#[test]
fn ambiguous_conjugate_is_not_fatal() {
    let err = RgeError::AmbiguousConjugate(sample_info("conjugate", "two candidates"));
    assert!(!err.is_fatal());
    assert!(err.info().context.contains_key("coupling"));
}

#[test]
fn integration_error_carries_context() {
    let err = RgeError::Integration(ErrorInfo::new("step-exhausted", "halving limit"))
        .with_context("direction", "upward");
    assert_eq!(
        err.info().context.get("direction").map(String::as_str),
        Some("upward")
    );
    assert!(!err.is_fatal());
}

#[test]
fn display_includes_context_and_hint() {
    let err = RgeError::ShapeMismatch(
        ErrorInfo::new("element-count", "expected 4 elements")
            .with_context("coupling", "Yu")
            .with_hint("check the declared shape"),
    );
    let rendered = err.to_string();
    assert!(rendered.starts_with("shape mismatch: expected 4 elements (code: element-count)"));
    assert!(rendered.contains("coupling=Yu"));
    assert!(rendered.contains("hint: check the declared shape"));
}

#[test]
fn errors_roundtrip_through_json() {
    let err = RgeError::expression("parse", "unexpected token").with_context("at", 3);
    let json = serde_json::to_string(&err).unwrap();
    assert!(json.contains("\"family\":\"Expression\""));
    let restored: RgeError = serde_json::from_str(&json).unwrap();
    assert_eq!(err, restored);
}
