#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration as ChronoDuration;
use foreman_core::ids::{Clock, FakeClock, IdGenerator};
use foreman_core::ForemanError;

#[test]
fn error_display_for_boundary_kinds() {
    let clarification = ForemanError::ClarificationRequired(vec!["target platform?".into()]);
    assert!(clarification.to_string().starts_with("clarification required"));

    let stopped = ForemanError::EmergencyStopped("operator request".into());
    assert_eq!(
        stopped.to_string(),
        "emergency stop active: operator request"
    );

    let violation = ForemanError::SafetyViolation {
        level: "critical".into(),
        message: "destructive_change".into(),
    };
    assert_eq!(
        violation.to_string(),
        "safety violation (critical): destructive_change"
    );

    let budget = ForemanError::BudgetExceeded {
        spent: 1.2,
        limit: 1.0,
    };
    assert_eq!(budget.to_string(), "budget exceeded: spent 1.20 of 1.00");
}

#[test]
fn json_and_io_errors_convert_via_from() {
    let bad_json = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let err: ForemanError = bad_json.into();
    assert!(err.to_string().starts_with("JSON error:"));

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err: ForemanError = io_err.into();
    assert!(err.to_string().starts_with("IO error:"));
}

#[test]
fn id_generator_is_strictly_monotonic_across_many_calls() {
    let gen = IdGenerator::new();
    let mut last = gen.next_id();
    for _ in 0..1000 {
        let next = gen.next_id();
        assert!(next > last);
        last = next;
    }
}

#[test]
fn fake_clock_is_deterministic_and_advances() {
    let start = chrono::DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let clock = FakeClock::new(start);
    assert_eq!(clock.now(), start);
    assert_eq!(clock.now(), start, "repeated reads must not advance time");

    clock.advance(ChronoDuration::minutes(90));
    assert_eq!(clock.now(), start + ChronoDuration::minutes(90));
}
