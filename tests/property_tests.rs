//! Property-based tests using proptest
//!
//! These tests verify laws that should hold for all inputs: backoff
//! progression, signature round-trips, mapping selection and expression
//! safety.

use std::sync::Arc;
use std::time::Duration;

use port_agent::config::PollingSettings;
use port_agent::consumer::polling::Backoff;
use port_agent::crypto::{compact_json, sign_sha256};
use port_agent::expr;
use port_agent::schemas::mapping::{Enabled, Mapping};
use port_agent::Transformer;
use proptest::prelude::*;
use serde_json::json;

fn polling_settings(initial: f64, max: f64, factor: f64, jitter: f64) -> PollingSettings {
    PollingSettings {
        runs_batch_size: 10,
        interval: Duration::from_secs(1),
        initial_backoff_seconds: initial,
        max_backoff_seconds: max,
        backoff_factor: factor,
        backoff_jitter_factor: jitter,
        max_failure_duration: Duration::from_secs(3_600),
    }
}

// ============================================================================
// BACKOFF PROPERTY TESTS
// ============================================================================

proptest! {
    #[test]
    fn test_backoff_stays_within_law(
        initial in 0.1f64..5.0,
        factor in 1.1f64..4.0,
        jitter in 0.0f64..1.0,
        steps in 1usize..30,
    ) {
        let max = initial * 50.0;
        let settings = polling_settings(initial, max, factor, jitter);
        let mut backoff = Backoff::new(&settings);

        let mut expected_base = 0.0f64;
        for _ in 0..steps {
            expected_base = if expected_base == 0.0 {
                initial
            } else {
                (expected_base * factor).min(max)
            };
            let delay = backoff.next_delay().as_secs_f64();
            // Pre-jitter base is exact; jitter adds at most base * jitter.
            prop_assert!(delay >= expected_base - 1e-9);
            prop_assert!(delay <= expected_base * (1.0 + jitter) + 1e-9);
        }
    }

    #[test]
    fn test_backoff_reset_restarts_from_initial(
        initial in 0.1f64..5.0,
        steps in 1usize..10,
    ) {
        let settings = polling_settings(initial, initial * 100.0, 2.0, 0.0);
        let mut backoff = Backoff::new(&settings);
        for _ in 0..steps {
            backoff.next_delay();
        }
        backoff.reset();
        prop_assert_eq!(backoff.current_seconds(), 0.0);
        let delay = backoff.next_delay().as_secs_f64();
        prop_assert!((delay - initial).abs() < 1e-9);
    }
}

// ============================================================================
// SIGNATURE PROPERTY TESTS
// ============================================================================

proptest! {
    #[test]
    fn test_signature_is_deterministic(
        key in "[a-z0-9]{1,40}",
        value in "[a-zA-Z0-9 ]{0,40}",
        secret in "[a-zA-Z0-9]{1,40}",
        timestamp in 0u64..4_000_000_000,
    ) {
        let body = compact_json(&json!({ key.clone(): value }));
        let ts = timestamp.to_string();
        prop_assert_eq!(
            sign_sha256(&body, &secret, &ts),
            sign_sha256(&body, &secret, &ts)
        );
    }

    #[test]
    fn test_signature_changes_with_any_input(
        key in "[a-z0-9]{1,40}",
        value in "[a-zA-Z0-9 ]{1,40}",
        secret in "[a-zA-Z0-9]{1,40}",
        timestamp in 0u64..4_000_000_000,
    ) {
        let body = compact_json(&json!({ key.clone(): value.clone() }));
        let tampered = compact_json(&json!({ key: format!("{value}!") }));
        let ts = timestamp.to_string();
        let signature = sign_sha256(&body, &secret, &ts);

        prop_assert_ne!(signature.clone(), sign_sha256(&tampered, &secret, &ts));
        prop_assert_ne!(
            signature,
            sign_sha256(&body, &secret, &(timestamp + 1).to_string())
        );
    }
}

// ============================================================================
// MAPPING SELECTION PROPERTY TESTS
// ============================================================================

proptest! {
    #[test]
    fn test_first_enabled_mapping_wins(flags in proptest::collection::vec(any::<bool>(), 0..12)) {
        let mappings: Vec<Mapping> = flags
            .iter()
            .enumerate()
            .map(|(index, &enabled)| Mapping {
                enabled: Enabled::Literal(enabled),
                url: Some(json!(format!("\"http://mapping/{index}\""))),
                ..Default::default()
            })
            .collect();
        let transformer = Transformer::new(Arc::new(mappings), "secret".into());

        let selected = transformer.select_mapping(&json!({}));
        match flags.iter().position(|&enabled| enabled) {
            None => prop_assert!(selected.is_none()),
            Some(first_enabled) => {
                let url = selected.unwrap().url.as_ref().unwrap().as_str().unwrap();
                prop_assert_eq!(url, format!("\"http://mapping/{first_enabled}\""));
            }
        }
    }
}

// ============================================================================
// EXPRESSION SAFETY PROPERTY TESTS
// ============================================================================

proptest! {
    #[test]
    fn test_arbitrary_expressions_never_panic(expression in "\\PC{0,40}") {
        // Garbage in, None out; never a panic, never an abort.
        let _ = expr::first(&expression, &json!({"a": {"b": [1, 2, 3]}}));
    }

    #[test]
    fn test_field_access_matches_document(value in "[a-zA-Z0-9]{0,20}") {
        let doc = json!({"payload": {"field": value}});
        prop_assert_eq!(
            expr::first(".payload.field", &doc),
            Some(json!(value))
        );
    }
}
