//! Shared fixtures for integration tests.

use std::path::PathBuf;
use std::time::Duration;

use port_agent::config::{KafkaSettings, PollingSettings, Settings, StreamerName};

/// Settings pointing every outbound call at the given mock servers.
pub fn test_settings(port_api_url: &str, gitlab_url: &str) -> Settings {
    Settings {
        streamer_name: StreamerName::Polling,
        port_org_id: "test_org".to_string(),
        port_api_base_url: port_api_url.to_string(),
        port_client_id: "test-client".to_string(),
        port_client_secret: "test-secret".to_string(),
        port_installation_id: "test_org".to_string(),
        using_local_port_instance: false,
        kafka: KafkaSettings {
            bootstrap_servers: String::new(),
            group_id: "test_org".to_string(),
            security_protocol: "plaintext".to_string(),
            authentication_mechanism: "none".to_string(),
            session_timeout_ms: 45_000,
            auto_offset_reset: "earliest".to_string(),
            runs_topic: "test_org.runs".to_string(),
            change_log_topic: "test_org.change.log".to_string(),
        },
        polling: PollingSettings {
            runs_batch_size: 10,
            interval: Duration::from_millis(50),
            initial_backoff_seconds: 0.01,
            max_backoff_seconds: 0.05,
            backoff_factor: 2.0,
            backoff_jitter_factor: 0.0,
            max_failure_duration: Duration::from_secs(3_600),
        },
        control_the_payload_config_path: PathBuf::from("/nonexistent/control_the_payload.json"),
        webhook_invoker_timeout: Duration::from_secs(5),
        gitlab_pipeline_invoker_timeout: Duration::from_secs(5),
        gitlab_url: gitlab_url.to_string(),
        log_level: "INFO".to_string(),
        detailed_logging: false,
        agent_environments: Vec::new(),
    }
}
