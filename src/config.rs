//! Environment-driven agent configuration.
//!
//! All settings come from environment variables (with `.env` discovery left
//! to the binary). `Settings::from_env` is called once at startup and the
//! resulting value is threaded through component constructors; parse errors
//! are fatal.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_PORT_API_BASE_URL: &str = "https://api.getport.io";
pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";

/// Which source adapter drives the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerName {
    Kafka,
    Polling,
}

impl StreamerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamerName::Kafka => "KAFKA",
            StreamerName::Polling => "POLLING",
        }
    }
}

impl FromStr for StreamerName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "KAFKA" => Ok(StreamerName::Kafka),
            "POLLING" => Ok(StreamerName::Polling),
            other => Err(Error::Config(format!(
                "unknown streamer name: {other} (expected KAFKA or POLLING)"
            ))),
        }
    }
}

/// Kafka consumer options, mirroring the `KAFKA_CONSUMER_*` variables.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub security_protocol: String,
    pub authentication_mechanism: String,
    pub session_timeout_ms: u64,
    pub auto_offset_reset: String,
    pub runs_topic: String,
    pub change_log_topic: String,
}

/// Tuning for the HTTP long-polling adapter.
#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub runs_batch_size: usize,
    pub interval: Duration,
    pub initial_backoff_seconds: f64,
    pub max_backoff_seconds: f64,
    pub backoff_factor: f64,
    pub backoff_jitter_factor: f64,
    pub max_failure_duration: Duration,
}

/// Process-wide agent settings, constructed once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub streamer_name: StreamerName,
    pub port_org_id: String,
    pub port_api_base_url: String,
    pub port_client_id: String,
    pub port_client_secret: String,
    pub port_installation_id: String,
    pub using_local_port_instance: bool,
    pub kafka: KafkaSettings,
    pub polling: PollingSettings,
    pub control_the_payload_config_path: PathBuf,
    pub webhook_invoker_timeout: Duration,
    pub gitlab_pipeline_invoker_timeout: Duration,
    pub gitlab_url: String,
    pub log_level: String,
    pub detailed_logging: bool,
    pub agent_environments: Vec<String>,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let port_org_id = required("PORT_ORG_ID")?;

        // STREAMER_NAME is the current variable; PORT_AGENT_TRANSPORT_TYPE is
        // the legacy alias still found in older deployments.
        let streamer_raw = env_var("STREAMER_NAME")
            .or_else(|| env_var("PORT_AGENT_TRANSPORT_TYPE"))
            .ok_or_else(|| Error::Config("STREAMER_NAME is not set".to_string()))?;
        let streamer_name = streamer_raw.parse()?;

        let kafka = KafkaSettings {
            bootstrap_servers: env_or("KAFKA_CONSUMER_BOOTSTRAP_SERVERS", ""),
            group_id: env_or("KAFKA_CONSUMER_GROUP_ID", &port_org_id),
            security_protocol: env_or("KAFKA_CONSUMER_SECURITY_PROTOCOL", "plaintext"),
            authentication_mechanism: env_or("KAFKA_CONSUMER_AUTHENTICATION_MECHANISM", "none"),
            session_timeout_ms: parsed_or("KAFKA_CONSUMER_SESSION_TIMEOUT_MS", 45_000)?,
            auto_offset_reset: env_or("KAFKA_CONSUMER_AUTO_OFFSET_RESET", "earliest"),
            runs_topic: env_var("KAFKA_RUNS_TOPIC")
                .unwrap_or_else(|| format!("{port_org_id}.runs")),
            change_log_topic: env_var("KAFKA_CHANGE_LOG_TOPIC")
                .unwrap_or_else(|| format!("{port_org_id}.change.log")),
        };

        let polling = PollingSettings {
            runs_batch_size: parsed_or("POLLING_RUNS_BATCH_SIZE", 10)?,
            interval: Duration::from_secs_f64(parsed_or("POLLING_INTERVAL_SECONDS", 5.0)?),
            initial_backoff_seconds: parsed_or("POLLING_INITIAL_BACKOFF_SECONDS", 1.0)?,
            max_backoff_seconds: parsed_or("POLLING_MAX_BACKOFF_SECONDS", 60.0)?,
            backoff_factor: parsed_or("POLLING_BACKOFF_FACTOR", 2.0)?,
            backoff_jitter_factor: parsed_or("POLLING_BACKOFF_JITTER_FACTOR", 0.1)?,
            max_failure_duration: Duration::from_secs(parsed_or(
                "POLLING_MAX_FAILURE_DURATION_SECONDS",
                3_600,
            )?),
        };

        Ok(Self {
            streamer_name,
            port_api_base_url: env_or("PORT_API_BASE_URL", DEFAULT_PORT_API_BASE_URL),
            port_client_id: required("PORT_CLIENT_ID")?,
            port_client_secret: required("PORT_CLIENT_SECRET")?,
            port_installation_id: env_or("PORT_INSTALLATION_ID", &port_org_id),
            using_local_port_instance: bool_env("USING_LOCAL_PORT_INSTANCE")?,
            kafka,
            polling,
            control_the_payload_config_path: PathBuf::from(env_or(
                "CONTROL_THE_PAYLOAD_CONFIG_PATH",
                "./control_the_payload_config.json",
            )),
            webhook_invoker_timeout: Duration::from_secs_f64(parsed_or(
                "WEBHOOK_INVOKER_TIMEOUT",
                30.0,
            )?),
            gitlab_pipeline_invoker_timeout: Duration::from_secs_f64(parsed_or(
                "GITLAB_PIPELINE_INVOKER_TIMEOUT",
                30.0,
            )?),
            gitlab_url: env_or("GITLAB_URL", DEFAULT_GITLAB_URL),
            log_level: env_or("LOG_LEVEL", "INFO"),
            detailed_logging: bool_env("DETAILED_LOGGING")?,
            agent_environments: parse_environments(&env_or("AGENT_ENVIRONMENTS", "")),
            port_org_id,
        })
    }

    /// True when the whitelist allows the given environment list. An empty
    /// whitelist allows everything; an event without environments always
    /// passes.
    pub fn environments_allowed(&self, event_environments: Option<&[String]>) -> bool {
        if self.agent_environments.is_empty() {
            return true;
        }
        match event_environments {
            None => true,
            Some(envs) => envs.iter().any(|e| self.agent_environments.contains(e)),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_var(name).unwrap_or_else(|| default.to_string())
}

fn required(name: &str) -> Result<String> {
    env_var(name).ok_or_else(|| Error::Config(format!("{name} is not set")))
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env_var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}"))),
    }
}

fn bool_env(name: &str) -> Result<bool> {
    match env_var(name) {
        None => Ok(false),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(Error::Config(format!("invalid boolean for {name}: {raw}"))),
        },
    }
}

fn parse_environments(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}
