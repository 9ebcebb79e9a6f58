//! Session profile: the single validated configuration value handed to the
//! coordinator at startup. Parsed from YAML once, never mutated afterwards.

use humantime::parse_duration;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Critical,
    Important,
    Optional,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::Important => "important",
            Tier::Optional => "optional",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_tier(value: &str) -> Option<Tier> {
    match value.to_ascii_lowercase().as_str() {
        "critical" => Some(Tier::Critical),
        "important" => Some(Tier::Important),
        "optional" => Some(Tier::Optional),
        _ => None,
    }
}

/// A named external dependency polled for readiness. Immutable for the
/// lifetime of one poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub tier: Tier,
    pub probe_timeout: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallPolicy {
    pub base_timeout: Duration,
    pub timeout_increment: Duration,
    pub max_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub jitter_cap: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(2),
            timeout_increment: Duration::from_secs(1),
            max_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_unit: Duration::from_millis(500),
            jitter_cap: Duration::from_millis(250),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollPolicy {
    pub threshold: f64,
    pub deadline: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationConfig {
    pub endpoint: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionProfile {
    pub endpoints: Vec<Endpoint>,
    pub call: CallPolicy,
    pub critical_poll: PollPolicy,
    pub important_poll: PollPolicy,
    pub optional_poll: PollPolicy,
    pub registration: Option<RegistrationConfig>,
    pub launch: LaunchConfig,
    pub fallback: LaunchConfig,
    pub monitor_interval: Duration,
    pub required_env: Vec<String>,
}

impl SessionProfile {
    pub fn from_path(path: &Path) -> Result<Self, ProfileError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ProfileError {
            messages: vec![format!("failed to read {}: {err}", path.display())],
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ProfileError> {
        let parsed: RawProfile = serde_yaml::from_str(raw).map_err(|err| ProfileError {
            messages: vec![format!("profile is not valid YAML: {err}")],
        })?;
        parse_profile(parsed)
    }

    pub fn endpoints_in_tier(&self, tier: Tier) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .filter(|endpoint| endpoint.tier == tier)
            .cloned()
            .collect()
    }

    pub fn poll_policy(&self, tier: Tier) -> PollPolicy {
        match tier {
            Tier::Critical => self.critical_poll,
            Tier::Important => self.important_poll,
            Tier::Optional => self.optional_poll,
        }
    }
}

/// All validation problems collected in one pass, reported together.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", .messages.join("; "))]
pub struct ProfileError {
    pub messages: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    #[serde(default)]
    endpoints: Vec<RawEndpoint>,
    #[serde(default)]
    call: Option<RawCallPolicy>,
    #[serde(default)]
    critical_poll: Option<RawPollPolicy>,
    #[serde(default)]
    important_poll: Option<RawPollPolicy>,
    #[serde(default)]
    optional_poll: Option<RawPollPolicy>,
    #[serde(default)]
    registration: Option<RawRegistration>,
    launch: Option<RawLaunch>,
    #[serde(default)]
    fallback: Option<RawLaunch>,
    #[serde(default)]
    monitor_interval: Option<String>,
    #[serde(default)]
    required_env: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpoint {
    name: String,
    tier: String,
    #[serde(default)]
    probe_timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCallPolicy {
    #[serde(default)]
    base_timeout: Option<String>,
    #[serde(default)]
    timeout_increment: Option<String>,
    #[serde(default)]
    max_timeout: Option<String>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    backoff_unit: Option<String>,
    #[serde(default)]
    jitter_cap: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPollPolicy {
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    deadline: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRegistration {
    endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLaunch {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

const DEFAULT_CRITICAL_THRESHOLD: f64 = 0.75;
const DEFAULT_SECONDARY_THRESHOLD: f64 = 0.5;

fn default_poll_policy(threshold: f64) -> PollPolicy {
    PollPolicy {
        threshold,
        deadline: Duration::from_secs(30),
    }
}

fn parse_profile(raw: RawProfile) -> Result<SessionProfile, ProfileError> {
    let mut errors = Vec::new();

    let endpoints = parse_endpoints(raw.endpoints, &mut errors);
    let call = parse_call_policy(raw.call, &mut errors);
    let critical_poll = parse_poll_policy(
        raw.critical_poll,
        default_poll_policy(DEFAULT_CRITICAL_THRESHOLD),
        "critical_poll",
        &mut errors,
    );
    let important_poll = parse_poll_policy(
        raw.important_poll,
        default_poll_policy(DEFAULT_SECONDARY_THRESHOLD),
        "important_poll",
        &mut errors,
    );
    let optional_poll = parse_poll_policy(
        raw.optional_poll,
        default_poll_policy(DEFAULT_SECONDARY_THRESHOLD),
        "optional_poll",
        &mut errors,
    );

    let registration = raw.registration.map(|registration| {
        let endpoint = registration.endpoint.trim().to_string();
        if endpoint.is_empty() {
            errors.push("registration.endpoint must be non-empty".to_string());
        }
        RegistrationConfig { endpoint }
    });

    let launch = match raw.launch {
        Some(launch) => parse_launch(launch, "launch", &mut errors),
        None => {
            errors.push("launch.command is required".to_string());
            LaunchConfig {
                command: String::new(),
                args: Vec::new(),
            }
        }
    };

    let fallback = match raw.fallback {
        Some(fallback) => parse_launch(fallback, "fallback", &mut errors),
        // Defaults to the primary command with no arguments.
        None => LaunchConfig {
            command: launch.command.clone(),
            args: Vec::new(),
        },
    };

    let monitor_interval =
        parse_duration_field("monitor_interval", raw.monitor_interval, &mut errors)
            .unwrap_or(Duration::from_secs(30));
    if monitor_interval.is_zero() {
        errors.push("monitor_interval must be greater than zero".to_string());
    }

    let required_env = raw
        .required_env
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    if errors.is_empty() {
        Ok(SessionProfile {
            endpoints,
            call,
            critical_poll,
            important_poll,
            optional_poll,
            registration,
            launch,
            fallback,
            monitor_interval,
            required_env,
        })
    } else {
        Err(ProfileError { messages: errors })
    }
}

fn parse_endpoints(raw: Vec<RawEndpoint>, errors: &mut Vec<String>) -> Vec<Endpoint> {
    let mut seen = BTreeSet::new();
    let mut endpoints = Vec::with_capacity(raw.len());

    for (index, endpoint) in raw.into_iter().enumerate() {
        let name = endpoint.name.trim().to_string();
        if name.is_empty() {
            errors.push(format!("endpoints[{index}].name must be non-empty"));
            continue;
        }
        if !seen.insert(name.clone()) {
            errors.push(format!("endpoints[{index}] duplicates name `{name}`"));
            continue;
        }

        let tier = match parse_tier(endpoint.tier.trim()) {
            Some(tier) => tier,
            None => {
                errors.push(format!(
                    "endpoints[{index}].tier must be one of `critical`, `important`, or `optional` (got `{}`)",
                    endpoint.tier.trim()
                ));
                continue;
            }
        };

        let label = format!("endpoints[{index}].probe_timeout");
        let probe_timeout = parse_duration_field(&label, endpoint.probe_timeout, errors)
            .and_then(|duration| ensure_positive_duration(duration, &label, errors));

        endpoints.push(Endpoint {
            name,
            tier,
            probe_timeout,
        });
    }

    endpoints
}

fn parse_call_policy(raw: Option<RawCallPolicy>, errors: &mut Vec<String>) -> CallPolicy {
    let mut policy = CallPolicy::default();
    let Some(raw) = raw else {
        return policy;
    };

    if let Some(duration) = parse_duration_field("call.base_timeout", raw.base_timeout, errors)
        .and_then(|duration| ensure_positive_duration(duration, "call.base_timeout", errors))
    {
        policy.base_timeout = duration;
    }

    if let Some(duration) =
        parse_duration_field("call.timeout_increment", raw.timeout_increment, errors).and_then(
            |duration| ensure_positive_duration(duration, "call.timeout_increment", errors),
        )
    {
        policy.timeout_increment = duration;
    }

    if let Some(duration) = parse_duration_field("call.max_timeout", raw.max_timeout, errors)
        .and_then(|duration| ensure_positive_duration(duration, "call.max_timeout", errors))
    {
        policy.max_timeout = duration;
    }

    if let Some(attempts) = raw.max_attempts {
        if attempts == 0 {
            errors.push("call.max_attempts must be at least 1".to_string());
        } else {
            policy.max_attempts = attempts;
        }
    }

    if let Some(duration) = parse_duration_field("call.backoff_unit", raw.backoff_unit, errors)
        .and_then(|duration| ensure_positive_duration(duration, "call.backoff_unit", errors))
    {
        policy.backoff_unit = duration;
    }

    if let Some(duration) = parse_duration_field("call.jitter_cap", raw.jitter_cap, errors) {
        policy.jitter_cap = duration;
    }

    if policy.max_timeout < policy.base_timeout {
        errors.push(
            "call.max_timeout must be greater than or equal to call.base_timeout".to_string(),
        );
    }

    policy
}

fn parse_poll_policy(
    raw: Option<RawPollPolicy>,
    defaults: PollPolicy,
    context: &str,
    errors: &mut Vec<String>,
) -> PollPolicy {
    let mut policy = defaults;
    let Some(raw) = raw else {
        return policy;
    };

    if let Some(threshold) = raw.threshold {
        if threshold <= 0.0 || threshold > 1.0 {
            errors.push(format!(
                "{context}.threshold must be within (0, 1] (got {threshold})"
            ));
        } else {
            policy.threshold = threshold;
        }
    }

    let label = format!("{context}.deadline");
    if let Some(duration) = parse_duration_field(&label, raw.deadline, errors)
        .and_then(|duration| ensure_positive_duration(duration, &label, errors))
    {
        policy.deadline = duration;
    }

    policy
}

fn parse_launch(raw: RawLaunch, context: &str, errors: &mut Vec<String>) -> LaunchConfig {
    let command = raw.command.trim().to_string();
    if command.is_empty() {
        errors.push(format!("{context}.command must be non-empty"));
    }
    LaunchConfig {
        command,
        args: raw.args,
    }
}

fn parse_duration_field(
    field_label: &str,
    raw: Option<String>,
    errors: &mut Vec<String>,
) -> Option<Duration> {
    let raw_value = raw?;

    let trimmed = raw_value.trim();
    if trimmed.is_empty() {
        errors.push(format!("{field_label} must be a non-empty duration string"));
        return None;
    }

    match parse_duration(trimmed) {
        Ok(duration) => Some(duration),
        Err(_) => {
            errors.push(format!(
                "{field_label} must be a valid duration (got `{trimmed}`)"
            ));
            None
        }
    }
}

fn ensure_positive_duration(
    duration: Duration,
    label: &str,
    errors: &mut Vec<String>,
) -> Option<Duration> {
    if duration.is_zero() {
        errors.push(format!("{label} must be greater than zero"));
        None
    } else {
        Some(duration)
    }
}
