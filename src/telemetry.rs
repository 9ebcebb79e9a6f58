use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::{self as stdfmt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::OnceLock;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{
    self as fmt_subscriber, format::Writer, FmtContext, FormatEvent, FormatFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "sessiond";

pub fn init_tracing() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sessiond=info,info"));

    let stdout = std::io::stdout;
    let stderr = std::io::stderr;

    let writer = stdout
        .with_max_level(tracing::Level::INFO)
        .or_else(stderr.with_min_level(tracing::Level::WARN));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(false)
        .with_ansi(false)
        .event_format(KeyValueFormatter::new())
        .fmt_fields(fmt_subscriber::format::DefaultFields::new())
        .with_writer(writer)
        .try_init()
        .map_err(|err| crate::err!("failed to initialise tracing subscriber: {err}"))
}

struct KeyValueFormatter {
    service_name: &'static str,
}

impl KeyValueFormatter {
    const fn new() -> Self {
        Self {
            service_name: SERVICE_NAME,
        }
    }
}

impl<S, N> FormatEvent<S, N> for KeyValueFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let pid = std::process::id().to_string();
        let metadata = event.metadata();
        let component = metadata.target();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());

        let mut fields = visitor.fields;
        fields.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

        let span_path = current_span_path(ctx);

        let mut line = String::new();
        push_field(&mut line, "ts", &timestamp);
        push_field(&mut line, "level", metadata.level().as_str());
        push_field(&mut line, "service", self.service_name);
        push_field(&mut line, "component", component);
        push_field(&mut line, "pid", &pid);

        if let Some(span_path) = span_path {
            push_field(&mut line, "span", &span_path);
        }

        push_field(&mut line, "msg", &message);

        for (key, value) in fields {
            push_field(&mut line, &key, &value);
        }

        writer.write_str(&line)?;
        writer.write_char('\n')
    }
}

fn current_span_path<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    let span = ctx.lookup_current()?;
    let names: Vec<&str> = span.scope().from_root().map(|s| s.name()).collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join("."))
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn record_field(&mut self, field: &Field, value: String) {
        if field.name().is_empty() {
            return;
        }
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_field(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.record_field(field, format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_field(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_field(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_field(field, value.to_string());
    }
}

/// In-process counters for probe attempts, poll outcomes, and session
/// lifecycle events. Exposed for diagnostics; never read back by the
/// coordination logic itself.
#[derive(Default)]
pub struct RuntimeCounters {
    launch_success: AtomicU64,
    launch_failure: AtomicU64,
    fallback_engaged: AtomicU64,
    monitor_degradations: AtomicU64,
    attempts: AttemptRegistry,
    polls: PollRegistry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeCountersSnapshot {
    pub launch_success: u64,
    pub launch_failure: u64,
    pub fallback_engaged: u64,
    pub monitor_degradations: u64,
    pub attempts: Vec<AttemptCountSnapshot>,
    pub polls: Vec<PollOutcomeSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptCountSnapshot {
    pub endpoint: String,
    pub classification: String,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollOutcomeSnapshot {
    pub tier: String,
    pub polls: u64,
    pub satisfied: u64,
    pub last_ready: usize,
    pub last_total: usize,
}

static RUNTIME_COUNTERS: OnceLock<RuntimeCounters> = OnceLock::new();

pub fn runtime_counters() -> &'static RuntimeCounters {
    RUNTIME_COUNTERS.get_or_init(RuntimeCounters::default)
}

impl RuntimeCounters {
    pub fn inc_launch_success(&self) {
        self.launch_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_launch_failure(&self) {
        self.launch_failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallback_engaged(&self) {
        self.fallback_engaged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_monitor_degradation(&self) {
        self.monitor_degradations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_attempt(&self, endpoint: &str, classification: &str) {
        self.attempts.record(endpoint, classification);
    }

    pub fn record_poll_outcome(&self, tier: &str, satisfied: bool, ready: usize, total: usize) {
        self.polls.record(tier, satisfied, ready, total);
    }

    pub fn snapshot(&self) -> RuntimeCountersSnapshot {
        RuntimeCountersSnapshot {
            launch_success: self.launch_success.load(Ordering::Relaxed),
            launch_failure: self.launch_failure.load(Ordering::Relaxed),
            fallback_engaged: self.fallback_engaged.load(Ordering::Relaxed),
            monitor_degradations: self.monitor_degradations.load(Ordering::Relaxed),
            attempts: self.attempts.snapshot(),
            polls: self.polls.snapshot(),
        }
    }
}

#[derive(Default)]
struct AttemptRegistry {
    inner: Mutex<BTreeMap<(String, String), u64>>,
}

impl AttemptRegistry {
    fn record(&self, endpoint: &str, classification: &str) {
        let mut guard = self.inner.lock().expect("attempt registry poisoned");
        let key = (endpoint.to_string(), classification.to_string());
        let counter = guard.entry(key).or_insert(0);
        *counter = counter.saturating_add(1);
    }

    fn snapshot(&self) -> Vec<AttemptCountSnapshot> {
        let guard = self.inner.lock().expect("attempt registry poisoned");
        guard
            .iter()
            .map(|((endpoint, classification), total)| AttemptCountSnapshot {
                endpoint: endpoint.clone(),
                classification: classification.clone(),
                total: *total,
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
struct PollOutcomeEntry {
    polls: u64,
    satisfied: u64,
    last_ready: usize,
    last_total: usize,
}

#[derive(Default)]
struct PollRegistry {
    inner: Mutex<BTreeMap<String, PollOutcomeEntry>>,
}

impl PollRegistry {
    fn record(&self, tier: &str, satisfied: bool, ready: usize, total: usize) {
        let mut guard = self.inner.lock().expect("poll registry poisoned");
        let entry = guard.entry(tier.to_string()).or_default();
        entry.polls = entry.polls.saturating_add(1);
        if satisfied {
            entry.satisfied = entry.satisfied.saturating_add(1);
        }
        entry.last_ready = ready;
        entry.last_total = total;
    }

    fn snapshot(&self) -> Vec<PollOutcomeSnapshot> {
        let guard = self.inner.lock().expect("poll registry poisoned");
        guard
            .iter()
            .map(|(tier, entry)| PollOutcomeSnapshot {
                tier: tier.clone(),
                polls: entry.polls,
                satisfied: entry.satisfied,
                last_ready: entry.last_ready,
                last_total: entry.last_total,
            })
            .collect()
    }
}

fn encode_field_value(value: &str) -> String {
    let needs_quotes = value.chars().any(|c| {
        c.is_whitespace()
            || matches!(
                c,
                '"' | '\\' | '=' | '[' | ']' | '{' | '}' | ',' | '\n' | '\r' | '\t'
            )
    });

    if !needs_quotes {
        return value.to_string();
    }

    let mut encoded = String::with_capacity(value.len() + 2);
    encoded.push('"');
    for ch in value.chars() {
        match ch {
            '"' => encoded.push_str("\\\""),
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\n"),
            '\r' => encoded.push_str("\\r"),
            '\t' => encoded.push_str("\\t"),
            _ => encoded.push(ch),
        }
    }
    encoded.push('"');
    encoded
}

fn push_field(buffer: &mut String, key: &str, value: &str) {
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(key);
    buffer.push('=');
    buffer.push_str(&encode_field_value(value));
}
