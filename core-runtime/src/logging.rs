//! # Engine Logging
//!
//! Installs the global `tracing` subscriber for the playback engine and
//! mirrors events into the host's own logger (OSLog, Logcat) through a
//! [`LoggerSink`].
//!
//! The subscriber is a registry with three layers:
//! - an `EnvFilter` that keeps the engine crates at the configured level and
//!   quiets the HTTP and SQLite stacks to `warn`
//! - a `fmt` layer writing to stdout as pretty, JSON or compact lines
//! - an optional host layer turning each event into a [`LogEntry`]
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::LogLevel;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_host_sink(Arc::new(Logcat)),
//! )?;
//! ```
//!
//! Download and stream URLs are usually signed and local paths contain the
//! user's home directory; log them through [`redact_url`] and [`strip_path`].

use crate::error::{Error, Result};
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Crates that log at [`LoggingConfig::level`].
const ENGINE_TARGETS: [&str; 5] = [
    "playback_engine_workspace",
    "core_runtime",
    "core_playback",
    "core_service",
    "bridge_desktop",
];

/// Dependencies that are only interesting when they misbehave.
const QUIET_TARGETS: [&str; 4] = ["h2", "hyper", "reqwest", "sqlx"];

/// Output format of the stdout layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored. Default in debug builds.
    Pretty,
    /// One JSON object per event. Default in release builds.
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Replaces the generated directives entirely, e.g.
    /// `"core_playback=trace,sqlx=info"`.
    pub directives: Option<String>,
    pub host_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span open/close and attach the span list to JSON events.
    pub spans: bool,
    pub show_target: bool,
    pub show_threads: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            directives: None,
            host_sink: None,
            spans: true,
            show_target: true,
            show_threads: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    pub fn with_host_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.host_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, spans: bool) -> Self {
        self.spans = spans;
        self
    }

    pub fn with_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn with_threads(mut self, show: bool) -> Self {
        self.show_threads = show;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = match &self.directives {
            Some(custom) => custom.clone(),
            None => {
                let level = level_directive(self.level);
                ENGINE_TARGETS
                    .iter()
                    .map(|target| format!("{target}={level}"))
                    .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")))
                    .collect::<Vec<_>>()
                    .join(",")
            }
        };

        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("Invalid log directives '{directives}': {e}")))
    }
}

/// Install the global subscriber.
///
/// Call once at startup; a second call fails with [`Error::Config`] and
/// leaves the first subscriber in place.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    let stdout = tracing_subscriber::fmt::layer()
        .with_target(config.show_target)
        .with_thread_ids(config.show_threads)
        .with_thread_names(config.show_threads)
        .with_writer(std::io::stdout);

    let stdout = match config.format {
        LogFormat::Pretty => stdout
            .pretty()
            .with_span_events(if config.spans {
                FmtSpan::NEW | FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            })
            .boxed(),
        LogFormat::Json => stdout
            .json()
            .flatten_event(true)
            .with_current_span(config.spans)
            .with_span_list(config.spans)
            .boxed(),
        LogFormat::Compact => stdout.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(config.host_sink.map(HostLogLayer::new))
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {e}")))
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn host_level(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::ERROR => LogLevel::Error,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::TRACE => LogLevel::Trace,
    }
}

/// Mirrors events into a host [`LoggerSink`].
struct HostLogLayer {
    sink: Arc<dyn LoggerSink>,
}

impl HostLogLayer {
    fn new(sink: Arc<dyn LoggerSink>) -> Self {
        Self { sink }
    }

    fn deliver(&self, entry: LogEntry) {
        let sink = Arc::clone(&self.sink);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = sink.log(entry).await {
                        eprintln!("host logger rejected entry: {e}");
                    }
                });
            }
            // Events from plain threads (tests, host callbacks) have no
            // runtime to spawn onto.
            Err(_) => {
                if let Err(e) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("host logger rejected entry: {e}");
                }
            }
        }
    }
}

impl<S> Layer<S> for HostLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = host_level(metadata.level());
        if level < self.sink.min_level() {
            return;
        }

        let mut fields = EntryFields::default();
        event.record(&mut fields);

        let message = fields
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = fields.values;
        entry.span = ctx.lookup_current().map(|span| span.name().to_string());

        self.deliver(entry);
    }
}

/// Collects an event's fields as strings, pulling out `message`.
#[derive(Default)]
struct EntryFields {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl EntryFields {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EntryFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

/// Cut the query string and fragment off a URL.
///
/// ```ignore
/// info!(url = %redact_url("https://cdn.example.com/a.mp3?sig=abc"), "Fetching");
/// // url="https://cdn.example.com/a.mp3"
/// ```
pub fn redact_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// File name of a Unix or Windows path.
///
/// ```ignore
/// info!(file = %strip_path("/Users/jo/Library/offline/t1.audio"), "Download complete");
/// // file="t1.audio"
/// ```
pub fn strip_path(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(separator) => &path[separator + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for CapturingSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Debug
        }
    }

    #[test]
    fn test_default_directives_cover_engine_crates() {
        let filter = LoggingConfig::default()
            .with_level(LogLevel::Debug)
            .env_filter()
            .unwrap()
            .to_string();

        assert!(filter.contains("core_playback=debug"));
        assert!(filter.contains("core_service=debug"));
        assert!(filter.contains("sqlx=warn"));
        assert!(filter.contains("reqwest=warn"));
    }

    #[test]
    fn test_custom_directives_replace_defaults() {
        let filter = LoggingConfig::default()
            .with_directives("core_playback=trace")
            .env_filter()
            .unwrap()
            .to_string();

        assert!(filter.contains("core_playback=trace"));
        assert!(!filter.contains("sqlx"));
    }

    #[test]
    fn test_invalid_directives_are_config_errors() {
        let result = LoggingConfig::default()
            .with_directives("core_playback=loud")
            .env_filter();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_host_layer_forwards_fields_and_span() {
        let sink = Arc::new(CapturingSink::default());
        let subscriber = tracing_subscriber::registry().with(HostLogLayer::new(sink.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let span = tracing::info_span!("download");
        span.in_scope(|| {
            tracing::info!(target: "downloads", track_id = "t1", bytes = 42u64, "Download complete");
        });

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.target, "downloads");
        assert_eq!(entry.message, "Download complete");
        assert_eq!(entry.fields["track_id"], "t1");
        assert_eq!(entry.fields["bytes"], "42");
        assert_eq!(entry.span.as_deref(), Some("download"));
    }

    #[test]
    fn test_host_layer_honours_min_level() {
        let sink = Arc::new(CapturingSink::default());
        let subscriber = tracing_subscriber::registry().with(HostLogLayer::new(sink.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::trace!("position tick");
        tracing::warn!("retrying");

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://cdn.example.com/a.mp3?sig=abc&exp=1"),
            "https://cdn.example.com/a.mp3"
        );
        assert_eq!(redact_url("https://cdn.example.com/a.mp3#t=10"), "https://cdn.example.com/a.mp3");
        assert_eq!(redact_url("https://cdn.example.com/a.mp3"), "https://cdn.example.com/a.mp3");
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(strip_path("/home/user/offline/t1.audio"), "t1.audio");
        assert_eq!(strip_path("C:\\Users\\Jo\\offline\\t1.audio"), "t1.audio");
        assert_eq!(strip_path("t1.audio"), "t1.audio");
        assert_eq!(strip_path("/var/log/"), "");
    }
}
