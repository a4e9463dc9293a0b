//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem exactly once
//! - Provide a process-wide logger usable before initialization
//! - Tag every record with the service name current at emission time
//! - Attach structured fields and a correlation id to derived loggers
//!
//! # Design Decisions
//! - Uses tracing crate for emission; the facade only decides level and
//!   fields
//! - The service tag is added by the event formatter, so records emitted
//!   through `tracing` directly are tagged too
//! - Before `init` runs, records go to a development console subscriber
//! - Console and rotating file sinks run side by side; the file goes through
//!   a non-blocking worker
//! - Level comes from config, RUST_LOG overrides it

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, Once, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use tracing::level_filters::LevelFilter;
use tracing::subscriber::NoSubscriber;
use tracing::{Dispatch, Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::observability::rotation::{RotatingFile, RotationPolicy};

/// Directory used for log files unless configured otherwise.
pub const DEFAULT_LOG_DIR: &str = "/var/log/httpserver";

static INIT: Once = Once::new();
static SERVICE_NAME: RwLock<String> = RwLock::new(String::new());
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);
static DEVELOPMENT: OnceLock<Dispatch> = OnceLock::new();

/// Error raised while building the logging pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("failed to open log sink in {dir}: {source}")]
    Sink {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install log subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Severity accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    DPanic,
    Panic,
    Fatal,
}

impl Level {
    /// Parse a configured level. Unknown names resolve to [`Level::Info`].
    pub fn parse(raw: &str) -> Self {
        match raw {
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            "dpanic" => Level::DPanic,
            "panic" => Level::Panic,
            "fatal" => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::DPanic => "dpanic",
            Level::Panic => "panic",
            Level::Fatal => "fatal",
        }
    }

    /// The tracing filter for this level. tracing has nothing above ERROR,
    /// so the three panic-class levels collapse onto it.
    pub fn filter(&self) -> LevelFilter {
        match self {
            Level::Debug => LevelFilter::DEBUG,
            Level::Info => LevelFilter::INFO,
            Level::Warn => LevelFilter::WARN,
            Level::Error | Level::DPanic | Level::Panic | Level::Fatal => LevelFilter::ERROR,
        }
    }
}

impl FromStr for Level {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Level::parse(s))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration applied by [`init`].
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: crate::config::DEFAULT_SERVICE_NAME.to_string(),
            log_level: Level::Info.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

/// Initialize the process-wide logger.
///
/// Only the first call does anything; it returns `Ok(true)` when it installed
/// the pipeline and `Ok(false)` for every later call. An error here means no
/// sink exists and the process should not continue.
pub fn init(config: &Config) -> Result<bool, LoggerError> {
    let mut outcome = Ok(false);
    INIT.call_once(|| outcome = install(config).map(|()| true));
    outcome
}

fn install(config: &Config) -> Result<(), LoggerError> {
    set_service_name(&config.service_name);

    let level = Level::parse(&config.log_level);
    let policy = RotationPolicy::from_env();
    let file = RotatingFile::open(&config.log_dir, &config.service_name, policy).map_err(|source| {
        LoggerError::Sink {
            dir: config.log_dir.clone(),
            source,
        }
    })?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.filter().into())
        .from_env_lossy();

    let console_layer =
        tracing_fmt::layer().event_format(ServiceTagged::new(tracing_fmt::format().with_target(false).with_ansi(true)));
    let file_layer = tracing_fmt::layer()
        .event_format(ServiceTagged::new(tracing_fmt::format().with_target(false).with_ansi(false)))
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    *FILE_GUARD.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);

    tracing::debug!(
        service = %config.service_name,
        level = %level,
        log_dir = %config.log_dir.display(),
        max_age_days = policy.max_age_days,
        "Logger initialized"
    );
    Ok(())
}

/// Flush and stop the file writer. Records emitted afterwards only reach the
/// console.
pub fn shutdown() {
    let guard = FILE_GUARD.lock().unwrap_or_else(PoisonError::into_inner).take();
    drop(guard);
}

/// Replace the process-wide service name. Every logger handle picks up the
/// new name on its next emission.
pub fn set_service_name(name: &str) {
    let mut current = SERVICE_NAME.write().unwrap_or_else(PoisonError::into_inner);
    current.clear();
    current.push_str(name);
}

/// The current service name, or the default one before anything was set.
pub fn service_name() -> String {
    let current = SERVICE_NAME.read().unwrap_or_else(PoisonError::into_inner);
    if current.is_empty() {
        crate::config::DEFAULT_SERVICE_NAME.to_string()
    } else {
        current.clone()
    }
}

/// Event formatter that appends `logger="<service name>"` to every line.
///
/// The name is read when the event is formatted, which happens on the
/// emitting thread even when the writer is non-blocking.
#[derive(Debug, Clone)]
pub struct ServiceTagged<F> {
    inner: F,
}

impl<F> ServiceTagged<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for ServiceTagged<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;
        let line = line.strip_suffix('\n').unwrap_or(&line);
        writeln!(writer, "{} logger={:?}", line, service_name())
    }
}

/// Request-scoped data a logger can be bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContext {
    correlation_id: Option<String>,
}

impl LogContext {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(id.into()),
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}

/// Logger with no request context.
pub fn bg() -> Logger {
    Logger::default()
}

/// Logger bound to a request context.
pub fn for_context(ctx: &LogContext) -> Logger {
    Logger {
        correlation_id: ctx.correlation_id.clone(),
        fields: Vec::new(),
    }
}

/// Value of a structured field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    I64(i64),
    U64(u64),
    Bool(bool),
    Duration(Duration),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) if needs_quoting(s) => write!(f, "{:?}", s),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::I64(v) => write!(f, "{}", v),
            FieldValue::U64(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Duration(d) => write!(f, "{:?}", d),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::U64(u64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '=' || c == '"')
}

/// A key/value pair attached to a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: Cow<'static, str>,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

struct RenderedFields<'a>(&'a [Field]);

impl fmt::Display for RenderedFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", field.key, field.value)?;
        }
        Ok(())
    }
}

/// Handle used to emit records.
///
/// Cloning is cheap enough for per-request use. [`Logger::with`] returns a new
/// handle; the receiver is left untouched.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    correlation_id: Option<String>,
    fields: Vec<Field>,
}

impl Logger {
    /// Derive a logger that includes `fields` on every record.
    pub fn with(&self, fields: impl IntoIterator<Item = Field>) -> Logger {
        let mut derived = self.clone();
        derived.fields.extend(fields);
        derived
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.emit(Level::Debug, &msg);
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.emit(Level::Info, &msg);
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        self.emit(Level::Warn, &msg);
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.emit(Level::Error, &msg);
    }

    fn emit(&self, level: Level, msg: &dyn fmt::Display) {
        let correlation_id = self.correlation_id.as_deref();
        let fields = (!self.fields.is_empty()).then(|| tracing::field::display(RenderedFields(&self.fields)));

        let record = || match level {
            Level::Debug => tracing::debug!(correlation_id, fields, "{}", msg),
            Level::Info => tracing::info!(correlation_id, fields, "{}", msg),
            Level::Warn => tracing::warn!(correlation_id, fields, "{}", msg),
            Level::Error | Level::DPanic | Level::Panic | Level::Fatal => {
                tracing::error!(correlation_id, fields, "{}", msg)
            }
        };

        if has_subscriber() {
            record();
        } else {
            tracing::dispatcher::with_default(development(), record);
        }
    }
}

fn has_subscriber() -> bool {
    tracing::dispatcher::get_default(|dispatch| !dispatch.is::<NoSubscriber>())
}

fn development() -> &'static Dispatch {
    DEVELOPMENT.get_or_init(|| {
        let format = tracing_fmt::format()
            .with_target(false)
            .with_file(true)
            .with_line_number(true);
        let subscriber = tracing_fmt()
            .with_max_level(LevelFilter::DEBUG)
            .event_format(ServiceTagged::new(format))
            .finish();
        Dispatch::new(subscriber)
    })
}
