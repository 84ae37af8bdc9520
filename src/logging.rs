use std::collections::VecDeque;
use std::fmt::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::EnvFilter, layer::Context, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt, Layer,
};

// Log targets, one per pipeline stage
pub const PDF_PARSING: &str = "dsi_parse";
pub const EXTRACT: &str = "dsi_extract";
pub const SEGMENT: &str = "dsi_segment";
pub const OVERLAY: &str = "dsi_overlay";
pub const WRITER: &str = "dsi_writer";
pub const PROCESSOR: &str = "dsi_processor";
pub const WATCH: &str = "dsi_watch";

const FEED_TARGETS: &[&str] = &[SEGMENT, WRITER, PROCESSOR, WATCH];

/// One log line as shown in a log display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEvent {
    pub level: String,
    pub target: String,
    pub message: String,
    /// Remaining structured fields, `name=value` joined by spaces.
    pub fields: String,
}

/// Bounded in-memory buffer of pipeline events for a UI to poll.
///
/// The `dsi-split` binary only logs to stdout and files; an embedding
/// application creates a feed and passes it to [`init_logging`].
#[derive(Clone)]
pub struct EventFeed {
    events: Arc<Mutex<VecDeque<FeedEvent>>>,
    capacity: usize,
}

impl Default for EventFeed {
    fn default() -> Self {
        EventFeed::with_capacity(1000)
    }
}

impl EventFeed {
    pub fn with_capacity(capacity: usize) -> Self {
        EventFeed {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<FeedEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: FeedEvent) {
        let mut events = self.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<FeedEvent> {
        self.lock().iter().cloned().collect()
    }

    /// Take everything recorded so far, leaving the feed empty.
    pub fn drain(&self) -> Vec<FeedEvent> {
        self.lock().drain(..).collect()
    }

    pub fn layer<S>(&self) -> impl Layer<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let directives = FEED_TARGETS
            .iter()
            .map(|t| format!("{t}=info"))
            .collect::<Vec<_>>()
            .join(",");
        let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
        FeedLayer { feed: self.clone() }.with_filter(filter)
    }
}

struct FeedLayer {
    feed: EventFeed,
}

impl<S> Layer<S> for FeedLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FeedVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.feed.record(FeedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FeedVisitor {
    message: String,
    fields: String,
}

impl Visit for FeedVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field, format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field, format_args!("{value:?}"));
        }
    }
}

impl FeedVisitor {
    fn push_field(&mut self, field: &Field, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", field.name(), value);
    }
}

/// Install the global subscriber: stdout, an optional daily log file under
/// `log_dir`, and an optional [`EventFeed`].
///
/// `RUST_LOG` wins over `filter`. Keep the returned guard alive for as long as
/// the file log should be flushed.
pub fn init_logging(
    filter: &str,
    log_dir: Option<&Path>,
    feed: Option<&EventFeed>,
) -> Option<WorkerGuard> {
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(env_filter());

    let mut guard = None;
    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("log directory {} unavailable: {e}", dir.display());
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, "dsi-split.log");
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(writer)
                .with_filter(env_filter()),
        )
    });

    let result = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(feed.map(|feed| feed.layer()))
        .try_init();
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }

    guard
}
