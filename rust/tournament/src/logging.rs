use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

const DEFAULT_FILTER: &str = "info,shortdeck_tournament=debug";
const FORMAT_VAR: &str = "SHORTDECK_LOG_FORMAT";

/// One captured `tracing` event.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Shared buffer of captured events, for asserting on what the runtime logged.
#[derive(Debug, Clone, Default)]
pub struct TestLogSubscriber {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer that appends every event it sees to this buffer.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer {
            sink: self.clone(),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Entries carrying `field` with a value containing `value`.
    pub fn entries_with(&self, field: &str, value: &str) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.field(field).is_some_and(|v| v.contains(value)))
            .cloned()
            .collect()
    }

    pub fn entries_at(&self, level: Level) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct CaptureLayer {
    sink: TestLogSubscriber,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        self.sink.lock().push(LogEntry {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: fields.message.unwrap_or_default(),
            fields: fields.values,
        });
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: Vec<(String, String)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => self.values.push((name.to_string(), value)),
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

/// Installs the global fmt subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to
/// `info,shortdeck_tournament=debug`. `SHORTDECK_LOG_FORMAT=json` switches to
/// JSON lines.
pub fn init_logging() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(FORMAT_VAR).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        let subscriber = fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = fmt()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .with_line_number(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Installs a process-wide capturing subscriber on first use and returns it.
///
/// Tests in one binary share the capture; filter by a field such as
/// `tournament_id` rather than relying on `clear`.
pub fn init_test_logging() -> TestLogSubscriber {
    static CAPTURE: OnceLock<TestLogSubscriber> = OnceLock::new();

    CAPTURE
        .get_or_init(|| {
            let capture = TestLogSubscriber::new();
            let registry = Registry::default().with(capture.layer());
            // another global subscriber may already be installed; capture is best effort then
            let _ = tracing::subscriber::set_global_default(registry);
            capture
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, error, info, warn};

    fn capture(f: impl FnOnce()) -> TestLogSubscriber {
        let subscriber = TestLogSubscriber::new();
        let registry = Registry::default().with(subscriber.layer());
        tracing::subscriber::with_default(registry, f);
        subscriber
    }

    #[test]
    fn captures_levels_and_messages_in_order() {
        let logs = capture(|| {
            debug!("pending writes settled");
            info!("tournament created");
            warn!("persistence retry");
            error!("snapshot failed verification");
        });

        let levels: Vec<Level> = logs.entries().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR]);
        assert_eq!(logs.entries()[1].message, "tournament created");
        assert_eq!(logs.entries_at(Level::ERROR).len(), 1);

        logs.clear();
        assert!(logs.entries().is_empty());
    }

    #[test]
    fn captures_typed_fields_as_plain_text() {
        let logs = capture(|| {
            info!(
                tournament_id = %"t-1",
                hand_number = 3u64,
                degraded = false,
                "hand started"
            );
        });

        let entry = &logs.entries()[0];
        assert_eq!(entry.field("tournament_id"), Some("t-1"));
        assert_eq!(entry.field("hand_number"), Some("3"));
        assert_eq!(entry.field("degraded"), Some("false"));
        assert_eq!(entry.field("missing"), None);
        assert_eq!(logs.entries_with("tournament_id", "t-1").len(), 1);
        assert!(logs.entries_with("tournament_id", "t-2").is_empty());
    }
}
