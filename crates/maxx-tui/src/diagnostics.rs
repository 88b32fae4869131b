//! WARN/ERROR events routed to the carousel's status line.

use std::fmt;

use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::Level;

/// One status-line diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub time: String,
    pub level: Level,
    /// Last segment of the event target, e.g. `socket` for `maxx_tui::socket`.
    pub source: String,
    /// Remote client the event concerns, from a `remote = id` field.
    pub remote: Option<u64>,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.level == Level::ERROR { "ERR " } else { "WARN" };
        write!(f, "{} {} {}", self.time, tag, self.source)?;
        if let Some(remote) = self.remote {
            write!(f, " (remote {})", remote)?;
        }
        write!(f, ": {}", self.text)
    }
}

pub struct DiagnosticsLayer {
    sender: broadcast::Sender<Diagnostic>,
}

impl DiagnosticsLayer {
    pub fn new(sender: broadcast::Sender<Diagnostic>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for DiagnosticsLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let level = *metadata.level();
        if level > Level::WARN {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let diagnostic = Diagnostic {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            level,
            source: metadata
                .target()
                .rsplit("::")
                .next()
                .unwrap_or_default()
                .to_string(),
            remote: fields.remote,
            text: fields.text,
        };

        // Headless runs have no receiver.
        let _ = self.sender.send(diagnostic);
    }
}

#[derive(Default)]
struct FieldCollector {
    text: String,
    remote: Option<u64>,
}

impl Visit for FieldCollector {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "remote" {
            self.remote = Some(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        match u64::try_from(value) {
            Ok(v) if field.name() == "remote" => self.remote = Some(v),
            _ => self.record_debug(field, &value),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.text.insert_str(0, value);
        } else {
            self.text.push_str(&format!(" {}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.text.insert_str(0, &format!("{:?}", value));
        } else {
            self.text.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_only_warnings_and_errors_are_forwarded() {
        let (tx, mut rx) = broadcast::channel(16);
        let subscriber = tracing_subscriber::registry().with(DiagnosticsLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("starting");
            tracing::warn!(target: "maxx_tui::yts", query = "dune", "search failed");
            tracing::error!(target: "maxx_tui::http", "bind failed");
        });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, Level::WARN);
        assert_eq!(first.source, "yts");
        assert_eq!(first.text, "search failed query=dune");
        assert!(first.to_string().ends_with("WARN yts: search failed query=dune"));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.level, Level::ERROR);
        assert!(second.to_string().ends_with("ERR  http: bind failed"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remote_field_names_the_client() {
        let (tx, mut rx) = broadcast::channel(16);
        let subscriber = tracing_subscriber::registry().with(DiagnosticsLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "maxx_tui::socket", remote = 3usize, "malformed packet");
        });

        let diagnostic = rx.try_recv().unwrap();
        assert_eq!(diagnostic.remote, Some(3));
        assert_eq!(diagnostic.text, "malformed packet");
        assert!(diagnostic
            .to_string()
            .ends_with("WARN socket (remote 3): malformed packet"));
    }
}
